//! Filesystem helpers shared by the builders.
//!
//! All functions return [`XcforgeError`] values whose messages name the
//! path involved, so a failed slice reports exactly which file was missing.

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::XcforgeError;

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
///
/// The result is usable as a C identifier body and as a Swift module name.
/// Sanitizing twice gives the same result as sanitizing once.
///
/// ```
/// use xcforge_sdk::builders::common::sanitize_module_name;
///
/// assert_eq!(sanitize_module_name("My-Library.Framework"), "My_Library_Framework");
/// ```
pub fn sanitize_module_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Reverse-DNS bundle identifier for a framework.
pub fn bundle_identifier(module_name: &str) -> String {
    format!("xcforge.{}", module_name.replace('_', "-"))
}

pub fn create_dir_all(path: &Path) -> Result<(), XcforgeError> {
    fs::create_dir_all(path).map_err(|e| {
        XcforgeError::Build(format!("Failed to create directory {}: {}", path.display(), e))
    })
}

pub fn copy_file(src: &Path, dest: &Path) -> Result<(), XcforgeError> {
    fs::copy(src, dest).map(|_| ()).map_err(|e| {
        XcforgeError::Build(format!(
            "Failed to copy {} to {}: {}",
            src.display(),
            dest.display(),
            e
        ))
    })
}

/// Removes a file, symlink or directory tree if it exists.
pub fn remove_path(path: &Path) -> Result<bool, XcforgeError> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(false);
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map(|_| true).map_err(|e| {
        XcforgeError::Build(format!("Failed to remove {}: {}", path.display(), e))
    })
}

/// Copies a directory tree, preserving symlinks as symlinks.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), XcforgeError> {
    create_dir_all(dest)?;

    for entry in read_dir_sorted(src)? {
        let dest_path = dest.join(entry.file_name().unwrap_or_default());
        let meta = fs::symlink_metadata(&entry)?;

        if meta.file_type().is_symlink() {
            copy_symlink(&entry, &dest_path)?;
        } else if meta.is_dir() {
            copy_dir_recursive(&entry, &dest_path)?;
        } else {
            copy_file(&entry, &dest_path)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), XcforgeError> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), XcforgeError> {
    copy_file(src, dest)
}

/// Copies a directory tree, replacing every symlink with a real copy of its target.
///
/// Links are resolved relative to their location in `src`. Returns the number
/// of links resolved; links that cannot be resolved (dangling, permission
/// errors) are logged and skipped.
pub fn copy_dir_resolving_symlinks(src: &Path, dest: &Path) -> Result<usize, XcforgeError> {
    create_dir_all(dest)?;
    let mut resolved = 0;

    for entry in read_dir_sorted(src)? {
        let dest_path = dest.join(entry.file_name().unwrap_or_default());
        let meta = fs::symlink_metadata(&entry)?;

        if meta.file_type().is_symlink() {
            let real = match fs::canonicalize(&entry) {
                Ok(real) => real,
                Err(e) => {
                    log::warn!("Failed to resolve symlink {}: {}", entry.display(), e);
                    continue;
                }
            };
            if real.is_dir() {
                resolved += copy_dir_resolving_symlinks(&real, &dest_path)?;
            } else {
                copy_file(&real, &dest_path)?;
            }
            log::debug!("Resolved symlink {}", entry.display());
            resolved += 1;
        } else if meta.is_dir() {
            resolved += copy_dir_resolving_symlinks(&entry, &dest_path)?;
        } else {
            copy_file(&entry, &dest_path)?;
        }
    }

    Ok(resolved)
}

/// Lossy string form of a path for tool arguments.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Files under `dir` (recursively) whose name ends with `suffix`, sorted.
pub fn find_files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, XcforgeError> {
    let mut found = Vec::new();
    collect_files(dir, suffix, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_files(dir: &Path, suffix: &str, found: &mut Vec<PathBuf>) -> Result<(), XcforgeError> {
    for entry in read_dir_sorted(dir)? {
        if entry.is_dir() {
            collect_files(&entry, suffix, found)?;
        } else if entry
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix))
        {
            found.push(entry);
        }
    }
    Ok(())
}

/// Entries of `dir` in name order.
pub fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, XcforgeError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| {
            XcforgeError::Build(format!("Failed to read directory {}: {}", dir.display(), e))
        })?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

/// Marks `path` executable for everyone.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), XcforgeError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), XcforgeError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_module_name() {
        assert_eq!(sanitize_module_name("My-Library.Framework"), "My_Library_Framework");
        assert_eq!(sanitize_module_name("Widgets"), "Widgets");
        assert_eq!(sanitize_module_name("a b+c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_module_name_is_idempotent() {
        for name in ["My-Library.Framework", "", "ÜberKit", "x86_64", "a--b..c", "日本"] {
            let once = sanitize_module_name(name);
            assert_eq!(sanitize_module_name(&once), once);
            assert!(once.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    #[test]
    fn test_bundle_identifier() {
        assert_eq!(bundle_identifier("My_Kit"), "xcforge.My-Kit");
    }

    #[test]
    fn test_find_files_with_suffix() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("z.o"), "").unwrap();
        fs::write(nested.join("y.o"), "").unwrap();
        fs::write(nested.join("y.swiftdeps"), "").unwrap();

        let found = find_files_with_suffix(temp.path(), ".o").unwrap();
        assert_eq!(found, vec![nested.join("y.o"), temp.path().join("z.o")]);
    }

    #[test]
    fn test_remove_path() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("out.xcframework");
        fs::create_dir_all(dir.join("ios-arm64")).unwrap();
        assert!(remove_path(&dir).unwrap());
        assert!(!dir.exists());
        assert!(!remove_path(&dir).unwrap());
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("Headers")).unwrap();
        fs::write(src.join("Info.plist"), "plist").unwrap();
        fs::write(src.join("Headers/Kit-Swift.h"), "header").unwrap();

        let dest = temp.path().join("dest");
        copy_dir_recursive(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("Info.plist")).unwrap(), "plist");
        assert_eq!(
            fs::read_to_string(dest.join("Headers/Kit-Swift.h")).unwrap(),
            "header"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_resolving_symlinks_yields_regular_files() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("assets");
        fs::create_dir_all(real.join("images")).unwrap();
        fs::write(real.join("colors.json"), "{\"accent\":\"#f00\"}").unwrap();
        fs::write(real.join("images/logo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let bundle = temp.path().join("Kit_Widgets.bundle");
        fs::create_dir_all(&bundle).unwrap();
        std::os::unix::fs::symlink(real.join("colors.json"), bundle.join("colors.json")).unwrap();
        std::os::unix::fs::symlink("../assets/images", bundle.join("images")).unwrap();

        let dest = temp.path().join("Kit.framework/Kit_Widgets.bundle");
        assert_eq!(copy_dir_resolving_symlinks(&bundle, &dest).unwrap(), 2);

        let colors = dest.join("colors.json");
        assert!(fs::symlink_metadata(&colors).unwrap().file_type().is_file());
        assert_eq!(
            fs::read(&colors).unwrap(),
            fs::read(real.join("colors.json")).unwrap()
        );

        let images = dest.join("images");
        assert!(fs::symlink_metadata(&images).unwrap().file_type().is_dir());
        assert_eq!(
            fs::read(images.join("logo.png")).unwrap(),
            [0x89, 0x50, 0x4e, 0x47]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_skipped() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(src.join("missing"), src.join("ghost")).unwrap();

        let dest = temp.path().join("dest");
        assert_eq!(copy_dir_resolving_symlinks(&src, &dest).unwrap(), 0);
        assert!(dest.join("real.txt").is_file());
        assert!(fs::symlink_metadata(dest.join("ghost")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let binary = temp.path().join("Kit");
        fs::write(&binary, "!<arch>").unwrap();
        make_executable(&binary).unwrap();
        let mode = fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
