//! Removal of earlier build artifacts from the output directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::common::{create_dir_all, read_dir_sorted, remove_path};
use crate::types::XcforgeError;

/// What [`Cleaner::clean_all`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub archives_removed: Vec<PathBuf>,
    pub bundle_removed: bool,
    pub derived_data_removed: bool,
    pub errors: Vec<String>,
}

impl CleanReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Cleaner {
    output_dir: PathBuf,
    framework_name: String,
}

impl Cleaner {
    pub fn new(output_dir: impl Into<PathBuf>, framework_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            framework_name: framework_name.into(),
        }
    }

    pub fn ensure_output_dir(&self) -> Result<(), XcforgeError> {
        create_dir_all(&self.output_dir)
    }

    /// Removes archives, the bundle and, when asked, derived data.
    ///
    /// Individual removal failures are collected, not returned.
    pub fn clean_all(&self, include_derived_data: bool) -> CleanReport {
        let mut report = CleanReport::default();
        if !self.output_dir.is_dir() {
            return report;
        }

        match self.archives() {
            Ok(archives) => {
                for archive in archives {
                    match remove_path(&archive) {
                        Ok(_) => {
                            log::debug!("Removed {}", archive.display());
                            report.archives_removed.push(archive);
                        }
                        Err(e) => report.errors.push(e.to_string()),
                    }
                }
            }
            Err(e) => report.errors.push(e.to_string()),
        }

        let bundle = self.output_dir.join(format!("{}.xcframework", self.framework_name));
        match remove_path(&bundle) {
            Ok(removed) => report.bundle_removed = removed,
            Err(e) => report.errors.push(e.to_string()),
        }

        if include_derived_data {
            match remove_path(&self.output_dir.join("DerivedData")) {
                Ok(removed) => report.derived_data_removed = removed,
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        log::info!(
            "Cleaned {} archive(s){}",
            report.archives_removed.len(),
            if report.bundle_removed { " and the previous XCFramework" } else { "" }
        );
        report
    }

    /// `<name>-*.xcarchive`, `*-iOS.xcarchive` and `*-iOS-Simulator.xcarchive`.
    fn archives(&self) -> Result<Vec<PathBuf>, XcforgeError> {
        let prefix = format!("{}-", self.framework_name);
        Ok(read_dir_sorted(&self.output_dir)?
            .into_iter()
            .filter(|path| is_stale_archive(path, &prefix))
            .collect())
    }
}

fn is_stale_archive(path: &Path, prefix: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".xcarchive")
        && (name.starts_with(prefix)
            || name.ends_with("-iOS.xcarchive")
            || name.ends_with("-iOS-Simulator.xcarchive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch_dir(root: &Path, name: &str) -> PathBuf {
        let path = root.join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_clean_all() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch_dir(root, "SDK-iOS.xcarchive");
        touch_dir(root, "SDK-tvOS.xcarchive");
        touch_dir(root, "Other-iOS-Simulator.xcarchive");
        touch_dir(root, "Other-tvOS.xcarchive");
        touch_dir(root, "SDK.xcframework/ios-arm64");
        touch_dir(root, "DerivedData/Build");
        fs::write(root.join("notes.txt"), "keep").unwrap();

        let report = Cleaner::new(root, "SDK").clean_all(false);

        assert!(report.is_clean());
        assert_eq!(report.archives_removed.len(), 3);
        assert!(report.bundle_removed);
        assert!(!report.derived_data_removed);
        assert!(root.join("Other-tvOS.xcarchive").exists());
        assert!(root.join("DerivedData").exists());
        assert!(root.join("notes.txt").exists());
        assert!(!root.join("SDK.xcframework").exists());
    }

    #[test]
    fn test_clean_derived_data() {
        let temp = TempDir::new().unwrap();
        touch_dir(temp.path(), "DerivedData/Build");
        let report = Cleaner::new(temp.path(), "SDK").clean_all(true);
        assert!(report.derived_data_removed);
        assert!(!report.bundle_removed);
        assert!(!temp.path().join("DerivedData").exists());
    }

    #[test]
    fn test_missing_output_dir_is_noop() {
        let temp = TempDir::new().unwrap();
        let report = Cleaner::new(temp.path().join("missing"), "SDK").clean_all(true);
        assert_eq!(report, CleanReport::default());
    }

    #[test]
    fn test_ensure_output_dir() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("a/b");
        Cleaner::new(&out, "SDK").ensure_output_dir().unwrap();
        assert!(out.is_dir());
    }
}
