//! Fat-binary merging of same-platform slices.
//!
//! Slices are grouped by platform (device and simulator are distinct
//! platforms even when they share an OS family). A group with one member
//! passes through untouched; larger groups are combined with `lipo`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::common::{copy_dir_recursive, copy_file, create_dir_all, path_arg, read_dir_sorted, remove_path};
use crate::toolchain::{Invocation, Toolchain};
use crate::types::{MergedSlice, SliceResult, XcforgeError};

/// Successful slices of one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformGroup {
    pub platform: &'static str,
    pub slices: Vec<SliceResult>,
}

/// Groups successful slices by platform, in order of first appearance.
/// Failed slices are dropped.
pub fn group_by_platform(slices: &[SliceResult]) -> Vec<PlatformGroup> {
    let mut groups: Vec<PlatformGroup> = Vec::new();
    for slice in slices.iter().filter(|s| s.success) {
        let key = slice.sdk.platform_key();
        match groups.iter_mut().find(|g| g.platform == key) {
            Some(group) => group.slices.push(slice.clone()),
            None => groups.push(PlatformGroup {
                platform: key,
                slices: vec![slice.clone()],
            }),
        }
    }
    groups
}

pub struct ArchitectureMerger<'a> {
    toolchain: &'a dyn Toolchain,
}

impl<'a> ArchitectureMerger<'a> {
    pub fn new(toolchain: &'a dyn Toolchain) -> Self {
        Self { toolchain }
    }

    /// Merges slices of one platform into a fat framework under `work_dir`.
    ///
    /// Returns `None` when the slices cannot be merged; the caller drops the
    /// platform from the bundle.
    pub fn merge(&self, slices: &[SliceResult], work_dir: &Path) -> Option<MergedSlice> {
        let first = slices.first()?;
        let first_path = first.framework_path.as_ref()?;

        if slices.len() == 1 {
            return Some(MergedSlice {
                framework_path: first_path.clone(),
                sdk: first.sdk.clone(),
                architectures: vec![first.sdk.architecture.clone()],
            });
        }

        let architectures: Vec<String> = slices.iter().map(|s| s.sdk.architecture.clone()).collect();
        log::info!(
            "Combining {} for {} ({})",
            first.sdk.platform.display_name,
            framework_name(first_path),
            architectures.join(", ")
        );

        match self.try_merge(slices, work_dir) {
            Ok(framework_path) => Some(MergedSlice {
                framework_path,
                sdk: first.sdk.clone(),
                architectures,
            }),
            Err(e) => {
                log::error!(
                    "Failed to combine architectures for {}: {}",
                    first.sdk.platform.identifier,
                    e
                );
                None
            }
        }
    }

    fn try_merge(&self, slices: &[SliceResult], work_dir: &Path) -> Result<PathBuf, XcforgeError> {
        let paths = slices
            .iter()
            .map(|s| {
                s.framework_path.clone().ok_or_else(|| {
                    XcforgeError::Resource(format!(
                        "Slice for {} has no framework path",
                        s.sdk.triple(false)
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let first = &paths[0];
        let name = framework_name(first);
        let module = name.trim_end_matches(".framework").to_string();

        let merged = work_dir
            .join(format!("combined-{}", slices[0].sdk.platform_key()))
            .join(&name);
        remove_path(&merged)?;
        create_dir_all(&merged)?;

        // Everything except the binary is architecture-invariant.
        for entry in read_dir_sorted(first)? {
            let Some(entry_name) = entry.file_name() else {
                continue;
            };
            if entry_name == OsStr::new(&module) {
                continue;
            }
            let dest = merged.join(entry_name);
            if entry.is_dir() {
                copy_dir_recursive(&entry, &dest)?;
            } else {
                copy_file(&entry, &dest)?;
            }
        }

        // Module files are named by triple, so every slice contributes its own.
        let swiftmodule = Path::new("Modules").join(format!("{}.swiftmodule", module));
        for path in &paths[1..] {
            let source = path.join(&swiftmodule);
            if source.is_dir() {
                copy_dir_recursive(&source, &merged.join(&swiftmodule))?;
            }
        }

        let mut binaries = Vec::with_capacity(paths.len());
        for path in &paths {
            let binary = path.join(&module);
            if !binary.is_file() {
                return Err(XcforgeError::Resource(format!(
                    "Framework binary not found: {}",
                    binary.display()
                )));
            }
            binaries.push(path_arg(&binary));
        }

        let output = self.toolchain.run(
            &Invocation::new("lipo")
                .arg("-create")
                .args(binaries)
                .arg("-output")
                .arg(path_arg(&merged.join(&module))),
        );
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "lipo failed: {}",
                output.error_message()
            )));
        }

        Ok(merged)
    }
}

fn framework_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::lookup;
    use crate::sdk::SdkSpec;
    use crate::testing::FakeToolchain;
    use std::fs;
    use tempfile::TempDir;

    fn slice(root: &Path, platform: &str, arch: &str) -> SliceResult {
        let sdk = SdkSpec::new(lookup(platform).unwrap(), arch, None);
        let fw = root.join(sdk.triple(false)).join("Kit.framework");
        let swiftmodule = fw.join("Modules/Kit.swiftmodule");
        fs::create_dir_all(&swiftmodule).unwrap();
        fs::create_dir_all(fw.join("Headers")).unwrap();
        fs::create_dir_all(fw.join("Kit_Kit.bundle")).unwrap();
        fs::write(fw.join("Kit"), arch).unwrap();
        fs::write(fw.join("Info.plist"), "plist").unwrap();
        fs::write(fw.join("Headers/Kit-Swift.h"), "h").unwrap();
        fs::write(fw.join("Kit_Kit.bundle/a.json"), "{}").unwrap();
        fs::write(
            swiftmodule.join(format!("{}.swiftinterface", sdk.triple(false))),
            "iface",
        )
        .unwrap();
        SliceResult::succeeded(sdk, fw)
    }

    #[test]
    fn test_grouping_separates_device_from_simulator() {
        let temp = TempDir::new().unwrap();
        let slices = vec![
            slice(temp.path(), "ios", "arm64"),
            slice(temp.path(), "ios-simulator", "arm64"),
            slice(temp.path(), "ios-simulator", "x86_64"),
        ];
        let groups = group_by_platform(&slices);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].platform, "ios");
        assert_eq!(groups[0].slices.len(), 1);
        assert_eq!(groups[1].platform, "ios-simulator");
        assert_eq!(groups[1].slices.len(), 2);

        let toolchain = FakeToolchain::new();
        let merger = ArchitectureMerger::new(&toolchain);
        let work = TempDir::new().unwrap();
        let merged: Vec<_> = groups
            .iter()
            .map(|g| merger.merge(&g.slices, work.path()).unwrap())
            .collect();

        assert_eq!(toolchain.count("lipo", ""), 1);
        assert_eq!(merged[0].framework_path, slices[0].framework_path.clone().unwrap());
        assert_eq!(merged[1].architectures, ["arm64", "x86_64"]);
    }

    #[test]
    fn test_grouping_skips_failures() {
        let temp = TempDir::new().unwrap();
        let sdk = SdkSpec::new(lookup("ios-simulator").unwrap(), "x86_64", None);
        let slices = vec![
            slice(temp.path(), "ios-simulator", "arm64"),
            SliceResult::failed(sdk, "boom"),
        ];
        let groups = group_by_platform(&slices);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].slices.len(), 1);
    }

    #[test]
    fn test_merge_builds_fat_framework() {
        let temp = TempDir::new().unwrap();
        let slices = vec![
            slice(temp.path(), "ios-simulator", "arm64"),
            slice(temp.path(), "ios-simulator", "x86_64"),
        ];
        let toolchain = FakeToolchain::new();
        let work = TempDir::new().unwrap();
        let merged = ArchitectureMerger::new(&toolchain)
            .merge(&slices, work.path())
            .unwrap();

        let fw = &merged.framework_path;
        assert_eq!(
            fw,
            &work.path().join("combined-ios-simulator/Kit.framework")
        );
        assert_eq!(fs::read_to_string(fw.join("Kit")).unwrap(), "arm64+x86_64");
        assert!(fw.join("Info.plist").is_file());
        assert!(fw.join("Headers/Kit-Swift.h").is_file());
        assert!(fw.join("Kit_Kit.bundle/a.json").is_file());
        let swiftmodule = fw.join("Modules/Kit.swiftmodule");
        assert!(swiftmodule.join("arm64-apple-ios-simulator.swiftinterface").is_file());
        assert!(swiftmodule.join("x86_64-apple-ios-simulator.swiftinterface").is_file());

        let lipo = &toolchain.find("lipo", "-create")[0];
        assert_eq!(lipo.args.iter().filter(|a| a.ends_with("/Kit")).count(), 3);
    }

    #[test]
    fn test_lipo_failure_returns_none() {
        let temp = TempDir::new().unwrap();
        let slices = vec![
            slice(temp.path(), "ios-simulator", "arm64"),
            slice(temp.path(), "ios-simulator", "x86_64"),
        ];
        let toolchain = FakeToolchain::new().fail_when("lipo", "-create");
        let work = TempDir::new().unwrap();
        assert!(ArchitectureMerger::new(&toolchain)
            .merge(&slices, work.path())
            .is_none());
    }

    #[test]
    fn test_missing_binary_returns_none() {
        let temp = TempDir::new().unwrap();
        let slices = vec![
            slice(temp.path(), "ios-simulator", "arm64"),
            slice(temp.path(), "ios-simulator", "x86_64"),
        ];
        fs::remove_file(slices[1].framework_path.as_ref().unwrap().join("Kit")).unwrap();
        let toolchain = FakeToolchain::new();
        let work = TempDir::new().unwrap();
        assert!(ArchitectureMerger::new(&toolchain)
            .merge(&slices, work.path())
            .is_none());
        assert_eq!(toolchain.count("lipo", ""), 0);
    }

    #[test]
    fn test_empty_input() {
        let toolchain = FakeToolchain::new();
        assert!(ArchitectureMerger::new(&toolchain)
            .merge(&[], &PathBuf::from("/unused"))
            .is_none());
    }
}
