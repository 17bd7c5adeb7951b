//! Swift package manifest inspection via `swift package dump-package`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builders::common::path_arg;
use crate::toolchain::{Invocation, Toolchain};
use crate::types::XcforgeError;

/// Target kinds reported by SwiftPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Regular,
    Executable,
    Test,
    Binary,
    Macro,
    Plugin,
    System,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTarget {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
}

impl PackageTarget {
    /// Only regular targets can be packaged as a framework.
    pub fn is_library(&self) -> bool {
        self.kind == TargetKind::Regular
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRequirement {
    #[serde(rename = "platformName")]
    pub platform_name: String,
    pub version: String,
}

/// The parts of the package manifest the build needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default)]
    pub platforms: Vec<PlatformRequirement>,
    #[serde(default)]
    pub targets: Vec<PackageTarget>,
    #[serde(skip)]
    pub root: PathBuf,
}

impl PackageDescriptor {
    /// Reads the manifest of the package at `root`.
    pub fn load(toolchain: &dyn Toolchain, root: &Path) -> Result<Self, XcforgeError> {
        let manifest = root.join("Package.swift");
        if !manifest.is_file() {
            return Err(XcforgeError::Config(format!(
                "No Package.swift found in {}\n\n\
                 Pass --package-dir pointing at a Swift package.",
                root.display()
            )));
        }

        let output = toolchain.run(
            &Invocation::new("swift")
                .args(["package", "dump-package", "--package-path"])
                .arg(path_arg(root)),
        );
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "Failed to read Package.swift in {}: {}",
                root.display(),
                output.error_message()
            )));
        }

        Self::from_json(root, &output.stdout)
    }

    pub fn from_json(root: &Path, json: &str) -> Result<Self, XcforgeError> {
        let mut descriptor: PackageDescriptor = serde_json::from_str(json)?;
        descriptor.root = root.to_path_buf();
        Ok(descriptor)
    }

    pub fn target(&self, name: &str) -> Option<&PackageTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn library_targets(&self) -> Vec<&PackageTarget> {
        self.targets.iter().filter(|t| t.is_library()).collect()
    }

    /// Declared minimum version for a `platformName` such as `ios`.
    pub fn platform_version(&self, platform_name: &str) -> Option<&str> {
        self.platforms
            .iter()
            .find(|p| p.platform_name == platform_name)
            .map(|p| p.version.as_str())
    }
}
