//! Concrete compilation targets.
//!
//! A [`SdkSpec`] is one (platform, architecture) pair. Platforms with several
//! valid architectures fan out into several specs, one slice each.

use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use crate::platform::Platform;
use crate::toolchain::{Invocation, Toolchain};
use crate::types::XcforgeError;

const VENDOR: &str = "apple";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkSpec {
    #[serde(serialize_with = "serialize_platform")]
    pub platform: &'static Platform,
    pub architecture: String,
    /// Minimum OS version embedded in the versioned triple.
    pub version: Option<String>,
}

fn serialize_platform<S: Serializer>(platform: &&'static Platform, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(platform.identifier)
}

impl SdkSpec {
    pub fn new(
        platform: &'static Platform,
        architecture: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            platform,
            architecture: architecture.into(),
            version,
        }
    }

    /// One spec per valid architecture of `platform`, in registry order.
    pub fn for_platform(platform: &'static Platform, version: Option<&str>) -> Vec<SdkSpec> {
        platform
            .architectures
            .iter()
            .map(|arch| SdkSpec::new(platform, *arch, version.map(str::to_string)))
            .collect()
    }

    pub fn vendor(&self) -> &'static str {
        VENDOR
    }

    pub fn is_simulator(&self) -> bool {
        self.platform.is_simulator()
    }

    /// `{arch}-apple-{family}[{version}][-simulator|-macabi]`.
    ///
    /// The non-versioned form names SwiftPM's build directory; the versioned
    /// form is what the compiler receives.
    pub fn triple(&self, with_version: bool) -> String {
        let mut triple = format!("{}-{}-{}", self.architecture, VENDOR, self.platform.family);
        if let (true, Some(version)) = (with_version, &self.version) {
            triple.push_str(version);
        }
        if let Some(suffix) = self.platform.environment.triple_suffix() {
            triple.push('-');
            triple.push_str(suffix);
        }
        triple
    }

    /// Grouping key for merging: slices sharing it become one fat slice.
    pub fn platform_key(&self) -> &'static str {
        self.platform.identifier
    }

    /// Asks `xcrun` for the SDK root.
    pub fn resolve_sdk_path(&self, toolchain: &dyn Toolchain) -> Result<PathBuf, XcforgeError> {
        let invocation = Invocation::new("xcrun")
            .args(["--sdk", self.platform.sdk_name, "--show-sdk-path"]);
        let output = toolchain.run(&invocation);
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "Failed to get SDK path for {}: {}",
                self.platform.sdk_name,
                output.error_message()
            )));
        }
        let path = output.stdout.trim();
        if path.is_empty() {
            return Err(XcforgeError::Toolchain(format!(
                "xcrun returned an empty SDK path for {}",
                self.platform.sdk_name
            )));
        }
        Ok(PathBuf::from(path))
    }

    /// Search-path flags for the platform developer directory next to `sdk_path`.
    pub fn developer_search_flags(sdk_path: &Path) -> Vec<String> {
        let developer = sdk_path
            .parent()
            .and_then(Path::parent)
            .unwrap_or(sdk_path);
        vec![
            format!("-F{}", developer.join("Library").join("Frameworks").display()),
            format!("-I{}", developer.join("usr").join("lib").display()),
        ]
    }
}
