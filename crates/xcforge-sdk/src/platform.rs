//! Platform registry.
//!
//! Every supported platform is one row of [`PLATFORMS`]. Adding a platform
//! means adding a row; nothing else in the crate matches on identifiers.
//!
//! | Identifier           | SDK                | Architectures       | Default target |
//! |----------------------|--------------------|---------------------|----------------|
//! | `ios`                | `iphoneos`         | arm64               | 14.0           |
//! | `ios-simulator`      | `iphonesimulator`  | arm64, x86_64       | 14.0           |
//! | `macos`              | `macosx`           | arm64, x86_64       | 11.0           |
//! | `catalyst`           | `macosx`           | arm64, x86_64       | 14.0           |
//! | `tvos`               | `appletvos`        | arm64               | 14.0           |
//! | `tvos-simulator`     | `appletvsimulator` | arm64, x86_64       | 14.0           |
//! | `watchos`            | `watchos`          | arm64_32, armv7k    | 7.0            |
//! | `watchos-simulator`  | `watchsimulator`   | arm64, x86_64       | 7.0            |
//! | `visionos`           | `xros`             | arm64               | 1.0            |
//! | `visionos-simulator` | `xrsimulator`      | arm64               | 1.0            |

use serde::Serialize;

use crate::types::XcforgeError;

/// Which flavour of an OS family an SDK targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SdkEnvironment {
    Device,
    Simulator,
    MacCatalyst,
}

impl SdkEnvironment {
    /// Trailing triple component, if any.
    pub fn triple_suffix(&self) -> Option<&'static str> {
        match self {
            SdkEnvironment::Device => None,
            SdkEnvironment::Simulator => Some("simulator"),
            SdkEnvironment::MacCatalyst => Some("macabi"),
        }
    }
}

/// One row of the platform registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// Identifier used in configuration (`ios-simulator`).
    pub identifier: &'static str,
    /// Human-readable name (`iOS Simulator`).
    pub display_name: &'static str,
    /// SDK passed to `xcrun --sdk`.
    pub sdk_name: &'static str,
    /// `xcodebuild -destination` value.
    pub destination: &'static str,
    /// Valid architectures; the first is the primary one.
    pub architectures: &'static [&'static str],
    pub default_deployment_target: &'static str,
    /// Build setting carrying the deployment target.
    pub deployment_target_key: &'static str,
    /// OS component of the target triple.
    pub family: &'static str,
    pub environment: SdkEnvironment,
    /// `CFBundleSupportedPlatforms` value.
    pub plist_platform: &'static str,
    /// Suffix of archives built for this platform (`<scheme>-<suffix>.xcarchive`).
    pub archive_suffix: &'static str,
    /// `platformName` used by `swift package dump-package`.
    pub package_platform: &'static str,
}

pub const PLATFORMS: &[Platform] = &[
    Platform {
        identifier: "ios",
        display_name: "iOS",
        sdk_name: "iphoneos",
        destination: "generic/platform=iOS",
        architectures: &["arm64"],
        default_deployment_target: "14.0",
        deployment_target_key: "IPHONEOS_DEPLOYMENT_TARGET",
        family: "ios",
        environment: SdkEnvironment::Device,
        plist_platform: "iPhoneOS",
        archive_suffix: "iOS",
        package_platform: "ios",
    },
    Platform {
        identifier: "ios-simulator",
        display_name: "iOS Simulator",
        sdk_name: "iphonesimulator",
        destination: "generic/platform=iOS Simulator",
        architectures: &["arm64", "x86_64"],
        default_deployment_target: "14.0",
        deployment_target_key: "IPHONEOS_DEPLOYMENT_TARGET",
        family: "ios",
        environment: SdkEnvironment::Simulator,
        plist_platform: "iPhoneSimulator",
        archive_suffix: "iOS-Simulator",
        package_platform: "ios",
    },
    Platform {
        identifier: "macos",
        display_name: "macOS",
        sdk_name: "macosx",
        destination: "generic/platform=macOS",
        architectures: &["arm64", "x86_64"],
        default_deployment_target: "11.0",
        deployment_target_key: "MACOSX_DEPLOYMENT_TARGET",
        family: "macos",
        environment: SdkEnvironment::Device,
        plist_platform: "MacOSX",
        archive_suffix: "macOS",
        package_platform: "macos",
    },
    Platform {
        identifier: "catalyst",
        display_name: "Mac Catalyst",
        sdk_name: "macosx",
        destination: "generic/platform=macOS,variant=Mac Catalyst",
        architectures: &["arm64", "x86_64"],
        default_deployment_target: "14.0",
        deployment_target_key: "IPHONEOS_DEPLOYMENT_TARGET",
        family: "ios",
        environment: SdkEnvironment::MacCatalyst,
        plist_platform: "MacOSX",
        archive_suffix: "macOS-Catalyst",
        package_platform: "maccatalyst",
    },
    Platform {
        identifier: "tvos",
        display_name: "tvOS",
        sdk_name: "appletvos",
        destination: "generic/platform=tvOS",
        architectures: &["arm64"],
        default_deployment_target: "14.0",
        deployment_target_key: "TVOS_DEPLOYMENT_TARGET",
        family: "tvos",
        environment: SdkEnvironment::Device,
        plist_platform: "AppleTVOS",
        archive_suffix: "tvOS",
        package_platform: "tvos",
    },
    Platform {
        identifier: "tvos-simulator",
        display_name: "tvOS Simulator",
        sdk_name: "appletvsimulator",
        destination: "generic/platform=tvOS Simulator",
        architectures: &["arm64", "x86_64"],
        default_deployment_target: "14.0",
        deployment_target_key: "TVOS_DEPLOYMENT_TARGET",
        family: "tvos",
        environment: SdkEnvironment::Simulator,
        plist_platform: "AppleTVSimulator",
        archive_suffix: "tvOS-Simulator",
        package_platform: "tvos",
    },
    Platform {
        identifier: "watchos",
        display_name: "watchOS",
        sdk_name: "watchos",
        destination: "generic/platform=watchOS",
        architectures: &["arm64_32", "armv7k"],
        default_deployment_target: "7.0",
        deployment_target_key: "WATCHOS_DEPLOYMENT_TARGET",
        family: "watchos",
        environment: SdkEnvironment::Device,
        plist_platform: "WatchOS",
        archive_suffix: "watchOS",
        package_platform: "watchos",
    },
    Platform {
        identifier: "watchos-simulator",
        display_name: "watchOS Simulator",
        sdk_name: "watchsimulator",
        destination: "generic/platform=watchOS Simulator",
        architectures: &["arm64", "x86_64"],
        default_deployment_target: "7.0",
        deployment_target_key: "WATCHOS_DEPLOYMENT_TARGET",
        family: "watchos",
        environment: SdkEnvironment::Simulator,
        plist_platform: "WatchSimulator",
        archive_suffix: "watchOS-Simulator",
        package_platform: "watchos",
    },
    Platform {
        identifier: "visionos",
        display_name: "visionOS",
        sdk_name: "xros",
        destination: "generic/platform=visionOS",
        architectures: &["arm64"],
        default_deployment_target: "1.0",
        deployment_target_key: "XROS_DEPLOYMENT_TARGET",
        family: "xros",
        environment: SdkEnvironment::Device,
        plist_platform: "XROS",
        archive_suffix: "visionOS",
        package_platform: "visionos",
    },
    Platform {
        identifier: "visionos-simulator",
        display_name: "visionOS Simulator",
        sdk_name: "xrsimulator",
        destination: "generic/platform=visionOS Simulator",
        architectures: &["arm64"],
        default_deployment_target: "1.0",
        deployment_target_key: "XROS_DEPLOYMENT_TARGET",
        family: "xros",
        environment: SdkEnvironment::Simulator,
        plist_platform: "XRSimulator",
        archive_suffix: "visionOS-Simulator",
        package_platform: "visionos",
    },
];

/// Finds a platform by identifier.
pub fn lookup(identifier: &str) -> Option<&'static Platform> {
    PLATFORMS.iter().find(|p| p.identifier == identifier)
}

/// All known identifiers, in registry order.
pub fn identifiers() -> impl Iterator<Item = &'static str> {
    PLATFORMS.iter().map(|p| p.identifier)
}

/// Resolves every identifier, failing on the first unknown one.
///
/// Repeated identifiers resolve once, at their first position.
pub fn resolve_all<S: AsRef<str>>(identifiers: &[S]) -> Result<Vec<&'static Platform>, XcforgeError> {
    let mut platforms: Vec<&'static Platform> = Vec::with_capacity(identifiers.len());
    for id in identifiers {
        let id = id.as_ref();
        let platform = lookup(id).ok_or_else(|| unknown_platform(id))?;
        if !platforms.iter().any(|p| p.identifier == platform.identifier) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

/// `identifiers` without repeats, first occurrence kept.
pub fn unique_ids<S: AsRef<str>>(identifiers: &[S]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(identifiers.len());
    for id in identifiers {
        if !unique.iter().any(|u| u == id.as_ref()) {
            unique.push(id.as_ref().to_string());
        }
    }
    unique
}

/// Infers the platform of an archive from its `-<suffix>.xcarchive` name.
pub fn from_archive_name(file_name: &str) -> Option<&'static Platform> {
    let stem = file_name.strip_suffix(".xcarchive")?;
    PLATFORMS
        .iter()
        .filter(|p| stem.ends_with(&format!("-{}", p.archive_suffix)))
        .max_by_key(|p| p.archive_suffix.len())
}

fn unknown_platform(id: &str) -> XcforgeError {
    XcforgeError::Platform(format!(
        "Unknown platform identifier: {}\n\nUse one of: {}",
        id,
        identifiers().collect::<Vec<_>>().join(", ")
    ))
}

impl Platform {
    pub fn supports_architecture(&self, arch: &str) -> bool {
        self.architectures.contains(&arch)
    }

    pub fn is_simulator(&self) -> bool {
        self.environment == SdkEnvironment::Simulator
    }

    /// `xcodebuild` settings for an archive build of this platform.
    ///
    /// `architectures` defaults to every valid architecture and
    /// `deployment_target` to the registry default.
    pub fn build_settings(
        &self,
        architectures: Option<&[String]>,
        deployment_target: Option<&str>,
    ) -> Result<Vec<(String, String)>, XcforgeError> {
        let archs: Vec<&str> = match architectures {
            Some(archs) => archs.iter().map(String::as_str).collect(),
            None => self.architectures.to_vec(),
        };

        let invalid: Vec<&str> = archs
            .iter()
            .copied()
            .filter(|a| !self.supports_architecture(a))
            .collect();
        if !invalid.is_empty() {
            return Err(XcforgeError::Platform(format!(
                "Invalid architectures for {}: {}. Valid architectures: {}",
                self.display_name,
                invalid.join(", "),
                self.architectures.join(", ")
            )));
        }

        Ok(vec![
            ("ARCHS".to_string(), archs.join(" ")),
            ("ONLY_ACTIVE_ARCH".to_string(), "NO".to_string()),
            ("BUILD_LIBRARY_FOR_DISTRIBUTION".to_string(), "YES".to_string()),
            ("SKIP_INSTALL".to_string(), "NO".to_string()),
            (
                self.deployment_target_key.to_string(),
                deployment_target
                    .unwrap_or(self.default_deployment_target)
                    .to_string(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let sim = lookup("ios-simulator").unwrap();
        assert_eq!(sim.sdk_name, "iphonesimulator");
        assert_eq!(sim.destination, "generic/platform=iOS Simulator");
        assert_eq!(sim.architectures, &["arm64", "x86_64"]);
        assert!(sim.is_simulator());
        assert!(lookup("android").is_none());
    }

    #[test]
    fn test_identifiers_are_unique() {
        let mut ids: Vec<_> = identifiers().collect();
        let count = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[test]
    fn test_resolve_all_names_valid_ids() {
        let err = resolve_all(&["ios", "symbian"]).unwrap_err().to_string();
        assert!(err.contains("symbian"));
        assert!(err.contains("ios-simulator"));
    }

    #[test]
    fn test_repeated_ids_resolve_once() {
        let platforms = resolve_all(&["ios-simulator", "ios", "ios-simulator"]).unwrap();
        let ids: Vec<_> = platforms.iter().map(|p| p.identifier).collect();
        assert_eq!(ids, ["ios-simulator", "ios"]);
        assert_eq!(unique_ids(&["macos", "ios", "macos"]), ["macos", "ios"]);
    }

    #[test]
    fn test_build_settings_defaults() {
        let settings = lookup("ios").unwrap().build_settings(None, None).unwrap();
        assert!(settings.contains(&("ARCHS".to_string(), "arm64".to_string())));
        assert!(settings.contains(&(
            "IPHONEOS_DEPLOYMENT_TARGET".to_string(),
            "14.0".to_string()
        )));
        assert!(settings.contains(&("SKIP_INSTALL".to_string(), "NO".to_string())));
    }

    #[test]
    fn test_build_settings_override_and_validation() {
        let ios = lookup("ios").unwrap();
        let settings = ios.build_settings(None, Some("15.0")).unwrap();
        assert!(settings.contains(&(
            "IPHONEOS_DEPLOYMENT_TARGET".to_string(),
            "15.0".to_string()
        )));

        let err = ios
            .build_settings(Some(&["x86_64".to_string()]), None)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid architectures for iOS"));
    }

    #[test]
    fn test_archive_name_inference() {
        assert_eq!(
            from_archive_name("SDK-iOS.xcarchive").unwrap().identifier,
            "ios"
        );
        assert_eq!(
            from_archive_name("SDK-iOS-Simulator.xcarchive")
                .unwrap()
                .identifier,
            "ios-simulator"
        );
        assert_eq!(
            from_archive_name("SDK-macOS-Catalyst.xcarchive")
                .unwrap()
                .identifier,
            "catalyst"
        );
        assert!(from_archive_name("SDK.xcarchive").is_none());
    }
}
