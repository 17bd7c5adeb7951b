//! Configuration file support for xcforge.
//!
//! This module provides support for `xcforge.toml` configuration files that
//! persist project settings so they don't have to be passed as flags on
//! every invocation.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! In each directory the names in [`CONFIG_FILE_NAMES`] are tried in order,
//! so `xcforge.toml` wins over `.xcforge.yml`, `.xcforge.yaml` and
//! `.xcforge.json`.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! xcode_project = "SDK.xcodeproj"
//! scheme = "SDK"
//! framework_name = "SDK"
//!
//! [build]
//! output_dir = "build"
//! configuration = "release"
//! platforms = ["ios", "ios-simulator"]
//!
//! [build.deployment_targets]
//! ios = "15.0"
//!
//! [package]
//! path = "."
//! targets = ["Widgets"]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use xcforge_sdk::BuildConfiguration;
use xcforge_sdk::platform;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "xcforge.toml";

/// Every accepted configuration file name, in lookup order.
pub const CONFIG_FILE_NAMES: &[&str] = &[CONFIG_FILE_NAME, ".xcforge.yml", ".xcforge.yaml", ".xcforge.json"];

/// Serialization format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yml") | Some("yaml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => bail!(
                "Unsupported config file extension: {:?}\n\nUse .toml, .yml, .yaml or .json.",
                path
            ),
        }
    }
}

/// Root configuration structure for `xcforge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcforgeConfig {
    /// Xcode project settings for `xcforge build`.
    pub project: ProjectSection,

    /// Settings shared by both build paths.
    pub build: BuildSection,

    /// Swift package settings for `xcforge package`.
    pub package: PackageSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Path to the `.xcodeproj`.
    pub xcode_project: Option<PathBuf>,

    /// Scheme to archive.
    pub scheme: Option<String>,

    /// Framework name inside the archives. Defaults to the scheme.
    pub framework_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Directory receiving archives and bundles.
    ///
    /// Defaults to `build`.
    pub output_dir: PathBuf,

    /// `debug` or `release`.
    pub configuration: String,

    /// Platform identifiers, see `xcforge platforms`.
    pub platforms: Vec<String>,

    pub clean_before_build: bool,
    pub include_debug_symbols: bool,
    pub library_evolution: bool,

    /// Pipe xcodebuild output through xcbeautify/xcpretty when streaming.
    pub use_formatter: bool,

    /// Slices compiled at once.
    pub jobs: usize,

    /// Upper bound for one tool invocation.
    pub timeout_secs: Option<u64>,

    /// Platform identifier → minimum OS version.
    pub deployment_targets: BTreeMap<String, String>,

    /// Platform identifier → archived architectures.
    pub architectures: BTreeMap<String, Vec<String>>,

    /// Extra `KEY=VALUE` settings for `xcodebuild archive`.
    pub build_settings: BTreeMap<String, String>,

    pub verbose: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("build"),
            configuration: "release".to_string(),
            platforms: vec!["ios".to_string(), "ios-simulator".to_string()],
            clean_before_build: true,
            include_debug_symbols: true,
            library_evolution: true,
            use_formatter: true,
            jobs: 1,
            timeout_secs: None,
            deployment_targets: BTreeMap::new(),
            architectures: BTreeMap::new(),
            build_settings: BTreeMap::new(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSection {
    /// Directory containing `Package.swift`.
    pub path: PathBuf,

    /// Targets to build. Empty means every library target.
    pub targets: Vec<String>,

    /// OS version applied to every platform.
    pub version: Option<String>,
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            targets: Vec::new(),
            version: None,
        }
    }
}

impl XcforgeConfig {
    /// Loads configuration from the specified file path.
    ///
    /// The format follows the extension. Relative paths inside the file are
    /// rebased onto the file's directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: XcforgeConfig = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?,
            ConfigFormat::Json => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?,
        };

        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            for name in CONFIG_FILE_NAMES {
                let config_path = current.join(name);
                if config_path.is_file() {
                    let config = Self::load_from_file(&config_path)?;
                    return Ok(Some((config, config_path)));
                }
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Saves the configuration in the format matching the extension of `path`.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(self).context("Failed to serialize configuration")?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).context("Failed to serialize configuration")?,
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize configuration")?
            }
        };

        std::fs::write(path, contents).with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Checks values that would otherwise only fail once tools are running.
    pub fn validate(&self) -> Result<()> {
        if self.build.platforms.is_empty() {
            bail!("build.platforms must list at least one platform");
        }
        platform::resolve_all(&self.build.platforms)?;
        for id in self.build.deployment_targets.keys() {
            if platform::lookup(id).is_none() {
                bail!("build.deployment_targets names an unknown platform: {}", id);
            }
        }
        for (id, archs) in &self.build.architectures {
            let Some(platform) = platform::lookup(id) else {
                bail!("build.architectures names an unknown platform: {}", id);
            };
            platform.build_settings(Some(archs.as_slice()), None)?;
        }
        self.configuration()?;
        if self.build.jobs == 0 {
            bail!("build.jobs must be at least 1");
        }
        Ok(())
    }

    pub fn configuration(&self) -> Result<BuildConfiguration> {
        Ok(self.build.configuration.parse::<BuildConfiguration>()?)
    }

    fn rebase(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(project) = self.project.xcode_project.as_mut() {
            rebase(project);
        }
        rebase(&mut self.build.output_dir);
        rebase(&mut self.package.path);
    }

    /// A starter configuration for the given scheme.
    pub fn starter(scheme: &str) -> Self {
        Self {
            project: ProjectSection {
                xcode_project: Some(PathBuf::from(format!("{}.xcodeproj", scheme))),
                scheme: Some(scheme.to_string()),
                framework_name: Some(scheme.to_string()),
            },
            ..Self::default()
        }
    }

    /// Generates a starter configuration file as a commented TOML string.
    pub fn generate_starter_toml(scheme: &str) -> String {
        format!(
            r#"# xcforge configuration file
# CLI flags override these settings when provided.

[project]
# Xcode project archived by `xcforge build`
xcode_project = "{scheme}.xcodeproj"

# Scheme to archive
scheme = "{scheme}"

# Framework produced by the scheme (defaults to the scheme name)
framework_name = "{scheme}"

[build]
# Directory receiving archives and .xcframework bundles
output_dir = "build"

# "debug" or "release"
configuration = "release"

# Platforms to build; run `xcforge platforms` for the full list
platforms = ["ios", "ios-simulator"]

# Remove earlier archives and bundles first
clean_before_build = true

# Embed archive dSYMs in the bundle (`xcforge build`)
include_debug_symbols = true

# Emit stable module interfaces (BUILD_LIBRARY_FOR_DISTRIBUTION)
library_evolution = true

# Pipe xcodebuild output through xcbeautify or xcpretty when streaming
use_formatter = true

# Framework slices compiled at once (1 = sequential)
jobs = 1

# Kill any single tool invocation after this many seconds
# timeout_secs = 1800

[build.deployment_targets]
# ios = "15.0"
# ios-simulator = "15.0"

[build.architectures]
# Archive only these architectures (default: all valid ones)
# ios-simulator = ["arm64"]

[package]
# Directory containing Package.swift for `xcforge package`
path = "."

# Targets to build (default: every library target)
# targets = ["{scheme}"]
"#,
            scheme = scheme,
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<XcforgeConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads `explicit` when given, otherwise discovers a config file.
    ///
    /// If no config file is found, the resolver uses default values which can
    /// be overridden by CLI arguments.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let found = match explicit {
            Some(path) => Some((XcforgeConfig::load_from_file(path)?, path.to_path_buf())),
            None => XcforgeConfig::discover()?,
        };

        let resolver = match found {
            Some((config, path)) => {
                config
                    .validate()
                    .with_context(|| format!("Invalid config file: {:?}", path))?;
                log::debug!("Using configuration from {}", path.display());
                Self {
                    config: Some(config),
                    config_path: Some(path),
                }
            }
            None => Self::default(),
        };
        Ok(resolver)
    }

    pub fn from_config(config: XcforgeConfig) -> Self {
        Self {
            config: Some(config),
            config_path: None,
        }
    }

    /// Build settings from the file, or the defaults.
    pub fn build(&self) -> BuildSection {
        self.config
            .as_ref()
            .map(|c| c.build.clone())
            .unwrap_or_default()
    }

    pub fn project(&self) -> ProjectSection {
        self.config
            .as_ref()
            .map(|c| c.project.clone())
            .unwrap_or_default()
    }

    pub fn package(&self) -> PackageSection {
        self.config
            .as_ref()
            .map(|c| c.package.clone())
            .unwrap_or_default()
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// The resolved value prefers CLI over config over `default`.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&XcforgeConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}
