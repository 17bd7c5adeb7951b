//! Core types for xcforge-sdk.
//!
//! This module defines the values that flow through the build pipeline:
//!
//! - [`XcforgeError`] - Error type for configuration, toolchain and filesystem failures
//! - [`BuildConfiguration`] - Debug or release compilation
//! - [`BuildContext`] - Verbosity, streaming, parallelism and timeout settings
//! - [`BuildTarget`] - The library unit being compiled
//! - [`SliceResult`] / [`MergedSlice`] / [`ArchiveResult`] - Per-unit outcomes
//! - [`AssemblyResult`] / [`PackageBuildResult`] - Pipeline outcomes returned to callers
//! - [`ProjectBuildConfig`] / [`PackageBuildConfig`] - Typed build requests

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::builders::common::sanitize_module_name;
use crate::sdk::SdkSpec;

/// Error types for xcforge-sdk operations.
///
/// Component boundaries never return these for expected failures: a failed
/// compile or link becomes a [`SliceResult`] with `success == false`. The
/// enum is used inside components and for configuration validation, which
/// fails before any external process runs.
#[derive(Debug, thiserror::Error)]
pub enum XcforgeError {
    /// Invalid or missing configuration, such as a missing scheme or an
    /// absent `Package.swift`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown platform identifier or unsupported architecture.
    #[error("platform error: {0}")]
    Platform(String),

    /// An external tool exited non-zero, timed out, or could not be started.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// An expected build artifact is missing (object files, binaries, bundles).
    #[error("resource error: {0}")]
    Resource(String),

    /// Any other build step failure.
    #[error("build error: {0}")]
    Build(String),

    /// An I/O error occurred.
    ///
    /// Common causes include missing files, permission issues, or
    /// disk space problems while assembling bundle fragments.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// JSON deserialization failed, typically for package manifest output.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Build configuration passed to the compiler.
///
/// # Example
///
/// ```
/// use xcforge_sdk::BuildConfiguration;
///
/// let release: BuildConfiguration = "Release".parse().unwrap();
/// assert_eq!(release.as_str(), "release");
/// assert_eq!(release.xcode_name(), "Release");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    /// Unoptimized build with full debug info.
    Debug,
    /// Optimized build, the default for distribution.
    #[default]
    Release,
}

impl BuildConfiguration {
    /// Lowercase name used by `swift build` and its `.build/` directory layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "debug",
            BuildConfiguration::Release => "release",
        }
    }

    /// Capitalized name used by `xcodebuild -configuration`.
    pub fn xcode_name(&self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "Debug",
            BuildConfiguration::Release => "Release",
        }
    }
}

impl FromStr for BuildConfiguration {
    type Err = XcforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildConfiguration::Debug),
            "release" => Ok(BuildConfiguration::Release),
            other => Err(XcforgeError::Config(format!(
                "Invalid configuration: {}\n\nUse 'debug' or 'release'.",
                other
            ))),
        }
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution settings shared by every component of one build.
///
/// Passed by reference instead of living in global state, so concurrent
/// slice builds read the same immutable settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use xcforge_sdk::BuildContext;
///
/// let ctx = BuildContext::new()
///     .verbose(true)
///     .jobs(2)
///     .timeout(Some(Duration::from_secs(900)));
/// assert!(ctx.stream_output);
/// assert_eq!(ctx.jobs, 2);
/// ```
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Emit debug-level progress.
    pub verbose: bool,
    /// Suppress informational progress.
    pub quiet: bool,
    /// Stream tool output to the console instead of buffering it.
    pub stream_output: bool,
    /// Pipe streamed xcodebuild output through xcbeautify/xcpretty when available.
    pub use_formatter: bool,
    /// Maximum number of slices compiled at once. `1` builds sequentially.
    pub jobs: usize,
    /// Upper bound for any single tool invocation.
    pub timeout: Option<Duration>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            verbose: false,
            quiet: false,
            stream_output: false,
            use_formatter: true,
            jobs: 1,
            timeout: None,
        }
    }
}

impl BuildContext {
    /// Creates a context with sequential, buffered, non-verbose defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables verbose output. Verbose builds stream tool output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self.stream_output = verbose;
        self
    }

    /// Suppresses informational output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Overrides whether tool output is streamed.
    pub fn stream_output(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    /// Enables or disables the xcodebuild output formatter.
    pub fn use_formatter(mut self, use_formatter: bool) -> Self {
        self.use_formatter = use_formatter;
        self
    }

    /// Sets the slice parallelism. Zero is treated as one.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Sets the per-invocation timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The library unit being compiled. Immutable once a build starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
    /// Target name as declared in the package manifest.
    pub name: String,
    /// Package name, used to locate the target's resource bundle.
    pub package_name: String,
    /// Requested platform identifiers (e.g. `ios`, `ios-simulator`).
    pub platforms: Vec<String>,
    /// Debug or release.
    pub configuration: BuildConfiguration,
    /// Emit a stable module interface (library evolution).
    pub library_evolution: bool,
}

impl BuildTarget {
    /// Creates a release target with library evolution enabled.
    pub fn new(name: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_name: package_name.into(),
            platforms: vec!["ios".to_string(), "ios-simulator".to_string()],
            configuration: BuildConfiguration::Release,
            library_evolution: true,
        }
    }

    /// Sets the requested platforms.
    pub fn platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the build configuration.
    pub fn configuration(mut self, configuration: BuildConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Enables or disables library evolution.
    pub fn library_evolution(mut self, enabled: bool) -> Self {
        self.library_evolution = enabled;
        self
    }

    /// C99-identifier form of the target name, used for the binary and module.
    pub fn module_name(&self) -> String {
        sanitize_module_name(&self.name)
    }

    /// Name of the resource bundle SwiftPM emits for this target.
    pub fn resource_bundle_name(&self) -> String {
        format!("{}_{}.bundle", self.package_name, self.name)
    }
}

/// Outcome of building one [`SdkSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceResult {
    /// Whether the fragment was fully assembled.
    pub success: bool,
    /// Path to the `.framework` fragment on success.
    pub framework_path: Option<PathBuf>,
    /// The SDK this slice was built for.
    pub sdk: SdkSpec,
    /// Failure description.
    pub error: Option<String>,
}

impl SliceResult {
    /// A successful slice at `framework_path`.
    pub fn succeeded(sdk: SdkSpec, framework_path: PathBuf) -> Self {
        Self {
            success: true,
            framework_path: Some(framework_path),
            sdk,
            error: None,
        }
    }

    /// A failed slice.
    pub fn failed(sdk: SdkSpec, error: impl Into<String>) -> Self {
        Self {
            success: false,
            framework_path: None,
            sdk,
            error: Some(error.into()),
        }
    }
}

/// Several single-architecture slices of one platform combined into a fat slice.
///
/// The framework directory lives in a temporary directory owned by the merge
/// step; the input slices may be discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedSlice {
    /// Path to the merged `.framework` (or the single input for passthrough).
    pub framework_path: PathBuf,
    /// SDK of the first input slice.
    pub sdk: SdkSpec,
    /// Architectures contained in the binary.
    pub architectures: Vec<String>,
}

impl From<MergedSlice> for SliceResult {
    fn from(merged: MergedSlice) -> Self {
        SliceResult::succeeded(merged.sdk, merged.framework_path)
    }
}

/// Outcome of one `xcodebuild archive` run (project path only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveResult {
    /// Whether the archive was produced.
    pub success: bool,
    /// Path to the `.xcarchive` directory on success.
    pub archive_path: Option<PathBuf>,
    /// Platform identifier (e.g. `ios-simulator`).
    pub platform: String,
    /// Human-readable platform name.
    pub platform_name: String,
    /// Debug symbols found inside the archive.
    pub debug_symbols: Option<PathBuf>,
    /// Failure description.
    pub error: Option<String>,
}

/// A pipeline stage, recorded in [`AssemblyResult::stages_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Clean,
    Archive,
    Slice,
    Merge,
    Assemble,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::Archive => "archive",
            Stage::Slice => "slice",
            Stage::Merge => "merge",
            Stage::Assemble => "assemble",
        }
    }
}

/// Final output of one bundle pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyResult {
    /// At least one unit succeeded and bundle creation exited zero.
    pub success: bool,
    /// Path to the produced `.xcframework`.
    pub bundle_path: Option<PathBuf>,
    /// Per-slice outcomes, in request order (package path).
    pub slices: Vec<SliceResult>,
    /// Per-archive outcomes, in request order (project path).
    pub archives: Vec<ArchiveResult>,
    /// Every error encountered, including those of units that were skipped.
    pub errors: Vec<String>,
    /// Stages that ran to completion.
    pub stages_completed: Vec<Stage>,
}

impl AssemblyResult {
    /// A failed result carrying a single error.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

/// Outcome of [`crate::BuildOrchestrator::build_from_package`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageBuildResult {
    /// At least one target produced a bundle.
    pub success: bool,
    /// Produced bundles, one per completed target.
    pub bundle_paths: Vec<PathBuf>,
    /// Errors from every target.
    pub errors: Vec<String>,
    /// Names of targets that produced a bundle.
    pub targets_completed: Vec<String>,
    /// Per-target pipeline results.
    pub targets: Vec<TargetOutcome>,
}

/// Pipeline result for one named package target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    pub result: AssemblyResult,
}

/// Request for the Xcode project path.
///
/// Identifying fields are optional so that their absence is reported by
/// [`ProjectBuildConfig::validate`] instead of at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBuildConfig {
    /// Path to the `.xcodeproj`.
    pub project_path: Option<PathBuf>,
    /// Scheme to archive.
    pub scheme: Option<String>,
    /// Name of the produced framework.
    pub framework_name: Option<String>,
    /// Directory receiving archives and the bundle.
    pub output_dir: Option<PathBuf>,
    /// Platform identifiers to archive.
    pub platforms: Vec<String>,
    /// Remove earlier archives and bundles first.
    pub clean: bool,
    /// Pass `-debug-symbols` for each archive's dSYM.
    pub include_debug_symbols: bool,
    /// Xcode build configuration.
    pub configuration: BuildConfiguration,
    /// Per-platform deployment target overrides.
    pub deployment_targets: BTreeMap<String, String>,
    /// Per-platform architecture subsets; absent platforms build all.
    pub architectures: BTreeMap<String, Vec<String>>,
    /// Extra `KEY=VALUE` build settings.
    pub build_settings: BTreeMap<String, String>,
}

impl Default for ProjectBuildConfig {
    fn default() -> Self {
        Self {
            project_path: None,
            scheme: None,
            framework_name: None,
            output_dir: None,
            platforms: vec!["ios".to_string(), "ios-simulator".to_string()],
            clean: true,
            include_debug_symbols: true,
            configuration: BuildConfiguration::Release,
            deployment_targets: BTreeMap::new(),
            architectures: BTreeMap::new(),
            build_settings: BTreeMap::new(),
        }
    }
}

impl ProjectBuildConfig {
    /// Checks that every identifying field is present.
    pub fn validate(&self) -> Result<ValidProjectConfig<'_>, XcforgeError> {
        let mut missing = Vec::new();
        if self.project_path.is_none() {
            missing.push("project_path");
        }
        if self.scheme.as_deref().is_none_or(str::is_empty) {
            missing.push("scheme");
        }
        if self.framework_name.as_deref().is_none_or(str::is_empty) {
            missing.push("framework_name");
        }
        if self.output_dir.is_none() {
            missing.push("output_dir");
        }
        if self.platforms.is_empty() {
            missing.push("platforms");
        }

        match (
            &self.project_path,
            &self.scheme,
            &self.framework_name,
            &self.output_dir,
        ) {
            (Some(project_path), Some(scheme), Some(framework_name), Some(output_dir))
                if missing.is_empty() =>
            {
                Ok(ValidProjectConfig {
                    project_path,
                    scheme,
                    framework_name,
                    output_dir,
                })
            }
            _ => Err(XcforgeError::Config(format!(
                "Missing required configuration keys: {}\n\n\
                 Provide them via command-line options or a configuration file.",
                missing.join(", ")
            ))),
        }
    }
}

/// A [`ProjectBuildConfig`] whose identifying fields are known to be present.
#[derive(Debug, Clone, Copy)]
pub struct ValidProjectConfig<'a> {
    pub project_path: &'a PathBuf,
    pub scheme: &'a str,
    pub framework_name: &'a str,
    pub output_dir: &'a PathBuf,
}

/// Request for the Swift package path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageBuildConfig {
    /// Directory containing `Package.swift`.
    pub package_dir: PathBuf,
    /// Targets to build; empty means every library target.
    pub targets: Vec<String>,
    /// Platform identifiers.
    pub platforms: Vec<String>,
    /// Directory receiving `<Target>.xcframework`.
    pub output_dir: PathBuf,
    /// Debug or release.
    pub configuration: BuildConfiguration,
    /// Emit stable module interfaces.
    pub library_evolution: bool,
    /// OS version applied to every platform, overriding the package manifest.
    pub version: Option<String>,
    /// Per-platform OS version overrides; win over `version`.
    pub deployment_targets: BTreeMap<String, String>,
}

impl Default for PackageBuildConfig {
    fn default() -> Self {
        Self {
            package_dir: PathBuf::from("."),
            targets: Vec::new(),
            platforms: vec!["ios".to_string(), "ios-simulator".to_string()],
            output_dir: PathBuf::from("build"),
            configuration: BuildConfiguration::Release,
            library_evolution: true,
            version: None,
            deployment_targets: BTreeMap::new(),
        }
    }
}
