//! `xcodebuild archive` for Xcode projects.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::assemble::{archive_debug_symbols_path, archive_framework_path};
use super::common::{path_arg, read_dir_sorted};
use crate::platform::{self, Platform};
use crate::toolchain::{Invocation, Toolchain};
use crate::types::{ArchiveResult, BuildConfiguration, BuildContext, XcforgeError};

/// Archives one scheme per platform into `<output>/<scheme>-<suffix>.xcarchive`.
pub struct Archiver<'a> {
    toolchain: &'a dyn Toolchain,
    ctx: &'a BuildContext,
    project_path: PathBuf,
    scheme: String,
    framework_name: String,
    output_dir: PathBuf,
    configuration: BuildConfiguration,
    architectures: BTreeMap<String, Vec<String>>,
    extra_settings: BTreeMap<String, String>,
}

impl<'a> Archiver<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        ctx: &'a BuildContext,
        project_path: impl Into<PathBuf>,
        scheme: impl Into<String>,
        framework_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            toolchain,
            ctx,
            project_path: project_path.into(),
            scheme: scheme.into(),
            framework_name: framework_name.into(),
            output_dir: output_dir.into(),
            configuration: BuildConfiguration::Release,
            architectures: BTreeMap::new(),
            extra_settings: BTreeMap::new(),
        }
    }

    pub fn configuration(mut self, configuration: BuildConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Per-platform `ARCHS`, keyed by platform identifier. Platforms not
    /// listed build every architecture the registry allows.
    pub fn architectures(mut self, architectures: BTreeMap<String, Vec<String>>) -> Self {
        self.architectures = architectures;
        self
    }

    /// Additional `KEY=VALUE` settings appended after the platform settings.
    pub fn build_settings(mut self, settings: BTreeMap<String, String>) -> Self {
        self.extra_settings = settings;
        self
    }

    /// Path passed to `-archivePath`; xcodebuild appends `.xcarchive`.
    pub fn archive_base_path(&self, platform: &Platform) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}", self.scheme, platform.archive_suffix))
    }

    pub fn derived_data_path(&self) -> PathBuf {
        self.output_dir.join("DerivedData")
    }

    /// Archives each platform in order.
    ///
    /// Runs sequentially: all archives share one derived data directory.
    pub fn build_archives(
        &self,
        platform_ids: &[String],
        deployment_targets: &BTreeMap<String, String>,
    ) -> Vec<ArchiveResult> {
        platform_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                log::info!("[{}/{}] Archiving {} for {}", i + 1, platform_ids.len(), self.scheme, id);
                self.build_archive(id, deployment_targets.get(id).map(String::as_str))
            })
            .collect()
    }

    pub fn build_archive(&self, platform_id: &str, deployment_target: Option<&str>) -> ArchiveResult {
        let failed = |name: &str, error: String| ArchiveResult {
            success: false,
            archive_path: None,
            platform: platform_id.to_string(),
            platform_name: name.to_string(),
            debug_symbols: None,
            error: Some(error),
        };

        let Some(platform) = platform::lookup(platform_id) else {
            return failed(
                platform_id,
                platform::resolve_all(&[platform_id])
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            );
        };

        match self.try_archive(platform, deployment_target) {
            Ok(archive) => {
                let debug_symbols = Some(archive_debug_symbols_path(&archive, &self.framework_name))
                    .filter(|dsym| dsym.is_dir());
                log::info!("Archive created at {}", archive.display());
                ArchiveResult {
                    success: true,
                    archive_path: Some(archive),
                    platform: platform.identifier.to_string(),
                    platform_name: platform.display_name.to_string(),
                    debug_symbols,
                    error: None,
                }
            }
            Err(e) => {
                log::error!("Archive failed for {}: {}", platform.display_name, e);
                failed(platform.display_name, e.to_string())
            }
        }
    }

    fn try_archive(&self, platform: &Platform, deployment_target: Option<&str>) -> Result<PathBuf, XcforgeError> {
        let archs = self.architectures.get(platform.identifier).map(Vec::as_slice);
        let settings = platform.build_settings(archs, deployment_target)?;
        let base = self.archive_base_path(platform);

        let mut invocation = Invocation::new("xcodebuild")
            .arg("archive")
            .arg("-project")
            .arg(path_arg(&self.project_path))
            .args(["-scheme", self.scheme.as_str()])
            .args(["-destination", platform.destination])
            .arg("-archivePath")
            .arg(path_arg(&base))
            .args(["-configuration", self.configuration.xcode_name()])
            .arg("-derivedDataPath")
            .arg(path_arg(&self.derived_data_path()));
        for (key, value) in settings.iter().map(|(k, v)| (k, v)).chain(&self.extra_settings) {
            invocation = invocation.arg(format!("{}={}", key, value));
        }
        let invocation = invocation.stream(self.ctx.stream_output).formatted(true);

        let output = self.toolchain.run(&invocation);
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "xcodebuild archive failed for {}: {}",
                platform.display_name,
                output.error_message()
            )));
        }

        let archive = PathBuf::from(format!("{}.xcarchive", base.display()));
        if !archive.is_dir() {
            return Err(XcforgeError::Resource(format!(
                "Archive not found at {}",
                archive.display()
            )));
        }

        let removed = remove_private_interfaces(&archive, &self.framework_name)?;
        if removed > 0 {
            log::debug!("Removed {} private module interfaces", removed);
        }
        Ok(archive)
    }
}

/// Deletes `*.private.swiftinterface` from the archived framework.
fn remove_private_interfaces(archive: &Path, framework_name: &str) -> Result<usize, XcforgeError> {
    let swiftmodule = archive_framework_path(archive, framework_name)
        .join("Modules")
        .join(format!("{}.swiftmodule", framework_name));
    if !swiftmodule.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for file in read_dir_sorted(&swiftmodule)? {
        let private = file
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".private.swiftinterface"));
        if private {
            fs::remove_file(&file)?;
            removed += 1;
        }
    }
    Ok(removed)
}
