//! Top-level build coordination.
//!
//! A build moves through `init → clean → slice/archive → merge → assemble`.
//! Each stage that completes is recorded in
//! [`AssemblyResult::stages_completed`]; the first stage left with nothing
//! to hand on ends the build.
//!
//! Two entry points exist:
//!
//! - [`BuildOrchestrator::build`] archives an Xcode scheme per platform.
//! - [`BuildOrchestrator::build_from_package`] compiles Swift package targets
//!   per SDK, merges architectures and assembles one bundle per target.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use crate::builders::{
    ArchitectureMerger, Archiver, AssembleOptions, BundleAssembler, Cleaner, SliceBuilder, group_by_platform,
};
use crate::package::PackageDescriptor;
use crate::platform::{self, Platform};
use crate::sdk::SdkSpec;
use crate::toolchain::Toolchain;
use crate::types::{
    ArchiveResult, AssemblyResult, BuildContext, BuildTarget, PackageBuildConfig, PackageBuildResult,
    ProjectBuildConfig, SliceResult, Stage, TargetOutcome,
};

pub struct BuildOrchestrator<'a> {
    toolchain: &'a dyn Toolchain,
    ctx: BuildContext,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, ctx: BuildContext) -> Self {
        Self { toolchain, ctx }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Builds an XCFramework from an Xcode project.
    pub fn build(&self, config: &ProjectBuildConfig) -> AssemblyResult {
        let valid = match config.validate() {
            Ok(valid) => valid,
            Err(e) => return AssemblyResult::failed(e.to_string()),
        };
        if let Err(e) = platform::resolve_all(&config.platforms) {
            return AssemblyResult::failed(e.to_string());
        }

        let mut result = AssemblyResult::default();
        let cleaner = Cleaner::new(valid.output_dir, valid.framework_name);

        if config.clean {
            let report = cleaner.clean_all(false);
            result.errors.extend(report.errors);
            result.stages_completed.push(Stage::Clean);
        }
        if let Err(e) = cleaner.ensure_output_dir() {
            result.errors.push(e.to_string());
            return result;
        }

        let archives = Archiver::new(
            self.toolchain,
            &self.ctx,
            valid.project_path,
            valid.scheme,
            valid.framework_name,
            valid.output_dir,
        )
        .configuration(config.configuration)
        .architectures(config.architectures.clone())
        .build_settings(config.build_settings.clone())
        .build_archives(&platform::unique_ids(&config.platforms), &config.deployment_targets);

        let output = valid
            .output_dir
            .join(format!("{}.xcframework", valid.framework_name));
        self.assemble_from_archives(result, archives, valid.framework_name, &output, config.include_debug_symbols)
    }

    /// Builds an XCFramework from archives that already exist.
    ///
    /// Each archive's platform is inferred from its `-<suffix>.xcarchive` name.
    pub fn create_from_archives(
        &self,
        framework_name: &str,
        output_dir: &Path,
        archive_paths: &[PathBuf],
        include_debug_symbols: bool,
    ) -> AssemblyResult {
        let archives = archive_paths
            .iter()
            .map(|path| archive_result_for(path))
            .collect();
        let output = output_dir.join(format!("{}.xcframework", framework_name));
        self.assemble_from_archives(
            AssemblyResult::default(),
            archives,
            framework_name,
            &output,
            include_debug_symbols,
        )
    }

    fn assemble_from_archives(
        &self,
        mut result: AssemblyResult,
        archives: Vec<ArchiveResult>,
        framework_name: &str,
        output: &Path,
        include_debug_symbols: bool,
    ) -> AssemblyResult {
        for archive in archives.iter().filter(|a| !a.success) {
            result.errors.push(format!(
                "{}: {}",
                archive.platform_name,
                archive.error.as_deref().unwrap_or("archive failed")
            ));
        }
        if archives.iter().any(|a| a.success) {
            result.stages_completed.push(Stage::Archive);
        }

        let assembled = BundleAssembler::new(self.toolchain, &self.ctx).assemble_archives(
            &archives,
            framework_name,
            output,
            include_debug_symbols,
        );
        merge_assembly(&mut result, assembled);
        result.archives = archives;
        result
    }

    /// Builds one XCFramework per target of a Swift package.
    ///
    /// Targets are independent: one failing does not stop the others, and the
    /// build succeeds when at least one target produced a bundle.
    pub fn build_from_package(&self, config: &PackageBuildConfig) -> PackageBuildResult {
        let mut result = PackageBuildResult::default();

        if config.platforms.is_empty() {
            result.errors.push("No platforms specified for build".to_string());
            return result;
        }
        let platforms = match platform::resolve_all(&config.platforms) {
            Ok(platforms) => platforms,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        let descriptor = match PackageDescriptor::load(self.toolchain, &config.package_dir) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::error!("{}", e);
                result.errors.push(e.to_string());
                return result;
            }
        };

        let names: Vec<String> = if config.targets.is_empty() {
            descriptor
                .library_targets()
                .iter()
                .map(|t| t.name.clone())
                .collect()
        } else {
            config.targets.clone()
        };
        if names.is_empty() {
            result.errors.push("No targets specified for build".to_string());
            return result;
        }

        let versions: BTreeMap<String, String> = platforms
            .iter()
            .map(|p| (p.identifier.to_string(), resolve_version(p, &descriptor, config)))
            .collect();

        for (i, name) in names.iter().enumerate() {
            log::info!("[{}/{}] Building target {}", i + 1, names.len(), name);

            let Some(package_target) = descriptor.target(name) else {
                let message = format!("Target '{}' not found in package {}", name, descriptor.name);
                log::warn!("{}", message);
                result.errors.push(message);
                continue;
            };
            if !package_target.is_library() {
                let message = format!(
                    "Target '{}' is not a library target ({:?}); skipping",
                    name, package_target.kind
                );
                log::warn!("{}", message);
                result.errors.push(message);
                continue;
            }

            let target = BuildTarget::new(name.as_str(), descriptor.name.as_str())
                .platforms(platforms.iter().map(|p| p.identifier.to_string()))
                .configuration(config.configuration)
                .library_evolution(config.library_evolution);

            let outcome = self.build_target(&target, &config.package_dir, &config.output_dir, &versions);

            if outcome.success {
                if let Some(path) = &outcome.bundle_path {
                    result.bundle_paths.push(path.clone());
                }
                result.targets_completed.push(name.clone());
            }
            result
                .errors
                .extend(outcome.errors.iter().map(|e| format!("{}: {}", name, e)));
            result.targets.push(TargetOutcome {
                target: name.clone(),
                result: outcome,
            });
        }

        result.success = !result.targets_completed.is_empty();
        result
    }

    /// Runs slice → merge → assemble for one target.
    ///
    /// Intermediate frameworks live in a temporary directory removed when
    /// this returns, whatever the outcome. Each SDK gets its own
    /// `<work>/<triple>/` directory; repeated platforms are built once.
    pub fn build_target(
        &self,
        target: &BuildTarget,
        package_root: &Path,
        output_dir: &Path,
        versions: &BTreeMap<String, String>,
    ) -> AssemblyResult {
        let platforms = match platform::resolve_all(&target.platforms) {
            Ok(platforms) => platforms,
            Err(e) => return AssemblyResult::failed(e.to_string()),
        };
        let sdks: Vec<SdkSpec> = platforms
            .iter()
            .flat_map(|&p| SdkSpec::for_platform(p, versions.get(p.identifier).map(String::as_str)))
            .collect();

        let work = match tempfile::Builder::new()
            .prefix(&format!("xcforge-{}-", target.module_name()))
            .tempdir()
        {
            Ok(work) => work,
            Err(e) => {
                return AssemblyResult::failed(format!("Failed to create temporary directory: {}", e));
            }
        };

        let mut result = AssemblyResult::default();

        let slices = self.build_slices(target, &sdks, package_root, work.path());
        for slice in slices.iter().filter(|s| !s.success) {
            result.errors.push(format!(
                "{}: {}",
                slice.sdk.triple(false),
                slice.error.as_deref().unwrap_or("slice build failed")
            ));
        }
        result.slices = slices;

        let succeeded = result.slices.iter().filter(|s| s.success).count();
        if succeeded == 0 {
            result.errors.push("All framework slice builds failed".to_string());
            return result;
        }
        log::info!("{}/{} slices built for {}", succeeded, result.slices.len(), target.name);
        result.stages_completed.push(Stage::Slice);

        let merger = ArchitectureMerger::new(self.toolchain);
        let mut merged = Vec::new();
        for group in group_by_platform(&result.slices) {
            match merger.merge(&group.slices, work.path()) {
                Some(slice) => merged.push(SliceResult::from(slice)),
                None => result
                    .errors
                    .push(format!("Failed to combine architectures for {}", group.platform)),
            }
        }
        if merged.is_empty() {
            result.errors.push("All platform merges failed".to_string());
            return result;
        }
        result.stages_completed.push(Stage::Merge);

        let output = output_dir.join(format!("{}.xcframework", target.name));
        let assembled = BundleAssembler::new(self.toolchain, &self.ctx).assemble(
            &merged,
            &output,
            AssembleOptions {
                library_evolution: target.library_evolution,
                ..AssembleOptions::default()
            },
        );
        merge_assembly(&mut result, assembled);
        result
    }

    /// Builds every SDK, at most `ctx.jobs` at a time, results in input order.
    fn build_slices(
        &self,
        target: &BuildTarget,
        sdks: &[SdkSpec],
        package_root: &Path,
        work_dir: &Path,
    ) -> Vec<SliceResult> {
        let builder = SliceBuilder::new(self.toolchain, &self.ctx);
        let module = target.module_name();
        let mut results = Vec::with_capacity(sdks.len());

        for batch in sdks.chunks(self.ctx.jobs.max(1)) {
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|sdk| {
                        let builder = &builder;
                        let output = work_dir
                            .join(sdk.triple(false))
                            .join(format!("{}.framework", module));
                        scope.spawn(move || builder.build(target, sdk, package_root, &output))
                    })
                    .collect();

                for (handle, sdk) in handles.into_iter().zip(batch) {
                    let slice = handle.join().unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        log::error!("Slice build for {} panicked: {}", sdk.triple(false), message);
                        SliceResult::failed(sdk.clone(), format!("Slice build panicked: {}", message))
                    });
                    results.push(slice);
                }
            });
        }

        results
    }
}

/// Explicit override, then the package's declared minimum, then the registry default.
fn resolve_version(platform: &Platform, descriptor: &PackageDescriptor, config: &PackageBuildConfig) -> String {
    config
        .deployment_targets
        .get(platform.identifier)
        .cloned()
        .or_else(|| config.version.clone())
        .or_else(|| {
            descriptor
                .platform_version(platform.package_platform)
                .map(str::to_string)
        })
        .unwrap_or_else(|| platform.default_deployment_target.to_string())
}

fn archive_result_for(path: &Path) -> ArchiveResult {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let platform = platform::from_archive_name(&file_name);

    let error = if !path.is_dir() {
        Some(format!("Archive not found: {}", path.display()))
    } else if platform.is_none() {
        Some(format!("Cannot determine platform of archive {}", file_name))
    } else {
        None
    };

    ArchiveResult {
        success: error.is_none(),
        archive_path: error.is_none().then(|| path.to_path_buf()),
        platform: platform.map(|p| p.identifier).unwrap_or_default().to_string(),
        platform_name: platform
            .map(|p| p.display_name.to_string())
            .unwrap_or(file_name),
        debug_symbols: None,
        error,
    }
}

fn merge_assembly(result: &mut AssemblyResult, assembled: AssemblyResult) {
    result.success = assembled.success;
    result.bundle_path = assembled.bundle_path;
    result.errors.extend(assembled.errors);
    result.stages_completed.extend(assembled.stages_completed);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
