//! XCFramework assembly with `xcodebuild -create-xcframework`.

use std::path::{Path, PathBuf};

use super::common::{create_dir_all, path_arg, remove_path};
use crate::toolchain::{Invocation, Toolchain};
use crate::types::{ArchiveResult, AssemblyResult, BuildContext, SliceResult, Stage, XcforgeError};

/// Options for [`BundleAssembler::assemble`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Without library evolution `xcodebuild` needs `-allow-internal-distribution`.
    pub library_evolution: bool,
    pub include_debug_symbols: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            library_evolution: true,
            include_debug_symbols: true,
        }
    }
}

/// One `-framework` argument and its optional `-debug-symbols` companion.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameworkInput {
    framework: PathBuf,
    debug_symbols: Option<PathBuf>,
}

pub struct BundleAssembler<'a> {
    toolchain: &'a dyn Toolchain,
    ctx: &'a BuildContext,
}

impl<'a> BundleAssembler<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, ctx: &'a BuildContext) -> Self {
        Self { toolchain, ctx }
    }

    /// Creates `output_path` from framework slices.
    ///
    /// Failed slices and slices whose binary is missing are left out. When
    /// nothing usable remains, no tool is invoked.
    pub fn assemble(
        &self,
        slices: &[SliceResult],
        output_path: &Path,
        options: AssembleOptions,
    ) -> AssemblyResult {
        let mut result = AssemblyResult {
            slices: slices.to_vec(),
            ..AssemblyResult::default()
        };

        let successful: Vec<&SliceResult> = slices.iter().filter(|s| s.success).collect();
        if successful.is_empty() {
            result.errors.push("All framework slice builds failed".to_string());
            return result;
        }

        let inputs: Vec<FrameworkInput> = successful
            .iter()
            .filter_map(|slice| {
                let framework = slice.framework_path.as_ref()?;
                let input = slice_input(framework, options.include_debug_symbols);
                if input.is_none() {
                    log::warn!(
                        "Framework binary missing in {}; skipping {}",
                        framework.display(),
                        slice.sdk.triple(false)
                    );
                }
                input
            })
            .collect();

        self.finish(result, &inputs, output_path, !options.library_evolution)
    }

    /// Creates `output_path` from `xcodebuild archive` outputs.
    pub fn assemble_archives(
        &self,
        archives: &[ArchiveResult],
        framework_name: &str,
        output_path: &Path,
        include_debug_symbols: bool,
    ) -> AssemblyResult {
        let mut result = AssemblyResult {
            archives: archives.to_vec(),
            ..AssemblyResult::default()
        };

        let successful: Vec<&ArchiveResult> = archives.iter().filter(|a| a.success).collect();
        if successful.is_empty() {
            result.errors.push("All archive builds failed".to_string());
            return result;
        }

        let inputs: Vec<FrameworkInput> = successful
            .iter()
            .filter_map(|archive| {
                let path = archive.archive_path.as_ref()?;
                let input = archive_input(path, framework_name, include_debug_symbols);
                if input.is_none() {
                    log::warn!(
                        "Framework not found in archive {}; skipping {}",
                        path.display(),
                        archive.platform_name
                    );
                }
                input
            })
            .collect();

        self.finish(result, &inputs, output_path, false)
    }

    fn finish(
        &self,
        mut result: AssemblyResult,
        inputs: &[FrameworkInput],
        output_path: &Path,
        allow_internal_distribution: bool,
    ) -> AssemblyResult {
        if inputs.is_empty() {
            result.errors.push("No frameworks found to assemble".to_string());
            return result;
        }

        log::info!(
            "Creating {} from {} framework(s)",
            output_path.display(),
            inputs.len()
        );
        match self.create_bundle(inputs, output_path, allow_internal_distribution) {
            Ok(()) => {
                log::info!("XCFramework created at {}", output_path.display());
                result.success = true;
                result.bundle_path = Some(output_path.to_path_buf());
                result.stages_completed.push(Stage::Assemble);
            }
            Err(e) => {
                log::error!("{}", e);
                result.errors.push(e.to_string());
            }
        }
        result
    }

    fn create_bundle(
        &self,
        inputs: &[FrameworkInput],
        output_path: &Path,
        allow_internal_distribution: bool,
    ) -> Result<(), XcforgeError> {
        // xcodebuild refuses to overwrite.
        remove_path(output_path)?;
        if let Some(parent) = output_path.parent() {
            create_dir_all(parent)?;
        }

        let mut invocation = Invocation::new("xcodebuild").arg("-create-xcframework");
        if allow_internal_distribution {
            invocation = invocation.arg("-allow-internal-distribution");
        }
        for input in inputs {
            invocation = invocation
                .arg("-framework")
                .arg(path_arg(&input.framework));
            if let Some(dsym) = &input.debug_symbols {
                invocation = invocation.arg("-debug-symbols").arg(path_arg(dsym));
            }
        }
        invocation = invocation
            .arg("-output")
            .arg(path_arg(output_path))
            .stream(self.ctx.stream_output)
            .formatted(true);

        let output = self.toolchain.run(&invocation);
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "Failed to create XCFramework: {}",
                output.error_message()
            )));
        }
        Ok(())
    }
}

fn slice_input(framework: &Path, include_debug_symbols: bool) -> Option<FrameworkInput> {
    let module = framework.file_stem()?;
    if !framework.join(module).is_file() {
        return None;
    }
    let debug_symbols = include_debug_symbols
        .then(|| PathBuf::from(format!("{}.dSYM", framework.display())))
        .filter(|dsym| dsym.is_dir());
    Some(FrameworkInput {
        framework: framework.to_path_buf(),
        debug_symbols,
    })
}

/// `Products/Library/Frameworks/<name>.framework` and `dSYMs/<name>.framework.dSYM`.
pub fn archive_framework_path(archive: &Path, framework_name: &str) -> PathBuf {
    archive
        .join("Products/Library/Frameworks")
        .join(format!("{}.framework", framework_name))
}

pub fn archive_debug_symbols_path(archive: &Path, framework_name: &str) -> PathBuf {
    archive
        .join("dSYMs")
        .join(format!("{}.framework.dSYM", framework_name))
}

fn archive_input(archive: &Path, framework_name: &str, include_debug_symbols: bool) -> Option<FrameworkInput> {
    let framework = archive_framework_path(archive, framework_name);
    if !framework.is_dir() {
        return None;
    }
    let debug_symbols = include_debug_symbols
        .then(|| archive_debug_symbols_path(archive, framework_name))
        .filter(|dsym| dsym.is_dir());
    Some(FrameworkInput {
        framework,
        debug_symbols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::lookup;
    use crate::sdk::SdkSpec;
    use crate::testing::FakeToolchain;
    use std::fs;
    use tempfile::TempDir;

    fn fragment(root: &Path, platform: &str, with_dsym: bool) -> SliceResult {
        let sdk = SdkSpec::new(lookup(platform).unwrap(), "arm64", None);
        let fw = root.join(platform).join("Kit.framework");
        fs::create_dir_all(&fw).unwrap();
        fs::write(fw.join("Kit"), "bin").unwrap();
        if with_dsym {
            fs::create_dir_all(root.join(platform).join("Kit.framework.dSYM")).unwrap();
        }
        SliceResult::succeeded(sdk, fw)
    }

    fn framework_args(toolchain: &FakeToolchain) -> usize {
        toolchain.find("xcodebuild", "-create-xcframework")[0]
            .args
            .iter()
            .filter(|a| *a == "-framework")
            .count()
    }

    #[test]
    fn test_assembles_successful_slices() {
        let temp = TempDir::new().unwrap();
        let sdk = SdkSpec::new(lookup("ios-simulator").unwrap(), "x86_64", None);
        let slices = vec![
            fragment(temp.path(), "ios", false),
            SliceResult::failed(sdk, "boom"),
            fragment(temp.path(), "ios-simulator", false),
        ];
        let output = temp.path().join("out/Kit.xcframework");
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();

        let result = BundleAssembler::new(&toolchain, &ctx).assemble(&slices, &output, AssembleOptions::default());

        assert!(result.success);
        assert_eq!(result.bundle_path.as_deref(), Some(output.as_path()));
        assert_eq!(result.slices.len(), 3);
        assert_eq!(result.stages_completed, [Stage::Assemble]);
        assert_eq!(framework_args(&toolchain), 2);
        let call = &toolchain.calls()[0];
        assert!(!call.args.iter().any(|a| a == "-allow-internal-distribution"));
        assert!(call.formatted);
    }

    #[test]
    fn test_allow_internal_distribution_without_evolution() {
        let temp = TempDir::new().unwrap();
        let slices = vec![fragment(temp.path(), "ios", false)];
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();
        let options = AssembleOptions {
            library_evolution: false,
            ..AssembleOptions::default()
        };

        BundleAssembler::new(&toolchain, &ctx).assemble(&slices, &temp.path().join("Kit.xcframework"), options);

        let call = &toolchain.calls()[0];
        assert_eq!(call.args[1], "-allow-internal-distribution");
    }

    #[test]
    fn test_all_failed_invokes_nothing() {
        let sdk = SdkSpec::new(lookup("ios").unwrap(), "arm64", None);
        let slices = vec![SliceResult::failed(sdk, "boom")];
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();

        let result = BundleAssembler::new(&toolchain, &ctx).assemble(
            &slices,
            Path::new("/tmp/never.xcframework"),
            AssembleOptions::default(),
        );

        assert!(!result.success);
        assert!(result.errors[0].contains("All framework slice builds failed"));
        assert!(toolchain.calls().is_empty());
    }

    #[test]
    fn test_missing_binary_excluded() {
        let temp = TempDir::new().unwrap();
        let broken = fragment(temp.path(), "ios-simulator", false);
        fs::remove_file(broken.framework_path.as_ref().unwrap().join("Kit")).unwrap();
        let slices = vec![fragment(temp.path(), "ios", false), broken];
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();

        let result = BundleAssembler::new(&toolchain, &ctx).assemble(
            &slices,
            &temp.path().join("Kit.xcframework"),
            AssembleOptions::default(),
        );

        assert!(result.success);
        assert_eq!(framework_args(&toolchain), 1);
    }

    #[test]
    fn test_debug_symbols_paired() {
        let temp = TempDir::new().unwrap();
        let slices = vec![fragment(temp.path(), "ios", true)];
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();

        BundleAssembler::new(&toolchain, &ctx).assemble(
            &slices,
            &temp.path().join("Kit.xcframework"),
            AssembleOptions::default(),
        );

        let args = &toolchain.calls()[0].args;
        let fw = args.iter().position(|a| a == "-framework").unwrap();
        assert_eq!(args[fw + 2], "-debug-symbols");
        assert!(args[fw + 3].ends_with("Kit.framework.dSYM"));
    }

    #[test]
    fn test_replaces_existing_output() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("Kit.xcframework");
        fs::create_dir_all(output.join("stale-slice")).unwrap();
        let slices = vec![fragment(temp.path(), "ios", false)];
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();

        let result = BundleAssembler::new(&toolchain, &ctx).assemble(&slices, &output, AssembleOptions::default());

        assert!(result.success);
        assert!(!output.join("stale-slice").exists());
    }

    #[test]
    fn test_tool_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let slices = vec![fragment(temp.path(), "ios", false)];
        let toolchain = FakeToolchain::new().fail_when("xcodebuild", "-create-xcframework");
        let ctx = BuildContext::new();

        let result = BundleAssembler::new(&toolchain, &ctx).assemble(
            &slices,
            &temp.path().join("Kit.xcframework"),
            AssembleOptions::default(),
        );

        assert!(!result.success);
        assert!(result.bundle_path.is_none());
        assert!(result.errors[0].contains("Failed to create XCFramework"));
    }

    #[test]
    fn test_assemble_archives() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("SDK-iOS.xcarchive");
        fs::create_dir_all(archive_framework_path(&archive, "SDK")).unwrap();
        fs::create_dir_all(archive_debug_symbols_path(&archive, "SDK")).unwrap();
        let archives = vec![
            ArchiveResult {
                success: true,
                archive_path: Some(archive.clone()),
                platform: "ios".to_string(),
                platform_name: "iOS".to_string(),
                debug_symbols: None,
                error: None,
            },
            ArchiveResult {
                success: false,
                archive_path: None,
                platform: "ios-simulator".to_string(),
                platform_name: "iOS Simulator".to_string(),
                debug_symbols: None,
                error: Some("failed".to_string()),
            },
        ];
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();

        let result = BundleAssembler::new(&toolchain, &ctx).assemble_archives(
            &archives,
            "SDK",
            &temp.path().join("SDK.xcframework"),
            true,
        );

        assert!(result.success);
        assert_eq!(result.archives.len(), 2);
        assert_eq!(framework_args(&toolchain), 1);
        let args = &toolchain.calls()[0].args;
        assert!(!args.iter().any(|a| a == "-allow-internal-distribution"));
        assert!(args.iter().any(|a| a.ends_with("dSYMs/SDK.framework.dSYM")));
    }

    #[test]
    fn test_assemble_archives_all_failed() {
        let toolchain = FakeToolchain::new();
        let ctx = BuildContext::new();
        let result = BundleAssembler::new(&toolchain, &ctx).assemble_archives(
            &[],
            "SDK",
            Path::new("/tmp/none.xcframework"),
            true,
        );
        assert!(!result.success);
        assert!(result.errors[0].contains("All archive builds failed"));
        assert!(toolchain.calls().is_empty());
    }
}
