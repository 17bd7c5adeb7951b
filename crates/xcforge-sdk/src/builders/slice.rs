//! Single-SDK framework slices.
//!
//! [`SliceBuilder`] compiles one package target for one [`SdkSpec`] with
//! `swift build`, links the emitted objects into a static binary with
//! `libtool`, and lays out a `.framework` fragment:
//!
//! ```text
//! <Module>.framework/
//! ├── <Module>                    static binary
//! ├── Info.plist
//! ├── Headers/
//! │   ├── <Module>-Swift.h
//! │   └── <Module>-umbrella.h
//! ├── Modules/
//! │   ├── module.modulemap
//! │   └── <Module>.swiftmodule/   files renamed to <triple>.*
//! └── <Package>_<Target>.bundle/  when the target has resources
//! ```
//!
//! The resource accessor override is compiled into the object directory
//! before linking, so the binary locates its bundle inside the framework.

use std::fs;
use std::path::{Path, PathBuf};

use super::common::{
    bundle_identifier, copy_dir_resolving_symlinks, copy_file, create_dir_all,
    find_files_with_suffix, make_executable, path_arg, read_dir_sorted,
};
use crate::sdk::SdkSpec;
use crate::templates::{self, TemplateVar};
use crate::toolchain::{Invocation, Toolchain};
use crate::types::{BuildConfiguration, BuildContext, BuildTarget, SliceResult, XcforgeError};

const LIBRARY_EVOLUTION_FLAGS: [&str; 3] = [
    "-enable-library-evolution",
    "-emit-module-interface",
    "-no-verify-emitted-module-interface",
];

/// Where SwiftPM leaves a target's outputs for one triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceLayout {
    pub module_name: String,
    /// `<root>/.build/<triple>/<configuration>`
    pub products_dir: PathBuf,
    /// `<products>/<Module>.build`
    pub object_dir: PathBuf,
    /// `<products>/<Package>_<Target>.bundle`
    pub resource_bundle: PathBuf,
}

impl SliceLayout {
    pub fn new(
        target: &BuildTarget,
        sdk: &SdkSpec,
        package_root: &Path,
        configuration: BuildConfiguration,
    ) -> Self {
        let module_name = target.module_name();
        let products_dir = package_root
            .join(".build")
            .join(sdk.triple(false))
            .join(configuration.as_str());
        let object_dir = products_dir.join(format!("{}.build", module_name));
        let resource_bundle = products_dir.join(target.resource_bundle_name());
        Self {
            module_name,
            products_dir,
            object_dir,
            resource_bundle,
        }
    }

    pub fn has_resource_bundle(&self) -> bool {
        self.resource_bundle.is_dir()
    }
}

/// Builds one framework slice per call.
///
/// Holds no mutable state, so one builder may serve concurrent slices as
/// long as each call gets its own output directory.
pub struct SliceBuilder<'a> {
    toolchain: &'a dyn Toolchain,
    ctx: &'a BuildContext,
}

impl<'a> SliceBuilder<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, ctx: &'a BuildContext) -> Self {
        Self { toolchain, ctx }
    }

    /// Builds `target` for `sdk` into `output_path` (a `<Module>.framework` directory).
    ///
    /// The parent of `output_path` is used as scratch space and must not be
    /// shared with another slice. Failures never propagate: they come back as
    /// a [`SliceResult`] with `success == false`.
    pub fn build(
        &self,
        target: &BuildTarget,
        sdk: &SdkSpec,
        package_root: &Path,
        output_path: &Path,
    ) -> SliceResult {
        log::info!(
            "Building {}.framework for {} ({})",
            target.name,
            sdk.triple(false),
            target.configuration
        );

        match self.try_build(target, sdk, package_root, output_path) {
            Ok(()) => {
                log::debug!("Slice ready at {}", output_path.display());
                SliceResult::succeeded(sdk.clone(), output_path.to_path_buf())
            }
            Err(e) => {
                log::error!("Framework slice build failed for {}: {}", sdk.triple(false), e);
                SliceResult::failed(sdk.clone(), e.to_string())
            }
        }
    }

    fn try_build(
        &self,
        target: &BuildTarget,
        sdk: &SdkSpec,
        package_root: &Path,
        output_path: &Path,
    ) -> Result<(), XcforgeError> {
        let scratch = output_path.parent().ok_or_else(|| {
            XcforgeError::Config(format!(
                "Slice output path has no parent directory: {}",
                output_path.display()
            ))
        })?;

        let sdk_path = sdk.resolve_sdk_path(self.toolchain)?;
        self.compile(target, sdk, package_root, &sdk_path)?;

        let layout = SliceLayout::new(target, sdk, package_root, target.configuration);
        let objects = locate_objects(&layout, &target.name)?;
        log::debug!("Found {} object files", objects.len());

        create_dir_all(output_path)?;

        let has_resources = layout.has_resource_bundle();
        if has_resources {
            self.compile_resource_accessor(target, sdk, &sdk_path, &layout, &objects, scratch)?;
        }

        // Relist so the accessor object is linked.
        let objects = locate_objects(&layout, &target.name)?;
        self.link(&layout, &objects, output_path, scratch)?;

        write_info_plist(&layout, sdk, output_path)?;
        write_headers(&layout, output_path)?;
        write_modules(&layout, sdk, output_path)?;

        if has_resources {
            copy_resource_bundle(&layout, output_path)?;
        }

        Ok(())
    }

    fn compile(
        &self,
        target: &BuildTarget,
        sdk: &SdkSpec,
        package_root: &Path,
        sdk_path: &Path,
    ) -> Result<(), XcforgeError> {
        let mut invocation = Invocation::new("swift")
            .args(["build", "--package-path"])
            .arg(path_arg(package_root))
            .args(["--target", target.name.as_str()])
            .args(["--configuration", target.configuration.as_str()])
            .args(["--triple".to_string(), sdk.triple(true)])
            .args(["--sdk".to_string(), path_arg(sdk_path)])
            .stream(self.ctx.stream_output);

        for flag in SdkSpec::developer_search_flags(sdk_path) {
            invocation = invocation.args(["-Xswiftc".to_string(), flag]);
        }
        if target.library_evolution {
            for flag in LIBRARY_EVOLUTION_FLAGS {
                invocation = invocation.args(["-Xswiftc", flag]);
            }
        }

        let output = self.toolchain.run(&invocation);
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "Swift build failed: {}",
                output.error_message()
            )));
        }
        Ok(())
    }

    fn compile_resource_accessor(
        &self,
        target: &BuildTarget,
        sdk: &SdkSpec,
        sdk_path: &Path,
        layout: &SliceLayout,
        objects: &[PathBuf],
        scratch: &Path,
    ) -> Result<(), XcforgeError> {
        let clang = uses_clang(objects);
        let template = if clang {
            templates::OBJC_RESOURCE_ACCESSOR
        } else {
            templates::SWIFT_RESOURCE_ACCESSOR
        };
        log::info!("Overriding resource bundle accessor for {}", target.name);

        let source = scratch.join(template);
        templates::render_to(
            template,
            &[
                TemplateVar::new("PACKAGE_NAME", target.package_name.as_str()),
                TemplateVar::new("TARGET_NAME", target.name.as_str()),
                TemplateVar::new("MODULE_NAME", layout.module_name.as_str()),
            ],
            &source,
        )?;

        // Same name as SwiftPM's own accessor object, which it replaces.
        let object = layout.object_dir.join(format!("{}.o", template));
        let invocation = if clang {
            Invocation::new("xcrun")
                .args(["clang", "-x", "objective-c", "-target"])
                .arg(sdk.triple(true))
                .arg("-isysroot")
                .arg(path_arg(sdk_path))
                .arg("-o")
                .arg(path_arg(&object))
                .arg("-c")
                .arg(path_arg(&source))
        } else {
            Invocation::new("xcrun")
                .args(["swiftc", "-emit-library", "-emit-object", "-module-name"])
                .arg(layout.module_name.as_str())
                .arg("-target")
                .arg(sdk.triple(true))
                .arg("-sdk")
                .arg(path_arg(sdk_path))
                .arg("-o")
                .arg(path_arg(&object))
                .arg(path_arg(&source))
        };

        let output = self.toolchain.run(&invocation.stream(self.ctx.stream_output));
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "Failed to compile resource accessor: {}",
                output.error_message()
            )));
        }
        if !object.is_file() {
            return Err(XcforgeError::Resource(format!(
                "Resource accessor object was not produced: {}",
                object.display()
            )));
        }
        Ok(())
    }

    fn link(
        &self,
        layout: &SliceLayout,
        objects: &[PathBuf],
        output_path: &Path,
        scratch: &Path,
    ) -> Result<(), XcforgeError> {
        let filelist = scratch.join("objects.txt");
        let listing = objects
            .iter()
            .map(|o| path_arg(o))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&filelist, listing)?;

        let binary = output_path.join(&layout.module_name);
        let invocation = Invocation::new("libtool")
            .args(["-static", "-o"])
            .arg(path_arg(&binary))
            .arg("-filelist")
            .arg(path_arg(&filelist));

        let output = self.toolchain.run(&invocation);
        if !output.success {
            return Err(XcforgeError::Toolchain(format!(
                "libtool failed: {}",
                output.error_message()
            )));
        }

        make_executable(&binary)?;
        log::debug!("Created framework binary {}", binary.display());
        Ok(())
    }
}

fn locate_objects(layout: &SliceLayout, target_name: &str) -> Result<Vec<PathBuf>, XcforgeError> {
    if !layout.object_dir.is_dir() {
        return Err(XcforgeError::Resource(format!(
            "Build directory not found: {}",
            layout.object_dir.display()
        )));
    }
    let objects = find_files_with_suffix(&layout.object_dir, ".o")?;
    if objects.is_empty() {
        return Err(XcforgeError::Resource(format!(
            "No object files found for target {}",
            target_name
        )));
    }
    Ok(objects)
}

/// A target is C-family when none of its objects came from Swift sources.
fn uses_clang(objects: &[PathBuf]) -> bool {
    !objects.iter().any(|o| {
        o.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".swift.o"))
    })
}

fn write_info_plist(layout: &SliceLayout, sdk: &SdkSpec, output_path: &Path) -> Result<(), XcforgeError> {
    let min_os = sdk
        .version
        .as_deref()
        .unwrap_or(sdk.platform.default_deployment_target);
    templates::render_to(
        templates::INFO_PLIST,
        &[
            TemplateVar::new("MODULE_NAME", layout.module_name.as_str()),
            TemplateVar::new("BUNDLE_IDENTIFIER", bundle_identifier(&layout.module_name)),
            TemplateVar::new("PLATFORM", sdk.platform.plist_platform),
            TemplateVar::new("MIN_OS_VERSION", min_os),
        ],
        &output_path.join("Info.plist"),
    )
}

fn write_headers(layout: &SliceLayout, output_path: &Path) -> Result<(), XcforgeError> {
    let headers_dir = output_path.join("Headers");
    create_dir_all(&headers_dir)?;

    let mut included = Vec::new();
    for header in read_dir_sorted(&layout.object_dir)? {
        let Some(name) = header.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if header.is_file() && name.ends_with("-Swift.h") {
            copy_file(&header, &headers_dir.join(name))?;
            included.push(name.to_string());
        }
    }

    let mut umbrella: String = included
        .iter()
        .map(|h| format!("#import <{}/{}>\n", layout.module_name, h))
        .collect();
    if umbrella.is_empty() {
        umbrella.push('\n');
    }
    fs::write(
        headers_dir.join(format!("{}-umbrella.h", layout.module_name)),
        umbrella,
    )?;
    Ok(())
}

fn write_modules(layout: &SliceLayout, sdk: &SdkSpec, output_path: &Path) -> Result<(), XcforgeError> {
    let modules_dir = output_path.join("Modules");
    templates::render_to(
        templates::MODULE_MAP,
        &[TemplateVar::new("MODULE_NAME", layout.module_name.as_str())],
        &modules_dir.join("module.modulemap"),
    )?;

    let swiftmodule_dir = modules_dir.join(format!("{}.swiftmodule", layout.module_name));
    create_dir_all(&swiftmodule_dir)?;

    let mut module_files = Vec::new();
    let emitted_modules = layout.products_dir.join("Modules");
    if emitted_modules.is_dir() {
        let prefix = format!("{}.", layout.module_name);
        module_files.extend(read_dir_sorted(&emitted_modules)?.into_iter().filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        }));
    }
    let interface = layout
        .object_dir
        .join(format!("{}.swiftinterface", layout.module_name));
    if interface.is_file() {
        module_files.push(interface);
    }

    if module_files.is_empty() {
        log::warn!("No Swift module files found for {}", layout.module_name);
        return Ok(());
    }

    let triple = sdk.triple(false);
    for file in module_files {
        if file.is_dir() {
            // Newer toolchains emit a directory already keyed by triple.
            super::common::copy_dir_recursive(&file, &swiftmodule_dir)?;
            continue;
        }
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let renamed = name.replacen(layout.module_name.as_str(), &triple, 1);
        copy_file(&file, &swiftmodule_dir.join(&renamed))?;
        log::debug!("Copied Swift module file {}", renamed);
    }
    Ok(())
}

fn copy_resource_bundle(layout: &SliceLayout, output_path: &Path) -> Result<(), XcforgeError> {
    let Some(name) = layout.resource_bundle.file_name() else {
        return Ok(());
    };
    log::info!("Copying resource bundle {}", name.to_string_lossy());
    let resolved = copy_dir_resolving_symlinks(&layout.resource_bundle, &output_path.join(name))?;
    if resolved > 0 {
        log::debug!("Resolved {} symlinks in resource bundle", resolved);
    }
    Ok(())
}
