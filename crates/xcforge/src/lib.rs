//! # xcforge
//!
//! Command-line tool for building XCFrameworks.
//!
//! ## Overview
//!
//! `xcforge` drives the Apple toolchain to produce multi-platform
//! `.xcframework` bundles from two kinds of sources:
//!
//! - **Xcode projects** - `xcodebuild archive` once per platform, then bundle
//!   the archived frameworks and their dSYMs
//! - **Swift packages** - compile each library target once per SDK and
//!   architecture, merge architectures with `lipo`, then bundle
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter xcforge.toml
//! xcforge init --scheme SDK
//!
//! # Archive an Xcode scheme for iOS and the simulator
//! xcforge build --project SDK.xcodeproj --scheme SDK
//!
//! # Build a Swift package target for several platforms
//! xcforge package Widgets --platforms ios,ios-simulator,macos --jobs 2
//!
//! # List supported platforms
//! xcforge platforms
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Archive an Xcode scheme and assemble the archives |
//! | `package` | Build Swift package targets into XCFrameworks |
//! | `platforms` | Print the platform registry |
//! | `init` | Write a starter configuration file |
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--verbose` / `-v`** - Debug logging and streamed tool output
//! - **`--quiet` / `-q`** - Warnings and errors only
//! - **`--config`** - Use this configuration file instead of discovering one
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `xcforge.toml`
//! - [`logging`] - Console logger

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use xcforge_sdk::{
    AssemblyResult, BuildConfiguration, BuildContext, BuildOrchestrator, PLATFORMS, PackageBuildConfig,
    PackageBuildResult, ProcessToolchain, ProjectBuildConfig, platform,
};

pub mod config;
pub mod logging;

use config::{CONFIG_FILE_NAME, ConfigResolver, XcforgeConfig};

/// Build XCFrameworks from Xcode projects or Swift packages.
#[derive(Parser, Debug)]
#[command(name = "xcforge", author, version, about = "Build XCFrameworks from Xcode projects or Swift packages", long_about = None)]
struct Cli {
    /// Debug logging and streamed tool output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Configuration file (default: discover xcforge.toml upwards)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive an Xcode scheme per platform and assemble an XCFramework.
    Build(BuildArgs),
    /// Build Swift package targets into XCFrameworks.
    Package(PackageArgs),
    /// List supported platforms.
    Platforms,
    /// Write a starter configuration file.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, default_value = "MyFramework", help = "Scheme and framework name to prefill")]
        scheme: String,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct BuildArgs {
    #[arg(long, help = "Path to the .xcodeproj")]
    project: Option<PathBuf>,
    #[arg(long)]
    scheme: Option<String>,
    #[arg(long, help = "Framework name (default: the scheme)")]
    framework_name: Option<String>,
    #[arg(long, help = "Output directory (default: build)")]
    output: Option<PathBuf>,
    #[arg(long, value_delimiter = ',', help = "Comma-separated platform identifiers")]
    platforms: Vec<String>,
    #[arg(long, help = "Keep earlier archives and bundles")]
    no_clean: bool,
    #[arg(long, help = "Leave dSYMs out of the bundle")]
    no_debug_symbols: bool,
    #[arg(long, help = "debug or release")]
    configuration: Option<String>,
    #[arg(long = "archive", help = "Assemble existing .xcarchive directories instead of archiving")]
    archives: Vec<PathBuf>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long, help = "Write the result as JSON to this path")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct PackageArgs {
    /// Targets to build (default: every library target)
    targets: Vec<String>,
    #[arg(long, help = "Directory containing Package.swift")]
    package_dir: Option<PathBuf>,
    #[arg(long, value_delimiter = ',', help = "Comma-separated platform identifiers")]
    platforms: Vec<String>,
    #[arg(long, help = "Output directory (default: build)")]
    output: Option<PathBuf>,
    #[arg(long, help = "debug or release")]
    configuration: Option<String>,
    #[arg(long, help = "Build without stable module interfaces")]
    no_library_evolution: bool,
    #[arg(long = "version", help = "Minimum OS version for every platform")]
    os_version: Option<String>,
    #[arg(long, help = "Slices compiled at once")]
    jobs: Option<usize>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long, help = "Write the result as JSON to this path")]
    report: Option<PathBuf>,
}

/// JSON written by `--report`.
#[derive(Debug, Serialize)]
struct Report<'a, T: Serialize> {
    generated_at: String,
    command: &'a str,
    xcforge_version: &'a str,
    result: &'a T,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.verbose, cli.quiet));

    match cli.command {
        Command::Platforms => {
            print!("{}", render_platforms());
            Ok(())
        }
        Command::Init {
            output,
            scheme,
            force,
        } => {
            write_starter_config(&output, &scheme, force)?;
            println!("Wrote starter config to {:?}", output);
            Ok(())
        }
        Command::Build(args) => {
            let resolver = ConfigResolver::new(cli.config.as_deref())?;
            let ctx = build_context(cli.verbose, cli.quiet, &resolver, None, args.timeout_secs);
            run_build(&args, &resolver, ctx)
        }
        Command::Package(args) => {
            let resolver = ConfigResolver::new(cli.config.as_deref())?;
            let ctx = build_context(cli.verbose, cli.quiet, &resolver, args.jobs, args.timeout_secs);
            run_package(&args, &resolver, ctx)
        }
    }
}

fn run_build(args: &BuildArgs, resolver: &ConfigResolver, ctx: BuildContext) -> Result<()> {
    let config = project_config(args, resolver)?;
    let toolchain = ProcessToolchain::from_context(&ctx);
    let orchestrator = BuildOrchestrator::new(&toolchain, ctx);

    let result = if args.archives.is_empty() {
        orchestrator.build(&config)
    } else {
        let name = config
            .framework_name
            .as_deref()
            .context("--framework-name or --scheme is required with --archive")?;
        let output = config.output_dir.clone().unwrap_or_else(|| PathBuf::from("build"));
        orchestrator.create_from_archives(name, &output, &args.archives, config.include_debug_symbols)
    };

    print!("{}", render_assembly(&result));
    if let Some(path) = &args.report {
        write_report(path, "build", &result)?;
    }
    if !result.success {
        bail!("XCFramework build failed");
    }
    Ok(())
}

fn run_package(args: &PackageArgs, resolver: &ConfigResolver, ctx: BuildContext) -> Result<()> {
    let config = package_config(args, resolver)?;
    let toolchain = ProcessToolchain::from_context(&ctx);
    let result = BuildOrchestrator::new(&toolchain, ctx).build_from_package(&config);

    print!("{}", render_package(&result));
    if let Some(path) = &args.report {
        write_report(path, "package", &result)?;
    }
    if !result.success {
        bail!("No XCFramework was produced");
    }
    Ok(())
}

fn build_context(
    verbose: bool,
    quiet: bool,
    resolver: &ConfigResolver,
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
) -> BuildContext {
    let build = resolver.build();
    let verbose = verbose || build.verbose;
    if verbose {
        logging::init(logging::level_for(true, quiet));
    }

    BuildContext::new()
        .verbose(verbose)
        .quiet(quiet)
        .use_formatter(build.use_formatter)
        .jobs(resolver.resolve(jobs, |c| Some(c.build.jobs), 1))
        .timeout(timeout_secs.or(build.timeout_secs).map(Duration::from_secs))
}

fn resolve_configuration(cli: Option<&str>, resolver: &ConfigResolver) -> Result<BuildConfiguration> {
    let name = cli.map(str::to_string).unwrap_or(resolver.build().configuration);
    Ok(name.parse::<BuildConfiguration>()?)
}

fn resolve_platforms(cli: &[String], resolver: &ConfigResolver) -> Result<Vec<String>> {
    let platforms = if cli.is_empty() {
        resolver.build().platforms
    } else {
        cli.to_vec()
    };
    if platforms.is_empty() {
        bail!("No platforms specified\n\nPass --platforms or set build.platforms in {}.", CONFIG_FILE_NAME);
    }
    platform::resolve_all(&platforms)?;
    Ok(platforms)
}

fn project_config(args: &BuildArgs, resolver: &ConfigResolver) -> Result<ProjectBuildConfig> {
    let project = resolver.project();
    let build = resolver.build();

    let scheme = args.scheme.clone().or(project.scheme);
    let framework_name = args
        .framework_name
        .clone()
        .or(project.framework_name)
        .or_else(|| scheme.clone());

    Ok(ProjectBuildConfig {
        project_path: args.project.clone().or(project.xcode_project),
        scheme,
        framework_name,
        output_dir: Some(args.output.clone().unwrap_or(build.output_dir)),
        platforms: resolve_platforms(&args.platforms, resolver)?,
        clean: !args.no_clean && build.clean_before_build,
        include_debug_symbols: !args.no_debug_symbols && build.include_debug_symbols,
        configuration: resolve_configuration(args.configuration.as_deref(), resolver)?,
        deployment_targets: build.deployment_targets,
        architectures: build.architectures,
        build_settings: build.build_settings,
    })
}

fn package_config(args: &PackageArgs, resolver: &ConfigResolver) -> Result<PackageBuildConfig> {
    let package = resolver.package();
    let build = resolver.build();

    Ok(PackageBuildConfig {
        package_dir: args.package_dir.clone().unwrap_or(package.path),
        targets: if args.targets.is_empty() {
            package.targets
        } else {
            args.targets.clone()
        },
        platforms: resolve_platforms(&args.platforms, resolver)?,
        output_dir: args.output.clone().unwrap_or(build.output_dir),
        configuration: resolve_configuration(args.configuration.as_deref(), resolver)?,
        library_evolution: !args.no_library_evolution && build.library_evolution,
        version: args.os_version.clone().or(package.version),
        deployment_targets: build.deployment_targets,
    })
}

fn write_starter_config(path: &Path, scheme: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{:?} already exists\n\nPass --force to overwrite it.", path);
    }
    ensure_parent_dir(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("toml") {
        fs::write(path, XcforgeConfig::generate_starter_toml(scheme))
            .with_context(|| format!("writing {:?}", path))
    } else {
        XcforgeConfig::starter(scheme).save_to_file(path)
    }
}

fn write_report<T: Serialize>(path: &Path, command: &str, result: &T) -> Result<()> {
    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting report timestamp")?;
    let report = Report {
        generated_at,
        command,
        xcforge_version: xcforge_sdk::VERSION,
        result,
    };
    let contents = serde_json::to_string_pretty(&report)?;
    ensure_parent_dir(path)?;
    fs::write(path, contents).with_context(|| format!("writing report {:?}", path))?;
    log::info!("Wrote report to {}", path.display());
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating directory {:?}", parent))?;
    }
    Ok(())
}

fn render_platforms() -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<20} {:<18} {:<18} {}",
        "IDENTIFIER", "NAME", "SDK", "ARCHITECTURES", "DEFAULT TARGET"
    );
    for p in PLATFORMS {
        let _ = writeln!(
            out,
            "{:<20} {:<20} {:<18} {:<18} {}",
            p.identifier,
            p.display_name,
            p.sdk_name,
            p.architectures.join(","),
            p.default_deployment_target
        );
    }
    out
}

fn render_assembly(result: &AssemblyResult) -> String {
    let mut out = String::new();
    for archive in &result.archives {
        let status = if archive.success { "ok" } else { "failed" };
        let _ = writeln!(out, "  {:<20} {}", archive.platform_name, status);
    }
    for slice in &result.slices {
        let status = if slice.success { "ok" } else { "failed" };
        let _ = writeln!(out, "  {:<34} {}", slice.sdk.triple(false), status);
    }
    for error in &result.errors {
        let _ = writeln!(out, "  error: {}", error);
    }
    match &result.bundle_path {
        Some(path) if result.success => {
            let _ = writeln!(out, "Created {}", path.display());
        }
        _ => {
            let _ = writeln!(out, "Build failed");
        }
    }
    out
}

fn render_package(result: &PackageBuildResult) -> String {
    let mut out = String::new();
    for outcome in &result.targets {
        let _ = writeln!(out, "{}:", outcome.target);
        out.push_str(&render_assembly(&outcome.result));
    }
    // Errors raised before or between targets.
    let target_errors: usize = result.targets.iter().map(|t| t.result.errors.len()).sum();
    if result.errors.len() > target_errors {
        for error in &result.errors {
            if !result.targets.iter().any(|t| error.starts_with(&format!("{}: ", t.target))) {
                let _ = writeln!(out, "error: {}", error);
            }
        }
    }
    let _ = writeln!(
        out,
        "{} of {} target(s) built",
        result.targets_completed.len(),
        result.targets.len()
    );
    out
}
