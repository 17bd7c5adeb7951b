//! XCFramework build pipeline
//!
//! `xcforge-sdk` turns a Swift package target or an Xcode scheme into a
//! multi-platform `.xcframework` bundle by driving the Apple toolchain
//! (`swift build`, `xcrun`, `libtool`, `lipo`, `xcodebuild`).
//!
//! # Swift packages
//!
//! For each requested platform the target is compiled once per architecture
//! into a standalone `.framework` slice. Slices of one platform are combined
//! with `lipo`, and every platform is finally handed to
//! `xcodebuild -create-xcframework`.
//!
//! ```ignore
//! use xcforge_sdk::{BuildContext, BuildOrchestrator, PackageBuildConfig, ProcessToolchain};
//!
//! let ctx = BuildContext::new().jobs(2);
//! let toolchain = ProcessToolchain::from_context(&ctx);
//! let config = PackageBuildConfig {
//!     package_dir: "path/to/Package".into(),
//!     targets: vec!["Widgets".to_string()],
//!     platforms: vec!["ios".to_string(), "ios-simulator".to_string()],
//!     output_dir: "build".into(),
//!     ..PackageBuildConfig::default()
//! };
//!
//! let result = BuildOrchestrator::new(&toolchain, ctx).build_from_package(&config);
//! for path in &result.bundle_paths {
//!     println!("created {}", path.display());
//! }
//! ```
//!
//! # Xcode projects
//!
//! [`BuildOrchestrator::build`] archives a scheme once per platform with
//! `xcodebuild archive` and assembles the archived frameworks, along with
//! their dSYMs.
//!
//! # Architecture
//!
//! - **Platform registry**: [`platform::PLATFORMS`], one row per platform
//! - **Toolchain**: the [`Toolchain`] trait, the only place processes are spawned
//! - **Builders**: slice, merge, assemble, archive and clean stages
//! - **Orchestrator**: sequences the stages and collects per-unit results
//!
//! Every stage returns a result value; a failed slice or archive is recorded
//! and skipped, and the build fails only when nothing usable is left.

pub mod builders;
pub mod orchestrator;
pub mod package;
pub mod platform;
pub mod sdk;
pub mod templates;
pub mod toolchain;
pub mod types;

#[cfg(test)]
mod testing;

pub use orchestrator::BuildOrchestrator;
pub use package::{PackageDescriptor, PackageTarget, TargetKind};
pub use platform::{PLATFORMS, Platform, SdkEnvironment};
pub use sdk::SdkSpec;
pub use toolchain::{Formatter, Invocation, ProcessToolchain, ToolOutput, Toolchain};
pub use types::{
    ArchiveResult, AssemblyResult, BuildConfiguration, BuildContext, BuildTarget, MergedSlice,
    PackageBuildConfig, PackageBuildResult, ProjectBuildConfig, SliceResult, Stage, TargetOutcome,
    XcforgeError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
