//! Build stages of the XCFramework pipeline.
//!
//! ## Stages
//!
//! | Component | Input | Output |
//! |-----------|-------|--------|
//! | [`SliceBuilder`] | package target + [`crate::SdkSpec`] | single-architecture `.framework` |
//! | [`ArchitectureMerger`] | same-platform slices | fat `.framework` |
//! | [`BundleAssembler`] | slices or archives | `.xcframework` |
//! | [`Archiver`] | Xcode project + platform | `.xcarchive` |
//! | [`Cleaner`] | output directory | removed artifacts |
//!
//! Every stage reports failure through its result value; none of them
//! returns early from a sibling's work. The `common` module holds the
//! filesystem helpers they share.

pub mod archive;
pub mod assemble;
pub mod clean;
pub mod common;
pub mod merge;
pub mod slice;

pub use archive::Archiver;
pub use assemble::{AssembleOptions, BundleAssembler};
pub use clean::{CleanReport, Cleaner};
pub use merge::{ArchitectureMerger, PlatformGroup, group_by_platform};
pub use slice::{SliceBuilder, SliceLayout};
