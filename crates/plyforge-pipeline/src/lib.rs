//! Batch processing stages for the reconstruction pipeline.
//!
//! Layout: `extract.rs` (video to ordered frames), `convert.rs` (per-frame
//! reconstruction with progress fan-out and partial-failure tolerance).
//!
//! Both stages drive opaque external tools through
//! [`plyforge_tools::ToolRunner`] and suspend while waiting on them, so
//! several batches can be in flight without blocking each other. Within one
//! batch the frame loop is strictly sequential; progress counters are
//! therefore monotonic and gap-free by construction.
#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

mod convert;
mod error;
mod extract;

pub use convert::{ConverterConfig, FrameConverter};
pub use error::{PipelineError, PipelineResult};
pub use extract::{ExtractorConfig, FrameExtractor};
