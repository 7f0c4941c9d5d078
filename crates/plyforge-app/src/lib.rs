//! Plyforge application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (environment configuration and service wiring),
//! `error.rs` (application-level error type).
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

/// Application bootstrap and environment loading.
pub mod bootstrap;
mod error;

pub use bootstrap::{AppConfig, run_app};
pub use error::{AppError, AppResult};
