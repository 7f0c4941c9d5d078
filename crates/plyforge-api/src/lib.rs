//! HTTP and WebSocket surface for the Plyforge reconstruction service.
//!
//! Layout: `router.rs` (server construction and hosting), `handlers.rs`
//! (upload/download endpoints), `ws.rs` (progress subscriber endpoint),
//! `state.rs` (shared application state), `error.rs` (response error
//! wrapper).
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

mod error;
mod handlers;
mod router;
mod state;
mod ws;

pub use error::ApiServerError;
pub use router::ApiServer;

/// Public mount under which batch workspaces are served for download.
pub const ARTIFACTS_MOUNT: &str = "/artifacts";
