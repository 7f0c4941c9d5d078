//! Progress hub for the Plyforge platform.
//!
//! The hub maps opaque client identifiers to live notification channels.
//! Delivery is addressed (one recipient per message), best-effort, and
//! at-most-once: messages for an unknown identifier are silently dropped,
//! and a closed channel is evicted on the first failed push so future calls
//! treat the identifier as absent. Nothing is queued or retried.
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

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, error};

/// Sending half of a subscriber's progress channel.
pub type ProgressSender = mpsc::UnboundedSender<String>;

/// Receiving half of a subscriber's progress channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<String>;

/// Create an unbounded progress channel pair for one subscriber.
#[must_use]
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Shared registry of progress subscribers keyed by client identifier.
///
/// At most one channel is held per identifier; registering again replaces
/// the previous channel. The map is the only state shared across concurrent
/// batches, so every mutation goes through a single mutex.
#[derive(Clone, Default)]
pub struct ProgressHub {
    subscribers: Arc<Mutex<HashMap<String, ProgressSender>>>,
}

impl ProgressHub {
    /// Construct an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` as the channel for `client_id`, replacing any
    /// existing registration for that identifier.
    pub fn register(&self, client_id: impl Into<String>, sender: ProgressSender) {
        let client_id = client_id.into();
        let mut guard = self.lock_subscribers();
        if guard.insert(client_id.clone(), sender).is_some() {
            debug!(client_id = %client_id, "replaced existing progress channel");
        }
    }

    /// Remove the registration for `client_id`. Calling this for an unknown
    /// identifier is a no-op.
    pub fn unregister(&self, client_id: &str) {
        self.lock_subscribers().remove(client_id);
    }

    /// Remove the registration for `client_id` only if it still refers to
    /// `sender`.
    ///
    /// A disconnecting subscriber uses this so that its teardown cannot
    /// clobber a replacement channel registered by a reconnect.
    pub fn unregister_channel(&self, client_id: &str, sender: &ProgressSender) -> bool {
        let mut guard = self.lock_subscribers();
        if guard
            .get(client_id)
            .is_some_and(|current| current.same_channel(sender))
        {
            guard.remove(client_id);
            return true;
        }
        false
    }

    /// Push `message` to the subscriber registered under `client_id`.
    ///
    /// Returns `true` when the message was handed to a live channel. An
    /// absent identifier drops the message silently; a closed channel is
    /// evicted and also reported as `false`. The result is safe to discard.
    pub fn try_notify(&self, client_id: &str, message: impl Into<String>) -> bool {
        let mut guard = self.lock_subscribers();
        let Some(sender) = guard.get(client_id) else {
            return false;
        };
        if sender.send(message.into()).is_ok() {
            return true;
        }
        guard.remove(client_id);
        drop(guard);
        debug!(client_id = %client_id, "evicted closed progress channel");
        false
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, HashMap<String, ProgressSender>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("progress subscriber mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}
