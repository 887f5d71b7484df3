//! Published device state.
//!
//! The state lives in a `watch` channel: writers patch it in place and
//! readers get consistent snapshots. Every patch is applied inside a single
//! `send_if_modified` call, so a reader never sees half of a decoded
//! message.

use std::sync::Arc;

use fountain_core::{ConfigUpdate, DeviceState, Info, InfoCommit, ProductModel, StatusUpdate};
use fountain_protocol::Response;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Shared handle to the device state.
#[derive(Debug, Clone)]
pub(crate) struct StateStore {
    tx: Arc<watch::Sender<DeviceState>>,
}

impl StateStore {
    pub(crate) fn new(model: Option<ProductModel>) -> Self {
        let (tx, _rx) = watch::channel(DeviceState::with_model(model));
        Self { tx: Arc::new(tx) }
    }

    /// Starts over with an empty state for `model`.
    pub(crate) fn reset(&self, model: Option<ProductModel>) {
        self.tx.send_replace(DeviceState::with_model(model));
    }

    pub(crate) fn snapshot(&self) -> DeviceState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.tx.subscribe()
    }

    /// Applies status patches together. Returns true if anything changed.
    pub(crate) fn apply_status(&self, updates: &[StatusUpdate]) -> bool {
        self.tx.send_if_modified(|state| {
            updates
                .iter()
                .fold(false, |changed, update| state.apply_status(update) | changed)
        })
    }

    pub(crate) fn apply_config(&self, update: &ConfigUpdate) -> bool {
        self.tx.send_if_modified(|state| state.apply_config(update))
    }

    /// Applies everything a decoded message carries in one step.
    pub(crate) fn apply_response(&self, response: &Response) -> bool {
        let updates = response.status_updates();
        let config = response.config_update();
        if updates.is_empty() && config.is_none() {
            return false;
        }

        let changed = self.tx.send_if_modified(|state| {
            let mut changed = updates
                .iter()
                .fold(false, |changed, update| state.apply_status(update) | changed);
            if let Some(config) = &config {
                changed |= state.apply_config(config);
            }
            changed
        });
        if changed {
            debug!(?response, "Device state updated");
        }
        changed
    }

    pub(crate) fn commit_info(&self, info: Info) -> InfoCommit {
        let mut outcome = InfoCommit::Unchanged;
        self.tx.send_if_modified(|state| {
            outcome = state.commit_info(info);
            outcome == InfoCommit::Written
        });
        if outcome == InfoCommit::Conflict {
            warn!("Device reported a different identity; keeping the first one");
        }
        outcome
    }
}
