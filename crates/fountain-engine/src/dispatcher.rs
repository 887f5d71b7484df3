//! Routes inbound frames to waiting requests or to the device state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use fountain_protocol::{Frame, Response};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::CommandError;
use crate::pending::{AckPatch, PendingTable};
use crate::store::StateStore;

/// How many resolved replies are remembered for duplicate detection.
const RECENT_REPLIES: usize = 16;

/// A copy of a reply arriving later than this is treated as a fresh update.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(5);

/// Consumes decoded frames in arrival order for one session.
///
/// A frame whose tag and command code match an outstanding request is that
/// request's reply: its payload is decoded, applied to the state, and only
/// then handed to the caller. Everything else is an unsolicited update.
pub(crate) struct Dispatcher {
    pending: Arc<PendingTable>,
    store: StateStore,
    recent: VecDeque<(Frame, Instant)>,
    duplicates: u64,
}

impl Dispatcher {
    pub(crate) fn new(pending: Arc<PendingTable>, store: StateStore) -> Self {
        Self {
            pending,
            store,
            recent: VecDeque::with_capacity(RECENT_REPLIES),
            duplicates: 0,
        }
    }

    pub(crate) fn dispatch(&mut self, frame: Frame) {
        trace!(%frame, "Inbound frame");

        if let Some(request) = self.pending.take(frame.seq, frame.code) {
            match Response::from_frame(&frame) {
                Ok(response) => {
                    self.store.apply_response(&response);
                    if matches!(response, Response::Ack(_)) {
                        match &request.patch {
                            Some(AckPatch::Status(update)) => {
                                self.store.apply_status(std::slice::from_ref(update));
                            }
                            Some(AckPatch::Config(update)) => {
                                self.store.apply_config(update);
                            }
                            None => {}
                        }
                    }
                    request.resolve(Ok(response));
                }
                Err(err) => {
                    warn!(seq = frame.seq, command = %frame.code, error = %err, "Undecodable reply");
                    request.resolve(Err(CommandError::decode(frame.code, &err)));
                }
            }
            self.remember(frame);
            return;
        }

        if self.is_duplicate(&frame) {
            self.duplicates += 1;
            trace!(
                seq = frame.seq,
                command = %frame.code,
                dropped = self.duplicates,
                "Dropping duplicate reply"
            );
            return;
        }

        match Response::from_frame(&frame) {
            Ok(Response::Ack(code)) => {
                debug!(seq = frame.seq, command = %code, "Dropping unmatched acknowledgement");
            }
            Ok(response) => {
                if !self.store.apply_response(&response) {
                    trace!(command = %frame.code, "Update carried no changes");
                }
            }
            Err(err) => {
                warn!(seq = frame.seq, command = %frame.code, error = %err, "Dropping malformed update");
            }
        }
    }

    fn remember(&mut self, frame: Frame) {
        if self.recent.len() == RECENT_REPLIES {
            self.recent.pop_front();
        }
        self.recent.push_back((frame, Instant::now()));
    }

    /// True for a byte-identical copy of a reply resolved within the window.
    fn is_duplicate(&mut self, frame: &Frame) -> bool {
        let now = Instant::now();
        self.recent
            .retain(|(_, resolved_at)| now.duration_since(*resolved_at) < DUPLICATE_WINDOW);
        self.recent.iter().any(|(recent, _)| recent == frame)
    }
}
