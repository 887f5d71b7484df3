//! Outstanding requests awaiting a reply.
//!
//! Requests are keyed by their sequence tag and belong to one transport
//! session. Closing the table resolves every entry with the same error and
//! refuses new registrations until the next session opens it again.
//!
//! A registration is withdrawn by [`PendingGuard`] when its caller stops
//! waiting, whether it timed out, failed or was simply dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fountain_core::{ConfigUpdate, StatusUpdate};
use fountain_protocol::{CommandCode, Response};
use tokio::sync::oneshot;
use tracing::debug;

use crate::connection::ConnectionState;
use crate::error::{CommandError, CommandResult};

/// State change the device confirms by acknowledging a control command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AckPatch {
    Status(StatusUpdate),
    Config(ConfigUpdate),
}

/// Receives the outcome of one request.
pub(crate) type ReplyReceiver = oneshot::Receiver<CommandResult<Response>>;

/// One outstanding request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    id: u64,
    pub(crate) code: CommandCode,
    pub(crate) patch: Option<AckPatch>,
    tx: oneshot::Sender<CommandResult<Response>>,
}

impl PendingRequest {
    /// Delivers the outcome. The caller may have given up already.
    pub(crate) fn resolve(self, result: CommandResult<Response>) {
        let _ = self.tx.send(result);
    }
}

/// Identifies one registration. Tags are reused, ids are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub(crate) seq: u8,
    id: u64,
}

#[derive(Debug, Default)]
struct Inner {
    session: Option<u64>,
    next_seq: u8,
    next_id: u64,
    entries: HashMap<u8, PendingRequest>,
}

impl Inner {
    /// Picks the next tag not held by an outstanding request.
    fn allocate(&mut self) -> CommandResult<u8> {
        for _ in 0..=u8::MAX {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            if !self.entries.contains_key(&seq) {
                return Ok(seq);
            }
        }
        Err(CommandError::TagsExhausted)
    }

    fn check_session(&self, session: u64) -> CommandResult<()> {
        match self.session {
            Some(current) if current == session => Ok(()),
            Some(_) => Err(CommandError::ConnectionLost),
            None => Err(CommandError::NotConnected {
                state: ConnectionState::Disconnected,
            }),
        }
    }
}

/// Table of outstanding requests for the current session.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    inner: Mutex<Inner>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepts requests for `session`.
    pub(crate) fn open(&self, session: u64) {
        let mut inner = self.lock();
        inner.session = Some(session);
    }

    /// Resolves every outstanding request with `error` and stops accepting
    /// new ones. Returns how many requests were resolved.
    pub(crate) fn close(&self, error: CommandError) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.lock();
            inner.session = None;
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            entry.resolve(Err(error.clone()));
        }
        if count > 0 {
            debug!(count, %error, "Resolved outstanding requests");
        }
        count
    }

    /// Registers a request and returns its ticket.
    pub(crate) fn register(
        &self,
        session: u64,
        code: CommandCode,
        patch: Option<AckPatch>,
    ) -> CommandResult<(Ticket, ReplyReceiver)> {
        let mut inner = self.lock();
        inner.check_session(session)?;
        let seq = inner.allocate()?;
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = oneshot::channel();
        inner.entries.insert(
            seq,
            PendingRequest {
                id,
                code,
                patch,
                tx,
            },
        );
        Ok((Ticket { seq, id }, rx))
    }

    /// Ties the registration to a guard that withdraws it when dropped.
    pub(crate) fn guard(&self, ticket: Ticket) -> PendingGuard<'_> {
        PendingGuard {
            table: self,
            ticket,
        }
    }

    /// Returns a tag for a command that gets no reply.
    pub(crate) fn tag(&self, session: u64) -> CommandResult<u8> {
        let mut inner = self.lock();
        inner.check_session(session)?;
        inner.allocate()
    }

    /// Removes the request matching both tag and command code.
    pub(crate) fn take(&self, seq: u8, code: CommandCode) -> Option<PendingRequest> {
        let mut inner = self.lock();
        match inner.entries.get(&seq) {
            Some(entry) if entry.code == code => inner.entries.remove(&seq),
            _ => None,
        }
    }

    /// Withdraws a request if it is still outstanding. A later request
    /// holding the same tag is left alone.
    pub(crate) fn withdraw(&self, ticket: Ticket) -> bool {
        let mut inner = self.lock();
        match inner.entries.get(&ticket.seq) {
            Some(entry) if entry.id == ticket.id => inner.entries.remove(&ticket.seq).is_some(),
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

/// Withdraws its registration on drop.
#[derive(Debug)]
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingTable,
    ticket: Ticket,
}

impl PendingGuard<'_> {
    pub(crate) fn seq(&self) -> u8 {
        self.ticket.seq
    }

    /// Withdraws now; returns false if the request was already resolved.
    pub(crate) fn withdraw(&self) -> bool {
        self.table.withdraw(self.ticket)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.withdraw(self.ticket);
    }
}
