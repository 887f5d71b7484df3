//! Connection manager.
//!
//! Owns the single transport session and drives it through
//! [`ConnectionState`]:
//!
//! ```text
//! Disconnected -> Connecting -> Initializing -> Ready
//!                     ^              |            |
//!                     |              v            v
//!                     +-------- Reconnecting <----+
//!
//! any state --shutdown--> Closing -> Disconnected
//! ```
//!
//! Each session runs a reader task (notifications into the dispatcher) and a
//! writer task (the ordered outbound queue into the link). The manager task
//! runs initialization, the keep-alive heartbeat and the silence watchdog.
//! Losing the link in any way leads to Reconnecting; only an explicit
//! shutdown stops the loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fountain_core::{ProductModel, StatusUpdate};
use fountain_protocol::FrameAssembler;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::client::{FountainClient, Outbound, Shared};
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{CommandError, EngineResult, TransportError};
use crate::pending::PendingTable;
use crate::reconnect::ReconnectPolicy;
use crate::shutdown::ShutdownHandle;
use crate::store::StateStore;
use crate::transport::{Connector, Link, Notifications};

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Reconnecting,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Published connection status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the device was last ready.
    pub attempt: u32,
    /// Id of the current or most recent transport session.
    pub session: u64,
}

impl ConnectionStatus {
    /// Returns true when commands are accepted.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }
}

/// Why a session ended without a shutdown.
#[derive(Debug, Error)]
enum LinkLoss {
    #[error("notification stream ended")]
    StreamEnded,
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("no inbound traffic for {0:?}")]
    Silence(Duration),
    #[error("initialization failed: {0}")]
    Init(CommandError),
}

/// Drives the connection to one fountain.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    client: FountainClient,
    status_tx: watch::Sender<ConnectionStatus>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<Outbound>>>,
    shutdown: ShutdownHandle,
    policy: ReconnectPolicy,
    session: u64,
}

impl ConnectionManager {
    /// Creates a manager. Nothing happens until [`run`](Self::run) is
    /// awaited.
    pub fn new(connector: impl Connector + 'static, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity);
        let policy = ReconnectPolicy::new(config.reconnect_schedule.clone());
        let shared = Arc::new(Shared {
            config,
            pending: Arc::new(PendingTable::new()),
            store: StateStore::new(None),
            connection: status_rx,
            outbound: outbound_tx,
        });

        Ok(Self {
            connector: Arc::new(connector),
            client: FountainClient::new(shared.clone()),
            shared,
            status_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            shutdown: ShutdownHandle::new(),
            policy,
            session: 0,
        })
    }

    /// Builder: set the model identified from the advertisement.
    pub fn with_model(self, model: Option<ProductModel>) -> Self {
        self.shared.store.reset(model);
        self
    }

    /// Builder: use an existing shutdown handle.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Returns a command handle.
    pub fn client(&self) -> FountainClient {
        self.client.clone()
    }

    /// Returns the handle that stops [`run`](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Returns a receiver for connection status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Connects and keeps reconnecting until shutdown.
    pub async fn run(mut self) {
        info!("Connection manager started");

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }

            self.session += 1;
            self.publish(ConnectionState::Connecting);

            let timeout = self.shared.config.connect_timeout;
            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = tokio::time::timeout(timeout, self.connector.connect()) => {
                    result.unwrap_or(Err(TransportError::ConnectTimeout(timeout)))
                }
            };

            let delay = match connected {
                Ok(link) => {
                    let span = info_span!("session", id = self.session);
                    match self.run_session(link).instrument(span).await {
                        Some(delay) => delay,
                        None => break,
                    }
                }
                Err(err) => {
                    warn!(error = %err, session = self.session, "Connect failed");
                    self.enter_reconnecting()
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.enter_closing();
        self.publish(ConnectionState::Disconnected);
        info!("Connection manager stopped");
    }

    /// Runs one session to its end and tears it down. Returns the backoff
    /// delay, or `None` on shutdown.
    async fn run_session(&mut self, link: Arc<dyn Link>) -> Option<Duration> {
        let session = self.session;
        self.shared.pending.open(session);
        self.publish(ConnectionState::Initializing);

        let subscribed = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = link.subscribe() => Some(result),
        };
        let notifications = match subscribed {
            None => {
                self.enter_closing();
                disconnect(&link, self.shared.config.write_timeout).await;
                return None;
            }
            Some(Err(err)) => {
                warn!(error = %err, session, "Subscribe failed");
                let delay = self.enter_reconnecting();
                disconnect(&link, self.shared.config.write_timeout).await;
                return Some(delay);
            }
            Some(Ok(notifications)) => notifications,
        };

        let (loss_tx, mut loss_rx) = mpsc::channel(4);
        let (activity_tx, activity_rx) = watch::channel(Instant::now());
        let mut tasks = SessionTasks::spawn(
            session,
            link.clone(),
            notifications,
            Dispatcher::new(self.shared.pending.clone(), self.shared.store.clone()),
            self.outbound_rx.clone(),
            activity_tx,
            loss_tx,
            self.shared.config.write_timeout,
        );

        let initialized = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            Some(loss) = loss_rx.recv() => Some(Err(loss)),
            result = self.client.initialize() => Some(result.map_err(LinkLoss::Init)),
        };

        let end = match initialized {
            None => None,
            Some(Err(loss)) => Some(loss),
            Some(Ok(_)) => {
                self.policy.reset();
                self.publish(ConnectionState::Ready);
                self.ready_loop(&link, &mut loss_rx, &activity_rx, &mut tasks)
                    .await
            }
        };

        let delay = match end {
            None => {
                self.enter_closing();
                None
            }
            Some(loss) => {
                warn!(reason = %loss, session, "Link lost");
                Some(self.enter_reconnecting())
            }
        };

        tasks.stop().await;
        disconnect(&link, self.shared.config.write_timeout).await;
        delay
    }

    /// Heartbeat and silence watchdog while ready. Returns the loss reason,
    /// or `None` on shutdown.
    async fn ready_loop(
        &self,
        link: &Arc<dyn Link>,
        loss_rx: &mut mpsc::Receiver<LinkLoss>,
        activity: &watch::Receiver<Instant>,
        tasks: &mut SessionTasks,
    ) -> Option<LinkLoss> {
        let config = &self.shared.config;
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + config.heartbeat_interval,
            config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = *activity.borrow() + config.silence_window;
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                Some(loss) = loss_rx.recv() => return Some(loss),
                _ = heartbeat.tick() => {
                    trace!("Heartbeat");
                    let round = heartbeat_round(
                        self.client.clone(),
                        link.clone(),
                        self.shared.store.clone(),
                    );
                    let round = tokio::spawn(round.in_current_span());
                    tasks.replace_heartbeat(round);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if *activity.borrow() + config.silence_window <= Instant::now() {
                        return Some(LinkLoss::Silence(config.silence_window));
                    }
                }
            }
        }
    }

    /// Fails outstanding requests, then publishes Reconnecting. Returns the
    /// delay before the next attempt.
    fn enter_reconnecting(&mut self) -> Duration {
        self.shared.pending.close(CommandError::ConnectionLost);
        let delay = self.policy.next_delay();
        self.publish(ConnectionState::Reconnecting);
        info!(
            attempt = self.policy.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting"
        );
        delay
    }

    fn enter_closing(&self) {
        self.publish(ConnectionState::Closing);
        self.shared.pending.close(CommandError::ConnectionLost);
    }

    fn publish(&self, state: ConnectionState) {
        let next = ConnectionStatus {
            state,
            attempt: self.policy.attempt(),
            session: self.session,
        };
        let changed = self.status_tx.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
        if changed {
            info!(state = %state, attempt = next.attempt, session = next.session, "Connection state changed");
        }
    }
}

/// Tasks belonging to one session.
struct SessionTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    stop_writer: Option<oneshot::Sender<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl SessionTasks {
    #[allow(clippy::too_many_arguments)]
    fn spawn(
        session: u64,
        link: Arc<dyn Link>,
        notifications: Notifications,
        dispatcher: Dispatcher,
        queue: Arc<Mutex<mpsc::Receiver<Outbound>>>,
        activity: watch::Sender<Instant>,
        loss_tx: mpsc::Sender<LinkLoss>,
        write_timeout: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let reader = tokio::spawn(
            read_loop(notifications, dispatcher, activity, loss_tx.clone()).in_current_span(),
        );
        let writer = tokio::spawn(
            write_loop(session, link, queue, stop_rx, loss_tx, write_timeout).in_current_span(),
        );
        Self {
            reader,
            writer,
            stop_writer: Some(stop_tx),
            heartbeat: None,
        }
    }

    fn replace_heartbeat(&mut self, round: JoinHandle<()>) {
        if let Some(previous) = self.heartbeat.replace(round) {
            previous.abort();
        }
    }

    async fn stop(mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.reader.abort();
        if let Some(stop) = self.stop_writer.take() {
            let _ = stop.send(());
        }
        if let Err(err) = self.writer.await
            && err.is_panic()
        {
            warn!("Writer task panicked");
        }
        let _ = self.reader.await;
    }
}

async fn read_loop(
    mut notifications: Notifications,
    mut dispatcher: Dispatcher,
    activity: watch::Sender<Instant>,
    loss_tx: mpsc::Sender<LinkLoss>,
) {
    let mut assembler = FrameAssembler::new();
    while let Some(chunk) = notifications.next().await {
        activity.send_replace(Instant::now());
        assembler.push(&chunk);
        while let Some(decoded) = assembler.next_frame() {
            match decoded {
                Ok(frame) => dispatcher.dispatch(frame),
                Err(err) => warn!(error = %err, "Dropping undecodable frame"),
            }
        }
    }

    debug!("Notification stream ended");
    let _ = loss_tx.send(LinkLoss::StreamEnded).await;
}

async fn write_loop(
    session: u64,
    link: Arc<dyn Link>,
    queue: Arc<Mutex<mpsc::Receiver<Outbound>>>,
    mut stop: oneshot::Receiver<()>,
    loss_tx: mpsc::Sender<LinkLoss>,
    write_timeout: Duration,
) {
    let mut queue = queue.lock().await;
    loop {
        let item = tokio::select! {
            biased;
            _ = &mut stop => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        if item.session != session {
            debug!(
                seq = item.seq,
                command = %item.code,
                queued_for = item.session,
                "Dropping frame queued for an earlier session"
            );
            continue;
        }

        let result = tokio::time::timeout(write_timeout, link.write(item.bytes))
            .await
            .unwrap_or_else(|_| Err(TransportError::write(format!("timed out after {write_timeout:?}"))));

        match result {
            Ok(()) => {
                trace!(seq = item.seq, command = %item.code, "Frame written");
                if let Some(written) = item.written {
                    let _ = written.send(Ok(()));
                }
            }
            Err(err) => {
                warn!(seq = item.seq, command = %item.code, error = %err, "Write failed");
                if let Some(written) = item.written {
                    let _ = written.send(Err(err.clone()));
                }
                let _ = loss_tx.send(LinkLoss::Transport(err)).await;
                break;
            }
        }
    }
}

/// One keep-alive round: battery, full status and signal strength.
async fn heartbeat_round(client: FountainClient, link: Arc<dyn Link>, store: StateStore) {
    if let Err(err) = client.read_battery().await {
        debug!(error = %err, "Keep-alive battery query failed");
    }
    if let Err(err) = client.refresh().await {
        debug!(error = %err, "Keep-alive status query failed");
    }
    if let Some(dbm) = link.rssi().await {
        store.apply_status(&[StatusUpdate::Rssi { dbm }]);
    }
}

async fn disconnect(link: &Arc<dyn Link>, timeout: Duration) {
    match tokio::time::timeout(timeout, link.disconnect()).await {
        Ok(Ok(())) => debug!("Link closed"),
        Ok(Err(err)) => debug!(error = %err, "Link did not close cleanly"),
        Err(_) => debug!("Link close timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn status_readiness() {
        let status = ConnectionStatus {
            state: ConnectionState::Ready,
            attempt: 0,
            session: 3,
        };
        assert!(status.is_ready());
        assert!(!ConnectionStatus::default().is_ready());
    }
}
