//! Command interface.
//!
//! [`FountainClient`] is a cheap, cloneable handle. Every command allocates a
//! sequence tag, registers a pending request, queues its frame on the single
//! ordered outbound queue and waits for the dispatcher to resolve it. Replies
//! are matched by tag and command code, never by arrival order, so any
//! number of clones may issue commands concurrently.

use std::sync::Arc;

use chrono::Utc;
use fountain_core::{
    BatteryReading, ConfigUpdate, DerivedMetrics, DeviceConfig, DeviceState, FirmwareVersion,
    Info, MinuteOfDay, Mode, PowerState, Status, StatusUpdate,
};
use fountain_protocol::{Command, CommandCode, Response};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::error::{CommandError, CommandResult, TransportResult};
use crate::pending::{AckPatch, PendingTable};
use crate::store::StateStore;

/// A frame waiting in the outbound queue.
pub(crate) struct Outbound {
    pub(crate) session: u64,
    pub(crate) seq: u8,
    pub(crate) code: CommandCode,
    pub(crate) bytes: Vec<u8>,
    /// Notified once the frame has been written, for commands without a
    /// reply.
    pub(crate) written: Option<oneshot::Sender<TransportResult<()>>>,
}

/// State shared between the manager and every client handle.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) pending: Arc<PendingTable>,
    pub(crate) store: StateStore,
    pub(crate) connection: watch::Receiver<ConnectionStatus>,
    pub(crate) outbound: mpsc::Sender<Outbound>,
}

/// Which connection states a command may be issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Ready,
    /// Handshake commands also run while the session initializes.
    Init,
}

impl Gate {
    fn allows(self, state: ConnectionState) -> bool {
        match self {
            Self::Ready => state == ConnectionState::Ready,
            Self::Init => matches!(state, ConnectionState::Initializing | ConnectionState::Ready),
        }
    }
}

/// Handle for commanding one fountain and reading its state.
#[derive(Clone)]
pub struct FountainClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FountainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FountainClient")
            .field("connection", &*self.shared.connection.borrow())
            .finish_non_exhaustive()
    }
}

impl FountainClient {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Runs the initialization sequence.
    ///
    /// Reads the identifiers, writes the pairing secret, checks the device
    /// reports itself initialized, sets its clock, then reads firmware,
    /// battery, state and settings. The identity is only recorded once every
    /// step has succeeded.
    ///
    /// The connection manager calls this on every new session. Sending the
    /// initialize command breaks the vendor app's pairing until the fountain
    /// is power cycled.
    pub async fn initialize(&self) -> CommandResult<Info> {
        let (device_id, serial) = match self.execute(Command::QueryIdentifiers, None, Gate::Init).await? {
            Response::Identifiers { device_id, serial } => (device_id, serial),
            other => return Err(unexpected(CommandCode::Identifiers, &other)),
        };
        debug!(device_id, %serial, "Identifiers read");

        self.execute(Command::Initialize { device_id }, None, Gate::Init)
            .await?;

        match self
            .execute(Command::Synchronize { device_id }, None, Gate::Init)
            .await?
        {
            Response::Synchronization { initialized: true } => {}
            Response::Synchronization { initialized: false } => {
                return Err(CommandError::protocol(
                    CommandCode::Synchronize,
                    "device reports it is not initialized",
                ));
            }
            other => return Err(unexpected(CommandCode::Synchronize, &other)),
        }

        self.execute(Command::SetDateTime { now: Utc::now() }, None, Gate::Init)
            .await?;

        let firmware = self.firmware(Gate::Init).await?;

        tokio::try_join!(
            self.execute(Command::QueryBattery, None, Gate::Init),
            self.execute(Command::QueryState, None, Gate::Init),
        )?;
        self.execute(Command::QueryConfig, None, Gate::Init).await?;

        let info = Info {
            device_id,
            serial,
            firmware,
            model: self.shared.store.snapshot().model(),
        };
        self.shared.store.commit_info(info.clone());
        info!(device_id, serial = %info.serial, firmware = %info.firmware, "Device initialized");
        Ok(info)
    }

    /// Queries the pump state.
    pub async fn read_status(&self) -> CommandResult<Status> {
        self.execute(Command::QueryState, None, Gate::Ready).await?;
        Ok(self.status())
    }

    /// Queries the settings.
    pub async fn read_config(&self) -> CommandResult<DeviceConfig> {
        self.execute(Command::QueryConfig, None, Gate::Ready).await?;
        Ok(self.config())
    }

    /// Queries identifiers and firmware.
    pub async fn read_info(&self) -> CommandResult<Info> {
        let (device_id, serial) = match self.execute(Command::QueryIdentifiers, None, Gate::Ready).await? {
            Response::Identifiers { device_id, serial } => (device_id, serial),
            other => return Err(unexpected(CommandCode::Identifiers, &other)),
        };
        let firmware = self.firmware(Gate::Ready).await?;

        let info = Info {
            device_id,
            serial,
            firmware,
            model: self.shared.store.snapshot().model(),
        };
        self.shared.store.commit_info(info.clone());
        Ok(info)
    }

    /// Queries the battery.
    pub async fn read_battery(&self) -> CommandResult<BatteryReading> {
        match self.execute(Command::QueryBattery, None, Gate::Ready).await? {
            Response::Battery(reading) => Ok(reading),
            other => Err(unexpected(CommandCode::Battery, &other)),
        }
    }

    /// Requests a full status report, which updates both status and settings.
    pub async fn refresh(&self) -> CommandResult<Status> {
        self.execute(Command::QueryStatus, None, Gate::Ready).await?;
        Ok(self.status())
    }

    /// Switches the pump on or off, keeping the current mode.
    pub async fn set_power(&self, power: PowerState) -> CommandResult<()> {
        let mode = self.status().mode;
        self.set_power_and_mode(power, mode).await
    }

    /// Switches between normal and smart mode, keeping the current power
    /// state.
    pub async fn set_mode(&self, mode: Mode) -> CommandResult<()> {
        let power = self.status().power;
        self.set_power_and_mode(power, mode).await
    }

    /// Sets the smart mode pumping and pause periods, in minutes.
    pub async fn set_smart_timing(&self, on_minutes: u8, off_minutes: u8) -> CommandResult<()> {
        if on_minutes == 0 {
            return Err(CommandError::invalid_argument(
                "smart mode on period must be at least one minute",
            ));
        }
        self.update_config(|config| {
            config.smart_on_minutes = on_minutes;
            config.smart_off_minutes = off_minutes;
        })
        .await
    }

    /// Sets the LED brightness (0-100).
    pub async fn set_led_brightness(&self, brightness: u8) -> CommandResult<()> {
        if brightness > 100 {
            return Err(CommandError::invalid_argument(format!(
                "LED brightness must be between 0 and 100, got {brightness}"
            )));
        }
        self.update_config(|config| config.led.brightness = brightness)
            .await
    }

    /// Sets the LED switch and its daily window.
    pub async fn set_led_schedule(
        &self,
        enabled: bool,
        on: MinuteOfDay,
        off: MinuteOfDay,
    ) -> CommandResult<()> {
        check_window("LED", on, off)?;
        self.update_config(|config| {
            config.led.enabled = enabled;
            config.led.on = on;
            config.led.off = off;
        })
        .await
    }

    /// Sets the do-not-disturb switch and its daily window.
    pub async fn set_do_not_disturb(
        &self,
        enabled: bool,
        start: MinuteOfDay,
        end: MinuteOfDay,
    ) -> CommandResult<()> {
        check_window("do-not-disturb", start, end)?;
        self.update_config(|config| {
            config.do_not_disturb.enabled = enabled;
            config.do_not_disturb.start = start;
            config.do_not_disturb.end = end;
        })
        .await
    }

    /// Locks or unlocks the physical buttons.
    pub async fn set_child_lock(&self, locked: bool) -> CommandResult<()> {
        self.update_config(|config| config.child_lock = locked)
            .await
    }

    /// Resets the filter life counter after a filter change.
    pub async fn reset_filter(&self) -> CommandResult<()> {
        self.execute(
            Command::ResetFilter,
            Some(AckPatch::Status(StatusUpdate::FilterReset)),
            Gate::Ready,
        )
        .await?;
        Ok(())
    }

    /// Latest known status.
    pub fn status(&self) -> Status {
        self.shared.store.snapshot().status().value().clone()
    }

    /// Latest known settings.
    pub fn config(&self) -> DeviceConfig {
        *self.shared.store.snapshot().config().value()
    }

    /// Device identity, once initialization has completed.
    pub fn info(&self) -> Option<Info> {
        self.shared.store.snapshot().info().cloned()
    }

    /// Snapshot of the whole device state.
    pub fn state(&self) -> DeviceState {
        self.shared.store.snapshot()
    }

    /// Estimates derived from the latest state.
    pub fn metrics(&self) -> DerivedMetrics {
        self.shared.store.snapshot().metrics()
    }

    /// Current connection state.
    pub fn connection(&self) -> ConnectionStatus {
        *self.shared.connection.borrow()
    }

    /// Receiver notified on every device state change.
    ///
    /// The state keeps its last values while the link is down and this
    /// receiver is not notified when that happens. Pair it with
    /// [`subscribe_connection`](Self::subscribe_connection), or check
    /// [`is_stale`](Self::is_stale), to know whether the values are current.
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.shared.store.subscribe()
    }

    /// Receiver notified on every connection state change.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.connection.clone()
    }

    /// Returns true while the state may be out of date because the device
    /// is not ready. Flips with every connection state change, which
    /// [`subscribe_connection`](Self::subscribe_connection) reports.
    pub fn is_stale(&self) -> bool {
        self.connection().state != ConnectionState::Ready
    }

    async fn set_power_and_mode(&self, power: PowerState, mode: Mode) -> CommandResult<()> {
        self.execute(
            Command::SetMode { power, mode },
            Some(AckPatch::Status(StatusUpdate::Mode { power, mode })),
            Gate::Ready,
        )
        .await?;
        Ok(())
    }

    async fn firmware(&self, gate: Gate) -> CommandResult<FirmwareVersion> {
        match self.execute(Command::QueryFirmware, None, gate).await? {
            Response::Firmware(version) => Ok(version),
            other => Err(unexpected(CommandCode::Firmware, &other)),
        }
    }

    /// Writes the current settings with `change` applied.
    async fn update_config(&self, change: impl FnOnce(&mut DeviceConfig)) -> CommandResult<()> {
        let state = self.shared.store.snapshot();
        if !state.config().is_known() {
            return Err(CommandError::ConfigUnavailable);
        }

        let mut config = *state.config().value();
        change(&mut config);
        self.execute(
            Command::SetConfig(config),
            Some(AckPatch::Config(ConfigUpdate::Full(config))),
            Gate::Ready,
        )
        .await?;
        Ok(())
    }

    async fn execute(
        &self,
        command: Command,
        patch: Option<AckPatch>,
        gate: Gate,
    ) -> CommandResult<Response> {
        let status = self.connection();
        if !gate.allows(status.state) {
            return Err(CommandError::NotConnected {
                state: status.state,
            });
        }

        let code = command.code();
        let timeout = self.shared.config.command_timeout;
        let deadline = Instant::now() + timeout;
        let timed_out = CommandError::Timeout {
            command: code,
            timeout,
        };

        if !command.expects_reply() {
            let seq = self.shared.pending.tag(status.session)?;
            let (tx, rx) = oneshot::channel();
            let sent = async {
                self.enqueue(status.session, seq, &command, Some(tx)).await?;
                match rx.await {
                    Ok(Ok(())) => Ok(Response::Ack(code)),
                    Ok(Err(_)) | Err(_) => Err(CommandError::ConnectionLost),
                }
            };
            return tokio::time::timeout_at(deadline, sent)
                .await
                .unwrap_or(Err(timed_out));
        }

        let (ticket, rx) = self
            .shared
            .pending
            .register(status.session, code, patch)?;
        let guard = self.shared.pending.guard(ticket);
        let seq = guard.seq();
        let replied = async {
            self.enqueue(status.session, seq, &command, None).await?;
            rx.await.unwrap_or(Err(CommandError::ConnectionLost))
        };

        match tokio::time::timeout_at(deadline, replied).await {
            Ok(result) => result,
            Err(_) => {
                if guard.withdraw() {
                    debug!(seq, command = %code, "Request timed out");
                }
                Err(timed_out)
            }
        }
    }

    async fn enqueue(
        &self,
        session: u64,
        seq: u8,
        command: &Command,
        written: Option<oneshot::Sender<TransportResult<()>>>,
    ) -> CommandResult<()> {
        let frame = command.to_frame(seq);
        let bytes = frame
            .encode()
            .map_err(|err| CommandError::invalid_argument(err.to_string()))?;
        debug!(seq, command = %frame.code, "Queueing command");

        self.shared
            .outbound
            .send(Outbound {
                session,
                seq,
                code: frame.code,
                bytes,
                written,
            })
            .await
            .map_err(|_| CommandError::Shutdown)
    }
}

fn check_window(name: &str, start: MinuteOfDay, end: MinuteOfDay) -> CommandResult<()> {
    if !start.is_valid() || !end.is_valid() {
        return Err(CommandError::invalid_argument(format!(
            "{name} window must lie within a day, got {start}-{end}"
        )));
    }
    Ok(())
}

fn unexpected(command: CommandCode, response: &Response) -> CommandError {
    CommandError::protocol(command, format!("unexpected response {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates() {
        assert!(Gate::Ready.allows(ConnectionState::Ready));
        assert!(!Gate::Ready.allows(ConnectionState::Initializing));
        assert!(Gate::Init.allows(ConnectionState::Initializing));
        assert!(!Gate::Init.allows(ConnectionState::Reconnecting));
    }

    #[test]
    fn window_validation() {
        assert!(check_window("LED", MinuteOfDay::MIDNIGHT, MinuteOfDay::from_raw(1_439)).is_ok());
        let err = check_window("LED", MinuteOfDay::from_raw(1_500), MinuteOfDay::MIDNIGHT)
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgument(_)));
    }
}
