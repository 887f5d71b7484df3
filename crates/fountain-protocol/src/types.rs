//! Typed commands and responses.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fountain_core::time::seconds_since_device_epoch;
use fountain_core::{
    BatteryReading, ConfigUpdate, DeviceConfig, DndSettings, FirmwareVersion, LedSettings,
    MinuteOfDay, Mode, PowerState, StateReport, StatusUpdate, Warnings,
};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult};
use crate::framing::{Frame, FrameKind};

/// Command codes understood by the fountain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCode {
    Battery,
    Initialize,
    SetDateTime,
    Synchronize,
    Firmware,
    State,
    Config,
    Identifiers,
    SetMode,
    SetConfig,
    ResetFilter,
    Status,
}

impl CommandCode {
    /// Every known code.
    pub const ALL: [Self; 12] = [
        Self::Battery,
        Self::Initialize,
        Self::SetDateTime,
        Self::Synchronize,
        Self::Firmware,
        Self::State,
        Self::Config,
        Self::Identifiers,
        Self::SetMode,
        Self::SetConfig,
        Self::ResetFilter,
        Self::Status,
    ];

    /// Returns the wire byte.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Battery => 66,
            Self::Initialize => 73,
            Self::SetDateTime => 84,
            Self::Synchronize => 86,
            Self::Firmware => 200,
            Self::State => 210,
            Self::Config => 211,
            Self::Identifiers => 213,
            Self::SetMode => 220,
            Self::SetConfig => 221,
            Self::ResetFilter => 222,
            Self::Status => 230,
        }
    }

    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Battery => "Battery",
            Self::Initialize => "Initialize",
            Self::SetDateTime => "SetDateTime",
            Self::Synchronize => "Synchronize",
            Self::Firmware => "Firmware",
            Self::State => "State",
            Self::Config => "Config",
            Self::Identifiers => "Identifiers",
            Self::SetMode => "SetMode",
            Self::SetConfig => "SetConfig",
            Self::ResetFilter => "ResetFilter",
            Self::Status => "Status",
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_u8() == byte)
            .ok_or(DecodeError::UnknownCommand(byte))
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u8())
    }
}

/// The 48-bit device id as sent on the wire.
pub fn device_id_bytes(device_id: u64) -> [u8; 6] {
    let bytes = device_id.to_be_bytes();
    [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

/// Derives the pairing secret from the device id.
///
/// The id bytes are reversed; if that leaves two trailing zeros they become
/// `13, 37`. The result is left-padded with zeros to eight bytes.
pub fn device_secret(device_id: u64) -> [u8; 8] {
    let mut reversed = device_id_bytes(device_id);
    reversed.reverse();
    if reversed[4] == 0 && reversed[5] == 0 {
        reversed[4] = 13;
        reversed[5] = 37;
    }

    let mut secret = [0u8; 8];
    secret[2..].copy_from_slice(&reversed);
    secret
}

/// Clock payload for [`CommandCode::SetDateTime`].
pub fn datetime_payload(now: DateTime<Utc>) -> [u8; 6] {
    let [s3, s2, s1, s0] = seconds_since_device_epoch(now).to_be_bytes();
    [0, s3, s2, s1, s0, 13]
}

/// Encodes the 14-byte settings block written by [`CommandCode::SetConfig`].
pub fn encode_config(config: &DeviceConfig) -> [u8; 14] {
    let [led_on_hi, led_on_lo] = config.led.on.minutes().to_be_bytes();
    let [led_off_hi, led_off_lo] = config.led.off.minutes().to_be_bytes();
    let [dnd_start_hi, dnd_start_lo] = config.do_not_disturb.start.minutes().to_be_bytes();
    let [dnd_end_hi, dnd_end_lo] = config.do_not_disturb.end.minutes().to_be_bytes();
    [
        config.smart_on_minutes,
        config.smart_off_minutes,
        u8::from(config.led.enabled),
        config.led.brightness,
        led_on_hi,
        led_on_lo,
        led_off_hi,
        led_off_lo,
        u8::from(config.do_not_disturb.enabled),
        dnd_start_hi,
        dnd_start_lo,
        dnd_end_hi,
        dnd_end_lo,
        u8::from(config.child_lock),
    ]
}

/// Outbound commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    QueryBattery,
    /// Writes the device id and pairing secret.
    ///
    /// Sending this invalidates the pairing held by the vendor mobile app;
    /// the fountain must be power cycled before the app can talk to it
    /// again.
    Initialize { device_id: u64 },
    SetDateTime { now: DateTime<Utc> },
    Synchronize { device_id: u64 },
    QueryFirmware,
    QueryState,
    QueryConfig,
    QueryIdentifiers,
    SetMode { power: PowerState, mode: Mode },
    SetConfig(DeviceConfig),
    ResetFilter,
    /// Full status report. Also pushed by the device on its own.
    QueryStatus,
}

impl Command {
    /// Command code of the frame.
    pub fn code(&self) -> CommandCode {
        match self {
            Self::QueryBattery => CommandCode::Battery,
            Self::Initialize { .. } => CommandCode::Initialize,
            Self::SetDateTime { .. } => CommandCode::SetDateTime,
            Self::Synchronize { .. } => CommandCode::Synchronize,
            Self::QueryFirmware => CommandCode::Firmware,
            Self::QueryState => CommandCode::State,
            Self::QueryConfig => CommandCode::Config,
            Self::QueryIdentifiers => CommandCode::Identifiers,
            Self::SetMode { .. } => CommandCode::SetMode,
            Self::SetConfig(_) => CommandCode::SetConfig,
            Self::ResetFilter => CommandCode::ResetFilter,
            Self::QueryStatus => CommandCode::Status,
        }
    }

    /// Frame kind the device expects for this command.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::QueryStatus => FrameKind::Reply,
            _ => FrameKind::Request,
        }
    }

    /// Returns false for commands the device never answers.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::Initialize { .. } | Self::SetDateTime { .. })
    }

    /// Builds the payload.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::QueryBattery
            | Self::QueryState
            | Self::QueryConfig
            | Self::QueryIdentifiers => vec![0, 0],
            Self::QueryFirmware => Vec::new(),
            Self::Initialize { device_id } => {
                let mut payload = vec![0, 0, 0, 0];
                payload.extend_from_slice(&device_id_bytes(*device_id));
                payload.extend_from_slice(&device_secret(*device_id));
                payload
            }
            Self::SetDateTime { now } => datetime_payload(*now).to_vec(),
            Self::Synchronize { device_id } => {
                let mut payload = vec![0, 0];
                payload.extend_from_slice(&device_secret(*device_id));
                payload
            }
            Self::SetMode { power, mode } => vec![power.as_byte(), mode.as_byte()],
            Self::SetConfig(config) => encode_config(config).to_vec(),
            Self::ResetFilter => vec![0],
            Self::QueryStatus => vec![1],
        }
    }

    /// Builds the frame with the given sequence tag.
    pub fn to_frame(&self, seq: u8) -> Frame {
        Frame::new(self.code(), self.kind(), seq, self.payload())
    }
}

/// Full status report (code 230).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: StateReport,
    /// Pump runtime since midnight.
    pub runtime_today: Duration,
    /// Settings without the child lock, which this report does not carry.
    pub config: DeviceConfig,
}

/// Typed device messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Battery(BatteryReading),
    Synchronization { initialized: bool },
    Firmware(FirmwareVersion),
    State(StateReport),
    Config(DeviceConfig),
    Identifiers { device_id: u64, serial: String },
    Status(StatusReport),
    /// Acknowledgement of a control command. The payload carries nothing
    /// the host needs.
    Ack(CommandCode),
}

impl Response {
    /// Decodes the payload of a device frame.
    pub fn from_frame(frame: &Frame) -> DecodeResult<Self> {
        let code = frame.code;
        let data = frame.payload.as_slice();
        match code {
            CommandCode::Battery => {
                require(code, data, 3)?;
                let millivolts = u16::from_be_bytes([data[0], data[1]]);
                Ok(Self::Battery(BatteryReading {
                    voltage: f32::from(millivolts) / 1000.0,
                    percent: data[2],
                }))
            }
            CommandCode::Synchronize => {
                require(code, data, 1)?;
                Ok(Self::Synchronization {
                    initialized: data[0] == 1,
                })
            }
            CommandCode::Firmware => {
                require(code, data, 2)?;
                Ok(Self::Firmware(FirmwareVersion {
                    hardware: data[0],
                    firmware: data[1],
                }))
            }
            CommandCode::State => {
                require(code, data, STATE_BLOCK_LEN)?;
                Ok(Self::State(decode_state(data)?))
            }
            CommandCode::Config => {
                require(code, data, CONFIG_BLOCK_LEN)?;
                Ok(Self::Config(decode_config(data)))
            }
            CommandCode::Identifiers => {
                require(code, data, 8)?;
                let mut id = [0u8; 8];
                id[2..].copy_from_slice(&data[2..8]);
                let serial_end = data.len().min(SERIAL_END);
                Ok(Self::Identifiers {
                    device_id: u64::from_be_bytes(id),
                    serial: decode_ascii(&data[8..serial_end]),
                })
            }
            CommandCode::Status => {
                require(code, data, STATUS_REPORT_LEN)?;
                let state = decode_state(&data[..STATE_BLOCK_LEN])?;
                let runtime_today = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
                Ok(Self::Status(StatusReport {
                    state,
                    runtime_today: Duration::from_secs(u64::from(runtime_today)),
                    config: decode_config(&data[16..STATUS_REPORT_LEN]),
                }))
            }
            CommandCode::Initialize
            | CommandCode::SetDateTime
            | CommandCode::SetMode
            | CommandCode::SetConfig
            | CommandCode::ResetFilter => Ok(Self::Ack(code)),
        }
    }

    /// Status changes carried by this message.
    pub fn status_updates(&self) -> Vec<StatusUpdate> {
        match self {
            Self::Battery(reading) => vec![StatusUpdate::Battery(*reading)],
            Self::State(report) => vec![StatusUpdate::State(*report)],
            Self::Status(report) => vec![
                StatusUpdate::State(report.state),
                StatusUpdate::RuntimeToday {
                    runtime: report.runtime_today,
                },
            ],
            _ => Vec::new(),
        }
    }

    /// Config change carried by this message.
    pub fn config_update(&self) -> Option<ConfigUpdate> {
        match self {
            Self::Config(config) => Some(ConfigUpdate::Full(*config)),
            Self::Status(report) => Some(ConfigUpdate::WithoutLock(report.config)),
            _ => None,
        }
    }
}

const STATE_BLOCK_LEN: usize = 12;
const CONFIG_BLOCK_LEN: usize = 14;
const STATUS_REPORT_LEN: usize = 29;
const SERIAL_END: usize = 23;

fn require(code: CommandCode, data: &[u8], expected: usize) -> DecodeResult<()> {
    if data.len() < expected {
        return Err(DecodeError::PayloadTooShort {
            code,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn decode_state(block: &[u8]) -> DecodeResult<StateReport> {
    let power = PowerState::from_byte(block[0]).ok_or(DecodeError::InvalidField {
        field: "power",
        value: block[0],
    })?;
    let mode = Mode::from_byte(block[1]).ok_or(DecodeError::InvalidField {
        field: "mode",
        value: block[1],
    })?;
    let runtime = u32::from_be_bytes([block[6], block[7], block[8], block[9]]);

    Ok(StateReport {
        power,
        mode,
        dnd_active: block[2] != 0,
        warnings: Warnings {
            breakdown: block[3] != 0,
            water_missing: block[4] != 0,
            filter: block[5] != 0,
        },
        running: block[11] != 0,
        pump_runtime: Duration::from_secs(u64::from(runtime)),
        filter_remaining: f32::from(block[10]) / 100.0,
    })
}

/// Decodes a settings block. The 13-byte variant has no child lock byte.
fn decode_config(block: &[u8]) -> DeviceConfig {
    let minute = |at: usize| MinuteOfDay::from_raw(u16::from_be_bytes([block[at], block[at + 1]]));
    DeviceConfig {
        smart_on_minutes: block[0],
        smart_off_minutes: block[1],
        led: LedSettings {
            enabled: block[2] != 0,
            brightness: block[3],
            on: minute(4),
            off: minute(6),
        },
        do_not_disturb: DndSettings {
            enabled: block[8] != 0,
            start: minute(9),
            end: minute(11),
        },
        child_lock: block.get(13).is_some_and(|&lock| lock != 0),
    }
}

fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reply(code: CommandCode, payload: Vec<u8>) -> Frame {
        Frame::reply(code, 1, payload)
    }

    fn state_block() -> Vec<u8> {
        vec![1, 2, 0, 0, 1, 0, 0, 0, 0x0E, 0x10, 42, 1]
    }

    fn config_block() -> Vec<u8> {
        vec![3, 5, 1, 60, 0x01, 0xE0, 0x05, 0x28, 1, 0x05, 0x28, 0x01, 0xE0, 1]
    }

    #[test]
    fn command_codes_roundtrip() {
        for code in CommandCode::ALL {
            assert_eq!(CommandCode::try_from(code.as_u8()), Ok(code));
        }
        assert_eq!(
            CommandCode::try_from(201),
            Err(DecodeError::UnknownCommand(201))
        );
    }

    #[test]
    fn secret_reverses_id() {
        let id = 0x0102_0304_0506;
        assert_eq!(device_id_bytes(id), [1, 2, 3, 4, 5, 6]);
        assert_eq!(device_secret(id), [0, 0, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn secret_replaces_trailing_zeros() {
        let id = 0x0000_0304_0506;
        assert_eq!(device_secret(id), [0, 0, 6, 5, 4, 3, 13, 37]);
        assert_eq!(device_secret(0), [0, 0, 0, 0, 0, 0, 13, 37]);
    }

    #[test]
    fn datetime_payload_counts_from_2000() {
        let now = Utc.with_ymd_and_hms(2000, 1, 1, 0, 1, 0).unwrap();
        assert_eq!(datetime_payload(now), [0, 0, 0, 0, 60, 13]);

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let secs = u32::from_be_bytes(datetime_payload(now)[1..5].try_into().unwrap());
        assert_eq!(secs, 757_382_400);
    }

    #[test]
    fn command_payloads() {
        assert_eq!(Command::QueryBattery.payload(), vec![0, 0]);
        assert_eq!(Command::QueryFirmware.payload(), Vec::<u8>::new());
        assert_eq!(Command::ResetFilter.payload(), vec![0]);
        assert_eq!(Command::QueryStatus.payload(), vec![1]);
        assert_eq!(Command::QueryStatus.kind(), FrameKind::Reply);
        assert_eq!(
            Command::SetMode {
                power: PowerState::On,
                mode: Mode::Smart
            }
            .payload(),
            vec![1, 2]
        );

        let init = Command::Initialize {
            device_id: 0x0102_0304_0506,
        }
        .payload();
        assert_eq!(init.len(), 18);
        assert_eq!(&init[..10], &[0, 0, 0, 0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(&init[10..], &device_secret(0x0102_0304_0506));

        let sync = Command::Synchronize { device_id: 7 }.payload();
        assert_eq!(sync.len(), 10);
    }

    #[test]
    fn write_only_commands() {
        assert!(!Command::Initialize { device_id: 1 }.expects_reply());
        assert!(!Command::SetDateTime { now: Utc::now() }.expects_reply());
        assert!(Command::ResetFilter.expects_reply());
    }

    #[test]
    fn config_block_roundtrip() {
        let decoded = match Response::from_frame(&reply(CommandCode::Config, config_block())) {
            Ok(Response::Config(config)) => config,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(decoded.led.on.to_string(), "08:00");
        assert_eq!(decoded.led.off.to_string(), "22:00");
        assert!(decoded.child_lock);
        assert_eq!(encode_config(&decoded).to_vec(), config_block());
    }

    #[test]
    fn battery_response() {
        let response =
            Response::from_frame(&reply(CommandCode::Battery, vec![0x0F, 0xA0, 80])).unwrap();
        insta::assert_debug_snapshot!(response, @r"
        Battery(
            BatteryReading {
                voltage: 4.0,
                percent: 80,
            },
        )
        ");
    }

    #[test]
    fn state_response() {
        let response = Response::from_frame(&reply(CommandCode::State, state_block())).unwrap();
        insta::assert_debug_snapshot!(response, @r"
        State(
            StateReport {
                power: On,
                mode: Smart,
                dnd_active: false,
                warnings: Warnings {
                    breakdown: false,
                    water_missing: true,
                    filter: false,
                },
                running: true,
                pump_runtime: 3600s,
                filter_remaining: 0.42,
            },
        )
        ");
    }

    #[test]
    fn identifiers_response() {
        let mut payload = vec![0, 0, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78];
        payload.extend_from_slice(b"W5SN00012345678");
        payload.extend_from_slice(&[0, 0]);
        let response = Response::from_frame(&reply(CommandCode::Identifiers, payload)).unwrap();
        insta::assert_debug_snapshot!(response, @r#"
        Identifiers {
            device_id: 305419896,
            serial: "W5SN00012345678",
        }
        "#);
    }

    #[test]
    fn status_report_splits_into_updates() {
        let mut payload = state_block();
        payload.extend_from_slice(&[0, 0, 0x02, 0x58]);
        payload.extend_from_slice(&config_block()[..13]);

        let response = Response::from_frame(&reply(CommandCode::Status, payload)).unwrap();
        let updates = response.status_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[1],
            StatusUpdate::RuntimeToday {
                runtime: Duration::from_secs(600)
            }
        );
        match response.config_update() {
            Some(ConfigUpdate::WithoutLock(config)) => {
                assert_eq!(config.smart_on_minutes, 3);
                assert!(!config.child_lock);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = Response::from_frame(&reply(CommandCode::State, vec![1, 2, 3])).unwrap_err();
        assert_eq!(
            err,
            DecodeError::PayloadTooShort {
                code: CommandCode::State,
                expected: 12,
                actual: 3
            }
        );
    }

    #[test]
    fn invalid_mode_is_rejected() {
        let mut block = state_block();
        block[1] = 9;
        assert_eq!(
            Response::from_frame(&reply(CommandCode::State, block)),
            Err(DecodeError::InvalidField {
                field: "mode",
                value: 9
            })
        );
    }

    #[test]
    fn control_replies_are_acks() {
        let response = Response::from_frame(&reply(CommandCode::SetMode, vec![1])).unwrap();
        assert_eq!(response, Response::Ack(CommandCode::SetMode));
        assert!(response.status_updates().is_empty());
        assert!(response.config_update().is_none());
    }

    #[test]
    fn sync_reports_initialized() {
        assert_eq!(
            Response::from_frame(&reply(CommandCode::Synchronize, vec![1, 0])),
            Ok(Response::Synchronization { initialized: true })
        );
        assert_eq!(
            Response::from_frame(&reply(CommandCode::Synchronize, vec![0])),
            Ok(Response::Synchronization { initialized: false })
        );
    }
}
