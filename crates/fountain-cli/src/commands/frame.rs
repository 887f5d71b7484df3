//! Frame decode and encode commands.

use chrono::{DateTime, Utc};
use fountain_core::{DeviceConfig, DndSettings, LedSettings};
use fountain_protocol::{Command, DecodeError, Frame, FrameAssembler, FrameKind, Response};
use serde_json::{Value, json};
use tracing::debug;

use crate::cli::{Message, SetConfigArgs};
use crate::error::{ClientError, ClientResult};

/// Largest 48-bit device id.
const MAX_DEVICE_ID: u64 = 0xFFFF_FFFF_FFFF;

/// One item found in the input bytes.
#[derive(Debug)]
pub enum Decoded {
    /// A well-framed message. Requests are not interpreted.
    Frame {
        frame: Frame,
        response: Option<Result<Response, DecodeError>>,
    },
    /// Bytes that looked like a frame but did not decode.
    Invalid(DecodeError),
}

/// Everything decoded from one input.
#[derive(Debug)]
pub struct DecodeReport {
    pub items: Vec<Decoded>,
    /// Bytes left over after the last complete frame.
    pub trailing: usize,
}

/// Parses hex bytes. Whitespace, `:` and `-` separators and a leading `0x`
/// are ignored.
pub fn parse_hex(input: &str) -> ClientResult<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();

    if digits.is_empty() {
        return Err(ClientError::usage("no bytes given"));
    }
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(ClientError::usage(format!(
            "{input:?} is not a sequence of hex bytes"
        )));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| {
                ClientError::usage(format!("invalid hex byte {:?}", &digits[i..i + 2]))
            })
        })
        .collect()
}

/// Formats bytes as space separated upper case hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `bytes` into frames and decodes each one.
pub fn decode_bytes(bytes: &[u8]) -> ClientResult<DecodeReport> {
    let mut assembler = FrameAssembler::new();
    assembler.push(bytes);

    let mut items = Vec::new();
    while let Some(next) = assembler.next_frame() {
        items.push(match next {
            Ok(frame) => {
                let response = (frame.kind != FrameKind::Request).then(|| Response::from_frame(&frame));
                Decoded::Frame { frame, response }
            }
            Err(err) => Decoded::Invalid(err),
        });
    }

    if items.is_empty() {
        return Err(match Frame::decode(bytes) {
            Err(err) => ClientError::Decode(err),
            Ok(_) => ClientError::usage("no frame found"),
        });
    }

    Ok(DecodeReport {
        items,
        trailing: assembler.buffered(),
    })
}

/// Decodes hex input and prints what it contains.
pub fn decode(hex: &str, as_json: bool) -> ClientResult<()> {
    let bytes = parse_hex(hex)?;
    debug!(len = bytes.len(), "Decoding");
    let report = decode_bytes(&bytes)?;

    for item in &report.items {
        if as_json {
            println!("{}", render_json(item));
        } else {
            println!("{}", render_text(item));
        }
    }
    if report.trailing > 0 {
        eprintln!("{} trailing bytes ignored", report.trailing);
    }
    Ok(())
}

/// Human readable form of one decoded item.
pub fn render_text(item: &Decoded) -> String {
    match item {
        Decoded::Frame { frame, response } => match response {
            None => format!("{frame}\n  request"),
            Some(Ok(response)) => format!("{frame}\n  {response:?}"),
            Some(Err(err)) => format!("{frame}\n  error: {err}"),
        },
        Decoded::Invalid(err) => format!("invalid frame: {err}"),
    }
}

/// JSON form of one decoded item.
pub fn render_json(item: &Decoded) -> Value {
    match item {
        Decoded::Frame { frame, response } => {
            let mut value = json!({
                "command": frame.code.name(),
                "code": frame.code.as_u8(),
                "kind": frame.kind.as_byte(),
                "seq": frame.seq,
                "payload": to_hex(&frame.payload),
            });
            match response {
                None => {}
                Some(Ok(response)) => {
                    value["response"] = json!(format!("{response:?}"));
                    value["status"] = json!(response.status_updates());
                    value["config"] = json!(response.config_update());
                }
                Some(Err(err)) => value["error"] = json!(err.to_string()),
            }
            value
        }
        Decoded::Invalid(err) => json!({ "error": err.to_string() }),
    }
}

/// Builds the command for an `encode` invocation.
pub fn build_command(message: &Message) -> ClientResult<Command> {
    let command = match message {
        Message::Battery => Command::QueryBattery,
        Message::State => Command::QueryState,
        Message::Config => Command::QueryConfig,
        Message::Identifiers => Command::QueryIdentifiers,
        Message::Firmware => Command::QueryFirmware,
        Message::Status => Command::QueryStatus,
        Message::ResetFilter => Command::ResetFilter,
        Message::Initialize { device_id } => Command::Initialize {
            device_id: parse_device_id(device_id)?,
        },
        Message::Sync { device_id } => Command::Synchronize {
            device_id: parse_device_id(device_id)?,
        },
        Message::Datetime { at } => Command::SetDateTime {
            now: match at {
                Some(at) => DateTime::parse_from_rfc3339(at)
                    .map_err(|e| ClientError::usage(format!("invalid timestamp {at:?}: {e}")))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            },
        },
        Message::Power { state, mode } => Command::SetMode {
            power: (*state).into(),
            mode: (*mode).into(),
        },
        Message::Mode { mode, power } => Command::SetMode {
            power: (*power).into(),
            mode: (*mode).into(),
        },
        Message::SetConfig(args) => Command::SetConfig(device_config(args)?),
    };
    Ok(command)
}

/// Encodes a command and prints the frame.
pub fn encode(message: &Message, seq: u8) -> ClientResult<()> {
    let command = build_command(message)?;
    let bytes = command.to_frame(seq).encode()?;
    println!("{}", to_hex(&bytes));
    Ok(())
}

fn device_config(args: &SetConfigArgs) -> ClientResult<DeviceConfig> {
    if args.smart_on == 0 {
        return Err(ClientError::usage(
            "smart mode on period must be at least one minute",
        ));
    }
    if args.led_brightness > 100 {
        return Err(ClientError::usage(format!(
            "LED brightness must be between 0 and 100, got {}",
            args.led_brightness
        )));
    }

    Ok(DeviceConfig {
        smart_on_minutes: args.smart_on,
        smart_off_minutes: args.smart_off,
        led: LedSettings {
            enabled: args.led.into(),
            brightness: args.led_brightness,
            on: args.led_on,
            off: args.led_off,
        },
        do_not_disturb: DndSettings {
            enabled: args.dnd.into(),
            start: args.dnd_start,
            end: args.dnd_end,
        },
        child_lock: args.lock,
    })
}

fn parse_device_id(input: &str) -> ClientResult<u64> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse(),
    };
    match parsed {
        Ok(id) if id <= MAX_DEVICE_ID => Ok(id),
        Ok(_) => Err(ClientError::usage(format!(
            "device id {input} does not fit in 48 bits"
        ))),
        Err(_) => Err(ClientError::usage(format!("invalid device id {input:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ModeArg, Switch};
    use fountain_core::{MinuteOfDay, Mode, PowerState};
    use fountain_protocol::CommandCode;

    const BATTERY_REPLY: &str = "FA FC FD 42 02 03 03 00 0F A0 50 FB";

    #[test]
    fn hex_separators() {
        let expected = vec![0xFA, 0xFC, 0xFD];
        assert_eq!(parse_hex("FA FC FD").unwrap(), expected);
        assert_eq!(parse_hex("fa:fc:fd").unwrap(), expected);
        assert_eq!(parse_hex("0xfafcfd").unwrap(), expected);
        assert_eq!(parse_hex(" FA-FC-FD\n").unwrap(), expected);
    }

    #[test]
    fn hex_errors() {
        assert!(matches!(parse_hex(""), Err(ClientError::Usage(_))));
        assert!(matches!(parse_hex("FAF"), Err(ClientError::Usage(_))));
        assert!(matches!(parse_hex("ZZ"), Err(ClientError::Usage(_))));
        assert!(matches!(parse_hex("éé"), Err(ClientError::Usage(_))));
    }

    #[test]
    fn decodes_reply() {
        let report = decode_bytes(&parse_hex(BATTERY_REPLY).unwrap()).unwrap();
        assert_eq!(report.trailing, 0);
        assert_eq!(report.items.len(), 1);
        assert_eq!(
            render_text(&report.items[0]),
            "Battery(66) reply seq=3 payload=[0F A0 50]\n  Battery(BatteryReading { voltage: 4.0, percent: 80 })"
        );
    }

    #[test]
    fn decodes_concatenated_frames() {
        let input = format!("{BATTERY_REPLY} FA FC FD DC 02 04 01 00 01 FB FA FC");
        let report = decode_bytes(&parse_hex(&input).unwrap()).unwrap();
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.trailing, 2);

        let json = render_json(&report.items[1]);
        assert_eq!(json["command"], "SetMode");
        assert_eq!(json["seq"], 4);
    }

    #[test]
    fn requests_are_not_interpreted() {
        let report = decode_bytes(&parse_hex("FA FC FD 42 01 03 02 00 00 00 FB").unwrap()).unwrap();
        assert!(render_text(&report.items[0]).ends_with("request"));
    }

    #[test]
    fn garbage_reports_decode_error() {
        let err = decode_bytes(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]).unwrap_err();
        assert!(matches!(err, ClientError::Decode(DecodeError::BadHeader { .. })));

        let err = decode_bytes(&[0xFA, 0xFC, 0xFD, 0x42]).unwrap_err();
        assert!(matches!(err, ClientError::Decode(DecodeError::TooShort { .. })));
    }

    #[test]
    fn bad_payload_is_reported_per_frame() {
        let report = decode_bytes(&parse_hex("FA FC FD 42 02 01 01 00 0F FB").unwrap()).unwrap();
        let text = render_text(&report.items[0]);
        assert!(text.contains("error:"), "{text}");
        assert!(render_json(&report.items[0])["error"].is_string());
    }

    #[test]
    fn encodes_battery_query() {
        let bytes = build_command(&Message::Battery)
            .unwrap()
            .to_frame(3)
            .encode()
            .unwrap();
        assert_eq!(to_hex(&bytes), "FA FC FD 42 01 03 02 00 00 00 FB");
    }

    #[test]
    fn power_keeps_requested_mode() {
        let command = build_command(&Message::Power {
            state: Switch::Off,
            mode: ModeArg::Smart,
        })
        .unwrap();
        assert_eq!(
            command,
            Command::SetMode {
                power: PowerState::Off,
                mode: Mode::Smart
            }
        );
    }

    #[test]
    fn device_ids() {
        assert_eq!(parse_device_id("0xA1B2C3D4").unwrap(), 0xA1B2_C3D4);
        assert_eq!(parse_device_id("42").unwrap(), 42);
        assert!(parse_device_id("0x1000000000000").is_err());
        assert!(parse_device_id("fountain").is_err());
    }

    #[test]
    fn initialize_carries_secret() {
        let command = build_command(&Message::Initialize {
            device_id: "0x0A0B0C".into(),
        })
        .unwrap();
        assert_eq!(command.code(), CommandCode::Initialize);
        assert_eq!(command.payload().len(), 18);
    }

    #[test]
    fn set_config_validation() {
        let mut args = SetConfigArgs {
            smart_on: 3,
            smart_off: 3,
            led: Switch::On,
            led_brightness: 101,
            led_on: MinuteOfDay::MIDNIGHT,
            led_off: MinuteOfDay::MIDNIGHT,
            dnd: Switch::Off,
            dnd_start: MinuteOfDay::MIDNIGHT,
            dnd_end: MinuteOfDay::MIDNIGHT,
            lock: true,
        };
        assert!(matches!(
            build_command(&Message::SetConfig(args.clone())),
            Err(ClientError::Usage(_))
        ));

        args.led_brightness = 80;
        let Command::SetConfig(config) = build_command(&Message::SetConfig(args)).unwrap() else {
            panic!("expected set config");
        };
        assert_eq!(config.led.brightness, 80);
        assert!(config.child_lock);
    }

    #[test]
    fn datetime_accepts_rfc3339() {
        let command = build_command(&Message::Datetime {
            at: Some("2024-01-01T00:00:00Z".into()),
        })
        .unwrap();
        assert_eq!(command.payload()[5], 13);
        assert!(build_command(&Message::Datetime { at: Some("yesterday".into()) }).is_err());
    }
}
