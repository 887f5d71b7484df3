//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fountain_core::{MinuteOfDay, Mode, PowerState, TracingOutputFormat};

/// fountainctl - tooling for Eversweet smart fountains
#[derive(Debug, Parser)]
#[command(name = "fountainctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FOUNTAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long)]
    pub log_format: Option<TracingOutputFormat>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode captured frame bytes
    Decode {
        /// Hex bytes, one frame or several back to back. Spaces, colons and
        /// a leading 0x are ignored.
        hex: String,

        /// Print one JSON object per frame
        #[arg(long)]
        json: bool,
    },

    /// Print the frame for a command as hex
    Encode {
        /// Sequence tag to put in the frame
        #[arg(long, global = true, default_value_t = 0)]
        seq: u8,

        #[command(subcommand)]
        message: Message,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Commands that can be encoded.
#[derive(Debug, Subcommand)]
pub enum Message {
    /// Battery query
    Battery,
    /// Pump state query
    State,
    /// Settings query
    Config,
    /// Identifiers query
    Identifiers,
    /// Firmware query
    Firmware,
    /// Full status report query
    Status,
    /// Filter life reset
    ResetFilter,
    /// Initialize with the device id and pairing secret
    Initialize {
        /// Device id, decimal or 0x-prefixed hex
        device_id: String,
    },
    /// Synchronization check
    Sync {
        /// Device id, decimal or 0x-prefixed hex
        device_id: String,
    },
    /// Set the device clock
    Datetime {
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Switch the pump on or off
    Power {
        state: Switch,

        /// Mode to send along
        #[arg(long, value_enum, default_value_t = ModeArg::Normal)]
        mode: ModeArg,
    },
    /// Select normal or smart mode
    Mode {
        mode: ModeArg,

        /// Power state to send along
        #[arg(long, value_enum, default_value_t = Switch::On)]
        power: Switch,
    },
    /// Write a complete settings block
    SetConfig(SetConfigArgs),
}

/// Settings written by `encode set-config`.
#[derive(Debug, Clone, Args)]
pub struct SetConfigArgs {
    /// Smart mode pumping period in minutes
    #[arg(long, default_value_t = 3)]
    pub smart_on: u8,

    /// Smart mode pause period in minutes
    #[arg(long, default_value_t = 3)]
    pub smart_off: u8,

    /// LED ring switch
    #[arg(long, value_enum, default_value_t = Switch::On)]
    pub led: Switch,

    /// LED brightness, 0-100
    #[arg(long, default_value_t = 60)]
    pub led_brightness: u8,

    /// LED window start, HH:MM
    #[arg(long, default_value = "08:00")]
    pub led_on: MinuteOfDay,

    /// LED window end, HH:MM
    #[arg(long, default_value = "22:00")]
    pub led_off: MinuteOfDay,

    /// Do-not-disturb switch
    #[arg(long, value_enum, default_value_t = Switch::Off)]
    pub dnd: Switch,

    /// Do-not-disturb start, HH:MM
    #[arg(long, default_value = "22:00")]
    pub dnd_start: MinuteOfDay,

    /// Do-not-disturb end, HH:MM
    #[arg(long, default_value = "08:00")]
    pub dnd_end: MinuteOfDay,

    /// Lock the physical buttons
    #[arg(long)]
    pub lock: bool,
}

/// On/off switch argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch == Switch::On
    }
}

impl From<Switch> for PowerState {
    fn from(switch: Switch) -> Self {
        PowerState::from(bool::from(switch))
    }
}

/// Pump mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Normal,
    Smart,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => Mode::Normal,
            ModeArg::Smart => Mode::Smart,
        }
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn encode_seq_after_message() {
        let cli = Cli::try_parse_from(["fountainctl", "encode", "battery", "--seq", "7"]).unwrap();
        match cli.command {
            Command::Encode { seq, message } => {
                assert_eq!(seq, 7);
                assert!(matches!(message, Message::Battery));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn power_switch() {
        let cli = Cli::try_parse_from(["fountainctl", "encode", "power", "off"]).unwrap();
        let Command::Encode {
            message: Message::Power { state, mode },
            ..
        } = cli.command
        else {
            panic!("expected power");
        };
        assert_eq!(PowerState::from(state), PowerState::Off);
        assert_eq!(mode, ModeArg::Normal);
    }

    #[test]
    fn log_format_parses() {
        let cli =
            Cli::try_parse_from(["fountainctl", "--log-format", "json", "config", "path"]).unwrap();
        assert_eq!(cli.log_format, Some(TracingOutputFormat::Json));
    }

    #[test]
    fn rejects_bad_time_of_day() {
        let result = Cli::try_parse_from([
            "fountainctl",
            "encode",
            "set-config",
            "--led-on",
            "25:00",
        ]);
        assert!(result.is_err());
    }
}
