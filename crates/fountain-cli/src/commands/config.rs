//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    let engine = config.validate()?;
    match &config.device.address {
        Some(address) => println!("Device address {} is valid.", address),
        None => println!("No device address set."),
    }
    println!(
        "Connection: connect timeout {:?}, command timeout {:?}, heartbeat {:?}, silence window {:?}.",
        engine.connect_timeout, engine.command_timeout, engine.heartbeat_interval, engine.silence_window
    );
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(explicit: Option<&Path>) -> ClientResult<()> {
    match explicit {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: {}", ClientConfig::default_path().display()),
    }
    Ok(())
}
