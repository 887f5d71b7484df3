//! Configuration loading and frame tooling for the fountain engine.
//!
//! This crate provides the `fountainctl` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
