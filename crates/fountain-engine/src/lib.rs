//! Connection engine for the fountain: transport session lifecycle,
//! ordered command pipeline, reply dispatch and the published device state.
//!
//! The host supplies a [`Connector`] for one device; the engine does the
//! rest:
//!
//! ```rust,ignore
//! use fountain_engine::{ConnectionManager, EngineConfig};
//!
//! let manager = ConnectionManager::new(connector, EngineConfig::default())?
//!     .with_model(ProductModel::from_service_data(&service_data));
//! let client = manager.client();
//! let shutdown = manager.shutdown_handle();
//! tokio::spawn(manager.run());
//!
//! let mut changes = client.subscribe();
//! while changes.changed().await.is_ok() {
//!     println!("{:?}", changes.borrow().status().value());
//! }
//! ```

mod client;
mod config;
mod connection;
mod dispatcher;
mod error;
mod pending;
mod reconnect;
mod shutdown;
mod store;
mod transport;

pub use client::FountainClient;
pub use config::{EngineConfig, RECOMMENDED_MIN_CONNECT_TIMEOUT};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use error::{
    CommandError, CommandResult, EngineError, EngineResult, TransportError, TransportResult,
};
pub use reconnect::{DEFAULT_SCHEDULE, ReconnectPolicy};
pub use shutdown::ShutdownHandle;
pub use transport::{BoxFuture, Connector, Link, Notifications};
