//! Transport abstraction supplied by the host.
//!
//! The engine does not scan or talk to a Bluetooth adapter itself. The host
//! hands it a [`Connector`] that knows how to reach one fountain; every
//! successful [`Connector::connect`] yields a fresh [`Link`] with one write
//! characteristic and one notify characteristic.
//!
//! # Example Implementation
//!
//! ```ignore
//! struct GattConnector {
//!     adapter: Adapter,
//!     address: BdAddr,
//! }
//!
//! impl Connector for GattConnector {
//!     fn connect(&self) -> BoxFuture<'_, TransportResult<Arc<dyn Link>>> {
//!         Box::pin(async move {
//!             let peripheral = self.adapter.connect(self.address).await?;
//!             Ok(Arc::new(GattLink::new(peripheral)) as Arc<dyn Link>)
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::BoxStream;

use crate::error::TransportResult;

/// A boxed future for the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inbound notification payloads in arrival order. The stream ends when the
/// link goes away.
pub type Notifications = BoxStream<'static, Vec<u8>>;

/// One established connection to the device.
pub trait Link: Send + Sync {
    /// Writes one frame to the write characteristic.
    fn write(&self, data: Vec<u8>) -> BoxFuture<'_, TransportResult<()>>;

    /// Enables notifications on the notify characteristic.
    fn subscribe(&self) -> BoxFuture<'_, TransportResult<Notifications>>;

    /// Closes the link.
    fn disconnect(&self) -> BoxFuture<'_, TransportResult<()>>;

    /// Current signal strength in dBm, if the host can tell.
    fn rssi(&self) -> BoxFuture<'_, Option<i16>> {
        Box::pin(async { None })
    }
}

/// Opens links to one device.
pub trait Connector: Send + Sync {
    /// Establishes a new link.
    fn connect(&self) -> BoxFuture<'_, TransportResult<Arc<dyn Link>>>;
}
