/*!
 # Transport contracts

 The connection manager does not talk to a BLE stack directly. It resolves
 an address to a [`Link`] through a [`DeviceResolver`] and drives the link's
 connect, write and disconnect operations. [`crate::ble`] provides the
 btleplug implementation.
*/

use async_trait::async_trait;

use crate::protocol::Frame;
use crate::Result;

/// A connectable reference to one device
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Establishes the GATT session
    async fn connect(&self) -> Result<()>;

    /// Whether the underlying session is still live
    async fn is_connected(&self) -> bool;

    /// Writes one frame to the control characteristic without response
    async fn write(&self, frame: &Frame) -> Result<()>;

    /// Closes the session
    async fn disconnect(&self) -> Result<()>;
}

/// Resolves device addresses to connectable links
#[async_trait]
pub trait DeviceResolver: Send + Sync + 'static {
    type Link: Link;

    /// Returns `Ok(None)` when the address is not currently visible
    async fn resolve(&self, address: &str) -> Result<Option<Self::Link>>;
}
