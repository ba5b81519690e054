/*!
 # Govee Bluetooth LED Strip Controller Library

 A Rust library for controlling Govee segmented LED strips (H617A and
 compatible models) over Bluetooth LE.

 ## Features

 * 20-byte XOR-checksummed command frames
 * Multi-frame fragmentation for long payloads
 * Power, brightness, RGB, color temperature, scenes, music mode
 * Per-segment color (up to 15 segments)
 * Connection reuse with retries and idle disconnect

 ## Example

 ```no_run
 use govee_ble_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let resolver = BtleResolver::new(DeviceConfig::default()).await?;
     let mut strip = LedStrip::new("AA:BB:CC:DD:EE:FF", resolver, DeviceConfig::default());

     strip.power_on().await?;
     strip.set_color(255, 0, 0).await?; // Set to red
     strip.set_brightness(80).await?;   // 80% brightness

     strip.disconnect().await;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the Govee LED controller library
#[derive(Error, Debug)]
pub enum Error {
    /// A frame or fragment sequence could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The address did not resolve to a connectable device
    #[error("Device {0} not found")]
    DeviceNotFound(String),

    /// Connect or write failure on the BLE link
    #[error("BLE transport error: {0}")]
    Transport(String),

    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// Scene or music mode name is not in the known tables
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error from btleplug
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
}

impl Error {
    /// Whether the error came from the BLE link and is worth a reconnect.
    /// `DeviceNotFound` is not a transport failure and is never retried.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Ble(_) | Error::CharacteristicNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod ble;
pub mod commands;
pub mod config;
pub mod connection;
pub mod device;
pub mod effects;
pub mod fragment;
pub mod protocol;
pub mod transport;

// Re-export key types
pub use ble::{BtleLink, BtleResolver};
pub use config::{DeviceConfig, DeviceModel};
pub use connection::{ConnectionManager, SessionState};
pub use device::LedStrip;
pub use effects::{MusicMode, Scene, MUSIC_MODES, SCENES};
pub use fragment::fragment;
pub use protocol::{build_frame, checksum, Frame, FRAME_LEN};
pub use transport::{DeviceResolver, Link};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(Error::Transport("write failed".into()).is_transport());
        assert!(Error::CharacteristicNotFound("2b11".into()).is_transport());
        assert!(!Error::DeviceNotFound("AA:BB".into()).is_transport());
        assert!(!Error::Encoding("too long".into()).is_transport());
    }
}
