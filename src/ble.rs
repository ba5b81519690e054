/*!
 # btleplug transport

 Resolves device addresses by scanning with the default Bluetooth adapter
 and writes frames to the control characteristic without response.
*/

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::DeviceConfig;
use crate::protocol::Frame;
use crate::transport::{DeviceResolver, Link};
use crate::{Error, Result};

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapter = manager.adapters().await?.into_iter().next().ok_or_else(|| {
        error!("No Bluetooth adapters found");
        Error::NoBluetoothAdapters
    })?;
    debug!("Using Bluetooth adapter");
    Ok(adapter)
}

/// Whether a peripheral with the given MAC address or platform id is `wanted`
fn address_matches(address: &str, id: &str, wanted: &str) -> bool {
    let wanted = wanted.trim();
    address.eq_ignore_ascii_case(wanted) || id.eq_ignore_ascii_case(wanted)
}

/// Finds characteristic `uuid` inside service `service`
fn find_characteristic(
    characteristics: impl IntoIterator<Item = Characteristic>,
    service: Uuid,
    uuid: Uuid,
) -> Option<Characteristic> {
    characteristics
        .into_iter()
        .find(|c| c.service_uuid == service && c.uuid == uuid)
}

fn peripheral_matches(peripheral: &Peripheral, wanted: &str) -> bool {
    address_matches(
        &peripheral.address().to_string(),
        &peripheral.id().to_string(),
        wanted,
    )
}

/// Resolves addresses to peripherals through a btleplug adapter
pub struct BtleResolver {
    adapter: Adapter,
    config: DeviceConfig,
}

impl BtleResolver {
    /// Uses the first Bluetooth adapter on the system
    #[instrument(skip(config))]
    pub async fn new(config: DeviceConfig) -> Result<BtleResolver> {
        info!("Initializing Govee BLE controller for {}", config.model);
        let manager = Manager::new().await?;
        let adapter = get_central(&manager).await?;
        Ok(Self::with_adapter(adapter, config))
    }

    pub fn with_adapter(adapter: Adapter, config: DeviceConfig) -> BtleResolver {
        BtleResolver { adapter, config }
    }

    async fn known_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        let peripherals = self.adapter.peripherals().await?;
        trace!("{} BLE peripherals already known", peripherals.len());
        Ok(peripherals
            .into_iter()
            .find(|p| peripheral_matches(p, address)))
    }

    /// Scans until the address shows up or the scan window closes
    async fn scan_for(&self, address: &str) -> Result<Option<Peripheral>> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!(
            "Scanning for {} ({} seconds)...",
            address,
            self.config.scan_timeout.as_secs()
        );

        let search = async {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let peripheral = self.adapter.peripheral(&id).await?;
                if peripheral_matches(&peripheral, address) {
                    return Ok(Some(peripheral));
                }
                trace!("Ignoring peripheral {}", peripheral.address());
            }
            Ok::<Option<Peripheral>, Error>(None)
        };

        let found = match time::timeout(self.config.scan_timeout, search).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        };

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        found
    }
}

#[async_trait]
impl DeviceResolver for BtleResolver {
    type Link = BtleLink;

    #[instrument(skip(self))]
    async fn resolve(&self, address: &str) -> Result<Option<BtleLink>> {
        let peripheral = match self.known_peripheral(address).await? {
            Some(peripheral) => Some(peripheral),
            None => self.scan_for(address).await?,
        };

        match peripheral {
            Some(peripheral) => {
                debug!("Resolved {} to {}", address, peripheral.id());
                Ok(Some(BtleLink::new(peripheral, &self.config)))
            }
            None => {
                warn!("Device {} not visible", address);
                Ok(None)
            }
        }
    }
}

/// A btleplug peripheral carrying Govee frames
pub struct BtleLink {
    peripheral: Peripheral,
    service_uuid: Uuid,
    write_uuid: Uuid,
    read_uuid: Uuid,
    /// Found during `connect`
    write_characteristic: Mutex<Option<Characteristic>>,
}

impl BtleLink {
    pub fn new(peripheral: Peripheral, config: &DeviceConfig) -> BtleLink {
        BtleLink {
            peripheral,
            service_uuid: config.service_uuid,
            write_uuid: config.write_uuid,
            read_uuid: config.read_uuid,
            write_characteristic: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Link for BtleLink {
    #[instrument(skip(self), fields(id = %self.peripheral.id()))]
    async fn connect(&self) -> Result<()> {
        info!("Connecting to device...");
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }

        debug!("Discovering services...");
        self.peripheral.discover_services().await?;

        let characteristics = self.peripheral.characteristics();
        let write_char =
            find_characteristic(characteristics.iter().cloned(), self.service_uuid, self.write_uuid)
                .ok_or_else(|| Error::CharacteristicNotFound(self.write_uuid.to_string()))?;
        debug!("Found write characteristic: {}", write_char.uuid);

        if find_characteristic(characteristics, self.service_uuid, self.read_uuid).is_none() {
            warn!(
                "Read characteristic {} missing from service {}",
                self.read_uuid, self.service_uuid
            );
        }

        *self.write_characteristic.lock() = Some(write_char);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let has_characteristic = self.write_characteristic.lock().is_some();
        has_characteristic && self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write(&self, frame: &Frame) -> Result<()> {
        let write_char = self
            .write_characteristic
            .lock()
            .clone()
            .ok_or_else(|| Error::Transport("write before connect".into()))?;

        self.peripheral
            .write(&write_char, frame.as_bytes(), WriteType::WithoutResponse)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        self.write_characteristic.lock().take();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{READ_UUID, SERVICE_UUID, WRITE_UUID};
    use btleplug::api::CharPropFlags;
    use std::collections::BTreeSet;

    fn characteristic(service: Uuid, uuid: Uuid) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid: service,
            properties: CharPropFlags::WRITE_WITHOUT_RESPONSE,
            descriptors: BTreeSet::new(),
        }
    }

    #[test]
    fn characteristics_are_looked_up_within_the_service() {
        let other_service = Uuid::from_u128(0x1800);
        let chars = vec![
            characteristic(other_service, WRITE_UUID),
            characteristic(SERVICE_UUID, READ_UUID),
            characteristic(SERVICE_UUID, WRITE_UUID),
        ];

        let found = find_characteristic(chars.clone(), SERVICE_UUID, WRITE_UUID).unwrap();
        assert_eq!(found.service_uuid, SERVICE_UUID);
        assert_eq!(found.uuid, WRITE_UUID);

        assert!(find_characteristic(chars[..1].to_vec(), SERVICE_UUID, WRITE_UUID).is_none());
        assert!(find_characteristic(chars, other_service, READ_UUID).is_none());
    }

    #[test]
    fn addresses_match_case_insensitively() {
        assert!(address_matches("AA:BB:CC:DD:EE:FF", "hci0/dev_AA", "aa:bb:cc:dd:ee:ff"));
        assert!(address_matches("00:00:00:00:00:00", "3F2504E0-4F89", " 3f2504e0-4f89 "));
        assert!(!address_matches("AA:BB:CC:DD:EE:FF", "x", "AA:BB:CC:DD:EE:00"));
    }
}
