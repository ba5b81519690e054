use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::protocol::{READ_UUID, SERVICE_UUID, WRITE_UUID};
use crate::{Error, Result};

/// Seconds of inactivity before the link is dropped
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// Attempts per command before giving up
pub const DEFAULT_MAX_ATTEMPTS: u8 = 3;
/// How long to scan for an address before reporting it missing
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Supported device models
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceModel {
    /// H617A segmented RGBIC strip
    #[default]
    H617A,
    /// Any other model, by its Govee model number
    Other(String),
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceModel::H617A => write!(f, "H617A"),
            DeviceModel::Other(model) => write!(f, "{}", model),
        }
    }
}

impl FromStr for DeviceModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let model = s.trim().to_uppercase();
        if model.is_empty() {
            return Err(Error::Config("empty model name".into()));
        }
        Ok(match model.as_str() {
            "H617A" => DeviceModel::H617A,
            _ => DeviceModel::Other(model),
        })
    }
}

/// Connection and GATT settings for one device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device model
    pub model: DeviceModel,
    /// UUID of the service holding the control characteristics
    pub service_uuid: Uuid,
    /// UUID for write characteristic
    pub write_uuid: Uuid,
    /// UUID for read characteristic
    pub read_uuid: Uuid,
    /// Inactivity window after which the link is closed
    pub idle_timeout: Duration,
    /// Attempts per command, including the first
    pub max_attempts: u8,
    /// Discovery window when resolving an address
    pub scan_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: DeviceModel::default(),
            service_uuid: SERVICE_UUID,
            write_uuid: WRITE_UUID,
            read_uuid: READ_UUID,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

impl DeviceConfig {
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u8) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    pub fn with_write_uuid(mut self, uuid: &str) -> Result<Self> {
        self.write_uuid = Uuid::parse_str(uuid)
            .map_err(|e| Error::Config(format!("invalid write UUID {:?}: {}", uuid, e)))?;
        Ok(self)
    }

    /// Attempts per command, never less than one
    pub fn attempts(&self) -> u8 {
        self.max_attempts.max(1)
    }
}
