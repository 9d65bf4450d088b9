//! Device configuration record, its shared handle, and the `setConfig` merge.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::String;
use log::warn;
use serde::Deserialize;

use crate::error::{CommandError, StoreError};

pub const TOPIC_PREFIX_LEN: usize = 64;
pub const HOST_LEN: usize = 64;
pub const USERNAME_LEN: usize = 32;
pub const PASSWORD_LEN: usize = 64;

/// The persistent configuration of a sensor node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_id: u16,
    /// First segment of every topic, e.g. `co2monitor`.
    pub mqtt_topic: String<TOPIC_PREFIX_LEN>,
    pub mqtt_host: String<HOST_LEN>,
    pub mqtt_port: u16,
    pub mqtt_username: String<USERNAME_LEN>,
    pub mqtt_password: String<PASSWORD_LEN>,
    /// Metres above sea level, used for CO2 pressure compensation. Negative
    /// below sea level.
    pub altitude: i16,
    pub yellow_threshold: u16,
    pub red_threshold: u16,
    pub dark_red_threshold: u16,
    pub led_pwm: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            mqtt_topic: text("co2monitor"),
            mqtt_host: text("127.0.0.1"),
            mqtt_port: 1883,
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            altitude: 0,
            yellow_threshold: 700,
            red_threshold: 900,
            dark_red_threshold: 1200,
            led_pwm: 255,
        }
    }
}

impl DeviceConfig {
    /// Loads the stored record, falling back to factory values.
    pub fn load_or_default(store: &dyn ConfigStore) -> Self {
        match store.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("using default configuration: {:?}", e);
                Self::default()
            }
        }
    }
}

/// Builds a bounded string, truncating at the first character that does not fit.
pub fn text<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// The persistent configuration store.
pub trait ConfigStore {
    fn load(&self) -> Result<DeviceConfig, StoreError>;
    fn save(&self, config: &DeviceConfig) -> Result<(), StoreError>;
}

/// The one owned handle to the live configuration.
///
/// The runtime mutates it from inbound commands while other contexts (display
/// rendering, LED thresholds) read it, so every access goes through a
/// critical-section mutex.
pub struct SharedConfig {
    inner: Mutex<CriticalSectionRawMutex, RefCell<DeviceConfig>>,
}

impl SharedConfig {
    pub const fn new(config: DeviceConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(config)),
        }
    }

    /// Runs `f` with shared access to the record.
    pub fn lock<R>(&self, f: impl FnOnce(&DeviceConfig) -> R) -> R {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    /// Runs `f` with exclusive access to the record.
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceConfig) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn snapshot(&self) -> DeviceConfig {
        self.lock(DeviceConfig::clone)
    }
}

/// Body of a `setConfig` command. Every field is optional.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub altitude: Option<i64>,
    pub yellow_threshold: Option<i64>,
    pub red_threshold: Option<i64>,
    pub dark_red_threshold: Option<i64>,
    pub led_pwm: Option<i64>,
}

impl ConfigPatch {
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        serde_json_core::from_slice::<Self>(payload)
            .map(|(patch, _)| patch)
            .map_err(|_| CommandError::MalformedPayload)
    }

    /// Merges the patch into `config`.
    ///
    /// A value of zero counts as absent, so no field can be set to zero this
    /// way. Values that do not fit the field are skipped as well.
    pub fn apply(&self, config: &mut DeviceConfig) {
        merge(&mut config.altitude, self.altitude);
        merge(&mut config.yellow_threshold, self.yellow_threshold);
        merge(&mut config.red_threshold, self.red_threshold);
        merge(&mut config.dark_red_threshold, self.dark_red_threshold);
        merge(&mut config.led_pwm, self.led_pwm);
    }
}

fn merge<T: TryFrom<i64>>(field: &mut T, value: Option<i64>) {
    if let Some(value) = value.filter(|v| *v != 0)
        && let Ok(value) = T::try_from(value)
    {
        *field = value;
    }
}
