//! Collaborator capabilities consumed by the runtime.
//!
//! Sensor drivers, the Wi-Fi manager, the OTA updater and the configuration
//! store live outside this crate. The runtime only sees them through the small
//! object-safe traits below, bundled into a [`Board`].
//!
//! # Object Safety
//!
//! Every method takes `&self` and is synchronous, so the traits can be used as
//! `&dyn` references stored in `StaticCell`s and handed to an Embassy task
//! without generic parameters. Implementations that mutate hardware state use
//! their own interior mutability (a blocking mutex or atomics).
//!
//! # Example
//!
//! ```ignore
//! struct Scd30Driver { /* ... */ }
//!
//! impl SensorControl for Scd30Driver {
//!     fn calibrate_co2(&self, reference_ppm: u16) {
//!         self.bus.lock(|bus| bus.force_recalibration(reference_ppm));
//!     }
//!     // ...
//! }
//! ```

use core::net::Ipv4Addr;

use crate::config::ConfigStore;

/// Latest measured values.
pub trait SensorReadings {
    /// CO2 concentration in ppm.
    fn co2(&self) -> u16;
    /// Degrees Celsius.
    fn temperature(&self) -> f32;
    /// Relative humidity in percent.
    fn humidity(&self) -> f32;
    /// Hectopascal.
    fn pressure(&self) -> u16;
    /// Indoor air quality index.
    fn iaq(&self) -> u16;
    fn pm0_5(&self) -> u16;
    fn pm1(&self) -> u16;
    fn pm2_5(&self) -> u16;
    fn pm4(&self) -> u16;
    fn pm10(&self) -> u16;
}

/// Maintenance operations on the CO2 and particulate sensors.
pub trait SensorControl {
    /// Forces recalibration against a known CO2 concentration.
    fn calibrate_co2(&self, reference_ppm: u16);
    fn set_temperature_offset(&self, offset: f32);
    fn temperature_offset(&self) -> f32;
    /// Particulate sensor fan auto-clean interval, in seconds.
    fn auto_clean_interval(&self) -> u32;
    fn set_auto_clean_interval(&self, seconds: u32);
    /// Starts a fan cleaning cycle on the particulate sensor.
    fn clean_particulate_sensor(&self);
    /// Raw device status register of the particulate sensor.
    fn particulate_status(&self) -> u32;
}

/// Optional on-board peripherals detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Peripheral {
    Scd30,
    Scd40,
    Bme680,
    Lcd,
    /// Particulate matter sensor.
    Sps30,
    /// Discrete traffic-light LEDs.
    Leds,
}

pub trait Peripherals {
    fn is_present(&self, peripheral: Peripheral) -> bool;

    /// Number of NeoPixels on the board, if it has any.
    fn neopixel_count(&self) -> Option<u16> {
        None
    }
}

pub trait WifiManager {
    fn is_connected(&self) -> bool;
    /// Forgets stored credentials so provisioning starts over.
    fn reset_credentials(&self);
    fn local_ip(&self) -> Option<Ipv4Addr>;
}

pub trait OtaUpdater {
    fn check_for_update(&self);
}

pub trait SystemControl {
    /// Restarts the device. On hardware this does not return.
    fn restart(&self);
    /// Factory-programmed MAC address.
    fn mac_address(&self) -> u64;
}

/// All collaborators the runtime talks to.
#[derive(Clone, Copy)]
pub struct Board<'a> {
    pub readings: &'a dyn SensorReadings,
    pub sensors: &'a dyn SensorControl,
    pub peripherals: &'a dyn Peripherals,
    pub wifi: &'a dyn WifiManager,
    pub ota: &'a dyn OtaUpdater,
    pub system: &'a dyn SystemControl,
    pub store: &'a dyn ConfigStore,
}
