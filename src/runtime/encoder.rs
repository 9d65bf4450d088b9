//! JSON documents published on the `up/sensors` and `up/config` channels.
//!
//! Floating point quantities are written as text with exactly one decimal
//! (`"21.5"`), so every consumer sees the same rounding regardless of how it
//! parses floats.

use core::fmt::Write;
use core::net::Ipv4Addr;

use heapless::String;
use serde::{Serialize, Serializer};

use super::traits::{Board, Peripheral, SensorReadings};
use crate::config::DeviceConfig;
use crate::error::EncodeError;
use crate::telemetry::TelemetryMask;

/// Firmware version reported in the configuration document.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Payload capacity of a sensors document.
pub const SENSORS_PAYLOAD_CAPACITY: usize = 256;
/// Payload capacity of a configuration document.
pub const CONFIG_PAYLOAD_CAPACITY: usize = 512;

/// A float serialized as a string with one fraction digit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneDecimal(pub f32);

impl Serialize for OneDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf: String<16> = String::new();
        // 16 bytes hold any f32 in the sensors' range; wider values degrade to "nan".
        if write!(buf, "{:.1}", self.0).is_err() {
            buf.clear();
            let _ = buf.push_str("nan");
        }
        serializer.serialize_str(&buf)
    }
}

#[derive(Serialize)]
struct SensorsDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    co2: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<OneDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    humidity: Option<OneDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iaq: Option<u16>,
    #[serde(rename = "pm0.5", skip_serializing_if = "Option::is_none")]
    pm0_5: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pm1: Option<u16>,
    #[serde(rename = "pm2.5", skip_serializing_if = "Option::is_none")]
    pm2_5: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pm4: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pm10: Option<u16>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument<'a> {
    app_version: &'a str,
    altitude: i16,
    yellow_threshold: u16,
    red_threshold: u16,
    dark_red_threshold: u16,
    led_pwm: u8,
    mac: &'a str,
    ip: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    scd30: bool,
    #[serde(skip_serializing_if = "is_false")]
    scd40: bool,
    #[serde(skip_serializing_if = "is_false")]
    bme680: bool,
    #[serde(skip_serializing_if = "is_false")]
    lcd: bool,
    #[serde(skip_serializing_if = "is_false")]
    sps30: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sps30_auto_clean_int: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sps30_status: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    neopxl: Option<u16>,
    #[serde(skip_serializing_if = "is_false")]
    leds: bool,
    temp_offset: OneDecimal,
}

fn to_payload<T: Serialize>(doc: &T, buf: &mut [u8], capacity: usize) -> Result<usize, EncodeError> {
    let limit = capacity.min(buf.len());
    serde_json_core::to_slice(doc, &mut buf[..limit]).map_err(|_| EncodeError::PayloadTooLarge)
}

/// Serializes the quantities selected by `mask` into `buf`.
///
/// Returns the payload length. Fails with `PayloadTooLarge` when the document
/// does not fit [`SENSORS_PAYLOAD_CAPACITY`] or `buf`.
pub fn encode_sensors(
    mask: TelemetryMask,
    readings: &dyn SensorReadings,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    let pick = |flag: TelemetryMask| mask.contains(flag);
    let doc = SensorsDocument {
        co2: pick(TelemetryMask::CO2).then(|| readings.co2()),
        temperature: pick(TelemetryMask::TEMPERATURE).then(|| OneDecimal(readings.temperature())),
        humidity: pick(TelemetryMask::HUMIDITY).then(|| OneDecimal(readings.humidity())),
        pressure: pick(TelemetryMask::PRESSURE).then(|| readings.pressure()),
        iaq: pick(TelemetryMask::IAQ).then(|| readings.iaq()),
        pm0_5: pick(TelemetryMask::PM0_5).then(|| readings.pm0_5()),
        pm1: pick(TelemetryMask::PM1).then(|| readings.pm1()),
        pm2_5: pick(TelemetryMask::PM2_5).then(|| readings.pm2_5()),
        pm4: pick(TelemetryMask::PM4).then(|| readings.pm4()),
        pm10: pick(TelemetryMask::PM10).then(|| readings.pm10()),
    };
    to_payload(&doc, buf, SENSORS_PAYLOAD_CAPACITY)
}

/// Serializes the configuration and detected hardware into `buf`.
///
/// Peripheral flags appear only for detected peripherals. Particulate sensor
/// details appear only when an SPS30 is present.
pub fn encode_config(
    config: &DeviceConfig,
    board: &Board<'_>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    let mut mac: String<16> = String::new();
    // Lower 32 bits, as printed on the device label.
    write!(mac, "{:x}", board.system.mac_address() as u32)
        .map_err(|_| EncodeError::PayloadTooLarge)?;

    let mut ip: String<16> = String::new();
    write!(ip, "{}", board.wifi.local_ip().unwrap_or(Ipv4Addr::UNSPECIFIED))
        .map_err(|_| EncodeError::PayloadTooLarge)?;

    let present = |p: Peripheral| board.peripherals.is_present(p);
    let sps30 = present(Peripheral::Sps30);

    let doc = ConfigDocument {
        app_version: APP_VERSION,
        altitude: config.altitude,
        yellow_threshold: config.yellow_threshold,
        red_threshold: config.red_threshold,
        dark_red_threshold: config.dark_red_threshold,
        led_pwm: config.led_pwm,
        mac: &mac,
        ip: &ip,
        scd30: present(Peripheral::Scd30),
        scd40: present(Peripheral::Scd40),
        bme680: present(Peripheral::Bme680),
        lcd: present(Peripheral::Lcd),
        sps30,
        sps30_auto_clean_int: sps30.then(|| board.sensors.auto_clean_interval()),
        sps30_status: sps30.then(|| board.sensors.particulate_status()),
        neopxl: board.peripherals.neopixel_count(),
        leds: present(Peripheral::Leds),
        temp_offset: OneDecimal(board.sensors.temperature_offset()),
    };
    to_payload(&doc, buf, CONFIG_PAYLOAD_CAPACITY)
}
