//! Example: a simulated sensor node on the host
//!
//! Wires an `MqttRuntime` to a blocking `std` TCP stream and a simulated
//! board, then publishes all readings every five seconds. Commands sent to
//! `co2monitor/1/down/<command>` or `co2monitor/down/<command>` are printed
//! as they reach the board.
//!
//! ```text
//! mosquitto -p 1883 &
//! cargo run --example host_node
//! mosquitto_pub -t co2monitor/1/down/calibrate -m 415
//! ```
//!
//! On a device, `TcpTransport` over `embassy-net` replaces `StdTransport` and
//! the runtime runs in its own Embassy task.

use std::cell::{Cell, RefCell};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpStream};

use co2mon_mqtt::config::text;
use co2mon_mqtt::error::StoreError;
use co2mon_mqtt::runtime::{
    Board, OtaUpdater, Peripheral, Peripherals, QueueTiming, RequestQueue, SensorControl,
    SensorReadings, SupervisorTiming, SystemControl, WifiManager,
};
use co2mon_mqtt::{
    ConfigStore, DeviceConfig, MqttClient, MqttOptions, MqttRuntime, MqttTransport,
    SharedConfig, TelemetryMask, TransportError,
};
use embassy_futures::block_on;
use embassy_time::{Duration, Instant};

#[derive(Debug)]
struct StdError(ErrorKind);

impl TransportError for StdError {
    fn is_timeout(&self) -> bool {
        matches!(self.0, ErrorKind::WouldBlock | ErrorKind::TimedOut)
    }
}

impl From<std::io::Error> for StdError {
    fn from(err: std::io::Error) -> Self {
        StdError(err.kind())
    }
}

/// Blocking TCP stream with a short read timeout, so `poll` returns promptly.
struct StdTransport {
    stream: Option<TcpStream>,
}

impl MqttTransport for StdTransport {
    type Error = StdError;

    async fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_read_timeout(Some(std::time::Duration::from_millis(50)))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) {
        self.stream = None;
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let stream = self.stream.as_mut().ok_or(StdError(ErrorKind::NotConnected))?;
        stream.write_all(buf)?;
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let stream = self.stream.as_mut().ok_or(StdError(ErrorKind::NotConnected))?;
        Ok(stream.read(buf)?)
    }
}

struct SimulatedBoard {
    temperature_offset: Cell<f32>,
    auto_clean_interval: Cell<u32>,
    stored: RefCell<Option<DeviceConfig>>,
}

impl SensorReadings for SimulatedBoard {
    fn co2(&self) -> u16 {
        // Drifts slowly so consecutive publications differ.
        600 + (Instant::now().as_secs() % 400) as u16
    }
    fn temperature(&self) -> f32 {
        21.5 + self.temperature_offset.get()
    }
    fn humidity(&self) -> f32 {
        44.0
    }
    fn pressure(&self) -> u16 {
        1013
    }
    fn iaq(&self) -> u16 {
        50
    }
    fn pm0_5(&self) -> u16 {
        3
    }
    fn pm1(&self) -> u16 {
        4
    }
    fn pm2_5(&self) -> u16 {
        5
    }
    fn pm4(&self) -> u16 {
        6
    }
    fn pm10(&self) -> u16 {
        7
    }
}

impl SensorControl for SimulatedBoard {
    fn calibrate_co2(&self, reference_ppm: u16) {
        println!("calibrating CO2 sensor against {reference_ppm} ppm");
    }
    fn set_temperature_offset(&self, offset: f32) {
        println!("temperature offset set to {offset}");
        self.temperature_offset.set(offset);
    }
    fn temperature_offset(&self) -> f32 {
        self.temperature_offset.get()
    }
    fn auto_clean_interval(&self) -> u32 {
        self.auto_clean_interval.get()
    }
    fn set_auto_clean_interval(&self, seconds: u32) {
        self.auto_clean_interval.set(seconds);
    }
    fn clean_particulate_sensor(&self) {
        println!("starting fan cleaning");
    }
    fn particulate_status(&self) -> u32 {
        0
    }
}

impl Peripherals for SimulatedBoard {
    fn is_present(&self, peripheral: Peripheral) -> bool {
        matches!(peripheral, Peripheral::Scd30 | Peripheral::Sps30)
    }
}

impl WifiManager for SimulatedBoard {
    fn is_connected(&self) -> bool {
        true
    }
    fn reset_credentials(&self) {
        println!("wiping Wi-Fi credentials");
    }
    fn local_ip(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::LOCALHOST)
    }
}

impl OtaUpdater for SimulatedBoard {
    fn check_for_update(&self) {
        println!("checking for firmware update");
    }
}

impl SystemControl for SimulatedBoard {
    fn restart(&self) {
        println!("restart requested");
    }
    fn mac_address(&self) -> u64 {
        0x02_00_00_00_00_01
    }
}

impl ConfigStore for SimulatedBoard {
    fn load(&self) -> Result<DeviceConfig, StoreError> {
        self.stored.borrow().clone().ok_or(StoreError::NotFound)
    }
    fn save(&self, config: &DeviceConfig) -> Result<(), StoreError> {
        println!("saving configuration: {config:?}");
        *self.stored.borrow_mut() = Some(config.clone());
        Ok(())
    }
}

fn main() {
    let board = SimulatedBoard {
        temperature_offset: Cell::new(0.0),
        auto_clean_interval: Cell::new(604_800),
        stored: RefCell::new(None),
    };
    let parts = Board {
        readings: &board,
        sensors: &board,
        peripherals: &board,
        wifi: &board,
        ota: &board,
        system: &board,
        store: &board,
    };

    let config = SharedConfig::new(DeviceConfig {
        device_id: 1,
        mqtt_host: text("localhost"),
        ..DeviceConfig::load_or_default(&board)
    });
    let queue = RequestQueue::new(QueueTiming::default());
    let client: MqttClient<_, 512> =
        MqttClient::new(StdTransport { stream: None }, MqttOptions::default());
    let mut runtime = MqttRuntime::new(client, SupervisorTiming::default(), &queue, &config, parts);

    let publisher = queue.publisher();
    let period = Duration::from_secs(5);
    let mut next_sample = Instant::now();

    block_on(async {
        loop {
            if Instant::now() >= next_sample {
                publisher.try_request_sensors(TelemetryMask::ALL);
                next_sample += period;
            }
            runtime.run_once().await;
        }
    })
}
