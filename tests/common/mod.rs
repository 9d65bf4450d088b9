#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;

use co2mon_mqtt::config::{ConfigStore, DeviceConfig, text};
use co2mon_mqtt::error::{ConnectReasonCode, StoreError};
use co2mon_mqtt::packet::{self, ConnAck, EncodePacket, MqttPacket, Publish, QoS};
use co2mon_mqtt::runtime::{
    Board, OtaUpdater, Peripheral, Peripherals, QueueTiming, SensorControl, SensorReadings,
    SupervisorTiming, SystemControl, WifiManager,
};
use co2mon_mqtt::transport::{MqttTransport, TransportError};
use co2mon_mqtt::MqttOptions;
use embassy_time::Duration;

pub const MAC: u64 = 0x24_0A_C4_12_34_56;

pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        device_id: 42,
        mqtt_topic: text("myco2"),
        mqtt_host: text("broker.local"),
        mqtt_username: text("node"),
        mqtt_password: text("hunter2"),
        ..DeviceConfig::default()
    }
}

pub fn fast_queue() -> QueueTiming {
    QueueTiming {
        enqueue_timeout: Duration::from_millis(20),
        dequeue_timeout: Duration::from_millis(5),
    }
}

pub fn fast_supervisor() -> SupervisorTiming {
    SupervisorTiming {
        link_poll: Duration::from_millis(1),
        settle: Duration::from_millis(1),
        retry_backoff: Duration::from_millis(30),
    }
}

pub fn fast_options() -> MqttOptions {
    MqttOptions {
        keep_alive: Duration::from_secs(15),
        response_timeout: Duration::from_millis(50),
    }
}

// --- Scripted transport ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Refused,
    Closed,
    Reset,
    Timeout,
}

impl TransportError for MockError {
    fn is_timeout(&self) -> bool {
        *self == MockError::Timeout
    }
}

/// How the fake broker answers an `open`.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    /// TCP connect fails.
    Unreachable,
    /// TCP connects, CONNACK carries this code.
    ConnAck(ConnectReasonCode),
}

#[derive(Default)]
pub struct BrokerState {
    pub answers: VecDeque<Answer>,
    pub opens: usize,
    pub open: bool,
    pub peer_closed: bool,
    pub fail_sends: bool,
    pub inbound: VecDeque<u8>,
    pub sent: Vec<Vec<u8>>,
}

/// Shared view of the fake broker, kept by the test while the client owns the transport.
#[derive(Clone, Default)]
pub struct Broker(pub Rc<RefCell<BrokerState>>);

impl Broker {
    pub fn transport(&self) -> MockTransport {
        MockTransport(self.clone())
    }

    pub fn answer(&self, answer: Answer) {
        self.0.borrow_mut().answers.push_back(answer);
    }

    pub fn opens(&self) -> usize {
        self.0.borrow().opens
    }

    /// Queues an inbound PUBLISH for the client.
    pub fn deliver(&self, topic: &str, payload: &str) {
        self.push_packet(&Publish::new(topic, payload.as_bytes(), QoS::AtMostOnce));
    }

    /// Queues an inbound QoS 1 PUBLISH, which the client must acknowledge.
    pub fn deliver_qos1(&self, topic: &str, payload: &str, packet_id: u16) {
        let mut publish = Publish::new(topic, payload.as_bytes(), QoS::AtLeastOnce);
        publish.packet_id = Some(packet_id);
        self.push_packet(&publish);
    }

    /// Queues any packet for the client.
    pub fn push_packet<P: EncodePacket>(&self, packet: &P) {
        let mut buf = [0u8; 512];
        let n = packet.encode(&mut buf).unwrap();
        self.0.borrow_mut().inbound.extend(&buf[..n]);
    }

    /// Makes every later send fail while the stream stays open.
    pub fn fail_sends(&self) {
        self.0.borrow_mut().fail_sends = true;
    }

    /// Makes the next receive report that the broker closed the stream.
    pub fn close_from_peer(&self) {
        self.0.borrow_mut().peer_closed = true;
    }

    pub fn clear_sent(&self) {
        self.0.borrow_mut().sent.clear();
    }

    /// Everything the client sent, decoded.
    pub fn sent(&self) -> Vec<Sent> {
        self.0
            .borrow()
            .sent
            .iter()
            .map(|bytes| Sent::from(packet::decode(bytes).unwrap()))
            .collect()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|p| match p {
                Sent::Publish { topic, payload } => Some((topic, payload)),
                _ => None,
            })
            .collect()
    }
}

/// Owned form of a packet sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Connect {
        client_id: String,
        username: Option<String>,
        password: Option<String>,
    },
    Subscribe {
        filter: String,
    },
    Publish {
        topic: String,
        payload: String,
    },
    PubAck {
        packet_id: u16,
    },
    PingReq,
    Disconnect,
    Other,
}

impl From<MqttPacket<'_>> for Sent {
    fn from(packet: MqttPacket<'_>) -> Self {
        match packet {
            MqttPacket::Connect(c) => Sent::Connect {
                client_id: c.client_id.into(),
                username: c.username.map(Into::into),
                password: c.password.map(Into::into),
            },
            MqttPacket::Subscribe(s) => Sent::Subscribe {
                filter: s.filter.into(),
            },
            MqttPacket::Publish(p) => Sent::Publish {
                topic: p.topic.into(),
                payload: String::from_utf8(p.payload.to_vec()).unwrap(),
            },
            MqttPacket::PubAck(ack) => Sent::PubAck {
                packet_id: ack.packet_id,
            },
            MqttPacket::PingReq => Sent::PingReq,
            MqttPacket::Disconnect => Sent::Disconnect,
            _ => Sent::Other,
        }
    }
}

pub struct MockTransport(Broker);

impl MqttTransport for MockTransport {
    type Error = MockError;

    async fn open(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> {
        let mut state = self.0.0.borrow_mut();
        state.opens += 1;
        state.inbound.clear();
        state.peer_closed = false;
        state.fail_sends = false;
        let answer = state
            .answers
            .pop_front()
            .unwrap_or(Answer::ConnAck(ConnectReasonCode::Success));
        match answer {
            Answer::Unreachable => Err(MockError::Refused),
            Answer::ConnAck(code) => {
                let mut buf = [0u8; 4];
                let n = ConnAck {
                    session_present: false,
                    code,
                }
                .encode(&mut buf)
                .unwrap();
                state.inbound.extend(&buf[..n]);
                state.open = true;
                Ok(())
            }
        }
    }

    async fn close(&mut self) {
        let mut state = self.0.0.borrow_mut();
        state.open = false;
        state.inbound.clear();
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.0.0.borrow_mut();
        if !state.open {
            return Err(MockError::Closed);
        }
        if state.fail_sends {
            return Err(MockError::Reset);
        }
        state.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.0.0.borrow_mut();
        if !state.open {
            return Err(MockError::Closed);
        }
        if state.peer_closed {
            return Ok(0);
        }
        if state.inbound.is_empty() {
            return Err(MockError::Timeout);
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

// --- Fake board ---

pub struct FakeBoard {
    pub calibrations: RefCell<Vec<u16>>,
    pub offsets: RefCell<Vec<f32>>,
    pub temperature_offset: Cell<f32>,
    pub auto_clean_interval: Cell<u32>,
    pub cleans: Cell<u32>,
    pub wifi_resets: Cell<u32>,
    pub ota_checks: Cell<u32>,
    pub restarts: Cell<u32>,
    pub saves: RefCell<Vec<DeviceConfig>>,
    pub fail_saves: Cell<bool>,
    /// Number of `is_connected` calls that report Wi-Fi down before it comes up.
    pub wifi_down_polls: Cell<u32>,
    pub present: Vec<Peripheral>,
    pub neopixels: Option<u16>,
}

impl Default for FakeBoard {
    fn default() -> Self {
        Self {
            calibrations: RefCell::default(),
            offsets: RefCell::default(),
            temperature_offset: Cell::new(-1.5),
            auto_clean_interval: Cell::new(604_800),
            cleans: Cell::default(),
            wifi_resets: Cell::default(),
            ota_checks: Cell::default(),
            restarts: Cell::default(),
            saves: RefCell::default(),
            fail_saves: Cell::new(false),
            wifi_down_polls: Cell::new(0),
            present: vec![Peripheral::Scd30, Peripheral::Sps30],
            neopixels: None,
        }
    }
}

impl FakeBoard {
    pub fn board(&self) -> Board<'_> {
        Board {
            readings: self,
            sensors: self,
            peripherals: self,
            wifi: self,
            ota: self,
            system: self,
            store: self,
        }
    }
}

impl SensorReadings for FakeBoard {
    fn co2(&self) -> u16 {
        847
    }
    fn temperature(&self) -> f32 {
        22.34
    }
    fn humidity(&self) -> f32 {
        48.96
    }
    fn pressure(&self) -> u16 {
        1008
    }
    fn iaq(&self) -> u16 {
        61
    }
    fn pm0_5(&self) -> u16 {
        10
    }
    fn pm1(&self) -> u16 {
        11
    }
    fn pm2_5(&self) -> u16 {
        12
    }
    fn pm4(&self) -> u16 {
        13
    }
    fn pm10(&self) -> u16 {
        14
    }
}

impl SensorControl for FakeBoard {
    fn calibrate_co2(&self, reference_ppm: u16) {
        self.calibrations.borrow_mut().push(reference_ppm);
    }
    fn set_temperature_offset(&self, offset: f32) {
        self.offsets.borrow_mut().push(offset);
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
        self.cleans.set(self.cleans.get() + 1);
    }
    fn particulate_status(&self) -> u32 {
        0
    }
}

impl Peripherals for FakeBoard {
    fn is_present(&self, peripheral: Peripheral) -> bool {
        self.present.contains(&peripheral)
    }
    fn neopixel_count(&self) -> Option<u16> {
        self.neopixels
    }
}

impl WifiManager for FakeBoard {
    fn is_connected(&self) -> bool {
        let remaining = self.wifi_down_polls.get();
        if remaining == 0 {
            return true;
        }
        self.wifi_down_polls.set(remaining - 1);
        false
    }
    fn reset_credentials(&self) {
        self.wifi_resets.set(self.wifi_resets.get() + 1);
    }
    fn local_ip(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(192, 168, 1, 57))
    }
}

impl OtaUpdater for FakeBoard {
    fn check_for_update(&self) {
        self.ota_checks.set(self.ota_checks.get() + 1);
    }
}

impl SystemControl for FakeBoard {
    fn restart(&self) {
        self.restarts.set(self.restarts.get() + 1);
    }
    fn mac_address(&self) -> u64 {
        MAC
    }
}

impl ConfigStore for FakeBoard {
    fn load(&self) -> Result<DeviceConfig, StoreError> {
        self.saves.borrow().last().cloned().ok_or(StoreError::NotFound)
    }
    fn save(&self, config: &DeviceConfig) -> Result<(), StoreError> {
        if self.fail_saves.get() {
            return Err(StoreError::Write);
        }
        self.saves.borrow_mut().push(config.clone());
        Ok(())
    }
}
