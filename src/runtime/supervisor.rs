//! Broker connection state machine.
//!
//! `Disconnected -> Connecting -> Connected`, back to `Disconnected` whenever
//! the client reports the link lost. Reconnection waits for Wi-Fi, then retries
//! the broker at a fixed interval until it succeeds. Every successful connect
//! re-subscribes both downlink filters and announces the device online before
//! control returns to the runtime loop.

use core::fmt::Write;

use embassy_time::{Duration, Timer};
use heapless::String;
use log::{debug, info, warn};

use super::router::{Uplink, downlink_filters, uplink_topic};
use super::traits::Board;
use crate::client::{ConnectParams, MqttClient};
use crate::config::{DeviceConfig, SharedConfig};
use crate::error::{EncodeError, MqttError};
use crate::packet::QoS;
use crate::transport::MqttTransport;

/// Payload published on `up/status` after every successful connect.
pub const ONLINE_PAYLOAD: &[u8] = br#"{"online":true}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delays used while reconnecting.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTiming {
    /// Interval between Wi-Fi link checks.
    pub link_poll: Duration,
    /// Pause after a successful connect, before the loop resumes.
    pub settle: Duration,
    /// Fixed pause after a failed attempt.
    pub retry_backoff: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            link_poll: Duration::from_millis(100),
            settle: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(10),
        }
    }
}

pub type ClientId = String<48>;

/// `CO2Monitor-<deviceId>-<lower 32 bits of the MAC in hex>`
pub fn client_identifier(device_id: u16, mac: u64) -> ClientId {
    let mut id = ClientId::new();
    // Fits: 11 + 5 + 1 + 8 characters at most.
    let _ = write!(id, "CO2Monitor-{}-{:x}", device_id, mac as u32);
    id
}

/// Owns the connection state and drives reconnection.
pub struct ConnectionSupervisor {
    state: ConnectionState,
    timing: SupervisorTiming,
    // Failed broker attempts since the last successful connect.
    attempts: u32,
}

impl ConnectionSupervisor {
    pub fn new(timing: SupervisorTiming) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            timing,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Liveness check run once per loop cycle.
    ///
    /// Reconnects synchronously when the client has lost its link. This blocks
    /// the caller, without bound, until the broker accepts a connection.
    pub async fn ensure_connected<T: MqttTransport, const BUF_SIZE: usize>(
        &mut self,
        client: &mut MqttClient<T, BUF_SIZE>,
        config: &SharedConfig,
        board: &Board<'_>,
    ) {
        if client.is_connected() {
            return;
        }
        if self.state == ConnectionState::Connected {
            info!("MQTT connection lost");
        }
        self.state = ConnectionState::Disconnected;
        self.reconnect(client, config, board).await;
    }

    async fn reconnect<T: MqttTransport, const BUF_SIZE: usize>(
        &mut self,
        client: &mut MqttClient<T, BUF_SIZE>,
        config: &SharedConfig,
        board: &Board<'_>,
    ) {
        while !board.wifi.is_connected() {
            Timer::after(self.timing.link_poll).await;
        }

        let settings = config.snapshot();
        let client_id = client_identifier(settings.device_id, board.system.mac_address());

        while !client.is_connected() {
            self.state = ConnectionState::Connecting;
            debug!("attempting MQTT connection as {}", client_id.as_str());

            let params = ConnectParams {
                host: &settings.mqtt_host,
                port: settings.mqtt_port,
                client_id: &client_id,
                username: &settings.mqtt_username,
                password: &settings.mqtt_password,
            };
            let outcome = match client.connect(&params).await {
                Ok(()) => announce(client, &settings).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok(()) => {
                    info!("MQTT connected");
                    self.state = ConnectionState::Connected;
                    self.attempts = 0;
                    Timer::after(self.timing.settle).await;
                }
                Err(e) => {
                    self.attempts = self.attempts.saturating_add(1);
                    match e {
                        AttemptError::Mqtt(e) => {
                            warn!("MQTT connection failed (attempt {}): {:?}", self.attempts, e)
                        }
                        AttemptError::Topic(e) => warn!("downlink topics do not fit: {:?}", e),
                    }
                    client.disconnect().await;
                    self.state = ConnectionState::Disconnected;
                    Timer::after(self.timing.retry_backoff).await;
                }
            }
        }
    }
}

/// Why a connect attempt did not end in the online state.
enum AttemptError<E> {
    Mqtt(MqttError<E>),
    Topic(EncodeError),
}

impl<E> From<MqttError<E>> for AttemptError<E> {
    fn from(err: MqttError<E>) -> Self {
        AttemptError::Mqtt(err)
    }
}

impl<E> From<EncodeError> for AttemptError<E> {
    fn from(err: EncodeError) -> Self {
        AttemptError::Topic(err)
    }
}

/// Subscribes both downlink filters, then publishes the online status.
async fn announce<T: MqttTransport, const BUF_SIZE: usize>(
    client: &mut MqttClient<T, BUF_SIZE>,
    settings: &DeviceConfig,
) -> Result<(), AttemptError<T::Error>> {
    for filter in downlink_filters(&settings.mqtt_topic, settings.device_id)? {
        client.subscribe(&filter, QoS::AtMostOnce).await?;
    }
    let status = uplink_topic(&settings.mqtt_topic, settings.device_id, Uplink::Status)?;
    client.publish(&status, ONLINE_PAYLOAD, QoS::AtMostOnce).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_identifier_uses_low_mac_bits() {
        let id = client_identifier(42, 0x0000_A1B2_C3D4_E5F6);
        assert_eq!(id.as_str(), "CO2Monitor-42-c3d4e5f6");
    }
}
