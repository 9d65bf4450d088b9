//! # MQTT Client
//!
//! A single-connection MQTT 3.1.1 client over any [`MqttTransport`].
//!
//! The client never spawns anything: every operation is driven by the caller,
//! and inbound traffic is pumped explicitly through [`MqttClient::poll`]. This
//! mirrors how the runtime uses it, as the one network-owning context on the
//! device.

use embassy_time::{Duration, Instant};
use log::{debug, warn};

use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    self, Connect, Disconnect, EncodePacket, MqttPacket, PingReq, PubAck, Publish, QoS, Subscribe,
};
use crate::transport::{MqttTransport, TransportError};
use crate::util::frame_length;

/// Client session options.
#[derive(Debug, Clone, Copy)]
pub struct MqttOptions {
    /// Keep-alive interval announced in CONNECT. A PINGREQ is sent after this
    /// much outbound silence, and the link is dropped if no packet arrives
    /// within another interval after the ping.
    pub keep_alive: Duration,
    /// How long to wait for CONNACK.
    pub response_timeout: Duration,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
            response_timeout: Duration::from_secs(5),
        }
    }
}

/// Broker address and login used for one connection attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// An MQTT client owning its transport and packet buffers.
///
/// `BUF_SIZE` bounds both the largest outbound packet and the largest inbound
/// frame.
pub struct MqttClient<T: MqttTransport, const BUF_SIZE: usize> {
    transport: T,
    options: MqttOptions,
    connected: bool,
    next_packet_id: u16,
    tx: [u8; BUF_SIZE],
    rx: [u8; BUF_SIZE],
    rx_len: usize,
    // Length of the frame handed out by the last `poll`, discarded on the next call.
    consumed: usize,
    last_tx: Instant,
    // Set while a PINGREQ is unanswered.
    ping_sent: Option<Instant>,
}

impl<T: MqttTransport, const BUF_SIZE: usize> MqttClient<T, BUF_SIZE> {
    pub fn new(transport: T, options: MqttOptions) -> Self {
        Self {
            transport,
            options,
            connected: false,
            next_packet_id: 1,
            tx: [0; BUF_SIZE],
            rx: [0; BUF_SIZE],
            rx_len: 0,
            consumed: 0,
            last_tx: Instant::now(),
            ping_sent: None,
        }
    }

    /// Whether the last connection attempt succeeded and no loss has been detected since.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Opens the transport and performs the CONNECT/CONNACK handshake.
    pub async fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), MqttError<T::Error>> {
        self.connected = false;
        self.rx_len = 0;
        self.consumed = 0;
        self.ping_sent = None;

        self.transport
            .open(params.host, params.port)
            .await
            .map_err(MqttError::Transport)?;

        let keep_alive = self.options.keep_alive.as_secs().min(u16::MAX as u64) as u16;
        let connect = Connect::new(params.client_id, keep_alive)
            .with_credentials(params.username, params.password);
        if let Err(e) = self.send_packet(&connect).await {
            self.transport.close().await;
            return Err(e);
        }

        match self.await_connack().await {
            Ok(()) => {
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                self.transport.close().await;
                Err(e)
            }
        }
    }

    async fn await_connack(&mut self) -> Result<(), MqttError<T::Error>> {
        let deadline = Instant::now() + self.options.response_timeout;
        loop {
            if let Some(len) = self.read_frame().await? {
                self.consume(len);
                let code = match packet::decode(&self.rx[..len]).map_err(MqttError::from_codec)? {
                    MqttPacket::ConnAck(ack) => ack.code,
                    _ => return Err(ProtocolError::InvalidResponse.into()),
                };
                return match code {
                    ConnectReasonCode::Success => Ok(()),
                    refused => Err(MqttError::ConnectionRefused(refused)),
                };
            }
            if Instant::now() >= deadline {
                return Err(MqttError::Timeout);
            }
        }
    }

    /// Subscribes to a topic filter. The SUBACK is consumed later by `poll`.
    pub async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let packet_id = self.packet_id();
        self.send_packet(&Subscribe {
            packet_id,
            filter,
            qos,
        })
        .await
    }

    /// Publishes `payload` to `topic`.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let mut publish = Publish::new(topic, payload, qos);
        if qos != QoS::AtMostOnce {
            publish.packet_id = Some(self.packet_id());
        }
        self.send_packet(&publish).await
    }

    /// Services the connection once: reads at most one inbound frame, then
    /// runs keep-alive.
    ///
    /// Returns the inbound PUBLISH, if one arrived. Acknowledgements and ping
    /// responses are absorbed here. Any transport failure marks the client
    /// disconnected before the error is returned.
    pub async fn poll(&mut self) -> Result<Option<Publish<'_>>, MqttError<T::Error>> {
        self.ensure_connected()?;
        self.discard_consumed();

        let frame = match self.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                self.drop_link().await;
                return Err(e);
            }
        };
        if frame.is_some() {
            // Any packet from the broker answers an outstanding ping.
            self.ping_sent = None;
        }

        if let Err(e) = self.keep_alive().await {
            self.drop_link().await;
            return Err(e);
        }

        let Some(len) = frame else {
            return Ok(None);
        };
        self.consume(len);

        let ack = match packet::decode(&self.rx[..len]).map_err(MqttError::from_codec)? {
            MqttPacket::Publish(publish) => match (publish.qos, publish.packet_id) {
                (QoS::AtLeastOnce, Some(packet_id)) => Some(packet_id),
                _ => None,
            },
            MqttPacket::SubAck(ack) => {
                if ack.return_code == 0x80 {
                    warn!("subscription {} rejected by broker", ack.packet_id);
                }
                return Ok(None);
            }
            MqttPacket::PingResp | MqttPacket::PubAck(_) => return Ok(None),
            other => {
                debug!("ignoring unexpected packet {:?}", other);
                return Ok(None);
            }
        };

        if let Some(packet_id) = ack {
            self.send_packet(&PubAck { packet_id }).await?;
        }

        match packet::decode(&self.rx[..len]) {
            Ok(MqttPacket::Publish(publish)) => Ok(Some(publish)),
            _ => Ok(None),
        }
    }

    /// Sends DISCONNECT (best effort) and closes the transport.
    pub async fn disconnect(&mut self) {
        if self.connected
            && let Ok(n) = Disconnect.encode(&mut self.tx)
        {
            let _ = self.transport.send(&self.tx[..n]).await;
        }
        self.drop_link().await;
    }

    fn ensure_connected(&self) -> Result<(), MqttError<T::Error>> {
        if self.connected {
            Ok(())
        } else {
            Err(MqttError::NotConnected)
        }
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    async fn send_packet<P: EncodePacket>(&mut self, packet: &P) -> Result<(), MqttError<T::Error>> {
        let n = packet.encode(&mut self.tx).map_err(MqttError::from_codec)?;
        if let Err(e) = self.transport.send(&self.tx[..n]).await {
            self.drop_link().await;
            return Err(MqttError::Transport(e));
        }
        self.last_tx = Instant::now();
        Ok(())
    }

    async fn keep_alive(&mut self) -> Result<(), MqttError<T::Error>> {
        let interval = self.options.keep_alive;
        match self.ping_sent {
            Some(sent) if sent.elapsed() > interval => {
                Err(ProtocolError::KeepAliveTimeout.into())
            }
            Some(_) => Ok(()),
            None if self.last_tx.elapsed() >= interval => {
                self.send_packet(&PingReq).await?;
                self.ping_sent = Some(Instant::now());
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Reads until one complete frame is buffered at the start of `rx`.
    ///
    /// `Ok(None)` means the transport timed out first; partial data stays buffered.
    async fn read_frame(&mut self) -> Result<Option<usize>, MqttError<T::Error>> {
        loop {
            match frame_length(&self.rx[..self.rx_len]).map_err(MqttError::from_codec)? {
                Some(len) => return Ok(Some(len)),
                None if self.rx_len == BUF_SIZE => {
                    return Err(ProtocolError::PayloadTooLarge.into());
                }
                None => {}
            }

            match self.transport.recv(&mut self.rx[self.rx_len..]).await {
                Ok(0) => return Err(ProtocolError::ConnectionClosed.into()),
                Ok(n) => self.rx_len += n,
                Err(e) if e.is_timeout() => return Ok(None),
                Err(e) => return Err(MqttError::Transport(e)),
            }
        }
    }

    fn consume(&mut self, len: usize) {
        self.consumed = len;
    }

    fn discard_consumed(&mut self) {
        if self.consumed > 0 {
            self.rx.copy_within(self.consumed..self.rx_len, 0);
            self.rx_len -= self.consumed;
            self.consumed = 0;
        }
    }

    async fn drop_link(&mut self) {
        if self.connected {
            debug!("MQTT link dropped");
        }
        self.connected = false;
        self.ping_sent = None;
        self.transport.close().await;
    }
}
