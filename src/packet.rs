//! # MQTT Packet Structures and Serialization
//!
//! The MQTT 3.1.1 control packets a sensor node needs: connecting with
//! credentials, subscribing to downlink filters, publishing uplink documents,
//! acknowledging QoS 1 deliveries and keeping the session alive.

use crate::error::{CodecError, ConnectReasonCode, ProtocolError};
use crate::util::{PacketReader, PacketWriter};

/// Protocol level byte for MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> Result<Self, CodecError> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket.into()),
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Encodes the packet and returns the number of bytes written.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError>;
}

/// Every packet the codec understands.
#[derive(Debug, PartialEq)]
pub enum MqttPacket<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(PubAck),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck),
    PingReq,
    PingResp,
    Disconnect,
}

/// Decodes one complete frame, as delimited by [`crate::util::frame_length`].
pub fn decode(frame: &[u8]) -> Result<MqttPacket<'_>, CodecError> {
    let first = *frame.first().ok_or(ProtocolError::MalformedPacket)?;
    let mut r = PacketReader::new(frame);
    r.header()?;

    let packet = match first >> 4 {
        1 => MqttPacket::Connect(Connect::decode(&mut r)?),
        2 => MqttPacket::ConnAck(ConnAck {
            session_present: r.u8()? & 0x01 != 0,
            code: ConnectReasonCode::from(r.u8()?),
        }),
        3 => MqttPacket::Publish(Publish::decode(first, &mut r)?),
        4 => MqttPacket::PubAck(PubAck { packet_id: r.u16()? }),
        8 => MqttPacket::Subscribe(Subscribe {
            packet_id: r.u16()?,
            filter: r.str()?,
            qos: QoS::from_bits(r.u8()? & 0x03)?,
        }),
        9 => MqttPacket::SubAck(SubAck {
            packet_id: r.u16()?,
            return_code: r.u8()?,
        }),
        12 => MqttPacket::PingReq,
        13 => MqttPacket::PingResp,
        14 => MqttPacket::Disconnect,
        other => return Err(ProtocolError::InvalidPacketType(other).into()),
    };
    Ok(packet)
}

// --- CONNECT ---
#[derive(Debug, PartialEq)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session: true,
            username: None,
            password: None,
        }
    }

    /// Attaches broker credentials. Empty strings are treated as absent.
    pub fn with_credentials(mut self, username: &'a str, password: &'a str) -> Self {
        self.username = (!username.is_empty()).then_some(username);
        self.password = (!password.is_empty() && self.username.is_some()).then_some(password);
        self
    }

    fn decode(r: &mut PacketReader<'a>) -> Result<Self, CodecError> {
        if r.str()? != "MQTT" || r.u8()? != PROTOCOL_LEVEL {
            return Err(ProtocolError::MalformedPacket.into());
        }
        let flags = r.u8()?;
        let keep_alive = r.u16()?;
        let client_id = r.str()?;
        let username = if flags & 0x80 != 0 { Some(r.str()?) } else { None };
        let password = if flags & 0x40 != 0 { Some(r.str()?) } else { None };
        Ok(Self {
            client_id,
            keep_alive,
            clean_session: flags & 0x02 != 0,
            username,
            password,
        })
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut flags = 0;
        let mut remaining = 10 + 2 + self.client_id.len();
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(username) = self.username {
            flags |= 0x80;
            remaining += 2 + username.len();
        }
        if let Some(password) = self.password {
            flags |= 0x40;
            remaining += 2 + password.len();
        }

        let mut w = PacketWriter::new(buf);
        w.put_header(0x10, remaining)?;
        w.put_str("MQTT")?;
        w.put_u8(PROTOCOL_LEVEL)?;
        w.put_u8(flags)?;
        w.put_u16(self.keep_alive)?;
        w.put_str(self.client_id)?;
        if let Some(username) = self.username {
            w.put_str(username)?;
        }
        if let Some(password) = self.password {
            w.put_str(password)?;
        }
        Ok(w.position())
    }
}

// --- CONNACK ---
#[derive(Debug, PartialEq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReasonCode,
}

impl EncodePacket for ConnAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let code = match self.code {
            ConnectReasonCode::Success => 0,
            ConnectReasonCode::UnacceptableProtocolVersion => 1,
            ConnectReasonCode::IdentifierRejected => 2,
            ConnectReasonCode::ServerUnavailable => 3,
            ConnectReasonCode::BadUserNameOrPassword => 4,
            ConnectReasonCode::NotAuthorized => 5,
            ConnectReasonCode::Other(code) => code,
        };
        let mut w = PacketWriter::new(buf);
        w.put_header(0x20, 2)?;
        w.put_u8(self.session_present as u8)?;
        w.put_u8(code)?;
        Ok(w.position())
    }
}

// --- PUBLISH ---
#[derive(Debug, PartialEq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
    /// Present only for QoS 1 and 2.
    pub packet_id: Option<u16>,
}

impl<'a> Publish<'a> {
    pub fn new(topic: &'a str, payload: &'a [u8], qos: QoS) -> Self {
        Self {
            topic,
            payload,
            qos,
            retain: false,
            packet_id: None,
        }
    }

    fn decode(first: u8, r: &mut PacketReader<'a>) -> Result<Self, CodecError> {
        let qos = QoS::from_bits((first >> 1) & 0x03)?;
        let topic = r.str()?;
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(r.u16()?)
        };
        Ok(Self {
            topic,
            payload: r.rest(),
            qos,
            retain: first & 0x01 != 0,
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let id_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        let remaining = 2 + self.topic.len() + id_len + self.payload.len();

        let mut w = PacketWriter::new(buf);
        w.put_header(0x30 | (self.qos as u8) << 1 | self.retain as u8, remaining)?;
        w.put_str(self.topic)?;
        if id_len > 0 {
            w.put_u16(self.packet_id.ok_or(ProtocolError::MalformedPacket)?)?;
        }
        w.put_bytes(self.payload)?;
        Ok(w.position())
    }
}

// --- PUBACK ---
#[derive(Debug, PartialEq)]
pub struct PubAck {
    pub packet_id: u16,
}

impl EncodePacket for PubAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut w = PacketWriter::new(buf);
        w.put_header(0x40, 2)?;
        w.put_u16(self.packet_id)?;
        Ok(w.position())
    }
}

// --- SUBSCRIBE ---
/// A single-filter subscription request.
#[derive(Debug, PartialEq)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub filter: &'a str,
    pub qos: QoS,
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut w = PacketWriter::new(buf);
        w.put_header(0x82, 2 + 2 + self.filter.len() + 1)?;
        w.put_u16(self.packet_id)?;
        w.put_str(self.filter)?;
        w.put_u8(self.qos as u8)?;
        Ok(w.position())
    }
}

// --- SUBACK ---
#[derive(Debug, PartialEq)]
pub struct SubAck {
    pub packet_id: u16,
    /// Granted QoS, or `0x80` on failure.
    pub return_code: u8,
}

impl EncodePacket for SubAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut w = PacketWriter::new(buf);
        w.put_header(0x90, 3)?;
        w.put_u16(self.packet_id)?;
        w.put_u8(self.return_code)?;
        Ok(w.position())
    }
}

// --- PINGREQ / PINGRESP / DISCONNECT ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut w = PacketWriter::new(buf);
        w.put_header(0xC0, 0)?;
        Ok(w.position())
    }
}

#[derive(Debug)]
pub struct PingResp;

impl EncodePacket for PingResp {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut w = PacketWriter::new(buf);
        w.put_header(0xD0, 0)?;
        Ok(w.position())
    }
}

#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut w = PacketWriter::new(buf);
        w.put_header(0xE0, 0)?;
        Ok(w.position())
    }
}
