//! # Error Types
//!
//! Errors raised by the MQTT wire layer, the command registry and the publish
//! encoder. None of them are fatal: the runtime logs and drops every failure.

use core::convert::Infallible;

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// The broker sent something that is not valid MQTT 3.1.1.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// The broker did not answer in time.
    Timeout,
}

/// Error produced by the packet codec, which never touches a transport.
pub type CodecError = MqttError<Infallible>;

impl<T> From<ProtocolError> for MqttError<T> {
    fn from(err: ProtocolError) -> Self {
        MqttError::Protocol(err)
    }
}

impl<T> MqttError<T> {
    /// Widens a codec error into an error for a concrete transport.
    pub fn from_codec(err: CodecError) -> Self {
        match err {
            MqttError::Transport(never) => match never {},
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
        }
    }
}

/// Represents the return codes of a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    Success,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The broker answered with a packet we did not expect.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// A frame or payload does not fit the client buffers.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// The broker stopped answering keep-alive pings.
    KeepAliveTimeout,
}

/// Why an inbound command was not executed.
///
/// Never reported back to the sender; the runtime only logs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// No handler is registered under this name.
    UnknownCommand,
    /// The argument could not be parsed into the handler's type.
    InvalidArgument,
    /// The argument parsed but is outside the accepted bounds.
    OutOfRange,
    /// The payload document could not be deserialized.
    MalformedPayload,
    /// The configuration was merged but could not be persisted.
    Persist(StoreError),
}

/// Failure reported by the persistent configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Nothing has been stored yet.
    NotFound,
    /// The stored record could not be decoded.
    Corrupted,
    /// The backing medium rejected the write.
    Write,
}

/// Why a publication was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The serialized document exceeds the payload capacity.
    PayloadTooLarge,
    /// The topic name exceeds the topic buffer.
    TopicTooLong,
}
