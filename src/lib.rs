//! # MQTT Telemetry and Command Dispatcher for CO2 Monitor Nodes
//!
//! `co2mon-mqtt` is the messaging subsystem of an environmental sensor node. It
//! publishes telemetry and configuration over MQTT and executes remote
//! commands (calibration, configuration changes, maintenance, reboot/OTA),
//! built on the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Buffers and topics are fixed-capacity `heapless` types.
//! - **Single network owner:** One task owns the connection. Any number of
//!   producers request publications through a bounded, lossy queue and never
//!   block on the network.
//! - **Self-healing link:** Lost connections are re-established with a fixed
//!   backoff, downlink subscriptions restored and an online status announced.
//! - **Transport Agnostic:** The `MqttTransport` trait hides the byte stream;
//!   `TcpTransport` runs it over `embassy-net`.
//!
//! ## Architecture
//!
//! ```text
//!  sampling task ─┐                         ┌─> encoder ─> client.publish
//!  button handler ├─> RequestQueue (2) ─> MqttRuntime
//!  periodic timer ─┘                         ├─> ConnectionSupervisor (reconnect)
//!                                            └─> client.poll ─> router ─> CommandRegistry
//! ```
//!
//! ## Topics
//!
//! | direction | topic                               |
//! |-----------|-------------------------------------|
//! | up        | `<prefix>/<deviceId>/up/sensors`    |
//! | up        | `<prefix>/<deviceId>/up/config`     |
//! | up        | `<prefix>/<deviceId>/up/status`     |
//! | down      | `<prefix>/<deviceId>/down/<command>`|
//! | down      | `<prefix>/down/<command>`           |

#![cfg_attr(not(test), no_std)]
pub mod client;
pub mod config;
pub mod error;
pub mod packet;
pub mod runtime;
pub mod telemetry;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use client::{ConnectParams, MqttClient, MqttOptions};
pub use config::{ConfigPatch, ConfigStore, DeviceConfig, SharedConfig};
pub use packet::QoS;
pub use runtime::MqttRuntime;
pub use telemetry::TelemetryMask;
pub use transport::{MqttTransport, TcpTransport, TransportError};
