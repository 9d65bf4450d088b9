//! Sensor Node Runtime
//!
//! The components between producers, the broker connection and the device's
//! collaborators.
//!
//! # Overview
//!
//! - [`RequestQueue`]: bounded hand-off of publish requests from any task
//! - [`encoder`]: sensors and configuration documents
//! - [`router`]: topic names and downlink routing
//! - [`CommandRegistry`]: validated downlink commands
//! - [`ConnectionSupervisor`]: reconnect, re-subscribe, announce online
//! - [`MqttRuntime`]: the single loop tying them together
//!
//! # Publishing Pattern
//!
//! Producers never perform network I/O. They enqueue a [`PublishRequest`]
//! through a [`PublisherHandle`], and the runtime reads the current values and
//! publishes from its own task. Inbound commands run inside the runtime task,
//! between two loop cycles.

pub mod encoder;
pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod registry;
pub mod router;
pub(crate) mod supervisor;
pub(crate) mod traits;

pub use event_loop::MqttRuntime;
pub use publisher::{
    PublishRequest, PublishRequestChannel, PublisherHandle, QUEUE_DEPTH, QueueTiming, RequestQueue,
};
pub use registry::{CALIBRATION_RANGE, Command, CommandRegistry, MAX_TEMPERATURE_OFFSET};
pub use router::{CommandInvocation, Scope, Uplink};
pub use supervisor::{
    ClientId, ConnectionState, ConnectionSupervisor, ONLINE_PAYLOAD, SupervisorTiming,
    client_identifier,
};
pub use traits::{
    Board, OtaUpdater, Peripheral, Peripherals, SensorControl, SensorReadings, SystemControl,
    WifiManager,
};
