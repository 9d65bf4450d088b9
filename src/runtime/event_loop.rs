//! The network-owning loop.
//!
//! One task owns the [`MqttClient`]. Each cycle it:
//!
//! 1. waits briefly for a [`PublishRequest`] and publishes it,
//! 2. checks the connection, reconnecting if it was lost,
//! 3. pumps one inbound frame and runs the command it carries.
//!
//! The order matters: a queued publication is attempted before reconnection,
//! so requests made while offline fail (and are logged) instead of piling up.

use log::{error, info, warn};

use super::encoder::{self, CONFIG_PAYLOAD_CAPACITY};
use super::publisher::{PublishRequest, RequestQueue};
use super::registry::CommandRegistry;
use super::router::{self, Uplink};
use super::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorTiming};
use super::traits::Board;
use crate::client::MqttClient;
use crate::config::SharedConfig;
use crate::error::EncodeError;
use crate::packet::QoS;
use crate::transport::MqttTransport;

/// Drives publications, connection supervision and inbound commands.
///
/// # Example
///
/// ```ignore
/// static QUEUE: RequestQueue = RequestQueue::new(QueueTiming { .. });
/// static CONFIG: StaticCell<SharedConfig> = StaticCell::new();
///
/// #[embassy_executor::task]
/// async fn mqtt_task(mut runtime: MqttRuntime<'static, TcpTransport<'static>, 512>) -> ! {
///     runtime.run().await
/// }
///
/// // Any other task:
/// QUEUE.publisher().request_sensors(TelemetryMask::CO2 | TelemetryMask::TEMPERATURE).await;
/// ```
pub struct MqttRuntime<'a, T: MqttTransport, const BUF_SIZE: usize> {
    client: MqttClient<T, BUF_SIZE>,
    supervisor: ConnectionSupervisor,
    queue: &'a RequestQueue,
    config: &'a SharedConfig,
    board: Board<'a>,
    registry: CommandRegistry<'a>,
    payload: [u8; CONFIG_PAYLOAD_CAPACITY],
}

impl<'a, T: MqttTransport, const BUF_SIZE: usize> MqttRuntime<'a, T, BUF_SIZE> {
    pub fn new(
        client: MqttClient<T, BUF_SIZE>,
        timing: SupervisorTiming,
        queue: &'a RequestQueue,
        config: &'a SharedConfig,
        board: Board<'a>,
    ) -> Self {
        Self {
            client,
            supervisor: ConnectionSupervisor::new(timing),
            queue,
            config,
            board,
            registry: CommandRegistry::new(board, config, queue.publisher()),
            payload: [0; CONFIG_PAYLOAD_CAPACITY],
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn client(&self) -> &MqttClient<T, BUF_SIZE> {
        &self.client
    }

    /// Runs the loop forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.run_once().await;
        }
    }

    /// One loop cycle.
    pub async fn run_once(&mut self) {
        if let Some(request) = self.queue.dequeue().await {
            self.publish(request).await;
        }

        self.supervisor
            .ensure_connected(&mut self.client, self.config, &self.board)
            .await;

        self.pump().await;
    }

    async fn publish(&mut self, request: PublishRequest) {
        let config = self.config.snapshot();
        let (channel, encoded) = match request {
            PublishRequest::Sensors { mask } => (
                Uplink::Sensors,
                encoder::encode_sensors(mask, self.board.readings, &mut self.payload),
            ),
            PublishRequest::Configuration => (
                Uplink::Config,
                encoder::encode_config(&config, &self.board, &mut self.payload),
            ),
        };

        let prepared = encoded.and_then(|len| {
            router::uplink_topic(&config.mqtt_topic, config.device_id, channel)
                .map(|topic| (topic, len))
        });
        let (topic, len) = match prepared {
            Ok(prepared) => prepared,
            Err(EncodeError::PayloadTooLarge) => {
                warn!("failed to serialise {:?} payload", channel);
                return;
            }
            Err(EncodeError::TopicTooLong) => {
                warn!("topic for {:?} does not fit", channel);
                return;
            }
        };

        let payload = &self.payload[..len];
        info!(
            "publishing {}:{}",
            topic.as_str(),
            core::str::from_utf8(payload).unwrap_or("<binary>")
        );
        if let Err(e) = self.client.publish(&topic, payload, QoS::AtMostOnce).await {
            error!("publish failed: {:?}", e);
        }
    }

    async fn pump(&mut self) {
        let (prefix, device_id) = self
            .config
            .lock(|c| (c.mqtt_topic.clone(), c.device_id));

        let message = match self.client.poll().await {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                warn!("MQTT poll failed: {:?}", e);
                return;
            }
        };

        let Ok(argument) = core::str::from_utf8(message.payload) else {
            warn!("dropping non UTF-8 payload on [{}]", message.topic);
            return;
        };
        info!("message arrived [{}] {}", message.topic, argument);

        if let Some(invocation) = router::route(message.topic, argument, &prefix, device_id) {
            self.registry
                .handle(invocation.command, invocation.argument)
                .await;
        }
    }
}
