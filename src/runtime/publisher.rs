//! The request queue between producers and the runtime.
//!
//! Sampling tasks, button handlers and timers never touch the MQTT
//! connection. They hand a [`PublishRequest`] to the runtime through a
//! [`PublisherHandle`], and the runtime encodes and sends it from its own
//! context. The queue is bounded and lossy: a producer that cannot enqueue
//! within the timeout loses its request and is not told about it.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Duration, with_timeout};
use log::debug;

use crate::telemetry::TelemetryMask;

/// Queue capacity.
pub const QUEUE_DEPTH: usize = 2;

/// What the runtime should publish next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishRequest {
    /// Current readings for the quantities in `mask`.
    Sensors { mask: TelemetryMask },
    /// Current device configuration.
    Configuration,
}

/// Timeouts applied on both ends of the queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueTiming {
    /// Longest a producer waits for space.
    pub enqueue_timeout: Duration,
    /// Longest the runtime waits for a request before servicing the connection.
    pub dequeue_timeout: Duration,
}

impl Default for QueueTiming {
    fn default() -> Self {
        Self {
            enqueue_timeout: Duration::from_millis(100),
            dequeue_timeout: Duration::from_millis(100),
        }
    }
}

pub type PublishRequestChannel = Channel<CriticalSectionRawMutex, PublishRequest, QUEUE_DEPTH>;

/// A bounded FIFO of publish requests, safe for many producers and one consumer.
///
/// Usually placed in a `static` so handles can be given to any task.
pub struct RequestQueue {
    channel: PublishRequestChannel,
    timing: QueueTiming,
}

impl RequestQueue {
    pub const fn new(timing: QueueTiming) -> Self {
        Self {
            channel: Channel::new(),
            timing,
        }
    }

    /// Creates a handle for a producer. Handles are `Copy`.
    pub fn publisher(&self) -> PublisherHandle<'_> {
        PublisherHandle {
            tx: self.channel.sender(),
            timeout: self.timing.enqueue_timeout,
        }
    }

    /// Waits up to the dequeue timeout for the oldest request.
    pub async fn dequeue(&self) -> Option<PublishRequest> {
        with_timeout(self.timing.dequeue_timeout, self.channel.receive())
            .await
            .ok()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

/// A handle that lets any context request a publication without access to
/// the MQTT client.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a> {
    tx: Sender<'a, CriticalSectionRawMutex, PublishRequest, QUEUE_DEPTH>,
    timeout: Duration,
}

impl PublisherHandle<'_> {
    /// Requests a sensors publication for the quantities in `mask`.
    ///
    /// Waits at most the enqueue timeout; the request is dropped if the queue
    /// stays full.
    pub async fn request_sensors(&self, mask: TelemetryMask) {
        self.enqueue(PublishRequest::Sensors { mask }).await
    }

    /// Requests a configuration publication.
    pub async fn request_config(&self) {
        self.enqueue(PublishRequest::Configuration).await
    }

    /// Non-waiting variant of [`Self::request_sensors`] for interrupt-like contexts.
    pub fn try_request_sensors(&self, mask: TelemetryMask) {
        self.try_enqueue(PublishRequest::Sensors { mask })
    }

    /// Non-waiting variant of [`Self::request_config`].
    pub fn try_request_config(&self) {
        self.try_enqueue(PublishRequest::Configuration)
    }

    async fn enqueue(&self, request: PublishRequest) {
        if with_timeout(self.timeout, self.tx.send(request)).await.is_err() {
            debug!("publish queue full, dropping {:?}", request);
        }
    }

    fn try_enqueue(&self, request: PublishRequest) {
        if self.tx.try_send(request).is_err() {
            debug!("publish queue full, dropping {:?}", request);
        }
    }
}
