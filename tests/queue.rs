use std::time::Instant;

use co2mon_mqtt::TelemetryMask;
use co2mon_mqtt::runtime::{PublishRequest, QueueTiming, RequestQueue};
use embassy_futures::block_on;
use embassy_time::Duration;

fn queue(enqueue_ms: u64) -> RequestQueue {
    RequestQueue::new(QueueTiming {
        enqueue_timeout: Duration::from_millis(enqueue_ms),
        dequeue_timeout: Duration::from_millis(5),
    })
}

#[test]
fn requests_come_out_in_order() {
    let queue = queue(20);
    let publisher = queue.publisher();

    block_on(async {
        publisher.request_sensors(TelemetryMask::CO2).await;
        publisher.request_config().await;

        assert_eq!(
            queue.dequeue().await,
            Some(PublishRequest::Sensors {
                mask: TelemetryMask::CO2
            })
        );
        assert_eq!(queue.dequeue().await, Some(PublishRequest::Configuration));
        assert_eq!(queue.dequeue().await, None);
    });
}

#[test]
fn third_request_is_dropped_after_timeout() {
    let queue = queue(50);
    let publisher = queue.publisher();

    block_on(async {
        publisher.request_config().await;
        publisher.request_sensors(TelemetryMask::ALL).await;
        assert_eq!(queue.len(), 2);

        let started = Instant::now();
        publisher.request_sensors(TelemetryMask::PM10).await;
        let waited = started.elapsed();

        assert!(waited >= std::time::Duration::from_millis(45), "waited {waited:?}");
        assert!(waited < std::time::Duration::from_secs(2), "waited {waited:?}");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue().await, Some(PublishRequest::Configuration));
        assert_eq!(
            queue.dequeue().await,
            Some(PublishRequest::Sensors {
                mask: TelemetryMask::ALL
            })
        );
        assert!(queue.is_empty());
    });
}

#[test]
fn try_variants_drop_without_waiting() {
    let queue = queue(1_000);
    let publisher = queue.publisher();

    publisher.try_request_config();
    publisher.try_request_config();

    let started = Instant::now();
    publisher.try_request_sensors(TelemetryMask::CO2);
    assert!(started.elapsed() < std::time::Duration::from_millis(500));
    assert_eq!(queue.len(), 2);

    block_on(async {
        assert_eq!(queue.dequeue().await, Some(PublishRequest::Configuration));
        assert_eq!(queue.dequeue().await, Some(PublishRequest::Configuration));
    });
}

#[test]
fn empty_queue_times_out() {
    let queue = queue(20);
    block_on(async {
        assert_eq!(queue.dequeue().await, None);
    });
}

#[test]
fn producers_on_other_threads_reach_the_consumer() {
    static QUEUE: RequestQueue = RequestQueue::new(QueueTiming {
        enqueue_timeout: Duration::from_millis(500),
        dequeue_timeout: Duration::from_millis(500),
    });

    let producers: Vec<_> = (0..2)
        .map(|_| {
            std::thread::spawn(|| {
                block_on(QUEUE.publisher().request_sensors(TelemetryMask::CO2));
            })
        })
        .collect();

    let received = block_on(async {
        let mut received = 0;
        while received < 2 {
            match QUEUE.dequeue().await {
                Some(request) => {
                    assert_eq!(
                        request,
                        PublishRequest::Sensors {
                            mask: TelemetryMask::CO2
                        }
                    );
                    received += 1;
                }
                None => break,
            }
        }
        received
    });

    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(received, 2);
}
