//! Retry and failure tests
//!
//! The collector rejects a configurable number of requests; delivery must
//! resend the same batch within the attempt bound and never hang.

use std::time::Duration;
use test_case::test_case;
use testrelay_common::{CanonicalMessage, EventHandler, LifecycleEvent, TestStatus};
use testrelay_e2e::{CollectorConfig, MockCollector};

fn queue_messages(handler: &EventHandler, n: usize) {
    for i in 0..n {
        let msg = CanonicalMessage::new("e2e-project", format!("test {}", i), TestStatus::Passed)
            .with_id(format!("t{}", i));
        handler.queue_event(LifecycleEvent::TestPass, msg);
    }
}

#[test_case(0, true, 1 ; "accepted first time")]
#[test_case(1, true, 2 ; "one transient failure")]
#[test_case(2, true, 3 ; "recovers on last attempt")]
#[test_case(3, false, 3 ; "gives up after three attempts")]
#[test_case(10, false, 3 ; "persistent outage")]
#[tokio::test]
async fn test_attempt_bound(fail_first: usize, delivered: bool, requests: usize) {
    let collector = MockCollector::start_with(CollectorConfig {
        fail_first,
        ..Default::default()
    })
    .await
    .unwrap();
    let handler = collector.handler().unwrap();
    queue_messages(&handler, 2);

    assert_eq!(handler.process_event_queue().await, delivered);
    assert_eq!(collector.request_count(), requests);
    assert_eq!(collector.delivered().unwrap().len(), if delivered { 2 } else { 0 });

    collector.stop().await;
}

#[tokio::test]
async fn test_retry_resends_identical_batch() {
    let collector = MockCollector::start_with(CollectorConfig {
        fail_first: 1,
        failure_status: 500,
        ..Default::default()
    })
    .await
    .unwrap();
    let handler = collector.handler().unwrap();
    queue_messages(&handler, 3);

    assert!(handler.process_event_queue().await);

    let requests = collector.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].accepted);
    assert!(requests[1].accepted);
    assert_eq!(requests[0].messages, requests[1].messages);

    collector.stop().await;
}

#[tokio::test]
async fn test_lost_batch_does_not_block_later_batches() {
    let collector = MockCollector::start_with(CollectorConfig {
        fail_first: 3,
        ..Default::default()
    })
    .await
    .unwrap();
    let mut config = collector.reporter_config();
    config.delivery.batch_size = 2;
    let handler = collector.handler_with(&config).unwrap();
    queue_messages(&handler, 4);

    let summary = handler.drain().await;
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.delivered, 2);

    let ids: Vec<_> = collector
        .delivered()
        .unwrap()
        .into_iter()
        .filter_map(|e| e.data.rabbit_mq_id)
        .collect();
    assert_eq!(ids, vec!["t2", "t3"]);

    collector.stop().await;
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let collector = MockCollector::start_with(CollectorConfig {
        response_delay: Duration::from_millis(500),
        ..Default::default()
    })
    .await
    .unwrap();
    let mut config = collector.reporter_config();
    config.delivery.request_timeout_ms = 50;
    config.delivery.max_flush_attempts = 2;
    let handler = collector.handler_with(&config).unwrap();
    queue_messages(&handler, 1);

    let started = std::time::Instant::now();
    assert!(!handler.process_event_queue().await);
    assert!(started.elapsed() < Duration::from_millis(450));

    collector.stop().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_failure() {
    let collector = MockCollector::start().await.unwrap();
    let config = collector.reporter_config();
    collector.stop().await;

    let handler = EventHandler::new(&config).unwrap();
    queue_messages(&handler, 1);
    assert!(!handler.process_event_queue().await);
}
