//! Pipeline tests
//!
//! Drives normalizer, queue and delivery client against the mock collector
//! over real HTTP.

use testrelay_common::normalizer::{
    SuiteEnd, SuiteStart, TestFail, TestNotRun, TestPass, TestStart,
};
use testrelay_common::{EntityRef, LifecycleEvent, TestStatus};
use testrelay_e2e::collector::{TEST_API_KEY, TEST_PROJECT_ID, TEST_RUN_ID};
use testrelay_e2e::MockCollector;

fn suite() -> EntityRef {
    EntityRef::new("s1", "Suite A")
}

#[tokio::test]
async fn test_full_run_delivered_in_order() {
    let collector = MockCollector::start().await.unwrap();
    let mut handler = collector.handler().unwrap();

    let run = handler.normalizer_mut().normalize_run_start();
    handler.queue_event(LifecycleEvent::RunStart, run);

    let msg = handler.normalizer().normalize_suite_start(SuiteStart {
        suite_id: "s1".to_string(),
        title: "Suite A".to_string(),
        file_name: Some("a.spec.ts".to_string()),
        test_count: Some(3),
        ..Default::default()
    });
    handler.queue_event(LifecycleEvent::SuiteStart, msg);

    let msg = handler.normalizer().normalize_test_start(TestStart {
        test_id: "t1".to_string(),
        title: "does X".to_string(),
        test_suite: suite(),
        ..Default::default()
    });
    handler.queue_event(LifecycleEvent::TestStart, msg);

    let msg = handler.normalizer().normalize_test_pass(TestPass {
        test_id: "t1".to_string(),
        title: "does X".to_string(),
        duration: Some(50),
        test_suite: suite(),
        retries: None,
    });
    handler.queue_event(LifecycleEvent::TestPass, msg);

    let msg = handler.normalizer().normalize_test_fail(TestFail {
        test_id: "t2".to_string(),
        title: "does Y".to_string(),
        error: "\u{1b}[31mexpected 1 to equal 2\u{1b}[39m".to_string(),
        test_suite: suite(),
        ..Default::default()
    });
    handler.queue_event(LifecycleEvent::TestFail, msg);

    let msg = handler.normalizer().normalize_test_skip(TestNotRun {
        test_id: "t3".to_string(),
        title: "does Z".to_string(),
        test_suite: suite(),
        ..Default::default()
    });
    handler.queue_event(LifecycleEvent::TestSkip, msg);

    let msg = handler.normalizer().normalize_suite_end(SuiteEnd {
        suite_id: "s1".to_string(),
        title: "Suite A".to_string(),
        has_failed: true,
    });
    handler.queue_event(LifecycleEvent::SuiteEnd, msg);

    let run_end = handler.normalizer_mut().normalize_run_end(true);
    handler.queue_event(LifecycleEvent::RunEnd, run_end);

    assert!(handler.process_event_queue().await);
    assert!(handler.is_empty());

    let batches = collector.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0].authorization.as_deref(),
        Some(format!("Bearer {}", TEST_API_KEY).as_str())
    );
    assert!(batches[0]
        .user_agent
        .as_deref()
        .unwrap_or_default()
        .starts_with("testrelay/"));

    let entries = collector.delivered().unwrap();
    let events: Vec<String> = entries.iter().map(|e| e.event.to_string()).collect();
    assert_eq!(
        events,
        vec![
            "runStart", "suiteStart", "testStart", "testPass", "testFail", "testSkip",
            "suiteEnd", "runEnd",
        ]
    );

    for entry in &entries {
        assert_eq!(entry.data.project_id, TEST_PROJECT_ID);
    }
    let run_id = entries[0].data.rabbit_mq_id.clone();
    assert_eq!(entries[0].data.title, TEST_RUN_ID);
    assert_eq!(entries[1].data.test_run.as_ref().map(|r| r.id.clone()), run_id);
    assert_eq!(entries[4].data.error.as_deref(), Some("expected 1 to equal 2"));
    assert_eq!(entries[5].data.status, TestStatus::Skipped);
    assert_eq!(entries[6].data.status, TestStatus::Failed);
    assert_eq!(entries[7].data.rabbit_mq_id, run_id);
    assert_eq!(entries[7].data.status, TestStatus::Failed);

    collector.stop().await;
}

#[tokio::test]
async fn test_large_queue_split_into_batches() {
    let collector = MockCollector::start().await.unwrap();
    let mut config = collector.reporter_config();
    config.delivery.batch_size = 4;
    let handler = collector.handler_with(&config).unwrap();

    for i in 0..10 {
        let msg = handler.normalizer().normalize_test_pass(TestPass {
            test_id: format!("t{}", i),
            title: format!("test {}", i),
            test_suite: suite(),
            ..Default::default()
        });
        handler.queue_event(LifecycleEvent::TestPass, msg);
    }

    let summary = handler.drain().await;
    assert!(summary.is_success());
    assert_eq!(summary.batches, 3);
    assert_eq!(collector.request_count(), 3);

    let ids: Vec<String> = collector
        .delivered()
        .unwrap()
        .into_iter()
        .filter_map(|e| e.data.rabbit_mq_id)
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
    assert_eq!(ids, expected);

    collector.stop().await;
}

#[tokio::test]
async fn test_empty_queue_sends_nothing() {
    let collector = MockCollector::start().await.unwrap();
    let handler = collector.handler().unwrap();

    assert!(handler.process_event_queue().await);
    assert_eq!(collector.request_count(), 0);

    collector.stop().await;
}

#[tokio::test]
async fn test_run_end_without_run_start_has_no_id() {
    let collector = MockCollector::start().await.unwrap();
    let mut handler = collector.handler().unwrap();

    let run_end = handler.normalizer_mut().normalize_run_end(false);
    handler.queue_event(LifecycleEvent::RunEnd, run_end);
    assert!(handler.process_event_queue().await);

    let batch = &collector.batches()[0];
    let json = batch.messages_json().unwrap();
    assert!(json[0]["data"].get("rabbitMqId").is_none());
    assert_eq!(json[0]["data"]["status"], "passed");

    collector.stop().await;
}
