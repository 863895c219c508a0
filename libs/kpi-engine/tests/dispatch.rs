//! Full decode → route → handle → publish path against a recording publisher.

use std::sync::{Arc, Mutex};

use kpi_api::{Publisher, RawMessage, topics};
use kpi_engine::{
    DispatchOutcome, Dispatcher, ErrorKind, Handler, KpiKind, Router, Stage,
};

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Publisher for Recorder {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let payload = String::from_utf8(payload).unwrap();
        self.sent.lock().unwrap().push((topic.to_string(), payload));
    }
}

fn worker(router: Router) -> (Dispatcher, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    (Dispatcher::new(router, recorder.clone()), recorder)
}

fn failure(outcome: DispatchOutcome) -> (Stage, ErrorKind) {
    match outcome {
        DispatchOutcome::Failed { stage, error } => (stage, error.kind()),
        other => panic!("expected failure, got {other:?}"),
    }
}

const STANDARD: &str = r#"[{"_value":10,"_measurement":"m"},{"_value":20,"_measurement":"m"},{"_value":30,"_measurement":"m"}]"#;
const MEAN: &str = r#"{"current_drive3_batch":[{"_value":2}],"voltage_drive3_batch":[{"_value":3}],"sample_number":1}"#;

#[test]
fn standard_kpis_end_to_end() {
    let (dispatcher, recorder) = worker(Router::with_defaults());

    assert!(dispatcher.dispatch(&RawMessage::new(topics::STANDARD_KPIS, STANDARD)).is_published());

    assert_eq!(
        recorder.take(),
        [(
            topics::STANDARD_KPI_RESULT.to_string(),
            r#"{"mean_result":20,"median_result":20,"stddev_result":10.0,"name":"m"}"#.to_string(),
        )]
    );
}

#[test]
fn power_mean_end_to_end() {
    let (dispatcher, recorder) = worker(Router::with_defaults());

    assert!(dispatcher.dispatch(&RawMessage::new(topics::MEAN, MEAN)).is_published());

    assert_eq!(
        recorder.take(),
        [(
            topics::MEAN_RESULT.to_string(),
            r#"{"power_mean_result":6.0,"name":"powerdrive3_mean"}"#.to_string(),
        )]
    );
}

#[test]
fn float_inputs_publish_float_metrics() {
    let (dispatcher, recorder) = worker(Router::with_defaults());
    let payload = r#"[{"_value":1.5,"_measurement":"t"},{"_value":2.5,"_measurement":"t"}]"#;

    assert!(dispatcher.dispatch(&RawMessage::new("StandardKpis", payload)).is_published());

    let sent = recorder.take();
    let value: serde_json::Value = serde_json::from_str(&sent[0].1).unwrap();
    assert_eq!(value["mean_result"], serde_json::json!(2.0));
    assert_eq!(value["median_result"], serde_json::json!(2.0));
    assert!(value["stddev_result"].is_f64());
    assert_eq!(value["name"], "t");
}

#[test]
fn unregistered_topic_publishes_nothing() {
    let (dispatcher, recorder) = worker(Router::with_defaults());

    let (stage, kind) = failure(dispatcher.dispatch(&RawMessage::new("Unknown", STANDARD)));

    assert_eq!((stage, kind), (Stage::Route, ErrorKind::UnregisteredTopic));
    assert!(recorder.take().is_empty());
}

#[test]
fn malformed_message_does_not_block_the_next_one() {
    let (dispatcher, recorder) = worker(Router::with_defaults());

    let (stage, kind) = failure(dispatcher.dispatch(&RawMessage::new("Mean", "{not json")));
    assert_eq!((stage, kind), (Stage::Decode, ErrorKind::Decode));
    assert!(recorder.take().is_empty());

    assert!(dispatcher.dispatch(&RawMessage::new("Mean", MEAN)).is_published());
    assert_eq!(recorder.take().len(), 1);
    assert_eq!(dispatcher.stats().published(), 1);
    assert_eq!(dispatcher.stats().failed(), 1);
}

#[test]
fn statistics_failures_are_contained() {
    let (dispatcher, recorder) = worker(Router::with_defaults());
    let cases = [
        (
            "StandardKpis",
            r#"[{"_value":10,"_measurement":"m"}]"#,
            ErrorKind::InsufficientData,
        ),
        (
            "Mean",
            r#"{"current_drive3_batch":[{"_value":2}],"voltage_drive3_batch":[{"_value":3}],"sample_number":0}"#,
            ErrorKind::DivisionByZero,
        ),
        (
            "Mean",
            r#"{"current_drive3_batch":[{"_value":2},{"_value":4}],"voltage_drive3_batch":[{"_value":3}],"sample_number":2}"#,
            ErrorKind::LengthMismatch,
        ),
        (
            "StandardKpis",
            r#"[{"_value":"ten","_measurement":"m"},{"_value":20,"_measurement":"m"}]"#,
            ErrorKind::Validation,
        ),
    ];

    for (topic, payload, expected) in cases {
        let (stage, kind) = failure(dispatcher.dispatch(&RawMessage::new(topic, payload)));
        assert_eq!(stage, Stage::Handle, "{payload}");
        assert_eq!(kind, expected, "{payload}");
    }
    assert!(recorder.take().is_empty());
}

#[test]
fn rerouted_topics_publish_to_configured_result_topic() {
    let mut router = Router::new();
    router.register("line1/kpis", Handler::from_kind(KpiKind::Standard, Some("line1/result".into())));
    let (dispatcher, recorder) = worker(router);

    assert!(dispatcher.dispatch(&RawMessage::new("line1/kpis", STANDARD)).is_published());
    // Defaults are not installed on an explicit router.
    assert!(!dispatcher.dispatch(&RawMessage::new("StandardKpis", STANDARD)).is_published());

    let sent = recorder.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "line1/result");
}

#[test]
fn concurrent_dispatch_shares_one_dispatcher() {
    let (dispatcher, recorder) = worker(Router::with_defaults());
    let dispatcher = Arc::new(dispatcher);

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    dispatcher.dispatch(&RawMessage::new("Mean", MEAN));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(recorder.take().len(), 100);
    assert_eq!(dispatcher.stats().published(), 100);
}
