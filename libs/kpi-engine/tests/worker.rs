//! The dispatch task wired between two in-process buses.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kpi_api::{BrokerEvent, EventStream, RawMessage, Subscriber, topics};
use kpi_engine::{Dispatcher, Router, spawn_dispatch_task};
use message_bus::MessageBus;

const WAIT: Duration = Duration::from_secs(5);

async fn drain(mut stream: impl EventStream) -> Vec<RawMessage> {
    let mut messages = Vec::new();
    while let Some(event) = stream.recv().await {
        if let BrokerEvent::Message(message) = event {
            messages.push(message);
        }
    }
    messages
}

#[tokio::test]
async fn worker_publishes_results_and_survives_bad_input() {
    let inbound = MessageBus::new(64);
    let outbound = MessageBus::new(64);

    let (input, input_stream) = inbound.connect();
    let router = Router::with_defaults();
    for topic in router.topics() {
        input.subscribe(topic).await.unwrap();
    }

    let (output, output_stream) = outbound.connect();
    for topic in router.result_topics() {
        output.subscribe(topic).await.unwrap();
    }

    let dispatcher = Arc::new(Dispatcher::new(router, outbound.clone()));
    let token = CancellationToken::new();
    let task = spawn_dispatch_task(dispatcher.clone(), Box::new(input_stream), token);

    let messages = [
        RawMessage::new(topics::STANDARD_KPIS, "[{\"_value\":1"),
        RawMessage::new(
            topics::STANDARD_KPIS,
            r#"[{"_value":10,"_measurement":"m"},{"_value":20,"_measurement":"m"},{"_value":30,"_measurement":"m"}]"#,
        ),
        RawMessage::new(
            topics::MEAN,
            r#"{"current_drive3_batch":[{"_value":2},{"_value":4}],"voltage_drive3_batch":[{"_value":3},{"_value":5}],"sample_number":2}"#,
        ),
    ];
    for message in messages {
        inbound.send(message).await;
    }

    drop(input);
    inbound.close();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    drop(output);
    outbound.close();
    let published = tokio::time::timeout(WAIT, drain(output_stream)).await.unwrap();

    assert_eq!(
        published,
        [
            RawMessage::new(
                topics::STANDARD_KPI_RESULT,
                r#"{"mean_result":20,"median_result":20,"stddev_result":10.0,"name":"m"}"#,
            ),
            RawMessage::new(
                topics::MEAN_RESULT,
                r#"{"power_mean_result":13.0,"name":"powerdrive3_mean"}"#,
            ),
        ]
    );
    assert_eq!(dispatcher.stats().published(), 2);
    assert_eq!(dispatcher.stats().failed(), 1);
}

#[tokio::test]
async fn cancellation_stops_the_worker() {
    let bus = MessageBus::new(8);
    let (_session, stream) = bus.connect();
    let dispatcher = Arc::new(Dispatcher::new(Router::with_defaults(), bus.clone()));
    let token = CancellationToken::new();

    let task = spawn_dispatch_task(dispatcher, Box::new(stream), token.clone());
    token.cancel();

    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}
