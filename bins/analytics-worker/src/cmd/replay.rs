//! Offline run of a captured message stream.
//!
//! Input lines are `{"topic": "...", "payload": <json>}`; a string payload
//! is sent verbatim, so captures can carry malformed payloads too. Every
//! publication is printed to stdout in the same line format.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use kpi_api::{Publisher, RawMessage, Subscriber};
use kpi_engine::{Dispatcher, spawn_dispatch_task};
use message_bus::MessageBus;

use crate::config::ReplayArgs;
use crate::error::WorkerError;

const REPLAY_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
struct ReplayLine {
    topic: String,
    payload: Value,
}

fn parse_line(line: &str) -> Result<RawMessage, serde_json::Error> {
    let ReplayLine { topic, payload } = serde_json::from_str(line)?;
    let payload = match payload {
        Value::String(raw) => raw.into_bytes(),
        other => serde_json::to_vec(&other)?,
    };
    Ok(RawMessage::new(topic, payload))
}

/// Writes every publication as one JSON line.
struct LinePrinter<W> {
    out: Mutex<W>,
}

impl<W: Write> LinePrinter<W> {
    fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl<W: Write + Send> Publisher for LinePrinter<W> {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let topic_json = match serde_json::to_string(topic) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(%topic, error = %e, "cannot print publication");
                return;
            }
        };
        // Payload is already compact JSON; embed it as-is to keep field order.
        let payload = String::from_utf8_lossy(&payload);
        let mut out = match self.out.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{{\"topic\":{topic_json},\"payload\":{payload}}}") {
            tracing::warn!(%topic, error = %e, "cannot print publication");
        }
    }
}

pub async fn run(args: ReplayArgs) -> Result<(), WorkerError> {
    let config = args.config.load()?;
    config.validate()?;
    let router = config.build_router();

    let bus = MessageBus::new(REPLAY_BUFFER);
    let (session, stream) = bus.connect();
    for topic in router.topics() {
        session.subscribe(topic).await?;
    }

    let dispatcher = Arc::new(Dispatcher::new(router, Arc::new(LinePrinter::new(std::io::stdout()))));
    let worker = spawn_dispatch_task(dispatcher.clone(), Box::new(stream), CancellationToken::new());

    let input_error = |source| WorkerError::Input { path: args.input.clone(), source };
    let file = tokio::fs::File::open(&args.input).await.map_err(input_error)?;
    let mut lines = BufReader::new(file).lines();

    let (mut line_no, mut sent) = (0usize, 0usize);
    while let Some(line) = lines.next_line().await.map_err(input_error)? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(message) => {
                bus.send(message).await;
                sent += 1;
            }
            Err(e) => tracing::warn!(line = line_no, error = %e, "skipping replay line"),
        }
    }

    // Stream ends once drained: no session, no subscriptions.
    drop(session);
    bus.close();
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "dispatch task failed");
    }

    let stats = dispatcher.stats();
    tracing::info!(
        lines = line_no,
        sent,
        published = stats.published(),
        failed = stats.failed(),
        "replay complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_payload_is_reencoded() {
        let message = parse_line(r#"{"topic":"Mean","payload":{"sample_number":1}}"#).unwrap();
        assert_eq!(message.topic, "Mean");
        assert_eq!(message.payload, br#"{"sample_number":1}"#);
    }

    #[test]
    fn string_payload_is_sent_verbatim() {
        let message = parse_line(r#"{"topic":"Mean","payload":"{not json"}"#).unwrap();
        assert_eq!(message.payload, b"{not json");
    }

    #[test]
    fn bad_lines_are_errors() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn printer_keeps_payload_verbatim() {
        let printer = LinePrinter::new(Vec::new());
        printer.publish("StandardKpiResult", br#"{"mean_result":20,"name":"m"}"#.to_vec());
        printer.publish("MeanResult", br#"{"power_mean_result":6.0}"#.to_vec());

        let out = String::from_utf8(printer.out.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "{\"topic\":\"StandardKpiResult\",\"payload\":{\"mean_result\":20,\"name\":\"m\"}}\n\
             {\"topic\":\"MeanResult\",\"payload\":{\"power_mean_result\":6.0}}\n"
        );
    }

    #[tokio::test]
    async fn dispatch_through_bus_prints_results() {
        let bus = MessageBus::new(16);
        let (session, stream) = bus.connect();
        session.subscribe("StandardKpis").await.unwrap();

        let printer = Arc::new(LinePrinter::new(Vec::new()));
        let dispatcher = Arc::new(Dispatcher::new(kpi_engine::Router::with_defaults(), printer.clone()));
        let worker = spawn_dispatch_task(dispatcher, Box::new(stream), CancellationToken::new());

        let capture = [
            r#"{"topic":"StandardKpis","payload":"[oops"}"#,
            r#"{"topic":"StandardKpis","payload":[{"_value":10,"_measurement":"m"},{"_value":20,"_measurement":"m"},{"_value":30,"_measurement":"m"}]}"#,
        ];
        for line in capture {
            bus.send(parse_line(line).unwrap()).await;
        }
        drop(session);
        bus.close();
        worker.await.unwrap();

        let out = printer.out.lock().unwrap();
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "{\"topic\":\"StandardKpiResult\",\"payload\":{\"mean_result\":20,\"median_result\":20,\"stddev_result\":10.0,\"name\":\"m\"}}\n"
        );
    }
}
