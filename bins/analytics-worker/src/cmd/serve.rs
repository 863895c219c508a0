use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kpi_api::Subscriber;
use kpi_engine::{Dispatcher, spawn_dispatch_task};
use mqtt_link::MqttLink;

use crate::config::ServeArgs;
use crate::error::WorkerError;

pub async fn run(args: ServeArgs) -> Result<(), WorkerError> {
    tracing::info!("analytics-worker starting");

    // --- Load config ---
    let mut config = args.config.load()?;
    args.apply(&mut config.broker);
    config.validate()?;

    let router = config.build_router();
    let topics: Vec<String> = router.topics().into_iter().map(String::from).collect();

    // --- Broker link + dispatch task ---
    let token = CancellationToken::new();
    let (link, events) = MqttLink::start(config.broker.to_mqtt_config());
    let link = Arc::new(link);
    tracing::info!(broker = %config.broker.addr(), client_id = %config.broker.client_id, "connecting to broker");

    let dispatcher = Arc::new(Dispatcher::new(router, link.clone()));
    let worker = spawn_dispatch_task(dispatcher.clone(), Box::new(events), token.clone());

    // Re-sent by the link on every reconnect.
    for topic in &topics {
        link.subscribe(topic).await?;
        tracing::info!(%topic, "subscribing");
    }
    tracing::info!("worker ready");

    // --- Wait for Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    link.shutdown().await;
    token.cancel();
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "dispatch task failed");
    }

    let stats = dispatcher.stats();
    tracing::info!(published = stats.published(), failed = stats.failed(), "shutdown complete");
    Ok(())
}
