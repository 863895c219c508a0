use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kpi_api::{BrokerEvent, EventStream};

use crate::dispatcher::Dispatcher;

/// Запустить цикл dispatch: события брокера → [`Dispatcher::dispatch`].
///
/// События жизненного цикла только логируются. Задача завершается при
/// закрытии потока или отмене `token`.
pub fn spawn_dispatch_task(
    dispatcher: Arc<Dispatcher>,
    mut events: Box<dyn EventStream>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => on_event(&dispatcher, event),
                        None => break,
                    }
                }
                _ = token.cancelled() => break,
            }
        }
        let stats = dispatcher.stats();
        tracing::info!(published = stats.published(), failed = stats.failed(), "dispatcher stopped");
    })
}

fn on_event(dispatcher: &Dispatcher, event: BrokerEvent) {
    match event {
        BrokerEvent::Message(message) => {
            dispatcher.dispatch(&message);
        }
        BrokerEvent::Connected { code: 0 } => {
            tracing::info!(code = 0, "connected successfully to broker");
        }
        BrokerEvent::Connected { code } => {
            tracing::warn!(code, "broker refused connection");
        }
        BrokerEvent::Disconnected { code: 0 } => {
            tracing::info!("disconnected from broker");
        }
        BrokerEvent::Disconnected { code } => {
            tracing::warn!(code, "connection ended unexpectedly from broker");
        }
        BrokerEvent::Subscribed { topic } => {
            tracing::info!(%topic, "successfully subscribed");
        }
    }
}
