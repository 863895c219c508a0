use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kpi_api::{Publisher, RawMessage};

use crate::decoder;
use crate::error::{DispatchError, Stage};
use crate::router::Router;

/// Итоговое состояние одного сообщения.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Результат передан publisher'у в `topic`.
    Published { topic: String },
    /// Сообщение отброшено на `stage`, ошибка залогирована.
    Failed { stage: Stage, error: DispatchError },
}

impl DispatchOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, DispatchOutcome::Published { .. })
    }
}

/// Счётчики диспетчера.
#[derive(Debug, Default)]
pub struct DispatchStats {
    published: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Проводит сообщение через decode → route → handle → publish.
///
/// Состояния между сообщениями нет: `dispatch` берёт `&self` и может
/// вызываться из нескольких задач одновременно.
pub struct Dispatcher {
    router: Router,
    publisher: Arc<dyn Publisher>,
    stats: DispatchStats,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(router: Router, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            router,
            publisher,
            stats: DispatchStats::default(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Process `message` exactly once. Never panics, never retries.
    pub fn dispatch(&self, message: &RawMessage) -> DispatchOutcome {
        tracing::info!(topic = %message.topic, bytes = message.payload.len(), "new message received");

        match self.try_dispatch(message) {
            Ok(topic) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Published { topic }
            }
            Err(error) => {
                let stage = error.stage();
                match &error {
                    DispatchError::UnregisteredTopic(_) => {
                        tracing::warn!(topic = %message.topic, %stage, kind = %error.kind(), error = %error, "message ignored");
                    }
                    DispatchError::Decode(decode) => {
                        tracing::error!(
                            topic = %message.topic,
                            %stage,
                            kind = %error.kind(),
                            line = decode.line(),
                            column = decode.column(),
                            error = %error,
                            "message dropped"
                        );
                        tracing::debug!(topic = %message.topic, payload = %message.payload_lossy(), "undecodable payload");
                    }
                    _ => {
                        tracing::error!(topic = %message.topic, %stage, kind = %error.kind(), error = %error, "message dropped");
                    }
                }
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Failed { stage, error }
            }
        }
    }

    fn try_dispatch(&self, message: &RawMessage) -> Result<String, DispatchError> {
        let payload = decoder::decode(&message.payload)?;
        tracing::debug!(topic = %message.topic, %payload, "payload decoded");

        let handler = self.router.resolve(&message.topic)?;
        let publication = handler.handle(&payload)?;
        let bytes = publication.encode()?;

        self.publisher.publish(&publication.topic, bytes);
        tracing::debug!(topic = %publication.topic, "result published");
        Ok(publication.topic)
    }
}
