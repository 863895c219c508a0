use std::collections::HashMap;

use kpi_api::topics;

use crate::error::DispatchError;
use crate::handler::{Handler, PowerMeanHandler, StandardKpiHandler};

/// Таблица topic → handler.
///
/// Заполняется при старте и дальше только читается. Для параллельного
/// dispatch разделяется через `Arc` (или внутри [`Dispatcher`](crate::Dispatcher)).
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// `StandardKpis` → standard KPIs, `Mean` → power mean.
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        router.register(
            topics::STANDARD_KPIS,
            Handler::StandardKpi(StandardKpiHandler::default()),
        );
        router.register(topics::MEAN, Handler::PowerMean(PowerMeanHandler::default()));
        router
    }

    /// Установить `handler` для `topic`, заменив предыдущий.
    pub fn register(&mut self, topic: impl Into<String>, handler: Handler) {
        let topic = topic.into();
        if let Some(previous) = self.routes.insert(topic.clone(), handler) {
            tracing::debug!(%topic, previous = ?previous.kind(), "route replaced");
        }
    }

    pub fn resolve(&self, topic: &str) -> Result<&Handler, DispatchError> {
        self.routes
            .get(topic)
            .ok_or_else(|| DispatchError::UnregisteredTopic(topic.to_string()))
    }

    /// Маршрутизируемые topic'и, отсортированы.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    /// Уникальные result topic'и всех handler'ов, отсортированы.
    pub fn result_topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.routes.values().map(Handler::result_topic).collect();
        topics.sort_unstable();
        topics.dedup();
        topics
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
