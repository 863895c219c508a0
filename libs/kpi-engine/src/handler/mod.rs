//! KPI handler'ы, по одному на вид входящего topic'а.
//!
//! Handler'ы чистые: валидируют payload, считают статистику и возвращают
//! [`Publication`]. Публикует её диспетчер.

mod fields;
mod power_mean;
mod standard;

use serde::Deserialize;
use serde_json::Value;

use crate::error::DispatchError;
use crate::record::KpiRecord;

pub use power_mean::PowerMeanHandler;
pub use standard::StandardKpiHandler;

/// Посчитанная запись и topic, в который она уходит.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub topic: String,
    pub record: KpiRecord,
}

impl Publication {
    /// Wire form of the record (compact JSON).
    pub fn encode(&self) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(&self.record).map_err(DispatchError::Encode)
    }
}

/// Виды handler'ов, привязываемые к topic'у из конфига.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKind {
    /// Mean, median and sample standard deviation of `_value`s.
    Standard,
    /// Mean power of a current/voltage batch.
    PowerMean,
}

/// A routable handler. Closed set of variants, dispatched by `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    StandardKpi(StandardKpiHandler),
    PowerMean(PowerMeanHandler),
}

impl Handler {
    /// Handler of `kind` publishing to `result_topic`, or to the kind's
    /// default result topic when `None`.
    pub fn from_kind(kind: KpiKind, result_topic: Option<String>) -> Self {
        match (kind, result_topic) {
            (KpiKind::Standard, Some(topic)) => {
                Handler::StandardKpi(StandardKpiHandler::with_result_topic(topic))
            }
            (KpiKind::Standard, None) => Handler::StandardKpi(StandardKpiHandler::default()),
            (KpiKind::PowerMean, Some(topic)) => {
                Handler::PowerMean(PowerMeanHandler::with_result_topic(topic))
            }
            (KpiKind::PowerMean, None) => Handler::PowerMean(PowerMeanHandler::default()),
        }
    }

    pub fn kind(&self) -> KpiKind {
        match self {
            Handler::StandardKpi(_) => KpiKind::Standard,
            Handler::PowerMean(_) => KpiKind::PowerMean,
        }
    }

    pub fn result_topic(&self) -> &str {
        match self {
            Handler::StandardKpi(h) => h.result_topic(),
            Handler::PowerMean(h) => h.result_topic(),
        }
    }

    pub fn handle(&self, payload: &Value) -> Result<Publication, DispatchError> {
        match self {
            Handler::StandardKpi(h) => h.handle(payload),
            Handler::PowerMean(h) => h.handle(payload),
        }
    }
}
