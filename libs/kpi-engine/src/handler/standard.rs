use serde_json::Value;

use kpi_api::topics;

use super::fields::{as_array, as_object, ensure_finite, field, number};
use super::Publication;
use crate::error::{DispatchError, ValidationError};
use crate::record::{KpiRecord, Metric, StandardKpiResult};

/// Среднее, медиана и выборочное стандартное отклонение по пакету записей
/// `{ "_value": <number>, "_measurement": <string> }`.
///
/// Результат подписывается `_measurement` первой записи.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardKpiHandler {
    result_topic: String,
}

impl Default for StandardKpiHandler {
    fn default() -> Self {
        Self::with_result_topic(topics::STANDARD_KPI_RESULT)
    }
}

struct Batch<'a> {
    values: Vec<f64>,
    /// Было ли каждое значение записано целым числом.
    integral: Vec<bool>,
    name: &'a str,
}

impl Batch<'_> {
    fn all_integral(&self) -> bool {
        self.integral.iter().all(|&i| i)
    }

    /// Медиана нечётного пакета является одним из входов и сохраняет его форму;
    /// среди равных берётся первый по порядку, как при стабильной сортировке.
    fn median_integral(&self) -> bool {
        if self.values.len() % 2 == 0 {
            return false;
        }
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[a].total_cmp(&self.values[b]));
        self.integral[order[order.len() / 2]]
    }
}

impl StandardKpiHandler {
    pub fn with_result_topic(topic: impl Into<String>) -> Self {
        Self { result_topic: topic.into() }
    }

    pub fn result_topic(&self) -> &str {
        &self.result_topic
    }

    pub fn handle(&self, payload: &Value) -> Result<Publication, DispatchError> {
        let batch = parse_batch(payload)?;

        let mean = ensure_finite(kpi_stats::mean(&batch.values)?, "mean_result")?;
        let median = ensure_finite(kpi_stats::median(&batch.values)?, "median_result")?;
        let stddev = ensure_finite(kpi_stats::sample_stddev(&batch.values)?, "stddev_result")?;

        tracing::info!(name = %batch.name, samples = batch.values.len(), mean, median, stddev, "standard kpis calculated");

        let record = StandardKpiResult {
            mean_result: Metric::from_stat(mean, batch.all_integral()),
            median_result: Metric::from_stat(median, batch.median_integral()),
            stddev_result: stddev,
            name: batch.name.to_string(),
        };

        Ok(Publication {
            topic: self.result_topic.clone(),
            record: KpiRecord::Standard(record),
        })
    }
}

fn parse_batch(payload: &Value) -> Result<Batch<'_>, ValidationError> {
    let records = as_array(payload, "payload")?;
    if records.is_empty() {
        return Err(ValidationError::Empty { field: "payload".into() });
    }

    let mut values = Vec::with_capacity(records.len());
    let mut integral = Vec::with_capacity(records.len());
    let mut name = "";

    for (i, record) in records.iter().enumerate() {
        let path = format!("[{i}]");
        let record = as_object(record, &path)?;

        let (value, is_integer) = number(field(record, "_value", &path)?, &format!("{path}._value"))?;
        values.push(value);
        integral.push(is_integer);

        let measurement = field(record, "_measurement", &path)?
            .as_str()
            .ok_or_else(|| ValidationError::wrong_type(format!("{path}._measurement"), "a string"))?;
        if i == 0 {
            name = measurement;
        }
    }

    Ok(Batch { values, integral, name })
}
