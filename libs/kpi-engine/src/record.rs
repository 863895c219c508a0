use serde::Serialize;

/// Публикуемая статистика.
///
/// Целые статистики по целым входам публикуются как JSON integer (`20`),
/// остальное как JSON float (`20.5`, `10.0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metric {
    Integer(i64),
    Float(f64),
}

impl Metric {
    /// Largest magnitude an `f64` holds without losing integer precision.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    /// `Integer` when `integral` is requested and `value` is a whole number
    /// that fits exactly, `Float` otherwise.
    pub fn from_stat(value: f64, integral: bool) -> Self {
        if integral && value.fract() == 0.0 && value.abs() <= Self::MAX_EXACT {
            Metric::Integer(value as i64)
        } else {
            Metric::Float(value)
        }
    }
}

/// Результат стандартного KPI handler'а, публикуется в `StandardKpiResult`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardKpiResult {
    pub mean_result: Metric,
    pub median_result: Metric,
    pub stddev_result: f64,
    pub name: String,
}

/// Результат handler'а средней мощности, публикуется в `MeanResult`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanResult {
    pub power_mean_result: f64,
    pub name: String,
}

/// Any record a handler can produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KpiRecord {
    Standard(StandardKpiResult),
    Mean(MeanResult),
}
