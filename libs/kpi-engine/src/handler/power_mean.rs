use serde_json::Value;

use kpi_api::topics;

use super::fields::{as_object, batch_values, ensure_finite, field};
use super::Publication;
use crate::error::{DispatchError, ValidationError};
use crate::record::{KpiRecord, MeanResult};

const CURRENT_BATCH: &str = "current_drive3_batch";
const VOLTAGE_BATCH: &str = "voltage_drive3_batch";
const SAMPLE_NUMBER: &str = "sample_number";

/// Метка каждой опубликованной средней мощности.
pub const POWER_MEAN_NAME: &str = "powerdrive3_mean";

/// Средняя мощность привода 3 по пакету токов и напряжений:
/// `round(Σ current·voltage / sample_number, 2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerMeanHandler {
    result_topic: String,
}

impl Default for PowerMeanHandler {
    fn default() -> Self {
        Self::with_result_topic(topics::MEAN_RESULT)
    }
}

impl PowerMeanHandler {
    pub fn with_result_topic(topic: impl Into<String>) -> Self {
        Self { result_topic: topic.into() }
    }

    pub fn result_topic(&self) -> &str {
        &self.result_topic
    }

    pub fn handle(&self, payload: &Value) -> Result<Publication, DispatchError> {
        let object = as_object(payload, "payload")?;
        let currents = batch_values(field(object, CURRENT_BATCH, "")?, CURRENT_BATCH)?;
        let voltages = batch_values(field(object, VOLTAGE_BATCH, "")?, VOLTAGE_BATCH)?;
        let sample_number = field(object, SAMPLE_NUMBER, "")?
            .as_u64()
            .ok_or_else(|| ValidationError::wrong_type(SAMPLE_NUMBER, "a non-negative integer"))?;

        tracing::debug!(samples = currents.len(), sample_number, "calculating power mean");
        let power_mean = kpi_stats::weighted_batch_mean(&currents, &voltages, sample_number)?;
        let power_mean = ensure_finite(power_mean, "power_mean_result")?;
        tracing::info!(power_mean, "power mean calculated");

        Ok(Publication {
            topic: self.result_topic.clone(),
            record: KpiRecord::Mean(MeanResult {
                power_mean_result: power_mean,
                name: POWER_MEAN_NAME.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_stats::StatsError;
    use serde_json::json;

    fn handle(payload: Value) -> Result<Publication, DispatchError> {
        PowerMeanHandler::default().handle(&payload)
    }

    fn power(publication: Publication) -> f64 {
        match publication.record {
            KpiRecord::Mean(r) => {
                assert_eq!(r.name, POWER_MEAN_NAME);
                r.power_mean_result
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_single_pair() {
        let publication = handle(json!({
            "current_drive3_batch": [{"_value": 2}],
            "voltage_drive3_batch": [{"_value": 3}],
            "sample_number": 1
        }))
        .unwrap();
        assert_eq!(publication.topic, "MeanResult");
        assert_eq!(power(publication), 6.0);
    }

    #[test]
    fn test_batch_rounded() {
        let p = power(
            handle(json!({
                "current_drive3_batch": [{"_value": 1.1}, {"_value": 2.2}, {"_value": 0.5}],
                "voltage_drive3_batch": [{"_value": 230}, {"_value": 231}, {"_value": 229.5}],
                "sample_number": 3
            }))
            .unwrap(),
        );
        // (253 + 508.2 + 114.75) / 3 = 291.983…
        assert_eq!(p, 291.98);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let p = power(
            handle(json!({
                "current_drive3_batch": [{"_value": 2, "_time": "t0"}],
                "voltage_drive3_batch": [{"_value": 3, "_field": "v"}],
                "sample_number": 2,
                "window": "1m"
            }))
            .unwrap(),
        );
        assert_eq!(p, 3.0);
    }

    #[test]
    fn test_huge_power_is_published_unrounded() {
        let p = power(
            handle(json!({
                "current_drive3_batch": [{"_value": 1.0e154}],
                "voltage_drive3_batch": [{"_value": 1.0e153}],
                "sample_number": 1
            }))
            .unwrap(),
        );
        assert!(p.is_finite());
        assert_eq!(p, 1.0e154 * 1.0e153);
    }

    #[test]
    fn test_zero_sample_number() {
        let err = handle(json!({
            "current_drive3_batch": [{"_value": 2}],
            "voltage_drive3_batch": [{"_value": 3}],
            "sample_number": 0
        }))
        .unwrap_err();
        assert!(matches!(err, DispatchError::Stats(StatsError::DivisionByZero)));
    }

    #[test]
    fn test_negative_sample_number() {
        let err = handle(json!({
            "current_drive3_batch": [{"_value": 2}],
            "voltage_drive3_batch": [{"_value": 3}],
            "sample_number": -1
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Validation(ValidationError::WrongType { .. })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let err = handle(json!({
            "current_drive3_batch": [{"_value": 2}, {"_value": 4}],
            "voltage_drive3_batch": [{"_value": 3}],
            "sample_number": 2
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Stats(StatsError::LengthMismatch { currents: 2, voltages: 1 })
        ));
    }

    #[test]
    fn test_missing_voltage_batch() {
        let err = handle(json!({
            "current_drive3_batch": [{"_value": 2}],
            "sample_number": 1
        }))
        .unwrap_err();
        match err {
            DispatchError::Validation(ValidationError::MissingField { field }) => {
                assert_eq!(field, VOLTAGE_BATCH)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_payload_not_an_object() {
        let err = handle(json!([1, 2])).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Validation(ValidationError::WrongType { expected: "an object", .. })
        ));
    }
}
