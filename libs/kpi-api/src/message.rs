/// Фиксированные имена topic'ов сервиса аналитики.
pub mod topics {
    /// Входящие пакеты записей `{_value, _measurement}`.
    pub const STANDARD_KPIS: &str = "StandardKpis";
    /// Входящие пакеты токов/напряжений для средней мощности.
    pub const MEAN: &str = "Mean";
    /// Исходящие результаты mean/median/stddev.
    pub const STANDARD_KPI_RESULT: &str = "StandardKpiResult";
    /// Исходящие результаты средней мощности.
    pub const MEAN_RESULT: &str = "MeanResult";
}

/// Сообщение в том виде, в каком его доставил брокер: topic и байты payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload как текст (lossy). Только для логов.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
