use std::fmt;

use kpi_stats::StatsError;

/// Байты payload не являются валидным UTF-8 JSON.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON payload: {source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

impl DecodeError {
    /// Строка ошибки разбора (с 1).
    pub fn line(&self) -> usize {
        self.source.line()
    }

    /// Колонка ошибки разбора (с 1).
    pub fn column(&self) -> usize {
        self.source.column()
    }
}

/// Well-formed JSON with the wrong shape for the handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' must be {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field '{field}' must not be empty")]
    Empty { field: String },

    #[error("computed '{field}' is not a finite number")]
    NonFinite { field: &'static str },
}

impl ValidationError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    pub(crate) fn wrong_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType { field: field.into(), expected }
    }
}

/// Всё, что может пойти не так при обработке одного сообщения.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("statistics: {0}")]
    Stats(#[from] StatsError),

    #[error("no handler registered for topic '{0}'")]
    UnregisteredTopic(String),

    #[error("encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Decode(_) => ErrorKind::Decode,
            DispatchError::Validation(_) => ErrorKind::Validation,
            DispatchError::Stats(StatsError::EmptyInput) => ErrorKind::EmptyInput,
            DispatchError::Stats(StatsError::InsufficientData { .. }) => {
                ErrorKind::InsufficientData
            }
            DispatchError::Stats(StatsError::DivisionByZero) => ErrorKind::DivisionByZero,
            DispatchError::Stats(StatsError::LengthMismatch { .. }) => ErrorKind::LengthMismatch,
            DispatchError::UnregisteredTopic(_) => ErrorKind::UnregisteredTopic,
            DispatchError::Encode(_) => ErrorKind::Encode,
        }
    }

    /// Stage of the dispatch pipeline that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            DispatchError::Decode(_) => Stage::Decode,
            DispatchError::UnregisteredTopic(_) => Stage::Route,
            DispatchError::Validation(_) | DispatchError::Stats(_) => Stage::Handle,
            DispatchError::Encode(_) => Stage::Publish,
        }
    }
}

/// Категория ошибки, поле структурного лога.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Decode,
    Validation,
    EmptyInput,
    InsufficientData,
    DivisionByZero,
    LengthMismatch,
    UnregisteredTopic,
    Encode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Validation => "validation",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::DivisionByZero => "division_by_zero",
            ErrorKind::LengthMismatch => "length_mismatch",
            ErrorKind::UnregisteredTopic => "unregistered_topic",
            ErrorKind::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Transition of the per-message state machine
/// `Received → Decoded → Routed → Handled → Published`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Route,
    Handle,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Decode => f.write_str("decode"),
            Stage::Route => f.write_str("route"),
            Stage::Handle => f.write_str("handle"),
            Stage::Publish => f.write_str("publish"),
        }
    }
}
