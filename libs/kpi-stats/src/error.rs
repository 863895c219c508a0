/// Почему статистику не удалось посчитать.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("empty input")]
    EmptyInput,

    #[error("insufficient data: need at least {required} values, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("division by zero: sample count is 0")]
    DivisionByZero,

    #[error("length mismatch: {currents} current values vs {voltages} voltage values")]
    LengthMismatch { currents: usize, voltages: usize },
}
