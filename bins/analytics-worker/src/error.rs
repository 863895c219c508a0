use kpi_api::BusError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("broker: {0}")]
    Bus(#[from] BusError),

    #[error("replay input '{path}': {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        WorkerError::Config { context, detail: detail.into() }
    }
}
