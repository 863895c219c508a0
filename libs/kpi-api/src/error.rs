/// Ошибка адаптера брокера.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Нет активной сессии с брокером.
    #[error("not connected to broker")]
    NotConnected,

    /// Адаптер остановлен, дальнейшие операции невозможны.
    #[error("broker adapter closed")]
    Closed,

    #[error("io: {0}")]
    Io(String),

    /// Брокер прислал что-то, нарушающее протокол.
    #[error("protocol: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for BusError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
