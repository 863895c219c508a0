use std::future::Future;
use std::pin::Pin;

use crate::error::BusError;
use crate::message::RawMessage;

/// Событие со стороны брокера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Сессия установлена. `code`: код ответа брокера, 0 значит принято.
    Connected { code: u8 },
    /// Сессия завершена. `code == 0` означает остановку по нашей инициативе, иначе
    /// неожиданная потеря соединения.
    Disconnected { code: u8 },
    /// Брокер подтвердил подписку.
    Subscribed { topic: String },
    /// Сообщение в подписанном topic'е.
    Message(RawMessage),
}

/// Исходящая сторона брокера: публикация fire-and-forget.
///
/// Реализации не блокируют. Недоставленная публикация остаётся заботой адаптера
/// (лог и drop), вызывающий её не видит.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>);
}

/// Подписка на topic у брокера.
///
/// Сообщения приходят через [`EventStream`] адаптера.
pub trait Subscriber: Send + Sync {
    fn subscribe(&self, topic: &str)
        -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>;
}

/// Входящая сторона брокера: async поток событий.
pub trait EventStream: Send {
    /// Следующее событие. `None` после остановки адаптера.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<BrokerEvent>> + Send + '_>>;
}
