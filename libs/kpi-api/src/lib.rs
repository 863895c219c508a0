//! Общие типы KPI-движка и адаптеров брокера.
//!
//! Движок не работает с брокером напрямую: он получает [`Publisher`] для
//! результатов и читает [`BrokerEvent`] из [`EventStream`]. Трейты
//! реализуют адаптеры (`mqtt-link`, `message-bus`). Крейт не зависит от
//! async runtime.

pub mod bus;
pub mod error;
pub mod message;

pub use bus::{BrokerEvent, EventStream, Publisher, Subscriber};
pub use error::BusError;
pub use message::{topics, RawMessage};
