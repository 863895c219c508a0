//! Маршрутизация topic'ов и расчёт KPI для worker'а аналитики.
//!
//! Входящее сообщение проходит
//! [`decoder::decode`] → [`Router::resolve`] → [`Handler::handle`] →
//! [`Publisher::publish`](kpi_api::Publisher::publish) под управлением
//! [`Dispatcher`]. Любая ошибка остаётся внутри возвращённого
//! [`DispatchOutcome`]; на плохом входе здесь ничего не паникует.

pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod record;
pub mod router;
mod task;

pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher};
pub use error::{DecodeError, DispatchError, ErrorKind, Stage, ValidationError};
pub use handler::{Handler, KpiKind, PowerMeanHandler, Publication, StandardKpiHandler};
pub use record::{KpiRecord, MeanResult, Metric, StandardKpiResult};
pub use router::Router;
pub use task::spawn_dispatch_task;
