//! Минимальный MQTT 3.1.1 клиент: связь worker'а с брокером.
//!
//! Покрывает то, что нужно QoS 0 worker'у: CONNECT с логином, SUBSCRIBE,
//! входящий PUBLISH (QoS 0 и 1), исходящий PUBLISH QoS 0, keep-alive ping
//! и переподключение с повторной подпиской.

mod config;
mod error;
mod link;
pub mod packet;

pub use config::MqttConfig;
pub use error::LinkError;
pub use link::{MqttEvents, MqttLink};
