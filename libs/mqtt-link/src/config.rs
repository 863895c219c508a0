use std::time::Duration;

/// Параметры MQTT соединения.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive announced in CONNECT; a PINGREQ is sent at this interval.
    pub keep_alive: Duration,
    /// Пауза перед переподключением после потери или отказа.
    pub reconnect_delay: Duration,
    /// Ёмкость очереди исходящих публикаций.
    pub outbound_buffer: usize,
    /// Ёмкость канала входящих событий.
    pub inbound_buffer: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "data-analytics".into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(2),
            outbound_buffer: 1024,
            inbound_buffer: 1024,
        }
    }
}

impl MqttConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Keep-alive in whole seconds as sent on the wire (0 disables it).
    pub(crate) fn keep_alive_secs(&self) -> u16 {
        self.keep_alive.as_secs().min(u16::MAX as u64) as u16
    }
}
