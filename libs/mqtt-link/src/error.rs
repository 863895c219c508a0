use kpi_api::BusError;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("unexpected packet type {0:#04x}")]
    UnexpectedPacket(u8),

    #[error("packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("string too long for MQTT: {0} bytes")]
    StringTooLong(usize),

    #[error("broker refused connection (return code {0})")]
    ConnectionRefused(u8),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("connection closed by broker")]
    ConnectionClosed,
}

impl From<LinkError> for BusError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Io(e) => BusError::Io(e.to_string()),
            LinkError::ConnectionClosed => BusError::NotConnected,
            other => BusError::Protocol(other.to_string()),
        }
    }
}
