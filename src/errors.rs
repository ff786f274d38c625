use std::io;
use thiserror::Error;

use crate::connection::ConnectionState;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("serial capability unavailable: {0}")]
    Unsupported(String),
    #[error("device rejected the connection: {0}")]
    DeviceRejected(String),
    #[error("already connected (state: {0:?})")]
    AlreadyConnected(ConnectionState),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("transport closed: {0}")]
    TransportClosed(String),
    #[error("transport fault: {0}")]
    TransportFault(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0:?}")]
    MalformedFrame(String),
}

#[derive(Debug, Error)]
pub enum DisconnectError {
    #[error("failed to close transport: {0}")]
    Close(#[from] io::Error),
    #[error("read loop terminated abnormally: {0}")]
    ReadLoop(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("baud rate must be non-zero")]
    InvalidBaudRate,
    #[error("device axis max must be at least 2, got {0}")]
    InvalidAxisMax(u32),
    #[error("deadzone must be within 0..=100, got {0}")]
    InvalidDeadzone(f32),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl From<serialport::Error> for ConnectError {
    fn from(err: serialport::Error) -> Self {
        use serialport::ErrorKind;

        // `Unknown` covers many unrelated failures; only an explicit
        // unsupported-operation error means there is no serial capability.
        match err.kind() {
            ErrorKind::Io(io::ErrorKind::Unsupported) => {
                ConnectError::Unsupported(err.to_string())
            }
            _ => ConnectError::DeviceRejected(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectError>;
