use thiserror::Error;

use tocka_broker::{BrokerError, ControlPlaneError};
use tocka_shared::ProtocolError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Path has no file name: {0}")]
    InvalidPath(String),

    #[error("Upload queue is full")]
    UploadQueueFull,

    #[error("Upload worker has stopped")]
    UploadWorkerStopped,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
