use thiserror::Error;

/// Errors raised by broker transports.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// AMQP protocol or connection error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The named queue has not been declared.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// The named exchange has not been declared.
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// The channel was closed before the operation.
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection URI could not be built from configuration.
    #[error("Invalid broker URI: {0}")]
    InvalidUri(String),
}

/// Errors raised by control-plane (management API) queries.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    /// No control-plane client was configured for this directory.
    #[error("Control plane client not initialized")]
    NotConfigured,

    /// Transport-level HTTP failure.
    #[error("Control plane request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("Control plane returned {status} for {url}")]
    Status { status: u16, url: String },

    /// The management base URL is unusable.
    #[error("Invalid control plane URL: {0}")]
    InvalidUrl(String),

    /// The response body was not the expected binding list.
    #[error("Malformed control plane response: {0}")]
    Decode(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BrokerError>;
