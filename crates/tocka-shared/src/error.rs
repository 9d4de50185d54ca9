use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Payload encoding failed: {0}")]
    Encode(String),

    #[error("Payload decoding failed: {0}")]
    Decode(String),
}
