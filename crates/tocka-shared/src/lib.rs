//! Types shared by every Tocka crate: addressing, broker naming
//! conventions, the wire payload and its timestamp format.

pub mod constants;
pub mod error;
pub mod naming;
pub mod protocol;
pub mod timestamp;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{Content, Payload, Recipient};
pub use types::Address;
