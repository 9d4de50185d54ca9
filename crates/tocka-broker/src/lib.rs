// Broker plumbing: the queue/exchange primitives the chat layer is built
// on, an AMQP implementation, an in-process implementation, and the HTTP
// control-plane client used for membership queries.

pub mod amqp;
pub mod broker;
pub mod config;
pub mod error;
pub mod management;
pub mod memory;

pub use amqp::AmqpBroker;
pub use broker::{Broker, BrokerChannel, Deliveries};
pub use config::BrokerConfig;
pub use error::{BrokerError, ControlPlaneError};
pub use management::{groups_from_bindings, members_from_bindings, Binding, ControlPlane, ManagementClient};
pub use memory::MemoryBroker;
