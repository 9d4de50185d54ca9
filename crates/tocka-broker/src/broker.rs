//! Broker primitives.
//!
//! A [`Broker`] is one connection; it hands out [`BrokerChannel`]s on which
//! queues and fan-out exchanges are declared, bound and published to.
//! Consumers are exposed as explicit inbound channels ([`Deliveries`])
//! rather than callbacks, so each consumer can be drained by its own task.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Raw message bodies delivered to one consumer, in queue order.
/// Deliveries are auto-acknowledged.
pub type Deliveries = mpsc::UnboundedReceiver<Vec<u8>>;

/// One connection to the broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a fresh channel. Channels are cheap; callers that need
    /// isolation from other work (uploads, consumers) open their own.
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>>;

    /// Close the connection and every channel opened on it.
    async fn close(&self) -> Result<()>;
}

/// A channel on a broker connection.
///
/// Declarations and bindings are idempotent. Every binding uses the empty
/// routing key: exchanges are pure fan-out.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a durable, replicated (quorum) queue.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Declare a durable fan-out exchange.
    async fn declare_fanout_exchange(&self, exchange: &str) -> Result<()>;

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<()>;

    /// Remove a binding. The queue and its contents are untouched.
    async fn unbind_queue(&self, queue: &str, exchange: &str) -> Result<()>;

    /// Publish without waiting for a broker confirm. An empty `exchange`
    /// targets the default exchange, which routes by queue name.
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<()>;

    /// Start consuming `queue`.
    async fn consume(&self, queue: &str) -> Result<Deliveries>;

    /// Whether the channel still accepts operations. A broker may close a
    /// channel after an operation that itself returned `Ok` (an unconfirmed
    /// publish to a missing exchange), so callers caching a channel check
    /// this before reusing it.
    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<()>;
}
