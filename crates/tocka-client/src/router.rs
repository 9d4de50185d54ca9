//! Outbound chat messages.

use std::sync::Arc;

use tracing::debug;

use tocka_shared::naming::{group_exchange, user_queue, BROADCAST_ROUTING_KEY, DEFAULT_EXCHANGE};
use tocka_shared::Address;

use crate::channel::ChannelSlot;
use crate::conversation::ChatMessage;
use crate::error::Result;

/// Publishes messages straight to a user's queue or to a group's fan-out
/// exchange. Nothing is awaited beyond the publish itself.
pub struct Router {
    channel: Arc<ChannelSlot>,
}

impl Router {
    pub fn new(channel: Arc<ChannelSlot>) -> Self {
        Self { channel }
    }

    /// Send to whatever the message's consumer address names.
    pub async fn send(&self, message: &ChatMessage) -> Result<()> {
        match &message.consumer {
            Address::User(user) => self.send_message(user, message).await,
            Address::Group(group) => self.send_message_to_group(group, message).await,
        }
    }

    /// Declare the target's queue (idempotent) and publish into it.
    pub async fn send_message(&self, target_user: &str, message: &ChatMessage) -> Result<()> {
        let body = message.to_bytes()?;
        let queue = user_queue(target_user);

        self.channel
            .run(|ch| async move {
                ch.declare_queue(&queue).await?;
                ch.publish(DEFAULT_EXCHANGE, &queue, body).await
            })
            .await?;

        debug!(to = %target_user, "Published direct message");
        Ok(())
    }

    /// Publish to the group's exchange; the broker copies it to every
    /// member queue.
    pub async fn send_message_to_group(&self, group: &str, message: &ChatMessage) -> Result<()> {
        let body = message.to_bytes()?;
        let exchange = group_exchange(group);

        self.channel
            .run(|ch| async move { ch.publish(&exchange, BROADCAST_ROUTING_KEY, body).await })
            .await?;

        debug!(group = %group, "Published group message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tocka_broker::{Broker, MemoryBroker};
    use tocka_shared::Payload;

    fn router(broker: &MemoryBroker) -> Router {
        Router::new(Arc::new(ChannelSlot::new(Arc::new(broker.clone()))))
    }

    #[tokio::test]
    async fn test_direct_send_declares_queue() {
        let broker = MemoryBroker::new();
        let router = router(&broker);
        let msg = ChatMessage::new("alice", Address::User("bob".into()), "hello");

        router.send(&msg).await.unwrap();

        assert_eq!(broker.pending("bob"), Some(1));
        let ch = broker.open_channel().await.unwrap();
        let mut deliveries = ch.consume("bob").await.unwrap();
        let payload = Payload::from_bytes(&deliveries.recv().await.unwrap()).unwrap();
        assert_eq!(payload.emitter, "alice");
        assert_eq!(payload.receiver(), Some("bob"));
        assert_eq!(payload.text_body(), "hello");
    }

    #[tokio::test]
    async fn test_group_send_fans_out() {
        let broker = MemoryBroker::new();
        let ch = broker.open_channel().await.unwrap();
        ch.declare_fanout_exchange("team").await.unwrap();
        for user in ["bob", "carol"] {
            ch.declare_queue(user).await.unwrap();
            ch.bind_queue(user, "team").await.unwrap();
        }

        let router = router(&broker);
        let msg = ChatMessage::new("alice", Address::Group("team".into()), "standup");
        router.send(&msg).await.unwrap();

        assert_eq!(broker.pending("bob"), Some(1));
        assert_eq!(broker.pending("carol"), Some(1));
    }

    #[tokio::test]
    async fn test_unknown_group_does_not_break_next_send() {
        let broker = MemoryBroker::new();
        let router = router(&broker);

        let lost = ChatMessage::new("alice", Address::Group("ghost".into()), "anyone?");
        router.send(&lost).await.unwrap();

        let direct = ChatMessage::new("alice", Address::User("bob".into()), "hello");
        router.send(&direct).await.unwrap();
        assert_eq!(broker.pending("bob"), Some(1));
    }
}
