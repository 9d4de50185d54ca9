//! Consumers for the user's message queue and group file queues.
//!
//! Every consumer runs on its own broker channel and its own task. Loops
//! only decode and persist; everything that touches controller state is
//! posted to the coordinator as an [`InboundEvent`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tocka_broker::{Broker, BrokerChannel, BrokerError, Deliveries};
use tocka_shared::naming::{group_files_exchange, group_files_queue, user_queue};
use tocka_shared::Payload;

use crate::downloads::DownloadStore;
use crate::error::Result;
use crate::events::{CoordinatorHandle, InboundEvent};

pub struct InboundSubscriptionManager {
    broker: Arc<dyn Broker>,
    username: String,
    downloads: DownloadStore,
    coordinator: CoordinatorHandle,
    /// Groups whose file queue is already being consumed.
    subscribed: HashSet<String>,
    channels: Vec<Box<dyn BrokerChannel>>,
    tasks: Vec<JoinHandle<()>>,
}

impl InboundSubscriptionManager {
    /// Start consuming the user's message queue, declaring it first.
    pub async fn start(
        broker: Arc<dyn Broker>,
        username: impl Into<String>,
        downloads: DownloadStore,
        coordinator: CoordinatorHandle,
    ) -> Result<Self> {
        let username = username.into();
        let queue = user_queue(&username);

        let (channel, deliveries) = open_consumer(broker.as_ref(), &queue, None).await?;
        info!(queue = %queue, "Consuming messages");

        let task = tokio::spawn(message_loop(
            username.clone(),
            deliveries,
            coordinator.clone(),
        ));

        Ok(Self {
            broker,
            username,
            downloads,
            coordinator,
            subscribed: HashSet::new(),
            channels: vec![channel],
            tasks: vec![task],
        })
    }

    pub fn is_subscribed(&self, group: &str) -> bool {
        self.subscribed.contains(group)
    }

    pub fn subscribed_groups(&self) -> Vec<String> {
        self.subscribed.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Make sure files broadcast to `group` reach this user: declare the
    /// group's file exchange, bind a per-member queue to it and consume it.
    /// Returns `false` when the group was already subscribed.
    pub async fn subscribe_to_group_files(&mut self, group: &str) -> Result<bool> {
        if self.subscribed.contains(group) {
            return Ok(false);
        }

        let exchange = group_files_exchange(group);
        let queue = group_files_queue(&self.username, group);

        let (channel, deliveries) =
            open_consumer(self.broker.as_ref(), &queue, Some(&exchange)).await?;
        info!(group = %group, queue = %queue, "Consuming group files");

        self.tasks.push(tokio::spawn(file_loop(
            self.username.clone(),
            deliveries,
            self.downloads.clone(),
            self.coordinator.clone(),
        )));
        self.channels.push(channel);
        self.subscribed.insert(group.to_string());
        Ok(true)
    }

    pub async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        for channel in self.channels.drain(..) {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "Closing consumer channel");
            }
        }
    }
}

/// Open a channel, declare `queue` (bound to the fan-out exchange `fanout`
/// when given) and start consuming it. The channel is closed again if any
/// step fails.
pub(crate) async fn open_consumer(
    broker: &dyn Broker,
    queue: &str,
    fanout: Option<&str>,
) -> Result<(Box<dyn BrokerChannel>, Deliveries)> {
    let channel = broker.open_channel().await?;
    match declare_and_consume(channel.as_ref(), queue, fanout).await {
        Ok(deliveries) => Ok((channel, deliveries)),
        Err(e) => {
            if let Err(close_err) = channel.close().await {
                debug!(error = %close_err, "Closing consumer channel after failure");
            }
            Err(e.into())
        }
    }
}

async fn declare_and_consume(
    channel: &dyn BrokerChannel,
    queue: &str,
    fanout: Option<&str>,
) -> std::result::Result<Deliveries, BrokerError> {
    if let Some(exchange) = fanout {
        channel.declare_fanout_exchange(exchange).await?;
    }
    channel.declare_queue(queue).await?;
    if let Some(exchange) = fanout {
        channel.bind_queue(queue, exchange).await?;
    }
    channel.consume(queue).await
}

/// Broadcasts come back to their emitter through its own membership.
fn is_own_group_echo(payload: &Payload, username: &str) -> bool {
    payload.is_group() && payload.emitter == username
}

async fn message_loop(username: String, mut deliveries: Deliveries, coordinator: CoordinatorHandle) {
    while let Some(body) = deliveries.recv().await {
        let payload = match Payload::from_bytes(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, size = body.len(), "Dropping malformed message");
                continue;
            }
        };
        if is_own_group_echo(&payload, &username) {
            continue;
        }
        if payload.is_file() {
            warn!(sender = %payload.emitter, "Ignoring file payload on message queue");
            continue;
        }

        debug!(sender = %payload.emitter, "Message received");
        coordinator.post(InboundEvent::MessageReceived {
            sender: payload.emitter.clone(),
            group: payload.group().map(str::to_string),
            content: payload.text_body(),
            timestamp: payload.timestamp(),
        });
    }
    debug!("Message consumer stopped");
}

/// Persist every file delivered on `deliveries` and report it.
pub(crate) async fn file_loop(
    username: String,
    mut deliveries: Deliveries,
    downloads: DownloadStore,
    coordinator: CoordinatorHandle,
) {
    while let Some(body) = deliveries.recv().await {
        let payload = match Payload::from_bytes(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, size = body.len(), "Dropping malformed file payload");
                continue;
            }
        };
        if is_own_group_echo(&payload, &username) {
            continue;
        }
        if !payload.is_file() {
            warn!(sender = %payload.emitter, "Ignoring text payload on file queue");
            continue;
        }

        let saved = match downloads.save(&payload.content.name, &payload.content.body).await {
            Ok(path) => path,
            Err(e) => {
                warn!(sender = %payload.emitter, file = %payload.content.name, error = %e, "Failed to save file");
                continue;
            }
        };
        let file_name = saved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| payload.content.name.clone());

        coordinator.post(InboundEvent::FileReceived {
            sender: payload.emitter.clone(),
            file_name,
            timestamp: payload.timestamp(),
        });
    }
    debug!("File consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::coordinator_channel;
    use tocka_broker::MemoryBroker;
    use tocka_shared::timestamp::now;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tocka_shared::Recipient;

    /// Opens channels that reject every declaration and record being closed.
    struct RejectingBroker {
        closed: Arc<AtomicBool>,
    }

    struct RejectingChannel {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Broker for RejectingBroker {
        async fn open_channel(&self) -> tocka_broker::error::Result<Box<dyn BrokerChannel>> {
            Ok(Box::new(RejectingChannel {
                closed: self.closed.clone(),
            }))
        }

        async fn close(&self) -> tocka_broker::error::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrokerChannel for RejectingChannel {
        async fn declare_queue(&self, queue: &str) -> tocka_broker::error::Result<()> {
            Err(BrokerError::QueueNotFound(queue.to_string()))
        }

        async fn declare_fanout_exchange(&self, exchange: &str) -> tocka_broker::error::Result<()> {
            Err(BrokerError::ExchangeNotFound(exchange.to_string()))
        }

        async fn bind_queue(&self, queue: &str, _exchange: &str) -> tocka_broker::error::Result<()> {
            Err(BrokerError::QueueNotFound(queue.to_string()))
        }

        async fn unbind_queue(&self, queue: &str, _exchange: &str) -> tocka_broker::error::Result<()> {
            Err(BrokerError::QueueNotFound(queue.to_string()))
        }

        async fn publish(&self, _exchange: &str, _routing_key: &str, _body: Vec<u8>) -> tocka_broker::error::Result<()> {
            Ok(())
        }

        async fn consume(&self, queue: &str) -> tocka_broker::error::Result<Deliveries> {
            Err(BrokerError::QueueNotFound(queue.to_string()))
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::Acquire)
        }

        async fn close(&self) -> tocka_broker::error::Result<()> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_start_closes_its_channel() {
        let closed = Arc::new(AtomicBool::new(false));
        let broker = RejectingBroker { closed: closed.clone() };
        let dir = tempfile::tempdir().unwrap();
        let (handle, _events) = coordinator_channel();

        let started =
            InboundSubscriptionManager::start(Arc::new(broker), "alice", DownloadStore::new(dir.path()), handle).await;

        assert!(started.is_err());
        assert!(closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_text_on_file_queue_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events) = coordinator_channel();
        let (tx, rx) = mpsc::unbounded_channel();

        let text = Payload::text("bob", Recipient::User("alice".into()), &now(), "hello");
        let file = Payload::file("bob", Recipient::User("alice".into()), &now(), "a.txt", "text/plain", b"data".to_vec());
        tx.send(text.to_bytes().unwrap()).unwrap();
        tx.send(file.to_bytes().unwrap()).unwrap();
        drop(tx);

        file_loop("alice".into(), rx, DownloadStore::new(dir.path()), handle).await;

        match events.recv().await.unwrap() {
            InboundEvent::FileReceived { file_name, .. } => assert_eq!(file_name, "a.txt"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());
        let saved: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(saved, vec![std::ffi::OsString::from("a.txt")]);
    }

    #[tokio::test]
    async fn test_group_file_subscription_is_idempotent() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let (handle, _events) = coordinator_channel();
        let mut inbound = InboundSubscriptionManager::start(
            Arc::new(broker.clone()),
            "alice",
            DownloadStore::new(dir.path()),
            handle,
        )
        .await
        .unwrap();

        assert!(broker.has_queue("alice"));
        assert!(inbound.subscribe_to_group_files("team").await.unwrap());
        assert!(!inbound.subscribe_to_group_files("team").await.unwrap());
        assert_eq!(broker.bound_queues("team_files"), vec!["alice_team_files"]);
        assert_eq!(inbound.subscribed_groups(), vec!["team"]);

        inbound.shutdown().await;
    }

    #[tokio::test]
    async fn test_own_group_echo_is_skipped() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events) = coordinator_channel();
        let mut inbound = InboundSubscriptionManager::start(
            Arc::new(broker.clone()),
            "alice",
            DownloadStore::new(dir.path()),
            handle,
        )
        .await
        .unwrap();

        let ch = broker.open_channel().await.unwrap();
        let echo = Payload::text("alice", Recipient::Group("team".into()), &now(), "mine");
        let other = Payload::text("bob", Recipient::Group("team".into()), &now(), "theirs");
        ch.publish("", "alice", echo.to_bytes().unwrap()).await.unwrap();
        ch.publish("", "alice", other.to_bytes().unwrap()).await.unwrap();

        match events.recv().await.unwrap() {
            InboundEvent::MessageReceived { sender, group, content, .. } => {
                assert_eq!(sender, "bob");
                assert_eq!(group.as_deref(), Some("team"));
                assert_eq!(content, "theirs");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        inbound.shutdown().await;
    }
}
