//! The coordinator's shared broker channel.
//!
//! A broker closes a channel after any rejected operation (publishing to
//! an undeclared exchange, binding a missing queue, ...), sometimes after
//! the operation already returned. The slot opens the channel lazily,
//! drops it after a failed operation and replaces it whenever it is found
//! closed, so the next operation starts on a fresh one.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use tocka_broker::{Broker, BrokerChannel, BrokerError};

pub struct ChannelSlot {
    broker: Arc<dyn Broker>,
    current: Mutex<Option<Arc<dyn BrokerChannel>>>,
}

impl ChannelSlot {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            current: Mutex::new(None),
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    async fn get(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let mut current = self.current.lock().await;
        if let Some(channel) = current.as_ref() {
            if channel.is_open() {
                return Ok(channel.clone());
            }
            debug!("Shared channel closed by the broker, reopening");
        }
        let channel: Arc<dyn BrokerChannel> = Arc::from(self.broker.open_channel().await?);
        *current = Some(channel.clone());
        Ok(channel)
    }

    async fn discard(&self) {
        if let Some(channel) = self.current.lock().await.take() {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "Closing failed channel");
            }
        }
    }

    /// Run `op` on the shared channel, discarding the channel if it fails.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, BrokerError>
    where
        F: FnOnce(Arc<dyn BrokerChannel>) -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let channel = self.get().await?;
        match op(channel).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.discard().await;
                Err(e)
            }
        }
    }

    pub async fn close(&self) {
        self.discard().await;
    }
}
