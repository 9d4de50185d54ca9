//! In-process broker.
//!
//! Mirrors the observable semantics the chat layer relies on: the default
//! exchange routes by queue name (unroutable messages are dropped), fan-out
//! exchanges copy to every bound queue, declarations and bindings are
//! idempotent, unbinding leaves queue contents alone, and messages published
//! before a consumer attaches wait in the queue. It also answers the
//! control-plane binding queries from its own tables, so a whole client can
//! run against it without a real broker.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use tocka_shared::naming::{BROADCAST_ROUTING_KEY, DEFAULT_EXCHANGE};

use crate::broker::{Broker, BrokerChannel, Deliveries};
use crate::error::{BrokerError, ControlPlaneError, Result};
use crate::management::{Binding, ControlPlane};

#[derive(Default)]
struct MemoryQueue {
    pending: VecDeque<Vec<u8>>,
    consumers: Vec<mpsc::UnboundedSender<Vec<u8>>>,
}

impl MemoryQueue {
    /// Hand pending messages to live consumers, round-robin.
    fn flush(&mut self) {
        while !self.pending.is_empty() {
            self.consumers.retain(|c| !c.is_closed());
            if self.consumers.is_empty() {
                return;
            }
            let Some(body) = self.pending.pop_front() else {
                return;
            };
            let consumer = self.consumers.remove(0);
            match consumer.send(body) {
                Ok(()) => self.consumers.push(consumer),
                Err(mpsc::error::SendError(body)) => self.pending.push_front(body),
            }
        }
    }
}

#[derive(Default)]
struct MemoryState {
    queues: HashMap<String, MemoryQueue>,
    /// Fan-out exchange name -> bound queue names.
    exchanges: HashMap<String, BTreeSet<String>>,
}

/// Cheaply cloneable handle to a shared in-memory broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-updated
        // in a way later calls would misread, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.lock().queues.contains_key(queue)
    }

    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.lock().exchanges.contains_key(exchange)
    }

    /// Messages waiting in `queue` for a consumer.
    pub fn pending(&self, queue: &str) -> Option<usize> {
        self.lock().queues.get(queue).map(|q| q.pending.len())
    }

    /// Queues bound to `exchange`, sorted.
    pub fn bound_queues(&self, exchange: &str) -> Vec<String> {
        self.lock()
            .exchanges
            .get(exchange)
            .map(|bound| bound.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        Ok(Box::new(MemoryChannel {
            broker: self.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.lock();
        for queue in state.queues.values_mut() {
            queue.consumers.clear();
        }
        Ok(())
    }
}

struct MemoryChannel {
    broker: MemoryBroker,
    open: AtomicBool,
}

impl MemoryChannel {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        if !self.open.load(Ordering::Acquire) {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(self.broker.lock())
    }

    /// A rejected operation closes the channel, as a real broker does.
    fn close_on_error<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.open.store(false, Ordering::Release);
        }
        result
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.state()?.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn declare_fanout_exchange(&self, exchange: &str) -> Result<()> {
        self.state()?
            .exchanges
            .entry(exchange.to_string())
            .or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<()> {
        let result = self.state().and_then(|mut state| {
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::QueueNotFound(queue.to_string()));
            }
            state
                .exchanges
                .get_mut(exchange)
                .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?
                .insert(queue.to_string());
            Ok(())
        });
        self.close_on_error(result)
    }

    async fn unbind_queue(&self, queue: &str, exchange: &str) -> Result<()> {
        let result = self.state().and_then(|mut state| {
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::QueueNotFound(queue.to_string()));
            }
            state
                .exchanges
                .get_mut(exchange)
                .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?
                .remove(queue);
            Ok(())
        });
        self.close_on_error(result)
    }

    /// Publishing is not confirmed: a publish to a missing exchange
    /// succeeds and the channel is closed afterwards.
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<()> {
        let mut state = self.state()?;

        let targets: Vec<String> = if exchange == DEFAULT_EXCHANGE {
            vec![routing_key.to_string()]
        } else {
            match state.exchanges.get(exchange) {
                Some(bound) => bound.iter().cloned().collect(),
                None => {
                    debug!(exchange = %exchange, "Publish to missing exchange, closing channel");
                    self.open.store(false, Ordering::Release);
                    return Ok(());
                }
            }
        };

        for target in targets {
            match state.queues.get_mut(&target) {
                Some(queue) => {
                    queue.pending.push_back(body.clone());
                    queue.flush();
                }
                None => debug!(queue = %target, "Dropping unroutable message"),
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Deliveries> {
        let result = self.state().and_then(|mut state| {
            let entry = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
            let (tx, rx) = mpsc::unbounded_channel();
            entry.consumers.push(tx);
            entry.flush();
            Ok(rx)
        });
        self.close_on_error(result)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MemoryBroker {
    async fn exchange_bindings(&self, exchange: &str) -> std::result::Result<Vec<Binding>, ControlPlaneError> {
        let state = self.lock();
        let bound = state.exchanges.get(exchange).ok_or_else(|| ControlPlaneError::Status {
            status: 404,
            url: format!("memory://exchanges/{exchange}/bindings/source"),
        })?;
        Ok(bound
            .iter()
            .map(|queue| Binding::to_queue(exchange, queue, BROADCAST_ROUTING_KEY))
            .collect())
    }

    async fn queue_bindings(&self, queue: &str) -> std::result::Result<Vec<Binding>, ControlPlaneError> {
        let state = self.lock();
        if !state.queues.contains_key(queue) {
            return Err(ControlPlaneError::Status {
                status: 404,
                url: format!("memory://queues/{queue}/bindings"),
            });
        }
        // Every queue is implicitly bound to the default exchange.
        let mut bindings = vec![Binding::to_queue(DEFAULT_EXCHANGE, queue, queue)];
        bindings.extend(
            state
                .exchanges
                .iter()
                .filter(|(_, bound)| bound.contains(queue))
                .map(|(exchange, _)| Binding::to_queue(exchange, queue, BROADCAST_ROUTING_KEY)),
        );
        Ok(bindings)
    }
}
