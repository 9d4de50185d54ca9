//! AMQP 0-9-1 transport built on `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tocka_shared::naming::BROADCAST_ROUTING_KEY;

use crate::broker::{Broker, BrokerChannel, Deliveries};
use crate::config::BrokerConfig;
use crate::error::Result;

/// Reply code sent with a normal channel/connection close.
const REPLY_SUCCESS: u16 = 200;

/// Persistent delivery mode, so durable queues keep messages across restarts.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

pub struct AmqpBroker {
    connection: Connection,
    quorum_group_size: u32,
}

impl AmqpBroker {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let uri = config.amqp_uri()?;
        let connection = Connection::connect(&uri, ConnectionProperties::default()).await?;

        info!(
            host = %config.host,
            port = config.port,
            vhost = %config.vhost,
            "Connected to broker"
        );

        Ok(Self {
            connection,
            quorum_group_size: config.quorum_group_size,
        })
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        let channel = self.connection.create_channel().await?;
        debug!(channel_id = channel.id(), "Opened AMQP channel");
        Ok(Box::new(AmqpChannel {
            channel,
            quorum_group_size: self.quorum_group_size,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.connection.close(REPLY_SUCCESS, "client closing").await?;
        info!("Broker connection closed");
        Ok(())
    }
}

struct AmqpChannel {
    channel: Channel,
    quorum_group_size: u32,
}

impl AmqpChannel {
    fn quorum_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert("x-queue-type".into(), AMQPValue::LongString("quorum".into()));
        args.insert(
            "x-quorum-initial-group-size".into(),
            AMQPValue::LongInt(self.quorum_group_size as i32),
        );
        args
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                self.quorum_arguments(),
            )
            .await?;
        Ok(())
    }

    async fn declare_fanout_exchange(&self, exchange: &str) -> Result<()> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                BROADCAST_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn unbind_queue(&self, queue: &str, exchange: &str) -> Result<()> {
        self.channel
            .queue_unbind(queue, exchange, BROADCAST_ROUTING_KEY, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<()> {
        // The returned confirm is dropped: publishing is fire-and-forget.
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Deliveries> {
        let consumer_tag = format!("tocka-{}", uuid::Uuid::new_v4());
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        // The forwarding task owns a channel handle so the channel outlives
        // this wrapper for as long as the consumer runs.
        let channel = self.channel.clone();
        let queue = queue.to_string();

        tokio::spawn(async move {
            let _channel = channel;
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        if tx.send(delivery.data).is_err() {
                            debug!(queue = %queue, "Delivery receiver dropped");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "Consumer stream failed");
                        break;
                    }
                }
            }
            debug!(queue = %queue, consumer = %consumer_tag, "Consumer ended");
        });

        Ok(rx)
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn close(&self) -> Result<()> {
        self.channel.close(REPLY_SUCCESS, "done").await?;
        Ok(())
    }
}
