//! File transfer: a bounded FIFO of uploads drained by one worker, plus
//! the consumer that persists files sent directly to this user.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tocka_broker::{Broker, BrokerChannel};
use tocka_shared::constants::FALLBACK_MIME_TYPE;
use tocka_shared::naming::{
    group_files_exchange, user_files_queue, BROADCAST_ROUTING_KEY, DEFAULT_EXCHANGE,
};
use tocka_shared::timestamp::now;
use tocka_shared::{Address, Payload, Recipient};

use crate::downloads::DownloadStore;
use crate::error::{ClientError, Result};
use crate::events::{CoordinatorHandle, InboundEvent};
use crate::inbound::{file_loop, open_consumer};

#[derive(Debug)]
struct UploadJob {
    path: PathBuf,
    target: Address,
}

pub struct FileTransferPipeline {
    jobs: Option<mpsc::Sender<UploadJob>>,
    worker: Option<JoinHandle<()>>,
    inbound: Option<JoinHandle<()>>,
    inbound_channel: Option<Box<dyn BrokerChannel>>,
}

impl FileTransferPipeline {
    /// Start consuming `<user>_files` and spawn the upload worker.
    pub async fn start(
        broker: Arc<dyn Broker>,
        username: &str,
        downloads: DownloadStore,
        coordinator: CoordinatorHandle,
        queue_capacity: usize,
    ) -> Result<Self> {
        let queue = user_files_queue(username);
        let (channel, deliveries) = open_consumer(broker.as_ref(), &queue, None).await?;
        info!(queue = %queue, "Consuming direct files");

        let inbound = tokio::spawn(file_loop(
            username.to_string(),
            deliveries,
            downloads,
            coordinator.clone(),
        ));

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(upload_worker(broker, username.to_string(), rx, coordinator));

        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
            inbound: Some(inbound),
            inbound_channel: Some(channel),
        })
    }

    /// Queue `path` for upload to `receiver`. Returns as soon as the job is
    /// queued; the outcome is reported later as an event.
    pub fn send_file(&self, receiver: &str, path: impl Into<PathBuf>) -> Result<()> {
        self.enqueue(Address::User(receiver.to_string()), path.into())
    }

    /// Queue `path` for broadcast to every member of `group`.
    pub fn send_file_to_group(&self, group: &str, path: impl Into<PathBuf>) -> Result<()> {
        self.enqueue(Address::Group(group.to_string()), path.into())
    }

    fn enqueue(&self, target: Address, path: PathBuf) -> Result<()> {
        let jobs = self.jobs.as_ref().ok_or(ClientError::UploadWorkerStopped)?;
        debug!(path = %path.display(), target = %target, "Queueing upload");
        jobs.try_send(UploadJob { path, target }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::UploadQueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::UploadWorkerStopped,
        })
    }

    /// Stop accepting uploads, let the worker finish the queued ones, then
    /// stop the direct-file consumer.
    pub async fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Upload worker panicked");
            }
        }
        if let Some(inbound) = self.inbound.take() {
            inbound.abort();
        }
        if let Some(channel) = self.inbound_channel.take() {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "Closing file consumer channel");
            }
        }
    }
}

async fn upload_worker(
    broker: Arc<dyn Broker>,
    username: String,
    mut jobs: mpsc::Receiver<UploadJob>,
    coordinator: CoordinatorHandle,
) {
    while let Some(job) = jobs.recv().await {
        match upload(broker.as_ref(), &username, &job).await {
            Ok(file_name) => {
                info!(file = %file_name, target = %job.target, "File sent");
                coordinator.post(InboundEvent::FileSent {
                    target: job.target,
                    file_name,
                });
            }
            Err(e) => {
                warn!(path = %job.path.display(), target = %job.target, error = %e, "Upload failed");
                coordinator.post(InboundEvent::FileFailed {
                    target: job.target,
                    path: job.path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    debug!("Upload worker stopped");
}

/// Read, encode and publish one file on a channel of its own.
async fn upload(broker: &dyn Broker, username: &str, job: &UploadJob) -> Result<String> {
    let file_name = job
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::InvalidPath(job.path.display().to_string()))?
        .to_string();
    let body = tokio::fs::read(&job.path).await?;

    let payload = Payload::file(
        username,
        Recipient::from(job.target.clone()),
        &now(),
        file_name.clone(),
        mime_type(&job.path),
        body,
    );
    let bytes = payload.to_bytes()?;

    let channel = broker.open_channel().await?;
    let published = publish_file(channel.as_ref(), &job.target, bytes).await;
    if let Err(e) = channel.close().await {
        debug!(error = %e, "Closing upload channel");
    }
    published?;
    Ok(file_name)
}

async fn publish_file(channel: &dyn BrokerChannel, target: &Address, body: Vec<u8>) -> Result<()> {
    match target {
        Address::User(user) => {
            let queue = user_files_queue(user);
            channel.declare_queue(&queue).await?;
            channel.publish(DEFAULT_EXCHANGE, &queue, body).await?;
        }
        Address::Group(group) => {
            let exchange = group_files_exchange(group);
            channel.declare_fanout_exchange(&exchange).await?;
            channel.publish(&exchange, BROADCAST_ROUTING_KEY, body).await?;
        }
    }
    Ok(())
}

fn mime_type(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_MIME_TYPE)
}
