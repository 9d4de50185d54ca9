//! Events posted from broker consumers and the upload worker back to the
//! coordinator, which owns all controller state.

use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tracing::debug;

use tocka_shared::Address;

#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A chat message arrived on the user's queue.
    MessageReceived {
        sender: String,
        /// Set when the message was broadcast to a group.
        group: Option<String>,
        content: String,
        timestamp: NaiveDateTime,
    },

    /// A file was persisted under the downloads directory.
    FileReceived {
        sender: String,
        /// Final (possibly renamed) file name.
        file_name: String,
        timestamp: NaiveDateTime,
    },

    /// An upload job published its file.
    FileSent { target: Address, file_name: String },

    /// An upload job failed and was dropped.
    FileFailed {
        target: Address,
        path: String,
        error: String,
    },
}

/// Posting side of the coordinator's event queue.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<InboundEvent>,
}

impl CoordinatorHandle {
    /// Hand an event to the coordinator. Events posted after the
    /// coordinator stopped are discarded.
    pub fn post(&self, event: InboundEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(event = ?e.0, "Coordinator gone, dropping event");
        }
    }
}

pub fn coordinator_channel() -> (CoordinatorHandle, mpsc::UnboundedReceiver<InboundEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CoordinatorHandle { tx }, rx)
}
