//! Wires one client together and runs the coordinator loop.
//!
//! The coordinator is the only place controller state is touched: user
//! input lines and [`InboundEvent`]s posted by consumers and the upload
//! worker are handled one at a time, in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use tocka_broker::{Broker, ControlPlane};
use tocka_shared::Address;

use crate::channel::ChannelSlot;
use crate::config::ClientConfig;
use crate::controller::AddressController;
use crate::downloads::DownloadStore;
use crate::error::{ClientError, Result};
use crate::events::{coordinator_channel, InboundEvent};
use crate::files::FileTransferPipeline;
use crate::groups::GroupDirectory;
use crate::inbound::InboundSubscriptionManager;
use crate::router::Router;
use crate::view::ChatView;

/// Input line that ends the session.
pub const QUIT_COMMAND: &str = "/quit";

pub struct Session<V: ChatView> {
    controller: AddressController<V>,
    events: mpsc::UnboundedReceiver<InboundEvent>,
    channel: Arc<ChannelSlot>,
}

impl<V: ChatView> Session<V> {
    /// Declare the user's queues, start every consumer and the upload
    /// worker, and subscribe to the files of groups the user already
    /// belongs to.
    pub async fn start(
        broker: Arc<dyn Broker>,
        control_plane: Option<Arc<dyn ControlPlane>>,
        config: &ClientConfig,
        view: V,
    ) -> Result<Self> {
        let username = config.username.trim();
        if !Address::is_valid_name(username) {
            return Err(ClientError::InvalidUsername(config.username.clone()));
        }

        let (coordinator, events) = coordinator_channel();
        let downloads = DownloadStore::new(&config.download_dir);
        let channel = Arc::new(ChannelSlot::new(broker.clone()));

        let inbound = InboundSubscriptionManager::start(
            broker.clone(),
            username,
            downloads.clone(),
            coordinator.clone(),
        )
        .await?;
        let files = FileTransferPipeline::start(
            broker,
            username,
            downloads,
            coordinator,
            config.upload_queue_capacity,
        )
        .await?;

        let mut controller = AddressController::new(
            username,
            view,
            Router::new(channel.clone()),
            GroupDirectory::new(channel.clone(), control_plane),
            inbound,
            files,
        );
        controller.subscribe_known_groups().await;

        info!(user = %username, downloads = %config.download_dir.display(), "Session started");
        Ok(Self {
            controller,
            events,
            channel,
        })
    }

    pub fn controller(&self) -> &AddressController<V> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut AddressController<V> {
        &mut self.controller
    }

    /// Handle user input and inbound events until `lines` closes or the
    /// user quits, then shut down.
    pub async fn run(&mut self, mut lines: mpsc::Receiver<String>) {
        let prompt = self.controller.current_prompt();
        self.controller.view_mut().show_prompt(&prompt);

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        debug!("Input closed");
                        break;
                    };
                    if line.trim() == QUIT_COMMAND {
                        break;
                    }
                    self.controller.process_input(&line).await;
                    let prompt = self.controller.current_prompt();
                    self.controller.view_mut().show_prompt(&prompt);
                }
                Some(event) = self.events.recv() => {
                    self.controller.handle_event(event).await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Handle the next inbound event, waiting for one if none is queued.
    /// Returns `false` once no more events can arrive.
    pub async fn process_next_event(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.controller.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Let queued uploads finish, then stop consumers and close the shared
    /// channel. Events still pending are handled so their outcome is shown.
    pub async fn shutdown(&mut self) {
        self.controller.shutdown().await;
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_event(event).await;
        }
        self.channel.close().await;
        info!("Session stopped");
    }
}
