//! Group lifecycle and membership.
//!
//! A group is a fan-out exchange named after it; membership is the set of
//! user queues bound to that exchange. Nothing is cached locally: listings
//! are read back from the broker's control plane.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tocka_broker::{groups_from_bindings, members_from_bindings, ControlPlane, ControlPlaneError};
use tocka_shared::naming::{group_exchange, group_files_exchange, group_files_queue, user_queue};

use crate::channel::ChannelSlot;
use crate::error::Result;

pub struct GroupDirectory {
    channel: Arc<ChannelSlot>,
    control_plane: Option<Arc<dyn ControlPlane>>,
}

impl GroupDirectory {
    pub fn new(channel: Arc<ChannelSlot>, control_plane: Option<Arc<dyn ControlPlane>>) -> Self {
        Self {
            channel,
            control_plane,
        }
    }

    /// Declare the group's exchange. Creating an existing group is a no-op.
    pub async fn create_group(&self, group: &str) -> Result<()> {
        let exchange = group_exchange(group);
        self.channel
            .run(|ch| async move { ch.declare_fanout_exchange(&exchange).await })
            .await?;
        info!(group = %group, "Group created");
        Ok(())
    }

    /// Bind the user's queue (declared first, so users who never logged in
    /// can be added) to the group's exchange. Fails if the group does not
    /// exist.
    pub async fn add_user(&self, user: &str, group: &str) -> Result<()> {
        let queue = user_queue(user);
        let exchange = group_exchange(group);
        self.channel
            .run(|ch| async move {
                ch.declare_queue(&queue).await?;
                ch.bind_queue(&queue, &exchange).await
            })
            .await?;
        info!(user = %user, group = %group, "User added to group");
        Ok(())
    }

    /// Unbind the user's queue from the group. Messages already delivered
    /// to the queue stay there.
    pub async fn remove_user_from_group(&self, user: &str, group: &str) -> Result<()> {
        let queue = user_queue(user);
        let exchange = group_exchange(group);
        self.channel
            .run(|ch| async move { ch.unbind_queue(&queue, &exchange).await })
            .await?;
        info!(user = %user, group = %group, "User removed from group");

        self.unbind_group_files(user, group).await;
        Ok(())
    }

    /// Stop group file fan-out to a removed member. The per-member file
    /// queue only exists if that member ever subscribed, so this runs on a
    /// throwaway channel and a failure is only logged.
    async fn unbind_group_files(&self, user: &str, group: &str) {
        let queue = group_files_queue(user, group);
        let exchange = group_files_exchange(group);

        let channel = match self.channel.broker().open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "Failed to open channel for file unbind");
                return;
            }
        };
        match channel.unbind_queue(&queue, &exchange).await {
            Ok(()) => debug!(queue = %queue, "Unbound group file queue"),
            Err(e) => debug!(queue = %queue, error = %e, "Group file queue not unbound"),
        }
        // The channel may already be closed by the failed unbind.
        let _ = channel.close().await;
    }

    fn control_plane(&self) -> std::result::Result<&Arc<dyn ControlPlane>, ControlPlaneError> {
        self.control_plane.as_ref().ok_or(ControlPlaneError::NotConfigured)
    }

    /// Users currently bound to the group, sorted.
    pub async fn list_users_in_group(&self, group: &str) -> Result<Vec<String>> {
        let bindings = self
            .control_plane()?
            .exchange_bindings(&group_exchange(group))
            .await?;
        Ok(members_from_bindings(&bindings))
    }

    /// Groups the user's queue is bound to, sorted.
    pub async fn list_groups_for_user(&self, user: &str) -> Result<Vec<String>> {
        let bindings = self
            .control_plane()?
            .queue_bindings(&user_queue(user))
            .await?;
        Ok(groups_from_bindings(&bindings))
    }
}
