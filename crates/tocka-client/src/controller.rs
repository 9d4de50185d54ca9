//! The coordinator-side controller: input dispatch, addressing state,
//! conversation logs and everything rendered to the user.

use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use tocka_shared::timestamp::format_timestamp;
use tocka_shared::Address;

use crate::command::{parse_input, Command, Input};
use crate::conversation::{ChatMessage, Conversations};
use crate::events::InboundEvent;
use crate::files::FileTransferPipeline;
use crate::groups::GroupDirectory;
use crate::inbound::InboundSubscriptionManager;
use crate::router::Router;
use crate::view::ChatView;

pub const NO_TARGET_NOTICE: &str = "define a recipient first with @user or #group";

const PROMPT_SUFFIX: &str = "<< ";

pub struct AddressController<V: ChatView> {
    username: String,
    target: Option<Address>,
    conversations: Conversations,
    view: V,
    router: Router,
    groups: GroupDirectory,
    inbound: InboundSubscriptionManager,
    files: FileTransferPipeline,
}

impl<V: ChatView> AddressController<V> {
    pub fn new(
        username: impl Into<String>,
        view: V,
        router: Router,
        groups: GroupDirectory,
        inbound: InboundSubscriptionManager,
        files: FileTransferPipeline,
    ) -> Self {
        Self {
            username: username.into(),
            target: None,
            conversations: Conversations::default(),
            view,
            router,
            groups,
            inbound,
            files,
        }
    }

    pub fn target(&self) -> Option<&Address> {
        self.target.as_ref()
    }

    pub fn conversation(&self, peer: &Address) -> &[ChatMessage] {
        self.conversations.log(peer)
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn inbound(&self) -> &InboundSubscriptionManager {
        &self.inbound
    }

    /// `<< ` with no target, otherwise e.g. `@bob<< `.
    pub fn current_prompt(&self) -> String {
        match &self.target {
            Some(target) => format!("{target}{PROMPT_SUFFIX}"),
            None => PROMPT_SUFFIX.to_string(),
        }
    }

    fn notify(&mut self, text: &str) {
        self.view.append_notification(text);
    }

    pub async fn process_input(&mut self, raw: &str) {
        let input = match parse_input(raw) {
            Ok(input) => input,
            Err(e) => {
                self.notify(&e.to_string());
                return;
            }
        };

        match input {
            Input::Empty => {}
            Input::Target(address) => {
                debug!(target = %address, "Target selected");
                self.target = Some(address);
            }
            Input::Command(command) => self.run_command(command).await,
            Input::Text(text) => self.send_text(text).await,
        }
    }

    async fn send_text(&mut self, text: String) {
        let Some(target) = self.target.clone() else {
            self.notify(NO_TARGET_NOTICE);
            return;
        };

        let message = ChatMessage::new(self.username.clone(), target.clone(), text);
        if let Err(e) = self.router.send(&message).await {
            warn!(target = %target, error = %e, "Message not sent");
            self.notify(&format!("message to {target} failed: {e}"));
            return;
        }

        self.view.append_message(&format!(
            "({}) You sent: {}",
            message.formatted_time(),
            message.content
        ));
        self.conversations.append(target.clone(), message);
        self.notify(&format!("message sent to {target}"));
    }

    async fn run_command(&mut self, command: Command) {
        match command {
            Command::AddGroup { group } => match self.groups.create_group(&group).await {
                Ok(()) => {
                    self.notify(&format!("group created: {group}"));
                    self.subscribe_group_files(&group).await;
                }
                Err(e) => self.notify(&format!("failed to create group {group}: {e}")),
            },
            Command::AddUser { user, group } => match self.groups.add_user(&user, &group).await {
                Ok(()) => {
                    self.notify(&format!("user {user} added to group {group}"));
                    if user == self.username {
                        self.subscribe_group_files(&group).await;
                    }
                }
                Err(e) => self.notify(&format!("failed to add {user} to {group}: {e}")),
            },
            Command::RemoveUser { user, group } => {
                match self.groups.remove_user_from_group(&user, &group).await {
                    Ok(()) => self.notify(&format!("user {user} removed from group {group}")),
                    Err(e) => self.notify(&format!("failed to remove {user} from {group}: {e}")),
                }
            }
            Command::Upload { path } => self.upload(&path),
            Command::ListUsers { group } => match self.groups.list_users_in_group(&group).await {
                Ok(users) => self.notify(&format!("users in #{group}: {}", render_list(&users))),
                Err(e) => self.notify(&format!("failed to list users of {group}: {e}")),
            },
            Command::ListGroups { user } => {
                let user = user.unwrap_or_else(|| self.username.clone());
                match self.groups.list_groups_for_user(&user).await {
                    Ok(groups) => {
                        self.notify(&format!("groups of @{user}: {}", render_list(&groups)))
                    }
                    Err(e) => self.notify(&format!("failed to list groups of {user}: {e}")),
                }
            }
        }
    }

    fn upload(&mut self, path: &str) {
        if !Path::new(path).exists() {
            self.notify(&format!("file not found: {path}"));
            return;
        }
        let Some(target) = self.target.clone() else {
            self.notify(NO_TARGET_NOTICE);
            return;
        };

        let queued = match &target {
            Address::User(user) => self.files.send_file(user, path),
            Address::Group(group) => self.files.send_file_to_group(group, path),
        };
        match queued {
            Ok(()) => self.notify(&format!("Sending \"{path}\" to {target}.")),
            Err(e) => self.notify(&format!("upload of \"{path}\" not queued: {e}")),
        }
    }

    async fn subscribe_group_files(&mut self, group: &str) {
        if let Err(e) = self.inbound.subscribe_to_group_files(group).await {
            warn!(group = %group, error = %e, "Group file subscription failed");
        }
    }

    /// Subscribe to the file exchange of every group the user belongs to.
    /// Only possible with a control plane; failures are logged.
    pub async fn subscribe_known_groups(&mut self) {
        let groups = match self.groups.list_groups_for_user(&self.username).await {
            Ok(groups) => groups,
            Err(e) => {
                debug!(error = %e, "Cannot list own groups");
                return;
            }
        };
        for group in &groups {
            self.subscribe_group_files(group).await;
        }
        info!(count = groups.len(), "Subscribed to known groups");
    }

    pub async fn receive_message(
        &mut self,
        sender: String,
        group: Option<String>,
        content: String,
        timestamp: NaiveDateTime,
    ) {
        let time = format_timestamp(&timestamp);
        let line = match &group {
            Some(group) => format!("({time}) {sender}#{group} says: {content}"),
            None => format!("({time}) @{sender} says: {content}"),
        };
        self.view.append_message(&line);
        self.notify(&format!("message received from {sender}"));

        let consumer = match &group {
            Some(group) => Address::Group(group.clone()),
            None => Address::User(self.username.clone()),
        };
        let message = ChatMessage::with_timestamp(sender.clone(), consumer, content, timestamp);
        self.conversations.append(Address::User(sender), message);

        if let Some(group) = group {
            if !self.inbound.is_subscribed(&group) {
                self.subscribe_group_files(&group).await;
            }
        }
    }

    pub fn receive_file(&mut self, sender: &str, file_name: &str, timestamp: NaiveDateTime) {
        self.view.append_message(&format!(
            "({}) file \"{file_name}\" received from @{sender}!",
            format_timestamp(&timestamp)
        ));
        self.notify(&format!("file received from {sender}"));
    }

    pub fn file_sent(&mut self, target: &Address, file_name: &str) {
        self.notify(&format!("file \"{file_name}\" was sent to {target}!"));
    }

    pub fn file_failed(&mut self, target: &Address, path: &str, error: &str) {
        self.notify(&format!("file \"{path}\" could not be sent to {target}: {error}"));
    }

    pub async fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::MessageReceived {
                sender,
                group,
                content,
                timestamp,
            } => self.receive_message(sender, group, content, timestamp).await,
            InboundEvent::FileReceived {
                sender,
                file_name,
                timestamp,
            } => self.receive_file(&sender, &file_name, timestamp),
            InboundEvent::FileSent { target, file_name } => self.file_sent(&target, &file_name),
            InboundEvent::FileFailed {
                target,
                path,
                error,
            } => self.file_failed(&target, &path, &error),
        }
    }

    /// Drain queued uploads and stop every consumer.
    pub async fn shutdown(&mut self) {
        self.files.shutdown().await;
        self.inbound.shutdown().await;
    }
}

fn render_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::channel::ChannelSlot;
    use crate::downloads::DownloadStore;
    use crate::events::coordinator_channel;
    use crate::view::BufferedView;
    use tocka_broker::{Broker, MemoryBroker};
    use tocka_shared::timestamp::parse_timestamp;

    async fn controller(broker: &MemoryBroker, dir: &Path) -> AddressController<BufferedView> {
        let shared: Arc<dyn Broker> = Arc::new(broker.clone());
        let slot = Arc::new(ChannelSlot::new(shared.clone()));
        let (handle, _events) = coordinator_channel();
        let downloads = DownloadStore::new(dir);
        let inbound = InboundSubscriptionManager::start(shared.clone(), "alice", downloads.clone(), handle.clone())
            .await
            .unwrap();
        let files = FileTransferPipeline::start(shared, "alice", downloads, handle, 4)
            .await
            .unwrap();
        AddressController::new(
            "alice",
            BufferedView::new(),
            Router::new(slot.clone()),
            GroupDirectory::new(slot, Some(Arc::new(broker.clone()))),
            inbound,
            files,
        )
    }

    #[tokio::test]
    async fn test_prompt_follows_target() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;

        assert_eq!(ctl.current_prompt(), "<< ");
        ctl.process_input("@bob").await;
        assert_eq!(ctl.current_prompt(), "@bob<< ");
        ctl.process_input("#team").await;
        assert_eq!(ctl.current_prompt(), "#team<< ");
        assert_eq!(ctl.target(), Some(&Address::Group("team".into())));
    }

    #[tokio::test]
    async fn test_text_without_target_is_rejected() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;

        ctl.process_input("hello").await;
        assert_eq!(ctl.view().last_notification(), Some(NO_TARGET_NOTICE));
        assert!(ctl.view().messages().is_empty());
    }

    #[tokio::test]
    async fn test_sent_message_is_logged_under_target() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;

        ctl.process_input("@bob").await;
        ctl.process_input("hello").await;

        let bob = Address::User("bob".into());
        assert_eq!(ctl.conversation(&bob).len(), 1);
        assert!(ctl.view().messages().ends_with("You sent: hello"));
        assert_eq!(ctl.view().last_notification(), Some("message sent to @bob"));
        assert_eq!(broker.pending("bob"), Some(1));
    }

    #[tokio::test]
    async fn test_unknown_group_does_not_break_later_commands() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;

        ctl.process_input("#ghost").await;
        ctl.process_input("anyone?").await;

        ctl.process_input("!addGroup ghost").await;
        assert_eq!(ctl.view().last_notification(), Some("group created: ghost"));
        ctl.process_input("@bob").await;
        ctl.process_input("hello").await;
        assert_eq!(ctl.view().last_notification(), Some("message sent to @bob"));
        assert_eq!(broker.pending("bob"), Some(1));
    }

    #[tokio::test]
    async fn test_add_group_subscribes_own_files() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;

        ctl.process_input("!addGroup team").await;
        assert_eq!(ctl.view().last_notification(), Some("group created: team"));
        assert!(ctl.inbound().is_subscribed("team"));
        assert!(broker.has_exchange("team"));
        assert!(broker.has_exchange("team_files"));
    }

    #[tokio::test]
    async fn test_group_message_triggers_subscription() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;
        let ts = parse_timestamp("03/02/2024 at 09:15").unwrap();

        ctl.receive_message("bob".into(), Some("team".into()), "standup".into(), ts)
            .await;

        assert_eq!(
            ctl.view().message_lines(),
            vec!["(03/02/2024 at 09:15) bob#team says: standup"]
        );
        assert_eq!(ctl.view().last_notification(), Some("message received from bob"));
        assert_eq!(ctl.conversation(&Address::User("bob".into())).len(), 1);
        assert!(ctl.inbound().is_subscribed("team"));
    }

    #[tokio::test]
    async fn test_file_notifications() {
        let broker = MemoryBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(&broker, dir.path()).await;
        let ts = parse_timestamp("03/02/2024 at 09:15").unwrap();

        ctl.receive_file("bob", "report_1.pdf", ts);
        assert_eq!(
            ctl.view().message_lines(),
            vec!["(03/02/2024 at 09:15) file \"report_1.pdf\" received from @bob!"]
        );
        assert_eq!(ctl.view().last_notification(), Some("file received from bob"));

        ctl.file_sent(&Address::Group("team".into()), "x.txt");
        assert_eq!(
            ctl.view().last_notification(),
            Some("file \"x.txt\" was sent to #team!")
        );
    }
}
