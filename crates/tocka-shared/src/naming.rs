//! Broker naming conventions.
//!
//! A user owns exactly one message queue named after them and a
//! `<user>_files` queue for direct file transfers. A group is exactly one
//! fan-out exchange named after it plus a `<group>_files` exchange; each
//! subscribed member drains the latter through its own
//! `<user>_<group>_files` queue. Bindings always use an empty routing key.

use crate::constants::FILES_SUFFIX;

/// Routing key of every binding and every fan-out publish.
pub const BROADCAST_ROUTING_KEY: &str = "";

/// Name of the broker's default (direct-to-queue) exchange.
pub const DEFAULT_EXCHANGE: &str = "";

pub fn user_queue(user: &str) -> String {
    user.to_string()
}

pub fn group_exchange(group: &str) -> String {
    group.to_string()
}

pub fn user_files_queue(user: &str) -> String {
    format!("{user}{FILES_SUFFIX}")
}

pub fn group_files_exchange(group: &str) -> String {
    format!("{group}{FILES_SUFFIX}")
}

pub fn group_files_queue(user: &str, group: &str) -> String {
    format!("{user}_{group}{FILES_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_addresses() {
        assert_eq!(user_queue("alice"), "alice");
        assert_eq!(group_exchange("team"), "team");
    }

    #[test]
    fn test_file_variants() {
        assert_eq!(user_files_queue("alice"), "alice_files");
        assert_eq!(group_files_exchange("team"), "team_files");
        assert_eq!(group_files_queue("alice", "team"), "alice_team_files");
    }
}
