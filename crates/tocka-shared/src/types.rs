use serde::{Deserialize, Serialize};

use crate::constants::FILES_SUFFIX;

/// A logical chat address: `@user` for direct messages, `#group` for
/// group broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Address {
    User(String),
    Group(String),
}

impl Address {
    pub const USER_PREFIX: char = '@';
    pub const GROUP_PREFIX: char = '#';

    /// Parse `@name` or `#name`. Returns `None` for any other prefix or a
    /// name rejected by [`Address::is_valid_name`].
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let mut chars = raw.chars();
        let prefix = chars.next()?;
        let name = chars.as_str().trim();
        if !Self::is_valid_name(name) {
            return None;
        }
        match prefix {
            Self::USER_PREFIX => Some(Self::User(name.to_string())),
            Self::GROUP_PREFIX => Some(Self::Group(name.to_string())),
            _ => None,
        }
    }

    /// A user or group name is one non-empty word. Names ending in
    /// `_files` are reserved for the file queues and exchanges.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && !name.chars().any(char::is_whitespace) && !name.ends_with(FILES_SUFFIX)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(name) | Self::Group(name) => name,
        }
    }

    pub fn prefix(&self) -> char {
        match self {
            Self::User(_) => Self::USER_PREFIX,
            Self::Group(_) => Self::GROUP_PREFIX,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix(), self.name())
    }
}
