//! User input grammar.
//!
//! A line is one of: `@user` / `#group` (select a target), `!<tag> args...`
//! (a command), or message text. Commands are tokenized and the first token
//! must equal a known tag exactly; each tag has a fixed arity.

use std::fmt;

use tocka_shared::Address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddGroup { group: String },
    AddUser { user: String, group: String },
    RemoveUser { user: String, group: String },
    /// The path is the rest of the line, so it may contain spaces.
    Upload { path: String },
    ListUsers { group: String },
    /// Without a user, lists the local user's groups.
    ListGroups { user: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Target(Address),
    Command(Command),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    /// `@` or `#` with no name, several words or a reserved name.
    InvalidAddress,
    /// Unknown tag or wrong argument count.
    InvalidCommand,
    /// `!upload` without a path.
    MissingUploadPath,
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress => write!(f, "invalid address: use @user or #group"),
            Self::InvalidCommand => write!(f, "invalid command"),
            Self::MissingUploadPath => write!(f, "invalid command: use !upload /path/to/file"),
        }
    }
}

pub const COMMAND_PREFIX: char = '!';

pub fn parse_input(raw: &str) -> Result<Input, InputError> {
    let line = raw.trim();
    let Some(first) = line.chars().next() else {
        return Ok(Input::Empty);
    };

    match first {
        Address::USER_PREFIX | Address::GROUP_PREFIX => Address::parse(line)
            .map(Input::Target)
            .ok_or(InputError::InvalidAddress),
        COMMAND_PREFIX => parse_command(&line[first.len_utf8()..]).map(Input::Command),
        _ => Ok(Input::Text(line.to_string())),
    }
}

fn parse_command(body: &str) -> Result<Command, InputError> {
    let body = body.trim();
    let (tag, rest) = body
        .split_once(char::is_whitespace)
        .unwrap_or((body, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    // Every argument except an upload path names a user or group.
    if tag != "upload" && !args.iter().all(|a| Address::is_valid_name(a)) {
        return Err(InputError::InvalidCommand);
    }

    match (tag, args.as_slice()) {
        ("addGroup", [group]) => Ok(Command::AddGroup {
            group: group.to_string(),
        }),
        ("addUser", [user, group]) => Ok(Command::AddUser {
            user: user.to_string(),
            group: group.to_string(),
        }),
        ("removeUser", [user, group]) => Ok(Command::RemoveUser {
            user: user.to_string(),
            group: group.to_string(),
        }),
        ("upload", []) => Err(InputError::MissingUploadPath),
        ("upload", _) => Ok(Command::Upload {
            path: rest.to_string(),
        }),
        ("listUsers", [group]) => Ok(Command::ListUsers {
            group: group.to_string(),
        }),
        ("listGroups", []) => Ok(Command::ListGroups { user: None }),
        ("listGroups", [user]) => Ok(Command::ListGroups {
            user: Some(user.to_string()),
        }),
        _ => Err(InputError::InvalidCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(raw: &str) -> Result<Command, InputError> {
        match parse_input(raw)? {
            Input::Command(c) => Ok(c),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_is_empty() {
        assert_eq!(parse_input("   "), Ok(Input::Empty));
        assert_eq!(parse_input(""), Ok(Input::Empty));
    }

    #[test]
    fn test_targets() {
        assert_eq!(
            parse_input("  @bob "),
            Ok(Input::Target(Address::User("bob".into())))
        );
        assert_eq!(
            parse_input("#team"),
            Ok(Input::Target(Address::Group("team".into())))
        );
        assert_eq!(parse_input("@"), Err(InputError::InvalidAddress));
    }

    #[test]
    fn test_file_queue_names_are_not_targets() {
        assert_eq!(parse_input("@bob_files"), Err(InputError::InvalidAddress));
        assert_eq!(parse_input("@bob smith"), Err(InputError::InvalidAddress));
        assert_eq!(command("!addUser bob_files team"), Err(InputError::InvalidCommand));
        assert_eq!(command("!listUsers team_files"), Err(InputError::InvalidCommand));
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(parse_input("  hello  "), Ok(Input::Text("hello".into())));
    }

    #[test]
    fn test_add_user_arity() {
        assert_eq!(command("!addUser alice"), Err(InputError::InvalidCommand));
        assert_eq!(
            command("!addUser alice team extra"),
            Err(InputError::InvalidCommand)
        );
        assert_eq!(
            command("!addUser alice team"),
            Ok(Command::AddUser {
                user: "alice".into(),
                group: "team".into()
            })
        );
    }

    #[test]
    fn test_remove_user_arity() {
        assert_eq!(command("!removeUser bob"), Err(InputError::InvalidCommand));
        assert_eq!(
            command("!removeUser bob team"),
            Ok(Command::RemoveUser {
                user: "bob".into(),
                group: "team".into()
            })
        );
    }

    #[test]
    fn test_add_group() {
        assert_eq!(
            command("!addGroup team"),
            Ok(Command::AddGroup {
                group: "team".into()
            })
        );
        assert_eq!(command("!addGroup"), Err(InputError::InvalidCommand));
    }

    #[test]
    fn test_tags_match_exactly() {
        // A tag merely containing a known command is not that command.
        assert_eq!(command("!reupload x"), Err(InputError::InvalidCommand));
        assert_eq!(command("!addgroup team"), Err(InputError::InvalidCommand));
        assert_eq!(command("!"), Err(InputError::InvalidCommand));
    }

    #[test]
    fn test_text_mentioning_commands_is_text() {
        assert_eq!(
            parse_input("please upload the addUser doc"),
            Ok(Input::Text("please upload the addUser doc".into()))
        );
    }

    #[test]
    fn test_upload_keeps_rest_of_line() {
        assert_eq!(
            command("!upload /tmp/my report.pdf"),
            Ok(Command::Upload {
                path: "/tmp/my report.pdf".into()
            })
        );
        assert_eq!(command("!upload   "), Err(InputError::MissingUploadPath));
    }

    #[test]
    fn test_list_commands() {
        assert_eq!(
            command("!listUsers team"),
            Ok(Command::ListUsers {
                group: "team".into()
            })
        );
        assert_eq!(command("!listGroups"), Ok(Command::ListGroups { user: None }));
        assert_eq!(
            command("!listGroups bob"),
            Ok(Command::ListGroups {
                user: Some("bob".into())
            })
        );
        assert_eq!(command("!listUsers"), Err(InputError::InvalidCommand));
    }
}
