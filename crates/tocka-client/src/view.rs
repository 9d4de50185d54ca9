//! Text sinks the controller renders into.
//!
//! The display layer supplies two append-only sinks: one for conversation
//! lines and one for short notifications.

use std::io::Write;

pub trait ChatView: Send {
    fn append_message(&mut self, text: &str);

    fn append_notification(&mut self, text: &str);

    /// Called after each processed input with the prompt to show next.
    fn show_prompt(&mut self, _prompt: &str) {}
}

/// Keeps both sinks as newline-joined text.
#[derive(Debug, Default, Clone)]
pub struct BufferedView {
    messages: String,
    notifications: String,
}

impl BufferedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &str {
        &self.messages
    }

    pub fn message_lines(&self) -> Vec<&str> {
        self.messages.lines().collect()
    }

    pub fn last_notification(&self) -> Option<&str> {
        self.notifications.lines().last()
    }
}

fn append_line(buffer: &mut String, text: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(text);
}

impl ChatView for BufferedView {
    fn append_message(&mut self, text: &str) {
        append_line(&mut self.messages, text);
    }

    fn append_notification(&mut self, text: &str) {
        append_line(&mut self.notifications, text);
    }
}

/// Writes both sinks to stdout, notifications marked with `*`.
#[derive(Debug, Default)]
pub struct ConsoleView;

impl ConsoleView {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout leaves nowhere to report to.
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }
}

impl ChatView for ConsoleView {
    fn append_message(&mut self, text: &str) {
        self.write(text);
    }

    fn append_notification(&mut self, text: &str) {
        self.write(&format!("* {text}"));
    }

    fn show_prompt(&mut self, prompt: &str) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{prompt}");
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_view_joins_lines() {
        let mut view = BufferedView::new();
        view.append_message("one");
        view.append_message("two");
        view.append_notification("note");

        assert_eq!(view.messages(), "one\ntwo");
        assert_eq!(view.message_lines(), vec!["one", "two"]);
        assert_eq!(view.last_notification(), Some("note"));
    }
}
