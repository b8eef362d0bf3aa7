//! Message - the unit exchanged between the supervisor and its clients
//!
//! Serializes as `{"Id": "...", "Kind": "stdout", "Body": "..."}` so that a
//! transport can put it on the wire as-is.

use serde::{Deserialize, Serialize};

/// Kind of a message
///
/// `Run` and `Kill` arrive from clients; `Stdout`, `Stderr` and `End` are
/// produced by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Run,
    Kill,
    Stdout,
    Stderr,
    End,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Run => "run",
            MessageKind::Kill => "kill",
            MessageKind::Stdout => "stdout",
            MessageKind::Stderr => "stderr",
            MessageKind::End => "end",
        }
    }

    /// Kinds the supervisor emits for a running process
    pub fn is_output(&self) -> bool {
        matches!(self, MessageKind::Stdout | MessageKind::Stderr)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message about one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    /// Process this message concerns
    pub id: String,

    pub kind: MessageKind,

    /// Output chunk, end error text, or run command line
    #[serde(default)]
    pub body: String,
}

impl Message {
    pub fn new(id: impl Into<String>, kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            body: body.into(),
        }
    }

    /// Run command for `command_line`
    pub fn run(id: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self::new(id, MessageKind::Run, command_line)
    }

    /// Kill request for process `id`
    pub fn kill(id: impl Into<String>) -> Self {
        Self::new(id, MessageKind::Kill, String::new())
    }

    /// Terminal message. An empty body means the process succeeded.
    pub fn end(id: impl Into<String>, error: Option<String>) -> Self {
        Self::new(id, MessageKind::End, error.unwrap_or_default())
    }

    pub fn is_end(&self) -> bool {
        self.kind == MessageKind::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = Message::new("7", MessageKind::Stdout, "hi\n");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"Id":"7","Kind":"stdout","Body":"hi\n"}"#);
    }

    #[test]
    fn test_parse_kill_without_body() {
        let msg: Message = serde_json::from_str(r#"{"Id":"3","Kind":"kill"}"#).unwrap();
        assert_eq!(msg, Message::kill("3"));
    }

    #[test]
    fn test_end_body() {
        assert_eq!(Message::end("1", None).body, "");
        assert_eq!(
            Message::end("1", Some("exit status: 2".into())).body,
            "exit status: 2"
        );
        assert!(Message::end("1", None).is_end());
    }

    #[test]
    fn test_kind_helpers() {
        assert!(MessageKind::Stderr.is_output());
        assert!(!MessageKind::End.is_output());
        assert_eq!(MessageKind::Run.to_string(), "run");
    }
}
