//! The single ordered outbound stream and its line-delimited JSON framing.
//!
//! ```text
//! {"command":"setData","nodes":[...],"links":[...],"isCustomRoot":false}
//! {"command":"openFile","path":"/w/src/main.rs"}
//! {"command":"showError","message":"already exists: /w/a.ts"}
//! ```
//!
//! Sink messages and host commands share the `command` discriminator and
//! never collide on its value, so one stream carries both.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use st_core::{SinkMessage, UiMessage};

/// An effect the host performs outside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    /// Open a file in the editor.
    OpenFile {
        /// The file to open.
        path: Utf8PathBuf,
    },
    /// Show an error to the user.
    ShowError {
        /// Human-readable description.
        message: String,
    },
}

/// Everything the session emits, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    /// A graph mutation or hint for the sink.
    Sink(SinkMessage),
    /// A host-side effect.
    Host(HostCommand),
}

impl Outbound {
    /// Wire name of the message, for logging.
    #[must_use]
    pub const fn command(&self) -> &'static str {
        match self {
            Self::Sink(msg) => msg.command(),
            Self::Host(HostCommand::OpenFile { .. }) => "openFile",
            Self::Host(HostCommand::ShowError { .. }) => "showError",
        }
    }

    /// Returns the sink message, if this is one.
    #[must_use]
    pub const fn as_sink(&self) -> Option<&SinkMessage> {
        match self {
            Self::Sink(msg) => Some(msg),
            Self::Host(_) => None,
        }
    }
}

impl From<SinkMessage> for Outbound {
    fn from(msg: SinkMessage) -> Self {
        Self::Sink(msg)
    }
}

impl From<HostCommand> for Outbound {
    fn from(cmd: HostCommand) -> Self {
        Self::Host(cmd)
    }
}

/// Parses one inbound line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns the JSON error for malformed or unknown messages.
pub fn decode_line(line: &str) -> Result<Option<UiMessage>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Serializes one outbound message as a single line, without the newline.
///
/// # Errors
///
/// Returns the JSON error if serialization fails.
pub fn encode_line(msg: &Outbound) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

#[cfg(test)]
mod tests {
    use st_core::{NodeAction, NodeId};

    use super::*;

    #[test]
    fn test_host_commands_share_the_discriminator() {
        let open = Outbound::from(HostCommand::OpenFile {
            path: "/w/a.ts".into(),
        });
        assert_eq!(
            encode_line(&open).expect("encode"),
            r#"{"command":"openFile","path":"/w/a.ts"}"#
        );
        assert_eq!(open.command(), "openFile");

        let error = Outbound::from(HostCommand::ShowError {
            message: "boom".to_owned(),
        });
        assert_eq!(
            encode_line(&error).expect("encode"),
            r#"{"command":"showError","message":"boom"}"#
        );
    }

    #[test]
    fn test_sink_messages_pass_through() {
        let msg = Outbound::from(SinkMessage::FocusNode {
            id: NodeId::new("/w/a.ts"),
        });
        assert_eq!(
            encode_line(&msg).expect("encode"),
            r#"{"command":"focusNode","id":"/w/a.ts"}"#
        );
        assert!(msg.as_sink().is_some());

        let decoded: Outbound =
            serde_json::from_str(r#"{"command":"removeNode","id":"/w/a.ts"}"#).expect("decode");
        assert_eq!(
            decoded,
            Outbound::Sink(SinkMessage::RemoveNode {
                id: NodeId::new("/w/a.ts")
            })
        );
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line("   ").expect("blank"), None);
        assert_eq!(
            decode_line(r#"{"command":"ready"}"#).expect("ready"),
            Some(UiMessage::Ready)
        );
        assert_eq!(
            decode_line(r#"{"command":"nodeAction","action":"rename","path":"/w/a","name":"b"}"#)
                .expect("action"),
            Some(UiMessage::NodeAction {
                action: NodeAction::Rename,
                path: "/w/a".into(),
                name: Some("b".to_owned()),
            })
        );
        assert!(decode_line(r#"{"command":"explode"}"#).is_err());
        assert!(decode_line("not json").is_err());
    }
}
