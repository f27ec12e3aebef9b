//! Application-level chat message grammar.
//!
//! Chat messages are space-delimited token strings layered on the reliable
//! transport:
//!
//! ```text
//! join <name>                          disconnect <name>
//! request_users_list                   response_users_list <count> <names…>
//! send_message <N> <users…> <text>     forward_message 1 <sender> <text>
//! send_file <N> <users…> <file> <bytes…>
//! forward_file 1 <sender> <file> <bytes…>
//! err_server_full   err_username_unavailable   err_unknown_message
//! ```
//!
//! Splitting is on single spaces and trailing fields are rejoined with
//! single spaces, so message text and file bytes survive the roundtrip
//! byte-for-byte.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Every message the chat client and server exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Join { name: String },
    Disconnect { name: String },
    RequestUsersList,
    ResponseUsersList { users: Vec<String> },
    /// Client → server: deliver `text` to each named user.
    SendMessage { recipients: Vec<String>, text: String },
    /// Server → client: `text` from `from`.
    ForwardMessage { from: String, text: String },
    /// Client → server: deliver the file to each named user.
    SendFile {
        recipients: Vec<String>,
        filename: String,
        content: String,
    },
    /// Server → client: file from `from`.
    ForwardFile {
        from: String,
        filename: String,
        content: String,
    },
    ErrServerFull,
    ErrUsernameUnavailable,
    ErrUnknownMessage,
}

/// Errors that can arise when parsing a chat message.
///
/// The server answers any of these with `err_unknown_message`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatParseError {
    #[error("empty message")]
    Empty,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("recipient count is not an integer")]
    BadCount,
    #[error("message is missing required fields")]
    MissingFields,
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join { name } => write!(f, "join {name}"),
            Self::Disconnect { name } => write!(f, "disconnect {name}"),
            Self::RequestUsersList => f.write_str("request_users_list"),
            Self::ResponseUsersList { users } => {
                write!(f, "response_users_list {}", users.len())?;
                for user in users {
                    write!(f, " {user}")?;
                }
                Ok(())
            }
            Self::SendMessage { recipients, text } => {
                write!(f, "send_message {}", recipients.len())?;
                for user in recipients {
                    write!(f, " {user}")?;
                }
                write!(f, " {text}")
            }
            Self::ForwardMessage { from, text } => write!(f, "forward_message 1 {from} {text}"),
            Self::SendFile {
                recipients,
                filename,
                content,
            } => {
                write!(f, "send_file {}", recipients.len())?;
                for user in recipients {
                    write!(f, " {user}")?;
                }
                write!(f, " {filename} {content}")
            }
            Self::ForwardFile {
                from,
                filename,
                content,
            } => write!(f, "forward_file 1 {from} {filename} {content}"),
            Self::ErrServerFull => f.write_str("err_server_full"),
            Self::ErrUsernameUnavailable => f.write_str("err_username_unavailable"),
            Self::ErrUnknownMessage => f.write_str("err_unknown_message"),
        }
    }
}

impl FromStr for ChatMessage {
    type Err = ChatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ChatParseError::Empty);
        }
        let parts: Vec<&str> = s.split(' ').collect();
        let kind = parts[0];

        match kind {
            "join" => Ok(Self::Join {
                name: field(&parts, 1)?.to_string(),
            }),
            "disconnect" => Ok(Self::Disconnect {
                name: field(&parts, 1)?.to_string(),
            }),
            "request_users_list" => Ok(Self::RequestUsersList),
            "response_users_list" => {
                let count = count_field(&parts)?;
                let users = fields(&parts, 2, count)?;
                Ok(Self::ResponseUsersList { users })
            }
            "send_message" => {
                let count = count_field(&parts)?;
                let recipients = fields(&parts, 2, count)?;
                let text = rest(&parts, 2 + count)?;
                Ok(Self::SendMessage { recipients, text })
            }
            "forward_message" => Ok(Self::ForwardMessage {
                from: field(&parts, 2)?.to_string(),
                text: rest(&parts, 3)?,
            }),
            "send_file" => {
                let count = count_field(&parts)?;
                let recipients = fields(&parts, 2, count)?;
                let filename = field(&parts, 2 + count)?.to_string();
                let content = rest(&parts, 3 + count)?;
                Ok(Self::SendFile {
                    recipients,
                    filename,
                    content,
                })
            }
            "forward_file" => Ok(Self::ForwardFile {
                from: field(&parts, 2)?.to_string(),
                filename: field(&parts, 3)?.to_string(),
                content: rest(&parts, 4)?,
            }),
            "err_server_full" => Ok(Self::ErrServerFull),
            "err_username_unavailable" => Ok(Self::ErrUsernameUnavailable),
            "err_unknown_message" => Ok(Self::ErrUnknownMessage),
            other => Err(ChatParseError::UnknownType(other.to_string())),
        }
    }
}

fn field<'a>(parts: &[&'a str], idx: usize) -> Result<&'a str, ChatParseError> {
    parts.get(idx).copied().ok_or(ChatParseError::MissingFields)
}

fn count_field(parts: &[&str]) -> Result<usize, ChatParseError> {
    field(parts, 1)?
        .parse::<usize>()
        .map_err(|_| ChatParseError::BadCount)
}

fn fields(parts: &[&str], start: usize, count: usize) -> Result<Vec<String>, ChatParseError> {
    if parts.len() < start + count {
        return Err(ChatParseError::MissingFields);
    }
    Ok(parts[start..start + count]
        .iter()
        .map(|s| s.to_string())
        .collect())
}

/// Everything from `start` onwards, rejoined on single spaces. At least one
/// token must be present.
fn rest(parts: &[&str], start: usize) -> Result<String, ChatParseError> {
    if parts.len() <= start {
        return Err(ChatParseError::MissingFields);
    }
    Ok(parts[start..].join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: ChatMessage) {
        assert_eq!(msg.to_string().parse::<ChatMessage>().unwrap(), msg);
    }

    #[test]
    fn simple_messages_roundtrip() {
        roundtrip(ChatMessage::Join {
            name: "alice".into(),
        });
        roundtrip(ChatMessage::Disconnect {
            name: "alice".into(),
        });
        roundtrip(ChatMessage::RequestUsersList);
        roundtrip(ChatMessage::ErrServerFull);
        roundtrip(ChatMessage::ErrUsernameUnavailable);
        roundtrip(ChatMessage::ErrUnknownMessage);
    }

    #[test]
    fn users_list_roundtrips() {
        roundtrip(ChatMessage::ResponseUsersList { users: vec![] });
        roundtrip(ChatMessage::ResponseUsersList {
            users: vec!["bob".into(), "alice".into()],
        });
    }

    #[test]
    fn send_message_wire_format() {
        let msg = ChatMessage::SendMessage {
            recipients: vec!["bob".into(), "carol".into()],
            text: "hello there".into(),
        };
        assert_eq!(msg.to_string(), "send_message 2 bob carol hello there");
        roundtrip(msg);
    }

    #[test]
    fn forward_message_wire_format() {
        let msg = ChatMessage::ForwardMessage {
            from: "alice".into(),
            text: "hi bob".into(),
        };
        assert_eq!(msg.to_string(), "forward_message 1 alice hi bob");
        roundtrip(msg);
    }

    #[test]
    fn file_content_survives_roundtrip() {
        // File bytes may contain repeated spaces and delimiter-looking text.
        let msg = ChatMessage::SendFile {
            recipients: vec!["bob".into()],
            filename: "notes.txt".into(),
            content: "a  b | c:d  ".into(),
        };
        roundtrip(msg.clone());
        let ChatMessage::SendFile { content, .. } =
            msg.to_string().parse::<ChatMessage>().unwrap()
        else {
            panic!("parsed to wrong variant");
        };
        assert_eq!(content, "a  b | c:d  ");
    }

    #[test]
    fn malformed_messages_rejected() {
        assert_eq!("".parse::<ChatMessage>(), Err(ChatParseError::Empty));
        assert!(matches!(
            "frobnicate now".parse::<ChatMessage>(),
            Err(ChatParseError::UnknownType(_))
        ));
        assert_eq!(
            "send_message x bob hi".parse::<ChatMessage>(),
            Err(ChatParseError::BadCount)
        );
        assert_eq!(
            "send_message 2 bob hi".parse::<ChatMessage>(),
            Err(ChatParseError::MissingFields),
            "two recipients promised, one named"
        );
        assert_eq!(
            "send_file 1 bob".parse::<ChatMessage>(),
            Err(ChatParseError::MissingFields)
        );
    }
}
