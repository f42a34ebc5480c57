//! IMPv2 message encoding and decoding
//!
//! The wire format is a single ASCII line, terminated by a carriage return:
//!
//! ```text
//! SENDER>RECIPIENT [TYPE:] body\r
//! ```
//!
//! The `TYPE:` token is optional; a message without one is an implicit
//! REQUEST. Decoding is deliberately tolerant: junk datagrams are returned as
//! *invalid* messages with the parsed fields reset rather than rejected, so
//! the agent can always cache and report what actually arrived on the wire.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

/// Terminator appended to every encoded message.
pub const TERMINATOR: char = '\r';

/// Message classification carried by the optional `TYPE:` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Implicit default: a command or query expecting a reply.
    Request,
    /// A command that must be executed immediately.
    Exec,
    /// Successful completion of a previous request.
    Done,
    /// Interim progress report.
    Status,
    /// Recoverable problem report.
    Warning,
    /// Failed completion of a previous request.
    Error,
    /// Unrecoverable fault; the sender is going down.
    Fatal,
    /// Placeholder used when a datagram could not be parsed.
    Unknown,
}

static KIND_TOKENS: Lazy<HashMap<&'static str, MessageKind>> = Lazy::new(|| {
    HashMap::from([
        ("REQ:", MessageKind::Request),
        ("EXEC:", MessageKind::Exec),
        ("DONE:", MessageKind::Done),
        ("STATUS:", MessageKind::Status),
        ("WARNING:", MessageKind::Warning),
        ("ERROR:", MessageKind::Error),
        ("FATAL:", MessageKind::Fatal),
    ])
});

impl MessageKind {
    /// Wire token for this kind, or `None` when the kind is implicit
    /// (REQUEST) or has no wire form (Unknown).
    pub fn token(self) -> Option<&'static str> {
        match self {
            MessageKind::Request | MessageKind::Unknown => None,
            MessageKind::Exec => Some("EXEC:"),
            MessageKind::Done => Some("DONE:"),
            MessageKind::Status => Some("STATUS:"),
            MessageKind::Warning => Some("WARNING:"),
            MessageKind::Error => Some("ERROR:"),
            MessageKind::Fatal => Some("FATAL:"),
        }
    }

    /// Match a wire token (e.g. `"done:"`) case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        KIND_TOKENS
            .get(token.to_ascii_uppercase().as_str())
            .copied()
    }
}

/// One IMPv2 message, immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub kind: MessageKind,
    pub body: String,
}

/// Outcome of decoding one datagram.
///
/// `valid == false` means the line failed address validation; the message
/// fields are reset (empty sender/recipient, kind Unknown) but the datagram
/// is still delivered so the agent can log what arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub message: Message,
    pub valid: bool,
}

/// Encoding failures
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("message sender is empty")]
    EmptySender,
    #[error("message recipient is empty")]
    EmptyRecipient,
}

impl Message {
    pub fn new(sender: &str, recipient: &str, kind: MessageKind, body: &str) -> Self {
        Message {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            kind,
            body: body.to_string(),
        }
    }

    /// Convenience constructor for the implicit-REQUEST case.
    pub fn request(sender: &str, recipient: &str, body: &str) -> Self {
        Message::new(sender, recipient, MessageKind::Request, body)
    }

    /// Render the message in wire form, `\r`-terminated.
    ///
    /// The recipient is normalized to upper case; an empty body is legal
    /// (implicit-REQUEST ping).
    pub fn encode(&self) -> Result<String, EncodeError> {
        if self.sender.is_empty() {
            return Err(EncodeError::EmptySender);
        }
        if self.recipient.is_empty() {
            return Err(EncodeError::EmptyRecipient);
        }

        let mut wire = format!("{}>{}", self.sender, self.recipient.to_ascii_uppercase());
        if let Some(token) = self.kind.token() {
            wire.push(' ');
            wire.push_str(token);
        }
        if !self.body.is_empty() {
            wire.push(' ');
            wire.push_str(&self.body);
        }
        wire.push(TERMINATOR);
        Ok(wire)
    }

    /// Parse one wire line.
    ///
    /// Never fails: junk input comes back as an invalid `Decoded` with the
    /// fields reset. Leading/trailing whitespace and line terminators are
    /// stripped before parsing.
    pub fn decode(wire: &str) -> Decoded {
        let line = wire.trim();

        let (address, rest) = match line.split_once(' ') {
            Some((address, rest)) => (address, rest.trim_start()),
            None => (line, ""),
        };

        // The address token must contain exactly one '>'.
        if address.matches('>').count() != 1 {
            return Decoded {
                message: Message::new("", "", MessageKind::Unknown, ""),
                valid: false,
            };
        }

        let (sender, recipient) = address.split_once('>').unwrap_or(("", ""));
        if sender.is_empty() || recipient.is_empty() {
            return Decoded {
                message: Message::new("", "", MessageKind::Unknown, ""),
                valid: false,
            };
        }

        // An unrecognized first token is not an error: it is the first word
        // of an implicit-REQUEST body.
        let (kind, body) = match rest.split_once(' ') {
            Some((first, remainder)) => match MessageKind::from_token(first) {
                Some(kind) => (kind, remainder.trim_start()),
                None => (MessageKind::Request, rest),
            },
            None => match MessageKind::from_token(rest) {
                Some(kind) => (kind, ""),
                None => (MessageKind::Request, rest),
            },
        };

        Decoded {
            message: Message::new(sender, recipient, kind, body),
            valid: true,
        }
    }
}
