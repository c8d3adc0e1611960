//! Error definitions for docwire
//!
//! Every layer of the stack reports failures through its own family
//! ([`CodecError`], [`FramingError`], [`TransportError`], [`ProtocolError`],
//! [`ServerError`]); [`DocwireError`] wraps them so callers can use a
//! single [`Result`] alias across crate boundaries.

use std::fmt;

use thiserror::Error;

use crate::value::ValueType;

/// Malformed document bytes.
///
/// Codec errors never poison the stream they came from: the message that
/// carried the document has already been framed by its header length.
///
/// # Example
/// ```rust
/// use docwire_common::{CodecError, Document};
///
/// let bytes = [0x09, 0x00, 0x00, 0x00, 0x08, b'b', 0x00, 0x02, 0x00];
/// assert_eq!(Document::from_bytes(&bytes), Err(CodecError::InvalidBoolean(2)));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ran out before the structure being read was complete.
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// A document terminator was found, but bytes remain in its span.
    #[error("expected end of input, but encountered {encountered} more byte(s)")]
    ExpectedEnd { encountered: usize },

    #[error("unrecognized type tag 0x{0:02x}")]
    UnknownType(u8),

    /// A length header is negative, zero where a terminator is required,
    /// or disagrees with the payload it describes.
    #[error("invalid length header ({0})")]
    InvalidLength(i32),

    /// A length-prefixed string does not end with a NUL byte at the
    /// offset implied by its length header.
    #[error("string is not terminated by a NUL byte at its declared length")]
    UnterminatedString,

    #[error("c-string contains an interior NUL byte")]
    InteriorNul,

    #[error("invalid boolean byte ({0})")]
    InvalidBoolean(u8),

    #[error("invalid binary subtype 0x{0:02x}")]
    InvalidBinarySubtype(u8),

    #[error("invalid regex option '{0}'")]
    InvalidRegexOption(char),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(Utf8Context),
}

/// Where an invalid UTF-8 sequence was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Context {
    Key,
    String,
    Regex,
}

impl fmt::Display for Utf8Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Utf8Context::Key => f.write_str("key"),
            Utf8Context::String => f.write_str("string"),
            Utf8Context::Regex => f.write_str("regex"),
        }
    }
}

/// Message-level framing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The message was framed by its header but its operation code is not
    /// one this stack can interpret.
    #[error("invalid or unsupported message operation code ({0})")]
    UnsupportedOpcode(i32),

    #[error("invalid message length ({0})")]
    InvalidMessageLength(i32),

    #[error("message of {length} bytes exceeds the maximum of {max} bytes")]
    MessageTooLarge { length: usize, max: usize },

    #[error("message sets unknown required flag bits (0x{0:08x})")]
    UnknownRequiredFlags(u32),

    #[error("invalid section kind ({0})")]
    InvalidSectionKind(u8),

    #[error("message must contain exactly one body section, found {0}")]
    BodySectionCount(usize),

    #[error("checksum mismatch: message carries 0x{expected:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

/// Transport-level failures: connecting, TLS, reading and writing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// No reply arrived within the query timeout. The connection itself
    /// stays open.
    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(std::time::Duration),

    #[error("connection closed")]
    Closed,
}

/// A reply that does not have the shape a command reply must have.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("reply contained no documents")]
    NoDocuments,

    #[error("reply contained {0} documents, expected exactly one")]
    MultipleDocuments(usize),

    #[error("reply is missing required field '{0}'")]
    MissingField(String),

    #[error("reply status field has unsupported type {0}")]
    InvalidStatusType(ValueType),

    #[error("reply status field has unsupported value {0}")]
    InvalidStatusValue(String),

    #[error("reply contains duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("field '{field}' has type {actual}, expected {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
        actual: ValueType,
    },
}

/// A failure reported by the server in a well-formed reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("server error: {message}")]
pub struct ServerError {
    /// The `errmsg` field, verbatim. Empty when the server omitted it.
    pub message: String,
    pub code: Option<i32>,
    pub code_name: Option<String>,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            code_name: None,
        }
    }
}

/// Represents errors that can occur anywhere in the docwire stack.
///
/// # Example
/// ```rust
/// use docwire_common::{DocwireError, ServerError};
///
/// let error: DocwireError = ServerError::new("ns not found").into();
/// assert_eq!(error.kind(), "server_error");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocwireError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Server(#[from] ServerError),

    /// The server or the local settings cannot support this stack. Never
    /// worth retrying.
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, DocwireError>;

impl DocwireError {
    /// Get a short error kind name
    pub fn kind(&self) -> &'static str {
        match self {
            DocwireError::Codec(_) => "codec_error",
            DocwireError::Framing(_) => "framing_error",
            DocwireError::Transport(_) => "transport_error",
            DocwireError::Protocol(_) => "protocol_error",
            DocwireError::Server(_) => "server_error",
            DocwireError::Configuration(_) => "configuration_error",
        }
    }

    /// Get the error message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            DocwireError::Codec(e) => e.to_string(),
            DocwireError::Framing(e) => e.to_string(),
            DocwireError::Transport(e) => e.to_string(),
            DocwireError::Protocol(e) => e.to_string(),
            DocwireError::Server(e) => e.message.clone(),
            DocwireError::Configuration(msg) => msg.clone(),
        }
    }

    /// True for conditions that will fail the same way on every attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DocwireError::Configuration(_))
    }
}

/// Convert std::io::Error to DocwireError
///
/// Read and write failures from the socket all land here.
impl From<std::io::Error> for DocwireError {
    fn from(err: std::io::Error) -> Self {
        DocwireError::Transport(err.into())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(DocwireError::from(CodecError::UnexpectedEnd).kind(), "codec_error");
        assert_eq!(
            DocwireError::from(FramingError::UnsupportedOpcode(2004)).kind(),
            "framing_error"
        );
        assert_eq!(
            DocwireError::Configuration("missing maxWireVersion".into()).kind(),
            "configuration_error"
        );
    }

    #[test]
    fn test_io_errors_map_to_transport() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(
            DocwireError::from(eof),
            DocwireError::Transport(TransportError::Closed)
        );

        let timeout = TransportError::Timeout(std::time::Duration::from_secs(30));
        assert_eq!(timeout.to_string(), "timed out after 30s waiting for a reply");

        let other = std::io::Error::other("boom");
        assert!(matches!(
            DocwireError::from(other),
            DocwireError::Transport(TransportError::Io(_))
        ));
    }

    #[test]
    fn test_server_error_message_is_verbatim() {
        let error = ServerError::new("  Command failed: $x  ");
        assert_eq!(error.to_string(), "server error:   Command failed: $x  ");
        assert!(!DocwireError::from(error).is_fatal());
    }
}
