//! Error types for the event socket client

use crate::constants::CONTENT_TYPE_COMMAND_REPLY;
use crate::event::EslEvent;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Everything that can go wrong while talking to the event socket.
///
/// Framing errors leave the byte stream in an unknown position; once one is
/// returned the session drops its connection (see [`EslError::is_fatal`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// TCP connect did not complete in time.
    #[error("connect timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A header line could not be parsed.
    #[error("malformed header line: {line:?}")]
    MalformedHeader { line: String },

    /// `Content-Length` is not a usable byte count.
    #[error("malformed Content-Length: {value:?}")]
    MalformedLength { value: String },

    /// An event body line could not be split or percent-decoded.
    ///
    /// `partial` holds every header decoded before the failing line.
    #[error("failed to decode event body: {reason}")]
    Decode {
        reason: String,
        partial: Box<EslEvent>,
    },

    /// The stream ended before `Content-Length` bytes arrived.
    #[error("truncated body: expected {expected} bytes, received {received}")]
    TruncatedBody { expected: usize, received: usize },

    /// A message matching none of the known framings.
    #[error("unexpected message (Content-Type: {content_type:?}, Reply-Text: {reply_text:?})")]
    UnexpectedMessage {
        content_type: Option<String>,
        reply_text: Option<String>,
    },

    /// The `auth` command was not accepted.
    #[error("authentication failed: {reply_text}")]
    Authentication { reply_text: String },

    /// A command was rejected or answered with the wrong kind of reply.
    #[error("command failed: {reply_text}")]
    Command { reply_text: String },

    /// Operation requires an authenticated session.
    #[error("session is not connected")]
    NotConnected,

    /// `connect` called on an authenticated session.
    #[error("session is already connected")]
    AlreadyConnected,

    /// A user-supplied argument would corrupt the wire format.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl EslError {
    pub(crate) fn auth_failed(reply_text: impl Into<String>) -> Self {
        EslError::Authentication {
            reply_text: reply_text.into(),
        }
    }

    pub(crate) fn command_failed(reply_text: impl Into<String>) -> Self {
        EslError::Command {
            reply_text: reply_text.into(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>, partial: EslEvent) -> Self {
        EslError::Decode {
            reason: reason.into(),
            partial: Box::new(partial),
        }
    }

    /// `true` when the connection can no longer be trusted to be aligned on a
    /// message boundary.
    ///
    /// A `command/reply` with an unexpected `Reply-Text` has no body, so the
    /// stream stays in sync and is not fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            EslError::Io(_)
            | EslError::ConnectionClosed
            | EslError::Timeout { .. }
            | EslError::MalformedHeader { .. }
            | EslError::MalformedLength { .. }
            | EslError::Decode { .. }
            | EslError::TruncatedBody { .. } => true,
            EslError::UnexpectedMessage { content_type, .. } => {
                content_type.as_deref() != Some(CONTENT_TYPE_COMMAND_REPLY)
            }
            EslError::Authentication { .. }
            | EslError::Command { .. }
            | EslError::NotConnected
            | EslError::AlreadyConnected
            | EslError::InvalidArgument { .. } => false,
        }
    }

    /// Event salvaged from a failed body decode.
    pub fn partial_event(&self) -> Option<&EslEvent> {
        match self {
            EslError::Decode { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
