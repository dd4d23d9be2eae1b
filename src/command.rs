//! Command wire format and reply types

use crate::{
    constants::{HEADER_REPLY_TEXT, LINE_TERMINATOR, REPLY_OK_ACCEPTED, REPLY_OK_BODY},
    error::{EslError, EslResult},
    transport::Headers,
};
use std::fmt;
use std::string::FromUtf8Error;

/// Validate that a user-provided string contains no newline characters.
///
/// ESL commands are line-delimited; embedded newlines would allow injection
/// of arbitrary protocol commands.
fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::InvalidArgument {
            message: format!("{} must not contain newlines", context),
        });
    }
    Ok(())
}

/// Acknowledgement of a command (`Content-Type: command/reply`).
///
/// Only successful replies become an `EslResponse`; the framer turns any
/// other `Reply-Text` into [`EslError::UnexpectedMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EslResponse {
    headers: Headers,
}

impl EslResponse {
    pub(crate) fn new(headers: Headers) -> Self {
        Self { headers }
    }

    /// Raw `Reply-Text` header value (e.g. `+OK`, `+OK accepted`).
    pub fn reply_text(&self) -> Option<&str> {
        self.headers
            .get(HEADER_REPLY_TEXT)
    }

    /// `true` for the `+OK accepted` reply that ends the auth handshake.
    pub fn is_accepted(&self) -> bool {
        self.reply_text() == Some(REPLY_OK_ACCEPTED)
    }

    /// Body of a successful reply: always `"OK"`.
    pub fn body(&self) -> &'static str {
        REPLY_OK_BODY
    }

    /// Look up a reply header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
    }

    /// All reply headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

/// Result of a blocking `api` command (`Content-Type: api/response`).
///
/// The body is kept as raw bytes exactly as received; FreeSWITCH does not
/// guarantee UTF-8 output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    headers: Headers,
    body: Vec<u8>,
}

impl ApiResponse {
    pub(crate) fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Consume the response, returning the raw body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Consume the response, returning the body as a `String`.
    pub fn into_string(self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.body)
    }

    /// Look up an envelope header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
    }

    /// All envelope headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

/// Commands the session sends.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum EslCommand {
    /// Authenticate with password
    Auth { password: String },
    /// Add an event filter (`<header> <value>`)
    Filter { spec: String },
    /// Subscribe to plain-format events by class, or `ALL`
    Events { events: String },
    /// Execute a blocking API command
    Api { command: String },
    /// Run a dialplan application on a channel via `sendmsg`
    Execute {
        app: String,
        arg: Option<String>,
        uuid: String,
        event_lock: bool,
    },
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::Filter { spec } => f
                .debug_struct("Filter")
                .field("spec", spec)
                .finish(),
            EslCommand::Events { events } => f
                .debug_struct("Events")
                .field("events", events)
                .finish(),
            EslCommand::Api { command } => f
                .debug_struct("Api")
                .field("command", command)
                .finish(),
            EslCommand::Execute {
                app,
                arg,
                uuid,
                event_lock,
            } => f
                .debug_struct("Execute")
                .field("app", app)
                .field("arg", arg)
                .field("uuid", uuid)
                .field("event_lock", event_lock)
                .finish(),
        }
    }
}

impl EslCommand {
    /// Format a single-line command followed by the blank line that ends it.
    fn format_simple_command(cmd: &str, args: &[&str]) -> String {
        let mut result = String::from(cmd);
        for arg in args {
            result.push(' ');
            result.push_str(arg);
        }
        result.push_str(LINE_TERMINATOR);
        result.push_str(LINE_TERMINATOR);
        result
    }

    /// Validate all user-supplied fields, then convert to wire format.
    pub(crate) fn to_wire_format(&self) -> EslResult<String> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Self::format_simple_command("auth", &[password]))
            }
            EslCommand::Filter { spec } => {
                validate_no_newlines(spec, "filter")?;
                Ok(Self::format_simple_command("filter", &[spec]))
            }
            EslCommand::Events { events } => {
                validate_no_newlines(events, "event list")?;
                Ok(Self::format_simple_command("event", &["plain", events]))
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(Self::format_simple_command("api", &[command]))
            }
            EslCommand::Execute {
                app,
                arg,
                uuid,
                event_lock,
            } => {
                validate_no_newlines(app, "execute app")?;
                validate_no_newlines(uuid, "execute uuid")?;
                let arg = arg
                    .as_deref()
                    .filter(|a| !a.is_empty());
                if let Some(a) = arg {
                    validate_no_newlines(a, "execute arg")?;
                }

                let mut lines = Vec::with_capacity(6);
                lines.push(if uuid.is_empty() {
                    "sendmsg".to_string()
                } else {
                    format!("sendmsg {}", uuid)
                });
                lines.push("call-command: execute".to_string());
                lines.push(format!("execute-app-name: {}", app));
                if let Some(a) = arg {
                    lines.push(format!("execute-app-arg: {}", a));
                }
                if *event_lock {
                    lines.push("event-lock: true".to_string());
                }
                lines.push(String::new());

                let mut result = lines.join(LINE_TERMINATOR);
                result.push_str(LINE_TERMINATOR);
                Ok(result)
            }
        }
    }
}
