//! Protocol constants and configuration defaults

/// Default FreeSWITCH event socket host (local loopback)
pub const DEFAULT_ESL_HOST: &str = "127.0.0.1";

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Default `event_socket.conf.xml` password
pub const DEFAULT_ESL_PASSWORD: &str = "ClueCon";

/// TCP connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Maximum single message body size (8MB) - validates Content-Length header
/// No legitimate ESL message should exceed this (largest is sofia status ~1-2MB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum length of a single header line, terminator included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Queue length at which a warning is logged; the queue itself is unbounded.
pub const QUEUE_WARN_THRESHOLD: usize = 1000;

/// Outgoing line terminator. Commands end with an extra empty line.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";

/// Protocol framing header: body type.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";

/// Generic command success marker.
pub const REPLY_OK: &str = "+OK";
/// Success marker of the `auth` handshake.
pub const REPLY_OK_ACCEPTED: &str = "+OK accepted";

/// Body carried by every successful command reply.
pub const REPLY_OK_BODY: &str = "OK";
