//! Message framing: one envelope header block in, one decoded message out.

use crate::{
    command::{ApiResponse, EslResponse},
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_COMMAND_REPLY, CONTENT_TYPE_TEXT_EVENT_PLAIN,
        HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HEADER_REPLY_TEXT, MAX_MESSAGE_SIZE, REPLY_OK,
        REPLY_OK_ACCEPTED, REPLY_OK_BODY,
    },
    error::{EslError, EslResult},
    event::EslEvent,
    transport::{Headers, LineConnection},
};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// How strictly a `command/reply` `Reply-Text` must match the success marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMatching {
    /// Only `+OK` and `+OK accepted` frame as a reply; commands other than
    /// `auth` then require a bare `+OK`.
    #[default]
    Exact,
    /// Any `Reply-Text` starting with `+OK` counts as success
    /// (e.g. `+OK event listener enabled plain`).
    Prefix,
}

impl ReplyMatching {
    fn is_success(self, reply_text: &str) -> bool {
        match self {
            ReplyMatching::Exact => reply_text == REPLY_OK || reply_text == REPLY_OK_ACCEPTED,
            ReplyMatching::Prefix => reply_text.starts_with(REPLY_OK),
        }
    }

    /// Whether `reply_text` acknowledges a regular command (anything but
    /// `auth`). Under `Exact` only a bare `+OK` qualifies.
    pub(crate) fn is_command_ok(self, reply_text: &str) -> bool {
        match self {
            ReplyMatching::Exact => reply_text == REPLY_OK,
            ReplyMatching::Prefix => reply_text.starts_with(REPLY_OK),
        }
    }
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EslMessage {
    /// Asynchronous `text/event-plain` notification.
    Event(EslEvent),
    /// Length-delimited `api/response` body.
    ApiResponse(ApiResponse),
    /// Successful `command/reply`.
    CommandReply(EslResponse),
}

impl EslMessage {
    /// The message's `body` field: `"OK"` for command replies, the raw
    /// payload for API responses, nothing for events.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            EslMessage::Event(_) => None,
            EslMessage::ApiResponse(resp) => Some(resp.body()),
            EslMessage::CommandReply(_) => Some(REPLY_OK_BODY.as_bytes()),
        }
    }

    /// `true` for asynchronous events.
    pub fn is_event(&self) -> bool {
        matches!(self, EslMessage::Event(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            EslMessage::Event(_) => "event",
            EslMessage::ApiResponse(_) => "api/response",
            EslMessage::CommandReply(_) => "command/reply",
        }
    }
}

/// Parse a `Content-Length` value.
fn parse_content_length(value: &str) -> EslResult<usize> {
    let malformed = || EslError::MalformedLength {
        value: value.to_string(),
    };
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let length: usize = trimmed
        .parse()
        .map_err(|_| malformed())?;
    if length > MAX_MESSAGE_SIZE {
        return Err(malformed());
    }
    Ok(length)
}

/// Decode a percent-encoded value using URL query rules.
///
/// `+` becomes a space and every `%` must start a two hex digit escape. The
/// decoded bytes must form valid UTF-8.
pub(crate) fn query_unescape(raw: &str) -> Result<String, String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = matches!(
                (bytes.get(i + 1), bytes.get(i + 2)),
                (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit()
            );
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(format!(
                    "invalid percent escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| format!("decoded value is not UTF-8: {}", e))
}

/// Decode a `text/event-plain` body.
///
/// The body holds `Key: percent-encoded value` lines up to the first blank
/// line; anything after it is the event's inner body. On failure the error
/// carries every header decoded so far.
pub(crate) fn decode_event_body(body: &[u8]) -> EslResult<EslEvent> {
    let mut event = EslEvent::new();

    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(e) => return Err(EslError::decode(format!("event body is not UTF-8: {}", e), event)),
    };

    let blank_line = [("\n\n", 2), ("\r\n\r\n", 4)]
        .into_iter()
        .filter_map(|(sep, len)| text.find(sep).map(|pos| (pos, len)))
        .min();
    let (header_section, inner_body) = match blank_line {
        Some((pos, len)) => (&text[..pos], Some(&text[pos + len..])),
        None => (text, None),
    };

    for line in header_section.lines() {
        if line.is_empty() {
            continue;
        }
        let Some((key, raw_value)) = line.split_once(": ") else {
            return Err(EslError::decode(
                format!("event line {:?} has no \": \" separator", line),
                event,
            ));
        };
        // Encoded values never contain a raw ": "; seeing one means the key did.
        if raw_value.contains(": ") {
            return Err(EslError::decode(
                format!("event line {:?} has an ambiguous key", line),
                event,
            ));
        }
        match query_unescape(raw_value) {
            Ok(value) => event.set_header(key, value),
            Err(reason) => {
                return Err(EslError::decode(
                    format!("header {:?}: {}", key, reason),
                    event,
                ))
            }
        }
    }

    if let Some(ib) = inner_body.filter(|ib| !ib.is_empty()) {
        event.set_body(ib);
    }

    Ok(event)
}

/// Reads framed messages off a [`LineConnection`].
///
/// The framing of every message is decided from its envelope headers before
/// any body byte is consumed; a wrong decision leaves the stream misaligned
/// for good, so every unknown framing is an error rather than a guess.
#[derive(Debug)]
pub(crate) struct EslFramer<S> {
    conn: LineConnection<S>,
    reply_matching: ReplyMatching,
}

impl<S> EslFramer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, reply_matching: ReplyMatching) -> Self {
        Self {
            conn: LineConnection::new(stream),
            reply_matching,
        }
    }

    /// Read a header block without interpreting it (server greeting).
    pub(crate) async fn read_headers(&mut self) -> EslResult<Headers> {
        self.conn
            .read_header_block()
            .await
    }

    pub(crate) async fn send(&mut self, data: &str) -> EslResult<()> {
        self.conn
            .send(data)
            .await
    }

    pub(crate) async fn shutdown(&mut self) -> EslResult<()> {
        self.conn
            .shutdown()
            .await
    }

    /// Read and decode the next message.
    pub(crate) async fn read_frame(&mut self) -> EslResult<EslMessage> {
        let headers = self
            .conn
            .read_header_block()
            .await?;

        let content_type = headers.get(HEADER_CONTENT_TYPE);
        let content_length = headers.get(HEADER_CONTENT_LENGTH);
        trace!(
            "[RECV] Envelope Content-Type={:?} Content-Length={:?}",
            content_type,
            content_length
        );

        match (content_type, content_length) {
            (Some(CONTENT_TYPE_TEXT_EVENT_PLAIN), Some(length)) => {
                let length = parse_content_length(length)?;
                let body = self
                    .conn
                    .read_body(length)
                    .await?;
                let event = decode_event_body(&body)?;
                trace!("[RECV] Event {:?}", event.event_name());
                Ok(EslMessage::Event(event))
            }
            (Some(CONTENT_TYPE_API_RESPONSE), Some(length)) => {
                let length = parse_content_length(length)?;
                let body = self
                    .conn
                    .read_body(length)
                    .await?;
                Ok(EslMessage::ApiResponse(ApiResponse::new(headers, body)))
            }
            (Some(CONTENT_TYPE_COMMAND_REPLY), _)
                if headers
                    .get(HEADER_REPLY_TEXT)
                    .is_some_and(|text| {
                        self.reply_matching
                            .is_success(text)
                    }) =>
            {
                Ok(EslMessage::CommandReply(EslResponse::new(headers)))
            }
            _ => {
                let err = EslError::UnexpectedMessage {
                    content_type: content_type.map(str::to_string),
                    reply_text: headers
                        .get(HEADER_REPLY_TEXT)
                        .map(str::to_string),
                };
                debug!("[RECV] {}", err);
                Err(err)
            }
        }
    }
}
