//! Decoded event messages

use crate::error::{EslError, EslResult};
use crate::headers::EventHeader;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

define_wire_enum! {
    /// Commonly subscribed FreeSWITCH event names (`Event-Name` values).
    ///
    /// Names outside this list still decode; the event simply reports
    /// `event_type() == None` and the raw name stays available through
    /// [`EslEvent::event_name`].
    pub enum EslEventType / ParseEventTypeError("event type") {
        Custom => "CUSTOM",
        ChannelCreate => "CHANNEL_CREATE",
        ChannelDestroy => "CHANNEL_DESTROY",
        ChannelState => "CHANNEL_STATE",
        ChannelCallstate => "CHANNEL_CALLSTATE",
        ChannelAnswer => "CHANNEL_ANSWER",
        ChannelHangup => "CHANNEL_HANGUP",
        ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
        ChannelExecute => "CHANNEL_EXECUTE",
        ChannelExecuteComplete => "CHANNEL_EXECUTE_COMPLETE",
        ChannelBridge => "CHANNEL_BRIDGE",
        ChannelUnbridge => "CHANNEL_UNBRIDGE",
        ChannelProgress => "CHANNEL_PROGRESS",
        ChannelProgressMedia => "CHANNEL_PROGRESS_MEDIA",
        ChannelOriginate => "CHANNEL_ORIGINATE",
        ChannelPark => "CHANNEL_PARK",
        ChannelData => "CHANNEL_DATA",
        Api => "API",
        BackgroundJob => "BACKGROUND_JOB",
        Dtmf => "DTMF",
        Heartbeat => "HEARTBEAT",
        PlaybackStart => "PLAYBACK_START",
        PlaybackStop => "PLAYBACK_STOP",
        RecordStart => "RECORD_START",
        RecordStop => "RECORD_STOP",
        DetectedSpeech => "DETECTED_SPEECH",
        PresenceIn => "PRESENCE_IN",
        MessageWaiting => "MESSAGE_WAITING",
        ReloadXml => "RELOADXML",
        Shutdown => "SHUTDOWN",
        /// Subscribe to all events
        All => "ALL",
    }
}

/// A decoded `text/event-plain` message: header map plus optional inner body.
///
/// Header values are stored percent-decoded. There is no fixed schema;
/// accessors below are shortcuts for common fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    /// Create a new empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header by name (case-sensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All headers as a map.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Consume the event, keeping only its header map.
    pub fn into_headers(self) -> HashMap<String, String> {
        self.headers
    }

    /// Set or overwrite a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    /// Remove a header, returning its value if it existed.
    pub fn del_header(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(name)
    }

    /// Number of decoded headers.
    pub fn len(&self) -> usize {
        self.headers
            .len()
    }

    /// `true` if no header was decoded.
    pub fn is_empty(&self) -> bool {
        self.headers
            .is_empty()
    }

    /// Inner body (text after the event headers' blank line), if any.
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Set the inner body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// Raw `Event-Name` value.
    pub fn event_name(&self) -> Option<&str> {
        self.header(EventHeader::EventName)
    }

    /// `Event-Name` parsed into a known [`EslEventType`].
    pub fn event_type(&self) -> Option<EslEventType> {
        self.event_name()?
            .parse()
            .ok()
    }

    /// Check whether this event matches the given type.
    pub fn is_event_type(&self, event_type: EslEventType) -> bool {
        self.event_type() == Some(event_type)
    }

    /// `Unique-ID` header, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    /// `Job-UUID` header from `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
    }

    /// `Channel-Name` header (e.g. `sofia/internal/1000@domain`).
    pub fn channel_name(&self) -> Option<&str> {
        self.header(EventHeader::ChannelName)
    }

    /// `Hangup-Cause` header (e.g. `NORMAL_CLEARING`).
    pub fn hangup_cause(&self) -> Option<&str> {
        self.header(EventHeader::HangupCause)
    }

    /// Channel variable lookup (`variable_<name>` header).
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.header(format!("variable_{}", name))
    }

    /// Serialize to the plain event body format with percent-encoded values.
    ///
    /// Inverse of the framer's event decoding. `Event-Name` comes first, the
    /// other headers follow in alphabetical order. A stored `Content-Length`
    /// is dropped and recomputed from the inner body.
    ///
    /// Keys that are empty or contain `": "`, `\r` or `\n` cannot be
    /// represented on the wire and are rejected.
    pub fn to_plain_format(&self) -> EslResult<String> {
        use std::fmt::Write;

        let name_key = EventHeader::EventName.as_str();
        let length_key = EventHeader::ContentLength.as_str();

        let mut keys: Vec<&String> = self
            .headers
            .keys()
            .filter(|k| k.as_str() != name_key && k.as_str() != length_key)
            .collect();
        keys.sort();

        let mut result = String::new();
        let ordered = self
            .headers
            .get_key_value(name_key)
            .into_iter()
            .chain(
                keys.into_iter()
                    .filter_map(|k| self.headers.get_key_value(k)),
            );

        for (key, value) in ordered {
            if key.is_empty() || key.contains(": ") || key.contains(['\r', '\n']) {
                return Err(EslError::InvalidArgument {
                    message: format!("event header name {:?} is not representable", key),
                });
            }
            let _ = writeln!(
                result,
                "{}: {}",
                key,
                percent_encode(value.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        match &self.body {
            Some(body) => {
                let _ = writeln!(result, "{}: {}", length_key, body.len());
                result.push('\n');
                result.push_str(body);
            }
            None => result.push('\n'),
        }

        Ok(result)
    }
}

impl FromIterator<(String, String)> for EslEvent {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .collect(),
            body: None,
        }
    }
}
