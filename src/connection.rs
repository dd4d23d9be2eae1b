//! Session management: handshake, reply/event dispatch and command helpers

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{ApiResponse, EslCommand, EslResponse},
    constants::{
        CONTENT_TYPE_COMMAND_REPLY, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_ESL_HOST,
        DEFAULT_ESL_PASSWORD, DEFAULT_ESL_PORT, HEADER_CONTENT_TYPE, QUEUE_WARN_THRESHOLD,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EslEventType},
    protocol::{EslFramer, EslMessage, ReplyMatching},
};

fn event_types_to_string(events: &[EslEventType]) -> String {
    if events.contains(&EslEventType::All) {
        return EslEventType::All.to_string();
    }
    events
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Connection settings.
///
/// Deserializable so applications can embed it in their own configuration;
/// missing fields take the defaults below.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EslConnectOptions {
    /// Server address. Default: `127.0.0.1`.
    pub host: String,
    /// Event socket port. Default: 8021.
    pub port: u16,
    /// `auth` password. Default: `ClueCon`.
    pub password: String,
    /// TCP connect timeout. Default: 5000ms.
    pub connect_timeout_ms: u64,
    /// Success-marker matching for command replies. Default: exact.
    pub reply_matching: ReplyMatching,
}

impl EslConnectOptions {
    /// Options for `host:port` with the given password, other fields default.
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Self::default()
        }
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for EslConnectOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_ESL_HOST.to_string(),
            port: DEFAULT_ESL_PORT,
            password: DEFAULT_ESL_PASSWORD.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reply_matching: ReplyMatching::default(),
        }
    }
}

impl fmt::Debug for EslConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("reply_matching", &self.reply_matching)
            .finish()
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// No connection.
    Unconnected,
    /// Dialing or waiting for the `auth` reply.
    Connecting,
    /// Handshake accepted; commands and event reads allowed.
    Authenticated,
    /// A framing or transport error desynchronized the stream. The connection
    /// is gone; already queued events can still be drained.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unconnected => write!(f, "unconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// What the dispatcher is reading for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadMode {
    /// Reading for the event consumer: queued events first, then the wire.
    Idle,
    /// A command was sent; events are parked until its reply arrives.
    AwaitingReply,
}

/// FIFO of events that arrived while a command reply was pending.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<EslEvent>,
}

impl EventQueue {
    pub(crate) fn push(&mut self, event: EslEvent) {
        self.events
            .push_back(event);
        let len = self
            .events
            .len();
        trace!("[QUEUE] Parked event, {} queued", len);
        if len % QUEUE_WARN_THRESHOLD == 0 {
            warn!(
                "{} events queued while waiting for command replies; call read_event() to drain",
                len
            );
        }
    }

    pub(crate) fn pop(&mut self) -> Option<EslEvent> {
        self.events
            .pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.events
            .len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events
            .is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.events
            .clear();
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(host: &str, port: u16, timeout_ms: u64) -> EslResult<TcpStream> {
    match timeout(
        Duration::from_millis(timeout_ms),
        TcpStream::connect((host, port)),
    )
    .await
    {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(EslError::Io(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out after {}ms", timeout_ms);
            Err(EslError::Timeout { timeout_ms })
        }
    }
}

/// A single event socket session.
///
/// Owns the connection and the event queue. Every operation takes
/// `&mut self` and completes only once its reply (or event) has been read,
/// so at most one read is ever in flight. Events that arrive while a command
/// is waiting for its reply are queued and handed out by
/// [`read_event`](Self::read_event) in arrival order before any new read.
///
/// Operations are not cancel-safe. Dropping one of their futures before it
/// completes (for example through `tokio::time::timeout` or `select!`) may
/// discard part of a message already taken off the socket, leaving the
/// stream out of sync; discard the session afterwards.
///
/// ```rust,no_run
/// use fsclient::{EslConnectOptions, EslError, EslSession};
///
/// #[tokio::main]
/// async fn main() -> Result<(), EslError> {
///     let mut session = EslSession::new(EslConnectOptions::default());
///     session.connect().await?;
///     session.subscribe_event("CHANNEL_ANSWER").await?;
///
///     let status = session.api("status").await?;
///     println!("{}", status.body_str().unwrap_or("<binary>"));
///
///     loop {
///         let event = session.read_event().await?;
///         println!("{:?}", event.event_name());
///     }
/// }
/// ```
pub struct EslSession<S = TcpStream> {
    framer: Option<EslFramer<S>>,
    state: SessionState,
    queue: EventQueue,
    options: EslConnectOptions,
}

impl<S> fmt::Debug for EslSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslSession")
            .field("state", &self.state)
            .field("queued_events", &self.queue.len())
            .field("options", &self.options)
            .finish()
    }
}

impl EslSession<TcpStream> {
    /// Create an unconnected TCP session.
    pub fn new(options: EslConnectOptions) -> Self {
        Self::with_options(options)
    }

    /// Dial `host:port` from the options and authenticate.
    pub async fn connect(&mut self) -> EslResult<()> {
        if self.state == SessionState::Authenticated {
            return Err(EslError::AlreadyConnected);
        }
        info!(
            "Connecting to FreeSWITCH at {}:{}",
            self.options.host, self.options.port
        );
        self.state = SessionState::Connecting;

        let stream = match tcp_connect_with_timeout(
            &self.options.host,
            self.options.port,
            self.options.connect_timeout_ms,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Unconnected;
                return Err(e);
            }
        };

        self.connect_stream(stream)
            .await
    }
}

impl<S> EslSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create an unconnected session for any stream type.
    pub fn with_options(options: EslConnectOptions) -> Self {
        Self {
            framer: None,
            state: SessionState::Unconnected,
            queue: EventQueue::default(),
            options,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether commands can be sent.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Number of events waiting to be returned by [`read_event`](Self::read_event).
    pub fn queued_events(&self) -> usize {
        self.queue
            .len()
    }

    /// Connection settings.
    pub fn options(&self) -> &EslConnectOptions {
        &self.options
    }

    /// Authenticate over an already established stream.
    ///
    /// Reads the server greeting, sends `auth <password>` and requires a
    /// `command/reply` with `Reply-Text: +OK accepted`. On any failure the
    /// stream is dropped and the session returns to `Unconnected`.
    pub async fn connect_stream(&mut self, stream: S) -> EslResult<()> {
        if self.state == SessionState::Authenticated {
            return Err(EslError::AlreadyConnected);
        }
        self.state = SessionState::Connecting;
        self.queue
            .clear();
        self.framer = Some(EslFramer::new(stream, self.options.reply_matching));

        match self
            .authenticate()
            .await
        {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                info!("Successfully connected and authenticated to FreeSWITCH");
                Ok(())
            }
            Err(e) => {
                warn!("[AUTH] Handshake failed: {}", e);
                self.framer = None;
                self.state = SessionState::Unconnected;
                Err(e)
            }
        }
    }

    async fn authenticate(&mut self) -> EslResult<()> {
        let command = EslCommand::Auth {
            password: self
                .options
                .password
                .clone(),
        }
        .to_wire_format()?;

        let framer = self
            .framer
            .as_mut()
            .ok_or(EslError::NotConnected)?;

        debug!("[AUTH] Waiting for server greeting");
        let greeting = framer
            .read_headers()
            .await?;
        trace!(
            "[AUTH] Greeting Content-Type={:?}",
            greeting.get(HEADER_CONTENT_TYPE)
        );

        debug!("[SEND] auth [REDACTED]");
        framer
            .send(&command)
            .await?;

        match self
            .read_message(ReadMode::AwaitingReply)
            .await
        {
            Ok(EslMessage::CommandReply(reply)) if reply.is_accepted() => {
                debug!("[AUTH] Authentication accepted");
                Ok(())
            }
            Ok(EslMessage::CommandReply(reply)) => Err(EslError::auth_failed(
                reply
                    .reply_text()
                    .unwrap_or_default(),
            )),
            Ok(other) => Err(EslError::auth_failed(format!(
                "unexpected {} in reply to auth",
                other.kind()
            ))),
            Err(EslError::UnexpectedMessage {
                content_type,
                reply_text,
            }) => Err(EslError::auth_failed(match (content_type, reply_text) {
                (_, Some(text)) => text,
                (Some(content_type), None) => format!("unexpected {} in reply to auth", content_type),
                (None, None) => "reply without Content-Type".to_string(),
            })),
            Err(e) => Err(e),
        }
    }

    /// Drop the connection after an error that leaves the stream unusable.
    fn fail(&mut self, err: &EslError) {
        warn!("Connection unusable after protocol error: {}", err);
        self.framer = None;
        self.state = SessionState::Failed;
    }

    fn ensure_connected(&self) -> EslResult<()> {
        if self.state == SessionState::Authenticated {
            Ok(())
        } else {
            Err(EslError::NotConnected)
        }
    }

    /// Read the next message for `mode`.
    ///
    /// In `Idle` mode a queued event is returned without touching the
    /// connection. In `AwaitingReply` mode events are parked in the queue
    /// until a reply shows up. Fatal errors tear the connection down.
    pub(crate) async fn read_message(&mut self, mode: ReadMode) -> EslResult<EslMessage> {
        if mode == ReadMode::Idle {
            if let Some(event) = self
                .queue
                .pop()
            {
                trace!("[QUEUE] Delivering queued event, {} left", self.queue.len());
                return Ok(EslMessage::Event(event));
            }
        }

        let framer = self
            .framer
            .as_mut()
            .ok_or(EslError::NotConnected)?;

        loop {
            match framer
                .read_frame()
                .await
            {
                Ok(EslMessage::Event(event)) if mode == ReadMode::AwaitingReply => {
                    self.queue
                        .push(event);
                }
                Ok(message) => {
                    trace!("[RECV] Dispatching {}", message.kind());
                    return Ok(message);
                }
                Err(e) => {
                    if e.is_fatal() {
                        self.fail(&e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Send a command and wait for its reply, parking events on the way.
    async fn send_command(&mut self, command: EslCommand) -> EslResult<EslMessage> {
        self.ensure_connected()?;
        let wire = command.to_wire_format()?;
        debug!("[SEND] {:?}", command);

        let framer = self
            .framer
            .as_mut()
            .ok_or(EslError::NotConnected)?;
        if let Err(e) = framer
            .send(&wire)
            .await
        {
            warn!("[SEND] Write failed");
            self.fail(&e);
            return Err(e);
        }

        self.read_message(ReadMode::AwaitingReply)
            .await
    }

    /// Send a command that must be acknowledged with a `command/reply`
    /// carrying the command success marker (`+OK`).
    async fn send_command_ok(&mut self, command: EslCommand) -> EslResult<EslResponse> {
        let matching = self
            .options
            .reply_matching;
        match self
            .send_command(command)
            .await
        {
            Ok(EslMessage::CommandReply(reply)) => {
                if reply
                    .reply_text()
                    .is_some_and(|text| matching.is_command_ok(text))
                {
                    Ok(reply)
                } else {
                    Err(EslError::command_failed(
                        reply
                            .reply_text()
                            .unwrap_or("no Reply-Text"),
                    ))
                }
            }
            Ok(other) => Err(EslError::command_failed(format!(
                "expected command/reply, got {}",
                other.kind()
            ))),
            Err(EslError::UnexpectedMessage {
                content_type,
                reply_text,
            }) if content_type.as_deref() == Some(CONTENT_TYPE_COMMAND_REPLY) => Err(
                EslError::command_failed(reply_text.unwrap_or_else(|| "no Reply-Text".to_string())),
            ),
            Err(e) => Err(e),
        }
    }

    /// Add an event filter, e.g. `"Event-Name CHANNEL_ANSWER"`.
    ///
    /// Filters select which events are delivered ("filter in"); several may
    /// be active on one connection.
    pub async fn add_filter(&mut self, spec: &str) -> EslResult<()> {
        self.send_command_ok(EslCommand::Filter {
            spec: spec.to_string(),
        })
        .await?;
        debug!("Added event filter: {}", spec);
        Ok(())
    }

    /// Subscribe to plain-format events by class name, or `"ALL"`.
    pub async fn subscribe_event(&mut self, class_or_all: &str) -> EslResult<()> {
        self.send_command_ok(EslCommand::Events {
            events: class_or_all.to_string(),
        })
        .await?;
        info!("Subscribed to events '{}'", class_or_all);
        Ok(())
    }

    /// Subscribe to plain-format events by typed names.
    ///
    /// Sends `ALL` if the list contains [`EslEventType::All`].
    pub async fn subscribe_events(&mut self, events: &[EslEventType]) -> EslResult<()> {
        self.subscribe_event(&event_types_to_string(events))
            .await
    }

    /// Run a blocking `api` command and return its raw response.
    ///
    /// ```rust,no_run
    /// # async fn example(session: &mut fsclient::EslSession) -> Result<(), fsclient::EslError> {
    /// let resp = session.api("status").await?;
    /// println!("{}", resp.body_str().unwrap_or(""));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn api(&mut self, command: &str) -> EslResult<ApiResponse> {
        match self
            .send_command(EslCommand::Api {
                command: command.to_string(),
            })
            .await?
        {
            EslMessage::ApiResponse(resp) => {
                debug!("Received api response ({} bytes)", resp.body().len());
                Ok(resp)
            }
            other => Err(EslError::command_failed(format!(
                "expected api/response, got {}",
                other.kind()
            ))),
        }
    }

    /// Execute a dialplan application on the channel `uuid` via `sendmsg`.
    ///
    /// An empty `arg` is omitted. With `lock`, the server runs queued
    /// applications on the channel one at a time (`event-lock: true`).
    pub async fn execute(
        &mut self,
        app: &str,
        arg: Option<&str>,
        uuid: &str,
        lock: bool,
    ) -> EslResult<EslResponse> {
        self.send_command_ok(EslCommand::Execute {
            app: app.to_string(),
            arg: arg.map(|s| s.to_string()),
            uuid: uuid.to_string(),
            event_lock: lock,
        })
        .await
    }

    /// Receive the next event: queued ones first, then from the wire.
    ///
    /// After a fatal error, queued events can still be drained; once the
    /// queue is empty this returns [`EslError::NotConnected`].
    pub async fn read_event(&mut self) -> EslResult<EslEvent> {
        if self
            .queue
            .is_empty()
        {
            self.ensure_connected()?;
        }
        let err = match self
            .read_message(ReadMode::Idle)
            .await?
        {
            EslMessage::Event(event) => return Ok(event),
            EslMessage::ApiResponse(resp) => EslError::UnexpectedMessage {
                content_type: resp
                    .header(HEADER_CONTENT_TYPE)
                    .map(str::to_string),
                reply_text: None,
            },
            EslMessage::CommandReply(reply) => EslError::UnexpectedMessage {
                content_type: Some(CONTENT_TYPE_COMMAND_REPLY.to_string()),
                reply_text: reply
                    .reply_text()
                    .map(str::to_string),
            },
        };
        // A response nobody asked for means replies and commands no longer
        // pair up.
        if err.is_fatal() {
            self.fail(&err);
        }
        Err(err)
    }

    /// Events as a [`Stream`].
    ///
    /// Yields until the session can no longer produce events: after the
    /// first error the stream ends once the queue is drained and the
    /// session is no longer authenticated.
    pub fn events(&mut self) -> impl Stream<Item = EslResult<EslEvent>> + '_ {
        stream::unfold(self, |session| async move {
            if !session.is_connected()
                && session
                    .queue
                    .is_empty()
            {
                return None;
            }
            let item = session
                .read_event()
                .await;
            Some((item, session))
        })
    }

    /// Shut down the connection. Queued events are discarded.
    pub async fn disconnect(&mut self) -> EslResult<()> {
        info!("Client requested disconnect");
        self.queue
            .clear();
        self.state = SessionState::Unconnected;
        match self
            .framer
            .take()
        {
            Some(mut framer) => {
                framer
                    .shutdown()
                    .await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    const GREETING: &str = "Content-Type: auth/request\n\n";
    const AUTH_OK: &str = "Content-Type: command/reply\nReply-Text: +OK accepted\n\n";
    const REPLY_OK: &str = "Content-Type: command/reply\nReply-Text: +OK\n\n";

    fn event_frame(name: &str, seq: u32) -> String {
        let body = format!("Event-Name: {}\nEvent-Sequence: {}\n\n", name, seq);
        format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        )
    }

    fn api_frame(body: &str) -> String {
        format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{}",
            body.len(),
            body
        )
    }

    /// Authenticated session whose peer has queued `script` after the
    /// handshake. The server half is returned to inspect what was sent.
    async fn session_with(script: &str) -> (EslSession<DuplexStream>, DuplexStream) {
        let (client, mut server) = duplex(64 * 1024);
        server
            .write_all(format!("{}{}{}", GREETING, AUTH_OK, script).as_bytes())
            .await
            .unwrap();
        let mut session = EslSession::with_options(EslConnectOptions::default());
        session
            .connect_stream(client)
            .await
            .unwrap();
        (session, server)
    }

    async fn sent_by(session: EslSession<DuplexStream>, mut server: DuplexStream) -> String {
        drop(session);
        let mut written = String::new();
        server
            .read_to_string(&mut written)
            .await
            .unwrap();
        written
    }

    fn sequence(event: &EslEvent) -> Option<&str> {
        event.header("Event-Sequence")
    }

    #[tokio::test]
    async fn handshake_accepted() {
        let (session, server) = session_with("").await;
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(sent_by(session, server).await, "auth ClueCon\r\n\r\n");
    }

    #[tokio::test]
    async fn handshake_rejected() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(
                format!(
                    "{}Content-Type: command/reply\nReply-Text: -ERR invalid\n\n",
                    GREETING
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        let mut session = EslSession::with_options(EslConnectOptions::default());

        match session
            .connect_stream(client)
            .await
        {
            Err(EslError::Authentication { reply_text }) => assert_eq!(reply_text, "-ERR invalid"),
            other => panic!("expected Authentication error, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Unconnected);
        assert!(matches!(
            session.api("status").await,
            Err(EslError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn plain_ok_is_not_an_auth_success() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(format!("{}{}", GREETING, REPLY_OK).as_bytes())
            .await
            .unwrap();
        let mut session = EslSession::with_options(EslConnectOptions::default());
        assert!(matches!(
            session.connect_stream(client).await,
            Err(EslError::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn second_connect_rejected() {
        let (mut session, _server) = session_with("").await;
        let (other, _other_server) = duplex(16);
        assert!(matches!(
            session.connect_stream(other).await,
            Err(EslError::AlreadyConnected)
        ));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn events_before_reply_are_queued_in_order() {
        let script = format!(
            "{}{}{}",
            event_frame("CHANNEL_CREATE", 1),
            event_frame("CHANNEL_ANSWER", 2),
            api_frame("+OK done")
        );
        let (mut session, _server) = session_with(&script).await;

        let resp = session
            .api("status")
            .await
            .unwrap();
        assert_eq!(resp.body_str(), Some("+OK done"));
        assert_eq!(session.queued_events(), 2);

        let first = session
            .read_event()
            .await
            .unwrap();
        let second = session
            .read_event()
            .await
            .unwrap();
        assert_eq!(sequence(&first), Some("1"));
        assert_eq!(sequence(&second), Some("2"));
        assert_eq!(session.queued_events(), 0);
    }

    #[tokio::test]
    async fn queued_events_need_no_io() {
        let script = format!("{}{}", event_frame("HEARTBEAT", 7), REPLY_OK);
        let (mut session, _server) = session_with(&script).await;
        session
            .subscribe_event("HEARTBEAT")
            .await
            .unwrap();

        // Nothing else is on the wire; a network read would hang.
        let event = tokio::time::timeout(Duration::from_secs(1), session.read_event())
            .await
            .expect("queued event must not wait for the network")
            .unwrap();
        assert_eq!(sequence(&event), Some("7"));

        let pending = tokio::time::timeout(Duration::from_millis(50), session.read_event()).await;
        assert!(pending.is_err(), "empty queue falls through to a network read");
    }

    #[tokio::test]
    async fn queue_drains_before_fresh_events() {
        let script = format!(
            "{}{}{}",
            event_frame("CHANNEL_CREATE", 1),
            REPLY_OK,
            event_frame("CHANNEL_HANGUP", 2)
        );
        let (mut session, _server) = session_with(&script).await;
        session
            .add_filter("Unique-ID uuid-1")
            .await
            .unwrap();

        let ordered: Vec<String> = vec![
            session
                .read_event()
                .await
                .unwrap(),
            session
                .read_event()
                .await
                .unwrap(),
        ]
        .iter()
        .filter_map(|e| sequence(e).map(str::to_string))
        .collect();
        assert_eq!(ordered, ["1", "2"]);
    }

    #[tokio::test]
    async fn interleaved_commands_keep_fifo_order() {
        let script = format!(
            "{}{}{}{}{}",
            event_frame("A", 1),
            REPLY_OK,
            event_frame("B", 2),
            event_frame("C", 3),
            api_frame("ok"),
        );
        let (mut session, _server) = session_with(&script).await;
        session
            .subscribe_event("ALL")
            .await
            .unwrap();
        session
            .api("version")
            .await
            .unwrap();
        assert_eq!(session.queued_events(), 3);

        for expected in ["1", "2", "3"] {
            let event = session
                .read_event()
                .await
                .unwrap();
            assert_eq!(sequence(&event), Some(expected));
        }
    }

    #[tokio::test]
    async fn command_rejection_is_command_error() {
        let script = "Content-Type: command/reply\nReply-Text: -ERR invalid filter\n\n";
        let (mut session, _server) = session_with(script).await;
        match session
            .add_filter("bogus")
            .await
        {
            Err(EslError::Command { reply_text }) => assert_eq!(reply_text, "-ERR invalid filter"),
            other => panic!("expected Command error, got {:?}", other),
        }
        assert!(session.is_connected(), "a rejected command keeps the session");
    }

    #[tokio::test]
    async fn non_command_reply_to_auth_is_authentication_error() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(
                format!(
                    "{}Content-Type: text/rude-rejection\nContent-Length: 0\n\n",
                    GREETING
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        let mut session = EslSession::with_options(EslConnectOptions::default());

        match session
            .connect_stream(client)
            .await
        {
            Err(EslError::Authentication { reply_text }) => {
                assert!(reply_text.contains("text/rude-rejection"), "{}", reply_text)
            }
            other => panic!("expected Authentication error, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Unconnected);
    }

    #[tokio::test]
    async fn accepted_marker_does_not_acknowledge_commands() {
        let script = "Content-Type: command/reply\nReply-Text: +OK accepted\n\n";
        let (mut session, _server) = session_with(script).await;
        match session
            .add_filter("Event-Name HEARTBEAT")
            .await
        {
            Err(EslError::Command { reply_text }) => assert_eq!(reply_text, "+OK accepted"),
            other => panic!("expected Command error, got {:?}", other),
        }
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn prefix_matching_accepts_detailed_ok() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(
                format!(
                    "{}{}Content-Type: command/reply\nReply-Text: +OK event listener enabled plain\n\n",
                    GREETING, AUTH_OK
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        let mut options = EslConnectOptions::default();
        options.reply_matching = ReplyMatching::Prefix;
        let mut session = EslSession::with_options(options);
        session
            .connect_stream(client)
            .await
            .unwrap();
        session
            .subscribe_event("ALL")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stray_api_response_fails_session() {
        let (mut session, _server) = session_with(&api_frame("+OK late")).await;
        let err = session
            .read_event()
            .await
            .unwrap_err();
        assert!(matches!(err, EslError::UnexpectedMessage { .. }));
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn stray_command_reply_keeps_session() {
        let (mut session, _server) = session_with(REPLY_OK).await;
        let err = session
            .read_event()
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn api_answered_by_command_reply_is_command_error() {
        let (mut session, _server) = session_with(REPLY_OK).await;
        assert!(matches!(
            session.api("status").await,
            Err(EslError::Command { .. })
        ));
    }

    #[tokio::test]
    async fn execute_sends_sendmsg_block() {
        let (mut session, server) = session_with(REPLY_OK).await;
        let reply = session
            .execute("playback", Some("/tmp/a.wav"), "uuid-1", false)
            .await
            .unwrap();
        assert_eq!(reply.reply_text(), Some("+OK"));

        let sent = sent_by(session, server).await;
        assert_eq!(
            sent,
            "auth ClueCon\r\n\r\n\
             sendmsg uuid-1\r\n\
             call-command: execute\r\n\
             execute-app-name: playback\r\n\
             execute-app-arg: /tmp/a.wav\r\n\
             \r\n"
        );
    }

    #[tokio::test]
    async fn decode_failure_marks_session_failed() {
        let body = "Event-Name: HEARTBEAT\nbroken line\n\n";
        let script = format!(
            "{}Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            event_frame("CHANNEL_CREATE", 1),
            body.len(),
            body
        );
        let (mut session, _server) = session_with(&script).await;

        let err = session
            .api("status")
            .await
            .unwrap_err();
        assert_eq!(
            err.partial_event()
                .and_then(|e| e.event_name()),
            Some("HEARTBEAT")
        );
        assert_eq!(session.state(), SessionState::Failed);

        // The event decoded before the failure is still delivered.
        let queued = session
            .read_event()
            .await
            .unwrap();
        assert_eq!(sequence(&queued), Some("1"));
        assert!(matches!(
            session.read_event().await,
            Err(EslError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn event_stream_yields_in_order_then_ends() {
        let script = format!("{}{}", event_frame("DTMF", 1), event_frame("DTMF", 2));
        let (mut session, server) = session_with(&script).await;
        drop(server);

        let items: Vec<EslResult<EslEvent>> = session
            .events()
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0]
                .as_ref()
                .ok()
                .and_then(sequence),
            Some("1")
        );
        assert_eq!(
            items[1]
                .as_ref()
                .ok()
                .and_then(sequence),
            Some("2")
        );
        assert!(matches!(items[2], Err(EslError::ConnectionClosed)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn disconnect_resets_state() {
        let (mut session, _server) = session_with("").await;
        session
            .disconnect()
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Unconnected);
        assert!(matches!(
            session.read_event().await,
            Err(EslError::NotConnected)
        ));
    }

    #[test]
    fn typed_subscriptions_join_names() {
        assert_eq!(
            event_types_to_string(&[EslEventType::ChannelAnswer, EslEventType::ChannelHangup]),
            "CHANNEL_ANSWER CHANNEL_HANGUP"
        );
        assert_eq!(
            event_types_to_string(&[EslEventType::Dtmf, EslEventType::All]),
            "ALL"
        );
    }

    #[test]
    fn options_debug_redacts_password() {
        let options = EslConnectOptions::new("10.0.0.1", 8022, "s3cret");
        let debug = format!("{:?}", options);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("10.0.0.1"));
        assert_eq!(options.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: EslConnectOptions =
            serde_json::from_str(r#"{"port": 8022, "reply_matching": "prefix"}"#).unwrap();
        assert_eq!(options.port, 8022);
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.password, "ClueCon");
        assert_eq!(options.reply_matching, ReplyMatching::Prefix);
    }
}
