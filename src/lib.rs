//! FreeSWITCH Event Socket client for Rust
//!
//! This crate connects to FreeSWITCH's event socket in inbound mode,
//! authenticates, sends commands and reads `text/event-plain` events.
//!
//! # Architecture
//!
//! A single [`EslSession`] owns the connection. Operations take `&mut self`
//! and finish only once their reply has been read, so there is never more
//! than one read in flight:
//! - the framer decides each message's framing from its envelope headers
//!   (`Content-Type`, `Content-Length`) and yields an [`EslMessage`]
//! - events that arrive while a command waits for its reply are queued and
//!   returned by [`EslSession::read_event`] in arrival order, before anything
//!   new is read from the socket
//!
//! # Examples
//!
//! ## Commands
//!
//! ```rust,no_run
//! use fsclient::{EslConnectOptions, EslError, EslSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let mut session = EslSession::new(EslConnectOptions::new("localhost", 8021, "ClueCon"));
//!     session.connect().await?;
//!
//!     let response = session.api("status").await?;
//!     println!("Status: {}", response.body_str().unwrap_or("<binary>"));
//!
//!     session
//!         .execute("playback", Some("ivr/ivr-welcome.wav"), "some-channel-uuid", true)
//!         .await?;
//!
//!     session.disconnect().await
//! }
//! ```
//!
//! ## Event Subscription
//!
//! ```rust,no_run
//! use fsclient::{EslConnectOptions, EslEventType, EslSession};
//! use futures_util::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = EslSession::new(EslConnectOptions::default());
//!     session.connect().await?;
//!
//!     session.subscribe_events(&[
//!         EslEventType::ChannelAnswer,
//!         EslEventType::ChannelHangup,
//!     ]).await?;
//!     session.add_filter("Caller-Destination-Number 1000").await?;
//!
//!     let mut events = Box::pin(session.events());
//!     while let Some(Ok(event)) = events.next().await {
//!         println!("Received event: {:?}", event.event_type());
//!     }
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod connection;
pub mod constants;
pub mod error;
pub mod event;
pub mod headers;

pub(crate) mod command;
pub(crate) mod protocol;
pub(crate) mod transport;

pub use command::{ApiResponse, EslResponse};
pub use connection::{EslConnectOptions, EslSession, SessionState};
pub use constants::{DEFAULT_ESL_HOST, DEFAULT_ESL_PASSWORD, DEFAULT_ESL_PORT};
pub use error::{EslError, EslResult};
pub use event::{EslEvent, EslEventType, ParseEventTypeError};
pub use headers::{EventHeader, ParseEventHeaderError};
pub use protocol::{EslMessage, ReplyMatching};
pub use transport::Headers;
