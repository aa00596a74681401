//! FreeSWITCH Event Socket Library (ESL) client and server for Rust
//!
//! This crate speaks the Event Socket Layer, FreeSWITCH's line-oriented TCP
//! control protocol, in both of its operating modes:
//!
//! - **Inbound**: connect to a FreeSWITCH server, authenticate, issue
//!   commands and receive events.
//! - **Outbound**: run a TCP server; FreeSWITCH opens one socket per call
//!   and your handler drives the call.
//!
//! # Architecture
//!
//! Each [`EslConnection`] (Clone + Send + Sync) runs two background
//! workers: a reader task that frames envelopes off the socket, and an
//! event dispatch worker that routes each event to the most specific bound
//! handler. Concurrent callers share one connection freely — outgoing
//! frames and their response slots are enqueued atomically, so replies
//! always reach the caller whose request they answer.
//!
//! Event handlers are keyed by header/value pairs and matched by
//! specificity: a handler bound to
//! `{event-name: BACKGROUND_JOB, job-uuid: X}` outranks one bound to
//! `{event-name: BACKGROUND_JOB}`, which outranks the catch-all. The
//! [`bgapi`](EslConnection::bgapi) and [`execute`](EslConnection::execute)
//! helpers bind and remove such handlers automatically.
//!
//! # Inbound connection
//!
//! ```rust,no_run
//! use eslmux::{EslConnection, EslResult};
//!
//! #[tokio::main]
//! async fn main() -> EslResult<()> {
//!     let conn = EslConnection::connect("localhost", 8021, "ClueCon").await?;
//!
//!     let response = conn.api("status").await?;
//!     println!("status: {}", response.result);
//!
//!     conn.bgapi("originate user/1000 &park", |reply| {
//!         println!("job finished: ok={} {}", reply.ok, reply.result);
//!     })
//!     .await?;
//!
//!     conn.subscribe("HEARTBEAT", &[], |event| {
//!         println!("uptime: {:?}", event.header("Up-Time"));
//!     })
//!     .await?;
//!
//!     conn.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Outbound mode
//!
//! FreeSWITCH connects to *your* application via the `socket` dialplan
//! application:
//!
//! ```xml
//! <action application="socket" data="127.0.0.1:8040 async full"/>
//! ```
//!
//! ```rust,no_run
//! use eslmux::{EslListener, EslResult};
//!
//! #[tokio::main]
//! async fn main() -> EslResult<()> {
//!     EslListener::bind("127.0.0.1:8040")
//!         .await?
//!         .pre_init(|conn, _chan| async move {
//!             // Runs before the event feed opens; handlers bound here
//!             // cannot miss early events.
//!             conn.bind(&[("event-name", "CHANNEL_ANSWER")], |event| {
//!                 println!("answered: {:?}", event.unique_id());
//!             });
//!             Ok(())
//!         })
//!         .serve(|conn, chan| async move {
//!             println!("call for {:?}", chan.destination_number());
//!             conn.execute("answer", Default::default()).await?;
//!             conn.execute("playback ivr/ivr-welcome.wav", Default::default())
//!                 .await?;
//!             conn.wait_closed().await;
//!             Ok(())
//!         })
//!         .await
//! }
//! ```
//!
//! The default per-session init sends `linger` (so hangup events are not
//! lost to an instant socket close) and `myevents plain` (so the socket
//! receives the channel's events). Supply
//! [`EslListener::init`] to take over that stage.

#[macro_use]
mod macros;

pub mod command;
pub mod connection;
pub mod constants;
pub mod error;
pub mod event;
pub mod handler;
pub mod headers;
pub mod outbound;
pub mod protocol;

pub(crate) mod buffer;

pub use command::{ApiResponse, BgapiReply, CommandBuilder, CommandReply};
pub use connection::{
    CloseCallback, ConnectionMode, ConnectionStatus, DisconnectReason, EslConnectOptions,
    EslConnection, ExecuteOptions, ResponseFuture,
};
pub use constants::DEFAULT_ESL_PORT;
pub use error::{EslError, EslResult};
pub use event::{EslEvent, EventFormat, SpecialEvent};
pub use handler::{silence_stray_events, DispatchMode, EventHandler, HandlerKey};
pub use headers::EventHeader;
pub use outbound::{ChannelData, EslListenOptions, EslListener};
pub use protocol::{EslMessage, EslParser, MessageType};
