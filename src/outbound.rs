//! Outbound-mode TCP listener
//!
//! In outbound mode FreeSWITCH dials *us*: the dialplan `socket`
//! application opens one TCP connection per call. The listener accepts
//! each socket, performs the `connect` handshake to fetch the channel
//! variables, runs the init stage (by default `linger` + `myevents`),
//! and hands the connection to the session handler.
//!
//! Configure FreeSWITCH with:
//! ```xml
//! <action application="socket" data="127.0.0.1:8040 async full"/>
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectionMode, EslConnectOptions, EslConnection},
    constants::{DEFAULT_EVENT_QUEUE_SIZE, DEFAULT_RESPONSE_TIMEOUT_MS},
    error::{EslError, EslResult},
    event::normalize_header_name,
    handler::DispatchMode,
    protocol::{EslMessage, EslParser},
};

/// Channel variables returned by the `connect` handshake.
///
/// FreeSWITCH answers `connect` with a `command/reply` whose headers are
/// the full set of channel variables for the attached call, percent-
/// decoded. Lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct ChannelData {
    headers: HashMap<String, String>,
}

impl ChannelData {
    fn from_message(message: &EslMessage) -> Self {
        Self {
            headers: message
                .headers
                .clone(),
        }
    }

    /// Look up a channel variable header by name (case-insensitive).
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(&normalize_header_name(name.as_ref()))
            .map(|s| s.as_str())
    }

    /// All headers, keyed by normalized name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// `Unique-ID` of the attached channel, falling back to
    /// `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.get("Unique-ID")
            .or_else(|| self.get("Caller-Unique-ID"))
    }

    /// `Channel-Name` (e.g. `sofia/internal/1000@domain`).
    pub fn channel_name(&self) -> Option<&str> {
        self.get("Channel-Name")
    }

    /// `Caller-Caller-ID-Number`.
    pub fn caller_id_number(&self) -> Option<&str> {
        self.get("Caller-Caller-ID-Number")
    }

    /// `Caller-Destination-Number` — the dialed number.
    pub fn destination_number(&self) -> Option<&str> {
        self.get("Caller-Destination-Number")
    }

    /// Look up a channel variable by name (the `variable_{name}` header).
    pub fn variable(&self, name: &str) -> Option<&str> {
        let key = format!("variable_{}", name);
        self.get(&key)
    }
}

/// Per-session async hook: pre-init, custom init, or the main handler.
pub type SessionHook =
    Arc<dyn Fn(EslConnection, ChannelData) -> BoxFuture<'static, EslResult<()>> + Send + Sync>;

/// Hook invoked when a session's connection closes.
pub type SessionCloseHook = Arc<dyn Fn(EslConnection) + Send + Sync>;

/// Options for listener configuration, applied to every accepted session.
#[derive(Debug, Clone)]
pub struct EslListenOptions {
    /// Request/reply round-trip timeout per session. Default: 30 seconds.
    pub resp_timeout: Duration,
    /// How each session's dispatch worker runs. Default: OS thread.
    pub dispatch: DispatchMode,
    /// Incoming event queue depth per session. Default: 32.
    pub incoming_buffer_size: usize,
}

impl Default for EslListenOptions {
    fn default() -> Self {
        Self {
            resp_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            dispatch: DispatchMode::default(),
            incoming_buffer_size: DEFAULT_EVENT_QUEUE_SIZE,
        }
    }
}

/// TCP listener accepting outbound connections from FreeSWITCH.
///
/// ```rust,no_run
/// use eslmux::{EslListener, EslResult};
///
/// #[tokio::main]
/// async fn main() -> EslResult<()> {
///     EslListener::bind("0.0.0.0:8040")
///         .await?
///         .pre_init(|conn, _chan| async move {
///             // Bound before init finishes, so early events are not lost
///             conn.bind(&[("event-name", "CHANNEL_ANSWER")], |event| {
///                 println!("answered: {:?}", event.unique_id());
///             });
///             Ok(())
///         })
///         .serve(|conn, chan| async move {
///             println!("call from {:?}", chan.caller_id_number());
///             conn.execute("answer", Default::default()).await?;
///             conn.execute("playback ivr/ivr-welcome.wav", Default::default())
///                 .await?;
///             conn.wait_closed().await;
///             Ok(())
///         })
///         .await
/// }
/// ```
pub struct EslListener {
    listener: TcpListener,
    options: EslListenOptions,
    pre_init: Option<SessionHook>,
    init: Option<SessionHook>,
    on_close: Option<SessionCloseHook>,
}

fn session_hook<H, Fut>(hook: H) -> SessionHook
where
    H: Fn(EslConnection, ChannelData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EslResult<()>> + Send + 'static,
{
    Arc::new(move |conn, chan_data| Box::pin(hook(conn, chan_data)))
}

impl EslListener {
    /// Bind the listener with default options.
    pub async fn bind(addr: &str) -> EslResult<Self> {
        Self::bind_with_options(addr, EslListenOptions::default()).await
    }

    /// Bind the listener with custom options.
    pub async fn bind_with_options(addr: &str, options: EslListenOptions) -> EslResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(EslError::Io)?;
        info!("listening for outbound ESL connections on {}", addr);
        Ok(Self {
            listener,
            options,
            pre_init: None,
            init: None,
            on_close: None,
        })
    }

    /// The bound local address, useful when binding port 0.
    pub fn local_addr(&self) -> EslResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(EslError::Io)
    }

    /// Hook run after the `connect` handshake but before init.
    ///
    /// This is the place to bind event handlers: init enables the event
    /// feed (`myevents`), so a handler bound here is guaranteed to exist
    /// before the first event can possibly arrive. Handlers bound later —
    /// inside the session handler — race against early events like
    /// `CHANNEL_ANSWER`.
    pub fn pre_init<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(EslConnection, ChannelData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EslResult<()>> + Send + 'static,
    {
        self.pre_init = Some(session_hook(hook));
        self
    }

    /// Replace the default init stage (`linger` then `myevents plain`).
    ///
    /// Without `linger`, FreeSWITCH closes the socket the moment the
    /// channel hangs up and the hangup events are lost; without
    /// `myevents` the socket receives no channel events at all. A custom
    /// init takes over responsibility for both.
    pub fn init<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(EslConnection, ChannelData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EslResult<()>> + Send + 'static,
    {
        self.init = Some(session_hook(hook));
        self
    }

    /// Hook invoked exactly once per session when its connection closes.
    pub fn on_close<H>(mut self, hook: H) -> Self
    where
        H: Fn(EslConnection) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }

    /// Accept connections forever, running `handler` for each call in its
    /// own task. Session errors are logged and close that session only;
    /// the accept loop itself ends only on listener I/O failure.
    pub async fn serve<H, Fut>(self, handler: H) -> EslResult<()>
    where
        H: Fn(EslConnection, ChannelData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EslResult<()>> + Send + 'static,
    {
        let handler = session_hook(handler);

        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(EslError::Io)?;
            info!("accepted outbound connection from {}", addr);

            let options = self
                .options
                .clone();
            let pre_init = self
                .pre_init
                .clone();
            let init = self
                .init
                .clone();
            let on_close = self
                .on_close
                .clone();
            let handler = handler.clone();

            tokio::spawn(async move {
                if let Err(err) =
                    run_session(stream, options, pre_init, init, on_close, handler).await
                {
                    warn!("outbound session from {} failed: {}", addr, err);
                }
            });
        }
    }
}

/// Drive one outbound session: handshake, hooks, handler, teardown.
async fn run_session(
    stream: TcpStream,
    options: EslListenOptions,
    pre_init: Option<SessionHook>,
    init: Option<SessionHook>,
    on_close: Option<SessionCloseHook>,
    handler: SessionHook,
) -> EslResult<()> {
    let mut conn_options = EslConnectOptions {
        resp_timeout: options.resp_timeout,
        dispatch: options.dispatch,
        incoming_buffer_size: options.incoming_buffer_size,
        ..EslConnectOptions::default()
    };
    if let Some(hook) = on_close {
        conn_options.on_close = Some(Box::new(move |conn| hook(conn)));
    }
    let dispatch = conn_options.dispatch;

    let (conn, event_rx) = EslConnection::spawn_io(
        stream,
        EslParser::new(),
        ConnectionMode::Outbound,
        conn_options,
    );

    let result = async {
        // First command must be connect: the reply carries every channel
        // variable for the attached call.
        let reply = conn
            .request("connect", &[], None)
            .await?;
        let chan_data = ChannelData::from_message(&reply);
        debug!(
            "session channel data: {} ({})",
            chan_data
                .channel_name()
                .unwrap_or("?"),
            chan_data
                .unique_id()
                .unwrap_or("?")
        );

        if let Some(pre_init) = &pre_init {
            pre_init(conn.clone(), chan_data.clone()).await?;
        }

        match &init {
            Some(init) => init(conn.clone(), chan_data.clone()).await?,
            None => {
                conn.request("linger", &[], None)
                    .await?;
                conn.request("myevents plain", &[], None)
                    .await?;
            }
        }

        // Events queued during init drain to the handlers bound above
        conn.start_dispatch(event_rx, dispatch);

        handler(conn.clone(), chan_data).await
    }
    .await;

    conn.close()
        .await;
    result
}
