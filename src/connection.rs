//! Connection lifecycle and the per-connection I/O multiplexer
//!
//! One [`EslConnection`] owns a TCP stream and two long-lived workers: a
//! reader task feeding the parser and a dispatch worker draining the event
//! queue. Commands from any number of concurrent callers are serialized
//! through a single writer lock that also owns the outstanding-response
//! FIFO — the ESL peer answers strictly in request order, so the byte
//! write and the slot push must be one atomic step or concurrent callers
//! would receive each other's replies.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    command::{ApiResponse, BgapiReply, CommandBuilder, CommandReply},
    constants::{
        DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_EVENT_QUEUE_SIZE, DEFAULT_RESPONSE_TIMEOUT_MS,
        HEADER_CONTENT_DISPOSITION, SOCKET_BUF_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, SpecialEvent},
    handler::{spawn_dispatcher, DispatchMode, EventHandler, HandlerKey, HandlerRegistry},
    protocol::{EslMessage, EslParser, MessageType},
};

/// Connection mode for ESL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Inbound connection - client connects to FreeSWITCH
    Inbound,
    /// Outbound connection - FreeSWITCH connects to client
    Outbound,
}

/// Connection status
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// ESL session is active.
    Connected,
    /// ESL session ended.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Clean EOF on the TCP connection
    ServerClosed,
    /// Server sent text/rude-rejection
    Rejected,
    /// A response did not arrive in time; the connection is poisoned
    /// because a late reply would misalign the response FIFO
    ResponseTimeout,
    /// Client called close() or disconnect()
    ClientRequested,
    /// I/O or protocol failure (io::Error is not Clone, so the message
    /// is stored)
    Failed(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerClosed => write!(f, "connection closed by server"),
            DisconnectReason::Rejected => write!(f, "rejected by server access control"),
            DisconnectReason::ResponseTimeout => write!(f, "response timeout"),
            DisconnectReason::ClientRequested => write!(f, "client requested close"),
            DisconnectReason::Failed(msg) => write!(f, "connection failed: {}", msg),
        }
    }
}

/// Callback invoked exactly once when the connection closes.
pub type CloseCallback = Box<dyn FnOnce(EslConnection) + Send>;

/// Options for connection configuration.
pub struct EslConnectOptions {
    /// TCP dial timeout. Default: 10 seconds.
    pub conn_timeout: Duration,
    /// Request/reply round-trip timeout, also covering the auth handshake.
    /// Default: 30 seconds.
    pub resp_timeout: Duration,
    /// How the event dispatch worker runs. Default: a dedicated OS thread.
    pub dispatch: DispatchMode,
    /// Incoming event queue depth before the reader stops consuming the
    /// socket (TCP flow control takes over). Default: 32.
    pub incoming_buffer_size: usize,
    /// Invoked exactly once when the connection closes, however it closes.
    pub on_close: Option<CloseCallback>,
}

impl Default for EslConnectOptions {
    fn default() -> Self {
        Self {
            conn_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            resp_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            dispatch: DispatchMode::default(),
            incoming_buffer_size: DEFAULT_EVENT_QUEUE_SIZE,
            on_close: None,
        }
    }
}

impl fmt::Debug for EslConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslConnectOptions")
            .field("conn_timeout", &self.conn_timeout)
            .field("resp_timeout", &self.resp_timeout)
            .field("dispatch", &self.dispatch)
            .field("incoming_buffer_size", &self.incoming_buffer_size)
            .field(
                "on_close",
                &self
                    .on_close
                    .is_some(),
            )
            .finish()
    }
}

/// Options for [`EslConnection::execute`].
#[derive(Default)]
pub struct ExecuteOptions {
    /// Target channel UUID. Required in inbound mode; in outbound mode the
    /// socket is already attached to a channel.
    pub channel_uuid: Option<String>,
    /// Correlation UUID sent as `Event-UUID`. Generated when absent.
    pub event_uuid: Option<String>,
    /// Sets `event-lock: true` so applications queue instead of replacing
    /// each other.
    pub event_lock: bool,
    /// `loops` header: how many times the application repeats.
    pub loops: Option<u32>,
    /// Invoked once on the matching `CHANNEL_EXECUTE` event.
    pub on_start: Option<Box<dyn FnOnce(EslEvent) + Send>>,
    /// Invoked once on the matching `CHANNEL_EXECUTE_COMPLETE` event.
    pub on_complete: Option<Box<dyn FnOnce(EslEvent) + Send>>,
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("channel_uuid", &self.channel_uuid)
            .field("event_uuid", &self.event_uuid)
            .field("event_lock", &self.event_lock)
            .field("loops", &self.loops)
            .field(
                "on_start",
                &self
                    .on_start
                    .is_some(),
            )
            .field(
                "on_complete",
                &self
                    .on_complete
                    .is_some(),
            )
            .finish()
    }
}

/// Writer half plus the outstanding-response FIFO. Held under one lock so
/// the wire order and the slot order cannot diverge.
struct SendState {
    writer: OwnedWriteHalf,
    slots: VecDeque<oneshot::Sender<EslMessage>>,
}

struct Shared {
    mode: ConnectionMode,
    send: Mutex<SendState>,
    resp_timeout_ms: AtomicU64,
    registry: Arc<StdMutex<HandlerRegistry>>,
    specials: StdMutex<HashSet<SpecialEvent>>,
    status_tx: watch::Sender<ConnectionStatus>,
    closed: AtomicBool,
    on_close: StdMutex<Option<CloseCallback>>,
}

/// ESL connection handle (Clone + Send + Sync).
///
/// Safe to share across any number of concurrent callers; see the module
/// docs for the ordering guarantee that makes this work.
#[derive(Clone)]
pub struct EslConnection {
    inner: Arc<Shared>,
}

impl fmt::Debug for EslConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslConnection")
            .field("mode", &self.inner.mode)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Future resolving to the reply for one sent frame.
///
/// Returned by [`EslConnection::send`]. Resolves with
/// [`EslError::ConnectionClosed`] if the connection goes away first.
pub struct ResponseFuture {
    rx: oneshot::Receiver<EslMessage>,
}

impl Future for ResponseFuture {
    type Output = EslResult<EslMessage>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|result| result.map_err(|_| EslError::ConnectionClosed))
    }
}

/// Update the enabled-special-events set from an outgoing command line.
///
/// Only the first token matters, and matching is prefix-based because
/// FreeSWITCH itself tolerates arbitrary suffixes on the verb
/// (`eventsarefunny` subscribes just like `event`).
fn apply_special_tracking(specials: &mut HashSet<SpecialEvent>, line: &str) {
    let mut tokens = line
        .trim_start()
        .split_whitespace();
    let Some(verb) = tokens.next() else {
        return;
    };
    let verb = verb.to_ascii_lowercase();

    if verb.starts_with("myevents") {
        specials.extend(SpecialEvent::CHANNEL);
    } else if verb.starts_with("nixevent") {
        for arg in tokens {
            if let Ok(special) = arg.parse::<SpecialEvent>() {
                specials.remove(&special);
            }
        }
    } else if verb.starts_with("noevents") {
        specials.clear();
    } else if verb.starts_with("nolog") {
        specials.remove(&SpecialEvent::Log);
    } else if verb.starts_with("log") {
        specials.insert(SpecialEvent::Log);
    } else if verb.starts_with("event") {
        for arg in tokens {
            if let Ok(special) = arg.parse::<SpecialEvent>() {
                specials.insert(special);
            }
        }
    }
}

/// Verbs with dedicated request methods; [`EslConnection::command`]
/// rejects them because their framing differs from a bare command line.
fn reserved_verb(text: &str) -> Option<&'static str> {
    let lowered = text
        .trim_start()
        .to_ascii_lowercase();
    ["bgapi", "sendmsg", "sendevent"]
        .into_iter()
        .find(|verb| lowered.starts_with(verb))
}

/// Split an application command at the first whitespace:
/// `"playback /tmp/a.wav"` becomes `("playback", Some("/tmp/a.wav"))`.
fn split_app_command(app_cmd: &str) -> (&str, Option<&str>) {
    let trimmed = app_cmd.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim_start())),
        None => (trimmed, None),
    }
}

/// Read one message off an unsplit stream. Used only during the inbound
/// auth handshake, before the reader task owns the socket.
async fn recv_message(
    stream: &mut TcpStream,
    parser: &mut EslParser,
    read_buffer: &mut [u8],
    window: Duration,
) -> EslResult<EslMessage> {
    loop {
        if let Some(message) = parser.parse_message()? {
            trace!("handshake message: {:?}", message.message_type);
            return Ok(message);
        }

        let bytes_read = match timeout(window, stream.read(read_buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(EslError::Io(e)),
            Err(_) => {
                return Err(EslError::Timeout {
                    timeout_ms: window.as_millis() as u64,
                })
            }
        };

        if bytes_read == 0 {
            return Err(EslError::ConnectionClosed);
        }

        parser.add_data(&read_buffer[..bytes_read])?;
    }
}

/// Perform the password handshake on the freshly dialed stream.
async fn authenticate(
    stream: &mut TcpStream,
    parser: &mut EslParser,
    read_buffer: &mut [u8],
    password: &str,
    window: Duration,
) -> EslResult<()> {
    debug!("waiting for auth request");
    let challenge = recv_message(stream, parser, read_buffer, window).await?;

    match challenge.message_type {
        MessageType::AuthRequest => {}
        MessageType::RudeRejection => {
            warn!("server sent rude-rejection before auth");
            return Err(EslError::AuthRejected);
        }
        other => {
            return Err(EslError::protocol_error(format!(
                "expected auth request, got {:?}",
                other
            )))
        }
    }

    let frame = CommandBuilder::new(&format!("auth {}", password))?.build();
    debug!("sending command: auth [REDACTED]");
    stream
        .write_all(frame.as_bytes())
        .await
        .map_err(EslError::Io)?;

    let reply_msg = recv_message(stream, parser, read_buffer, window).await?;
    if reply_msg.message_type == MessageType::RudeRejection {
        return Err(EslError::AuthRejected);
    }
    let reply = CommandReply::from_message(&reply_msg);
    if !reply.ok {
        return Err(EslError::auth_failed(reply.reply_text));
    }

    debug!("authentication successful");
    Ok(())
}

/// Background reader loop. Panics in the loop body must not silently kill
/// the connection, so the inner future runs under catch_unwind.
async fn reader_loop(
    conn: EslConnection,
    reader: OwnedReadHalf,
    parser: EslParser,
    event_tx: mpsc::Sender<EslEvent>,
) {
    let inner = AssertUnwindSafe(reader_loop_inner(conn.clone(), reader, parser, event_tx));
    if futures_util::FutureExt::catch_unwind(inner)
        .await
        .is_err()
    {
        tracing::error!("reader task panicked");
        conn.close_with(DisconnectReason::Failed("reader task panicked".to_string()))
            .await;
    }
}

async fn reader_loop_inner(
    conn: EslConnection,
    mut reader: OwnedReadHalf,
    mut parser: EslParser,
    event_tx: mpsc::Sender<EslEvent>,
) {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
    let mut status_rx = conn
        .inner
        .status_tx
        .subscribe();

    loop {
        if conn
            .inner
            .closed
            .load(Ordering::SeqCst)
        {
            return;
        }

        // Drain complete messages before touching the socket again
        match parser.parse_message() {
            Ok(Some(message)) => {
                match route_message(&conn, &parser, message).await {
                    Routed::Continue => {}
                    Routed::Event(event) => {
                        // Bounded queue: waiting here stops socket reads,
                        // which is the flow-control point.
                        tokio::select! {
                            sent = event_tx.send(event) => {
                                if sent.is_err() {
                                    debug!("event queue gone, dropping event");
                                }
                            }
                            _ = status_rx.changed() => return,
                        }
                    }
                    Routed::Shutdown(reason) => {
                        conn.close_with(reason)
                            .await;
                        return;
                    }
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("parser error: {}", e);
                conn.close_with(DisconnectReason::Failed(e.to_string()))
                    .await;
                return;
            }
        }

        tokio::select! {
            read = reader.read(&mut read_buffer) => match read {
                Ok(0) => {
                    info!("connection closed (EOF)");
                    conn.close_with(DisconnectReason::ServerClosed).await;
                    return;
                }
                Ok(n) => {
                    if let Err(e) = parser.add_data(&read_buffer[..n]) {
                        warn!("buffer error: {}", e);
                        conn.close_with(DisconnectReason::Failed(e.to_string())).await;
                        return;
                    }
                }
                Err(e) => {
                    warn!("read error: {}", e);
                    conn.close_with(DisconnectReason::Failed(e.to_string())).await;
                    return;
                }
            },
            _ = status_rx.changed() => {
                debug!("local close requested, reader exiting");
                return;
            }
        }
    }
}

enum Routed {
    Continue,
    Event(EslEvent),
    Shutdown(DisconnectReason),
}

async fn route_message(conn: &EslConnection, parser: &EslParser, message: EslMessage) -> Routed {
    match message.message_type {
        MessageType::CommandReply | MessageType::ApiResponse => {
            let waiter = conn
                .inner
                .send
                .lock()
                .await
                .slots
                .pop_front();
            match waiter {
                // The waiter may have timed out and gone; the connection
                // is being poisoned in that case, nothing to do here.
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => warn!("received {:?} with no outstanding request", message.message_type),
            }
            Routed::Continue
        }
        MessageType::Event => match parser.parse_event(message) {
            Ok(event) => Routed::Event(event),
            Err(e) => {
                // Unparseable payload: drop the message, keep the session
                warn!("dropping unparseable event: {}", e);
                Routed::Continue
            }
        },
        MessageType::DisconnectNotice => {
            // The peer closes the socket itself; with linger active the
            // remaining events are still deliverable until then.
            info!(
                "received disconnect notice (disposition: {})",
                message
                    .header(HEADER_CONTENT_DISPOSITION)
                    .unwrap_or("none")
            );
            Routed::Continue
        }
        MessageType::RudeRejection => {
            warn!("server sent rude-rejection, closing");
            Routed::Shutdown(DisconnectReason::Rejected)
        }
        MessageType::AuthRequest => {
            debug!("ignoring unexpected auth request");
            Routed::Continue
        }
        MessageType::Unknown(ref ct) => {
            debug!("ignoring message with unknown content type: {}", ct);
            Routed::Continue
        }
    }
}

impl EslConnection {
    /// Connect to FreeSWITCH (inbound mode) with password authentication.
    pub async fn connect(host: &str, port: u16, password: &str) -> EslResult<Self> {
        Self::connect_with_options(host, port, password, EslConnectOptions::default()).await
    }

    /// Connect to FreeSWITCH (inbound mode) with custom options.
    pub async fn connect_with_options(
        host: &str,
        port: u16,
        password: &str,
        options: EslConnectOptions,
    ) -> EslResult<Self> {
        info!("connecting to FreeSWITCH at {}:{}", host, port);

        let mut stream = match timeout(options.conn_timeout, TcpStream::connect((host, port))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("TCP connect failed: {}", e);
                return Err(EslError::Io(e));
            }
            Err(_) => {
                warn!(
                    "TCP connect timed out after {}ms",
                    options
                        .conn_timeout
                        .as_millis()
                );
                return Err(EslError::Timeout {
                    timeout_ms: options
                        .conn_timeout
                        .as_millis() as u64,
                });
            }
        };

        let mut parser = EslParser::new();
        let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
        authenticate(
            &mut stream,
            &mut parser,
            &mut read_buffer,
            password,
            options.resp_timeout,
        )
        .await?;

        let dispatch = options.dispatch;
        let (conn, event_rx) = Self::spawn_io(stream, parser, ConnectionMode::Inbound, options);
        conn.start_dispatch(event_rx, dispatch);

        info!("connected and authenticated");
        Ok(conn)
    }

    /// Attach a connection to an already-established stream and start the
    /// reader task. The dispatch worker is started separately so outbound
    /// sessions can bind handlers before events flow.
    pub(crate) fn spawn_io(
        stream: TcpStream,
        parser: EslParser,
        mode: ConnectionMode,
        options: EslConnectOptions,
    ) -> (Self, mpsc::Receiver<EslEvent>) {
        let (read_half, write_half) = stream.into_split();
        let (status_tx, _status_rx) = watch::channel(ConnectionStatus::Connected);
        let (event_tx, event_rx) = mpsc::channel(
            options
                .incoming_buffer_size
                .max(1),
        );

        let inner = Arc::new(Shared {
            mode,
            send: Mutex::new(SendState {
                writer: write_half,
                slots: VecDeque::new(),
            }),
            resp_timeout_ms: AtomicU64::new(
                options
                    .resp_timeout
                    .as_millis() as u64,
            ),
            registry: Arc::new(StdMutex::new(HandlerRegistry::new())),
            specials: StdMutex::new(HashSet::new()),
            status_tx,
            closed: AtomicBool::new(false),
            on_close: StdMutex::new(options.on_close),
        });

        let conn = EslConnection { inner };
        tokio::spawn(reader_loop(conn.clone(), read_half, parser, event_tx));
        (conn, event_rx)
    }

    /// Start the event dispatch worker consuming `event_rx`.
    pub(crate) fn start_dispatch(&self, event_rx: mpsc::Receiver<EslEvent>, mode: DispatchMode) {
        spawn_dispatcher(mode, event_rx, Arc::clone(&self.inner.registry));
    }

    /// Connection mode (inbound or outbound).
    pub fn mode(&self) -> ConnectionMode {
        self.inner
            .mode
    }

    /// Whether the connection is alive (not yet disconnected).
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .inner
                .status_tx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .status_tx
            .borrow()
            .clone()
    }

    /// Wait until the connection has closed, however it closes.
    pub async fn wait_closed(&self) {
        let mut status_rx = self
            .inner
            .status_tx
            .subscribe();
        while matches!(*status_rx.borrow_and_update(), ConnectionStatus::Connected) {
            if status_rx
                .changed()
                .await
                .is_err()
            {
                return;
            }
        }
    }

    /// Set the request/reply round-trip timeout for subsequent calls.
    pub fn set_resp_timeout(&self, window: Duration) {
        self.inner
            .resp_timeout_ms
            .store(window.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the façade believes the peer is currently sending this
    /// special event.
    pub fn special_enabled(&self, special: SpecialEvent) -> bool {
        self.inner
            .specials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&special)
    }

    fn track_specials(&self, line: &str) {
        let mut specials = self
            .inner
            .specials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply_special_tracking(&mut specials, line);
    }

    /// Send one frame, returning a future for its reply.
    ///
    /// The write and the response-slot push happen under one lock, so
    /// replies always reach the caller whose request they answer, no
    /// matter how many tasks send concurrently.
    pub async fn send(
        &self,
        line: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> EslResult<ResponseFuture> {
        if !self.is_connected() {
            return Err(EslError::ConnectionClosed);
        }

        let mut builder = CommandBuilder::new(line)?;
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let frame = builder.build();

        self.track_specials(line);
        debug!("sending command: {}", line);

        let (tx, rx) = oneshot::channel();
        let write_result = {
            let mut send = self
                .inner
                .send
                .lock()
                .await;
            match send
                .writer
                .write_all(frame.as_bytes())
                .await
            {
                Ok(()) => {
                    send.slots
                        .push_back(tx);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = write_result {
            // A partial write leaves the wire unframed; nothing sane can
            // follow on this connection.
            warn!("write failed: {}", e);
            self.close_with(DisconnectReason::Failed(e.to_string()))
                .await;
            return Err(EslError::Io(e));
        }

        Ok(ResponseFuture { rx })
    }

    /// Send one frame and wait for its reply, bounded by the configured
    /// response timeout.
    ///
    /// On timeout the connection is closed before returning: a reply
    /// arriving later would be matched against the wrong slot, so the
    /// FIFO is poisoned and every other waiter fails with
    /// [`EslError::ConnectionClosed`].
    pub async fn request(
        &self,
        line: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> EslResult<EslMessage> {
        let response = self
            .send(line, headers, body)
            .await?;
        let timeout_ms = self
            .inner
            .resp_timeout_ms
            .load(Ordering::Relaxed);

        match timeout(Duration::from_millis(timeout_ms), response).await {
            Ok(result) => result,
            Err(_) => {
                warn!("response timeout after {}ms, closing connection", timeout_ms);
                self.close_with(DisconnectReason::ResponseTimeout)
                    .await;
                Err(EslError::Timeout { timeout_ms })
            }
        }
    }

    /// Run a façade operation inside the close-on-error boundary: any
    /// failure tears the connection down before the error propagates, so
    /// callers never hold a half-broken handle.
    async fn close_on_error<T>(
        &self,
        op: impl Future<Output = EslResult<T>>,
    ) -> EslResult<T> {
        match op.await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.close_with(DisconnectReason::Failed(err.to_string()))
                    .await;
                Err(err)
            }
        }
    }

    /// Send a bare command line and return its reply.
    ///
    /// Rejects `bgapi`, `sendmsg` and `sendevent` — those verbs have
    /// dedicated methods with the correct framing.
    pub async fn command(&self, text: &str) -> EslResult<CommandReply> {
        self.close_on_error(async {
            if let Some(verb) = reserved_verb(text) {
                return Err(EslError::invalid_argument(format!(
                    "`{}` has a dedicated request method",
                    verb
                )));
            }
            let message = self
                .request(text, &[], None)
                .await?;
            Ok(CommandReply::from_message(&message))
        })
        .await
    }

    /// Execute an api command, blocking the socket until FreeSWITCH
    /// completes it. Use [`bgapi`](Self::bgapi) for long-running commands.
    pub async fn api(&self, command: &str) -> EslResult<ApiResponse> {
        self.close_on_error(async {
            let message = self
                .request(&format!("api {}", command), &[], None)
                .await?;
            Ok(ApiResponse::from_message(&message))
        })
        .await
    }

    /// Execute a background api command; `handler` is invoked once with
    /// the job result when the `BACKGROUND_JOB` event arrives.
    ///
    /// The Job-UUID is generated locally and sent with the command. If
    /// FreeSWITCH allocated it instead, a fast-completing job could
    /// deliver its event before the handler is bound and the result would
    /// be lost; generating it first means the binding always exists by
    /// the time the server learns the UUID.
    pub async fn bgapi<F>(&self, command: &str, handler: F) -> EslResult<CommandReply>
    where
        F: FnOnce(BgapiReply) + Send + 'static,
    {
        self.close_on_error(async {
            self.ensure_special(SpecialEvent::BackgroundJob)
                .await?;

            let job_uuid = Uuid::new_v4().to_string();
            let key = HandlerKey::new(&[
                ("event-name", SpecialEvent::BackgroundJob.as_str()),
                ("job-uuid", &job_uuid),
            ]);
            self.bind_once(key.clone(), move |event| {
                handler(BgapiReply::from_event(event))
            });

            let result = self
                .request(
                    &format!("bgapi {}", command),
                    &[("Job-UUID", &job_uuid)],
                    None,
                )
                .await;

            match result {
                Ok(message) => {
                    let reply = CommandReply::from_message(&message);
                    if !reply.ok {
                        self.unbind_key(&key);
                    }
                    Ok(reply)
                }
                Err(err) => {
                    self.unbind_key(&key);
                    Err(err)
                }
            }
        })
        .await
    }

    /// Subscribe to an event and bind `handler` for it.
    ///
    /// The handler key is `{event-name:<name>}` plus `extra` pairs, so
    /// `subscribe("CUSTOM", &[("event-subclass", "sofia::register")], …)`
    /// narrows delivery to that subclass. The name `ALL` binds by the
    /// extra pairs alone — a plain catch-all when there are none.
    pub async fn subscribe<F>(
        &self,
        event_name: &str,
        extra: &[(&str, &str)],
        handler: F,
    ) -> EslResult<CommandReply>
    where
        F: Fn(EslEvent) + Send + Sync + 'static,
    {
        self.close_on_error(async {
            let key = if event_name.eq_ignore_ascii_case("ALL") {
                HandlerKey::new(extra)
            } else {
                let mut pairs = vec![("event-name", event_name)];
                pairs.extend_from_slice(extra);
                HandlerKey::new(&pairs)
            };

            self.bind_key(key.clone(), Arc::new(handler));

            let result = self
                .request(&format!("event plain {}", event_name), &[], None)
                .await;

            match result {
                Ok(message) => {
                    let reply = CommandReply::from_message(&message);
                    if !reply.ok {
                        self.unbind_key(&key);
                    }
                    Ok(reply)
                }
                Err(err) => {
                    self.unbind_key(&key);
                    Err(err)
                }
            }
        })
        .await
    }

    /// Fire an event into FreeSWITCH's event bus.
    pub async fn sendevent(
        &self,
        name: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> EslResult<CommandReply> {
        self.close_on_error(async {
            let message = self
                .request(&format!("sendevent {}", name), headers, body)
                .await?;
            Ok(CommandReply::from_message(&message))
        })
        .await
    }

    /// Send a message to a channel. Headers with `None` values are
    /// dropped; in outbound mode `chan_uuid` may be `None` because the
    /// socket is attached to a channel already.
    pub async fn sendmsg(
        &self,
        chan_uuid: Option<&str>,
        headers: &[(&str, Option<&str>)],
        body: Option<&str>,
    ) -> EslResult<CommandReply> {
        self.close_on_error(async {
            let line = match chan_uuid {
                Some(uuid) => format!("sendmsg {}", uuid),
                None => "sendmsg".to_string(),
            };
            let present: Vec<(&str, &str)> = headers
                .iter()
                .filter_map(|&(name, value)| value.map(|v| (name, v)))
                .collect();
            let message = self
                .request(&line, &present, body)
                .await?;
            Ok(CommandReply::from_message(&message))
        })
        .await
    }

    /// Execute a dialplan application on a channel via `sendmsg`.
    ///
    /// `app_cmd` is the application name followed by its argument, e.g.
    /// `"playback /tmp/prompt.wav"`. Start/complete handlers fire once on
    /// the `CHANNEL_EXECUTE` / `CHANNEL_EXECUTE_COMPLETE` events whose
    /// `Application-UUID` matches this invocation.
    pub async fn execute(
        &self,
        app_cmd: &str,
        mut opts: ExecuteOptions,
    ) -> EslResult<CommandReply> {
        self.close_on_error(async {
            let (app_name, app_arg) = split_app_command(app_cmd);
            if app_name.is_empty() {
                return Err(EslError::invalid_argument("empty application command"));
            }

            let event_uuid = opts
                .event_uuid
                .take()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let chan_uuid = opts
                .channel_uuid
                .take();

            let mut bound: Vec<HandlerKey> = Vec::new();
            let outcome = self
                .execute_inner(
                    app_name,
                    app_arg,
                    &event_uuid,
                    chan_uuid.as_deref(),
                    opts,
                    &mut bound,
                )
                .await;
            if outcome.is_err() {
                for key in &bound {
                    self.unbind_key(key);
                }
            }
            outcome
        })
        .await
    }

    async fn execute_inner(
        &self,
        app_name: &str,
        app_arg: Option<&str>,
        event_uuid: &str,
        chan_uuid: Option<&str>,
        mut opts: ExecuteOptions,
        bound: &mut Vec<HandlerKey>,
    ) -> EslResult<CommandReply> {
        if let Some(on_start) = opts
            .on_start
            .take()
        {
            self.ensure_special(SpecialEvent::ChannelExecute)
                .await?;
            let key = execute_handler_key(SpecialEvent::ChannelExecute, event_uuid, chan_uuid);
            self.bind_once(key.clone(), on_start);
            bound.push(key);
        }
        if let Some(on_complete) = opts
            .on_complete
            .take()
        {
            self.ensure_special(SpecialEvent::ChannelExecuteComplete)
                .await?;
            let key =
                execute_handler_key(SpecialEvent::ChannelExecuteComplete, event_uuid, chan_uuid);
            self.bind_once(key.clone(), on_complete);
            bound.push(key);
        }

        let line = match chan_uuid {
            Some(uuid) => format!("sendmsg {}", uuid),
            None => "sendmsg".to_string(),
        };
        let loops_value = opts
            .loops
            .map(|n| n.to_string());
        let mut headers: Vec<(&str, &str)> = vec![
            ("call-command", "execute"),
            ("execute-app-name", app_name),
            ("Event-UUID", event_uuid),
            ("content-type", "text/plain"),
        ];
        if let Some(loops) = loops_value.as_deref() {
            headers.push(("loops", loops));
        }
        if opts.event_lock {
            headers.push(("event-lock", "true"));
        }

        let message = self
            .request(&line, &headers, app_arg)
            .await?;
        Ok(CommandReply::from_message(&message))
    }

    /// Subscribe to a special event unless the peer is already sending
    /// it. The write goes out inline so ordering against the caller's
    /// next frame is preserved; the reply is consumed in the background.
    async fn ensure_special(&self, special: SpecialEvent) -> EslResult<()> {
        if self.special_enabled(special) {
            return Ok(());
        }
        debug!("auto-subscribing to {}", special);
        let response = self
            .send(&format!("event plain {}", special), &[], None)
            .await?;
        tokio::spawn(async move {
            let _ = response.await;
        });
        Ok(())
    }

    /// Bind an event handler for the given header/value pairs, replacing
    /// any handler already bound to the same key. An empty slice binds
    /// the catch-all handler.
    pub fn bind<F>(&self, key_pairs: &[(&str, &str)], handler: F)
    where
        F: Fn(EslEvent) + Send + Sync + 'static,
    {
        self.bind_key(HandlerKey::new(key_pairs), Arc::new(handler));
    }

    /// Remove the handler bound to the given pairs. Returns `true` when a
    /// handler was bound.
    pub fn unbind(&self, key_pairs: &[(&str, &str)]) -> bool {
        self.unbind_key(&HandlerKey::new(key_pairs))
    }

    /// Remove every bound handler.
    pub fn clear_handlers(&self) {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn bind_key(&self, key: HandlerKey, handler: EventHandler) {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .bind(key, handler);
    }

    fn unbind_key(&self, key: &HandlerKey) -> bool {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .unbind(key)
    }

    /// Bind a handler that unbinds itself before its single invocation.
    /// Keeps the registry from accumulating one entry per completed
    /// request on long-lived connections.
    fn bind_once<F>(&self, key: HandlerKey, handler: F)
    where
        F: FnOnce(EslEvent) + Send + 'static,
    {
        let registry = Arc::clone(&self.inner.registry);
        let own_key = key.clone();
        let cell = StdMutex::new(Some(handler));
        self.bind_key(
            key,
            Arc::new(move |event| {
                registry
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .unbind(&own_key);
                if let Some(f) = cell
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take()
                {
                    f(event);
                }
            }),
        );
    }

    /// Ask the peer to end the session with `exit`. Best-effort: transport
    /// errors are swallowed because the peer may already be gone, and the
    /// actual teardown happens when it closes the socket.
    pub async fn disconnect(&self) -> EslResult<()> {
        info!("sending exit");
        match self
            .send("exit", &[], None)
            .await
        {
            Ok(response) => {
                tokio::spawn(async move {
                    let _ = response.await;
                });
                Ok(())
            }
            Err(EslError::Io(_)) | Err(EslError::ConnectionClosed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Close the connection. Idempotent.
    ///
    /// Fails every outstanding response waiter, stops the reader (which
    /// in turn ends the dispatch worker once the event queue drains),
    /// fires the closed latch, and invokes the on-close callback exactly
    /// once.
    pub async fn close(&self) {
        self.close_with(DisconnectReason::ClientRequested)
            .await;
    }

    pub(crate) async fn close_with(&self, reason: DisconnectReason) {
        if self
            .inner
            .closed
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        info!("closing connection: {}", reason);

        // send_replace updates the value even with no live receivers, so
        // status()/is_connected() stay truthful after the reader exits
        self.inner
            .status_tx
            .send_replace(ConnectionStatus::Disconnected(reason));

        {
            let mut send = self
                .inner
                .send
                .lock()
                .await;
            // Dropping the senders wakes every waiter with ConnectionClosed
            send.slots
                .clear();
            let _ = send
                .writer
                .shutdown()
                .await;
        }

        let callback = self
            .inner
            .on_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            let conn = self.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(move || callback(conn))).is_err() {
                warn!("on-close callback panicked");
            }
        }
    }
}

fn execute_handler_key(
    event: SpecialEvent,
    event_uuid: &str,
    chan_uuid: Option<&str>,
) -> HandlerKey {
    let mut pairs = vec![
        ("event-name", event.as_str()),
        ("application-uuid", event_uuid),
    ];
    if let Some(uuid) = chan_uuid {
        pairs.push(("unique-id", uuid));
    }
    HandlerKey::new(&pairs)
}
