//! In-process mock ESL peers for integration tests.
//!
//! `spawn_server` plays the FreeSWITCH side of an inbound connection
//! (auth challenge + command loop); `run_mock_freeswitch` plays the
//! FreeSWITCH side of an outbound call socket (connect handshake +
//! scripted event timeline).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Duration, Instant};

pub const PASSWORD: &str = "ClueCon";

/// One client-to-server ESL frame: command line, headers, optional body.
#[derive(Debug)]
pub struct Frame {
    pub line: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Frame {
    pub fn verb(&self) -> &str {
        self.line
            .split_whitespace()
            .next()
            .unwrap_or("")
    }

    pub fn arg(&self) -> &str {
        self.line
            .split_once(' ')
            .map(|(_, rest)| rest)
            .unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub async fn read_frame(reader: &mut BufReader<OwnedReadHalf>) -> std::io::Result<Option<Frame>> {
    let mut line = String::new();

    let first = loop {
        line.clear();
        if reader
            .read_line(&mut line)
            .await?
            == 0
        {
            return Ok(None);
        }
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    let mut headers = Vec::new();
    loop {
        line.clear();
        if reader
            .read_line(&mut line)
            .await?
            == 0
        {
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let body_len = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok());
    let body = match body_len {
        Some(len) => {
            let mut buf = vec![0u8; len];
            reader
                .read_exact(&mut buf)
                .await?;
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
        None => None,
    };

    Ok(Some(Frame {
        line: first,
        headers,
        body,
    }))
}

pub fn command_reply(reply_text: &str) -> String {
    format!(
        "Content-Type: command/reply\nReply-Text: {}\n\n",
        reply_text
    )
}

pub fn command_reply_with(reply_text: &str, extra: &[(&str, &str)]) -> String {
    let mut out = format!("Content-Type: command/reply\nReply-Text: {}\n", reply_text);
    for (name, value) in extra {
        out.push_str(&format!("{}: {}\n", name, value));
    }
    out.push('\n');
    out
}

pub fn api_response(body: &str) -> String {
    format!(
        "Content-Type: api/response\nContent-Length: {}\n\n{}",
        body.len(),
        body
    )
}

pub fn plain_event(headers: &[(&str, &str)], body: Option<&str>) -> String {
    let mut event = String::new();
    for (name, value) in headers {
        event.push_str(&format!("{}: {}\n", name, value));
    }
    if let Some(body) = body {
        event.push_str(&format!("Content-Length: {}\n", body.len()));
        event.push('\n');
        event.push_str(body);
    }
    format!(
        "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
        event.len(),
        event
    )
}

pub fn disconnect_notice() -> String {
    "Content-Type: text/disconnect-notice\nContent-Disposition: disconnect\n\n".to_string()
}

/// How the inbound mock behaves after accepting.
#[derive(Debug, Clone, Copy)]
pub enum ServerBehavior {
    /// Auth challenge, then answer the command loop.
    Normal,
    /// Send `text/rude-rejection` instead of the auth challenge.
    RudeRejection,
    /// Complete auth, then never answer anything again.
    MuteAfterAuth,
}

pub struct MockServer {
    pub addr: SocketAddr,
    /// Raw frames pushed here are written to the connected client as-is.
    pub inject: mpsc::UnboundedSender<String>,
}

pub async fn spawn_server(behavior: ServerBehavior) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    let (inject, inject_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener
            .accept()
            .await
        {
            let _ = serve_client(stream, behavior, inject_rx).await;
        }
    });

    MockServer { addr, inject }
}

async fn serve_client(
    stream: TcpStream,
    behavior: ServerBehavior,
    mut inject_rx: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    if matches!(behavior, ServerBehavior::RudeRejection) {
        let body = "Access Denied, go away.\n";
        writer
            .write_all(
                format!(
                    "Content-Type: text/rude-rejection\nContent-Length: {}\n\n{}",
                    body.len(),
                    body
                )
                .as_bytes(),
            )
            .await?;
        return Ok(());
    }

    writer
        .write_all(b"Content-Type: auth/request\n\n")
        .await?;

    let Some(auth) = read_frame(&mut reader).await? else {
        return Ok(());
    };
    if auth.line != format!("auth {}", PASSWORD) {
        writer
            .write_all(command_reply("-ERR invalid").as_bytes())
            .await?;
        return Ok(());
    }
    writer
        .write_all(command_reply("+OK accepted").as_bytes())
        .await?;

    if matches!(behavior, ServerBehavior::MuteAfterAuth) {
        loop {
            if read_frame(&mut reader)
                .await?
                .is_none()
            {
                return Ok(());
            }
        }
    }

    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => {
                let Some(frame) = frame? else { return Ok(()); };
                if !respond(&frame, &mut writer).await? {
                    return Ok(());
                }
            }
            Some(raw) = inject_rx.recv() => {
                writer.write_all(raw.as_bytes()).await?;
            }
        }
    }
}

async fn respond(frame: &Frame, writer: &mut OwnedWriteHalf) -> std::io::Result<bool> {
    match frame.verb() {
        "api" => {
            // `api eval <x>` echoes <x>; anything else is +OK
            let body = frame
                .arg()
                .strip_prefix("eval ")
                .unwrap_or("+OK")
                .to_string();
            writer
                .write_all(api_response(&body).as_bytes())
                .await?;
        }
        "bgapi" => {
            let uuid = frame
                .header("Job-UUID")
                .unwrap_or("srv-job")
                .to_string();
            writer
                .write_all(
                    command_reply_with(
                        &format!("+OK Job-UUID: {}", uuid),
                        &[("Job-UUID", &uuid)],
                    )
                    .as_bytes(),
                )
                .await?;
            // The job completes instantly: the event chases the reply
            let result = format!("+OK {}\n", frame.arg());
            writer
                .write_all(
                    plain_event(
                        &[
                            ("Event-Name", "BACKGROUND_JOB"),
                            ("Job-UUID", &uuid),
                        ],
                        Some(&result),
                    )
                    .as_bytes(),
                )
                .await?;
        }
        "exit" => {
            writer
                .write_all(command_reply("+OK bye").as_bytes())
                .await?;
            return Ok(false);
        }
        _ => {
            writer
                .write_all(command_reply("+OK").as_bytes())
                .await?;
        }
    }
    Ok(true)
}

/// Script for one outbound call socket.
pub struct OutboundScript {
    /// Channel-variable headers attached to the `connect` reply.
    pub chan_headers: Vec<(&'static str, &'static str)>,
    /// Raw frames sent after init completes (`myevents` acknowledged),
    /// each after its own delay in milliseconds.
    pub timeline: Vec<(u64, String)>,
    /// Drop the socket once the timeline has been sent.
    pub close_at_end: bool,
}

impl Default for OutboundScript {
    fn default() -> Self {
        Self {
            chan_headers: vec![
                ("Unique-ID", "mock-chan-uuid"),
                ("Channel-Name", "sofia/internal/1000@mock"),
                ("Caller-Caller-ID-Number", "1000"),
                ("Caller-Destination-Number", "9999"),
            ],
            timeline: Vec::new(),
            close_at_end: false,
        }
    }
}

/// Dial `addr` and play the FreeSWITCH side of an outbound session,
/// recording every received verb into `verbs`.
pub async fn run_mock_freeswitch(
    addr: SocketAddr,
    script: OutboundScript,
    verbs: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut timeline: VecDeque<(u64, String)> = script
        .timeline
        .into();
    let mut init_done = false;
    let mut next_fire: Option<Instant> = None;

    loop {
        if init_done && next_fire.is_none() {
            match timeline.front() {
                Some((delay, _)) => {
                    next_fire = Some(Instant::now() + Duration::from_millis(*delay));
                }
                None if script.close_at_end => return Ok(()),
                None => {}
            }
        }

        tokio::select! {
            frame = read_frame(&mut reader) => {
                let Some(frame) = frame? else { return Ok(()); };
                let verb = frame.verb().to_string();
                verbs.lock().unwrap().push(verb.clone());
                match verb.as_str() {
                    "connect" => {
                        let mut extra: Vec<(&str, &str)> = vec![("Event-Name", "CHANNEL_DATA")];
                        extra.extend_from_slice(&script.chan_headers);
                        writer.write_all(command_reply_with("+OK", &extra).as_bytes()).await?;
                    }
                    "myevents" => {
                        writer.write_all(command_reply("+OK Events Enabled").as_bytes()).await?;
                        init_done = true;
                    }
                    "linger" => {
                        writer.write_all(command_reply("+OK will linger").as_bytes()).await?;
                    }
                    "exit" => {
                        writer.write_all(command_reply("+OK bye").as_bytes()).await?;
                        return Ok(());
                    }
                    _ => {
                        writer.write_all(command_reply("+OK").as_bytes()).await?;
                    }
                }
            }
            _ = async { sleep_until(next_fire.unwrap()).await }, if next_fire.is_some() => {
                if let Some((_, raw)) = timeline.pop_front() {
                    writer.write_all(raw.as_bytes()).await?;
                }
                next_fire = None;
            }
        }
    }
}

/// Poll `cond` until it holds or `deadline_ms` elapses.
pub async fn wait_until(deadline_ms: u64, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}
