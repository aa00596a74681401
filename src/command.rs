//! Outgoing frame encoding and typed response parsing

use crate::{
    constants::{HEADER_REPLY_TEXT, LINE_TERMINATOR},
    error::{EslError, EslResult},
    event::EslEvent,
    headers::EventHeader,
    protocol::EslMessage,
};
use std::fmt::Write;

/// Collapse embedded newlines in a header value to single spaces.
///
/// Header values are single-line on the wire; a value like
/// `"hello \n world \n"` is emitted as `hello world`. The body is
/// length-delimited and never touched by this.
fn collapse_newlines(value: &str) -> String {
    value
        .split('\n')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate that a command line contains no newline characters.
///
/// ESL frames are line-delimited; an embedded newline in the command line
/// would let callers inject arbitrary protocol commands.
fn validate_command_line(line: &str) -> EslResult<()> {
    if line.contains('\n') || line.contains('\r') {
        return Err(EslError::invalid_argument(
            "command line must not contain newlines",
        ));
    }
    Ok(())
}

/// Builder producing one wire-format ESL frame: command line, headers,
/// optional length-delimited body.
///
/// Headers keep insertion order. Header values have embedded newlines
/// collapsed to single spaces; `None`-valued headers are dropped.
///
/// ```
/// use eslmux::CommandBuilder;
///
/// let frame = CommandBuilder::new("sendmsg").unwrap()
///     .header("call-command", "execute")
///     .header("execute-app-name", "playback")
///     .body("/tmp/prompt.wav")
///     .build();
/// assert!(frame.starts_with("sendmsg\n"));
/// assert!(frame.contains("call-command: execute\n"));
/// assert!(frame.contains("Content-Length: 15\n"));
/// ```
#[derive(Debug)]
pub struct CommandBuilder {
    line: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl CommandBuilder {
    /// Start building a frame with the given command line.
    ///
    /// Fails if the line contains newline characters.
    pub fn new(line: &str) -> EslResult<Self> {
        validate_command_line(line)?;
        Ok(Self {
            line: line.to_string(),
            headers: Vec::new(),
            body: None,
        })
    }

    /// Append a header. Embedded newlines in the value are collapsed to
    /// single spaces; newlines in the name are rejected at build time by
    /// collapsing as well.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((collapse_newlines(name), collapse_newlines(value)));
        self
    }

    /// Append a header only when the value is present.
    pub fn header_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.header(name, v),
            None => self,
        }
    }

    /// Set the frame body. The body is length-delimited so it may contain
    /// newlines.
    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Build the wire-format frame.
    pub fn build(self) -> String {
        let mut result = self.line;
        result.push_str(LINE_TERMINATOR);

        for (name, value) in &self.headers {
            let _ = write!(result, "{}: {}{}", name, value, LINE_TERMINATOR);
        }

        match &self.body {
            Some(body) if !body.is_empty() => {
                let _ = write!(result, "Content-Length: {}{}", body.len(), LINE_TERMINATOR);
                result.push_str(LINE_TERMINATOR);
                result.push_str(body);
            }
            _ => result.push_str(LINE_TERMINATOR),
        }

        result
    }
}

/// Parsed `command/reply` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// `true` when `Reply-Text` starts with `+OK`.
    pub ok: bool,
    /// Raw `Reply-Text` value.
    pub reply_text: String,
    /// `Job-UUID` for `bgapi` replies, read from the dedicated header or
    /// from a `Job-UUID: <uuid>` fragment inside `Reply-Text`.
    pub job_uuid: Option<String>,
}

impl CommandReply {
    /// Parse a reply out of a `command/reply` message.
    pub fn from_message(message: &EslMessage) -> Self {
        let reply_text = message
            .header(HEADER_REPLY_TEXT)
            .unwrap_or("")
            .to_string();
        let job_uuid = message
            .header(EventHeader::JobUuid)
            .map(str::to_string)
            .or_else(|| {
                reply_text
                    .split_once("Job-UUID:")
                    .map(|(_, rest)| {
                        rest.trim()
                            .to_string()
                    })
                    .filter(|uuid| !uuid.is_empty())
            });

        Self {
            ok: reply_text.starts_with("+OK"),
            reply_text,
            job_uuid,
        }
    }

    /// Convert to an error when the reply is `-ERR`.
    pub fn into_result(self) -> EslResult<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(EslError::CommandFailed {
                reply_text: self.reply_text,
            })
        }
    }
}

/// Parsed `api/response` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// `true` unless the body starts with `-ERR`. FreeSWITCH api output is
    /// free-form; anything that is not an explicit error counts as success.
    pub ok: bool,
    /// The full response body.
    pub result: String,
}

impl ApiResponse {
    /// Parse a response out of an `api/response` message.
    pub fn from_message(message: &EslMessage) -> Self {
        let result = message
            .body
            .clone()
            .unwrap_or_default();
        Self {
            ok: !result.starts_with("-ERR"),
            result,
        }
    }

    /// Convert to an error when the body is `-ERR`.
    pub fn into_result(self) -> EslResult<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(EslError::CommandFailed {
                reply_text: self
                    .result
                    .trim_end()
                    .to_string(),
            })
        }
    }
}

/// Completed `bgapi` job, delivered to the handler passed to
/// [`EslConnection::bgapi`](crate::EslConnection::bgapi).
#[derive(Debug, Clone)]
pub struct BgapiReply {
    /// `true` unless the job result starts with `-ERR`.
    pub ok: bool,
    /// The job result (the `BACKGROUND_JOB` event body).
    pub result: String,
    /// The full `BACKGROUND_JOB` event.
    pub event: EslEvent,
}

impl BgapiReply {
    /// Parse a job result out of a `BACKGROUND_JOB` event.
    pub fn from_event(event: EslEvent) -> Self {
        let result = event
            .body()
            .unwrap_or("")
            .to_string();
        Self {
            ok: !result.starts_with("-ERR"),
            result,
            event,
        }
    }
}
