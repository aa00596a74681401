//! ESL envelope framing and payload parsing
//!
//! An envelope is a header block terminated by a blank line, optionally
//! followed by a body whose length is declared by `Content-Length`. The
//! parser is incremental: feed it raw socket bytes with
//! [`EslParser::add_data`] and drain complete messages with
//! [`EslParser::parse_message`]; unconsumed bytes stay buffered for the
//! next read.

use crate::{
    buffer::EslBuffer,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_LOG_DATA, CONTENT_TYPE_RUDE_REJECTION,
        CONTENT_TYPE_TEXT_EVENT_JSON, CONTENT_TYPE_TEXT_EVENT_PLAIN, CONTENT_TYPE_TEXT_EVENT_XML,
        HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HEADER_TERMINATOR, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    event::{normalize_header_name, EslEvent},
};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// ESL message types, distinguished by the `Content-Type` header
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageType {
    /// Authentication challenge from the server
    AuthRequest,
    /// Reply to most commands; result in `Reply-Text`
    CommandReply,
    /// `api` command result; the body is the result text
    ApiResponse,
    /// Event message (plain, JSON, XML, or forwarded log line)
    Event,
    /// Server announces imminent close
    DisconnectNotice,
    /// ACL rejection; no auth handshake will occur
    RudeRejection,
    /// Anything else; logged and skipped
    Unknown(String),
}

impl MessageType {
    /// Parse message type from a Content-Type header value
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => MessageType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => MessageType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => MessageType::ApiResponse,
            CONTENT_TYPE_TEXT_EVENT_PLAIN
            | CONTENT_TYPE_TEXT_EVENT_JSON
            | CONTENT_TYPE_TEXT_EVENT_XML
            | CONTENT_TYPE_LOG_DATA => MessageType::Event,
            CONTENT_TYPE_DISCONNECT_NOTICE => MessageType::DisconnectNotice,
            CONTENT_TYPE_RUDE_REJECTION => MessageType::RudeRejection,
            _ => MessageType::Unknown(content_type.to_string()),
        }
    }
}

/// One parsed ESL envelope.
///
/// Headers are keyed by normalized (lowercase) name and values are
/// percent-decoded. The body, when present, is exactly `Content-Length`
/// bytes of the wire payload.
#[derive(Debug, Clone)]
pub struct EslMessage {
    /// Message type derived from `Content-Type`
    pub message_type: MessageType,
    /// Envelope headers, keyed by normalized name
    pub headers: HashMap<String, String>,
    /// Envelope body
    pub body: Option<String>,
}

impl EslMessage {
    pub(crate) fn new(
        message_type: MessageType,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Self {
        Self {
            message_type,
            headers,
            body,
        }
    }

    /// Look up an envelope header by name (case-insensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(&normalize_header_name(name.as_ref()))
            .map(|s| s.as_str())
    }

    /// The raw `Content-Type` value.
    pub fn content_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
    }
}

/// Parser state for handling incomplete messages
#[derive(Debug)]
enum ParseState {
    WaitingForHeaders,
    WaitingForBody {
        message_type: MessageType,
        headers: HashMap<String, String>,
        body_length: usize,
    },
}

/// Incremental ESL envelope parser
pub struct EslParser {
    buffer: EslBuffer,
    state: ParseState,
}

/// Parse one `Name: Value` block into a normalized header map,
/// percent-decoding values. Invalid percent sequences fall back to the raw
/// value (FreeSWITCH does not encode every header).
fn parse_header_block(block: &str) -> EslResult<HashMap<String, String>> {
    let mut headers = HashMap::new();

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(colon_pos) = line.find(':') {
            let key = normalize_header_name(&line[..colon_pos]);
            let raw_value = line[colon_pos + 1..].trim();
            let value = percent_decode_str(raw_value)
                .decode_utf8()
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw_value.to_string());
            headers.insert(key, value);
        } else {
            return Err(EslError::InvalidHeader {
                header: line.to_string(),
            });
        }
    }

    Ok(headers)
}

impl EslParser {
    /// Create new parser
    pub fn new() -> Self {
        Self {
            buffer: EslBuffer::new(),
            state: ParseState::WaitingForHeaders,
        }
    }

    /// Add raw socket bytes to the parser buffer
    pub fn add_data(&mut self, data: &[u8]) -> EslResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()?;
        Ok(())
    }

    /// Try to parse one complete message from the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Call repeatedly after
    /// each `add_data` — a single read may complete several envelopes.
    pub fn parse_message(&mut self) -> EslResult<Option<EslMessage>> {
        match &self.state {
            ParseState::WaitingForHeaders => {
                let terminator = HEADER_TERMINATOR.as_bytes();

                let Some(headers_data) = self
                    .buffer
                    .extract_until_pattern(terminator)
                else {
                    return Ok(None);
                };
                self.buffer
                    .compact();

                let headers_str = String::from_utf8(headers_data)
                    .map_err(|_| EslError::protocol_error("invalid UTF-8 in headers"))?;

                let headers = parse_header_block(&headers_str)?;

                // Every ESL message must have Content-Type. Missing means
                // protocol desync (e.g. from a corrupted Content-Length).
                let content_type = headers
                    .get(HEADER_CONTENT_TYPE)
                    .ok_or_else(|| {
                        EslError::protocol_error(
                            "missing Content-Type header, likely protocol desync",
                        )
                    })?;
                let message_type = MessageType::from_content_type(content_type);

                let body_length = match headers.get(HEADER_CONTENT_LENGTH) {
                    Some(length_str) => {
                        length_str
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| EslError::InvalidHeader {
                                header: format!("Content-Length: {}", length_str),
                            })?
                    }
                    None => 0,
                };

                if body_length > MAX_MESSAGE_SIZE {
                    return Err(EslError::protocol_error(format!(
                        "message too large: Content-Length {} exceeds limit {}",
                        body_length, MAX_MESSAGE_SIZE
                    )));
                }

                if body_length > 0 {
                    self.state = ParseState::WaitingForBody {
                        message_type,
                        headers,
                        body_length,
                    };
                    // The body may already be buffered
                    self.parse_message()
                } else {
                    Ok(Some(EslMessage::new(message_type, headers, None)))
                }
            }
            ParseState::WaitingForBody {
                message_type,
                headers,
                body_length,
            } => {
                let Some(body_data) = self
                    .buffer
                    .extract_bytes(*body_length)
                else {
                    return Ok(None);
                };
                self.buffer
                    .compact();

                let body_str = String::from_utf8(body_data)
                    .map_err(|_| EslError::protocol_error("invalid UTF-8 in body"))?;

                let message =
                    EslMessage::new(message_type.clone(), headers.clone(), Some(body_str));
                self.state = ParseState::WaitingForHeaders;
                Ok(Some(message))
            }
        }
    }

    /// Parse an event payload out of an `Event` envelope, selecting the
    /// format from the envelope's `Content-Type`.
    pub fn parse_event(&self, message: EslMessage) -> EslResult<EslEvent> {
        if message.message_type != MessageType::Event {
            return Err(EslError::protocol_error("not an event message"));
        }

        match message
            .content_type()
            .unwrap_or(CONTENT_TYPE_TEXT_EVENT_PLAIN)
        {
            CONTENT_TYPE_TEXT_EVENT_JSON => self.parse_json_event(message),
            CONTENT_TYPE_TEXT_EVENT_XML => self.parse_xml_event(message),
            CONTENT_TYPE_LOG_DATA => Ok(Self::log_data_event(message)),
            _ => self.parse_plain_event(message),
        }
    }

    /// Parse plain text event.
    ///
    /// FreeSWITCH text/event-plain wire format uses a two-part structure:
    /// - Outer envelope: Content-Length + Content-Type headers
    /// - Body: URL-encoded `key: value` lines (the actual event headers)
    ///
    /// If the event headers declare their own Content-Length, the remainder
    /// after the blank line is the inner event body, trimmed to that length.
    fn parse_plain_event(&self, message: EslMessage) -> EslResult<EslEvent> {
        let body = message
            .body
            .as_deref()
            .ok_or_else(|| EslError::protocol_error("plain event missing body"))?;

        let mut event = EslEvent::new();

        let (header_section, inner_body) = match body.find("\n\n") {
            Some(pos) => (&body[..pos], Some(&body[pos + 2..])),
            None => (body, None),
        };

        for (key, value) in parse_header_block(header_section)? {
            event.set_header(key, value);
        }

        if let Some(inner) = inner_body {
            if !inner.is_empty() {
                let trimmed = event
                    .header(HEADER_CONTENT_LENGTH)
                    .and_then(|len| len.trim().parse::<usize>().ok())
                    .filter(|len| *len <= inner.len())
                    .map_or(inner, |len| &inner[..len]);
                event.set_body(trimmed.to_string());
            }
        }

        Ok(event)
    }

    /// Parse JSON event. Members of the top-level object become event
    /// headers; the `_body` member, when present, becomes the event body.
    fn parse_json_event(&self, message: EslMessage) -> EslResult<EslEvent> {
        let body = message
            .body
            .ok_or_else(|| EslError::protocol_error("JSON event missing body"))?;

        let json_value: serde_json::Value = serde_json::from_str(&body)?;

        let obj = json_value
            .as_object()
            .ok_or_else(|| EslError::protocol_error("JSON event is not an object"))?;

        let mut event = EslEvent::new();
        for (key, value) in obj {
            let value_str = match value {
                serde_json::Value::String(s) => s.clone(),
                _ => value.to_string(),
            };
            if key == "_body" {
                event.set_body(value_str);
            } else {
                event.set_header(key, value_str);
            }
        }

        Ok(event)
    }

    /// Parse XML event using quick_xml.
    ///
    /// FreeSWITCH XML event format:
    /// ```xml
    /// <event>
    ///   <headers>
    ///     <Event-Name>HEARTBEAT</Event-Name>
    ///     <Core-UUID>abc-123</Core-UUID>
    ///   </headers>
    ///   <body>...</body>
    /// </event>
    /// ```
    fn parse_xml_event(&self, message: EslMessage) -> EslResult<EslEvent> {
        use quick_xml::events::Event as XmlEvent;
        use quick_xml::Reader;

        let body = message
            .body
            .ok_or_else(|| EslError::protocol_error("XML event missing body"))?;

        let mut reader = Reader::from_str(&body);
        let mut event = EslEvent::new();
        let mut in_headers = false;
        let mut current_tag: Option<String> = None;
        let mut in_body = false;

        loop {
            match reader.read_event() {
                Ok(XmlEvent::Start(ref e)) => {
                    let tag = String::from_utf8_lossy(
                        e.name()
                            .as_ref(),
                    )
                    .to_string();
                    match tag.as_str() {
                        "headers" => in_headers = true,
                        "body" => in_body = true,
                        _ if in_headers => current_tag = Some(tag),
                        _ => {}
                    }
                }
                Ok(XmlEvent::End(ref e)) => {
                    let tag = String::from_utf8_lossy(
                        e.name()
                            .as_ref(),
                    )
                    .to_string();
                    match tag.as_str() {
                        "headers" => in_headers = false,
                        "body" => in_body = false,
                        _ if in_headers => current_tag = None,
                        _ => {}
                    }
                }
                Ok(XmlEvent::Text(ref e)) => {
                    let text = e
                        .unescape()?
                        .to_string();
                    if in_body {
                        event.set_body(text);
                    } else if let Some(ref tag) = current_tag {
                        event.set_header(tag, text);
                    }
                }
                Ok(XmlEvent::Eof) => break,
                Err(e) => return Err(EslError::Xml(e)),
                _ => {}
            }
        }

        Ok(event)
    }

    /// Synthesize an event from a `log/data` envelope so log lines flow
    /// through the same dispatch path as real events, keyed by
    /// `event-name: LOG`.
    fn log_data_event(message: EslMessage) -> EslEvent {
        let mut event = EslEvent::new();
        for (key, value) in &message.headers {
            if key != HEADER_CONTENT_TYPE && key != HEADER_CONTENT_LENGTH {
                event.set_header(key, value.clone());
            }
        }
        event.set_header("Event-Name", "LOG");
        if let Some(body) = message.body {
            event.set_body(body);
        }
        event
    }
}

impl Default for EslParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_block() {
        let headers = parse_header_block("Content-Type: auth/request\r\nContent-Length: 0").unwrap();

        assert_eq!(
            headers
                .get("content-type")
                .map(|s| s.as_str()),
            Some("auth/request")
        );
        assert_eq!(
            headers
                .get("content-length")
                .map(|s| s.as_str()),
            Some("0")
        );
    }

    #[test]
    fn test_header_names_normalized() {
        let headers = parse_header_block("CONTENT-TYPE: command/reply\nReply-TEXT: +OK").unwrap();

        assert_eq!(
            headers
                .get("content-type")
                .map(|s| s.as_str()),
            Some("command/reply")
        );
        assert_eq!(
            headers
                .get("reply-text")
                .map(|s| s.as_str()),
            Some("+OK")
        );
    }

    #[test]
    fn test_parse_auth_request() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: auth/request\n\n")
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type, MessageType::AuthRequest);
        assert!(message
            .body
            .is_none());
    }

    #[test]
    fn test_parse_api_response() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: 2\n\nOK")
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type, MessageType::ApiResponse);
        assert_eq!(message.body, Some("OK".to_string()));
    }

    #[test]
    fn test_parse_rude_rejection() {
        let mut parser = EslParser::new();
        let body = "Access Denied, go away.\n";
        let data = format!(
            "Content-Type: text/rude-rejection\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        parser
            .add_data(data.as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type, MessageType::RudeRejection);
    }

    #[test]
    fn test_parse_disconnect_notice() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: text/disconnect-notice\nContent-Disposition: disconnect\n\n")
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type, MessageType::DisconnectNotice);
        assert_eq!(message.header("Content-Disposition"), Some("disconnect"));
    }

    #[test]
    fn test_multiple_messages_single_read() {
        let mut parser = EslParser::new();
        parser
            .add_data(
                b"Content-Type: auth/request\n\nContent-Type: api/response\nContent-Length: 3\n\n+OK",
            )
            .unwrap();

        let first = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(first.message_type, MessageType::AuthRequest);

        let second = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(second.message_type, MessageType::ApiResponse);
        assert_eq!(second.body, Some("+OK".to_string()));

        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_event_plain() {
        let mut parser = EslParser::new();
        let body = "Event-Name: CHANNEL_ANSWER\nUnique-ID: test-uuid\n\n";
        let envelope = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n",
            body.len()
        );
        parser
            .add_data(format!("{}{}", envelope, body).as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        let event = parser
            .parse_event(message)
            .unwrap();

        assert_eq!(event.event_name(), Some("CHANNEL_ANSWER"));
        assert_eq!(event.unique_id(), Some("test-uuid"));
    }

    #[test]
    fn test_parse_event_plain_percent_decoding() {
        let mut parser = EslParser::new();
        let body = "Event-Name: HEARTBEAT\nUp-Time: 0%20years%2C%200%20days\nEvent-Info: System%20Ready\n\n";
        let envelope = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n",
            body.len()
        );
        parser
            .add_data(format!("{}{}", envelope, body).as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        let event = parser
            .parse_event(message)
            .unwrap();

        assert_eq!(event.event_name(), Some("HEARTBEAT"));
        assert_eq!(event.header("Up-Time"), Some("0 years, 0 days"));
        assert_eq!(event.header("Event-Info"), Some("System Ready"));
    }

    #[test]
    fn test_parse_event_plain_with_inner_body() {
        let mut parser = EslParser::new();
        let inner_body = "+OK Status\n";
        let event_headers = format!(
            "Event-Name: BACKGROUND_JOB\nJob-UUID: abc-123\nContent-Length: {}\n",
            inner_body.len()
        );
        let body = format!("{}\n{}", event_headers, inner_body);
        let envelope = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n",
            body.len()
        );
        parser
            .add_data(format!("{}{}", envelope, body).as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        let event = parser
            .parse_event(message)
            .unwrap();

        assert_eq!(event.event_name(), Some("BACKGROUND_JOB"));
        assert_eq!(event.job_uuid(), Some("abc-123"));
        assert_eq!(event.body(), Some("+OK Status\n"));
    }

    #[test]
    fn test_parse_event_json() {
        let mut parser = EslParser::new();
        let body = r#"{"Event-Name":"BACKGROUND_JOB","Job-UUID":"def-456","_body":"+OK done\n"}"#;
        let envelope = format!(
            "Content-Length: {}\nContent-Type: text/event-json\n\n",
            body.len()
        );
        parser
            .add_data(format!("{}{}", envelope, body).as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        let event = parser
            .parse_event(message)
            .unwrap();

        assert_eq!(event.event_name(), Some("BACKGROUND_JOB"));
        assert_eq!(event.job_uuid(), Some("def-456"));
        assert_eq!(event.body(), Some("+OK done\n"));
    }

    #[test]
    fn test_parse_event_xml() {
        let mut parser = EslParser::new();
        let xml_body = "\
<event>\n\
  <headers>\n\
    <Event-Name>HEARTBEAT</Event-Name>\n\
    <Core-UUID>abc-123</Core-UUID>\n\
  </headers>\n\
  <body>+OK result data</body>\n\
</event>";
        let envelope = format!(
            "Content-Length: {}\nContent-Type: text/event-xml\n\n",
            xml_body.len()
        );
        parser
            .add_data(format!("{}{}", envelope, xml_body).as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        let event = parser
            .parse_event(message)
            .unwrap();

        assert_eq!(event.event_name(), Some("HEARTBEAT"));
        assert_eq!(event.header("Core-UUID"), Some("abc-123"));
        assert_eq!(event.body(), Some("+OK result data"));
    }

    #[test]
    fn test_log_data_synthesized_as_log_event() {
        let mut parser = EslParser::new();
        let body = "switch_core.c:1234 shutting down\n";
        let data = format!(
            "Content-Type: log/data\nContent-Length: {}\nLog-Level: 3\n\n{}",
            body.len(),
            body
        );
        parser
            .add_data(data.as_bytes())
            .unwrap();

        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.message_type, MessageType::Event);

        let event = parser
            .parse_event(message)
            .unwrap();
        assert_eq!(event.event_name(), Some("LOG"));
        assert_eq!(event.header("Log-Level"), Some("3"));
        assert_eq!(event.body(), Some(body));
    }

    #[test]
    fn test_incomplete_message() {
        let mut parser = EslParser::new();
        // Only 4 body bytes of the declared 10
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: 10\n\ntest")
            .unwrap();

        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());

        parser
            .add_data(b"123456")
            .unwrap();
        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.body, Some("test123456".to_string()));
    }

    #[test]
    fn test_oversized_content_length_rejected() {
        let mut parser = EslParser::new();
        let data = format!(
            "Content-Type: api/response\nContent-Length: {}\n\n",
            MAX_MESSAGE_SIZE + 1
        );
        parser
            .add_data(data.as_bytes())
            .unwrap();

        assert!(parser
            .parse_message()
            .is_err());
    }

    #[test]
    fn test_non_numeric_content_length_rejected() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: abc\n\n")
            .unwrap();

        assert!(parser
            .parse_message()
            .is_err());
    }

    #[test]
    fn test_missing_content_type_is_desync() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Some-Header: value\n\n")
            .unwrap();

        assert!(parser
            .parse_message()
            .is_err());
    }

    #[test]
    fn test_invalid_percent_sequence_falls_back_to_raw() {
        let headers = parse_header_block("X-Bad: %ZZinvalid\nX-Good: clean").unwrap();
        assert_eq!(
            headers
                .get("x-bad")
                .map(|s| s.as_str()),
            Some("%ZZinvalid")
        );
        assert_eq!(
            headers
                .get("x-good")
                .map(|s| s.as_str()),
            Some("clean")
        );
    }

    #[test]
    fn test_parse_connect_reply_channel_data() {
        use percent_encoding::{percent_encode, NON_ALPHANUMERIC};

        let mut parser = EslParser::new();

        // Outbound connect reply: switch_event_serialize() percent-encodes
        // every value, sent as a flat header blob.
        let headers = [
            ("Content-Type", "command/reply"),
            ("Reply-Text", "+OK"),
            ("Event-Name", "CHANNEL_DATA"),
            ("Channel-Name", "sofia/internal/1000@example.com"),
            ("Unique-ID", "abcd-1234"),
            ("Caller-Caller-ID-Name", "Test User"),
        ];

        let mut data = String::new();
        for (key, value) in &headers {
            data.push_str(&format!(
                "{}: {}\n",
                key,
                percent_encode(value.as_bytes(), NON_ALPHANUMERIC)
            ));
        }
        data.push('\n');

        parser
            .add_data(data.as_bytes())
            .unwrap();
        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();

        assert_eq!(message.message_type, MessageType::CommandReply);
        assert_eq!(
            message.header("Channel-Name"),
            Some("sofia/internal/1000@example.com")
        );
        assert_eq!(message.header("Caller-Caller-ID-Name"), Some("Test User"));
        assert_eq!(message.header("Reply-Text"), Some("+OK"));
    }
}
