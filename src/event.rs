//! ESL event structure, header normalization, and event formats

use crate::headers::EventHeader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Canonical form for header names: lowercased, trimmed.
///
/// Header names are case-insensitive on the wire (`Event-Name`,
/// `EVENT-NAME`, and `event-name` are the same header); everything stored
/// in an [`EslEvent`] is keyed by this form.
pub(crate) fn normalize_header_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
}

/// Event format types supported by FreeSWITCH ESL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventFormat {
    /// Plain text format (default)
    Plain,
    /// JSON format
    Json,
    /// XML format
    Xml,
}

impl EventFormat {
    /// Determine event format from a Content-Type header value.
    pub fn from_content_type(ct: &str) -> Self {
        match ct {
            "text/event-json" => Self::Json,
            "text/event-xml" => Self::Xml,
            _ => Self::Plain,
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Plain => write!(f, "plain"),
            EventFormat::Json => write!(f, "json"),
            EventFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(ParseEventFormatError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

define_wire_enum! {
    /// The fixed set of event names the request façade subscribes to on the
    /// caller's behalf.
    ///
    /// The connection tracks which of these the peer has been asked to
    /// send, so [`bgapi`](crate::EslConnection::bgapi) and
    /// [`execute`](crate::EslConnection::execute) avoid re-subscribing on
    /// every call.
    pub enum SpecialEvent(error: ParseSpecialEventError, "not a special event") {
        Log => "LOG",
        BackgroundJob => "BACKGROUND_JOB",
        ChannelExecute => "CHANNEL_EXECUTE",
        ChannelExecuteComplete => "CHANNEL_EXECUTE_COMPLETE",
        ChannelHangup => "CHANNEL_HANGUP",
        ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
    }
}

impl SpecialEvent {
    /// Every special event.
    pub const ALL: [SpecialEvent; 6] = [
        SpecialEvent::Log,
        SpecialEvent::BackgroundJob,
        SpecialEvent::ChannelExecute,
        SpecialEvent::ChannelExecuteComplete,
        SpecialEvent::ChannelHangup,
        SpecialEvent::ChannelHangupComplete,
    ];

    /// The channel-scoped specials — the ones `myevents` turns on.
    pub const CHANNEL: [SpecialEvent; 4] = [
        SpecialEvent::ChannelExecute,
        SpecialEvent::ChannelExecuteComplete,
        SpecialEvent::ChannelHangup,
        SpecialEvent::ChannelHangupComplete,
    ];
}

/// A FreeSWITCH event: normalized headers plus an optional body.
///
/// FreeSWITCH has hundreds of event types and modules add more, so events
/// are an open string-keyed mapping rather than per-type structs. Header
/// names are normalized to lowercase-with-dashes on insert and on lookup,
/// so `event.header("Event-Name")` and `event.header("event-name")` are
/// equivalent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    /// Create a new empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header by name (case-insensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(&normalize_header_name(name.as_ref()))
            .map(|s| s.as_str())
    }

    /// All headers, keyed by normalized name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Set or overwrite a header.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(normalize_header_name(name.as_ref()), value.into());
    }

    /// Remove a header, returning its value if it existed.
    pub fn del_header(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(&normalize_header_name(name))
    }

    /// Event body (the content after the blank line in plain-text events).
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Set the event body.
    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    /// `Event-Name` header (e.g. `BACKGROUND_JOB`, `CHANNEL_ANSWER`).
    pub fn event_name(&self) -> Option<&str> {
        self.header(EventHeader::EventName)
    }

    /// `Event-Subclass` header for `CUSTOM` events (e.g. `sofia::register`).
    pub fn event_subclass(&self) -> Option<&str> {
        self.header(EventHeader::EventSubclass)
    }

    /// `Unique-ID` header, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    /// `Job-UUID` header from `bgapi` `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
    }

    /// `Application-UUID` header from `CHANNEL_EXECUTE` events, correlating
    /// the event with the `Event-UUID` sent in the execute request.
    pub fn application_uuid(&self) -> Option<&str> {
        self.header(EventHeader::ApplicationUuid)
    }

    /// `Channel-Name` header (e.g. `sofia/internal/1000@domain`).
    pub fn channel_name(&self) -> Option<&str> {
        self.header(EventHeader::ChannelName)
    }

    /// `Hangup-Cause` header (e.g. `NORMAL_CLEARING`, `USER_BUSY`).
    pub fn hangup_cause(&self) -> Option<&str> {
        self.header(EventHeader::HangupCause)
    }

    /// Look up a channel variable by name.
    ///
    /// Checks the `variable_{name}` header, which is how FreeSWITCH exposes
    /// channel variables in events.
    pub fn variable(&self, name: &str) -> Option<&str> {
        let key = format!("variable_{}", name);
        self.header(&key)
    }

    /// Whether the `Event-Name` header matches `name` (case-insensitive).
    pub fn is_event(&self, name: &str) -> bool {
        self.event_name()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut event = EslEvent::new();
        event.set_header("Event-Name", "HEARTBEAT");

        assert_eq!(event.header("Event-Name"), Some("HEARTBEAT"));
        assert_eq!(event.header("event-name"), Some("HEARTBEAT"));
        assert_eq!(event.header("EVENT-NAME"), Some("HEARTBEAT"));
        assert_eq!(event.event_name(), Some("HEARTBEAT"));
    }

    #[test]
    fn set_header_overwrites_across_cases() {
        let mut event = EslEvent::new();
        event.set_header("Job-UUID", "first");
        event.set_header("job-uuid", "second");

        assert_eq!(event.headers().len(), 1);
        assert_eq!(event.job_uuid(), Some("second"));
    }

    #[test]
    fn del_header() {
        let mut event = EslEvent::new();
        event.set_header("Foo", "bar");
        event.set_header("Baz", "qux");

        assert_eq!(event.del_header("FOO"), Some("bar".to_string()));
        assert!(event
            .header("Foo")
            .is_none());
        assert_eq!(event.header("Baz"), Some("qux"));
        assert_eq!(event.del_header("Foo"), None);
    }

    #[test]
    fn unique_id_falls_back_to_caller_unique_id() {
        let mut event = EslEvent::new();
        event.set_header("Caller-Unique-ID", "abc-123");
        assert_eq!(event.unique_id(), Some("abc-123"));

        event.set_header("Unique-ID", "def-456");
        assert_eq!(event.unique_id(), Some("def-456"));
    }

    #[test]
    fn variable_lookup() {
        let mut event = EslEvent::new();
        event.set_header("variable_sip_from_display", "Bob");
        assert_eq!(event.variable("sip_from_display"), Some("Bob"));
        assert_eq!(event.variable("nonexistent"), None);
    }

    #[test]
    fn is_event_matches_case_insensitively() {
        let mut event = EslEvent::new();
        event.set_header("Event-Name", "BACKGROUND_JOB");
        assert!(event.is_event("background_job"));
        assert!(!event.is_event("CHANNEL_ANSWER"));
    }

    #[test]
    fn special_event_wire_names() {
        assert_eq!(SpecialEvent::BackgroundJob.to_string(), "BACKGROUND_JOB");
        assert_eq!(
            SpecialEvent::ChannelExecuteComplete.to_string(),
            "CHANNEL_EXECUTE_COMPLETE"
        );
        assert_eq!(
            "background_job".parse::<SpecialEvent>(),
            Ok(SpecialEvent::BackgroundJob)
        );
        assert!("HEARTBEAT"
            .parse::<SpecialEvent>()
            .is_err());
    }

    #[test]
    fn event_format_from_content_type() {
        assert_eq!(
            EventFormat::from_content_type("text/event-json"),
            EventFormat::Json
        );
        assert_eq!(
            EventFormat::from_content_type("text/event-xml"),
            EventFormat::Xml
        );
        assert_eq!(
            EventFormat::from_content_type("text/event-plain"),
            EventFormat::Plain
        );
    }

    #[test]
    fn event_format_from_str() {
        assert_eq!("plain".parse::<EventFormat>(), Ok(EventFormat::Plain));
        assert_eq!("json".parse::<EventFormat>(), Ok(EventFormat::Json));
        assert_eq!("xml".parse::<EventFormat>(), Ok(EventFormat::Xml));
        assert!("foo"
            .parse::<EventFormat>()
            .is_err());
    }
}
