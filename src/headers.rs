//! Typed event header names for FreeSWITCH ESL events.

define_wire_enum! {
    /// Header names that appear in FreeSWITCH ESL events.
    ///
    /// These are headers on the parsed event itself (not protocol framing
    /// headers like `Content-Type`). Use with [`EslEvent::header()`] for
    /// type-safe lookups; lookups normalize case, so the wire-format casing
    /// here is cosmetic.
    ///
    /// [`EslEvent::header()`]: crate::EslEvent::header
    pub enum EventHeader(error: ParseEventHeaderError, "unknown event header") {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        OtherLegUniqueId => "Other-Leg-Unique-ID",
        JobUuid => "Job-UUID",
        ApplicationUuid => "Application-UUID",
        Application => "Application",
        ApplicationData => "Application-Data",
        ChannelName => "Channel-Name",
        ChannelState => "Channel-State",
        AnswerState => "Answer-State",
        CallDirection => "Call-Direction",
        HangupCause => "Hangup-Cause",
        CallerCallerIdName => "Caller-Caller-ID-Name",
        CallerCallerIdNumber => "Caller-Caller-ID-Number",
        CallerDestinationNumber => "Caller-Destination-Number",
        CallerContext => "Caller-Context",
        CoreUuid => "Core-UUID",
        LogLevel => "Log-Level",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trip() {
        assert_eq!(EventHeader::UniqueId.to_string(), "Unique-ID");
        assert_eq!(EventHeader::JobUuid.to_string(), "Job-UUID");
        assert_eq!(
            EventHeader::ApplicationUuid.to_string(),
            "Application-UUID"
        );
    }

    #[test]
    fn as_ref_str() {
        let h: &str = EventHeader::EventName.as_ref();
        assert_eq!(h, "Event-Name");
    }

    #[test]
    fn from_str_case_insensitive() {
        assert_eq!(
            "unique-id".parse::<EventHeader>(),
            Ok(EventHeader::UniqueId)
        );
        assert_eq!(
            "UNIQUE-ID".parse::<EventHeader>(),
            Ok(EventHeader::UniqueId)
        );
        assert_eq!(
            "job-uuid".parse::<EventHeader>(),
            Ok(EventHeader::JobUuid)
        );
    }

    #[test]
    fn from_str_unknown() {
        let err = "X-Custom-Not-In-Enum".parse::<EventHeader>();
        assert!(err.is_err());
        assert_eq!(
            err.unwrap_err()
                .to_string(),
            "unknown event header: X-Custom-Not-In-Enum"
        );
    }
}
