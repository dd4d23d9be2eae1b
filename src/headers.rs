//! Typed names for headers carried inside decoded events.

define_wire_enum! {
    /// Header names found in the body of `text/event-plain` messages.
    ///
    /// These are the decoded event fields, not the envelope headers
    /// (`Content-Type`, `Content-Length`) used for framing. Use with
    /// [`EslEvent::header()`](crate::EslEvent::header) instead of string
    /// literals.
    pub enum EventHeader / ParseEventHeaderError("event header") {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        EventSequence => "Event-Sequence",
        EventDateLocal => "Event-Date-Local",
        CoreUuid => "Core-UUID",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        JobUuid => "Job-UUID",
        ChannelName => "Channel-Name",
        ChannelState => "Channel-State",
        AnswerState => "Answer-State",
        HangupCause => "Hangup-Cause",
        CallerCallerIdName => "Caller-Caller-ID-Name",
        CallerCallerIdNumber => "Caller-Caller-ID-Number",
        CallerDestinationNumber => "Caller-Destination-Number",
        Application => "Application",
        ApplicationData => "Application-Data",
        ApplicationResponse => "Application-Response",
        ContentLength => "Content-Length",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(EventHeader::UniqueId.to_string(), "Unique-ID");
        assert_eq!(
            EventHeader::ApplicationResponse.to_string(),
            "Application-Response"
        );
        let h: &str = EventHeader::CoreUuid.as_ref();
        assert_eq!(h, "Core-UUID");
    }

    #[test]
    fn parse_ignores_case() {
        assert_eq!(
            "event-name".parse::<EventHeader>(),
            Ok(EventHeader::EventName)
        );
        assert_eq!(
            "JOB-UUID".parse::<EventHeader>(),
            Ok(EventHeader::JobUuid)
        );
    }

    #[test]
    fn parse_unknown_name() {
        let err = "variable_sip_from_user"
            .parse::<EventHeader>()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown event header: variable_sip_from_user"
        );
    }

    #[test]
    fn every_variant_survives_display_then_parse() {
        for &v in EventHeader::VARIANTS {
            let wire = v.to_string();
            assert_eq!(wire.parse::<EventHeader>(), Ok(v), "{wire}");
        }
    }
}
