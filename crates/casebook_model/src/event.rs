//! Events: single scheduled occurrences.

use crate::ids::{BookId, EventId, RecordId};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Category tag attached to an event.
///
/// The legacy data stored these as loosely shaped JSON (a single string, a
/// comma-joined string, or an array). The canonical representation is this
/// tagged enumeration; `legacy::normalize_event_types` is the only place
/// the old shapes are decoded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A booked appointment.
    Appointment,
    /// An initial or follow-up consultation.
    Consultation,
    /// A treatment session.
    Treatment,
    /// A scheduled follow-up.
    FollowUp,
    /// A routine check-up.
    Checkup,
    /// A label the canonical set does not know about.
    Other(String),
}

impl EventType {
    /// Parses a legacy label into the canonical tag.
    pub fn from_label(label: &str) -> EventType {
        match label.trim().to_ascii_lowercase().as_str() {
            "appointment" => EventType::Appointment,
            "consultation" | "consult" => EventType::Consultation,
            "treatment" => EventType::Treatment,
            "follow_up" | "followup" | "follow-up" => EventType::FollowUp,
            "checkup" | "check_up" | "check-up" => EventType::Checkup,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Returns the canonical label.
    pub fn label(&self) -> &str {
        match self {
            EventType::Appointment => "appointment",
            EventType::Consultation => "consultation",
            EventType::Treatment => "treatment",
            EventType::FollowUp => "follow_up",
            EventType::Checkup => "checkup",
            EventType::Other(label) => label,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One scheduled occurrence, always linked to exactly one record and book.
///
/// Rescheduling never mutates an event's time in place. A "change time"
/// operation creates a replacement event and marks the old one removed,
/// linking both directions (`original_event_id` / `new_event_id`) so the
/// history stays traceable. A removed event is immutable except for the
/// `new_event_id` back-link written by that operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Client-minted identity.
    pub id: EventId,
    /// Owning book.
    pub book_id: BookId,
    /// Owning record; the record's note is shared by all its events.
    pub record_id: RecordId,
    /// Display title.
    pub title: String,
    /// Category tags.
    pub event_types: BTreeSet<EventType>,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Scheduled end, if bounded.
    pub end_time: Option<DateTime<Utc>>,
    /// Soft-removal marker.
    pub is_removed: bool,
    /// Why the event was removed, if it was.
    pub removal_reason: Option<String>,
    /// The event this one replaced, for rescheduled events.
    pub original_event_id: Option<EventId>,
    /// The event that replaced this one, set when it is rescheduled away.
    pub new_event_id: Option<EventId>,
    /// Whether the owning record currently has a note.
    pub has_note: bool,
    /// Optimistic-locking version.
    pub version: Version,
}

impl Event {
    /// Creates a new event at version 1.
    pub fn new(
        id: EventId,
        book_id: BookId,
        record_id: RecordId,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            book_id,
            record_id,
            title: title.into(),
            event_types: BTreeSet::new(),
            start_time,
            end_time: None,
            is_removed: false,
            removal_reason: None,
            original_event_id: None,
            new_event_id: None,
            has_note: false,
            version: Version::FIRST,
        }
    }

    /// Builds the replacement event for a reschedule.
    ///
    /// The replacement carries this event's book, record, title, tags, and
    /// note flag, starts life at version 1, and points back at this event
    /// through `original_event_id`.
    pub fn rescheduled_to(
        &self,
        new_id: EventId,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Event {
        Event {
            id: new_id,
            book_id: self.book_id,
            record_id: self.record_id,
            title: self.title.clone(),
            event_types: self.event_types.clone(),
            start_time,
            end_time,
            is_removed: false,
            removal_reason: None,
            original_event_id: Some(self.id),
            new_event_id: None,
            has_note: self.has_note,
            version: Version::FIRST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn event_type_labels_roundtrip() {
        for t in [
            EventType::Appointment,
            EventType::Consultation,
            EventType::Treatment,
            EventType::FollowUp,
            EventType::Checkup,
        ] {
            assert_eq!(EventType::from_label(t.label()), t);
        }
    }

    #[test]
    fn unknown_label_is_preserved() {
        let t = EventType::from_label("House Call");
        assert_eq!(t, EventType::Other("house call".into()));
        assert_eq!(t.label(), "house call");
    }

    #[test]
    fn new_event_starts_clean() {
        let e = Event::new(EventId::new(), BookId::new(), RecordId::new(), "Intake", start());
        assert_eq!(e.version, Version::FIRST);
        assert!(!e.is_removed);
        assert!(e.original_event_id.is_none());
    }

    #[test]
    fn reschedule_links_back_and_keeps_record() {
        let mut old = Event::new(EventId::new(), BookId::new(), RecordId::new(), "Intake", start());
        old.event_types.insert(EventType::Consultation);
        old.has_note = true;

        let new_id = EventId::new();
        let new_start = Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap();
        let replacement = old.rescheduled_to(new_id, new_start, None);

        assert_eq!(replacement.id, new_id);
        assert_eq!(replacement.original_event_id, Some(old.id));
        assert_eq!(replacement.record_id, old.record_id);
        assert_eq!(replacement.event_types, old.event_types);
        assert!(replacement.has_note);
        assert_eq!(replacement.version, Version::FIRST);
    }
}
