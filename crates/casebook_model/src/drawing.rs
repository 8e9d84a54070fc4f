//! Schedule drawings: one canvas per (book, date, view mode).

use crate::ids::BookId;
use crate::note::Stroke;
use crate::version::Version;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar view a drawing overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Single-day view.
    Day,
    /// Week view.
    Week,
    /// Month view.
    Month,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViewMode::Day => "day",
            ViewMode::Week => "week",
            ViewMode::Month => "month",
        };
        f.write_str(label)
    }
}

/// Composite natural key of a schedule drawing.
///
/// The triple is unique. The date component is a `NaiveDate`: callers that
/// hold a timestamp go through [`DrawingKey::at_instant`], which truncates to
/// the calendar day, so a key can never carry a time-of-day component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DrawingKey {
    /// Owning book.
    pub book_id: BookId,
    /// Calendar day.
    pub date: NaiveDate,
    /// Calendar view.
    pub view_mode: ViewMode,
}

impl DrawingKey {
    /// Creates a key from an already-normalized date.
    pub fn new(book_id: BookId, date: NaiveDate, view_mode: ViewMode) -> Self {
        Self {
            book_id,
            date,
            view_mode,
        }
    }

    /// Creates a key from an instant, normalizing to its calendar day.
    pub fn at_instant(book_id: BookId, instant: DateTime<Utc>, view_mode: ViewMode) -> Self {
        Self::new(book_id, instant.date_naive(), view_mode)
    }
}

impl fmt::Display for DrawingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.book_id, self.date, self.view_mode)
    }
}

/// Freehand annotation layer over one calendar view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    /// Composite natural key.
    pub key: DrawingKey,
    /// Strokes in draw order.
    pub strokes: Vec<Stroke>,
    /// Optimistic-locking version.
    pub version: Version,
}

impl Drawing {
    /// Creates a drawing at version 1.
    pub fn new(key: DrawingKey, strokes: Vec<Stroke>) -> Self {
        Self {
            key,
            strokes,
            version: Version::FIRST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_normalizes_instant_to_day() {
        let book = BookId::new();
        let late = Utc.with_ymd_and_hms(2026, 3, 2, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 1).unwrap();

        let a = DrawingKey::at_instant(book, late, ViewMode::Day);
        let b = DrawingKey::at_instant(book, early, ViewMode::Day);
        assert_eq!(a, b);
    }

    #[test]
    fn view_mode_distinguishes_keys() {
        let book = BookId::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let day = DrawingKey::new(book, date, ViewMode::Day);
        let week = DrawingKey::new(book, date, ViewMode::Week);
        assert_ne!(day, week);
    }
}
