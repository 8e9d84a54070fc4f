//! Notes: one handwriting document per record.

use crate::ids::RecordId;
use crate::version::Version;
use serde::{Deserialize, Serialize};

/// The drawing tool a stroke was captured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeTool {
    /// Standard pen.
    Pen,
    /// Translucent highlighter.
    Highlighter,
    /// Eraser stroke.
    Eraser,
}

impl Default for StrokeTool {
    fn default() -> Self {
        StrokeTool::Pen
    }
}

/// A single sampled point of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    /// Horizontal position in canvas units.
    pub x: f32,
    /// Vertical position in canvas units.
    pub y: f32,
    /// Stylus pressure, 0.0 when the input device reports none.
    pub pressure: f32,
}

impl StrokePoint {
    /// Creates a point without pressure information.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, pressure: 0.0 }
    }
}

/// One continuous pen stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Tool used for the stroke.
    pub tool: StrokeTool,
    /// Packed RGBA color.
    pub color: u32,
    /// Stroke width in canvas units.
    pub width: f32,
    /// Ordered sample points.
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    /// Creates a pen stroke with the given points.
    pub fn pen(color: u32, width: f32, points: Vec<StrokePoint>) -> Self {
        Self {
            tool: StrokeTool::Pen,
            color,
            width,
            points,
        }
    }
}

/// One page of a note: an ordered sequence of strokes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    /// Strokes in draw order.
    pub strokes: Vec<Stroke>,
}

impl Page {
    /// Creates a page from strokes.
    pub fn new(strokes: Vec<Stroke>) -> Self {
        Self { strokes }
    }
}

/// The handwriting document attached to a record.
///
/// There is at most one note per record, keyed by `record_id`; every event
/// sharing that record resolves to the same note. Rescheduling an event
/// therefore never detaches its handwriting history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Owning record; unique per note.
    pub record_id: RecordId,
    /// Ordered pages.
    pub pages: Vec<Page>,
    /// Optimistic-locking version.
    pub version: Version,
}

impl Note {
    /// Creates a note at version 1.
    pub fn new(record_id: RecordId, pages: Vec<Page>) -> Self {
        Self {
            record_id,
            pages,
            version: Version::FIRST,
        }
    }

    /// Returns true if no page carries any ink.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.strokes.is_empty())
    }
}
