//! Normalization boundary for legacy JSON payload shapes.
//!
//! Earlier releases stored event categories and handwriting pages as
//! loosely-typed JSON with several coexisting shapes:
//!
//! - `event_types`: a single string, a comma-joined string, or an array of
//!   strings.
//! - `pages_data`: a bare array of strokes (single implicit page) or an
//!   array of page objects each holding a `strokes` array.
//!
//! Everything behind this module works exclusively with the canonical
//! structured types; the ambiguity must never leak past these functions.

use crate::event::EventType;
use crate::note::{Page, Stroke, StrokePoint, StrokeTool};
use serde_json::Value;
use std::collections::BTreeSet;

/// Decodes a legacy `event_types` value into the canonical tag set.
///
/// Unknown and empty labels are dropped; duplicates collapse through the set.
pub fn normalize_event_types(raw: &Value) -> BTreeSet<EventType> {
    let mut types = BTreeSet::new();
    match raw {
        Value::String(s) => {
            for label in s.split(',') {
                push_label(&mut types, label);
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Value::String(label) = item {
                    push_label(&mut types, label);
                }
            }
        }
        _ => {}
    }
    types
}

fn push_label(types: &mut BTreeSet<EventType>, label: &str) {
    if !label.trim().is_empty() {
        types.insert(EventType::from_label(label));
    }
}

/// Decodes a legacy `pages_data` value into ordered structured pages.
///
/// A bare stroke array becomes one page; an array of page objects maps
/// one-to-one. Anything unrecognizable decodes to no pages rather than
/// guessing at a shape.
pub fn normalize_pages(raw: &Value) -> Vec<Page> {
    match raw {
        Value::Array(items) if items.iter().all(looks_like_page) => items
            .iter()
            .map(|item| {
                let strokes = item
                    .get("strokes")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(decode_stroke).collect())
                    .unwrap_or_default();
                Page::new(strokes)
            })
            .collect(),
        Value::Array(items) => {
            // Legacy single-page shape: the array itself is the stroke list.
            let strokes: Vec<Stroke> = items.iter().filter_map(decode_stroke).collect();
            if strokes.is_empty() {
                Vec::new()
            } else {
                vec![Page::new(strokes)]
            }
        }
        _ => Vec::new(),
    }
}

fn looks_like_page(value: &Value) -> bool {
    value.is_object() && value.get("strokes").is_some()
}

fn decode_stroke(value: &Value) -> Option<Stroke> {
    let obj = value.as_object()?;
    let points = obj.get("points")?.as_array()?;

    let tool = obj
        .get("tool")
        .and_then(Value::as_str)
        .map(decode_tool)
        .unwrap_or_default();
    let color = obj
        .get("color")
        .and_then(Value::as_u64)
        .unwrap_or(0xFF00_00FF) as u32;
    let width = obj
        .get("width")
        .and_then(Value::as_f64)
        .unwrap_or(2.0) as f32;

    let points = points.iter().filter_map(decode_point).collect();
    Some(Stroke {
        tool,
        color,
        width,
        points,
    })
}

fn decode_tool(label: &str) -> StrokeTool {
    match label {
        "highlighter" => StrokeTool::Highlighter,
        "eraser" => StrokeTool::Eraser,
        _ => StrokeTool::Pen,
    }
}

fn decode_point(value: &Value) -> Option<StrokePoint> {
    match value {
        // Modern shape: {"x": .., "y": .., "pressure": ..}
        Value::Object(obj) => {
            let x = obj.get("x")?.as_f64()? as f32;
            let y = obj.get("y")?.as_f64()? as f32;
            let pressure = obj.get("pressure").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            Some(StrokePoint { x, y, pressure })
        }
        // Oldest shape: [x, y]
        Value::Array(pair) if pair.len() >= 2 => {
            let x = pair[0].as_f64()? as f32;
            let y = pair[1].as_f64()? as f32;
            Some(StrokePoint::new(x, y))
        }
        _ => None,
    }
}
