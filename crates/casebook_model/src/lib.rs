//! # Casebook Model
//!
//! Entity types shared by the Casebook sync server and client engine.
//!
//! This crate provides:
//! - Identifier newtypes (`BookId`, `RecordId`, `EventId`, `DeviceId`)
//! - The `Version` counter used for optimistic locking
//! - The entity hierarchy: `Book`, `Record`, `Event`, `Note`, `Drawing`
//! - Structured page/stroke records for handwriting payloads
//! - The legacy-shape normalization boundary (`legacy` module)
//!
//! ## Key Invariants
//!
//! - Every mutable entity carries a `Version` starting at 1, incremented by
//!   exactly 1 on each accepted write.
//! - Entities that can be created offline (`Book`, `Event`) use UUIDs minted
//!   by the creating device; the server validates but never regenerates them.
//! - A `Drawing` is keyed by `(book, calendar date, view mode)`; the date is
//!   a `NaiveDate`, so midnight normalization holds by construction.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod book;
mod drawing;
mod event;
mod ids;
pub mod legacy;
mod note;
mod record;
mod version;

pub use book::Book;
pub use drawing::{Drawing, DrawingKey, ViewMode};
pub use event::{Event, EventType};
pub use ids::{BookId, DeviceId, EventId, RecordId};
pub use note::{Note, Page, Stroke, StrokePoint, StrokeTool};
pub use record::Record;
pub use version::Version;
