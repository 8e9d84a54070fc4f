//! # Casebook Sync Engine
//!
//! Client side of the Casebook synchronization engine: the offline cache a
//! device works against, and the coordinator that reconciles it with the
//! server.
//!
//! This crate provides:
//! - [`LocalCache`]: a versioned mirror of server state with dirty tracking
//!   and CBOR snapshot persistence
//! - [`SyncCoordinator`]: the pull-then-push cycle, retry with backoff, and
//!   conflict collection
//! - [`SyncTransport`]: the carrier seam, with a scripted [`MockTransport`]
//!   and an [`HttpTransport`] binding
//!
//! ## Conflict model
//!
//! Pull never overwrites a dirty row; the local edit and its stale
//! confirmed version survive until push, where the server rejects the write
//! and hands back its current state. The conflict lands in the
//! [`SyncReport`] and waits for a binary [`resolve`](SyncCoordinator::resolve)
//! decision. Nothing is merged and nothing is lost silently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod coordinator;
mod error;
mod http;
mod transport;

pub use cache::{CachedRow, LocalCache, PendingWrite};
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{PendingConflict, SyncCoordinator, SyncPhase, SyncReport, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use transport::{MockTransport, SyncTransport};
