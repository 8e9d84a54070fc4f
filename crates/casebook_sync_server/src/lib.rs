//! # Casebook Sync Server
//!
//! Server side of the Casebook synchronization engine.
//!
//! This crate provides:
//! - The versioned entity store with optimistic-locking upserts
//! - The record identity resolver (canonical person/case identity)
//! - The all-or-nothing batch transaction engine
//! - The server change log that feeds client pulls
//! - Request handlers and the device credential gate
//!
//! ## Key Invariants
//!
//! - Every accepted write advances an entity's version by exactly 1.
//! - A mismatched expected version rejects the write and returns the
//!   server's current state; nothing is ever silently overwritten.
//! - Batch saves apply all items or none.
//! - At most one non-deleted record exists per non-empty record number.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod batch;
mod changes;
mod config;
mod error;
mod handler;
mod identity;
mod store;

pub use auth::{AllowAllGate, CredentialGate, HmacTokenGate, StaticSecretGate};
pub use batch::BatchEngine;
pub use changes::ChangeLog;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::SyncHandler;
pub use identity::RecordResolver;
pub use store::CasebookStore;
