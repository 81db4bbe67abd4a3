//! # Quill Core
//!
//! Persistence core for Quill - a note-and-task management system.
//!
//! This crate owns the single embedded store: projects, notes, tasks, the
//! full-text search index over note content, task-note relations, and an
//! append-only audit trail. HTTP routing, authentication, and presentation
//! live in calling layers; they consume the typed operations exposed here
//! and never touch the underlying tables directly.
//!
//! ## Architecture
//!
//! - **store**: the `Store` handle, transactions, and migrations
//! - **store::types**: domain records, builders, filters, pagination
//! - **store::validation**: field bounds checked before any transaction
//! - **error**: typed error kinds (`NotFound`, `Conflict`, `Busy`, ...)
//!
//! ## Correctness contract
//!
//! A note or task mutation, its search-index update, and its audit entry
//! are atomic as a unit: all three commit or none do.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::Store;

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
