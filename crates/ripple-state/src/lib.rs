//! # ripple-state
//!
//! Snapshot assembly and event replay for the Ripple realtime engine.
//!
//! This crate provides the state side of the distribution contract:
//!
//! - **Snapshot** - a principal's visible application state
//! - **StateSource** - the pull boundary into domain storage
//! - **apply_events** - per-event-type transforms that keep a replayed
//!   snapshot equal to a freshly fetched one
//! - **MemoryDomain** - an in-memory realm used as the reference
//!   collaborator by the consistency harness
//!
//! ## The contract
//!
//! For a snapshot taken before a set of actions and the event sequence
//! those actions emitted:
//!
//! ```text
//! apply_events(snapshot_before, events) == fetch_snapshot(after)
//! ```
//!
//! under order-insensitive comparison of list sections.

pub mod apply;
pub mod memory;
pub mod snapshot;
pub mod source;

pub use apply::{apply_event, apply_events, ReconcileError};
pub use memory::{Emission, MemoryDomain, MessageAddress, OutgoingMessage};
pub use snapshot::{wants, NormalizedSnapshot, Snapshot};
pub use source::{SourceError, StateSource};
