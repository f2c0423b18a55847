//! The pull boundary into domain storage.

use crate::snapshot::Snapshot;
use async_trait::async_trait;
use ripple_events::{EventKind, Narrow, UserId};
use std::collections::HashSet;
use thiserror::Error;

/// Errors from assembling a snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The principal does not exist.
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// A narrow referenced a stream the domain does not know.
    #[error("Unknown stream: {0}")]
    UnknownStream(String),
}

/// Assembles full-state snapshots from domain storage.
///
/// Implementations populate exactly the sections covered by `event_types`
/// (see [`crate::snapshot::wants`]); the narrow restricts message-derived
/// sections the same way it restricts delivered message events.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Build the current-state snapshot for a principal.
    async fn fetch_snapshot(
        &self,
        user_id: UserId,
        event_types: Option<&HashSet<EventKind>>,
        narrow: &Narrow,
    ) -> Result<Snapshot, SourceError>;
}
