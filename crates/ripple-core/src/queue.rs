//! Per-client event queue with type-aware compaction.
//!
//! Each registered client owns exactly one [`EventQueue`]. Pushes assign a
//! strictly increasing id; high-frequency kinds (pointer moves, bulk flag
//! changes, generation markers) collapse so the queue stays bounded at
//! O(distinct compaction keys) for those kinds while low-frequency kinds are
//! delivered individually and in order.

use ripple_events::{CollapseKey, Event, EventId, EventPayload, QueueId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::trace;

/// Tunable compaction semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollapsePolicy {
    /// Whether a generation marker also invalidates flag-change tracking.
    ///
    /// Pointer tracking is always invalidated by a marker; flag-change
    /// tracking is a configuration point because a marker does not change
    /// which messages carry which flags.
    #[serde(default = "default_restart_clears_flags")]
    pub restart_clears_flag_tracking: bool,
}

fn default_restart_clears_flags() -> bool {
    true
}

impl Default for CollapsePolicy {
    fn default() -> Self {
        Self {
            restart_clears_flag_tracking: true,
        }
    }
}

/// An append-style log of events for one client.
#[derive(Debug)]
pub struct EventQueue {
    /// Owning queue identifier, for log correlation only.
    id: QueueId,
    /// Next id to assign. Only ever increases.
    next_event_id: EventId,
    /// Live events in arrival order (post-compaction).
    events: VecDeque<Event>,
    /// Compaction key -> index of the live representative in `events`.
    /// Ephemeral; never spans a generation marker.
    tracking: HashMap<CollapseKey, usize>,
    policy: CollapsePolicy,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new(id: impl Into<QueueId>) -> Self {
        Self::with_policy(id, CollapsePolicy::default())
    }

    /// Create an empty queue with specific compaction semantics.
    #[must_use]
    pub fn with_policy(id: impl Into<QueueId>, policy: CollapsePolicy) -> Self {
        Self {
            id: id.into(),
            next_event_id: 0,
            events: VecDeque::new(),
            tracking: HashMap::new(),
            policy,
        }
    }

    /// Append an event, collapsing it into an existing representative when
    /// its kind calls for it. Returns the assigned id.
    ///
    /// A collapsed-away event's id is permanently retired; the merged entry
    /// always lands at the tail under the new id.
    pub fn push(&mut self, payload: EventPayload) -> EventId {
        let id = self.next_event_id;
        self.next_event_id += 1;

        let key = payload.collapse_key();
        let payload = match key.as_ref().and_then(|k| self.take_representative(k)) {
            Some(older) => {
                trace!(queue = %self.id, retired = older.id, assigned = id, "Collapsed event");
                payload.merged_with(&older.payload)
            }
            None => payload,
        };

        let is_restart = payload.is_restart();
        self.events.push_back(Event { id, payload });
        if let Some(key) = key {
            self.tracking.insert(key.clone(), self.events.len() - 1);
            if is_restart {
                self.clear_tracking_except(&key);
            }
        }

        id
    }

    /// Remove the live representative for `key`, fixing up the indices of
    /// every representative stored after it.
    fn take_representative(&mut self, key: &CollapseKey) -> Option<Event> {
        let index = self.tracking.remove(key)?;
        let event = self.events.remove(index)?;
        for tracked in self.tracking.values_mut() {
            if *tracked > index {
                *tracked -= 1;
            }
        }
        Some(event)
    }

    /// Drop tracking for every key except `keep`. Representatives already in
    /// the queue stay where they are; they just stop being merge targets.
    fn clear_tracking_except(&mut self, keep: &CollapseKey) {
        let keep_flags = !self.policy.restart_clears_flag_tracking;
        self.tracking
            .retain(|key, _| key == keep || (keep_flags && matches!(key, CollapseKey::Flags { .. })));
    }

    /// Current contents in arrival order. Pure read.
    #[must_use]
    pub fn contents(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Events with id strictly greater than `last_event_id`.
    ///
    /// Ids of collapsed-away events are valid cursors; they simply yield
    /// whatever survives above them. `-1` means "from the beginning".
    #[must_use]
    pub fn contents_after(&self, last_event_id: EventId) -> Vec<Event> {
        self.events
            .iter()
            .filter(|event| event.id > last_event_id)
            .cloned()
            .collect()
    }

    /// Whether the queue holds no live events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of live events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// The id the next push will be assigned.
    #[must_use]
    pub fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    /// The owning queue identifier.
    #[must_use]
    pub fn queue_id(&self) -> &str {
        &self.id
    }
}
