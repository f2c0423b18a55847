//! Client descriptors: one registered long-poll session.
//!
//! A descriptor owns its event queue, the filters that decide which events
//! reach it, and the idle-lifetime bookkeeping the registry sweep uses.

use crate::queue::{CollapsePolicy, EventQueue};
use ripple_events::{
    Event, EventId, EventKind, EventPayload, Narrow, QueueId, RealmId, UserId,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::trace;

/// Current wall-clock time as unix milliseconds.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Registration parameters for a new client descriptor.
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub user_id: UserId,
    pub realm_id: RealmId,
    /// Event kinds the client wants delivered. `None` means all kinds.
    pub event_types: Option<HashSet<EventKind>>,
    /// Narrow restricting delivered message events.
    pub narrow: Narrow,
    /// Client software identifier, for log correlation.
    pub client_info: String,
    /// Whether message content is delivered rendered.
    pub apply_markdown: bool,
    /// Whether the client receives messages from all public streams.
    pub all_public_streams: bool,
    /// Idle lifetime before the sweep reclaims the queue.
    pub lifetime: Duration,
}

/// One registered long-poll session and its event queue.
#[derive(Debug)]
pub struct ClientDescriptor {
    queue_id: QueueId,
    user_id: UserId,
    realm_id: RealmId,
    event_types: Option<HashSet<EventKind>>,
    narrow: Narrow,
    client_info: String,
    apply_markdown: bool,
    all_public_streams: bool,
    lifetime: Duration,
    created_at: u64,
    /// Unix millis of the last successful poll.
    last_accessed: AtomicU64,
    /// Set when the registry discards the descriptor.
    closed: AtomicBool,
    queue: Mutex<EventQueue>,
    /// Wakes long-poll calls suspended on this queue.
    wakeup: Notify,
}

impl ClientDescriptor {
    /// Create a descriptor for a freshly allocated queue id.
    #[must_use]
    pub fn new(queue_id: QueueId, spec: ClientSpec, policy: CollapsePolicy) -> Self {
        let now = now_ms();
        Self {
            queue: Mutex::new(EventQueue::with_policy(queue_id.clone(), policy)),
            queue_id,
            user_id: spec.user_id,
            realm_id: spec.realm_id,
            event_types: spec.event_types,
            narrow: spec.narrow,
            client_info: spec.client_info,
            apply_markdown: spec.apply_markdown,
            all_public_streams: spec.all_public_streams,
            lifetime: spec.lifetime,
            created_at: now,
            last_accessed: AtomicU64::new(now),
            closed: AtomicBool::new(false),
            wakeup: Notify::new(),
        }
    }

    /// Whether this descriptor's filters let the event through.
    #[must_use]
    pub fn accepts(&self, payload: &EventPayload) -> bool {
        if let Some(kinds) = &self.event_types {
            if !kinds.contains(&payload.kind()) {
                return false;
            }
        }
        if let EventPayload::Message { message, .. } = payload {
            return self.narrow.matches(message);
        }
        true
    }

    /// Push one event if it passes the filters, waking any blocked waiter.
    ///
    /// Returns the assigned id, or `None` if the event was filtered out.
    pub fn register_event(&self, payload: EventPayload) -> Option<EventId> {
        if !self.accepts(&payload) {
            trace!(
                queue = %self.queue_id,
                kind = payload.kind().as_str(),
                "Event filtered out"
            );
            return None;
        }
        let id = self.queue().push(payload);
        self.wakeup.notify_waiters();
        Some(id)
    }

    /// Push a whole action batch under one queue lock, then wake waiters
    /// once. Events from two batches never interleave within a queue.
    ///
    /// Returns the number of events that passed the filters.
    pub fn register_batch(&self, payloads: &[EventPayload]) -> usize {
        let accepted: Vec<EventPayload> = payloads
            .iter()
            .filter(|payload| self.accepts(payload))
            .cloned()
            .collect();
        if accepted.is_empty() {
            return 0;
        }

        let delivered = accepted.len();
        let collapsed = {
            let mut queue = self.queue();
            let before = queue.len();
            for payload in accepted {
                queue.push(payload);
            }
            delivered - (queue.len() - before)
        };

        crate::metrics::record_delivery(delivered, collapsed);
        self.wakeup.notify_waiters();
        delivered
    }

    /// Events with id strictly greater than `last_event_id`.
    #[must_use]
    pub fn events_since(&self, last_event_id: EventId) -> Vec<Event> {
        self.queue().contents_after(last_event_id)
    }

    /// Full queue contents in arrival order.
    #[must_use]
    pub fn contents(&self) -> Vec<Event> {
        self.queue().contents()
    }

    /// Whether the idle lifetime has elapsed since the last poll.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        let last = self.last_accessed.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) > self.lifetime.as_millis() as u64
    }

    /// Record a successful poll.
    pub fn touch(&self, now_ms: u64) {
        self.last_accessed.store(now_ms, Ordering::Relaxed);
    }

    /// Mark the descriptor discarded and wake any suspended poll.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wakeup.notify_waiters();
    }

    /// Whether the registry has discarded this descriptor.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A future resolving on the next wakeup of this queue.
    ///
    /// Callers must `enable` the future before re-checking queue contents so
    /// a push between check and await is never lost.
    #[must_use]
    pub fn notified(&self) -> Notified<'_> {
        self.wakeup.notified()
    }

    /// The externally visible queue identifier.
    #[must_use]
    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    /// The owning principal.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The owning realm.
    #[must_use]
    pub fn realm_id(&self) -> RealmId {
        self.realm_id
    }

    /// Client software identifier supplied at registration.
    #[must_use]
    pub fn client_info(&self) -> &str {
        &self.client_info
    }

    /// Whether message content is delivered rendered.
    #[must_use]
    pub fn apply_markdown(&self) -> bool {
        self.apply_markdown
    }

    /// Whether the client receives messages from all public streams.
    #[must_use]
    pub fn all_public_streams(&self) -> bool {
        self.all_public_streams
    }

    /// Registration time, unix millis.
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    fn queue(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
