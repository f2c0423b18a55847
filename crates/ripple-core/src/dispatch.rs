//! Event dispatch: fan-out from domain actions to recipient queues.
//!
//! Domain actions hand the dispatcher a structured event (or an ordered
//! batch of them) plus the set of recipient principals; the dispatcher
//! applies per-client filtering and pushes matching events into every live
//! queue, waking suspended long-poll calls.

use crate::registry::Registry;
use ripple_events::{EventPayload, MessageData, QueueId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Correlates a message event with the sending client's local submission.
///
/// Only the queue named here receives the `local_message_id` field; every
/// other recipient gets the plain projection.
#[derive(Debug, Clone)]
pub struct SenderEcho {
    pub queue_id: QueueId,
    pub local_id: String,
}

/// The fan-out side of the distribution core.
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Dispatch a single event to every queue of the given principals.
    ///
    /// Returns the number of queues that accepted the event. A filtering
    /// mismatch is silently skipped, never an error.
    pub fn emit(&self, payload: EventPayload, recipients: &[UserId]) -> usize {
        self.emit_batch(std::slice::from_ref(&payload), recipients)
    }

    /// Dispatch one action's ordered event batch.
    ///
    /// The batch lands atomically in each recipient queue: its events keep
    /// their relative order and never interleave with another action's
    /// batch. Returns the total number of events enqueued across queues.
    pub fn emit_batch(&self, batch: &[EventPayload], recipients: &[UserId]) -> usize {
        if batch.is_empty() {
            return 0;
        }
        crate::metrics::record_dispatch(batch.len());

        let mut delivered = 0;
        let unique: HashSet<UserId> = recipients.iter().copied().collect();
        for user_id in unique {
            for descriptor in self.registry.for_user(user_id) {
                delivered += descriptor.register_batch(batch);
            }
        }

        trace!(
            kinds = ?batch.iter().map(|p| p.kind().as_str()).collect::<Vec<_>>(),
            recipients = recipients.len(),
            delivered,
            "Dispatched event batch"
        );
        delivered
    }

    /// Dispatch a message event, attaching the local-submission echo to the
    /// sender's own queue only.
    pub fn emit_message(
        &self,
        message: MessageData,
        recipients: &[UserId],
        echo: Option<&SenderEcho>,
    ) -> usize {
        crate::metrics::record_dispatch(1);

        let mut delivered = 0;
        let unique: HashSet<UserId> = recipients.iter().copied().collect();
        for user_id in unique {
            for descriptor in self.registry.for_user(user_id) {
                let local_message_id = echo
                    .filter(|echo| echo.queue_id == descriptor.queue_id())
                    .map(|echo| echo.local_id.clone());
                let payload = EventPayload::Message {
                    message: message.clone(),
                    local_message_id,
                };
                delivered += descriptor.register_batch(std::slice::from_ref(&payload));
            }
        }

        debug!(
            message_id = message.id,
            recipients = recipients.len(),
            delivered,
            "Dispatched message"
        );
        delivered
    }

    /// The registry this dispatcher fans out over.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
