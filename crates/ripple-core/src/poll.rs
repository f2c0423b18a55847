//! Long-poll delivery: immediate-or-wait event reads.
//!
//! A poll call either returns buffered events right away or suspends
//! cooperatively on the queue's wakeup primitive until a matching dispatch
//! or its deadline, whichever comes first. Per call the state machine is
//! `PENDING -> (IMMEDIATE_RETURN | WAITING) -> RETURNED`; there are no
//! internal retries, the client re-polls with the greatest id it observed.

use crate::descriptor::now_ms;
use crate::registry::{Registry, RegistryError};
use ripple_events::{Event, EventId, QueueId, UserId};
use std::pin::pin;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::trace;

/// Parameters of one poll call.
#[derive(Debug, Clone)]
pub struct PollParams {
    pub queue_id: QueueId,
    pub user_id: UserId,
    /// Return only events with id strictly greater than this; `-1` means
    /// from the beginning.
    pub last_event_id: EventId,
    /// Never suspend; an empty result is returned immediately.
    pub dont_block: bool,
    /// Deadline for a suspended call. Expiry is a normal empty return.
    pub timeout: Duration,
}

/// Read buffered events, suspending until some arrive or the deadline
/// elapses.
///
/// Timeout is not an error: it resolves to an empty, successful result.
/// Dropping the returned future (caller disconnect) leaves no side effect
/// on the queue.
///
/// # Errors
///
/// Returns `NotFound` if the queue id is unknown, owned by another
/// principal, or discarded while the call was suspended.
pub async fn poll(registry: &Registry, params: PollParams) -> Result<Vec<Event>, RegistryError> {
    let descriptor = registry.lookup(&params.queue_id, params.user_id)?;

    let events = descriptor.events_since(params.last_event_id);
    if !events.is_empty() || params.dont_block {
        descriptor.touch(now_ms());
        crate::metrics::record_poll("immediate", 0.0);
        trace!(queue = %params.queue_id, events = events.len(), "Poll returned immediately");
        return Ok(events);
    }

    let started = Instant::now();
    let wait = async {
        loop {
            // Arm the waiter before re-checking so a push landing between
            // the check and the await still wakes us.
            let mut notified = pin!(descriptor.notified());
            notified.as_mut().enable();

            if descriptor.is_closed() {
                return Err(RegistryError::NotFound(params.queue_id.clone()));
            }
            let events = descriptor.events_since(params.last_event_id);
            if !events.is_empty() {
                return Ok(events);
            }
            notified.await;
        }
    };

    match timeout(params.timeout, wait).await {
        Ok(result) => {
            if let Ok(events) = &result {
                descriptor.touch(now_ms());
                crate::metrics::record_poll("notified", started.elapsed().as_secs_f64());
                trace!(queue = %params.queue_id, events = events.len(), "Poll woke with events");
            }
            result
        }
        Err(_) => {
            descriptor.touch(now_ms());
            crate::metrics::record_poll("timeout", started.elapsed().as_secs_f64());
            trace!(queue = %params.queue_id, "Poll timed out empty");
            Ok(Vec::new())
        }
    }
}
