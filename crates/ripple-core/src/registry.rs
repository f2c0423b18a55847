//! Process-wide event queue registry.
//!
//! The registry owns every live client descriptor, allocates new ones,
//! serves ownership-checked lookups, and reclaims idle queues. It is an
//! injectable component with an explicit lifecycle so embedders and tests
//! can run isolated instances side by side.

use crate::config::CoreConfig;
use crate::descriptor::{now_ms, ClientDescriptor, ClientSpec};
use dashmap::{DashMap, DashSet};
use ripple_events::{QueueId, StreamDirectory, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Unknown queue id, or a queue owned by a different principal. The two
    /// cases are deliberately indistinguishable to the caller.
    #[error("Bad event queue id: {0}")]
    NotFound(QueueId),

    /// Malformed narrow at allocation time.
    #[error("Invalid narrow filter: {0}")]
    InvalidFilter(String),

    /// Per-principal queue limit reached.
    #[error("Too many event queues for user {0}")]
    TooManyQueues(UserId),
}

/// Atomic counter for ensuring unique queue ids even within the same
/// nanosecond.
static QUEUE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_queue_id() -> QueueId {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let counter = QUEUE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{timestamp:x}:{counter:x}")
}

/// The process-wide queue table.
pub struct Registry {
    /// Descriptors indexed by queue id.
    queues: DashMap<QueueId, Arc<ClientDescriptor>>,
    /// Principal index (user id -> owned queue ids), the dispatch fan-out
    /// target.
    by_user: DashMap<UserId, DashSet<QueueId>>,
    /// Stream lookup used to validate narrows at allocation time.
    directory: Option<Arc<dyn StreamDirectory>>,
    config: CoreConfig,
}

impl Registry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: CoreConfig) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            queues: DashMap::new(),
            by_user: DashMap::new(),
            directory: None,
            config,
        }
    }

    /// Attach the stream directory used to validate narrows.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn StreamDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Register a new client descriptor under a fresh queue id.
    ///
    /// # Errors
    ///
    /// Returns an error if the narrow references an unknown stream or the
    /// principal already holds the maximum number of queues.
    pub fn allocate(&self, mut spec: ClientSpec) -> Result<Arc<ClientDescriptor>, RegistryError> {
        if let Some(stream) = spec.narrow.stream() {
            let known = self
                .directory
                .as_ref()
                .map_or(true, |directory| directory.has_stream(stream));
            if !known {
                return Err(RegistryError::InvalidFilter(format!(
                    "unknown stream: {stream}"
                )));
            }
        }

        let owned = self.by_user.entry(spec.user_id).or_default();
        if owned.len() >= self.config.max_queues_per_user {
            return Err(RegistryError::TooManyQueues(spec.user_id));
        }

        spec.lifetime = self.config.clamp_lifetime(spec.lifetime);

        let queue_id = generate_queue_id();
        let descriptor = Arc::new(ClientDescriptor::new(
            queue_id.clone(),
            spec,
            self.config.collapse,
        ));

        owned.insert(queue_id.clone());
        drop(owned);
        self.queues.insert(queue_id.clone(), descriptor.clone());

        crate::metrics::record_allocation();
        crate::metrics::set_active_queues(self.queues.len());
        debug!(
            queue = %queue_id,
            user = descriptor.user_id(),
            client = descriptor.client_info(),
            "Allocated event queue"
        );

        Ok(descriptor)
    }

    /// Look up a queue, checking ownership.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown or the queue belongs to a
    /// different principal.
    pub fn lookup(
        &self,
        queue_id: &str,
        user_id: UserId,
    ) -> Result<Arc<ClientDescriptor>, RegistryError> {
        self.queues
            .get(queue_id)
            .filter(|descriptor| descriptor.user_id() == user_id)
            .map(|descriptor| descriptor.clone())
            .ok_or_else(|| RegistryError::NotFound(queue_id.to_string()))
    }

    /// Remove a queue at the owning client's request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` under the same rules as [`Registry::lookup`].
    pub fn disconnect(&self, queue_id: &str, user_id: UserId) -> Result<(), RegistryError> {
        let descriptor = self.lookup(queue_id, user_id)?;
        self.discard(&descriptor);
        debug!(queue = %queue_id, user = user_id, "Client disconnected");
        Ok(())
    }

    /// Every live descriptor owned by a principal.
    #[must_use]
    pub fn for_user(&self, user_id: UserId) -> Vec<Arc<ClientDescriptor>> {
        let Some(owned) = self.by_user.get(&user_id) else {
            return Vec::new();
        };
        owned
            .iter()
            .filter_map(|queue_id| self.queues.get(queue_id.key()))
            .map(|descriptor| descriptor.clone())
            .collect()
    }

    /// Reclaim every queue whose idle lifetime has elapsed.
    ///
    /// Best-effort: a sweep racing a dispatch to an expiring queue either
    /// reclaims the queue (the event is lost with it) or leaves it for the
    /// next pass; queue state is never left partial.
    pub fn sweep(&self, now_ms: u64) -> Vec<QueueId> {
        let expired: Vec<Arc<ClientDescriptor>> = self
            .queues
            .iter()
            .filter(|entry| entry.value().is_expired(now_ms))
            .map(|entry| entry.value().clone())
            .collect();

        for descriptor in &expired {
            self.discard(descriptor);
            debug!(
                queue = %descriptor.queue_id(),
                user = descriptor.user_id(),
                "Swept idle queue"
            );
        }

        if !expired.is_empty() {
            crate::metrics::record_swept(expired.len());
            crate::metrics::set_active_queues(self.queues.len());
        }

        expired
            .into_iter()
            .map(|descriptor| descriptor.queue_id().to_string())
            .collect()
    }

    /// Drop every descriptor and wake their suspended polls.
    pub fn shutdown(&self) {
        let count = self.queues.len();
        for entry in self.queues.iter() {
            entry.value().close();
        }
        self.queues.clear();
        self.by_user.clear();
        crate::metrics::set_active_queues(0);
        info!(queues = count, "Registry shut down");
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            queue_count: self.queues.len(),
            user_count: self.by_user.len(),
        }
    }

    /// The configuration this registry runs with.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn discard(&self, descriptor: &ClientDescriptor) {
        self.queues.remove(descriptor.queue_id());
        if let Some(owned) = self.by_user.get_mut(&descriptor.user_id()) {
            owned.remove(descriptor.queue_id());
            let now_empty = owned.is_empty();
            drop(owned);
            if now_empty {
                self.by_user
                    .remove_if(&descriptor.user_id(), |_, owned| owned.is_empty());
            }
        }
        descriptor.close();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of registered queues.
    pub queue_count: usize,
    /// Number of principals with at least one queue.
    pub user_count: usize,
}

/// Run the idle sweep on its own schedule until the task is aborted.
pub fn spawn_sweeper(registry: Arc<Registry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let swept = registry.sweep(now_ms());
            if !swept.is_empty() {
                debug!(count = swept.len(), "Sweep pass reclaimed queues");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_events::{EventPayload, Narrow};

    struct TwoStreams;

    impl StreamDirectory for TwoStreams {
        fn has_stream(&self, name: &str) -> bool {
            matches!(name, "denmark" | "verona")
        }
    }

    fn spec(user_id: UserId) -> ClientSpec {
        ClientSpec {
            user_id,
            realm_id: 1,
            event_types: None,
            narrow: Narrow::all(),
            client_info: "website".into(),
            apply_markdown: true,
            all_public_streams: false,
            lifetime: Duration::from_secs(600),
        }
    }

    #[test]
    fn test_allocate_and_lookup() {
        let registry = Registry::new();
        let descriptor = registry.allocate(spec(1)).unwrap();
        let queue_id = descriptor.queue_id().to_string();

        let found = registry.lookup(&queue_id, 1).unwrap();
        assert_eq!(found.queue_id(), queue_id);

        assert!(matches!(
            registry.lookup("missing", 1),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_checks_ownership() {
        let registry = Registry::new();
        let descriptor = registry.allocate(spec(1)).unwrap();

        // A different principal must not be able to read this queue.
        assert!(matches!(
            registry.lookup(descriptor.queue_id(), 2),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_narrow_validated_against_directory() {
        let registry = Registry::new().with_directory(Arc::new(TwoStreams));

        let mut bad = spec(1);
        bad.narrow = Narrow::stream_only("atlantis");
        assert!(matches!(
            registry.allocate(bad),
            Err(RegistryError::InvalidFilter(_))
        ));

        let mut good = spec(1);
        good.narrow = Narrow::stream_only("denmark");
        assert!(registry.allocate(good).is_ok());
    }

    #[test]
    fn test_queue_limit_per_user() {
        let config = CoreConfig {
            max_queues_per_user: 2,
            ..CoreConfig::default()
        };
        let registry = Registry::with_config(config);

        registry.allocate(spec(1)).unwrap();
        registry.allocate(spec(1)).unwrap();
        assert!(matches!(
            registry.allocate(spec(1)),
            Err(RegistryError::TooManyQueues(1))
        ));
        // Other principals are unaffected.
        assert!(registry.allocate(spec(2)).is_ok());
    }

    #[test]
    fn test_lifetime_clamped_to_maximum() {
        let registry = Registry::new();
        let mut long_lived = spec(1);
        long_lived.lifetime = Duration::from_secs(1_000_000);
        let descriptor = registry.allocate(long_lived).unwrap();

        let registered = now_ms();
        assert!(descriptor.is_expired(registered + 7_200_001));
    }

    #[test]
    fn test_sweep_reclaims_only_expired() {
        let registry = Registry::new();
        let mut short = spec(1);
        short.lifetime = Duration::from_secs(1);
        let doomed = registry.allocate(short).unwrap();
        let survivor = registry.allocate(spec(2)).unwrap();

        let swept = registry.sweep(now_ms() + 2_000);
        assert_eq!(swept, vec![doomed.queue_id().to_string()]);
        assert!(doomed.is_closed());

        assert!(registry.lookup(doomed.queue_id(), 1).is_err());
        assert!(registry.lookup(survivor.queue_id(), 2).is_ok());
        assert_eq!(registry.stats().queue_count, 1);
    }

    #[test]
    fn test_touch_defers_sweep() {
        let registry = Registry::new();
        let mut short = spec(1);
        short.lifetime = Duration::from_secs(1);
        let descriptor = registry.allocate(short).unwrap();

        let later = now_ms() + 2_000;
        descriptor.touch(later);
        assert!(registry.sweep(later).is_empty());
    }

    #[test]
    fn test_disconnect() {
        let registry = Registry::new();
        let descriptor = registry.allocate(spec(1)).unwrap();
        let queue_id = descriptor.queue_id().to_string();

        assert!(registry.disconnect(&queue_id, 2).is_err());
        registry.disconnect(&queue_id, 1).unwrap();
        assert!(registry.lookup(&queue_id, 1).is_err());
        assert!(registry.for_user(1).is_empty());
    }

    #[test]
    fn test_for_user_fan_out() {
        let registry = Registry::new();
        registry.allocate(spec(1)).unwrap();
        registry.allocate(spec(1)).unwrap();
        registry.allocate(spec(2)).unwrap();

        assert_eq!(registry.for_user(1).len(), 2);
        assert_eq!(registry.for_user(2).len(), 1);
        assert!(registry.for_user(3).is_empty());

        let stats = registry.stats();
        assert_eq!(stats.queue_count, 3);
        assert_eq!(stats.user_count, 2);
    }

    #[test]
    fn test_shutdown_drains_everything() {
        let registry = Registry::new();
        let descriptor = registry.allocate(spec(1)).unwrap();
        descriptor.register_event(EventPayload::Pointer { pointer: 1 });

        registry.shutdown();
        assert!(descriptor.is_closed());
        assert_eq!(registry.stats().queue_count, 0);
        assert_eq!(registry.stats().user_count, 0);
    }

    #[test]
    fn test_queue_ids_unique() {
        let registry = Registry::new();
        let a = registry.allocate(spec(1)).unwrap();
        let b = registry.allocate(spec(1)).unwrap();
        assert_ne!(a.queue_id(), b.queue_id());
    }
}
