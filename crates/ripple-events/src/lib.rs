//! # ripple-events
//!
//! Event model and delivery filters for the Ripple realtime engine.
//!
//! This crate defines the structured events the distribution core fans out
//! to long-poll clients, along with the per-client filters that decide which
//! of them a given queue receives:
//!
//! - **EventPayload** - tagged union over every event kind the core can emit
//! - **Event** - a payload with its queue-assigned sequence id
//! - **CollapseKey** - compaction identity for high-frequency event kinds
//! - **Narrow** - stream filter restricting delivered message events
//!
//! ## Example
//!
//! ```rust
//! use ripple_events::{EventPayload, EventKind};
//!
//! let event = EventPayload::Pointer { pointer: 42 };
//! assert_eq!(event.kind(), EventKind::Pointer);
//! assert!(event.collapse_key().is_some());
//! ```

pub mod event;
pub mod narrow;

pub use event::{
    BotData, BotPatch, CollapseKey, Event, EventId, EventKind, EventPayload, FlagOp, MessageData,
    PersonData, PersonPatch, RealmBotOp, RealmOp, RealmProperty, RealmUserOp, RecipientKind,
    RemovedSubscription, StreamOp, StreamProperty, SubscriptionData, SubscriptionOp,
};
pub use narrow::{resolve_all_public_streams, Narrow, NarrowError, StreamDirectory};

/// A principal (user or bot) identifier.
pub type UserId = i64;

/// A realm/tenant identifier.
pub type RealmId = i64;

/// An opaque, externally visible event queue identifier.
pub type QueueId = String;
