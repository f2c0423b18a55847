//! Event types for the Ripple distribution core.
//!
//! Every state change the server pushes to clients is one of the variants of
//! [`EventPayload`]. Events are serialized as flat JSON objects with a `type`
//! tag (and an `op` tag for kinds that carry sub-operations), matching the
//! shape long-poll clients consume.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::UserId;

/// A queue-assigned event sequence identifier.
///
/// Ids start at 0 for each queue and increase strictly monotonically. `-1`
/// is the poll cursor meaning "before the first event".
pub type EventId = i64;

/// Event kind discriminants.
///
/// Used by per-client allow-lists and the compaction table. Kept in sync
/// with [`EventPayload`] via [`EventPayload::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Pointer,
    Restart,
    UpdateMessageFlags,
    Subscription,
    Stream,
    RealmUser,
    Realm,
    RealmBot,
    RealmEmoji,
    RealmFilters,
    AlertWords,
    MutedTopics,
}

impl EventKind {
    /// Get the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Pointer => "pointer",
            EventKind::Restart => "restart",
            EventKind::UpdateMessageFlags => "update_message_flags",
            EventKind::Subscription => "subscription",
            EventKind::Stream => "stream",
            EventKind::RealmUser => "realm_user",
            EventKind::Realm => "realm",
            EventKind::RealmBot => "realm_bot",
            EventKind::RealmEmoji => "realm_emoji",
            EventKind::RealmFilters => "realm_filters",
            EventKind::AlertWords => "alert_words",
            EventKind::MutedTopics => "muted_topics",
        }
    }
}

/// Recipient kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    /// Sent to a stream; `display_recipient` is the stream name.
    Stream,
    /// Sent directly to one or more users.
    Private,
}

/// The message body carried by a `message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    /// Server-assigned message id.
    pub id: i64,
    /// Email of the sending principal.
    pub sender_email: String,
    /// Whether this went to a stream or directly to users.
    #[serde(rename = "type")]
    pub recipient_kind: RecipientKind,
    /// Stream name for stream messages, recipient label otherwise.
    pub display_recipient: String,
    /// Topic within the stream.
    pub subject: String,
    /// Rendered or raw message content.
    pub content: String,
    /// Unix timestamp (seconds) of the send.
    pub timestamp: u64,
}

/// A user row as it appears in `realm_user` add events and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonData {
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    pub is_bot: bool,
}

/// A partial user update; absent fields are untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonPatch {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

/// A bot row as it appears in `realm_bot` add events and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotData {
    pub email: String,
    pub full_name: String,
    pub api_key: String,
    pub default_sending_stream: Option<String>,
    pub default_events_register_stream: Option<String>,
    pub default_all_public_streams: bool,
    pub avatar_url: String,
}

/// A partial bot update; absent fields are untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPatch {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// A subscription row carried by `subscription` add events and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub name: String,
    pub stream_id: i64,
    pub description: String,
    pub email_address: String,
    pub color: String,
    pub invite_only: bool,
    pub in_home_view: bool,
    pub desktop_notifications: bool,
    pub audible_notifications: bool,
    /// User ids currently subscribed to the stream.
    pub subscribers: Vec<UserId>,
}

/// The minimal reference carried by `subscription` remove events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedSubscription {
    pub name: String,
    pub stream_id: i64,
}

/// Sub-operations of `subscription` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SubscriptionOp {
    /// The receiving client gained subscriptions.
    Add { subscriptions: Vec<SubscriptionData> },
    /// The receiving client lost subscriptions.
    Remove {
        subscriptions: Vec<RemovedSubscription>,
    },
    /// Another user joined streams the client can see.
    PeerAdd {
        user_id: UserId,
        user_email: String,
        subscriptions: Vec<String>,
    },
    /// Another user left streams the client can see.
    PeerRemove {
        user_id: UserId,
        user_email: String,
        subscriptions: Vec<String>,
    },
}

/// Stream properties a `stream` update event can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamProperty {
    Name,
    Description,
    EmailAddress,
}

/// Sub-operations of `stream` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StreamOp {
    /// A property of the named stream changed. `name` is the stream's name
    /// at emit time (the old name for renames).
    Update {
        property: StreamProperty,
        value: String,
        name: String,
    },
}

/// Realm properties a `realm` update event can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealmProperty {
    Name,
}

/// Sub-operations of `realm` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RealmOp {
    Update { property: RealmProperty, value: String },
}

/// Sub-operations of `realm_user` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RealmUserOp {
    Add { person: PersonData },
    Update { person: PersonPatch },
}

/// Sub-operations of `realm_bot` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RealmBotOp {
    Add { bot: BotData },
    Update { bot: BotPatch },
    Remove { email: String },
}

/// Direction of a bulk message-flag change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagOp {
    Add,
    Remove,
}

/// A structured event, before a queue has assigned it an id.
///
/// Serializes as a flat object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new message. `local_message_id` correlates the event with the
    /// sending client's locally rendered copy and is attached only to the
    /// sender's own queue.
    Message {
        message: MessageData,
        #[serde(skip_serializing_if = "Option::is_none")]
        local_message_id: Option<String>,
    },

    /// The client's pointer (read cursor) moved. Collapsible.
    Pointer { pointer: i64 },

    /// Generation marker: server state was regenerated and clients must
    /// re-synchronize from a fresh snapshot. Collapsible; enqueueing one
    /// also invalidates all other compaction tracking in the queue.
    Restart { server_generation: u64 },

    /// Bulk message-flag change. Collapsible per (flag, operation, all).
    UpdateMessageFlags {
        flag: String,
        operation: FlagOp,
        all: bool,
        messages: Vec<i64>,
    },

    Subscription(SubscriptionOp),

    Stream(StreamOp),

    RealmUser(RealmUserOp),

    Realm(RealmOp),

    RealmBot(RealmBotOp),

    /// Full replacement of the realm emoji set.
    RealmEmoji { realm_emoji: BTreeMap<String, String> },

    /// Full replacement of the realm linkifier patterns.
    RealmFilters { realm_filters: Vec<(String, String)> },

    /// Full replacement of the client's alert words.
    AlertWords { alert_words: Vec<String> },

    /// Full replacement of the client's muted (stream, topic) pairs.
    MutedTopics { muted_topics: Vec<(String, String)> },
}

impl EventPayload {
    /// Get the kind discriminant for this payload.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Message { .. } => EventKind::Message,
            EventPayload::Pointer { .. } => EventKind::Pointer,
            EventPayload::Restart { .. } => EventKind::Restart,
            EventPayload::UpdateMessageFlags { .. } => EventKind::UpdateMessageFlags,
            EventPayload::Subscription(_) => EventKind::Subscription,
            EventPayload::Stream(_) => EventKind::Stream,
            EventPayload::RealmUser(_) => EventKind::RealmUser,
            EventPayload::Realm(_) => EventKind::Realm,
            EventPayload::RealmBot(_) => EventKind::RealmBot,
            EventPayload::RealmEmoji { .. } => EventKind::RealmEmoji,
            EventPayload::RealmFilters { .. } => EventKind::RealmFilters,
            EventPayload::AlertWords { .. } => EventKind::AlertWords,
            EventPayload::MutedTopics { .. } => EventKind::MutedTopics,
        }
    }

    /// Compaction identity, for kinds that collapse. `None` means the event
    /// is delivered individually and in order.
    #[must_use]
    pub fn collapse_key(&self) -> Option<CollapseKey> {
        match self {
            EventPayload::Pointer { .. } => Some(CollapseKey::Pointer),
            EventPayload::Restart { .. } => Some(CollapseKey::Restart),
            EventPayload::UpdateMessageFlags {
                flag,
                operation,
                all,
                ..
            } => Some(CollapseKey::Flags {
                flag: flag.clone(),
                operation: *operation,
                all: *all,
            }),
            _ => None,
        }
    }

    /// Whether this is a generation marker.
    #[must_use]
    pub fn is_restart(&self) -> bool {
        matches!(self, EventPayload::Restart { .. })
    }

    /// Merge a superseded event of the same collapse key into this one.
    ///
    /// Flag-change events take the deduplicated union of both message-id
    /// lists, older ids first; every other field comes from `self`. For the
    /// remaining collapsible kinds the newer event wins outright.
    #[must_use]
    pub fn merged_with(self, older: &EventPayload) -> EventPayload {
        match (self, older) {
            (
                EventPayload::UpdateMessageFlags {
                    flag,
                    operation,
                    all,
                    messages,
                },
                EventPayload::UpdateMessageFlags {
                    messages: prior, ..
                },
            ) => {
                let mut seen: HashSet<i64> = prior.iter().copied().collect();
                let mut merged = prior.clone();
                for id in messages {
                    if seen.insert(id) {
                        merged.push(id);
                    }
                }
                EventPayload::UpdateMessageFlags {
                    flag,
                    operation,
                    all,
                    messages: merged,
                }
            }
            (newer, _) => newer,
        }
    }
}

/// Compaction key for collapsible event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollapseKey {
    Pointer,
    Restart,
    Flags {
        flag: String,
        operation: FlagOp,
        all: bool,
    },
}

/// An event as delivered from a queue: payload plus its assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Get the kind of the wrapped payload.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_serializes_flat() {
        let event = Event {
            id: 3,
            payload: EventPayload::Pointer { pointer: 7 },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"id": 3, "type": "pointer", "pointer": 7}));
    }

    #[test]
    fn test_nested_op_tag() {
        let event = EventPayload::Subscription(SubscriptionOp::PeerAdd {
            user_id: 12,
            user_email: "othello@example.com".into(),
            subscriptions: vec!["denmark".into()],
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "subscription");
        assert_eq!(value["op"], "peer_add");
        assert_eq!(value["user_email"], "othello@example.com");
    }

    #[test]
    fn test_local_message_id_omitted_when_absent() {
        let message = MessageData {
            id: 1,
            sender_email: "hamlet@example.com".into(),
            recipient_kind: RecipientKind::Private,
            display_recipient: "othello@example.com".into(),
            subject: String::new(),
            content: "hello".into(),
            timestamp: 0,
        };
        let value = serde_json::to_value(EventPayload::Message {
            message,
            local_message_id: None,
        })
        .unwrap();
        assert!(value.get("local_message_id").is_none());
    }

    #[test]
    fn test_collapse_key_classification() {
        assert_eq!(
            EventPayload::Pointer { pointer: 1 }.collapse_key(),
            Some(CollapseKey::Pointer)
        );
        assert_eq!(
            EventPayload::Restart {
                server_generation: 1
            }
            .collapse_key(),
            Some(CollapseKey::Restart)
        );
        assert_eq!(
            EventPayload::AlertWords {
                alert_words: vec![]
            }
            .collapse_key(),
            None
        );

        let add = EventPayload::UpdateMessageFlags {
            flag: "read".into(),
            operation: FlagOp::Add,
            all: false,
            messages: vec![1],
        };
        let remove = EventPayload::UpdateMessageFlags {
            flag: "read".into(),
            operation: FlagOp::Remove,
            all: false,
            messages: vec![1],
        };
        // Opposite operations must never share a key.
        assert_ne!(add.collapse_key(), remove.collapse_key());
    }

    #[test]
    fn test_flag_merge_unions_messages() {
        let older = EventPayload::UpdateMessageFlags {
            flag: "read".into(),
            operation: FlagOp::Add,
            all: false,
            messages: vec![1, 2, 3, 4],
        };
        let newer = EventPayload::UpdateMessageFlags {
            flag: "read".into(),
            operation: FlagOp::Add,
            all: false,
            messages: vec![3, 5, 6],
        };
        let merged = newer.merged_with(&older);
        match merged {
            EventPayload::UpdateMessageFlags { messages, .. } => {
                assert_eq!(messages, vec![1, 2, 3, 4, 5, 6]);
            }
            other => panic!("unexpected merge result: {other:?}"),
        }
    }

    #[test]
    fn test_pointer_merge_replaces() {
        let older = EventPayload::Pointer { pointer: 5 };
        let newer = EventPayload::Pointer { pointer: 9 };
        assert_eq!(
            newer.merged_with(&older),
            EventPayload::Pointer { pointer: 9 }
        );
    }

    #[test]
    fn test_event_kind_roundtrip() {
        let kind: EventKind = serde_json::from_value(json!("update_message_flags")).unwrap();
        assert_eq!(kind, EventKind::UpdateMessageFlags);
        assert_eq!(kind.as_str(), "update_message_flags");
    }
}
