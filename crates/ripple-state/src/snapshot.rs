//! Point-in-time application state for one principal.
//!
//! A snapshot carries only the sections covered by the client's requested
//! event kinds; replaying a queue's events over it keeps it equal to a
//! freshly assembled one.

use ripple_events::{BotData, EventKind, PersonData, SubscriptionData, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Whether a client registration covers the given event kind.
///
/// `None` means every kind was requested.
#[must_use]
pub fn wants(event_types: Option<&HashSet<EventKind>>, kind: EventKind) -> bool {
    event_types.map_or(true, |kinds| kinds.contains(&kind))
}

/// A principal's visible application state.
///
/// Sections are `None` when the registration's event kinds do not cover
/// them; the owning identity fields are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The principal this snapshot belongs to.
    pub user_id: UserId,
    /// The principal's email, the identity key replay transforms match on.
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_words: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted_topics: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_emoji: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_filters: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_users: Option<Vec<PersonData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_bots: Option<Vec<BotData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<Vec<SubscriptionData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsubscribed: Option<Vec<SubscriptionData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub never_subscribed: Option<Vec<SubscriptionData>>,
}

impl Snapshot {
    /// An empty snapshot for a principal, with no sections populated.
    #[must_use]
    pub fn empty(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            pointer: None,
            max_message_id: None,
            full_name: None,
            is_admin: None,
            alert_words: None,
            muted_topics: None,
            realm_name: None,
            realm_emoji: None,
            realm_filters: None,
            realm_users: None,
            realm_bots: None,
            subscriptions: None,
            unsubscribed: None,
            never_subscribed: None,
        }
    }

    /// A comparison form where list sections become maps keyed by their
    /// stable identity (email, stream name) and peer lists are sorted.
    ///
    /// Ordering within list sections is not a correctness property, so
    /// equality checks go through this form.
    #[must_use]
    pub fn normalized(&self) -> NormalizedSnapshot {
        fn by_name(rows: &Option<Vec<SubscriptionData>>) -> Option<BTreeMap<String, SubscriptionData>> {
            rows.as_ref().map(|rows| {
                rows.iter()
                    .map(|row| {
                        let mut row = row.clone();
                        row.subscribers.sort_unstable();
                        (row.name.clone(), row)
                    })
                    .collect()
            })
        }

        NormalizedSnapshot {
            user_id: self.user_id,
            email: self.email.clone(),
            pointer: self.pointer,
            max_message_id: self.max_message_id,
            full_name: self.full_name.clone(),
            is_admin: self.is_admin,
            alert_words: self.alert_words.as_ref().map(|words| {
                let mut words = words.clone();
                words.sort_unstable();
                words
            }),
            muted_topics: self.muted_topics.clone(),
            realm_name: self.realm_name.clone(),
            realm_emoji: self.realm_emoji.clone(),
            realm_filters: self.realm_filters.clone(),
            realm_users: self.realm_users.as_ref().map(|rows| {
                rows.iter()
                    .map(|row| (row.email.clone(), row.clone()))
                    .collect()
            }),
            realm_bots: self.realm_bots.as_ref().map(|rows| {
                rows.iter()
                    .map(|row| (row.email.clone(), row.clone()))
                    .collect()
            }),
            subscriptions: by_name(&self.subscriptions),
            unsubscribed: by_name(&self.unsubscribed),
            never_subscribed: by_name(&self.never_subscribed),
        }
    }
}

/// Order-insensitive comparison form of a [`Snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSnapshot {
    pub user_id: UserId,
    pub email: String,
    pub pointer: Option<i64>,
    pub max_message_id: Option<i64>,
    pub full_name: Option<String>,
    pub is_admin: Option<bool>,
    pub alert_words: Option<Vec<String>>,
    pub muted_topics: Option<Vec<(String, String)>>,
    pub realm_name: Option<String>,
    pub realm_emoji: Option<BTreeMap<String, String>>,
    pub realm_filters: Option<Vec<(String, String)>>,
    pub realm_users: Option<BTreeMap<String, PersonData>>,
    pub realm_bots: Option<BTreeMap<String, BotData>>,
    pub subscriptions: Option<BTreeMap<String, SubscriptionData>>,
    pub unsubscribed: Option<BTreeMap<String, SubscriptionData>>,
    pub never_subscribed: Option<BTreeMap<String, SubscriptionData>>,
}
