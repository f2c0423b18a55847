//! In-memory domain collaborator.
//!
//! A self-contained realm (users, bots, streams, settings) that implements
//! the snapshot and stream-lookup boundaries and exposes the domain actions
//! the distribution core is exercised against. Every action mutates the
//! store and returns the event batches it would emit, so a harness can feed
//! them through a dispatcher and compare incremental replay with a fresh
//! fetch.

use crate::snapshot::{wants, Snapshot};
use crate::source::{SourceError, StateSource};
use async_trait::async_trait;
use ripple_events::{
    BotData, BotPatch, EventKind, EventPayload, FlagOp, MessageData, Narrow, PersonData,
    PersonPatch, RealmBotOp, RealmOp, RealmProperty, RealmUserOp, RecipientKind,
    RemovedSubscription, StreamDirectory, StreamOp, StreamProperty, SubscriptionData,
    SubscriptionOp, UserId,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// One event batch bound for a set of recipients.
///
/// Batches from one action must be dispatched in order; recipients of
/// different batches may overlap or be disjoint.
#[derive(Debug, Clone)]
pub struct Emission {
    pub events: Vec<EventPayload>,
    pub recipients: Vec<UserId>,
}

/// A freshly stored message and the principals it goes to.
///
/// Returned separately from [`Emission`] so the caller can decide the
/// sender-echo projection per queue.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message: MessageData,
    pub recipients: Vec<UserId>,
}

/// Where a message is addressed.
#[derive(Debug, Clone)]
pub enum MessageAddress {
    Stream { stream: String, topic: String },
    Private { recipients: Vec<UserId> },
}

#[derive(Debug)]
struct UserRecord {
    user_id: UserId,
    email: String,
    full_name: String,
    is_admin: bool,
    is_bot: bool,
    pointer: i64,
    alert_words: Vec<String>,
    muted_topics: Vec<(String, String)>,
    /// Messages delivered to this user, for the message-derived sections.
    received: Vec<MessageData>,
}

#[derive(Debug)]
struct BotRecord {
    email: String,
    full_name: String,
    api_key: String,
    default_sending_stream: Option<String>,
    default_events_register_stream: Option<String>,
    default_all_public_streams: bool,
    avatar_url: String,
}

#[derive(Debug)]
struct StreamRecord {
    stream_id: i64,
    name: String,
    description: String,
    email_address: String,
    invite_only: bool,
    subscribers: BTreeSet<UserId>,
    /// Users who were subscribed at some point and left.
    former_subscribers: BTreeSet<UserId>,
}

#[derive(Debug)]
struct DomainState {
    realm_name: String,
    users: BTreeMap<UserId, UserRecord>,
    bots: BTreeMap<String, BotRecord>,
    streams: BTreeMap<String, StreamRecord>,
    realm_emoji: BTreeMap<String, String>,
    realm_filters: Vec<(String, String)>,
    next_user_id: UserId,
    next_stream_id: i64,
    next_message_id: i64,
    api_key_seed: u64,
}

/// The in-memory realm.
pub struct MemoryDomain {
    inner: Mutex<DomainState>,
}

fn stream_email(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("{slug}@streams.example.com")
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn subscription_row(stream: &StreamRecord) -> SubscriptionData {
    SubscriptionData {
        name: stream.name.clone(),
        stream_id: stream.stream_id,
        description: stream.description.clone(),
        email_address: stream.email_address.clone(),
        color: "#c2c2c2".into(),
        invite_only: stream.invite_only,
        in_home_view: true,
        desktop_notifications: true,
        audible_notifications: true,
        subscribers: stream.subscribers.iter().copied().collect(),
    }
}

fn person_row(user: &UserRecord) -> PersonData {
    PersonData {
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        is_admin: user.is_admin,
        is_bot: user.is_bot,
    }
}

fn bot_row(bot: &BotRecord) -> BotData {
    BotData {
        email: bot.email.clone(),
        full_name: bot.full_name.clone(),
        api_key: bot.api_key.clone(),
        default_sending_stream: bot.default_sending_stream.clone(),
        default_events_register_stream: bot.default_events_register_stream.clone(),
        default_all_public_streams: bot.default_all_public_streams,
        avatar_url: bot.avatar_url.clone(),
    }
}

impl DomainState {
    fn all_user_ids(&self) -> Vec<UserId> {
        self.users.keys().copied().collect()
    }

    fn user(&self, user_id: UserId) -> Result<&UserRecord, SourceError> {
        self.users
            .get(&user_id)
            .ok_or(SourceError::UnknownUser(user_id))
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut UserRecord, SourceError> {
        self.users
            .get_mut(&user_id)
            .ok_or(SourceError::UnknownUser(user_id))
    }

    fn stream_key(&self, name: &str) -> Option<String> {
        self.streams
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn next_api_key(&mut self) -> String {
        self.api_key_seed = self
            .api_key_seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        format!(
            "{:032x}",
            u128::from(self.api_key_seed).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        )
    }
}

impl MemoryDomain {
    /// Create an empty realm.
    #[must_use]
    pub fn new(realm_name: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(DomainState {
                realm_name: realm_name.into(),
                users: BTreeMap::new(),
                bots: BTreeMap::new(),
                streams: BTreeMap::new(),
                realm_emoji: BTreeMap::new(),
                realm_filters: Vec::new(),
                next_user_id: 1,
                next_stream_id: 1,
                next_message_id: 1,
                api_key_seed: 0x5eed,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DomainState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user. Setup helper, emits nothing.
    pub fn add_user(&self, email: impl Into<String>, full_name: impl Into<String>) -> UserId {
        let mut state = self.lock();
        let user_id = state.next_user_id;
        state.next_user_id += 1;
        state.users.insert(
            user_id,
            UserRecord {
                user_id,
                email: email.into(),
                full_name: full_name.into(),
                is_admin: false,
                is_bot: false,
                pointer: -1,
                alert_words: Vec::new(),
                muted_topics: Vec::new(),
                received: Vec::new(),
            },
        );
        user_id
    }

    /// Create a stream with no subscribers. Setup helper, emits nothing.
    pub fn add_stream(&self, name: impl Into<String>, description: impl Into<String>) -> i64 {
        let mut state = self.lock();
        let name = name.into();
        let stream_id = state.next_stream_id;
        state.next_stream_id += 1;
        state.streams.insert(
            name.clone(),
            StreamRecord {
                stream_id,
                email_address: stream_email(&name),
                name,
                description: description.into(),
                invite_only: false,
                subscribers: BTreeSet::new(),
                former_subscribers: BTreeSet::new(),
            },
        );
        stream_id
    }

    /// Look up a user id by email.
    #[must_use]
    pub fn user_id_by_email(&self, email: &str) -> Option<UserId> {
        self.lock()
            .users
            .values()
            .find(|user| user.email == email)
            .map(|user| user.user_id)
    }

    /// Store a message and compute its recipient set.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown sender, recipient, or stream.
    pub fn send_message(
        &self,
        sender: UserId,
        address: MessageAddress,
        content: &str,
    ) -> Result<OutgoingMessage, SourceError> {
        let mut state = self.lock();
        let sender_email = state.user(sender)?.email.clone();

        let (recipients, recipient_kind, display_recipient, subject) = match address {
            MessageAddress::Stream { stream, topic } => {
                let key = state
                    .stream_key(&stream)
                    .ok_or_else(|| SourceError::UnknownStream(stream.clone()))?;
                let record = &state.streams[&key];
                let recipients: Vec<UserId> = record.subscribers.iter().copied().collect();
                (recipients, RecipientKind::Stream, record.name.clone(), topic)
            }
            MessageAddress::Private { recipients } => {
                let mut unique: BTreeSet<UserId> = recipients.into_iter().collect();
                unique.insert(sender);
                let mut emails = Vec::new();
                for user_id in &unique {
                    emails.push(state.user(*user_id)?.email.clone());
                }
                (
                    unique.into_iter().collect(),
                    RecipientKind::Private,
                    emails.join(", "),
                    String::new(),
                )
            }
        };

        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = MessageData {
            id,
            sender_email,
            recipient_kind,
            display_recipient,
            subject,
            content: content.into(),
            timestamp: now_secs(),
        };

        for user_id in &recipients {
            state.user_mut(*user_id)?.received.push(message.clone());
        }

        debug!(message_id = id, recipients = recipients.len(), "Stored message");
        Ok(OutgoingMessage {
            message,
            recipients,
        })
    }

    /// Advance a user's pointer. Moves backwards are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn update_pointer(
        &self,
        user_id: UserId,
        pointer: i64,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let user = state.user_mut(user_id)?;
        if pointer <= user.pointer {
            return Ok(Vec::new());
        }
        user.pointer = pointer;
        Ok(vec![Emission {
            events: vec![EventPayload::Pointer { pointer }],
            recipients: vec![user_id],
        }])
    }

    /// Change a user's (or bot's) display name.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn change_full_name(
        &self,
        user_id: UserId,
        full_name: impl Into<String>,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let full_name = full_name.into();
        let user = state.user_mut(user_id)?;
        user.full_name = full_name.clone();
        let email = user.email.clone();
        let is_bot = user.is_bot;

        let mut events = vec![EventPayload::RealmUser(RealmUserOp::Update {
            person: PersonPatch {
                email: email.clone(),
                full_name: Some(full_name.clone()),
                is_admin: None,
            },
        })];
        if is_bot {
            if let Some(bot) = state.bots.get_mut(&email) {
                bot.full_name = full_name.clone();
            }
            events.push(EventPayload::RealmBot(RealmBotOp::Update {
                bot: BotPatch {
                    email,
                    full_name: Some(full_name),
                    api_key: None,
                },
            }));
        }

        Ok(vec![Emission {
            events,
            recipients: state.all_user_ids(),
        }])
    }

    /// Grant or revoke realm administration.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn change_is_admin(
        &self,
        user_id: UserId,
        is_admin: bool,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let user = state.user_mut(user_id)?;
        user.is_admin = is_admin;
        let email = user.email.clone();
        Ok(vec![Emission {
            events: vec![EventPayload::RealmUser(RealmUserOp::Update {
                person: PersonPatch {
                    email,
                    full_name: None,
                    is_admin: Some(is_admin),
                },
            })],
            recipients: state.all_user_ids(),
        }])
    }

    /// Rename the realm.
    pub fn set_realm_name(&self, name: impl Into<String>) -> Vec<Emission> {
        let mut state = self.lock();
        let name = name.into();
        state.realm_name = name.clone();
        vec![Emission {
            events: vec![EventPayload::Realm(RealmOp::Update {
                property: RealmProperty::Name,
                value: name,
            })],
            recipients: state.all_user_ids(),
        }]
    }

    /// Add a realm emoji. The event carries the whole set.
    pub fn add_realm_emoji(
        &self,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Vec<Emission> {
        let mut state = self.lock();
        state.realm_emoji.insert(name.into(), url.into());
        Self::emoji_emission(&state)
    }

    /// Remove a realm emoji.
    pub fn remove_realm_emoji(&self, name: &str) -> Vec<Emission> {
        let mut state = self.lock();
        state.realm_emoji.remove(name);
        Self::emoji_emission(&state)
    }

    fn emoji_emission(state: &DomainState) -> Vec<Emission> {
        vec![Emission {
            events: vec![EventPayload::RealmEmoji {
                realm_emoji: state.realm_emoji.clone(),
            }],
            recipients: state.all_user_ids(),
        }]
    }

    /// Add a realm linkifier pattern. The event carries the whole list.
    pub fn add_realm_filter(
        &self,
        pattern: impl Into<String>,
        url_format: impl Into<String>,
    ) -> Vec<Emission> {
        let mut state = self.lock();
        state.realm_filters.push((pattern.into(), url_format.into()));
        Self::filter_emission(&state)
    }

    /// Remove a realm linkifier pattern.
    pub fn remove_realm_filter(&self, pattern: &str) -> Vec<Emission> {
        let mut state = self.lock();
        state.realm_filters.retain(|(existing, _)| existing != pattern);
        Self::filter_emission(&state)
    }

    fn filter_emission(state: &DomainState) -> Vec<Emission> {
        vec![Emission {
            events: vec![EventPayload::RealmFilters {
                realm_filters: state.realm_filters.clone(),
            }],
            recipients: state.all_user_ids(),
        }]
    }

    /// Add alert words for a user. The event carries the whole list.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn add_alert_words(
        &self,
        user_id: UserId,
        words: &[&str],
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let user = state.user_mut(user_id)?;
        for word in words {
            if !user.alert_words.iter().any(|existing| existing == word) {
                user.alert_words.push((*word).to_string());
            }
        }
        let alert_words = user.alert_words.clone();
        Ok(vec![Emission {
            events: vec![EventPayload::AlertWords { alert_words }],
            recipients: vec![user_id],
        }])
    }

    /// Remove alert words for a user.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn remove_alert_words(
        &self,
        user_id: UserId,
        words: &[&str],
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let user = state.user_mut(user_id)?;
        user.alert_words
            .retain(|existing| !words.iter().any(|word| word == existing));
        let alert_words = user.alert_words.clone();
        Ok(vec![Emission {
            events: vec![EventPayload::AlertWords { alert_words }],
            recipients: vec![user_id],
        }])
    }

    /// Replace a user's muted (stream, topic) pairs.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn set_muted_topics(
        &self,
        user_id: UserId,
        topics: Vec<(String, String)>,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let user = state.user_mut(user_id)?;
        user.muted_topics = topics.clone();
        Ok(vec![Emission {
            events: vec![EventPayload::MutedTopics {
                muted_topics: topics,
            }],
            recipients: vec![user_id],
        }])
    }

    /// Create a bot owned by an existing user.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown owner.
    pub fn create_bot(
        &self,
        email: impl Into<String>,
        full_name: impl Into<String>,
        owner: UserId,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        state.user(owner)?;

        let email = email.into();
        let full_name = full_name.into();
        let user_id = state.next_user_id;
        state.next_user_id += 1;
        state.users.insert(
            user_id,
            UserRecord {
                user_id,
                email: email.clone(),
                full_name: full_name.clone(),
                is_admin: false,
                is_bot: true,
                pointer: -1,
                alert_words: Vec::new(),
                muted_topics: Vec::new(),
                received: Vec::new(),
            },
        );

        let api_key = state.next_api_key();
        let bot = BotRecord {
            email: email.clone(),
            full_name: full_name.clone(),
            api_key,
            default_sending_stream: None,
            default_events_register_stream: None,
            default_all_public_streams: false,
            avatar_url: format!("https://avatars.example.com/{email}"),
        };
        let bot_event = bot_row(&bot);
        state.bots.insert(email.clone(), bot);

        Ok(vec![Emission {
            events: vec![
                EventPayload::RealmUser(RealmUserOp::Add {
                    person: PersonData {
                        email,
                        full_name,
                        is_admin: false,
                        is_bot: true,
                    },
                }),
                EventPayload::RealmBot(RealmBotOp::Add { bot: bot_event }),
            ],
            recipients: state.all_user_ids(),
        }])
    }

    /// Rotate a bot's API key.
    ///
    /// # Errors
    ///
    /// Returns an error if no bot has this email.
    pub fn regenerate_bot_api_key(&self, email: &str) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let api_key = state.next_api_key();
        let bot = state
            .bots
            .get_mut(email)
            .ok_or_else(|| SourceError::UnknownUser(-1))?;
        bot.api_key = api_key.clone();
        let email = bot.email.clone();
        Ok(vec![Emission {
            events: vec![EventPayload::RealmBot(RealmBotOp::Update {
                bot: BotPatch {
                    email,
                    full_name: None,
                    api_key: Some(api_key),
                },
            })],
            recipients: state.all_user_ids(),
        }])
    }

    /// Withdraw a bot from the realm's bot roster. Its user record stays.
    ///
    /// # Errors
    ///
    /// Returns an error if no bot has this email.
    pub fn deactivate_bot(&self, email: &str) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        state
            .bots
            .remove(email)
            .ok_or_else(|| SourceError::UnknownUser(-1))?;
        Ok(vec![Emission {
            events: vec![EventPayload::RealmBot(RealmBotOp::Remove {
                email: email.to_string(),
            })],
            recipients: state.all_user_ids(),
        }])
    }

    /// Subscribe a user to a stream, creating the stream if needed.
    ///
    /// The subscriber gets an `add` batch; every other realm user gets a
    /// `peer_add` batch.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn subscribe(
        &self,
        user_id: UserId,
        stream_name: &str,
    ) -> Result<Vec<Emission>, SourceError> {
        {
            let state = self.lock();
            state.user(user_id)?;
            if state.stream_key(stream_name).is_none() {
                drop(state);
                self.add_stream(stream_name, "");
            }
        }

        let mut state = self.lock();
        let user_email = state.user(user_id)?.email.clone();
        let key = state
            .stream_key(stream_name)
            .ok_or_else(|| SourceError::UnknownStream(stream_name.to_string()))?;
        let stream = state.streams.get_mut(&key).expect("stream key just resolved");
        if !stream.subscribers.insert(user_id) {
            return Ok(Vec::new());
        }
        stream.former_subscribers.remove(&user_id);
        let row = subscription_row(stream);
        let name = stream.name.clone();
        debug!(user = user_id, stream = %name, "Subscribed");

        let peers: Vec<UserId> = state
            .all_user_ids()
            .into_iter()
            .filter(|id| *id != user_id)
            .collect();

        let mut emissions = vec![Emission {
            events: vec![EventPayload::Subscription(SubscriptionOp::Add {
                subscriptions: vec![row],
            })],
            recipients: vec![user_id],
        }];
        if !peers.is_empty() {
            emissions.push(Emission {
                events: vec![EventPayload::Subscription(SubscriptionOp::PeerAdd {
                    user_id,
                    user_email,
                    subscriptions: vec![name],
                })],
                recipients: peers,
            });
        }
        Ok(emissions)
    }

    /// Unsubscribe a user from a stream.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user or stream.
    pub fn unsubscribe(
        &self,
        user_id: UserId,
        stream_name: &str,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let user_email = state.user(user_id)?.email.clone();
        let key = state
            .stream_key(stream_name)
            .ok_or_else(|| SourceError::UnknownStream(stream_name.to_string()))?;
        let stream = state.streams.get_mut(&key).expect("stream key just resolved");
        if !stream.subscribers.remove(&user_id) {
            return Ok(Vec::new());
        }
        stream.former_subscribers.insert(user_id);
        let name = stream.name.clone();
        let stream_id = stream.stream_id;
        debug!(user = user_id, stream = %name, "Unsubscribed");

        let peers: Vec<UserId> = state
            .all_user_ids()
            .into_iter()
            .filter(|id| *id != user_id)
            .collect();

        let mut emissions = vec![Emission {
            events: vec![EventPayload::Subscription(SubscriptionOp::Remove {
                subscriptions: vec![RemovedSubscription { name: name.clone(), stream_id }],
            })],
            recipients: vec![user_id],
        }];
        if !peers.is_empty() {
            emissions.push(Emission {
                events: vec![EventPayload::Subscription(SubscriptionOp::PeerRemove {
                    user_id,
                    user_email,
                    subscriptions: vec![name],
                })],
                recipients: peers,
            });
        }
        Ok(emissions)
    }

    /// Rename a stream.
    ///
    /// Emits the address change and the name change in that order, in one
    /// batch, both keyed by the old name.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown stream.
    pub fn rename_stream(
        &self,
        old_name: &str,
        new_name: impl Into<String>,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let key = state
            .stream_key(old_name)
            .ok_or_else(|| SourceError::UnknownStream(old_name.to_string()))?;
        let new_name = new_name.into();
        let new_email = stream_email(&new_name);

        let mut stream = state.streams.remove(&key).expect("stream key just resolved");
        let old_name = stream.name.clone();
        stream.name = new_name.clone();
        stream.email_address = new_email.clone();
        state.streams.insert(new_name.clone(), stream);

        Ok(vec![Emission {
            events: vec![
                EventPayload::Stream(StreamOp::Update {
                    property: StreamProperty::EmailAddress,
                    value: new_email,
                    name: old_name.clone(),
                }),
                EventPayload::Stream(StreamOp::Update {
                    property: StreamProperty::Name,
                    value: new_name,
                    name: old_name,
                }),
            ],
            recipients: state.all_user_ids(),
        }])
    }

    /// Change a stream's description.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown stream.
    pub fn change_stream_description(
        &self,
        stream_name: &str,
        description: impl Into<String>,
    ) -> Result<Vec<Emission>, SourceError> {
        let mut state = self.lock();
        let key = state
            .stream_key(stream_name)
            .ok_or_else(|| SourceError::UnknownStream(stream_name.to_string()))?;
        let description = description.into();
        let stream = state.streams.get_mut(&key).expect("stream key just resolved");
        stream.description = description.clone();
        let name = stream.name.clone();

        Ok(vec![Emission {
            events: vec![EventPayload::Stream(StreamOp::Update {
                property: StreamProperty::Description,
                value: description,
                name,
            })],
            recipients: state.all_user_ids(),
        }])
    }

    /// Mark messages with a flag, emitting the collapsible bulk event.
    ///
    /// The domain keeps no per-message flag state; the event exists to
    /// exercise delivery and compaction.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown user.
    pub fn update_message_flags(
        &self,
        user_id: UserId,
        flag: &str,
        operation: FlagOp,
        messages: Vec<i64>,
    ) -> Result<Vec<Emission>, SourceError> {
        let state = self.lock();
        state.user(user_id)?;
        Ok(vec![Emission {
            events: vec![EventPayload::UpdateMessageFlags {
                flag: flag.to_string(),
                operation,
                all: false,
                messages,
            }],
            recipients: vec![user_id],
        }])
    }
}

impl StreamDirectory for MemoryDomain {
    fn has_stream(&self, name: &str) -> bool {
        self.lock().stream_key(name).is_some()
    }
}

#[async_trait]
impl StateSource for MemoryDomain {
    async fn fetch_snapshot(
        &self,
        user_id: UserId,
        event_types: Option<&HashSet<EventKind>>,
        narrow: &Narrow,
    ) -> Result<Snapshot, SourceError> {
        let state = self.lock();
        let user = state.user(user_id)?;
        if let Some(stream) = narrow.stream() {
            if state.stream_key(stream).is_none() {
                return Err(SourceError::UnknownStream(stream.to_string()));
            }
        }

        let mut snapshot = Snapshot::empty(user_id, user.email.clone());

        if wants(event_types, EventKind::Message) {
            snapshot.max_message_id = Some(
                user.received
                    .iter()
                    .filter(|message| narrow.matches(message))
                    .map(|message| message.id)
                    .max()
                    .unwrap_or(-1),
            );
        }
        if wants(event_types, EventKind::Pointer) {
            snapshot.pointer = Some(user.pointer);
        }
        if wants(event_types, EventKind::AlertWords) {
            snapshot.alert_words = Some(user.alert_words.clone());
        }
        if wants(event_types, EventKind::MutedTopics) {
            snapshot.muted_topics = Some(user.muted_topics.clone());
        }
        if wants(event_types, EventKind::Realm) {
            snapshot.realm_name = Some(state.realm_name.clone());
        }
        if wants(event_types, EventKind::RealmEmoji) {
            snapshot.realm_emoji = Some(state.realm_emoji.clone());
        }
        if wants(event_types, EventKind::RealmFilters) {
            snapshot.realm_filters = Some(state.realm_filters.clone());
        }
        if wants(event_types, EventKind::RealmUser) {
            snapshot.full_name = Some(user.full_name.clone());
            snapshot.is_admin = Some(user.is_admin);
            snapshot.realm_users = Some(state.users.values().map(person_row).collect());
        }
        if wants(event_types, EventKind::RealmBot) {
            snapshot.realm_bots = Some(state.bots.values().map(bot_row).collect());
        }
        if wants(event_types, EventKind::Subscription) {
            let mut subscriptions = Vec::new();
            let mut unsubscribed = Vec::new();
            let mut never_subscribed = Vec::new();
            for stream in state.streams.values() {
                if stream.subscribers.contains(&user_id) {
                    subscriptions.push(subscription_row(stream));
                } else if stream.former_subscribers.contains(&user_id) {
                    unsubscribed.push(subscription_row(stream));
                } else if !stream.invite_only {
                    never_subscribed.push(subscription_row(stream));
                }
            }
            snapshot.subscriptions = Some(subscriptions);
            snapshot.unsubscribed = Some(unsubscribed);
            snapshot.never_subscribed = Some(never_subscribed);
        }

        Ok(snapshot)
    }
}
