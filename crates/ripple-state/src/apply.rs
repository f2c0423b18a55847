//! Replay transforms: incorporate one event into a snapshot.
//!
//! Every event kind the dispatcher can emit has a transform here; the
//! match is exhaustive so adding a kind without deciding its replay
//! behavior fails to compile. Kinds that must never reach replay fail
//! loudly instead of being silently dropped.

use crate::snapshot::Snapshot;
use ripple_events::{
    Event, EventPayload, RealmBotOp, RealmOp, RealmProperty, RealmUserOp, StreamOp,
    StreamProperty, SubscriptionData, SubscriptionOp,
};
use thiserror::Error;

/// Replay errors. Both variants are programmer errors: the queue filter and
/// snapshot sections were assembled inconsistently, which would silently
/// break the replay-equals-fresh-fetch contract if tolerated.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// An event kind with no state meaning reached replay.
    #[error("No replay transform for event type: {0}")]
    UnhandledEventType(&'static str),

    /// An event arrived for a section the snapshot was not built with.
    #[error("Snapshot is missing the {0} section")]
    MissingSection(&'static str),
}

fn section<'a, T>(
    value: &'a mut Option<T>,
    name: &'static str,
) -> Result<&'a mut T, ReconcileError> {
    value.as_mut().ok_or(ReconcileError::MissingSection(name))
}

/// Apply a full, ordered event sequence to a snapshot.
///
/// # Errors
///
/// Fails on the first event with no applicable transform; the snapshot may
/// have absorbed earlier events of the sequence.
pub fn apply_events(snapshot: &mut Snapshot, events: &[Event]) -> Result<(), ReconcileError> {
    for event in events {
        apply_event(snapshot, &event.payload)?;
    }
    Ok(())
}

/// Apply a single event to a snapshot.
///
/// # Errors
///
/// Returns an error for generation markers (clients must re-snapshot, not
/// replay them) and for events whose snapshot section is absent.
pub fn apply_event(snapshot: &mut Snapshot, payload: &EventPayload) -> Result<(), ReconcileError> {
    match payload {
        EventPayload::Message { message, .. } => {
            let max = section(&mut snapshot.max_message_id, "max_message_id")?;
            *max = (*max).max(message.id);
        }

        EventPayload::Pointer { pointer } => {
            let current = section(&mut snapshot.pointer, "pointer")?;
            *current = (*current).max(*pointer);
        }

        // Snapshots carry no per-message flag state.
        EventPayload::UpdateMessageFlags { .. } => {}

        EventPayload::Restart { .. } => {
            return Err(ReconcileError::UnhandledEventType("restart"));
        }

        EventPayload::Realm(RealmOp::Update {
            property: RealmProperty::Name,
            value,
        }) => {
            *section(&mut snapshot.realm_name, "realm_name")? = value.clone();
        }

        EventPayload::RealmUser(op) => apply_realm_user(snapshot, op)?,
        EventPayload::RealmBot(op) => apply_realm_bot(snapshot, op)?,
        EventPayload::Subscription(op) => apply_subscription(snapshot, op)?,

        EventPayload::Stream(StreamOp::Update {
            property,
            value,
            name,
        }) => {
            for rows in [
                snapshot.subscriptions.as_mut(),
                snapshot.unsubscribed.as_mut(),
                snapshot.never_subscribed.as_mut(),
            ]
            .into_iter()
            .flatten()
            {
                if let Some(row) = rows.iter_mut().find(|row| row.name == *name) {
                    match property {
                        StreamProperty::Name => row.name = value.clone(),
                        StreamProperty::Description => row.description = value.clone(),
                        StreamProperty::EmailAddress => row.email_address = value.clone(),
                    }
                }
            }
        }

        EventPayload::RealmEmoji { realm_emoji } => {
            *section(&mut snapshot.realm_emoji, "realm_emoji")? = realm_emoji.clone();
        }

        EventPayload::RealmFilters { realm_filters } => {
            *section(&mut snapshot.realm_filters, "realm_filters")? = realm_filters.clone();
        }

        EventPayload::AlertWords { alert_words } => {
            *section(&mut snapshot.alert_words, "alert_words")? = alert_words.clone();
        }

        EventPayload::MutedTopics { muted_topics } => {
            *section(&mut snapshot.muted_topics, "muted_topics")? = muted_topics.clone();
        }
    }
    Ok(())
}

fn apply_realm_user(snapshot: &mut Snapshot, op: &RealmUserOp) -> Result<(), ReconcileError> {
    let users = section(&mut snapshot.realm_users, "realm_users")?;
    match op {
        RealmUserOp::Add { person } => users.push(person.clone()),
        RealmUserOp::Update { person } => {
            if let Some(row) = users.iter_mut().find(|row| row.email == person.email) {
                if let Some(full_name) = &person.full_name {
                    row.full_name = full_name.clone();
                }
                if let Some(is_admin) = person.is_admin {
                    row.is_admin = is_admin;
                }
            }
            // The principal's own profile sections track the same fields.
            if person.email == snapshot.email {
                if let (Some(own), Some(full_name)) =
                    (snapshot.full_name.as_mut(), person.full_name.as_ref())
                {
                    *own = full_name.clone();
                }
                if let (Some(own), Some(is_admin)) =
                    (snapshot.is_admin.as_mut(), person.is_admin)
                {
                    *own = is_admin;
                }
            }
        }
    }
    Ok(())
}

fn apply_realm_bot(snapshot: &mut Snapshot, op: &RealmBotOp) -> Result<(), ReconcileError> {
    let bots = section(&mut snapshot.realm_bots, "realm_bots")?;
    match op {
        RealmBotOp::Add { bot } => bots.push(bot.clone()),
        RealmBotOp::Update { bot } => {
            if let Some(row) = bots.iter_mut().find(|row| row.email == bot.email) {
                if let Some(full_name) = &bot.full_name {
                    row.full_name = full_name.clone();
                }
                if let Some(api_key) = &bot.api_key {
                    row.api_key = api_key.clone();
                }
            }
        }
        RealmBotOp::Remove { email } => bots.retain(|row| row.email != *email),
    }
    Ok(())
}

fn apply_subscription(snapshot: &mut Snapshot, op: &SubscriptionOp) -> Result<(), ReconcileError> {
    match op {
        SubscriptionOp::Add { subscriptions } => {
            for row in subscriptions {
                if let Some(unsubscribed) = snapshot.unsubscribed.as_mut() {
                    unsubscribed.retain(|old| old.name != row.name);
                }
                if let Some(never) = snapshot.never_subscribed.as_mut() {
                    never.retain(|old| old.name != row.name);
                }
                section(&mut snapshot.subscriptions, "subscriptions")?.push(row.clone());
            }
        }
        SubscriptionOp::Remove { subscriptions } => {
            let own_id = snapshot.user_id;
            for removed in subscriptions {
                let rows = section(&mut snapshot.subscriptions, "subscriptions")?;
                if let Some(index) = rows.iter().position(|row| row.name == removed.name) {
                    let mut row = rows.remove(index);
                    row.subscribers.retain(|id| *id != own_id);
                    if let Some(unsubscribed) = snapshot.unsubscribed.as_mut() {
                        unsubscribed.push(row);
                    }
                }
            }
        }
        SubscriptionOp::PeerAdd {
            user_id,
            subscriptions,
            ..
        } => {
            patch_peers(snapshot, subscriptions, |row| {
                if !row.subscribers.contains(user_id) {
                    row.subscribers.push(*user_id);
                }
            });
        }
        SubscriptionOp::PeerRemove {
            user_id,
            subscriptions,
            ..
        } => {
            let peer = *user_id;
            patch_peers(snapshot, subscriptions, move |row| {
                row.subscribers.retain(|id| *id != peer);
            });
        }
    }
    Ok(())
}

/// Patch the subscriber list of the named streams wherever the snapshot can
/// see them. Rows the snapshot does not hold are left alone.
fn patch_peers(snapshot: &mut Snapshot, names: &[String], mut patch: impl FnMut(&mut SubscriptionData)) {
    for rows in [
        snapshot.subscriptions.as_mut(),
        snapshot.unsubscribed.as_mut(),
        snapshot.never_subscribed.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        for name in names {
            if let Some(row) = rows.iter_mut().find(|row| row.name == *name) {
                patch(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_events::{BotData, BotPatch, PersonData, PersonPatch, UserId};

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::empty(1, "hamlet@example.com");
        snapshot.pointer = Some(10);
        snapshot.max_message_id = Some(100);
        snapshot.full_name = Some("Hamlet".into());
        snapshot.is_admin = Some(false);
        snapshot.realm_name = Some("Elsinore".into());
        snapshot.realm_users = Some(vec![PersonData {
            email: "hamlet@example.com".into(),
            full_name: "Hamlet".into(),
            is_admin: false,
            is_bot: false,
        }]);
        snapshot.realm_bots = Some(Vec::new());
        snapshot.subscriptions = Some(vec![subscription("denmark", vec![1, 2])]);
        snapshot.unsubscribed = Some(Vec::new());
        snapshot.never_subscribed = Some(vec![subscription("verona", vec![2])]);
        snapshot
    }

    fn subscription(name: &str, subscribers: Vec<UserId>) -> SubscriptionData {
        SubscriptionData {
            name: name.into(),
            stream_id: 1,
            description: String::new(),
            email_address: format!("{name}@streams.example.com"),
            color: "#c2c2c2".into(),
            invite_only: false,
            in_home_view: true,
            desktop_notifications: true,
            audible_notifications: true,
            subscribers,
        }
    }

    #[test]
    fn test_pointer_only_advances() {
        let mut state = snapshot();
        apply_event(&mut state, &EventPayload::Pointer { pointer: 50 }).unwrap();
        assert_eq!(state.pointer, Some(50));
        apply_event(&mut state, &EventPayload::Pointer { pointer: 20 }).unwrap();
        assert_eq!(state.pointer, Some(50));
    }

    #[test]
    fn test_restart_is_rejected_loudly() {
        let mut state = snapshot();
        let result = apply_event(
            &mut state,
            &EventPayload::Restart {
                server_generation: 2,
            },
        );
        assert!(matches!(
            result,
            Err(ReconcileError::UnhandledEventType("restart"))
        ));
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let mut state = Snapshot::empty(1, "hamlet@example.com");
        assert!(matches!(
            apply_event(&mut state, &EventPayload::Pointer { pointer: 1 }),
            Err(ReconcileError::MissingSection("pointer"))
        ));
    }

    #[test]
    fn test_own_profile_tracks_realm_user_update() {
        let mut state = snapshot();
        apply_event(
            &mut state,
            &EventPayload::RealmUser(RealmUserOp::Update {
                person: PersonPatch {
                    email: "hamlet@example.com".into(),
                    full_name: Some("Sir Hamlet".into()),
                    is_admin: None,
                },
            }),
        )
        .unwrap();

        assert_eq!(state.full_name.as_deref(), Some("Sir Hamlet"));
        let users = state.realm_users.unwrap();
        assert_eq!(users[0].full_name, "Sir Hamlet");
        // Untouched fields survive a partial patch.
        assert!(!users[0].is_admin);
    }

    #[test]
    fn test_subscription_remove_moves_row() {
        let mut state = snapshot();
        apply_event(
            &mut state,
            &EventPayload::Subscription(SubscriptionOp::Remove {
                subscriptions: vec![ripple_events::RemovedSubscription {
                    name: "denmark".into(),
                    stream_id: 1,
                }],
            }),
        )
        .unwrap();

        assert!(state.subscriptions.as_ref().unwrap().is_empty());
        let unsubscribed = state.unsubscribed.unwrap();
        assert_eq!(unsubscribed.len(), 1);
        // The departing principal drops out of the peer list.
        assert_eq!(unsubscribed[0].subscribers, vec![2]);
    }

    #[test]
    fn test_peer_add_patches_every_visible_section() {
        let mut state = snapshot();
        apply_event(
            &mut state,
            &EventPayload::Subscription(SubscriptionOp::PeerAdd {
                user_id: 3,
                user_email: "iago@example.com".into(),
                subscriptions: vec!["denmark".into(), "verona".into()],
            }),
        )
        .unwrap();

        assert_eq!(
            state.subscriptions.as_ref().unwrap()[0].subscribers,
            vec![1, 2, 3]
        );
        assert_eq!(
            state.never_subscribed.as_ref().unwrap()[0].subscribers,
            vec![2, 3]
        );
    }

    #[test]
    fn test_stream_rename_cascades_into_rows() {
        let mut state = snapshot();
        apply_events(
            &mut state,
            &[
                Event {
                    id: 0,
                    payload: EventPayload::Stream(StreamOp::Update {
                        property: StreamProperty::EmailAddress,
                        value: "hamlets-home@streams.example.com".into(),
                        name: "denmark".into(),
                    }),
                },
                Event {
                    id: 1,
                    payload: EventPayload::Stream(StreamOp::Update {
                        property: StreamProperty::Name,
                        value: "hamlets home".into(),
                        name: "denmark".into(),
                    }),
                },
            ],
        )
        .unwrap();

        let row = &state.subscriptions.as_ref().unwrap()[0];
        assert_eq!(row.name, "hamlets home");
        assert_eq!(row.email_address, "hamlets-home@streams.example.com");
    }

    #[test]
    fn test_bot_update_patches_by_identity() {
        let mut state = snapshot();
        state.realm_bots = Some(vec![BotData {
            email: "welcome-bot@example.com".into(),
            full_name: "Welcome Bot".into(),
            api_key: "old".into(),
            default_sending_stream: None,
            default_events_register_stream: None,
            default_all_public_streams: false,
            avatar_url: "https://avatars.example.com/welcome-bot".into(),
        }]);

        apply_event(
            &mut state,
            &EventPayload::RealmBot(RealmBotOp::Update {
                bot: BotPatch {
                    email: "welcome-bot@example.com".into(),
                    full_name: None,
                    api_key: Some("new".into()),
                },
            }),
        )
        .unwrap();

        let bots = state.realm_bots.unwrap();
        assert_eq!(bots[0].api_key, "new");
        assert_eq!(bots[0].full_name, "Welcome Bot");
    }

    #[test]
    fn test_flag_events_are_a_covered_no_op() {
        let mut state = snapshot();
        let before = state.clone();
        apply_event(
            &mut state,
            &EventPayload::UpdateMessageFlags {
                flag: "read".into(),
                operation: ripple_events::FlagOp::Add,
                all: false,
                messages: vec![1, 2],
            },
        )
        .unwrap();
        assert_eq!(state, before);
    }
}
