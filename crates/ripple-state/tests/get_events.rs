//! End-to-end long-poll flow over the in-memory domain: registration,
//! cursor-driven re-polling, sender echo, and narrow delivery.

use ripple_core::{poll, ClientSpec, Dispatcher, PollParams, Registry, SenderEcho};
use ripple_events::{EventKind, EventPayload, Narrow, UserId};
use ripple_state::{MemoryDomain, MessageAddress};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn spec(user_id: UserId, event_types: Option<HashSet<EventKind>>, narrow: Narrow) -> ClientSpec {
    ClientSpec {
        user_id,
        realm_id: 1,
        event_types,
        narrow,
        client_info: "website".into(),
        apply_markdown: true,
        all_public_streams: false,
        lifetime: Duration::from_secs(600),
    }
}

fn params(queue_id: &str, user_id: UserId, last_event_id: i64) -> PollParams {
    PollParams {
        queue_id: queue_id.to_string(),
        user_id,
        last_event_id,
        dont_block: true,
        timeout: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn test_get_events() {
    let domain = Arc::new(MemoryDomain::new("Elsinore"));
    let hamlet = domain.add_user("hamlet@example.com", "Hamlet");
    let othello = domain.add_user("othello@example.com", "Othello");

    let registry = Arc::new(Registry::new().with_directory(domain.clone()));
    let dispatcher = Dispatcher::new(registry.clone());

    let messages: HashSet<EventKind> = [EventKind::Message].into_iter().collect();
    let sender_queue = registry
        .allocate(spec(hamlet, Some(messages.clone()), Narrow::all()))
        .unwrap();
    let recipient_queue = registry
        .allocate(spec(othello, Some(messages), Narrow::all()))
        .unwrap();

    let events = poll(&registry, params(sender_queue.queue_id(), hamlet, -1))
        .await
        .unwrap();
    assert!(events.is_empty());

    // First message, echoed to the sender's own queue.
    let outgoing = domain
        .send_message(
            hamlet,
            MessageAddress::Private {
                recipients: vec![othello],
            },
            "hello",
        )
        .unwrap();
    let echo = SenderEcho {
        queue_id: sender_queue.queue_id().to_string(),
        local_id: "10.01".into(),
    };
    dispatcher.emit_message(outgoing.message, &outgoing.recipients, Some(&echo));

    let events = poll(&registry, params(sender_queue.queue_id(), hamlet, -1))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    let last_event_id = events[0].id;
    match &events[0].payload {
        EventPayload::Message {
            message,
            local_message_id,
        } => {
            assert_eq!(message.sender_email, "hamlet@example.com");
            assert_eq!(local_message_id.as_deref(), Some("10.01"));
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    // Second message; polling with the seen cursor yields only the new one.
    let outgoing = domain
        .send_message(
            hamlet,
            MessageAddress::Private {
                recipients: vec![othello],
            },
            "hello again",
        )
        .unwrap();
    let echo = SenderEcho {
        queue_id: sender_queue.queue_id().to_string(),
        local_id: "10.02".into(),
    };
    dispatcher.emit_message(outgoing.message, &outgoing.recipients, Some(&echo));

    let events = poll(
        &registry,
        params(sender_queue.queue_id(), hamlet, last_event_id),
    )
    .await
    .unwrap();
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        EventPayload::Message {
            local_message_id, ..
        } => assert_eq!(local_message_id.as_deref(), Some("10.02")),
        other => panic!("unexpected payload: {other:?}"),
    }

    // The recipient sees both messages, neither carrying the echo field.
    let events = poll(&registry, params(recipient_queue.queue_id(), othello, -1))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        match &event.payload {
            EventPayload::Message {
                message,
                local_message_id,
            } => {
                assert_eq!(message.sender_email, "hamlet@example.com");
                assert!(local_message_id.is_none());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_get_events_narrow() {
    let domain = Arc::new(MemoryDomain::new("Elsinore"));
    let hamlet = domain.add_user("hamlet@example.com", "Hamlet");
    let othello = domain.add_user("othello@example.com", "Othello");
    domain.add_stream("denmark", "castle talk");
    domain.subscribe(hamlet, "denmark").unwrap();

    let registry = Arc::new(Registry::new().with_directory(domain.clone()));
    let dispatcher = Dispatcher::new(registry.clone());

    let messages: HashSet<EventKind> = [EventKind::Message].into_iter().collect();
    let queue = registry
        .allocate(spec(
            hamlet,
            Some(messages),
            Narrow::stream_only("denmark"),
        ))
        .unwrap();

    let events = poll(&registry, params(queue.queue_id(), hamlet, -1))
        .await
        .unwrap();
    assert!(events.is_empty());

    let private = domain
        .send_message(
            hamlet,
            MessageAddress::Private {
                recipients: vec![othello],
            },
            "hello",
        )
        .unwrap();
    dispatcher.emit_message(private.message, &private.recipients, None);

    let stream = domain
        .send_message(
            hamlet,
            MessageAddress::Stream {
                stream: "denmark".into(),
                topic: "siege".into(),
            },
            "hello",
        )
        .unwrap();
    dispatcher.emit_message(stream.message, &stream.recipients, None);

    // Only the narrowed stream's message is delivered.
    let events = poll(&registry, params(queue.queue_id(), hamlet, -1))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        EventPayload::Message { message, .. } => {
            assert_eq!(message.display_recipient, "denmark");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_registration_rejects_unknown_narrow_stream() {
    let domain = Arc::new(MemoryDomain::new("Elsinore"));
    let hamlet = domain.add_user("hamlet@example.com", "Hamlet");
    let registry = Arc::new(Registry::new().with_directory(domain));

    assert!(registry
        .allocate(spec(hamlet, None, Narrow::stream_only("atlantis")))
        .is_err());
}
