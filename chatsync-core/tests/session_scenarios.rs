//! End-to-end scenarios for the room session state machine.
//!
//! Effects are executed by hand here: each test plays the runtime, decides
//! when results come back, and checks what the session asks for next.

use chatsync_core::{
    AckBatch, Completion, Effect, Message, MessageId, RoomRef, RoomSession, StreamEvent, SyncError,
    UserInfo, ViewerUpdate,
};
use chrono::NaiveDate;

const ME: i64 = 1;
const OTHER: i64 = 2;

fn msg(id: i64, author: i64) -> Message {
    Message {
        id: MessageId(id),
        author: UserInfo::new(author, format!("user{author}")),
        room: RoomRef::new(10, "general"),
        body: format!("message {id}"),
        created_at: NaiveDate::from_ymd_opt(2024, 10, 1)
            .unwrap()
            .and_hms_opt(9, 0, id as u32)
            .unwrap(),
    }
}

fn started() -> RoomSession {
    let mut session = RoomSession::new(RoomRef::new(10, "general"), UserInfo::new(ME, "me"));
    session.start();
    session
}

fn acks(effects: &[Effect]) -> Vec<AckBatch> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Acknowledge(batch) => Some(batch.clone()),
            _ => None,
        })
        .collect()
}

fn ids(batch: &AckBatch) -> Vec<i64> {
    batch.ids().iter().map(|id| id.0).collect()
}

// ─── Acknowledgement flow ────────────────────────────────────────

#[test]
fn test_snapshot_unseen_then_live_arrival() {
    let mut session = started();
    let sid = session.id();

    let effects = session.complete(
        sid,
        Completion::Snapshot(Ok(vec![msg(1, OTHER), msg(2, OTHER), msg(3, OTHER)])),
    );
    assert_eq!(effects.first(), Some(&Effect::FetchUnseen));
    assert!(acks(&effects).is_empty());
    session.complete(sid, Completion::ChannelOpened(Ok(())));

    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(2), MessageId(3)])));
    let first = acks(&effects);
    assert_eq!(first.len(), 1);
    assert_eq!(ids(&first[0]), vec![2, 3]);

    // Message 4 arrives while the first acknowledgement is still in flight.
    let effects = session.on_stream_event(StreamEvent::Message(msg(4, OTHER)));
    let second = acks(&effects);
    assert_eq!(second.len(), 1);
    assert_eq!(ids(&second[0]), vec![4]);
    assert_eq!(session.store().len(), 4);

    for batch in first.into_iter().chain(second) {
        session.complete(sid, Completion::Acknowledged { batch, result: Ok(()) });
    }
    assert_eq!(session.seen().unseen_len(), 0);
}

#[test]
fn test_unseen_before_snapshot_acknowledged_once() {
    let mut session = started();
    let sid = session.id();

    // Activity fires before the snapshot has come back.
    assert_eq!(session.notify_activity(), vec![Effect::FetchUnseen]);
    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(7)])));
    assert!(acks(&effects).is_empty(), "message 7 is not stored yet");

    let effects = session.complete(sid, Completion::Snapshot(Ok(vec![msg(6, OTHER), msg(7, OTHER)])));
    let batches = acks(&effects);
    assert_eq!(batches.len(), 1);
    assert_eq!(ids(&batches[0]), vec![7]);

    // The post-snapshot unseen query reports 7 again while it is in flight.
    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(7)])));
    assert!(acks(&effects).is_empty());

    let batch = batches[0].clone();
    session.complete(sid, Completion::Acknowledged { batch, result: Ok(()) });
    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(7)])));
    assert!(acks(&effects).is_empty());
    assert!(session.seen().is_acknowledged(MessageId(7)));
}

#[test]
fn test_failed_ack_retried_on_stream_activity() {
    let mut session = started();
    let sid = session.id();
    session.complete(sid, Completion::Snapshot(Ok(vec![msg(1, OTHER), msg(2, OTHER)])));

    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(1), MessageId(2)])));
    let batch = acks(&effects).remove(0);
    session.complete(
        sid,
        Completion::Acknowledged {
            batch,
            result: Err(SyncError::Timeout),
        },
    );
    assert!(session.seen().is_unseen(MessageId(1)));

    // A new arrival triggers its own single-id ack plus the retry.
    let effects = session.on_stream_event(StreamEvent::Message(msg(3, OTHER)));
    let batches = acks(&effects);
    assert_eq!(batches.len(), 2);
    assert_eq!(ids(&batches[0]), vec![3]);
    assert_eq!(ids(&batches[1]), vec![1, 2]);
}

#[test]
fn test_failed_ack_retried_on_activity() {
    let mut session = started();
    let sid = session.id();
    session.complete(sid, Completion::Snapshot(Ok(vec![msg(1, OTHER)])));
    let batch = acks(&session.complete(sid, Completion::Unseen(Ok(vec![MessageId(1)])))).remove(0);
    session.complete(
        sid,
        Completion::Acknowledged {
            batch,
            result: Err(SyncError::Network("reset".into())),
        },
    );

    let effects = session.notify_activity();
    assert_eq!(effects[0], Effect::FetchUnseen);
    assert_eq!(ids(&acks(&effects)[0]), vec![1]);

    // Debounced: later signals only retry, they do not refetch.
    assert!(!session.notify_activity().contains(&Effect::FetchUnseen));
}

#[test]
fn test_rejected_ack_not_retried() {
    let mut session = started();
    let sid = session.id();
    session.complete(sid, Completion::Snapshot(Ok(vec![msg(1, OTHER)])));
    let batch = acks(&session.complete(sid, Completion::Unseen(Ok(vec![MessageId(1)])))).remove(0);
    session.complete(
        sid,
        Completion::Acknowledged {
            batch,
            result: Err(SyncError::Unauthorized { status: 401 }),
        },
    );
    assert_eq!(session.error(), Some(&SyncError::Unauthorized { status: 401 }));
    assert!(session.seen().is_unseen(MessageId(1)));

    for id in 2..5 {
        let effects = session.on_stream_event(StreamEvent::Message(msg(id, ME)));
        assert!(acks(&effects).is_empty(), "ack re-issued after message {id}");
    }
    let effects = session.notify_activity();
    assert!(acks(&effects).is_empty());
    assert!(acks(&session.notify_activity()).is_empty());

    // The next unseen report does not revive it either.
    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(1)])));
    assert!(acks(&effects).is_empty());
    assert_eq!(session.view().error, Some(SyncError::Unauthorized { status: 401 }));
}

#[test]
fn test_reported_id_arriving_live_gets_own_batch() {
    let mut session = started();
    let sid = session.id();
    session.complete(sid, Completion::Snapshot(Ok(vec![msg(1, OTHER)])));

    // Message 5 is reported before it arrives, and the ack for 1 fails.
    let effects = session.complete(sid, Completion::Unseen(Ok(vec![MessageId(1), MessageId(5)])));
    let batch = acks(&effects).remove(0);
    assert_eq!(ids(&batch), vec![1]);
    session.complete(sid, Completion::Acknowledged { batch, result: Err(SyncError::Timeout) });

    let effects = session.on_stream_event(StreamEvent::Message(msg(5, OTHER)));
    let batches = acks(&effects);
    assert_eq!(batches.len(), 2);
    assert_eq!(ids(&batches[0]), vec![5]);
    assert_eq!(ids(&batches[1]), vec![1]);
}

#[test]
fn test_duplicate_stream_message_no_second_ack() {
    let mut session = started();
    let sid = session.id();
    session.complete(sid, Completion::Snapshot(Ok(Vec::new())));

    let first = session.on_stream_event(StreamEvent::Message(msg(4, OTHER)));
    assert_eq!(acks(&first).len(), 1);
    let again = session.on_stream_event(StreamEvent::Message(msg(4, OTHER)));
    assert!(acks(&again).is_empty());
    assert_eq!(session.store().len(), 1);
}

// ─── Viewer presence ─────────────────────────────────────────────

#[test]
fn test_viewer_update_before_message_attaches_later() {
    let mut session = started();
    let sid = session.id();
    session.complete(sid, Completion::Snapshot(Ok(Vec::new())));
    session.complete(sid, Completion::ChannelOpened(Ok(())));

    session.on_stream_event(StreamEvent::Viewers(ViewerUpdate {
        message_id: MessageId(5),
        viewers: vec![UserInfo::new(OTHER, "user2")],
    }));
    assert_eq!(session.presence().count(MessageId(5)), 1);
    assert!(session.view().message(MessageId(5)).is_none());

    session.on_stream_event(StreamEvent::Message(msg(5, ME)));
    let view = session.view();
    let message = view.message(MessageId(5)).unwrap();
    assert_eq!(message.receipt, Some(chatsync_core::Receipt::Read { viewers: 1 }));
}

#[test]
fn test_snapshot_seeds_each_message_once() {
    let mut session = started();
    let sid = session.id();

    let effects = session.complete(sid, Completion::Snapshot(Ok(vec![msg(1, ME), msg(2, OTHER)])));
    let seeds: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, Effect::FetchViewers(_)))
        .collect();
    assert_eq!(seeds, vec![&Effect::FetchViewers(MessageId(1)), &Effect::FetchViewers(MessageId(2))]);

    // A slow seed cannot shrink what a push already set.
    session.on_stream_event(StreamEvent::Viewers(ViewerUpdate {
        message_id: MessageId(1),
        viewers: vec![UserInfo::new(2, "user2"), UserInfo::new(3, "user3")],
    }));
    session.complete(
        sid,
        Completion::Viewers {
            message_id: MessageId(1),
            result: Ok(vec![UserInfo::new(2, "user2")]),
        },
    );
    assert_eq!(session.presence().count(MessageId(1)), 2);
}

// ─── Session boundaries ──────────────────────────────────────────

#[test]
fn test_previous_session_result_ignored_by_next() {
    let mut room_a = started();
    let a = room_a.id();
    room_a.complete(a, Completion::Snapshot(Ok(vec![msg(7, ME)])));
    room_a.close();
    room_a.finish();

    let mut room_b = RoomSession::new(RoomRef::new(11, "random"), UserInfo::new(ME, "me"));
    room_b.start();
    let b = room_b.id();
    room_b.complete(b, Completion::Snapshot(Ok(vec![msg(7, ME)])));

    // Room A's viewer fetch for message 7 lands after the switch.
    let stale = Completion::Viewers {
        message_id: MessageId(7),
        result: Ok(vec![UserInfo::new(OTHER, "user2")]),
    };
    assert!(room_b.complete(a, stale.clone()).is_empty());
    assert!(room_a.complete(a, stale).is_empty());
    assert_eq!(room_b.presence().count(MessageId(7)), 0);
}
