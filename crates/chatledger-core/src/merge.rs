//! Conflict resolution for locally- and remotely-modified records.
//!
//! Pure, stateless, field-level merges. Both functions are idempotent:
//! `resolve(x, x) == x` for any record `x`.

use crate::conversation::ConversationThread;
use crate::message::ThreadMessage;

/// Merge a local thread with a remote snapshot of the same thread.
///
/// The server is authoritative for every field except the local-only
/// preferences: `is_pinned` and `is_muted` always come from the local copy,
/// and `custom_title` does when locally set. `unread_count` takes the larger
/// of the two values so a race never silently clears an unread badge, at the
/// cost of occasionally over-reporting.
#[must_use]
pub fn resolve_conversation(
    local: &ConversationThread,
    server: &ConversationThread,
) -> ConversationThread {
    let mut merged = server.clone();
    merged.is_pinned = local.is_pinned;
    merged.is_muted = local.is_muted;
    if local.custom_title.is_some() {
        merged.custom_title.clone_from(&local.custom_title);
    }
    merged.unread_count = local.unread_count.max(server.unread_count);
    merged
}

/// Merge a local message with a remote snapshot of the same message.
///
/// The server is authoritative for content and timestamps (messages are
/// immutable once sent), but `read_by` is the union of both maps, keeping
/// the earliest receipt per user, so a read recorded locally while offline
/// survives a server snapshot taken before it was uploaded.
#[must_use]
pub fn resolve_message(local: &ThreadMessage, server: &ThreadMessage) -> ThreadMessage {
    let mut merged = server.clone();
    for (user_id, read_at) in &local.read_by {
        merged.mark_read_by(user_id, *read_at);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, minute, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_local_preferences_survive_server_snapshot() {
        let mut local = ConversationThread::new("t1", vec!["alice".into()], at(0));
        local.is_pinned = true;
        local.is_muted = true;
        local.custom_title = Some("Project X".into());

        let mut server = ConversationThread::new("t1", vec!["alice".into(), "bob".into()], at(0));
        server.last_activity_at = at(30);
        server.is_archived = true;

        let merged = resolve_conversation(&local, &server);
        assert!(merged.is_pinned);
        assert!(merged.is_muted);
        assert_eq!(merged.custom_title.as_deref(), Some("Project X"));
        // Everything else is the server's.
        assert!(merged.is_archived);
        assert_eq!(merged.last_activity_at, at(30));
        assert_eq!(merged.participant_ids.len(), 2);
    }

    #[test]
    fn test_unset_local_title_takes_server_title() {
        let local = ConversationThread::new("t1", vec!["alice".into()], at(0));
        let mut server = local.clone();
        server.custom_title = Some("From server".into());

        let merged = resolve_conversation(&local, &server);
        assert_eq!(merged.custom_title.as_deref(), Some("From server"));
    }

    #[test]
    fn test_unread_count_is_monotonic() {
        let mut local = ConversationThread::new("t1", vec!["alice".into()], at(0));
        local.unread_count = 5;
        let mut server = local.clone();
        server.unread_count = 2;

        assert_eq!(resolve_conversation(&local, &server).unread_count, 5);
        assert_eq!(resolve_conversation(&server, &local).unread_count, 5);
    }

    #[test]
    fn test_read_by_union_keeps_offline_receipt() {
        let mut local = ThreadMessage::new("m1", "t1", "alice", "hi", at(0));
        local.mark_read_by("bob", at(10));

        // Snapshot fetched before bob's receipt reached the server.
        let mut server = ThreadMessage::new("m1", "t1", "alice", "hi", at(0));
        server.mark_read_by("carol", at(5));

        let merged = resolve_message(&local, &server);
        assert_eq!(merged.read_by["bob"], at(10));
        assert_eq!(merged.read_by["carol"], at(5));
    }

    #[test]
    fn test_read_by_conflict_keeps_earliest_receipt() {
        let mut local = ThreadMessage::new("m1", "t1", "alice", "hi", at(0));
        local.mark_read_by("bob", at(3));
        let mut server = local.clone();
        server.read_by.insert("bob".into(), at(8));

        let merged = resolve_message(&local, &server);
        assert_eq!(merged.read_by["bob"], at(3));
    }

    #[test]
    fn test_server_owns_message_content() {
        let mut local = ThreadMessage::new("m1", "t1", "alice", "local draft", at(0));
        local.reply_count = 1;
        let mut server = ThreadMessage::new("m1", "t1", "alice", "canonical body", at(0));
        server.reply_count = 4;

        let merged = resolve_message(&local, &server);
        assert_eq!(merged.body, "canonical body");
        assert_eq!(merged.reply_count, 4);
    }

    prop_compose! {
        fn arb_timestamp()(minutes in 0i64..100_000) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_default()
                + Duration::minutes(minutes)
        }
    }

    prop_compose! {
        fn arb_thread()(
            id in "[a-z0-9]{1,12}",
            participants in proptest::collection::vec("[a-z]{1,8}", 0..4),
            unread in 0u32..50,
            pinned in any::<bool>(),
            muted in any::<bool>(),
            archived in any::<bool>(),
            title in proptest::option::of("[A-Za-z ]{1,16}"),
            created in arb_timestamp(),
            active in arb_timestamp(),
        ) -> ConversationThread {
            ConversationThread {
                id,
                participant_ids: participants,
                last_activity_at: active,
                unread_count: unread,
                is_pinned: pinned,
                is_muted: muted,
                is_archived: archived,
                custom_title: title,
                created_at: created,
            }
        }
    }

    prop_compose! {
        fn arb_message()(
            id in "[a-z0-9]{1,12}",
            thread_id in "[a-z0-9]{1,12}",
            sender in "[a-z]{1,8}",
            body in ".{0,32}",
            parent in proptest::option::of("[a-z0-9]{1,12}"),
            replies in 0u32..20,
            readers in proptest::collection::btree_map("[a-z]{1,8}", arb_timestamp(), 0..4),
            created in arb_timestamp(),
        ) -> ThreadMessage {
            ThreadMessage {
                id,
                thread_id,
                sender_id: sender,
                kind: crate::message::MessageKind::Text,
                body,
                attachment_url: None,
                parent_message_id: parent,
                reply_count: replies,
                read_by: readers,
                created_at: created,
            }
        }
    }

    proptest! {
        #[test]
        fn prop_resolve_conversation_is_idempotent(thread in arb_thread()) {
            prop_assert_eq!(resolve_conversation(&thread, &thread), thread);
        }

        #[test]
        fn prop_resolve_message_is_idempotent(message in arb_message()) {
            prop_assert_eq!(resolve_message(&message, &message), message);
        }

        #[test]
        fn prop_merged_read_by_contains_both_sides(
            local in arb_message(),
            server in arb_message(),
        ) {
            let merged = resolve_message(&local, &server);
            for user in local.read_by.keys().chain(server.read_by.keys()) {
                prop_assert!(merged.read_by.contains_key(user));
            }
        }
    }
}
