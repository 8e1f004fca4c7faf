//! Contract tests run against both store implementations, so the in-memory
//! fallback stays behaviorally aligned with the durable one.

use chrono::{DateTime, TimeZone, Utc};

use crewline_db::{
    DurableStore, MemoryStore, NewCase, NewChannel, NewMessage, Store, StoreError,
};
use crewline_types::api::SearchFilter;
use crewline_types::models::{
    CaseSeverity, CaseStatus, ChannelType, ComplianceKind, ComplianceStatus, MemberRole, Message,
    MessageType,
};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_756_000_000 + secs, 0).unwrap()
}

fn with_each_store(test: impl Fn(&dyn Store)) {
    let durable = DurableStore::open_in_memory().unwrap();
    test(&durable);
    let memory = MemoryStore::new();
    test(&memory);
}

/// Channel "general" with owner 21 and member 22.
fn seed_channel(store: &dyn Store) -> i64 {
    let channel = store
        .create_channel(&NewChannel {
            name: "general".into(),
            description: Some("company-wide".into()),
            channel_type: ChannelType::General,
            is_private: false,
            max_members: None,
            created_by: 21,
            created_at: ts(0),
        })
        .unwrap();
    store
        .add_member(channel.id, 21, MemberRole::Owner, ts(0))
        .unwrap();
    store
        .add_member(channel.id, 22, MemberRole::Member, ts(0))
        .unwrap();
    channel.id
}

fn send(
    store: &dyn Store,
    channel_id: i64,
    sender_id: i64,
    content: &str,
    at: DateTime<Utc>,
) -> Message {
    let message = store
        .insert_message(&NewMessage {
            channel_id,
            sender_id,
            content: content.into(),
            message_type: MessageType::Text,
            reply_to_id: None,
            thread_root_id: None,
            created_at: at,
        })
        .unwrap();
    store.touch_channel(channel_id, at).unwrap();
    message
}

#[test]
fn last_activity_never_moves_backwards() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);

        send(store, channel_id, 21, "first", ts(100));
        send(store, channel_id, 22, "second", ts(200));
        assert_eq!(store.channel(channel_id).unwrap().last_activity_at, ts(200));

        // A late-arriving older bump must not rewind the clock.
        store.touch_channel(channel_id, ts(150)).unwrap();
        assert_eq!(store.channel(channel_id).unwrap().last_activity_at, ts(200));
    });
}

#[test]
fn duplicate_read_receipt_is_a_noop() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let message = send(store, channel_id, 22, "hello", ts(10));

        assert!(store.insert_read_receipt(message.id, 21, ts(11)).unwrap());
        assert!(!store.insert_read_receipt(message.id, 21, ts(12)).unwrap());
    });
}

#[test]
fn duplicate_reaction_triple_is_a_noop() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let message = send(store, channel_id, 22, "hello", ts(10));

        assert!(store.add_reaction(message.id, 21, "thumbsup", ts(11)).unwrap());
        assert!(!store.add_reaction(message.id, 21, "thumbsup", ts(12)).unwrap());
        // A different kind from the same user is a new reaction.
        assert!(store.add_reaction(message.id, 21, "heart", ts(13)).unwrap());
    });
}

#[test]
fn soft_delete_is_idempotent_and_keeps_the_row() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let message = send(store, channel_id, 22, "oops", ts(10));

        store.soft_delete_message(message.id, ts(20)).unwrap();
        let deleted = store.message(message.id).unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.updated_at, ts(20));

        store.soft_delete_message(message.id, ts(30)).unwrap();
        let again = store.message(message.id).unwrap();
        assert!(again.is_deleted);
        assert_eq!(again.updated_at, ts(20), "second delete must not touch the row");
    });
}

#[test]
fn last_owner_cannot_leave_while_members_remain() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);

        let err = store.remove_member(channel_id, 21).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Once 22 is gone, the owner can leave too.
        store.remove_member(channel_id, 22).unwrap();
        store.remove_member(channel_id, 21).unwrap();

        // Rows survive as inactive history and can be reactivated.
        assert!(!store.is_active_member(channel_id, 22).unwrap());
        store
            .add_member(channel_id, 22, MemberRole::Member, ts(50))
            .unwrap();
        assert!(store.is_active_member(channel_id, 22).unwrap());
    });
}

#[test]
fn max_member_count_is_enforced() {
    with_each_store(|store| {
        let channel = store
            .create_channel(&NewChannel {
                name: "duo".into(),
                description: None,
                channel_type: ChannelType::Project,
                is_private: true,
                max_members: Some(2),
                created_by: 21,
                created_at: ts(0),
            })
            .unwrap();
        store.add_member(channel.id, 21, MemberRole::Owner, ts(0)).unwrap();
        store.add_member(channel.id, 22, MemberRole::Member, ts(0)).unwrap();

        let err = store
            .add_member(channel.id, 23, MemberRole::Member, ts(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    });
}

#[test]
fn flagging_creates_one_pending_case_and_marks_the_message() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let message = send(store, channel_id, 22, "inappropriate", ts(10));

        let case = store
            .create_case(&NewCase {
                message_id: message.id,
                flagged_by: 21,
                reason: "harassment".into(),
                severity: CaseSeverity::High,
                created_at: ts(11),
            })
            .unwrap();
        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.severity, CaseSeverity::High);

        let flagged = store.message(message.id).unwrap();
        assert!(flagged.is_flagged);
        assert_eq!(flagged.flag_reason.as_deref(), Some("harassment"));
        assert_eq!(flagged.flagged_by, Some(21));

        let queue = store.pending_cases().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, case.id);
    });
}

#[test]
fn case_review_follows_the_state_machine() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let message = send(store, channel_id, 22, "spam", ts(10));
        let case = store
            .create_case(&NewCase {
                message_id: message.id,
                flagged_by: 21,
                reason: "spam".into(),
                severity: CaseSeverity::Low,
                created_at: ts(11),
            })
            .unwrap();

        // Skipping the reviewed step is rejected.
        let err = store
            .transition_case(case.id, CaseStatus::Resolved, 99, None, ts(12))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let reviewed = store
            .transition_case(case.id, CaseStatus::Reviewed, 99, Some("looking"), ts(13))
            .unwrap();
        assert_eq!(reviewed.status, CaseStatus::Reviewed);
        assert_eq!(reviewed.reviewed_by, Some(99));

        // Reviewed cases leave the default queue.
        assert!(store.pending_cases().unwrap().is_empty());

        let resolved = store
            .transition_case(case.id, CaseStatus::Resolved, 99, Some("removed"), ts(14))
            .unwrap();
        assert_eq!(resolved.status, CaseStatus::Resolved);
        assert_eq!(resolved.action_notes.as_deref(), Some("removed"));
    });
}

#[test]
fn search_is_scoped_to_active_memberships() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let private = store
            .create_channel(&NewChannel {
                name: "private-hr".into(),
                description: None,
                channel_type: ChannelType::Private,
                is_private: true,
                max_members: None,
                created_by: 99,
                created_at: ts(0),
            })
            .unwrap();
        store.add_member(private.id, 99, MemberRole::Owner, ts(0)).unwrap();

        send(store, channel_id, 22, "the deadline is friday", ts(10));
        send(store, channel_id, 21, "noted", ts(20));
        send(store, private.id, 99, "deadline moved", ts(30));

        let filter = SearchFilter {
            query: Some("deadline".into()),
            limit: 20,
            ..Default::default()
        };
        let hits = store.search_messages(22, &filter).unwrap();
        assert_eq!(hits.len(), 1, "user 22 must not see the private channel");
        assert_eq!(hits[0].channel_id, channel_id);
    });
}

#[test]
fn search_pages_newest_first() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        for i in 0..25i64 {
            send(store, channel_id, 22, &format!("deadline update {i}"), ts(i * 10));
        }

        let filter = SearchFilter {
            query: Some("deadline".into()),
            channel_id: Some(channel_id),
            limit: 20,
            ..Default::default()
        };
        let page = store.search_messages(21, &filter).unwrap();
        assert_eq!(page.len(), 20);
        assert_eq!(page[0].content, "deadline update 24");
        assert!(page[0].created_at > page[19].created_at);

        let rest = store
            .search_messages(
                21,
                &SearchFilter {
                    offset: 20,
                    ..filter
                },
            )
            .unwrap();
        assert_eq!(rest.len(), 5);
    });
}

#[test]
fn deleted_messages_are_excluded_from_search() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let message = send(store, channel_id, 22, "deadline slipped", ts(10));
        store.soft_delete_message(message.id, ts(20)).unwrap();

        let hits = store
            .search_messages(
                21,
                &SearchFilter {
                    query: Some("deadline".into()),
                    limit: 20,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(hits.is_empty());
    });
}

#[test]
fn message_paging_honors_the_before_cursor() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        for i in 0..10i64 {
            send(store, channel_id, 22, &format!("m{i}"), ts(i * 10));
        }

        let latest = store.messages_page(channel_id, 3, 0, None).unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].content, "m9");

        let older = store
            .messages_page(channel_id, 50, 0, Some(ts(50)))
            .unwrap();
        assert_eq!(older.len(), 5, "cursor is exclusive");
        assert_eq!(older[0].content, "m4");
    });
}

#[test]
fn analytics_ties_break_toward_the_lowest_hour() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);
        let base = Utc.with_ymd_and_hms(2026, 8, 27, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 0, 0, 0).unwrap();

        // Two messages at 14:00, two at 09:00: tie resolves to hour 9.
        for (hour, minute, sender) in [(14, 0, 21), (14, 5, 22), (9, 0, 21), (9, 30, 21)] {
            let at = base + chrono::Duration::minutes((hour * 60 + minute) as i64);
            let message = send(store, channel_id, sender, "standup", at);
            if hour == 9 && minute == 0 {
                store
                    .create_case(&NewCase {
                        message_id: message.id,
                        flagged_by: 22,
                        reason: "test".into(),
                        severity: CaseSeverity::Low,
                        created_at: at,
                    })
                    .unwrap();
            }
        }

        let analytics = store.channel_analytics(channel_id, 7, now).unwrap();
        assert_eq!(analytics.total_messages, 4);
        assert_eq!(analytics.distinct_senders, 2);
        assert_eq!(analytics.flagged_count, 1);
        assert_eq!(analytics.peak_hour, Some(9));
        // 4 messages over 7 days, rounded to 2 decimals.
        assert_eq!(analytics.messages_per_day, 0.57);
    });
}

#[test]
fn compliance_requests_follow_their_lifecycle() {
    with_each_store(|store| {
        let request = store
            .submit_compliance(
                22,
                ComplianceKind::Export,
                serde_json::json!({"scope": "all"}),
                ts(0),
            )
            .unwrap();
        assert_eq!(request.status, ComplianceStatus::Pending);
        assert!(request.completed_at.is_none());

        let err = store
            .transition_compliance(request.id, ComplianceStatus::Completed, None, ts(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store
            .transition_compliance(request.id, ComplianceStatus::Processing, None, ts(2))
            .unwrap();
        let done = store
            .transition_compliance(
                request.id,
                ComplianceStatus::Completed,
                Some(serde_json::json!({"url": "https://exports.example/22.zip"})),
                ts(3),
            )
            .unwrap();
        assert_eq!(done.status, ComplianceStatus::Completed);
        assert_eq!(done.completed_at, Some(ts(3)));
    });
}

#[test]
fn channel_flags_toggle_independently() {
    with_each_store(|store| {
        let channel_id = seed_channel(store);

        let channel = store
            .set_channel_flags(channel_id, None, Some(true), ts(10))
            .unwrap();
        assert!(!channel.is_archived);
        assert!(channel.is_read_only);

        // Omitted flag stays as it was.
        let channel = store
            .set_channel_flags(channel_id, Some(true), None, ts(20))
            .unwrap();
        assert!(channel.is_archived);
        assert!(channel.is_read_only);

        let missing = store.set_channel_flags(999, Some(true), None, ts(30));
        assert!(matches!(missing, Err(StoreError::NotFound("channel"))));
    });
}

#[test]
fn health_reflects_durability() {
    let durable = DurableStore::open_in_memory().unwrap();
    let health = durable.health();
    assert!(health.durable);
    assert!(health.tables_exist);
    assert!(health.is_healthy());

    let memory = MemoryStore::new();
    assert!(!memory.health().durable);
    assert!(!memory.health().is_healthy());
}
