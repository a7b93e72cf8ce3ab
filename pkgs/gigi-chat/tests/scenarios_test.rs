//! End-to-end walkthroughs of a direct conversation between two users

mod common;

use common::Harness;
use gigi_chat::{ChatError, DeleteMode, MessageStatus, NewMessage, DELETED_PREVIEW};

#[tokio::test]
async fn test_first_message_sets_marker_and_sender_cursor() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");

    let conv = x.create_direct_conversation("y").await.unwrap();
    let hi = x.send_message(&conv.id, NewMessage::text("hi")).await.unwrap();
    assert_eq!(hi.status, MessageStatus::Sent);

    let y_state = y.my_participation(&conv.id).await.unwrap();
    assert_eq!(y_state.first_unread_message_id.as_deref(), Some(hi.id.as_str()));
    assert_eq!(y_state.last_read_at, None);

    let x_state = x.my_participation(&conv.id).await.unwrap();
    assert_eq!(x_state.last_read_at, Some(hi.created_at));
    assert_eq!(x_state.first_unread_message_id, None);

    let summary = y.get_conversation(&conv.id).await.unwrap();
    assert_eq!(summary.unread_count, 1);
    assert_eq!(summary.conversation.last_message_preview.as_deref(), Some("hi"));
    assert_eq!(x.get_conversation(&conv.id).await.unwrap().unread_count, 0);
}

#[tokio::test]
async fn test_opening_with_clear_marks_everything_read() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");

    let conv = x.create_direct_conversation("y").await.unwrap();
    let hi = x.send_message(&conv.id, NewMessage::text("hi")).await.unwrap();

    h.advance_secs(5);
    y.open_conversation(&conv.id, true).await.unwrap();

    let summary = y.get_conversation(&conv.id).await.unwrap();
    assert_eq!(summary.unread_count, 0);
    assert_eq!(summary.first_unread_message_id, None);
    assert_eq!(summary.unread_count_for_divider, 0);

    let stored = x.get_message(&hi.id).await.unwrap();
    assert_eq!(stored.status, MessageStatus::Read);
    assert_eq!(stored.read_at, Some(h.clock_now()));
    assert_eq!(stored.delivered_at, Some(h.clock_now()));
}

#[tokio::test]
async fn test_delete_for_everyone_after_window_still_blocks_edit() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");

    let conv = x.create_direct_conversation("y").await.unwrap();
    let hi = x.send_message(&conv.id, NewMessage::text("hi")).await.unwrap();

    h.advance_secs(10 * 60);
    x.delete_message(&hi.id, DeleteMode::ForEveryone)
        .await
        .unwrap();

    let stored = x.get_message(&hi.id).await.unwrap();
    assert!(stored.is_deleted_for_everyone);
    assert_eq!(stored.content, None);
    assert_eq!(stored.metadata, None);

    let err = x.edit_message(&hi.id, "hello").await.unwrap_err();
    assert!(matches!(err, ChatError::TimeLimitExceeded { .. }));

    assert!(y.get_messages(&conv.id, None, None).await.unwrap().messages.is_empty());
    let summary = y.get_conversation(&conv.id).await.unwrap();
    assert_eq!(
        summary.conversation.last_message_preview.as_deref(),
        Some(DELETED_PREVIEW)
    );
    assert_eq!(summary.unread_count, 0);
}

#[tokio::test]
async fn test_new_message_reinstates_deleted_conversation_without_history() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");

    let conv = x.create_direct_conversation("y").await.unwrap();
    x.send_message(&conv.id, NewMessage::text("old news"))
        .await
        .unwrap();

    h.advance_secs(60);
    y.delete_conversation(&conv.id).await.unwrap();
    assert!(y.list_conversations().await.unwrap().is_empty());
    let deleted_at = y
        .my_participation(&conv.id)
        .await
        .unwrap()
        .deleted_at
        .unwrap();

    h.advance_secs(60);
    let fresh = x
        .send_message(&conv.id, NewMessage::text("are you there?"))
        .await
        .unwrap();

    let listed = y.list_conversations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].conversation.id, conv.id);
    assert_eq!(listed[0].unread_count, 1);

    let y_state = y.my_participation(&conv.id).await.unwrap();
    assert_eq!(y_state.deleted_at, None);
    assert_eq!(y_state.cleared_at, Some(deleted_at));

    let page = y.get_messages(&conv.id, None, None).await.unwrap();
    let ids: Vec<_> = page.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec![fresh.id.as_str()]);

    // The other side keeps the full history
    assert_eq!(x.get_messages(&conv.id, None, None).await.unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_rapid_sends_keep_marker_on_first_with_divider_of_two() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");

    let conv = x.create_direct_conversation("y").await.unwrap();
    let first = x.send_message(&conv.id, NewMessage::text("one")).await.unwrap();
    let second = x.send_message(&conv.id, NewMessage::text("two")).await.unwrap();
    assert!(second.created_at > first.created_at);

    let summary = y.get_conversation(&conv.id).await.unwrap();
    assert_eq!(
        summary.first_unread_message_id.as_deref(),
        Some(first.id.as_str())
    );
    assert_eq!(summary.unread_count, 2);
    assert_eq!(summary.unread_count_for_divider, 2);

    let listed = y.list_conversations().await.unwrap();
    assert_eq!(listed[0].unread_count, 2);
    assert_eq!(listed[0].unread_count_for_divider, 0);
}
