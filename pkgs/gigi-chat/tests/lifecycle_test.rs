//! Send, edit and delete rules

mod common;

use chrono::Duration;
use common::Harness;
use gigi_chat::{
    ChatConfig, ChatError, DeleteMode, ErrorCode, MessageKind, MessageMetadata, NewMessage,
};

async fn direct(h: &Harness) -> String {
    h.api("x").create_direct_conversation("y").await.unwrap().id
}

#[tokio::test]
async fn test_edit_allowed_at_four_fifty_nine_and_five_minutes() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = direct(&h).await;
    let msg = x.send_message(&conv, NewMessage::text("hi")).await.unwrap();

    h.advance_secs(4 * 60 + 59);
    let edited = x.edit_message(&msg.id, "hi there").await.unwrap();
    assert!(edited.is_edited);
    assert_eq!(edited.content.as_deref(), Some("hi there"));
    assert_eq!(edited.updated_at, h.clock_now());
    assert_eq!(edited.created_at, msg.created_at);

    h.advance_secs(1);
    let edited = x.edit_message(&msg.id, "hi again").await.unwrap();
    assert_eq!(edited.content.as_deref(), Some("hi again"));
}

#[tokio::test]
async fn test_edit_rejected_just_past_five_minutes() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = direct(&h).await;
    let msg = x.send_message(&conv, NewMessage::text("hi")).await.unwrap();

    h.advance(Duration::seconds(300) + Duration::milliseconds(1));
    let err = x.edit_message(&msg.id, "too late").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::TimeLimitExceeded);

    let stored = x.get_message(&msg.id).await.unwrap();
    assert_eq!(stored.content.as_deref(), Some("hi"));
    assert!(!stored.is_edited);
}

#[tokio::test]
async fn test_only_sender_may_edit() {
    let h = Harness::new().await;
    let conv = direct(&h).await;
    let msg = h
        .api("x")
        .send_message(&conv, NewMessage::text("mine"))
        .await
        .unwrap();

    let err = h.api("y").edit_message(&msg.id, "yours").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    let err = h.api("x").edit_message("missing", "x").await.unwrap_err();
    assert!(matches!(err, ChatError::MessageNotFound(_)));
}

#[tokio::test]
async fn test_edit_with_same_trimmed_content_is_noop() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = direct(&h).await;
    let msg = x.send_message(&conv, NewMessage::text("hello")).await.unwrap();

    h.advance_secs(10);
    let same = x.edit_message(&msg.id, "  hello  ").await.unwrap();
    assert!(!same.is_edited);
    assert_eq!(same.updated_at, msg.updated_at);

    let err = x.edit_message(&msg.id, "   ").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn test_edit_of_deleted_message_inside_window_is_rejected() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = direct(&h).await;
    let msg = x.send_message(&conv, NewMessage::text("oops")).await.unwrap();
    x.delete_message(&msg.id, DeleteMode::ForEveryone)
        .await
        .unwrap();

    let err = x.edit_message(&msg.id, "fixed").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn test_edit_of_latest_message_rewrites_preview() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = direct(&h).await;
    let first = x.send_message(&conv, NewMessage::text("first")).await.unwrap();
    let last = x.send_message(&conv, NewMessage::text("last")).await.unwrap();

    x.edit_message(&first.id, "first (edited)").await.unwrap();
    let preview = x.get_conversation(&conv).await.unwrap().conversation.last_message_preview;
    assert_eq!(preview.as_deref(), Some("last"));

    x.edit_message(&last.id, "last (edited)").await.unwrap();
    let preview = x.get_conversation(&conv).await.unwrap().conversation.last_message_preview;
    assert_eq!(preview.as_deref(), Some("last (edited)"));
}

#[tokio::test]
async fn test_delete_for_me_hides_only_from_actor() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");
    let conv = direct(&h).await;
    let first = x.send_message(&conv, NewMessage::text("one")).await.unwrap();
    let second = x.send_message(&conv, NewMessage::text("two")).await.unwrap();

    y.delete_message(&first.id, DeleteMode::ForMe).await.unwrap();
    // Idempotent
    y.delete_message(&first.id, DeleteMode::ForMe).await.unwrap();

    let y_page = y.get_messages(&conv, None, None).await.unwrap();
    let y_ids: Vec<_> = y_page.messages.iter().map(|m| m.id.clone()).collect();
    assert_eq!(y_ids, vec![second.id.clone()]);
    assert_eq!(y.get_conversation(&conv).await.unwrap().unread_count, 1);

    let x_page = x.get_messages(&conv, None, None).await.unwrap();
    assert_eq!(x_page.messages.len(), 2);
    assert!(x_page.messages[0].deleted_for_user_ids.contains("y"));
    assert_eq!(x_page.messages[0].deleted_for_user_ids.len(), 1);
    assert!(!x_page.messages[0].is_visible_to("y"));
    assert!(x_page.messages[0].is_visible_to("x"));
}

#[tokio::test]
async fn test_delete_for_everyone_requires_sender_and_is_idempotent() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");
    let conv = direct(&h).await;
    let msg = x.send_message(&conv, NewMessage::text("secret")).await.unwrap();

    let err = y
        .delete_message(&msg.id, DeleteMode::ForEveryone)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    x.delete_message(&msg.id, DeleteMode::ForEveryone)
        .await
        .unwrap();
    x.delete_message(&msg.id, DeleteMode::ForEveryone)
        .await
        .unwrap();

    let stored = y.get_message(&msg.id).await.unwrap();
    assert!(stored.is_deleted_for_everyone);
    assert_eq!(stored.content, None);
    assert!(x.get_messages(&conv, None, None).await.unwrap().messages.is_empty());
}

#[tokio::test]
async fn test_outsiders_are_forbidden() {
    let h = Harness::new().await;
    let conv = direct(&h).await;
    let msg = h
        .api("x")
        .send_message(&conv, NewMessage::text("private"))
        .await
        .unwrap();
    let z = h.api("z");

    let err = z.send_message(&conv, NewMessage::text("hey")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = z.delete_message(&msg.id, DeleteMode::ForMe).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = z.get_messages(&conv, None, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = z.get_message(&msg.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = z
        .send_message("no-such-conversation", NewMessage::text("hey"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::ConversationNotFound(_)));
}

#[tokio::test]
async fn test_send_validation() {
    let h = Harness::with_config(ChatConfig {
        max_content_length: 20,
        ..Default::default()
    })
    .await;
    let x = h.api("x");
    let conv = direct(&h).await;

    for bad in [
        NewMessage::text("   "),
        NewMessage::text("x".repeat(21)),
        NewMessage::image("  ", None),
        NewMessage::project_share("", "Gigi", None),
    ] {
        let err = x.send_message(&conv, bad).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    let text = x.send_message(&conv, NewMessage::text("  padded  ")).await.unwrap();
    assert_eq!(text.content.as_deref(), Some("padded"));
}

#[tokio::test]
async fn test_typed_messages_and_previews() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = direct(&h).await;

    let image = x
        .send_message(&conv, NewMessage::image("https://cdn/p.png", None))
        .await
        .unwrap();
    assert_eq!(image.kind, MessageKind::Image);
    assert_eq!(
        image.metadata,
        Some(MessageMetadata::Image {
            url: "https://cdn/p.png".into()
        })
    );
    let preview = x.get_conversation(&conv).await.unwrap().conversation.last_message_preview;
    assert_eq!(preview.as_deref(), Some("[Image]"));

    x.send_message(&conv, NewMessage::project_share("gigi", "Gigi", None))
        .await
        .unwrap();
    let preview = x.get_conversation(&conv).await.unwrap().conversation.last_message_preview;
    assert_eq!(preview.as_deref(), Some("Shared a project: Gigi"));

    let long = "a".repeat(150);
    x.send_message(&conv, NewMessage::text(long.clone())).await.unwrap();
    let preview = x
        .get_conversation(&conv)
        .await
        .unwrap()
        .conversation
        .last_message_preview
        .unwrap();
    assert_eq!(preview.chars().count(), 100);
    assert_eq!(preview, format!("{}...", &long[..97]));
}

#[tokio::test]
async fn test_created_at_strictly_increases_within_a_millisecond() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");
    let conv = direct(&h).await;

    let mut stamps = Vec::new();
    for i in 0..5 {
        let api = if i % 2 == 0 { &x } else { &y };
        let msg = api
            .send_message(&conv, NewMessage::text(format!("m{i}")))
            .await
            .unwrap();
        stamps.push(msg.created_at);
    }
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));

    let page = x.get_messages(&conv, None, None).await.unwrap();
    let contents: Vec<_> = page
        .messages
        .iter()
        .map(|m| m.content.clone().unwrap())
        .collect();
    assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
}
