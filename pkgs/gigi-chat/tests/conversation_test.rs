//! Conversation creation, listing, identity and events

mod common;

use common::Harness;
use gigi_chat::{
    ChatError, ChatEvent, ConversationType, DeleteMode, ErrorCode, NewMessage, ParticipantRole,
};

#[tokio::test]
async fn test_direct_conversation_is_reused_from_either_side() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");

    let first = x.create_direct_conversation("y").await.unwrap();
    let again = x.create_direct_conversation("y").await.unwrap();
    let from_y = y.create_direct_conversation("x").await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(first.id, from_y.id);
    assert_eq!(first.conversation_type, ConversationType::Direct);
    assert_eq!(first.created_by_id, "x");
    assert_eq!(first.name, None);

    let roster = x.participants(&first.id).await.unwrap();
    assert_eq!(roster.len(), 2);
    let owner = roster.iter().find(|p| p.user_id == "x").unwrap();
    let member = roster.iter().find(|p| p.user_id == "y").unwrap();
    assert_eq!(owner.role, ParticipantRole::Owner);
    assert_eq!(member.role, ParticipantRole::Member);
}

#[tokio::test]
async fn test_direct_conversation_validation() {
    let h = Harness::new().await;
    let x = h.api("x");

    let err = x.create_direct_conversation("x").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let err = x.create_direct_conversation("  ").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn test_group_conversation() {
    let h = Harness::new().await;
    let x = h.api("x");

    let members = vec!["y".to_string(), "z".to_string(), "y".to_string(), "x".to_string()];
    let group = x
        .create_group_conversation(" Team ", Some("https://cdn/team.png".into()), &members)
        .await
        .unwrap();
    assert_eq!(group.conversation_type, ConversationType::Group);
    assert_eq!(group.name.as_deref(), Some("Team"));
    assert_eq!(group.avatar_url.as_deref(), Some("https://cdn/team.png"));

    let roster = x.participants(&group.id).await.unwrap();
    let mut ids: Vec<_> = roster.iter().map(|p| p.user_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["x", "y", "z"]);

    let msg = x.send_message(&group.id, NewMessage::text("hello team")).await.unwrap();
    for user in ["y", "z"] {
        let state = h.api(user).my_participation(&group.id).await.unwrap();
        assert_eq!(state.first_unread_message_id.as_deref(), Some(msg.id.as_str()));
    }

    // A second group with the same people is a new conversation
    let other = x
        .create_group_conversation("Team", None, &members)
        .await
        .unwrap();
    assert_ne!(other.id, group.id);
}

#[tokio::test]
async fn test_group_participants_keep_ids_and_roles() {
    let h = Harness::new().await;
    let x = h.api("x");

    let members = vec!["y".to_string(), "z".to_string()];
    let group = x
        .create_group_conversation("Crew", None, &members)
        .await
        .unwrap();

    let roster = h.api("z").participants(&group.id).await.unwrap();
    let roles: Vec<(&str, ParticipantRole)> = roster
        .iter()
        .map(|p| (p.user_id.as_str(), p.role))
        .collect();
    assert_eq!(roles.len(), 3);
    assert!(roles.contains(&("x", ParticipantRole::Owner)));
    assert!(roles.contains(&("y", ParticipantRole::Member)));
    assert!(roles.contains(&("z", ParticipantRole::Member)));

    let listed = h.api("y").list_conversations().await.unwrap();
    assert_eq!(listed.len(), 1);
    let mut ids = listed[0].participant_ids.clone();
    ids.sort();
    assert_eq!(ids, vec!["x", "y", "z"]);
}

#[tokio::test]
async fn test_group_conversation_validation() {
    let h = Harness::new().await;
    let x = h.api("x");

    let err = x
        .create_group_conversation("  ", None, &["y".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = x
        .create_group_conversation("Solo", None, &["x".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = x
        .create_group_conversation(&"n".repeat(101), None, &["y".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

#[tokio::test]
async fn test_list_orders_by_latest_activity() {
    let h = Harness::new().await;
    let x = h.api("x");

    let with_y = x.create_direct_conversation("y").await.unwrap();
    h.advance_secs(1);
    let with_z = x.create_direct_conversation("z").await.unwrap();
    h.advance_secs(1);
    let with_w = x.create_direct_conversation("w").await.unwrap();

    // No messages yet: newest conversation first
    let ids: Vec<_> = x
        .list_conversations()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.conversation.id)
        .collect();
    assert_eq!(ids, vec![with_w.id.clone(), with_z.id.clone(), with_y.id.clone()]);

    h.advance_secs(1);
    h.api("y")
        .send_message(&with_y.id, NewMessage::text("ping"))
        .await
        .unwrap();

    let listed = x.list_conversations().await.unwrap();
    assert_eq!(listed[0].conversation.id, with_y.id);
    assert_eq!(listed[0].unread_count, 1);
    assert_eq!(listed[0].participant_ids.len(), 2);
    assert!(listed[0].participant_ids.contains(&"y".to_string()));
}

#[tokio::test]
async fn test_set_muted() {
    let h = Harness::new().await;
    let x = h.api("x");
    let conv = x.create_direct_conversation("y").await.unwrap();

    x.set_muted(&conv.id, true).await.unwrap();
    assert!(x.list_conversations().await.unwrap()[0].is_muted);
    assert!(!h.api("y").list_conversations().await.unwrap()[0].is_muted);

    x.set_muted(&conv.id, false).await.unwrap();
    assert!(!x.get_conversation(&conv.id).await.unwrap().is_muted);

    let err = h.api("z").set_muted(&conv.id, true).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn test_anonymous_caller_is_unauthorized() {
    let h = Harness::new().await;
    let conv = h.api("x").create_direct_conversation("y").await.unwrap();
    let anon = h.anonymous();

    assert!(matches!(
        anon.list_conversations().await,
        Err(ChatError::Unauthorized)
    ));
    assert!(matches!(
        anon.send_message(&conv.id, NewMessage::text("hi")).await,
        Err(ChatError::Unauthorized)
    ));
    assert_eq!(
        anon.get_unread_total().await.unwrap_err().code(),
        ErrorCode::Unauthorized
    );
}

#[tokio::test]
async fn test_missing_conversation_is_not_found() {
    let h = Harness::new().await;
    let x = h.api("x");

    for err in [
        x.get_conversation("nope").await.unwrap_err(),
        x.open_conversation("nope", true).await.unwrap_err(),
        x.clear_conversation("nope").await.unwrap_err(),
        x.delete_conversation("nope").await.unwrap_err(),
    ] {
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}

#[tokio::test]
async fn test_events_follow_committed_changes() {
    let h = Harness::new().await;
    let x = h.api("x");
    let y = h.api("y");
    let conv = x.create_direct_conversation("y").await.unwrap();
    let mut events = x.subscribe_events();

    let msg = x.send_message(&conv.id, NewMessage::text("hi")).await.unwrap();
    match events.try_recv().unwrap() {
        ChatEvent::MessageSent { message, .. } => assert_eq!(message.id, msg.id),
        other => panic!("unexpected event {other:?}"),
    }

    y.open_conversation(&conv.id, true).await.unwrap();
    match events.try_recv().unwrap() {
        ChatEvent::ConversationRead { reader_id, .. } => assert_eq!(reader_id, "y"),
        other => panic!("unexpected event {other:?}"),
    }

    x.delete_message(&msg.id, DeleteMode::ForEveryone)
        .await
        .unwrap();
    let event = events.try_recv().unwrap();
    assert_eq!(event.conversation_id(), conv.id);
    assert!(matches!(
        event,
        ChatEvent::MessageDeleted {
            mode: DeleteMode::ForEveryone,
            ..
        }
    ));

    // Failed operations publish nothing
    let _ = y.edit_message(&msg.id, "nope").await;
    assert!(events.try_recv().is_err());
}
