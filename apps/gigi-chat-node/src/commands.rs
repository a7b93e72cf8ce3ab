//! Command handling for the terminal session

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gigi_chat::{ChatApi, ChatEvent, DeleteMode, Message, MessageStatus, NewMessage};
use gigi_chat_client::{is_provisional, ConversationView};

const HELP: &str = "\
Commands:
  /dm <user>                     open (or start) a direct conversation
  /group <name> <user> [user..]  start a group conversation
  /list                          list conversations with unread counts
  /open <conversation-id>        open a conversation
  /history                       reprint the open conversation
  /older                         load the previous page
  /image <url> [caption]         send an image
  /share <slug> <name>           share a project
  /edit <message-id> <text>      edit one of your messages
  /delete <message-id> [everyone] delete for you, or for everyone
  /retry <id> | /discard <id>    retry or drop a failed send
  /clear                         hide history in the open conversation
  /leave                         delete the open conversation from your list
  /mute | /unmute                mute the open conversation
  /unread                        total unread messages
  /quit                          exit
Anything else is sent as text to the open conversation.";

pub struct Session {
    api: Arc<ChatApi>,
    me: String,
    view: Option<ConversationView>,
}

impl Session {
    pub fn new(api: Arc<ChatApi>, me: String) -> Self {
        Self {
            api,
            me,
            view: None,
        }
    }

    /// Returns `Ok(false)` when the session should end
    pub async fn handle_command(&mut self, command: &str) -> Result<bool> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        let rest = |from: usize| parts.get(from..).map(|p| p.join(" ")).unwrap_or_default();

        match parts.first().copied() {
            Some("help") => println!("{HELP}"),
            Some("quit") | Some("exit") => return Ok(false),
            Some("dm") => {
                let Some(user) = parts.get(1) else {
                    bail!("Usage: /dm <user>");
                };
                let conversation = self.api.create_direct_conversation(user).await?;
                self.open(&conversation.id).await?;
            }
            Some("group") => {
                if parts.len() < 3 {
                    bail!("Usage: /group <name> <user> [user..]");
                }
                let members: Vec<String> = parts[2..].iter().map(|s| s.to_string()).collect();
                let conversation = self
                    .api
                    .create_group_conversation(parts[1], None, &members)
                    .await?;
                self.open(&conversation.id).await?;
            }
            Some("list") => self.list().await?,
            Some("open") => {
                let Some(id) = parts.get(1) else {
                    bail!("Usage: /open <conversation-id>");
                };
                self.open(id).await?;
            }
            Some("history") => self.print_history()?,
            Some("older") => {
                let added = self.view_mut()?.load_older().await?;
                println!("Loaded {added} older messages");
                self.print_history()?;
            }
            Some("image") => {
                let Some(url) = parts.get(1) else {
                    bail!("Usage: /image <url> [caption]");
                };
                let caption = Some(rest(2)).filter(|c| !c.is_empty());
                self.send(NewMessage::image(*url, caption)).await?;
            }
            Some("share") => {
                if parts.len() < 3 {
                    bail!("Usage: /share <slug> <name>");
                }
                self.send(NewMessage::project_share(parts[1], rest(2), None))
                    .await?;
            }
            Some("edit") => {
                if parts.len() < 3 {
                    bail!("Usage: /edit <message-id> <text>");
                }
                let edited = self.view_mut()?.edit(parts[1], &rest(2)).await?;
                println!("Edited {}", edited.id);
            }
            Some("delete") => {
                let Some(id) = parts.get(1) else {
                    bail!("Usage: /delete <message-id> [everyone]");
                };
                let mode = match parts.get(2) {
                    Some(&"everyone") => DeleteMode::ForEveryone,
                    _ => DeleteMode::ForMe,
                };
                self.view_mut()?.delete(id, mode).await?;
                println!("Deleted {id} ({mode})");
            }
            Some("retry") => {
                let Some(id) = parts.get(1) else {
                    bail!("Usage: /retry <id>");
                };
                let sent = self.view_mut()?.retry(id).await?;
                println!("Sent {}", sent.id);
            }
            Some("discard") => {
                let Some(id) = parts.get(1) else {
                    bail!("Usage: /discard <id>");
                };
                self.view_mut()?.discard(id)?;
            }
            Some("clear") => {
                let id = self.open_id()?;
                self.api.clear_conversation(&id).await?;
                self.open(&id).await?;
            }
            Some("leave") => {
                let id = self.open_id()?;
                self.api.delete_conversation(&id).await?;
                self.view = None;
                println!("Conversation {id} removed from your list");
            }
            Some("mute") | Some("unmute") => {
                let id = self.open_id()?;
                let muted = parts[0] == "mute";
                self.api.set_muted(&id, muted).await?;
                println!("{}", if muted { "Muted" } else { "Unmuted" });
            }
            Some("unread") => println!("{} unread", self.api.get_unread_total().await?),
            Some(other) => bail!("Unknown command /{other}, try /help"),
            None => {}
        }
        Ok(true)
    }

    pub async fn send_text(&mut self, text: &str) -> Result<bool> {
        self.send(NewMessage::text(text)).await?;
        Ok(true)
    }

    pub async fn handle_event(&mut self, event: ChatEvent) -> Result<()> {
        let Some(view) = self.view.as_mut() else {
            return Ok(());
        };
        let incoming = match &event {
            ChatEvent::MessageSent { message, .. } if message.sender_id != self.me => {
                Some(message.clone())
            }
            _ => None,
        };
        if view.apply_event(event).await? {
            if let Some(message) = incoming {
                println!();
                print_message(&message);
            }
        }
        Ok(())
    }

    async fn send(&mut self, input: NewMessage) -> Result<()> {
        let view = self.view_mut()?;
        match view.send(input).await {
            Ok(message) => {
                print_message(&message);
                Ok(())
            }
            Err(e) => {
                let failed = view
                    .messages()
                    .iter()
                    .rev()
                    .find(|m| m.status == MessageStatus::Failed)
                    .map(|m| m.id.clone())
                    .unwrap_or_default();
                Err(e).with_context(|| format!("Send failed, /retry {failed} or /discard {failed}"))
            }
        }
    }

    async fn open(&mut self, conversation_id: &str) -> Result<()> {
        let view = ConversationView::open(self.api.clone(), conversation_id, self.me.clone())
            .await
            .with_context(|| format!("Failed to open conversation {conversation_id}"))?;
        println!("Opened {conversation_id}");
        self.view = Some(view);
        self.print_history()
    }

    async fn list(&self) -> Result<()> {
        let conversations = self.api.list_conversations().await?;
        if conversations.is_empty() {
            println!("No conversations");
        }
        for summary in conversations {
            let others: Vec<&str> = summary
                .participant_ids
                .iter()
                .map(String::as_str)
                .filter(|id| *id != self.me)
                .collect();
            let title = summary
                .conversation
                .name
                .clone()
                .unwrap_or_else(|| others.join(", "));
            println!(
                "{}  {:<24} {:>3} unread{}  {}",
                summary.conversation.id,
                title,
                summary.unread_count,
                if summary.is_muted { " (muted)" } else { "" },
                summary
                    .conversation
                    .last_message_preview
                    .unwrap_or_default()
            );
        }
        Ok(())
    }

    fn print_history(&self) -> Result<()> {
        let view = self.view()?;
        if view.has_more() {
            println!("  ... /older for earlier messages");
        }
        for message in view.messages() {
            if let Some(divider) = view.divider() {
                if divider.message_id == message.id {
                    println!("  ---- {} unread messages ----", divider.count);
                }
            }
            print_message(message);
        }
        Ok(())
    }

    fn view(&self) -> Result<&ConversationView> {
        self.view.as_ref().context("No open conversation, use /dm or /open")
    }

    fn view_mut(&mut self) -> Result<&mut ConversationView> {
        self.view.as_mut().context("No open conversation, use /dm or /open")
    }

    fn open_id(&self) -> Result<String> {
        Ok(self.view()?.conversation_id().to_string())
    }
}

fn print_message(message: &Message) {
    let body = match (&message.content, &message.metadata) {
        (Some(content), _) => content.clone(),
        (None, Some(metadata)) => format!("[{}]", metadata.kind()),
        (None, None) => String::new(),
    };
    let status = if is_provisional(&message.id) {
        format!(" ({})", message.status)
    } else {
        String::new()
    };
    println!(
        "[{}] {}: {}{}{}  #{}",
        message.created_at.format("%H:%M:%S"),
        message.sender_id,
        body,
        if message.is_edited { " (edited)" } else { "" },
        status,
        message.id
    );
}
