//! Sea-ORM entities for gigi-chat

pub mod conversation_participants;
pub mod conversations;
pub mod message_deletions;
pub mod messages;

pub use conversation_participants::Entity as ConversationParticipant;
pub use conversations::Entity as Conversation;
pub use message_deletions::Entity as MessageDeletion;
pub use messages::Entity as Message;
