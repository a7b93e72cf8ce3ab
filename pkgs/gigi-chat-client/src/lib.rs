//! Gigi Chat Client - optimistic conversation view
//!
//! Keeps a locally rendered copy of one open conversation and reconciles it
//! with the chat service. Mutations show up immediately and settle when the
//! service answers; nothing is silently reverted.
//!
//! - **ConversationView**: rendered message list, unread divider, send/edit/
//!   delete with settle-or-restore, paging and presence
//! - **PendingOps**: the overlay of operations still waiting for the service
//! - **ChatBackend**: the service calls the view needs, implemented for
//!   [`gigi_chat::ChatApi`]

pub mod backend;
pub mod error;
pub mod overlay;
pub mod presence;
pub mod view;

pub use backend::ChatBackend;
pub use error::{ClientError, ClientResult};
pub use overlay::{is_provisional, PendingOp, PendingOps, SendState};
pub use presence::PresenceAttachment;
pub use view::{ConversationView, UnreadDivider};
