//! Service layer
//!
//! Contains the core coordination logic separated from HTTP handlers:
//! conversation resolution, message fan-out, the friendship state
//! machine, and notification dispatch.

mod conversation;
mod friendship;
mod messaging;
mod notification;

pub use conversation::ConversationDirectory;
pub use friendship::{EdgeWithUser, FriendshipGraph};
pub use messaging::{MessageEvent, MessagingFanout, ReadReceiptEvent, SendMessage, TypingEvent};
pub use notification::{NotificationDispatcher, NotificationEvent};
