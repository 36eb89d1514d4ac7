//! Domain models for gateway entities

mod held_message;
mod message_detail;
mod user;

pub use held_message::{HeldMessage, HeldMessageId, SANDBOX_FAILURE_REASON, parse_timestamp};
pub use message_detail::{Attachment, MessageDetail, SAFE_CONTENT_TYPES};
pub use user::InternalUser;
