//! Mimecast crate - Client library for the Mimecast email-security API
//!
//! This crate provides:
//! - Region discovery, login and logout with a scoped session guard
//! - HMAC-SHA1 request signing
//! - Cursor pagination over list endpoints
//! - Gateway endpoint wrappers (hold queue, message detail, downloads, users)
//! - A rolling feed of newly held messages with a sliding dedup window
//!
//! All HTTP is synchronous; the feed runs its poller on a dedicated thread.

pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod models;

pub use client::{
    HttpTransport, Pages, ScriptedTransport, Session, SessionGuard, SessionState, Transport,
    fetch_all, sign,
};
pub use crate::config::{ClientOptions, Credentials};
pub use error::{MimecastError, Result, SignatureError};
pub use feed::{FeedOptions, FeedStats, HoldSource, RollingFeed};
pub use gateway::{download_file, held_messages, internal_users, message_detail};
pub use models::{
    Attachment, HeldMessage, HeldMessageId, InternalUser, MessageDetail, SAFE_CONTENT_TYPES,
    SANDBOX_FAILURE_REASON,
};
