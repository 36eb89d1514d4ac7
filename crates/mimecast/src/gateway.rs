//! Gateway endpoint wrappers built on the signed session
//!
//! Each wrapper only shapes the request body and parses the response;
//! signing, status handling and pagination come from [`crate::client`].

use std::io::Write;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_json::{Value, json};

use crate::client::api::Envelope;
use crate::client::{Session, fetch_all};
use crate::error::{MimecastError, Result};
use crate::feed::HoldSource;
use crate::models::{HeldMessage, InternalUser, MessageDetail};

pub const HOLD_LIST_PATH: &str = "/api/gateway/get-hold-message-list";
pub const MESSAGE_DETAIL_PATH: &str = "/api/gateway/message/get-message-detail";
pub const GET_FILE_PATH: &str = "/api/gateway/message/get-file";
pub const INTERNAL_USERS_PATH: &str = "/api/user/get-internal-users";

const PAGE_SIZE: u32 = 100;

/// Format a timestamp for list filters (`start`/`end`)
pub fn format_api_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S+0000").to_string()
}

/// All messages placed on hold between `start` and `end`
///
/// Rows that cannot be parsed are skipped with a warning.
pub fn held_messages(
    session: &Session,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<HeldMessage>> {
    let body = json!({
        "data": [{
            "start": format_api_timestamp(start),
            "end": format_api_timestamp(end),
            "admin": true,
        }]
    });

    let mut messages = Vec::new();
    for row in fetch_all(session, HOLD_LIST_PATH, body, PAGE_SIZE) {
        let row = row?;
        match HeldMessage::from_row(&row) {
            Ok(message) => messages.push(message),
            Err(e) => warn!("Skipping hold-list row: {}", e),
        }
    }
    Ok(messages)
}

/// Fetch details, including attachment metadata, for one message
pub fn message_detail(session: &Session, id: &str) -> Result<MessageDetail> {
    let response = session.request(MESSAGE_DETAIL_PATH, &json!({"data": [{"id": id}]}))?;
    let envelope: Envelope<MessageDetail> = serde_json::from_value(response)?;
    envelope
        .data
        .into_iter()
        .next()
        .ok_or_else(|| MimecastError::malformed(MESSAGE_DETAIL_PATH, "no message detail returned"))
}

/// Stream a file into `destination`, returning the number of bytes written
pub fn download_file(session: &Session, id: &str, destination: &mut dyn Write) -> Result<u64> {
    let mut body = session.request_stream(GET_FILE_PATH, &json!({"data": [{"id": id}]}))?;
    let written = std::io::copy(&mut body, destination)?;
    info!("Downloaded file {} ({} bytes)", id, written);
    Ok(written)
}

/// Every internal user and alias of `domain`
pub fn internal_users(session: &Session, domain: &str) -> Result<Vec<InternalUser>> {
    let body = json!({"data": [{"domain": domain}]});

    let mut users = Vec::new();
    for row in fetch_all(session, INTERNAL_USERS_PATH, body, PAGE_SIZE) {
        let row = row?;
        match row.get("users").and_then(Value::as_array) {
            Some(page) => {
                for user in page {
                    users.push(serde_json::from_value(user.clone())?);
                }
            }
            None => users.push(serde_json::from_value(row)?),
        }
    }
    Ok(users)
}

impl HoldSource for Session {
    fn held_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<HeldMessage>> {
        held_messages(self, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_api_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap();
        assert_eq!(format_api_timestamp(at), "2024-01-09T07:05:03+0000");
    }
}
