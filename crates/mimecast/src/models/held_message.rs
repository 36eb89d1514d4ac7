//! Held message model representing one row of the hold queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{MimecastError, Result};

/// Hold reason for messages whose attachments failed sandbox analysis
pub const SANDBOX_FAILURE_REASON: &str = "ADMIN_MESSAGE_HOLD_APPLIED_ATTACHMENT_SANDBOX_FAILURE";

/// Server-assigned identifier of a held message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeldMessageId(pub String);

impl HeldMessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for HeldMessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HeldMessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for HeldMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message the gateway has quarantined pending review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldMessage {
    pub id: HeldMessageId,
    /// Machine-readable hold reason, e.g. `ADMIN_MESSAGE_HOLD_APPLIED_SPAM_SIGNATURE`
    pub reason_id: String,
    /// Human-readable hold reason
    pub reason: Option<String>,
    pub subject: Option<String>,
    /// Envelope sender address
    pub from: Option<String>,
    pub has_attachments: bool,
    pub date_received: DateTime<Utc>,
}

/// Raw hold-list row as returned by the API
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeldMessageRow {
    id: String,
    #[serde(default)]
    reason_id: String,
    reason: Option<String>,
    subject: Option<String>,
    from: Option<RowAddress>,
    #[serde(default)]
    has_attachments: bool,
    date_received: Option<String>,
    #[serde(rename = "dateReceivedUTC")]
    date_received_utc: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowAddress {
    email_address: Option<String>,
}

impl HeldMessage {
    /// Create a held message with only the fields the feed needs
    pub fn new(
        id: impl Into<HeldMessageId>,
        reason_id: impl Into<String>,
        date_received: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            reason_id: reason_id.into(),
            reason: None,
            subject: None,
            from: None,
            has_attachments: false,
            date_received,
        }
    }

    pub fn with_attachments(mut self, has_attachments: bool) -> Self {
        self.has_attachments = has_attachments;
        self
    }

    pub fn is_sandbox_failure(&self) -> bool {
        self.reason_id == SANDBOX_FAILURE_REASON
    }

    /// Parse one row of the hold-message list
    pub fn from_row(row: &Value) -> Result<Self> {
        const PATH: &str = "/api/gateway/get-hold-message-list";
        let row: HeldMessageRow = serde_json::from_value(row.clone())?;
        // Prefer the UTC stamp; `dateReceived` carries the account's local offset
        let raw = row
            .date_received_utc
            .as_deref()
            .or(row.date_received.as_deref())
            .ok_or_else(|| MimecastError::malformed(PATH, "row has no received date"))?;
        let date_received = parse_timestamp(raw).ok_or_else(|| {
            MimecastError::malformed(PATH, format!("unparseable dateReceived '{}'", raw))
        })?;

        Ok(Self {
            id: HeldMessageId(row.id),
            reason_id: row.reason_id,
            reason: row.reason,
            subject: row.subject,
            from: row.from.and_then(|a| a.email_address),
            has_attachments: row.has_attachments,
            date_received,
        })
    }
}

/// Parse an API timestamp such as `2017-04-03T10:15:34+0000` into UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_offsets() {
        let expected = Utc.with_ymd_and_hms(2017, 4, 3, 8, 15, 34).unwrap();
        assert_eq!(parse_timestamp("2017-04-03T10:15:34+0200"), Some(expected));
        assert_eq!(parse_timestamp("2017-04-03T08:15:34+0000"), Some(expected));
        assert_eq!(parse_timestamp("2017-04-03T08:15:34Z"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_from_row() {
        let row = json!({
            "id": "eNoVzs0OgjAQBOB38",
            "reasonId": "ADMIN_MESSAGE_HOLD_APPLIED_ATTACHMENT_SANDBOX_FAILURE",
            "reason": "Attachment Sandbox Failure",
            "subject": "Invoice",
            "from": {"displayableName": "Eve", "emailAddress": "eve@evil.example"},
            "hasAttachments": true,
            "dateReceived": "2017-04-03T08:15:34+0000"
        });

        let msg = HeldMessage::from_row(&row).unwrap();
        assert_eq!(msg.id.as_str(), "eNoVzs0OgjAQBOB38");
        assert_eq!(
            msg.reason_id,
            "ADMIN_MESSAGE_HOLD_APPLIED_ATTACHMENT_SANDBOX_FAILURE"
        );
        assert_eq!(msg.from.as_deref(), Some("eve@evil.example"));
        assert!(msg.has_attachments);
        assert!(msg.is_sandbox_failure());
    }

    #[test]
    fn test_from_row_utc_alias() {
        let row = json!({"id": "m1", "dateReceivedUTC": "2017-04-03T08:15:34+0000"});
        let msg = HeldMessage::from_row(&row).unwrap();
        assert_eq!(msg.reason_id, "");
        assert!(!msg.has_attachments);
        assert!(!msg.is_sandbox_failure());
    }

    #[test]
    fn test_from_row_with_both_dates_prefers_utc() {
        let row = json!({
            "id": "m1",
            "dateReceived": "2024-05-01T13:50:00+0200",
            "dateReceivedUTC": "2024-05-01T11:50:30+0000"
        });
        let msg = HeldMessage::from_row(&row).unwrap();
        assert_eq!(
            msg.date_received,
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 50, 30).unwrap()
        );
    }

    #[test]
    fn test_from_row_without_date() {
        let row = json!({"id": "m1"});
        assert!(matches!(
            HeldMessage::from_row(&row),
            Err(MimecastError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_from_row_bad_date() {
        let row = json!({"id": "m1", "dateReceived": "not a date"});
        assert!(matches!(
            HeldMessage::from_row(&row),
            Err(MimecastError::MalformedResponse { .. })
        ));
    }
}
