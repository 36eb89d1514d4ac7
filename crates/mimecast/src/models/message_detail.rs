//! Message detail and attachment metadata

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Content types treated as harmless when triaging held attachments
pub const SAFE_CONTENT_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "text/calendar",
    "image/png",
    "image/jpeg",
    "image/gif",
];

/// Attachment metadata from the message detail endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File id accepted by the download endpoint
    pub id: String,
    #[serde(default)]
    pub filename: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
}

/// Subset of the message detail response used by the tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub id: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Attachment {
    /// File name safe to join onto a local directory
    ///
    /// Drops any directory part of the server-supplied name and falls back to
    /// the file id when nothing usable is left.
    pub fn local_file_name(&self) -> String {
        Path::new(&self.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.id.as_str())
            .to_string()
    }
}

impl MessageDetail {
    /// Attachments whose content type is not in `safe_types`
    pub fn unsafe_attachments<'a>(
        &'a self,
        safe_types: &'a [&str],
    ) -> impl Iterator<Item = &'a Attachment> {
        self.attachments.iter().filter(move |a| {
            a.content_type
                .as_deref()
                .is_none_or(|ct| !safe_types.iter().any(|safe| *safe == ct))
        })
    }
}
