//! Cursor-driven pagination over list endpoints
//!
//! Each page request carries `meta.pagination.{pageSize, pageToken}`; the
//! walk ends as soon as a response has no `meta.pagination.next`.

use std::collections::VecDeque;

use log::debug;
use serde_json::{Map, Value, json};

use super::Session;
use super::api::next_cursor;
use crate::error::{MimecastError, Result};

/// Lazy walk over every item of a paginated endpoint
///
/// Items are yielded in server order. A failed page yields one `Err` and
/// ends the walk; items already yielded are left to the caller.
pub struct Pages<'a> {
    session: &'a Session,
    path: String,
    base_body: Value,
    page_size: u32,
    cursor: Option<String>,
    buffer: VecDeque<Value>,
    finished: bool,
    calls: usize,
}

/// Start a fresh cursor walk over `path`
///
/// `base_body` is the endpoint-specific request body; the pagination block
/// is merged into its `meta` object on every page.
pub fn fetch_all<'a>(
    session: &'a Session,
    path: &str,
    base_body: Value,
    page_size: u32,
) -> Pages<'a> {
    Pages {
        session,
        path: path.to_string(),
        base_body,
        page_size,
        cursor: None,
        buffer: VecDeque::new(),
        finished: false,
        calls: 0,
    }
}

impl Pages<'_> {
    /// Number of page requests issued so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn page_body(&self) -> Result<Value> {
        let mut body = match &self.base_body {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => {
                return Err(MimecastError::malformed(
                    &self.path,
                    "paginated request body must be a JSON object",
                ));
            }
        };

        let mut pagination = json!({"pageSize": self.page_size});
        if let Some(cursor) = &self.cursor {
            pagination["pageToken"] = json!(cursor);
        }

        let meta = body
            .entry("meta")
            .or_insert_with(|| Value::Object(Map::new()));
        match meta {
            Value::Object(meta) => {
                meta.insert("pagination".to_string(), pagination);
            }
            other => *other = json!({"pagination": pagination}),
        }

        Ok(Value::Object(body))
    }

    fn fetch_page(&mut self) -> Result<()> {
        let body = self.page_body()?;
        self.calls += 1;
        let response = self.session.request(&self.path, &body)?;

        if let Some(items) = response.get("data").and_then(Value::as_array) {
            self.buffer.extend(items.iter().cloned());
        }

        self.cursor = next_cursor(&response);
        if self.cursor.is_none() {
            self.finished = true;
        }
        debug!(
            "{} page {} returned, next cursor: {}",
            self.path,
            self.calls,
            self.cursor.is_some()
        );
        Ok(())
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}
