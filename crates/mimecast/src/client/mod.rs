//! Mimecast API integration
//!
//! This module provides:
//! - Region discovery and login
//! - Per-request HMAC signing
//! - Cursor-driven pagination over list endpoints
//! - A transport seam so the session can run against a scripted backend

mod paginate;
mod session;
mod signature;
mod transport;

pub use paginate::{Pages, fetch_all};
pub use session::{RequestContext, Session, SessionGuard, SessionState, format_date_header};
pub use signature::{authorization_header, sign};
pub use transport::{HttpResponse, HttpTransport, RecordedCall, ScriptedTransport, Transport};

/// Mimecast API wire types
pub mod api {
    use serde::Deserialize;
    use serde_json::Value;

    /// Common response envelope: `{meta, data, fail}`
    #[derive(Debug, Deserialize)]
    pub struct Envelope<T> {
        #[serde(default)]
        pub meta: Option<Meta>,
        // Plain `default` would demand `T: Default`
        #[serde(default = "Vec::new")]
        pub data: Vec<T>,
        #[serde(default)]
        pub fail: Vec<Value>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Meta {
        pub status: Option<u16>,
        pub pagination: Option<Pagination>,
    }

    /// Pagination block of a list response
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Pagination {
        pub page_size: Option<u32>,
        pub next: Option<String>,
    }

    /// Row of the discovery response
    #[derive(Debug, Deserialize)]
    pub struct DiscoverData {
        pub region: Region,
    }

    #[derive(Debug, Deserialize)]
    pub struct Region {
        /// Scheme-prefixed API host, e.g. `https://eu-api.mimecast.com`
        pub api: String,
    }

    /// Row of the login response
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LoginData {
        pub access_key: String,
        pub secret_key: String,
    }

    /// Flatten a `fail` array into readable messages
    ///
    /// Each entry looks like `{"errors": [{"code": "...", "message": "..."}]}`.
    pub fn fail_messages(fail: &[Value]) -> Vec<String> {
        fail.iter()
            .flat_map(|entry| match entry.get("errors").and_then(Value::as_array) {
                Some(errors) if !errors.is_empty() => errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .or_else(|| e.get("code"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| e.to_string())
                    })
                    .collect::<Vec<_>>(),
                _ => vec![entry.to_string()],
            })
            .collect()
    }

    /// The `meta.pagination.next` cursor of a raw response, if present and non-empty
    pub fn next_cursor(response: &Value) -> Option<String> {
        response
            .pointer("/meta/pagination/next")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_envelope_defaults() {
            let env: Envelope<DiscoverData> = serde_json::from_value(json!({})).unwrap();
            assert!(env.data.is_empty());
            assert!(env.fail.is_empty());
            assert!(env.meta.is_none());
        }

        #[test]
        fn test_fail_messages() {
            let fail = vec![
                json!({"errors": [{"code": "err_validation", "message": "bad start"}]}),
                json!({"errors": [{"code": "err_denied"}]}),
            ];
            assert_eq!(fail_messages(&fail), vec!["bad start", "err_denied"]);
        }

        #[test]
        fn test_next_cursor() {
            let page = json!({"meta": {"pagination": {"pageSize": 2, "next": "abc"}}});
            assert_eq!(next_cursor(&page), Some("abc".to_string()));

            let last = json!({"meta": {"pagination": {"pageSize": 2}}});
            assert_eq!(next_cursor(&last), None);

            let empty = json!({"meta": {"pagination": {"next": ""}}});
            assert_eq!(next_cursor(&empty), None);
        }
    }
}
