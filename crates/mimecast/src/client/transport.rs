//! HTTP transport abstraction
//!
//! The session only ever issues JSON POSTs, so the transport surface is a
//! single `post`. Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::error::{MimecastError, Result};

/// Raw response handed back to the session
pub struct HttpResponse {
    pub status: u16,
    pub body: Box<dyn Read>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Read + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }
}

/// Something that can deliver a POST to the Mimecast API
///
/// Non-2xx statuses must be returned as `Ok(HttpResponse)`, not as errors;
/// the session decides what a status means.
pub trait Transport: Send + Sync {
    fn post(&self, url: &str, headers: &[(&'static str, String)], body: Vec<u8>)
    -> Result<HttpResponse>;
}

/// Transport backed by a ureq agent
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Create a transport with an optional global timeout per call
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .into();
        Self { agent }
    }
}

impl Transport for HttpTransport {
    fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        let mut request = self.agent.post(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send(body)?;
        let status = response.status().as_u16();
        debug!("POST {} -> {}", url, status);

        Ok(HttpResponse::new(status, response.into_body().into_reader()))
    }
}

/// A call captured by [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl RecordedCall {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory transport that replays queued responses in order
///
/// Used for testing and for exercising code built on the session without
/// network access. Every call is recorded for later inspection.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<(u16, Vec<u8>)>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response
    pub fn push_json(&self, status: u16, body: Value) {
        self.push_bytes(status, body.to_string().into_bytes());
    }

    /// Queue a raw response body
    pub fn push_bytes(&self, status: u16, body: Vec<u8>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((status, body));
    }

    /// All calls made so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Transport for ScriptedTransport {
    fn post(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                body: serde_json::from_slice(&body).unwrap_or(Value::Null),
            });

        let (status, bytes) = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| {
                MimecastError::Io(std::io::Error::other(format!(
                    "no scripted response left for {}",
                    url
                )))
            })?;

        Ok(HttpResponse::new(status, Cursor::new(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scripted_replays_in_order() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"n": 1}));
        transport.push_json(500, json!({"n": 2}));

        let first = transport.post("https://a/1", &[], b"{}".to_vec()).unwrap();
        let second = transport.post("https://a/2", &[], b"{}".to_vec()).unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(second.status, 500);
        assert!(transport.post("https://a/3", &[], Vec::new()).is_err());
        assert_eq!(transport.call_count(), 3);
    }

    #[test]
    fn test_recorded_call_headers() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({}));
        transport
            .post(
                "https://a/1",
                &[("x-mc-app-id", "app".to_string())],
                br#"{"data":[]}"#.to_vec(),
            )
            .unwrap();

        let call = &transport.calls()[0];
        assert_eq!(call.header("X-MC-APP-ID"), Some("app"));
        assert_eq!(call.body, json!({"data": []}));
    }
}
