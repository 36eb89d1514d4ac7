//! Authenticated Mimecast session
//!
//! A session walks `Unauthenticated -> Discovering -> Discovered ->
//! LoggingIn -> Authenticated -> LoggedOut`. Only an authenticated session
//! can sign requests; once logged out it refuses every signed call.

use std::fmt;
use std::io::Read;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;

use super::api::{DiscoverData, Envelope, LoginData, fail_messages};
use super::signature::{authorization_header, sign};
use super::transport::{HttpResponse, HttpTransport, Transport};
use crate::config::{ClientOptions, Credentials, DEFAULT_DISCOVERY_URL};
use crate::error::{MimecastError, Result};

const LOGIN_PATH: &str = "/api/login/login";
const LOGOUT_PATH: &str = "/api/login/logout";

const HEADER_APP_ID: &str = "x-mc-app-id";
const HEADER_REQUEST_ID: &str = "x-mc-req-id";
const HEADER_DATE: &str = "x-mc-date";

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Discovering,
    Discovered,
    LoggingIn,
    Authenticated,
    LoggedOut,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Discovering => "discovering",
            Self::Discovered => "discovered",
            Self::LoggingIn => "logging in",
            Self::Authenticated => "authenticated",
            Self::LoggedOut => "logged out",
        };
        f.write_str(name)
    }
}

/// Format a timestamp the way the `x-mc-date` header expects it
pub fn format_date_header(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S UTC").to_string()
}

/// Per-call request identity. Built fresh for every outbound call and
/// never reused, so a signature cannot be replayed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub date: String,
}

impl RequestContext {
    pub fn fresh() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            date: format_date_header(now),
        }
    }
}

#[derive(Clone)]
struct AccessKeys {
    access_key: String,
    secret_key: String,
}

struct Inner {
    state: SessionState,
    host: Option<String>,
    keys: Option<AccessKeys>,
}

/// One credential set talking to one Mimecast region
///
/// Signed calls (`request`, `request_stream`) only read the session keys,
/// so they can run concurrently from several threads. `discover`, `login`
/// and `logout` must not race each other.
pub struct Session {
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    discovery_url: String,
    inner: RwLock<Inner>,
}

impl Session {
    /// Create an unauthenticated session
    pub fn new(credentials: Credentials, transport: Arc<dyn Transport>) -> Self {
        Self {
            credentials,
            transport,
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            inner: RwLock::new(Inner {
                state: SessionState::Unauthenticated,
                host: None,
                keys: None,
            }),
        }
    }

    /// Override the discovery endpoint
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = url.into();
        self
    }

    /// Discover, log in over HTTP and hand back a scoped session
    pub fn connect(credentials: Credentials, options: &ClientOptions) -> Result<SessionGuard> {
        let transport = Arc::new(HttpTransport::new(options.request_timeout));
        Session::new(credentials, transport)
            .with_discovery_url(options.discovery_url.clone())
            .open()
    }

    /// Run discovery and login, consuming the session.
    ///
    /// If either step fails the session is dropped, so a half-authenticated
    /// session never escapes.
    pub fn open(self) -> Result<SessionGuard> {
        let email = self.credentials.user_name.clone();
        self.discover(&email)?;
        self.login()?;
        Ok(SessionGuard {
            session: Arc::new(self),
        })
    }

    pub fn state(&self) -> SessionState {
        self.read().state
    }

    /// API host discovered for this account, without scheme
    pub fn host(&self) -> Option<String> {
        self.read().host.clone()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Look up the regional API host for `email_address`
    pub fn discover(&self, email_address: &str) -> Result<String> {
        self.transition(SessionState::Unauthenticated, SessionState::Discovering)?;

        match self.fetch_region(email_address) {
            Ok(host) => {
                let mut inner = self.write();
                inner.host = Some(host.clone());
                inner.state = SessionState::Discovered;
                info!("Discovered API host {} for {}", host, email_address);
                Ok(host)
            }
            Err(e) => {
                self.write().state = SessionState::Unauthenticated;
                warn!("Region discovery failed: {}", e);
                Err(e)
            }
        }
    }

    fn fetch_region(&self, email_address: &str) -> Result<String> {
        let ctx = RequestContext::fresh();
        let headers = self.base_headers(&ctx);
        let body = json!({"data": [{"emailAddress": email_address}]});

        let response =
            self.transport
                .post(&self.discovery_url, &headers, serde_json::to_vec(&body)?)?;
        if response.status != 200 {
            return Err(MimecastError::Discovery {
                status: response.status,
            });
        }

        let path = self.discovery_url.as_str();
        let data: DiscoverData = first_row(path, response)?;
        region_host(&data.region.api)
            .ok_or_else(|| MimecastError::malformed(path, "region api host is empty"))
    }

    /// Exchange the user credentials for an access/secret key pair
    pub fn login(&self) -> Result<()> {
        self.transition(SessionState::Discovered, SessionState::LoggingIn)?;

        match self.fetch_keys() {
            Ok(keys) => {
                let mut inner = self.write();
                inner.keys = Some(keys);
                inner.state = SessionState::Authenticated;
                info!("Login successful for {}", self.credentials.user_name);
                Ok(())
            }
            Err(e) => {
                self.write().state = SessionState::Discovered;
                warn!("Login failed: {}", e);
                Err(e)
            }
        }
    }

    fn fetch_keys(&self) -> Result<AccessKeys> {
        let host = self.host().ok_or(MimecastError::InvalidState {
            expected: SessionState::Discovered,
            actual: SessionState::Unauthenticated,
        })?;

        let basic = STANDARD.encode(format!(
            "{}:{}",
            self.credentials.user_name, self.credentials.user_password
        ));

        let ctx = RequestContext::fresh();
        let mut headers = self.base_headers(&ctx);
        headers.push((
            "Authorization",
            format!("{} {}", self.credentials.auth_type, basic),
        ));
        let body = json!({"data": [{"username": self.credentials.user_name}]});

        let response = self.transport.post(
            &format!("https://{}{}", host, LOGIN_PATH),
            &headers,
            serde_json::to_vec(&body)?,
        )?;
        if response.status != 200 {
            return Err(MimecastError::Auth {
                status: response.status,
            });
        }

        let data: LoginData = first_row(LOGIN_PATH, response)?;
        Ok(AccessKeys {
            access_key: data.access_key,
            secret_key: data.secret_key,
        })
    }

    /// Invalidate the key pair on the server.
    ///
    /// The session moves to `LoggedOut` whatever the server answers; the
    /// returned error is informational.
    pub fn logout(&self) -> Result<()> {
        let access_key = self.keys()?.access_key;
        let outcome = self
            .request(LOGOUT_PATH, &json!({"data": [{"accessKey": access_key}]}))
            .map(|_| ());

        {
            let mut inner = self.write();
            inner.state = SessionState::LoggedOut;
            inner.keys = None;
        }

        match &outcome {
            Ok(()) => info!("Logout successful"),
            Err(e) => warn!("Logout failed: {}", e),
        }
        outcome
    }

    /// Signed JSON call. Any status other than 200 is a `Request` error.
    pub fn request(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self.signed_post(path, body)?;
        if response.status != 200 {
            debug!("{} failed with status {}", path, response.status);
            return Err(MimecastError::Request {
                path: path.to_string(),
                status: response.status,
            });
        }

        let value: Value = serde_json::from_reader(response.body)?;
        if let Some(fail) = value.get("fail").and_then(Value::as_array)
            && !fail.is_empty()
        {
            return Err(MimecastError::Api {
                path: path.to_string(),
                errors: fail_messages(fail),
            });
        }
        Ok(value)
    }

    /// Signed call returning the raw body, for binary downloads
    pub fn request_stream(&self, path: &str, body: &Value) -> Result<Box<dyn Read>> {
        let response = self.signed_post(path, body)?;
        if response.status != 200 {
            return Err(MimecastError::Request {
                path: path.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    fn signed_post(&self, path: &str, body: &Value) -> Result<HttpResponse> {
        let keys = self.keys()?;
        let host = self.host().ok_or(MimecastError::InvalidState {
            expected: SessionState::Authenticated,
            actual: SessionState::Unauthenticated,
        })?;

        let ctx = RequestContext::fresh();
        let signature = sign(
            &ctx.date,
            &ctx.request_id,
            path,
            &self.credentials.application_key,
            &keys.secret_key,
        )?;

        let mut headers = self.base_headers(&ctx);
        headers.push((
            "Authorization",
            authorization_header(&keys.access_key, &signature),
        ));

        debug!("Connecting to {} (request id {})", path, ctx.request_id);
        self.transport.post(
            &format!("https://{}{}", host, path),
            &headers,
            serde_json::to_vec(body)?,
        )
    }

    fn keys(&self) -> Result<AccessKeys> {
        let inner = self.read();
        match (&inner.keys, inner.state) {
            (Some(keys), SessionState::Authenticated) => Ok(keys.clone()),
            (_, actual) => Err(MimecastError::InvalidState {
                expected: SessionState::Authenticated,
                actual,
            }),
        }
    }

    fn base_headers(&self, ctx: &RequestContext) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_APP_ID, self.credentials.application_id.clone()),
            (HEADER_REQUEST_ID, ctx.request_id.clone()),
            (HEADER_DATE, ctx.date.clone()),
            ("Content-Type", "application/json".to_string()),
        ]
    }

    fn transition(&self, expected: SessionState, next: SessionState) -> Result<()> {
        let mut inner = self.write();
        if inner.state != expected {
            return Err(MimecastError::InvalidState {
                expected,
                actual: inner.state,
            });
        }
        inner.state = next;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Authenticated session that logs out when dropped
///
/// Logout happens on every exit path: explicit [`SessionGuard::close`],
/// normal scope end, early `?` return or panic unwinding.
pub struct SessionGuard {
    session: Arc<Session>,
}

impl SessionGuard {
    /// Shared handle for components that outlive a borrow, such as a feed
    pub fn shared(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Log out now and report the outcome
    pub fn close(self) -> Result<()> {
        self.session.logout()
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.state() == SessionState::Authenticated {
            // Failures are already logged by logout
            let _ = self.session.logout();
        }
    }
}

/// Strip the scheme from the discovered API URL, keeping an explicit port
fn region_host(api: &str) -> Option<String> {
    if let Ok(url) = Url::parse(api)
        && let Some(host) = url.host_str()
    {
        return Some(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        });
    }

    let bare = api.trim().trim_end_matches('/');
    if bare.is_empty() {
        None
    } else {
        Some(bare.to_string())
    }
}

/// Parse an envelope and return its first `data` row
fn first_row<T: DeserializeOwned>(path: &str, response: HttpResponse) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_reader(response.body)?;
    if !envelope.fail.is_empty() {
        return Err(MimecastError::Api {
            path: path.to_string(),
            errors: fail_messages(&envelope.fail),
        });
    }
    envelope
        .data
        .into_iter()
        .next()
        .ok_or_else(|| MimecastError::malformed(path, "response contained no data rows"))
}
