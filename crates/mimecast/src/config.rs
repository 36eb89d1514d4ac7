//! Configuration loading for the Mimecast client
//!
//! Supports loading credentials from (in order of priority):
//! 1. JSON file in the shared config directory
//! 2. Runtime environment variables (fallback)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credentials filename in the config directory
const CREDENTIALS_FILE: &str = "mimecast-credentials.json";

/// Global discovery endpoint, valid for every region
pub const DEFAULT_DISCOVERY_URL: &str =
    "https://api.mimecast.com/api/login/discover-authentication";

/// Authentication scheme used when none is configured
pub const DEFAULT_AUTH_TYPE: &str = "Basic-Cloud";

/// Account and application credentials for one session
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub user_name: String,
    pub user_password: String,
    pub application_id: String,
    pub application_key: String,
    /// `Basic-Cloud` or `Basic-AD`
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
}

fn default_auth_type() -> String {
    DEFAULT_AUTH_TYPE.to_string()
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("user_password", &"<redacted>")
            .field("application_id", &self.application_id)
            .field("application_key", &"<redacted>")
            .field("auth_type", &self.auth_type)
            .finish()
    }
}

impl Credentials {
    /// Create credentials with the default auth type
    pub fn new(
        user_name: impl Into<String>,
        user_password: impl Into<String>,
        application_id: impl Into<String>,
        application_key: impl Into<String>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            user_password: user_password.into(),
            application_id: application_id.into(),
            application_key: application_key.into(),
            auth_type: default_auth_type(),
        }
    }

    pub fn with_auth_type(mut self, auth_type: impl Into<String>) -> Self {
        self.auth_type = auth_type.into();
        self
    }

    /// Load credentials from the config file, falling back to environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: Credentials = config::load_json(CREDENTIALS_FILE)?;
            return creds.validated();
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: Credentials = config::load_json_file(path)?;
        creds.validated()
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: Credentials =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        creds.validated()
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).with_context(|| format!("{} environment variable not set", name))
        };

        let creds = Self::new(
            var("MIMECAST_USER")?,
            var("MIMECAST_PASSWORD")?,
            var("MIMECAST_APP_ID")?,
            var("MIMECAST_APP_KEY")?,
        );
        let creds = match std::env::var("MIMECAST_AUTH_TYPE") {
            Ok(auth_type) if !auth_type.is_empty() => creds.with_auth_type(auth_type),
            _ => creds,
        };
        creds.validated()
    }

    /// Get the default credentials file path
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    fn validated(self) -> Result<Self> {
        let missing = [
            ("userName", &self.user_name),
            ("userPassword", &self.user_password),
            ("applicationId", &self.application_id),
            ("applicationKey", &self.application_key),
            ("authType", &self.auth_type),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if !missing.is_empty() {
            anyhow::bail!("Credentials are missing: {}", missing.join(", "));
        }
        Ok(self)
    }
}

/// Transport-level options for a session
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub discovery_url: String,
    /// Upper bound on a single HTTP call; `None` waits forever
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            request_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_credentials() {
        let json = r#"{
            "userName": "svc-api@example.com",
            "userPassword": "pw",
            "applicationId": "app-id",
            "applicationKey": "app-key",
            "authType": "Basic-AD"
        }"#;

        let creds = Credentials::from_json(json).unwrap();
        assert_eq!(creds.user_name, "svc-api@example.com");
        assert_eq!(creds.auth_type, "Basic-AD");
    }

    #[test]
    fn test_auth_type_defaults() {
        let json = r#"{
            "userName": "svc-api@example.com",
            "userPassword": "pw",
            "applicationId": "app-id",
            "applicationKey": "app-key"
        }"#;

        let creds = Credentials::from_json(json).unwrap();
        assert_eq!(creds.auth_type, "Basic-Cloud");
    }

    #[test]
    fn test_empty_field_rejected() {
        let json = r#"{
            "userName": "svc-api@example.com",
            "userPassword": "",
            "applicationId": "app-id",
            "applicationKey": "app-key"
        }"#;

        let err = Credentials::from_json(json).unwrap_err();
        assert!(err.to_string().contains("userPassword"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"userName":"u@example.com","userPassword":"p","applicationId":"i","applicationKey":"k"}}"#
        )
        .unwrap();

        let creds = Credentials::from_file(file.path()).unwrap();
        assert_eq!(creds.application_id, "i");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("u@example.com", "hunter2", "app", "very-secret");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("u@example.com"));
    }

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.discovery_url, DEFAULT_DISCOVERY_URL);
        assert_eq!(options.request_timeout, Some(Duration::from_secs(60)));
    }
}
