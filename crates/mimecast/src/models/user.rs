//! Internal user directory entries

use serde::{Deserialize, Serialize};

/// One internal user or alias known to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalUser {
    pub email_address: String,
    #[serde(default)]
    pub alias: bool,
    pub name: Option<String>,
    pub address_type: Option<String>,
}
