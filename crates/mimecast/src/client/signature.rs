//! Request signing
//!
//! Every call after login carries `Authorization: MC <accessKey>:<signature>`
//! where the signature is an HMAC-SHA1 over
//! `date:requestId:path:applicationKey`, keyed with the base64-decoded
//! secret key handed out at login.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::SignatureError;

type HmacSha1 = Hmac<Sha1>;

/// Compute the base64 signature for one request.
///
/// Pure function of its inputs, so a fixed date and request id always
/// produce the same output.
///
/// # Errors
/// Returns `SignatureError::Decode` if `secret_key` is not valid base64.
pub fn sign(
    date: &str,
    request_id: &str,
    path: &str,
    application_key: &str,
    secret_key: &str,
) -> Result<String, SignatureError> {
    let key = STANDARD.decode(secret_key)?;
    let mut mac = HmacSha1::new_from_slice(&key).map_err(|_| SignatureError::KeyLength)?;

    let message = [date, request_id, path, application_key].join(":");
    mac.update(message.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Build the full Authorization header value for a signed request
pub fn authorization_header(access_key: &str, signature: &str) -> String {
    format!("MC {}:{}", access_key, signature)
}
