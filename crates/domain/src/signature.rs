//! Webhook authentication for both sources.
//!
//! The git host signs the exact raw request bytes with HMAC-SHA256 under a
//! pre-shared secret and sends `sha256=<hex>` in `X-Hub-Signature-256`. The
//! chat platform echoes a shared secret token in
//! `X-Telegram-Bot-Api-Secret-Token`.
//!
//! Verification never fails with an error: malformed input is simply "not
//! verified". Both comparisons run in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The only signature algorithm accepted from the git host.
pub const SIGNATURE_ALGORITHM: &str = "sha256";

fn keyed_mac(secret: &[u8], payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(mac)
}

/// Splits a `"<algorithm>=<hex>"` header into the raw digest bytes.
///
/// Returns `None` when the `=` is missing, the algorithm is not `sha256`, or
/// the digest is not valid hex.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let (algorithm, digest) = header.trim().split_once('=')?;
    if algorithm != SIGNATURE_ALGORITHM {
        return None;
    }
    hex::decode(digest).ok()
}

/// Computes the HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Option<Vec<u8>> {
    keyed_mac(secret, payload).map(|mac| mac.finalize().into_bytes().to_vec())
}

/// Formats raw digest bytes as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_ALGORITHM}={}", hex::encode(signature))
}

/// Signs `payload` and formats the header value in one step.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> Option<String> {
    compute_signature(payload, secret).map(|sig| format_signature_header(&sig))
}

/// Verifies a git-host signature header against the raw body.
///
/// An absent header, a malformed header, or an unsupported algorithm all
/// yield `false`.
pub fn verify_hub_signature(payload: &[u8], signature_header: Option<&str>, secret: &[u8]) -> bool {
    let Some(expected) = signature_header.and_then(parse_signature_header) else {
        return false;
    };
    match keyed_mac(secret, payload) {
        Some(mac) => mac.verify_slice(&expected).is_ok(),
        None => false,
    }
}

/// Outcome of checking the chat platform's shared secret token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// The provided token matches the configured one.
    Verified,
    /// No secret is configured; the source is admitted unauthenticated.
    Unconfigured,
    /// The token is missing or does not match.
    Rejected,
}

/// Compares the provided chat-platform token against configuration.
///
/// An empty configured secret counts as unconfigured.
pub fn verify_shared_token(configured: Option<&str>, provided: Option<&str>) -> TokenCheck {
    let Some(configured) = configured.filter(|secret| !secret.is_empty()) else {
        return TokenCheck::Unconfigured;
    };
    match provided {
        Some(provided) if bool::from(provided.as_bytes().ct_eq(configured.as_bytes())) => {
            TokenCheck::Verified
        }
        _ => TokenCheck::Rejected,
    }
}
