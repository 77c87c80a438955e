//! Document ids and password digests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use cg_models::AccountId;

use crate::error::{StoreError, StoreResult};

/// Separator between key parts; cannot appear in an email or a trimmed gate name.
const KEY_SEPARATOR: char = '\u{1f}';

fn hex_digest(input: &[u8]) -> String {
    Sha256::digest(input)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Deterministic document id for a per-gate record.
pub fn gate_doc_id(account: &AccountId, gate: &str) -> String {
    hex_digest(format!("{}{}{}", account.as_str(), KEY_SEPARATOR, gate).as_bytes())
}

/// Document id for a user record.
pub fn user_doc_id(account: &AccountId) -> String {
    hex_digest(account.as_str().as_bytes())
}

type HmacSha256 = Hmac<Sha256>;

/// Password digest stored as `hmac-sha256$<salt>$<base64 mac>`.
///
/// The random salt is the HMAC key. Errors only if the key is rejected.
pub fn hash_password(password: &str) -> StoreResult<String> {
    let salt = Uuid::new_v4().simple().to_string();
    let mac = keyed_mac(&salt, password)?;
    Ok(format!(
        "hmac-sha256${}${}",
        salt,
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    ))
}

/// Check `password` against a stored digest in constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (salt, expected) = match (parts.next(), parts.next(), parts.next()) {
        (Some("hmac-sha256"), Some(salt), Some(expected)) => (salt, expected),
        _ => return false,
    };
    let expected = match URL_SAFE_NO_PAD.decode(expected) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    match keyed_mac(salt, password) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

fn keyed_mac(salt: &str, password: &str) -> StoreResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|e| StoreError::Config(format!("Invalid password salt: {}", e)))?;
    mac.update(password.as_bytes());
    Ok(mac)
}
