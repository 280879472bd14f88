use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::OnceLock;

/// Global HMAC key for cursor signing
static HMAC_KEY: OnceLock<Vec<u8>> = OnceLock::new();

fn random_key() -> Vec<u8> {
    let key: [u8; 32] = rand::random();
    key.to_vec()
}

/// Initialize the HMAC key for cursor signing
/// If secret is None, generates a random key (WARNING: cursors won't survive restarts)
pub fn init_cursor_hmac_key(secret: Option<&str>) {
    let key = match secret {
        Some(s) => s.as_bytes().to_vec(),
        None => {
            tracing::warn!("CURSOR_HMAC_SECRET not set, recent-visit cursors will not survive restarts");
            random_key()
        }
    };

    HMAC_KEY.get_or_init(|| key);
}

fn get_hmac_key() -> &'static [u8] {
    HMAC_KEY.get_or_init(random_key)
}

/// Position of the last visit on a page of the newest-first listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub visit_time: i64,
    pub id: i64,
}

fn sign(payload: &str) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(get_hmac_key())
        .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Create a signed cursor from data
pub fn create_cursor(data: &CursorData) -> Result<String> {
    let json = serde_json::to_string(data)?;
    let payload = BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes());
    let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(sign(&payload)?);

    Ok(format!("{}.{}", payload, signature_b64))
}

/// Verify and decode a cursor
pub fn verify_cursor(cursor: &str) -> Result<CursorData> {
    let (payload, signature_b64) = cursor
        .split_once('.')
        .filter(|(_, sig)| !sig.contains('.'))
        .ok_or_else(|| anyhow!("Invalid cursor format"))?;

    let expected = sign(payload)?;
    let provided = BASE64_URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| anyhow!("Invalid cursor signature encoding"))?;

    // Constant-time comparison
    use subtle::ConstantTimeEq;
    if !bool::from(expected.ct_eq(&provided[..])) {
        return Err(anyhow!("Cursor signature verification failed"));
    }

    let json_bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| anyhow!("Invalid cursor payload encoding"))?;
    serde_json::from_slice(&json_bytes).map_err(|_| anyhow!("Invalid cursor data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_create_and_verify() {
        init_cursor_hmac_key(Some("test_secret_key_for_hmac_signing"));

        let data = CursorData {
            visit_time: 1_700_000_000_123,
            id: 42,
        };

        let cursor = create_cursor(&data).unwrap();
        let verified = verify_cursor(&cursor).unwrap();

        assert_eq!(verified, data);
    }

    #[test]
    fn test_cursor_tampering_detection() {
        init_cursor_hmac_key(Some("test_secret_key_for_hmac_signing"));

        let cursor = create_cursor(&CursorData {
            visit_time: 1_700_000_000_123,
            id: 42,
        })
        .unwrap();

        let (payload, _) = cursor.split_once('.').unwrap();
        let tampered = format!("{}.invalid_signature", payload);
        assert!(verify_cursor(&tampered).is_err());

        let forged_payload = BASE64_URL_SAFE_NO_PAD.encode(br#"{"visit_time":0,"id":1}"#);
        let (_, signature) = cursor.split_once('.').unwrap();
        assert!(verify_cursor(&format!("{}.{}", forged_payload, signature)).is_err());
    }

    #[test]
    fn test_cursor_invalid_format() {
        assert!(verify_cursor("invalid").is_err());
        assert!(verify_cursor("invalid.format.extra").is_err());
    }
}
