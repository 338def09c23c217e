//! Canonical payload signing with HMAC-SHA256.
//!
//! Payloads are serialized with a fixed field order before signing so that
//! sign and verify agree byte-for-byte.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature on outbound webhook deliveries.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// The canonical data structure encoded for the paying client. Field order is
/// the canonical serialization order; expiry is unix seconds so the bytes are
/// stable across serializers.
#[derive(Debug, Clone, Serialize)]
pub struct QrPayload {
    pub id: Uuid,
    #[serde(rename = "ref")]
    pub reference: String,
    pub no: i64,
    pub tenant_name: String,
    pub amount: i64,
    pub expires_at: i64,
}

/// Deterministic serialization of a payload: struct fields in declaration
/// order, no whitespace.
pub fn canonical_bytes<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

/// Hex-encoded HMAC-SHA256 over `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex signature against `payload`.
pub fn verify(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time equality of two signature strings.
pub fn signatures_match(presented: &str, stored: &str) -> bool {
    let (a, b) = (presented.as_bytes(), stored.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Mint a fresh webhook/endpoint secret (256 bits of randomness).
pub fn generate_secret() -> String {
    format!(
        "whsec_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// Masked form for API exposure: first and last four characters only.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QrPayload {
        QrPayload {
            id: Uuid::new_v4(),
            reference: "ORD-1".to_string(),
            no: 42,
            tenant_name: "Acme Coffee".to_string(),
            amount: 1500,
            expires_at: 1_790_000_000,
        }
    }

    #[test]
    fn sign_verify_round_trip() {
        let bytes = canonical_bytes(&payload()).unwrap();
        let sig = sign("secret", &bytes);
        assert!(verify("secret", &bytes, &sig));
    }

    #[test]
    fn verification_fails_for_wrong_key() {
        let bytes = canonical_bytes(&payload()).unwrap();
        let sig = sign("secret", &bytes);
        assert!(!verify("other-secret", &bytes, &sig));
    }

    #[test]
    fn verification_fails_when_payload_is_mutated() {
        let mut p = payload();
        let bytes = canonical_bytes(&p).unwrap();
        let sig = sign("secret", &bytes);

        p.amount += 1;
        let mutated = canonical_bytes(&p).unwrap();
        assert!(!verify("secret", &mutated, &sig));
    }

    #[test]
    fn verification_rejects_malformed_hex() {
        let bytes = canonical_bytes(&payload()).unwrap();
        assert!(!verify("secret", &bytes, "not-hex"));
        assert!(!verify("secret", &bytes, ""));
    }

    #[test]
    fn canonical_bytes_are_stable() {
        let p = payload();
        assert_eq!(
            canonical_bytes(&p).unwrap(),
            canonical_bytes(&p.clone()).unwrap()
        );
    }

    #[test]
    fn canonical_field_order_is_fixed() {
        let p = payload();
        let text = String::from_utf8(canonical_bytes(&p).unwrap()).unwrap();
        let order = ["\"id\"", "\"ref\"", "\"no\"", "\"tenant_name\"", "\"amount\"", "\"expires_at\""];
        let positions: Vec<usize> = order.iter().map(|k| text.find(k).unwrap()).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn signature_equality_is_exact() {
        assert!(signatures_match("abcd", "abcd"));
        assert!(!signatures_match("abcd", "abce"));
        assert!(!signatures_match("abcd", "abcde"));
        assert!(!signatures_match("", "a"));
    }

    #[test]
    fn generated_secrets_are_distinct_and_prefixed() {
        let a = generate_secret();
        let b = generate_secret();
        assert!(a.starts_with("whsec_"));
        assert_eq!(a.len(), "whsec_".len() + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn masking_hides_the_middle() {
        let masked = mask_secret("whsec_0123456789abcdef");
        assert_eq!(masked, "whse...cdef");
        assert_eq!(mask_secret("short"), "****");
    }
}
