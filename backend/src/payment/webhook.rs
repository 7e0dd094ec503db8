//! Webhook signature verification
//!
//! Signature: `hex(hmac_sha256(secret, body))`, sent in
//! `X-Webhook-Signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

fn keyed(secret: &str) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).ok()
}

pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = keyed(secret)?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex signature against the body; the tag comparison is constant-time
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Some(mut mac) = keyed(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"type":"checkout.session.completed","session_id":"cs_1"}"#;
        let signature = sign("whsec", body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify("whsec", body, &signature));
        assert!(verify("whsec", body, &signature.to_uppercase()));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let body = b"{}";
        let signature = sign("whsec", body).unwrap();
        assert!(!verify("other", body, &signature));
        assert!(!verify("whsec", b"{ }", &signature));
        assert!(!verify("whsec", body, "deadbeef"));
        assert!(!verify("whsec", body, "not hex"));
    }

    #[test]
    fn extended_body_fails() {
        let body = br#"{"type":"checkout.session.completed","session_id":"cs_1"}"#;
        let signature = sign("whsec", body).unwrap();
        let mut extended = body.to_vec();
        extended.extend_from_slice(b"\x80\x00\x00{}");
        assert!(!verify("whsec", &extended, &signature));
    }

    #[test]
    fn matches_reference_hmac() {
        // RFC 4231 test case 2
        let signature = sign("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
