//! Stripe webhook signature verification
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! Each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"` keyed with the endpoint
//! secret; any one matching is enough.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Stripe-Signature header is malformed")]
    Malformed,

    #[error("Stripe-Signature header has no v1 signature")]
    NoSignatures,

    #[error("Webhook timestamp is outside the tolerance window")]
    Stale,

    #[error("No signature matches the payload")]
    Mismatch,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?),
            // Unparseable signatures are skipped, like unknown schemes
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::NoSignatures);
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn signer(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify a webhook delivery against the endpoint secret.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;

    if (now - parsed.timestamp).abs() > tolerance_seconds {
        return Err(SignatureError::Stale);
    }

    let mac = signer(secret, parsed.timestamp, payload)?;
    // verify_slice compares in constant time
    if parsed
        .signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok())
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Header value Stripe would send for `payload` at `timestamp`.
#[cfg(test)]
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let sig = signer(secret, timestamp, payload)
        .expect("valid key")
        .finalize()
        .into_bytes();
    format!("t={},v1={}", timestamp, hex::encode(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"invoice.paid"}"#;

    #[test]
    fn accepts_valid_signature() {
        let header = sign(BODY, SECRET, NOW);
        assert_eq!(verify_signature(BODY, &header, SECRET, 300, NOW + 10), Ok(()));
    }

    #[test]
    fn any_v1_may_match() {
        let valid = sign(BODY, SECRET, NOW);
        let good_sig = valid.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), good_sig);
        assert_eq!(verify_signature(BODY, &header, SECRET, 300, NOW), Ok(()));
    }

    #[test]
    fn rejects_tampered_body_and_wrong_secret() {
        let header = sign(BODY, SECRET, NOW);
        assert_eq!(
            verify_signature(b"{}", &header, SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(BODY, &header, "whsec_other", 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = sign(BODY, SECRET, NOW);
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 300, NOW + 301),
            Err(SignatureError::Stale)
        );
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 300, NOW - 301),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(
            verify_signature(BODY, "v1=abcd", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(BODY, &format!("t={}", NOW), SECRET, 300, NOW),
            Err(SignatureError::NoSignatures)
        );
        assert_eq!(
            verify_signature(BODY, &format!("t={},v1=zz", NOW), SECRET, 300, NOW),
            Err(SignatureError::NoSignatures)
        );
        assert_eq!(
            verify_signature(BODY, "t=soon,v1=00", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
    }
}
