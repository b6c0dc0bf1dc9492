//! HMAC-SHA256 webhook signatures.
//!
//! Stripe: `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`, MAC over `"{t}.{body}"`
//! keyed with the endpoint secret. Crypto Pay: hex MAC over the raw body keyed with
//! `SHA-256(api token)`. Comparisons go through `Mac::verify_slice`, which is
//! constant-time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header: {0}")]
    MalformedHeader(&'static str),
    #[error("signature timestamp is {age_secs}s old")]
    Expired { age_secs: i64 },
    #[error("signature does not match")]
    Mismatch,
    #[error("signing secret is not configured")]
    MissingSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl StripeSignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader("non-numeric timestamp"))?;
                    timestamp = Some(t);
                }
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(SignatureError::MalformedHeader("missing v1 signature"));
        }
        Ok(Self { timestamp, signatures })
    }
}

fn stripe_mac(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Accepts when any `v1` entry matches and the timestamp is at most `tolerance` old.
pub fn verify_stripe_signature(
    body: &[u8],
    header: Option<&str>,
    secret: &str,
    now: i64,
    tolerance: Duration,
) -> Result<(), SignatureError> {
    let header = StripeSignatureHeader::parse(header.ok_or(SignatureError::MissingHeader)?)?;

    let age_secs = now
        .checked_sub(header.timestamp)
        .ok_or(SignatureError::MalformedHeader("timestamp out of range"))?;
    if age_secs > tolerance.as_secs() as i64 {
        return Err(SignatureError::Expired { age_secs });
    }

    let mac = stripe_mac(secret, header.timestamp, body)?;
    let matched = header.signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched { Ok(()) } else { Err(SignatureError::Mismatch) }
}

/// Builds a `Stripe-Signature` header value.
pub fn stripe_signature_header(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let mac = stripe_mac(secret, timestamp, body)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

fn crypto_pay_mac(api_token: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    if api_token.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let key = Sha256::digest(api_token.as_bytes());
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(body);
    Ok(mac)
}

pub fn verify_crypto_pay_signature(body: &[u8], header: Option<&str>, api_token: &str) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;
    let expected = hex::decode(header.trim()).map_err(|_| SignatureError::MalformedHeader("not hex"))?;
    crypto_pay_mac(api_token, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

pub fn crypto_pay_signature(api_token: &str, body: &[u8]) -> Result<String, SignatureError> {
    Ok(hex::encode(crypto_pay_mac(api_token, body)?.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"checkout.session.completed"}"#;
    const NOW: i64 = 1_760_000_000;

    #[test]
    fn header_parsing() {
        let h = StripeSignatureHeader::parse("t=12, v1=aa,v0=zz,v1=bb").unwrap();
        assert_eq!(h.timestamp, 12);
        assert_eq!(h.signatures, vec!["aa", "bb"]);

        assert_eq!(
            StripeSignatureHeader::parse("v1=aa"),
            Err(SignatureError::MalformedHeader("missing timestamp"))
        );
        assert_eq!(
            StripeSignatureHeader::parse("t=abc,v1=aa"),
            Err(SignatureError::MalformedHeader("non-numeric timestamp"))
        );
        assert_eq!(
            StripeSignatureHeader::parse("t=12"),
            Err(SignatureError::MalformedHeader("missing v1 signature"))
        );
    }

    #[test]
    fn accepts_fresh_valid_signature() {
        let header = stripe_signature_header(SECRET, NOW - 10, BODY).unwrap();
        assert_eq!(verify_stripe_signature(BODY, Some(&header), SECRET, NOW, STRIPE_TOLERANCE), Ok(()));
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let valid = stripe_signature_header(SECRET, NOW, BODY).unwrap();
        let v1 = valid.split_once(",v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), v1);
        assert_eq!(verify_stripe_signature(BODY, Some(&header), SECRET, NOW, STRIPE_TOLERANCE), Ok(()));
    }

    #[test]
    fn stale_timestamp_is_rejected_even_with_correct_mac() {
        let header = stripe_signature_header(SECRET, NOW - 301, BODY).unwrap();
        assert_eq!(
            verify_stripe_signature(BODY, Some(&header), SECRET, NOW, STRIPE_TOLERANCE),
            Err(SignatureError::Expired { age_secs: 301 })
        );
        let edge = stripe_signature_header(SECRET, NOW - 300, BODY).unwrap();
        assert!(verify_stripe_signature(BODY, Some(&edge), SECRET, NOW, STRIPE_TOLERANCE).is_ok());
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        let header = format!("t={},v1=00", i64::MIN);
        assert_eq!(
            verify_stripe_signature(b"{}", Some(&header), "whsec", 1_760_000_000, STRIPE_TOLERANCE),
            Err(SignatureError::MalformedHeader("timestamp out of range"))
        );
        let far_future = format!("t={},v1=00", i64::MAX);
        assert_eq!(
            verify_stripe_signature(b"{}", Some(&far_future), "whsec", -2, STRIPE_TOLERANCE),
            Err(SignatureError::MalformedHeader("timestamp out of range"))
        );
    }

    #[test]
    fn wrong_mac_is_rejected_even_when_fresh() {
        let header = stripe_signature_header("whsec_other", NOW, BODY).unwrap();
        assert_eq!(
            verify_stripe_signature(BODY, Some(&header), SECRET, NOW, STRIPE_TOLERANCE),
            Err(SignatureError::Mismatch)
        );
        let tampered = stripe_signature_header(SECRET, NOW, b"{}").unwrap();
        assert_eq!(
            verify_stripe_signature(BODY, Some(&tampered), SECRET, NOW, STRIPE_TOLERANCE),
            Err(SignatureError::Mismatch)
        );
        let not_hex = format!("t={},v1=zz", NOW);
        assert_eq!(
            verify_stripe_signature(BODY, Some(&not_hex), SECRET, NOW, STRIPE_TOLERANCE),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn missing_header_and_secret() {
        assert_eq!(
            verify_stripe_signature(BODY, None, SECRET, NOW, STRIPE_TOLERANCE),
            Err(SignatureError::MissingHeader)
        );
        let header = format!("t={},v1=00", NOW);
        assert_eq!(
            verify_stripe_signature(BODY, Some(&header), "", NOW, STRIPE_TOLERANCE),
            Err(SignatureError::MissingSecret)
        );
    }

    #[test]
    fn crypto_pay_signature_round_trip() {
        let token = "1234:AAAbbb";
        let sig = crypto_pay_signature(token, BODY).unwrap();
        assert_eq!(verify_crypto_pay_signature(BODY, Some(&sig), token), Ok(()));
        assert_eq!(
            verify_crypto_pay_signature(b"{}", Some(&sig), token),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_crypto_pay_signature(BODY, Some(&sig), "other"),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_crypto_pay_signature(BODY, Some("xyz"), token),
            Err(SignatureError::MalformedHeader("not hex"))
        );
        assert_eq!(
            verify_crypto_pay_signature(BODY, None, token),
            Err(SignatureError::MissingHeader)
        );
    }
}
