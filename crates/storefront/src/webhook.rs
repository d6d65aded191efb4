//! Inbound webhook signature verification.
//!
//! Both senders use the same scheme: a header of the form
//! `t=<unix seconds>,v1=<signature>[,v1=<signature>...]` where each signature
//! is HMAC-SHA256 over `"<t>.<raw body>"`. They differ only in how the MAC is
//! encoded: hex for the payment processor, unpadded URL-safe base64 for the
//! CMS.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

/// Payment processor signature header.
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// CMS signature header.
pub const CMS_SIGNATURE_HEADER: &str = "sanity-webhook-signature";

/// Maximum age of a signed timestamp, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Why a webhook was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    Malformed(&'static str),

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,
}

/// How the MAC is written in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    Hex,
    Base64Url,
}

/// Verifies signed webhook deliveries for one sender.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    encoding: SignatureEncoding,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("encoding", &self.encoding)
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString, encoding: SignatureEncoding) -> Self {
        Self {
            secret,
            encoding,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Verify a delivery against the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first check that failed.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(header, body, chrono::Utc::now().timestamp())
    }

    /// Verify a delivery as if the time were `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first check that failed.
    pub fn verify_at(&self, header: Option<&str>, body: &[u8], now: i64) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;
        let (timestamp, candidates) = parse_header(header)?;

        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        let expected = self.sign(timestamp, body);
        if candidates
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate.trim_end_matches('=')))
        {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Encoded signature for `body` at `timestamp`.
    #[must_use]
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        // HMAC accepts keys of any length.
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let digest = mac.finalize().into_bytes();

        match self.encoding {
            SignatureEncoding::Hex => hex::encode(digest),
            SignatureEncoding::Base64Url => URL_SAFE_NO_PAD.encode(digest),
        }
    }

    /// Full header value for `body` at `timestamp`, as a sender would write it.
    #[must_use]
    pub fn header_value(&self, timestamp: i64, body: &[u8]) -> String {
        format!("t={timestamp},v1={}", self.sign(timestamp, body))
    }
}

/// Split a header into its timestamp and `v1` signatures.
fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::Malformed("timestamp is not a number"))?,
                );
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed("missing v1 signature"));
    }
    Ok((timestamp, signatures))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_767_225_600;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    fn verifier(encoding: SignatureEncoding) -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from("whsec_k3y"), encoding)
    }

    #[test]
    fn test_valid_hex_signature() {
        let v = verifier(SignatureEncoding::Hex);
        let header = v.header_value(NOW, BODY);
        assert!(v.verify_at(Some(&header), BODY, NOW + 10).is_ok());
    }

    #[test]
    fn test_valid_base64_signature_with_padding() {
        let v = verifier(SignatureEncoding::Base64Url);
        let header = format!("t={NOW},v1={}=", v.sign(NOW, BODY));
        assert!(v.verify_at(Some(&header), BODY, NOW).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let v = verifier(SignatureEncoding::Hex);
        let header = format!("t={NOW},v1=deadbeef,v1={}", v.sign(NOW, BODY));
        assert!(v.verify_at(Some(&header), BODY, NOW).is_ok());
    }

    #[test]
    fn test_tampered_body() {
        let v = verifier(SignatureEncoding::Hex);
        let header = v.header_value(NOW, BODY);
        assert_eq!(
            v.verify_at(Some(&header), b"{}", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let header = verifier(SignatureEncoding::Hex).header_value(NOW, BODY);
        let other = WebhookVerifier::new(SecretString::from("whsec_other"), SignatureEncoding::Hex);
        assert_eq!(
            other.verify_at(Some(&header), BODY, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_expired_timestamp() {
        let v = verifier(SignatureEncoding::Hex);
        let header = v.header_value(NOW, BODY);
        assert_eq!(
            v.verify_at(Some(&header), BODY, NOW + DEFAULT_TOLERANCE_SECS + 1),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let v = verifier(SignatureEncoding::Hex);
        assert_eq!(v.verify_at(None, BODY, NOW), Err(SignatureError::MissingHeader));
        assert!(matches!(
            v.verify_at(Some("v1=abc"), BODY, NOW),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            v.verify_at(Some("t=soon,v1=abc"), BODY, NOW),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            v.verify_at(Some(&format!("t={NOW}")), BODY, NOW),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let output = format!("{:?}", verifier(SignatureEncoding::Hex));
        assert!(!output.contains("whsec_k3y"));
    }
}
