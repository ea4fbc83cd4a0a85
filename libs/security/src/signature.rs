//! Slack request signing (`v0` scheme).
//!
//! Slack signs every webhook with `HMAC-SHA256(secret, "v0:" + timestamp + ":" + body)` and sends
//! the hex digest as `X-Slack-Signature: v0=<hex>` next to `X-Slack-Request-Timestamp`.

use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
pub const SIGNATURE_VERSION: &str = "v0";

/// Maximum accepted distance between the signed timestamp and the receive time.
pub const DEFAULT_SKEW: Duration = Duration::minutes(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("malformed {0} header")]
    MalformedHeader(&'static str),
    #[error("timestamp {timestamp} outside of the accepted window (now {now})")]
    Stale { timestamp: i64, now: i64 },
    #[error("signature mismatch")]
    Mismatch,
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// The header half of a signed request, captured before the body is read.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    timestamp: String,
    signature: Vec<u8>,
}

impl SignedHeaders {
    /// Extracts and sanity-checks the signing headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SignatureError> {
        let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
        timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::MalformedHeader(TIMESTAMP_HEADER))?;

        let declared = header_str(headers, SIGNATURE_HEADER)?;
        let hex_digest = declared
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or(SignatureError::MalformedHeader(SIGNATURE_HEADER))?;
        let signature =
            hex::decode(hex_digest).map_err(|_| SignatureError::MalformedHeader(SIGNATURE_HEADER))?;

        Ok(Self {
            timestamp: timestamp.to_string(),
            signature,
        })
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    let value = headers
        .get(name)
        .ok_or(SignatureError::MissingHeader(name))?
        .to_str()
        .map_err(|_| SignatureError::MalformedHeader(name))?
        .trim();
    if value.is_empty() {
        return Err(SignatureError::MissingHeader(name));
    }
    Ok(value)
}

/// Verifies Slack signatures for one signing secret.
///
/// ```
/// use security::signature::SlackVerifier;
/// use time::OffsetDateTime;
///
/// let verifier = SlackVerifier::new("secret");
/// let now = OffsetDateTime::now_utc();
/// let (ts, sig) = verifier.sign(now.unix_timestamp(), b"token=abc");
/// let mut headers = http::HeaderMap::new();
/// headers.insert("X-Slack-Request-Timestamp", ts.parse().unwrap());
/// headers.insert("X-Slack-Signature", sig.parse().unwrap());
/// assert!(verifier.verify(&headers, b"token=abc", now).is_ok());
/// ```
#[derive(Clone)]
pub struct SlackVerifier {
    secret: String,
    skew: Duration,
}

impl std::fmt::Debug for SlackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackVerifier")
            .field("secret", &"<redacted>")
            .field("skew", &self.skew)
            .finish()
    }
}

impl SlackVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            skew: DEFAULT_SKEW,
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Checks the declared timestamp against `received_at`.
    pub fn check_freshness(
        &self,
        headers: &SignedHeaders,
        received_at: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        let timestamp = headers
            .timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::MalformedHeader(TIMESTAMP_HEADER))?;
        let now = received_at.unix_timestamp();
        if now.abs_diff(timestamp) > self.skew.whole_seconds().unsigned_abs() {
            return Err(SignatureError::Stale { timestamp, now });
        }
        Ok(())
    }

    /// Compares the declared signature with the one computed over `body`.
    pub fn ensure(&self, headers: &SignedHeaders, body: &[u8]) -> Result<(), SignatureError> {
        let expected = self.digest(&headers.timestamp, body)?;
        if expected.ct_eq(headers.signature.as_slice()).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Full check of a buffered request.
    pub fn verify(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        received_at: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        let signed = SignedHeaders::from_headers(headers)?;
        self.check_freshness(&signed, received_at)?;
        self.ensure(&signed, body)
    }

    /// Produces `(timestamp, signature)` header values for `body`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> (String, String) {
        let ts = timestamp.to_string();
        let digest = self.digest(&ts, body).unwrap_or_default();
        (ts, format!("{SIGNATURE_VERSION}={}", hex::encode(digest)))
    }

    fn digest(&self, timestamp: &str, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(ts: &str, sig: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, ts.parse().unwrap());
        headers.insert(SIGNATURE_HEADER, sig.parse().unwrap());
        headers
    }

    #[test]
    fn accepts_signature_computed_by_hand() {
        let secret = "top-secret";
        let timestamp = "1700000000";
        let body = br#"payload=%7B%7D"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("v0:{timestamp}:{}", String::from_utf8_lossy(body)).as_bytes());
        let signature = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

        let received = OffsetDateTime::from_unix_timestamp(1_700_000_030).unwrap();
        let verifier = SlackVerifier::new(secret);
        assert!(verifier.verify(&headers(timestamp, &signature), body, received).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let verifier = SlackVerifier::new("secret");
        let now = OffsetDateTime::now_utc();
        let (ts, sig) = verifier.sign(now.unix_timestamp(), b"text=help");
        let err = verifier
            .verify(&headers(&ts, &sig), b"text=resolve", now)
            .unwrap_err();
        assert_eq!(err, SignatureError::Mismatch);
    }

    #[test]
    fn rejects_signature_from_other_secret() {
        let now = OffsetDateTime::now_utc();
        let (ts, sig) = SlackVerifier::new("other").sign(now.unix_timestamp(), b"body");
        let err = SlackVerifier::new("secret")
            .verify(&headers(&ts, &sig), b"body", now)
            .unwrap_err();
        assert_eq!(err, SignatureError::Mismatch);
    }

    #[test]
    fn rejects_timestamp_shifted_after_signing() {
        let verifier = SlackVerifier::new("secret");
        let now = OffsetDateTime::now_utc();
        let (_, sig) = verifier.sign(now.unix_timestamp(), b"body");
        let shifted = (now.unix_timestamp() + 1).to_string();
        let err = verifier
            .verify(&headers(&shifted, &sig), b"body", now)
            .unwrap_err();
        assert_eq!(err, SignatureError::Mismatch);
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let verifier = SlackVerifier::new("secret");
        let now = OffsetDateTime::now_utc();
        for offset in [-301, 301] {
            let (ts, sig) = verifier.sign(now.unix_timestamp() + offset, b"body");
            let err = verifier.verify(&headers(&ts, &sig), b"body", now).unwrap_err();
            assert!(matches!(err, SignatureError::Stale { .. }), "offset {offset}");
        }
        let (ts, sig) = verifier.sign(now.unix_timestamp() - 299, b"body");
        assert!(verifier.verify(&headers(&ts, &sig), b"body", now).is_ok());
    }

    #[test]
    fn extreme_timestamps_are_stale_not_overflows() {
        let verifier = SlackVerifier::new("secret");
        let now = OffsetDateTime::now_utc();
        for ts in [i64::MIN, i64::MAX, -1, i64::MIN + 1] {
            let signed = SignedHeaders::from_headers(&headers(&ts.to_string(), "v0=00")).unwrap();
            let err = verifier.check_freshness(&signed, now).unwrap_err();
            assert_eq!(
                err,
                SignatureError::Stale {
                    timestamp: ts,
                    now: now.unix_timestamp()
                },
                "timestamp {ts}"
            );
        }
    }

    #[test]
    fn reports_missing_and_malformed_headers() {
        let verifier = SlackVerifier::new("secret");
        let now = OffsetDateTime::now_utc();
        let err = verifier.verify(&HeaderMap::new(), b"", now).unwrap_err();
        assert_eq!(err, SignatureError::MissingHeader(TIMESTAMP_HEADER));

        let err = verifier
            .verify(&headers("yesterday", "v0=00"), b"", now)
            .unwrap_err();
        assert_eq!(err, SignatureError::MalformedHeader(TIMESTAMP_HEADER));

        let ts = now.unix_timestamp().to_string();
        let err = verifier.verify(&headers(&ts, "v1=00"), b"", now).unwrap_err();
        assert_eq!(err, SignatureError::MalformedHeader(SIGNATURE_HEADER));

        let err = verifier
            .verify(&headers(&ts, "v0=not-hex"), b"", now)
            .unwrap_err();
        assert_eq!(err, SignatureError::MalformedHeader(SIGNATURE_HEADER));
    }
}
