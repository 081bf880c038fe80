use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;
const SIGNATURE_VERSION: &str = "v0";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp is not a unix epoch value")]
    InvalidTimestamp,
    #[error("request timestamp is {skew_secs}s away from now")]
    Stale { skew_secs: i64 },
    #[error("signature is not a `v0=` hex digest")]
    Malformed,
    #[error("signature does not match request body")]
    Mismatch,
    #[error("signing secret is unusable")]
    InvalidSecret,
}

/// Verifies `X-Slack-Signature` against the app's signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret }
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(headers, body, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = required_header(headers, TIMESTAMP_HEADER)?;
        let signature = required_header(headers, SIGNATURE_HEADER)?;

        let issued_at: i64 =
            timestamp.trim().parse().map_err(|_| SignatureError::InvalidTimestamp)?;
        let skew_secs = now.saturating_sub(issued_at);
        if skew_secs.abs() > MAX_CLOCK_SKEW_SECS {
            return Err(SignatureError::Stale { skew_secs });
        }

        let digest = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or(SignatureError::Malformed)?;
        let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;

        self.mac(timestamp, body)?.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the header value Slack would send for `body` at `timestamp`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac(timestamp, body)?;
        Ok(format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes())))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}
