use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::models::event::WebhookEvent;

/// Allowed clock skew for signatures timestamped in the future.
const FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("raw request body is missing")]
    MissingRawBody,
    #[error("Stripe-Signature header is missing")]
    MissingSignature,
    #[error("malformed signature header: {0}")]
    MalformedHeader(String),
    #[error("signature does not match payload")]
    SignatureMismatch,
    #[error("signature timestamp outside tolerance window")]
    TimestampOutOfTolerance,
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v0=<hex>]`.
/// Unknown keys are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, VerifyError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| VerifyError::MalformedHeader("expected key=value".into()))?;
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        VerifyError::MalformedHeader("invalid timestamp".into())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        VerifyError::MalformedHeader("invalid v1 signature hex".into())
                    })?);
                }
                _ => {}
            }
        }

        Ok(SignatureHeader {
            timestamp: timestamp
                .ok_or_else(|| VerifyError::MalformedHeader("missing timestamp".into()))?,
            v1_signature: v1_signature
                .ok_or_else(|| VerifyError::MalformedHeader("missing v1 signature".into()))?,
        })
    }
}

/// Authenticates a webhook delivery against the shared endpoint secret and
/// parses it into a typed event. Must be handed the exact raw bytes of the
/// HTTP body; re-serializing parsed JSON breaks the signature.
pub struct WebhookVerifier {
    secret: String,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_seconds: i64) -> Self {
        WebhookVerifier {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, VerifyError> {
        if payload.is_empty() {
            return Err(VerifyError::MissingRawBody);
        }
        if signature_header.is_empty() {
            return Err(VerifyError::MissingSignature);
        }

        let header = SignatureHeader::parse(signature_header)?;
        self.check_tolerance(header.timestamp)?;

        let expected = self.compute_signature(header.timestamp, payload);
        if !constant_time_eq(&expected, &header.v1_signature) {
            return Err(VerifyError::SignatureMismatch);
        }

        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        WebhookEvent::from_json(raw).map_err(|e| VerifyError::MalformedPayload(e.to_string()))
    }

    fn check_tolerance(&self, timestamp: i64) -> Result<(), VerifyError> {
        let age = OffsetDateTime::now_utc().unix_timestamp() - timestamp;
        if age > self.tolerance_seconds || age < -FUTURE_SKEW_SECS {
            return Err(VerifyError::TimestampOutOfTolerance);
        }
        Ok(())
    }

    /// HMAC-SHA256 over `"{timestamp}.{raw_body}"`.
    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid `Stripe-Signature` header for test payloads.
#[cfg(test)]
pub fn sign_for_tests(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
