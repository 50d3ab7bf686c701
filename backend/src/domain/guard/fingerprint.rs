//! Deterministic submission fingerprints.
//!
//! A fingerprint hashes the account, the normalised cart and a coarse time
//! bucket (the Unix minute). Normalisation drops zero-quantity lines, merges
//! duplicate product lines and sorts by product id, so reordering a cart or
//! splitting a line does not defeat duplicate detection.
//!
//! The JSON document is canonicalised (object keys sorted recursively, compact
//! output) before SHA-256 hashing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::domain::{AccountId, Cart};

/// Errors raised while computing fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    /// Failed to serialise the canonical JSON document.
    #[error("failed to serialise canonical fingerprint document: {message}")]
    Serialization { message: String },
}

/// SHA-256 digest identifying one logical submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionFingerprint([u8; 32]);

impl SubmissionFingerprint {
    /// Construct from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal encoding.
    ///
    /// # Examples
    /// ```
    /// use pantry_backend::domain::SubmissionFingerprint;
    ///
    /// let fingerprint = SubmissionFingerprint::from_bytes([0u8; 32]);
    /// assert_eq!(fingerprint.to_hex().len(), 64);
    /// ```
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SubmissionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint of `cart` for `account_id` in the minute containing `at`.
pub fn submission_fingerprint(
    account_id: &AccountId,
    cart: &Cart,
    at: DateTime<Utc>,
) -> Result<SubmissionFingerprint, FingerprintError> {
    let mut document = cart_document(account_id, cart);
    if let Value::Object(map) = &mut document {
        map.insert("bucket".to_owned(), json!(at.timestamp().div_euclid(60)));
    }
    canonicalize_and_hash(&document)
}

/// Time-independent hash of `cart` for `account_id`, used to group audit
/// records for the same logical cart across minutes.
pub fn cart_hash(account_id: &AccountId, cart: &Cart) -> Result<SubmissionFingerprint, FingerprintError> {
    canonicalize_and_hash(&cart_document(account_id, cart))
}

fn cart_document(account_id: &AccountId, cart: &Cart) -> Value {
    let lines: Vec<Value> = cart
        .normalized_quantities()
        .into_iter()
        .map(|(product_id, quantity)| json!({ "productId": product_id, "quantity": quantity }))
        .collect();
    json!({ "account": account_id.as_ref(), "lines": lines })
}

fn canonicalize_and_hash(value: &Value) -> Result<SubmissionFingerprint, FingerprintError> {
    let bytes = serde_json::to_vec(&canonicalize(value)).map_err(|err| {
        FingerprintError::Serialization {
            message: err.to_string(),
        }
    })?;
    let digest: [u8; 32] = Sha256::digest(&bytes).into();
    Ok(SubmissionFingerprint::from_bytes(digest))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(key, _)| key.as_str());
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(key, inner)| (key.clone(), canonicalize(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
