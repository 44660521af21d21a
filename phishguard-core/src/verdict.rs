// Verdict payload and signed bundle wire types

use crate::assemble::TogglesApplied;
use crate::cache::Provenance;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Phishing,
    Legit,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Phishing => write!(f, "phishing"),
            Prediction::Legit => write!(f, "legit"),
        }
    }
}

/// Whether the reputation prior capped the probability, and why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationInfo {
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etld1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The record that gets canonicalized and signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictPayload {
    pub url: String,
    pub prediction: Prediction,
    pub probability: f64,
    pub threshold: f64,
    pub features_used: usize,
    pub model: String,
    pub iat: i64,
    pub exp: i64,
    pub nonce: String,
    pub cache_hit: bool,
    pub used_fallback: bool,
    pub sources: Provenance,
    pub toggles_applied: TogglesApplied,
    pub reputation: ReputationInfo,
    pub req_id: String,
}

/// Base64 HMAC tag, base64 RSA signature and the PEM key that checks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle {
    pub hmac: String,
    pub signature: String,
    pub pubkey_pem: String,
}

/// A payload travelling with its signatures.
///
/// Generic so that bundles produced elsewhere can be checked as raw JSON
/// without knowing every payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedVerdict<P = VerdictPayload> {
    pub payload: P,
    pub hmac: String,
    pub signature: String,
    pub pubkey_pem: String,
}

impl<P> SignedVerdict<P> {
    pub fn new(payload: P, bundle: SignatureBundle) -> Self {
        Self {
            payload,
            hmac: bundle.hmac,
            signature: bundle.signature,
            pubkey_pem: bundle.pubkey_pem,
        }
    }
}
