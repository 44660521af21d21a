pub mod assemble;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod model;
pub mod normalize;
pub mod reputation;
pub mod sign;
pub mod verdict;

pub use assemble::{Extraction, FeatureToggles, TogglesApplied, assemble, extract_features};
pub use cache::{CacheEntry, EnrichmentCache, NetworkMode, Provenance, Resolution, Source};
pub use config::PhishGuardConfig;
pub use engine::VerdictEngine;
pub use error::{CacheError, ConfigError, KeyError, ModelError, VerdictError};
pub use features::{FEATURE_COUNT, FeatureVector, lexical_features};
pub use model::{LogisticScorer, Scorer};
pub use normalize::{NormalizedUrl, normalize};
pub use sign::{SigningContext, canonical_bytes, verify, verify_hmac};
pub use verdict::{Prediction, ReputationInfo, SignatureBundle, SignedVerdict, VerdictPayload};
