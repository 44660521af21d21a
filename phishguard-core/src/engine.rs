// Verdict engine: URL in, signed verdict out

use crate::assemble::{FeatureToggles, extract_features};
use crate::cache::{EnrichmentCache, NetworkMode};
use crate::config::{PhishGuardConfig, VerdictConfig};
use crate::error::VerdictError;
use crate::features::FEATURE_COUNT;
use crate::model::Scorer;
use crate::reputation::Reputation;
use crate::sign::SigningContext;
use crate::verdict::{Prediction, SignedVerdict, VerdictPayload};
use chrono::Utc;
use phishguard_scanner::Enricher;
use tracing::{debug, info};

/// Clamp a raw model output into [0, 1]; non-finite output counts as 0.
pub fn clamp_probability(raw: f64) -> f64 {
    if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn random_hex() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Ties the cache, enricher, scorer and key material together.
///
/// Built once at startup and shared by reference; every field is
/// read-only apart from the cache's own interior state.
pub struct VerdictEngine<E, S> {
    cache: EnrichmentCache,
    enricher: E,
    scorer: S,
    signer: SigningContext,
    reputation: Reputation,
    toggles: FeatureToggles,
    settings: VerdictConfig,
    mode: NetworkMode,
}

impl<E: Enricher, S: Scorer> VerdictEngine<E, S> {
    pub fn new(
        cache: EnrichmentCache,
        enricher: E,
        scorer: S,
        signer: SigningContext,
        config: &PhishGuardConfig,
    ) -> Self {
        Self {
            cache,
            enricher,
            scorer,
            signer,
            reputation: Reputation::new(&config.reputation),
            toggles: config.toggles,
            settings: config.verdict.clone(),
            mode: config.network_mode,
        }
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    pub fn enricher(&self) -> &E {
        &self.enricher
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn public_key_pem(&self) -> &str {
        self.signer.public_key_pem()
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    /// The model's threshold, floored at the configured minimum.
    pub fn effective_threshold(&self) -> f64 {
        self.scorer.threshold().max(self.settings.min_threshold)
    }

    pub async fn evaluate(&self, raw_url: &str) -> Result<SignedVerdict, VerdictError> {
        self.evaluate_with_mode(raw_url, self.mode).await
    }

    /// Score `raw_url` and sign the verdict.
    ///
    /// Network and cache trouble only ever degrades enrichment to neutral
    /// values; the error path is reserved for canonicalization and signing.
    pub async fn evaluate_with_mode(
        &self,
        raw_url: &str,
        mode: NetworkMode,
    ) -> Result<SignedVerdict, VerdictError> {
        let target = if self.settings.expand_shorteners && mode != NetworkMode::CacheOnly {
            self.enricher.expand_url(raw_url).await
        } else {
            raw_url.to_string()
        };

        let mut extraction = extract_features(&self.cache, &self.enricher, &target, mode).await;
        let toggles_applied = self.toggles.apply(&mut extraction.features);

        let raw = self.scorer.score(&extraction.features);
        let (probability, reputation) = self
            .reputation
            .apply(&extraction.resolution.domain, clamp_probability(raw));
        let threshold = self.effective_threshold();
        let prediction = if probability >= threshold {
            Prediction::Phishing
        } else {
            Prediction::Legit
        };
        debug!(
            "Scored {} raw={} capped={} threshold={}",
            extraction.url.full, raw, probability, threshold
        );

        let iat = Utc::now().timestamp();
        let resolution = extraction.resolution;
        let payload = VerdictPayload {
            url: extraction.url.full,
            prediction,
            probability: round6(probability),
            threshold,
            features_used: FEATURE_COUNT,
            model: self.scorer.name().to_string(),
            iat,
            exp: iat + self.settings.ttl_secs,
            nonce: random_hex(),
            cache_hit: resolution.cache_hit,
            used_fallback: resolution.used_fallback,
            sources: resolution.sources,
            toggles_applied,
            reputation,
            req_id: random_hex(),
        };

        info!(
            "Verdict {} for {} (p={}, cache_hit={}, fallback={})",
            payload.prediction,
            payload.url,
            payload.probability,
            payload.cache_hit,
            payload.used_fallback
        );

        self.signer.seal(payload)
    }
}
