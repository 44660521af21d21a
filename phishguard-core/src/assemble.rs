// Feature assembly: lexical slots + enrichment slots = scorer input

use crate::cache::{CacheEntry, EnrichmentCache, NEUTRAL_DOMAIN_AGE_DAYS, NetworkMode, Resolution};
use crate::features::{CT_INDEX, FEATURE_COUNT, FeatureVector, lexical_features};
use crate::normalize::{NormalizedUrl, normalize};
use phishguard_scanner::Enricher;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Merge an 80-slot lexical vector with the enrichment entry.
///
/// Slot 80 receives the CT flag, then age, forms, password flag, ext/int
/// ratio, iframes and the CT flag again are appended. Slot 86 repeats slot 80
/// because the trained scorer expects that shape.
///
/// A lexical vector of the wrong length is a defect upstream; it is logged
/// and the result is zero-padded or truncated to 86 slots rather than
/// failing the request.
pub fn assemble(lexical: Vec<f64>, entry: &CacheEntry) -> FeatureVector {
    let mut values = lexical;
    let ct = entry.ct_flag as f64;

    if let Some(slot) = values.get_mut(CT_INDEX) {
        *slot = ct;
    }
    values.extend([
        entry.domain_age_days as f64,
        entry.dom_forms as f64,
        entry.dom_has_password as f64,
        entry.dom_ext_int_ratio,
        entry.dom_iframes as f64,
        ct,
    ]);

    if values.len() != FEATURE_COUNT {
        error!(
            "Assembled {} feature slots, expected {}; padding/truncating",
            values.len(),
            FEATURE_COUNT
        );
        values.resize(FEATURE_COUNT, 0.0);
    }

    FeatureVector::from_assembled(values)
}

/// Inference-time switches that neutralise enrichment slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub disable_dom: bool,
    pub disable_ct: bool,
    pub disable_whois: bool,
    pub url_only: bool,
}

/// Which toggles actually touched the vector, as reported in the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TogglesApplied {
    pub dom: bool,
    pub ct: bool,
    pub whois: bool,
    pub url_only: bool,
}

impl FeatureToggles {
    pub fn apply(&self, features: &mut FeatureVector) -> TogglesApplied {
        let slots = features.as_mut_slice();
        let mut applied = TogglesApplied::default();

        if self.url_only {
            slots[79] = 0.0;
            slots[80..85].copy_from_slice(&[NEUTRAL_DOMAIN_AGE_DAYS as f64, 0.0, 0.0, 0.0, 0.0]);
            slots[85] = 0.0;
            return TogglesApplied {
                dom: true,
                ct: true,
                whois: true,
                url_only: true,
            };
        }

        if self.disable_dom {
            slots[81..85].fill(0.0);
            applied.dom = true;
        }
        if self.disable_ct {
            slots[79] = 0.0;
            slots[85] = 0.0;
            applied.ct = true;
        }
        if self.disable_whois {
            slots[80] = NEUTRAL_DOMAIN_AGE_DAYS as f64;
            applied.whois = true;
        }

        applied
    }
}

/// A fully assembled feature vector and how its enrichment was obtained.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub url: NormalizedUrl,
    pub features: FeatureVector,
    pub resolution: Resolution,
}

/// Normalize, extract, resolve enrichment and assemble the 86-slot vector.
///
/// Completes within the probes' combined time budget and never surfaces a
/// network or cache error.
pub async fn extract_features<E: Enricher>(
    cache: &EnrichmentCache,
    enricher: &E,
    raw_url: &str,
    mode: NetworkMode,
) -> Extraction {
    let url = normalize(raw_url);
    let lexical = lexical_features(&url);
    let resolution = cache.resolve(enricher, &url, mode).await;
    let features = assemble(lexical, &resolution.entry);

    Extraction {
        url,
        features,
        resolution,
    }
}
