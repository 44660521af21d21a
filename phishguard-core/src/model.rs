// Scoring models

use crate::error::ModelError;
use crate::features::{FEATURE_COUNT, FeatureVector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// A trained classifier over the 86-slot feature vector.
pub trait Scorer: Send + Sync {
    /// Identifier reported as `model` in verdicts.
    fn name(&self) -> &str;

    /// Decision threshold the model was tuned for.
    fn threshold(&self) -> f64;

    /// Probability that the URL is phishing. Implementations may return
    /// anything; the engine clamps the result into [0, 1].
    fn score(&self, features: &FeatureVector) -> f64;
}

/// Standardized logistic regression exported as JSON.
///
/// ```json
/// {"model": "logreg-v3", "threshold": 0.5, "bias": -1.2,
///  "weights": [...86], "mean": [...86], "scale": [...86]}
/// ```
///
/// `mean` and `scale` are optional; without them inputs are used raw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticScorer {
    pub model: String,
    pub threshold: f64,
    pub bias: f64,
    pub weights: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f64>>,
}

impl LogisticScorer {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scorer: Self = serde_json::from_str(&content)?;
        scorer.validate()?;

        info!(
            "Loaded model '{}' from {} (threshold {})",
            scorer.model,
            path.display(),
            scorer.threshold
        );
        Ok(scorer)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model.trim().is_empty() {
            return Err(ModelError::Invalid("model name is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ModelError::Invalid(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }

        check_width("weights", &self.weights)?;
        if let Some(mean) = &self.mean {
            check_width("mean", mean)?;
        }
        if let Some(scale) = &self.scale {
            check_width("scale", scale)?;
        }

        if !self.bias.is_finite() {
            return Err(ModelError::Invalid("bias is not finite".into()));
        }
        Ok(())
    }

    fn logit(&self, features: &[f64]) -> f64 {
        features
            .iter()
            .enumerate()
            .fold(self.bias, |acc, (i, &x)| {
                let centered = x - self.mean.as_ref().map_or(0.0, |m| m[i]);
                let scale = self
                    .scale
                    .as_ref()
                    .map(|s| s[i])
                    .filter(|s| *s != 0.0)
                    .unwrap_or(1.0);
                acc + self.weights[i] * centered / scale
            })
    }
}

fn check_width(field: &str, values: &[f64]) -> Result<(), ModelError> {
    if values.len() != FEATURE_COUNT {
        return Err(ModelError::Invalid(format!(
            "{} has {} entries, expected {}",
            field,
            values.len(),
            FEATURE_COUNT
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Invalid(format!("{} contains non-finite values", field)));
    }
    Ok(())
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Scorer for LogisticScorer {
    fn name(&self) -> &str {
        &self.model
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.logit(features.as_slice()))
    }
}
