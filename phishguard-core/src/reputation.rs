// Reputation prior for well-known domains

use crate::config::ReputationConfig;
use crate::verdict::ReputationInfo;
use std::collections::HashSet;

pub const TRUSTED_DOMAINS: [&str; 17] = [
    "wikipedia.org",
    "google.com",
    "youtube.com",
    "facebook.com",
    "apple.com",
    "microsoft.com",
    "github.com",
    "paypal.com",
    "linkedin.com",
    "instagram.com",
    "netflix.com",
    "reddit.com",
    "bbc.co.uk",
    "nytimes.com",
    "cdc.gov",
    "nih.gov",
    "office.com",
];

/// Upper bound on the probability for a trusted domain.
pub const TRUSTED_PROBABILITY_CAP: f64 = 0.05;

/// Caps the phishing probability of registrable domains known to be benign.
#[derive(Debug, Clone)]
pub struct Reputation {
    enabled: bool,
    extra: HashSet<String>,
}

impl Reputation {
    pub fn new(config: &ReputationConfig) -> Self {
        Self {
            enabled: config.enabled,
            extra: config
                .extra_trusted
                .iter()
                .map(|d| d.trim().trim_end_matches('.').to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    fn lookup(&self, domain: &str) -> Option<&'static str> {
        if TRUSTED_DOMAINS.contains(&domain) {
            Some("builtin")
        } else if self.extra.contains(domain) {
            Some("config")
        } else {
            None
        }
    }

    /// Apply the prior to `probability` for the registrable `domain`.
    pub fn apply(&self, domain: &str, probability: f64) -> (f64, ReputationInfo) {
        if !self.enabled {
            return (probability, ReputationInfo::default());
        }

        match self.lookup(domain) {
            Some(source) => (
                probability.min(TRUSTED_PROBABILITY_CAP),
                ReputationInfo {
                    used: true,
                    etld1: Some(domain.to_string()),
                    label: Some("trusted".to_string()),
                    source: Some(source.to_string()),
                },
            ),
            None => (
                probability,
                ReputationInfo {
                    used: false,
                    etld1: Some(domain.to_string()),
                    label: None,
                    source: None,
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reputation(enabled: bool, extra: &[&str]) -> Reputation {
        Reputation::new(&ReputationConfig {
            enabled,
            extra_trusted: extra.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_trusted_domain_is_capped() {
        let (p, info) = reputation(true, &[]).apply("github.com", 0.9);
        assert_eq!(p, TRUSTED_PROBABILITY_CAP);
        assert!(info.used);
        assert_eq!(info.label.as_deref(), Some("trusted"));
        assert_eq!(info.source.as_deref(), Some("builtin"));

        // Already below the cap
        let (p, _) = reputation(true, &[]).apply("github.com", 0.01);
        assert_eq!(p, 0.01);
    }

    #[test]
    fn test_extra_trusted_domains() {
        let rep = reputation(true, &[" Intranet.Example.ORG. "]);
        let (p, info) = rep.apply("intranet.example.org", 0.7);
        assert_eq!(p, TRUSTED_PROBABILITY_CAP);
        assert_eq!(info.source.as_deref(), Some("config"));
    }

    #[test]
    fn test_unknown_and_disabled() {
        let (p, info) = reputation(true, &[]).apply("paypa1-login.xyz", 0.9);
        assert_eq!(p, 0.9);
        assert!(!info.used);
        assert_eq!(info.etld1.as_deref(), Some("paypa1-login.xyz"));

        let (p, info) = reputation(false, &[]).apply("github.com", 0.9);
        assert_eq!(p, 0.9);
        assert_eq!(info, ReputationInfo::default());
    }
}
