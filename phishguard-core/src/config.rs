// Service configuration

use crate::assemble::FeatureToggles;
use crate::cache::NetworkMode;
use crate::error::ConfigError;
use crate::sign::parse_shared_secret;
use phishguard_scanner::ProbeSettings;
use phishguard_scanner::probe::{DEFAULT_CT_BASE, DEFAULT_RDAP_BASE, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CACHE_FILE: &str = "feature_cache.json";
pub const DEFAULT_MIN_THRESHOLD: f64 = 0.35;
pub const DEFAULT_VERDICT_TTL_SECS: i64 = 300;

/// Expand a leading `~` in a configured path.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// PKCS#8 or PKCS#1 PEM. Absent means an ephemeral key per process.
    pub private_key_path: Option<PathBuf>,
    /// SPKI PEM. When set it must match the private key.
    pub public_key_path: Option<PathBuf>,
    /// Shared HMAC secret, base64 or hex. Absent means an ephemeral secret.
    pub hmac_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    /// Floor applied to the model's own threshold.
    pub min_threshold: f64,
    pub ttl_secs: i64,
    /// Follow known URL shorteners before scoring.
    pub expand_shorteners: bool,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            min_threshold: DEFAULT_MIN_THRESHOLD,
            ttl_secs: DEFAULT_VERDICT_TTL_SECS,
            expand_shorteners: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub enabled: bool,
    /// Registrable domains trusted in addition to the built-in list.
    pub extra_trusted: Vec<String>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_trusted: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub rdap_base: String,
    pub ct_base: String,
    pub user_agent: String,
    pub whois_timeout_secs: u64,
    pub ct_timeout_secs: u64,
    pub dom_timeout_secs: u64,
    pub expand_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let settings = ProbeSettings::default();
        Self {
            rdap_base: DEFAULT_RDAP_BASE.to_string(),
            ct_base: DEFAULT_CT_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            whois_timeout_secs: settings.whois_timeout.as_secs(),
            ct_timeout_secs: settings.ct_timeout.as_secs(),
            dom_timeout_secs: settings.dom_timeout.as_secs(),
            expand_timeout_secs: settings.expand_timeout.as_secs(),
        }
    }
}

impl ProbeConfig {
    pub fn to_settings(&self) -> ProbeSettings {
        ProbeSettings {
            rdap_base: self.rdap_base.trim_end_matches('/').to_string(),
            ct_base: self.ct_base.trim_end_matches('/').to_string(),
            user_agent: self.user_agent.clone(),
            whois_timeout: Duration::from_secs(self.whois_timeout_secs),
            ct_timeout: Duration::from_secs(self.ct_timeout_secs),
            dom_timeout: Duration::from_secs(self.dom_timeout_secs),
            expand_timeout: Duration::from_secs(self.expand_timeout_secs),
        }
    }
}

/// Everything the verdict service needs at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhishGuardConfig {
    pub cache_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub network_mode: NetworkMode,
    pub signing: SigningConfig,
    pub verdict: VerdictConfig,
    pub toggles: FeatureToggles,
    pub reputation: ReputationConfig,
    pub probes: ProbeConfig,
}

impl Default for PhishGuardConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            model_path: None,
            network_mode: NetworkMode::default(),
            signing: SigningConfig::default(),
            verdict: VerdictConfig::default(),
            toggles: FeatureToggles::default(),
            reputation: ReputationConfig::default(),
            probes: ProbeConfig::default(),
        }
    }
}

impl PhishGuardConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_path(path);
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn cache_path(&self) -> PathBuf {
        expand_path(&self.cache_path)
    }

    pub fn model_path(&self) -> Option<PathBuf> {
        self.model_path.as_deref().map(expand_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache_path is empty".into()));
        }

        if !(0.0..=1.0).contains(&self.verdict.min_threshold) {
            return Err(ConfigError::Invalid(format!(
                "verdict.min_threshold {} is outside [0, 1]",
                self.verdict.min_threshold
            )));
        }
        if self.verdict.ttl_secs <= 0 {
            return Err(ConfigError::Invalid("verdict.ttl_secs must be positive".into()));
        }

        for (name, base) in [
            ("probes.rdap_base", &self.probes.rdap_base),
            ("probes.ct_base", &self.probes.ct_base),
        ] {
            Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", name, base, e)))?;
        }

        for (name, secs) in [
            ("probes.whois_timeout_secs", self.probes.whois_timeout_secs),
            ("probes.ct_timeout_secs", self.probes.ct_timeout_secs),
            ("probes.dom_timeout_secs", self.probes.dom_timeout_secs),
            ("probes.expand_timeout_secs", self.probes.expand_timeout_secs),
        ] {
            if !(1..=30).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 1 and 30 seconds, got {}",
                    name, secs
                )));
            }
        }

        if let Some(secret) = &self.signing.hmac_secret {
            parse_shared_secret(secret)
                .map_err(|e| ConfigError::Invalid(format!("signing.hmac_secret: {}", e)))?;
        }

        for domain in &self.reputation.extra_trusted {
            if domain.trim().is_empty() || domain.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "reputation.extra_trusted entry '{}' is not a domain",
                    domain
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PhishGuardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.verdict.min_threshold, 0.35);
        assert_eq!(config.verdict.ttl_secs, 300);
        assert_eq!(config.network_mode, NetworkMode::CacheFirst);
        assert!(config.reputation.enabled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: PhishGuardConfig = serde_json::from_str(
            r#"{"network_mode":"cache-only","toggles":{"url_only":true},"verdict":{"ttl_secs":60}}"#,
        )
        .unwrap();
        assert_eq!(config.network_mode, NetworkMode::CacheOnly);
        assert!(config.toggles.url_only);
        assert!(!config.toggles.disable_dom);
        assert_eq!(config.verdict.ttl_secs, 60);
        assert_eq!(config.verdict.min_threshold, 0.35);
        assert_eq!(config.cache_path, PathBuf::from(DEFAULT_CACHE_FILE));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PhishGuardConfig::default();
        config.verdict.min_threshold = 2.0;
        assert!(config.validate().is_err());

        let mut config = PhishGuardConfig::default();
        config.probes.ct_base = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = PhishGuardConfig::default();
        config.probes.dom_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = PhishGuardConfig::default();
        config.signing.hmac_secret = Some("!!not-a-secret!!".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_settings_conversion() {
        let mut config = ProbeConfig::default();
        config.rdap_base = "http://127.0.0.1:9000/".into();
        config.ct_timeout_secs = 2;
        let settings = config.to_settings();
        assert_eq!(settings.rdap_base, "http://127.0.0.1:9000");
        assert_eq!(settings.ct_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PhishGuardConfig::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
