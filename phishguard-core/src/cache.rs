// Persistent enrichment cache keyed by registrable domain

use crate::error::CacheError;
use crate::normalize::NormalizedUrl;
use phishguard_scanner::{DomMetrics, Enricher, ProbeOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const NEUTRAL_DOMAIN_AGE_DAYS: u32 = 365;

/// Where a signal's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Network,
    Fallback,
}

/// Per-signal provenance of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub whois: Source,
    pub ct: Source,
    pub dom: Source,
}

impl Provenance {
    pub fn uniform(source: Source) -> Self {
        Self {
            whois: source,
            ct: source,
            dom: source,
        }
    }

    fn cached() -> Self {
        Self::uniform(Source::Cache)
    }

    pub fn any_fallback(&self) -> bool {
        [self.whois, self.ct, self.dom].contains(&Source::Fallback)
    }
}

/// Enrichment values for one registrable domain. Written once, replaced
/// only as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "whois_age_days")]
    pub domain_age_days: u32,
    pub ct_flag: u8,
    pub dom_forms: u32,
    pub dom_has_password: u8,
    pub dom_ext_int_ratio: f64,
    pub dom_iframes: u32,
    #[serde(rename = "_source", default = "Provenance::cached")]
    pub provenance: Provenance,
}

impl CacheEntry {
    /// Values that never push a verdict towards phishing.
    pub fn neutral() -> Self {
        Self {
            domain_age_days: NEUTRAL_DOMAIN_AGE_DAYS,
            ct_flag: 0,
            dom_forms: 0,
            dom_has_password: 0,
            dom_ext_int_ratio: 0.0,
            dom_iframes: 0,
            provenance: Provenance::uniform(Source::Fallback),
        }
    }

    pub fn used_fallback(&self) -> bool {
        self.provenance.any_fallback()
    }
}

/// Merge probe outcomes over the neutral baseline. Anything other than a
/// concrete value keeps the neutral value and is marked `fallback`.
pub fn merge_outcomes(
    age: ProbeOutcome<u32>,
    ct: ProbeOutcome<u8>,
    dom: ProbeOutcome<DomMetrics>,
) -> CacheEntry {
    let mut entry = CacheEntry::neutral();

    if let ProbeOutcome::Value(days) = age
        && days > 0
    {
        entry.domain_age_days = days;
        entry.provenance.whois = Source::Network;
    }

    if let ProbeOutcome::Value(flag) = ct {
        entry.ct_flag = flag.min(1);
        entry.provenance.ct = Source::Network;
    }

    if let ProbeOutcome::Value(metrics) = dom {
        entry.dom_forms = metrics.forms;
        entry.dom_has_password = metrics.has_password as u8;
        entry.dom_ext_int_ratio = metrics.ext_int_ratio.max(0.0);
        entry.dom_iframes = metrics.iframes;
        entry.provenance.dom = Source::Network;
    }

    entry
}

/// How a resolution may use the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    /// Serve hits from the cache, fetch on a miss.
    #[default]
    CacheFirst,
    /// Fetch on a miss. Used when warming the cache.
    Fetch,
    /// Never fetch; a miss stores and returns the neutral entry.
    CacheOnly,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::CacheFirst => "cache-first",
            NetworkMode::Fetch => "fetch",
            NetworkMode::CacheOnly => "cache-only",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cache-first" => Ok(NetworkMode::CacheFirst),
            "fetch" => Ok(NetworkMode::Fetch),
            "cache-only" => Ok(NetworkMode::CacheOnly),
            other => Err(format!(
                "unknown network mode '{}' (expected cache-first, fetch or cache-only)",
                other
            )),
        }
    }
}

/// The result of resolving one URL against the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub domain: String,
    pub entry: CacheEntry,
    /// Provenance as seen by this request: all `cache` on a hit.
    pub sources: Provenance,
    pub cache_hit: bool,
    pub used_fallback: bool,
}

impl Resolution {
    fn hit(domain: String, entry: CacheEntry) -> Self {
        Self {
            used_fallback: entry.used_fallback(),
            domain,
            entry,
            sources: Provenance::cached(),
            cache_hit: true,
        }
    }

    fn miss(domain: String, entry: CacheEntry) -> Self {
        Self {
            used_fallback: entry.used_fallback(),
            sources: entry.provenance.clone(),
            domain,
            entry,
            cache_hit: false,
        }
    }
}

/// Strip user-info and port from a network location.
fn bare_host(netloc: &str) -> &str {
    let host = netloc.rsplit('@').next().unwrap_or(netloc);
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rfind(':') {
        Some(idx) if host[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &host[..idx],
        _ => host,
    }
}

/// Registrable domain (eTLD+1) of a URL, the cache key.
///
/// IP literals and hosts without a known public suffix key on the bare host.
pub fn registrable_domain(url: &NormalizedUrl) -> String {
    let host = bare_host(&url.host).trim_end_matches('.');
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    psl::domain_str(host)
        .map(|d| d.to_lowercase())
        .unwrap_or_else(|| host.to_lowercase())
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write `entries` next to `path` and rename over it, merging in whatever
/// other writers stored since we loaded. In-memory entries win.
fn write_atomic(path: &Path, entries: BTreeMap<String, CacheEntry>) -> Result<(), CacheError> {
    let mut merged = if path.exists() {
        read_entries(path).unwrap_or_default()
    } else {
        BTreeMap::new()
    };
    merged.extend(entries);

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, &merged)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Cache-first store of enrichment entries backed by a JSON file.
///
/// Concurrent misses for one domain share a single fetch; misses for
/// different domains proceed independently.
pub struct EnrichmentCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
    in_flight: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    writer: Mutex<()>,
}

impl EnrichmentCache {
    /// Load the cache at `path`. A missing or unreadable file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = if path.exists() {
            match read_entries(&path) {
                Ok(entries) => {
                    info!("Loaded {} cached domains from {}", entries.len(), path.display());
                    entries.into_iter().collect()
                }
                Err(e) => {
                    warn!(
                        "Ignoring unreadable cache file {}: {}",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Self {
            path,
            entries: RwLock::new(entries),
            in_flight: StdMutex::new(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, domain: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, domain: String, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain, entry);
    }

    fn snapshot(&self) -> BTreeMap<String, CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn gate(&self, domain: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(domain.to_string())
            .or_default()
            .clone()
    }

    fn release_gate(&self, domain: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(domain);
    }

    /// Resolve the enrichment entry for `url` under `mode`.
    ///
    /// Never fails: probe failures become neutral values and a failed write
    /// is logged while the in-memory entry is still served.
    pub async fn resolve<E: Enricher>(
        &self,
        enricher: &E,
        url: &NormalizedUrl,
        mode: NetworkMode,
    ) -> Resolution {
        let domain = registrable_domain(url);
        self.resolve_domain(enricher, domain, &url.full, mode).await
    }

    pub async fn resolve_domain<E: Enricher>(
        &self,
        enricher: &E,
        domain: String,
        page_url: &str,
        mode: NetworkMode,
    ) -> Resolution {
        if let Some(entry) = self.get(&domain) {
            debug!("Cache hit for {}", domain);
            return Resolution::hit(domain, entry);
        }

        let gate = self.gate(&domain);
        let _flight = gate.lock().await;

        // Another request may have filled it while we waited
        if let Some(entry) = self.get(&domain) {
            debug!("Cache hit for {} after waiting on in-flight fetch", domain);
            return Resolution::hit(domain, entry);
        }

        let entry = match mode {
            NetworkMode::CacheOnly => {
                debug!("Cache miss for {} in cache-only mode, storing neutral entry", domain);
                CacheEntry::neutral()
            }
            NetworkMode::CacheFirst | NetworkMode::Fetch => {
                debug!("Cache miss for {}, probing", domain);
                let (age, ct, dom) = tokio::join!(
                    enricher.domain_age(&domain),
                    enricher.ct_flag(&domain),
                    enricher.dom_metrics(page_url),
                );
                merge_outcomes(age, ct, dom)
            }
        };

        self.insert(domain.clone(), entry.clone());
        self.release_gate(&domain);

        if let Err(e) = self.persist().await {
            warn!("Failed to persist cache to {}: {}", self.path.display(), e);
        }

        Resolution::miss(domain, entry)
    }

    /// Write the current contents to disk by atomic replace.
    pub async fn persist(&self) -> Result<(), CacheError> {
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, snapshot))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))?
    }
}
