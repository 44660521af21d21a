use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use phishguard_core::assemble::extract_features;
use phishguard_core::cache::{EnrichmentCache, NetworkMode, Provenance, Resolution, Source};
use phishguard_core::config::{PhishGuardConfig, expand_path};
use phishguard_core::engine::VerdictEngine;
use phishguard_core::model::LogisticScorer;
use phishguard_core::sign::{
    DEFAULT_KEY_BITS, SigningContext, parse_shared_secret, verify, verify_hmac, write_key_files,
};
use phishguard_core::verdict::{Prediction, SignedVerdict};
use phishguard_scanner::Prober;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Well-known legitimate sites warmed by default.
pub const WARM_DEFAULT_URLS: [&str; 17] = [
    "https://www.google.com",
    "https://www.wikipedia.org",
    "https://www.youtube.com",
    "https://www.facebook.com",
    "https://www.apple.com",
    "https://www.microsoft.com",
    "https://github.com",
    "https://www.paypal.com",
    "https://www.linkedin.com",
    "https://www.instagram.com",
    "https://www.netflix.com",
    "https://www.reddit.com",
    "https://www.bbc.co.uk",
    "https://www.nytimes.com",
    "https://www.cdc.gov",
    "https://www.nih.gov",
    "https://www.office.com",
];

const DEFAULT_WARM_WORKERS: usize = 8;

// Helper functions for URL input

/// Load and parse URLs from a file, one per line
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL file {}", path.display()))?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_url_line(line.trim()))
        .collect())
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

/// Drop repeated URLs, keeping the first occurrence of each.
pub fn dedupe_urls<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn source_label(source: Source) -> &'static str {
    match source {
        Source::Cache => "cache",
        Source::Network => "network",
        Source::Fallback => "fallback",
    }
}

/// One-line rendering of per-signal provenance.
pub fn format_sources(sources: &Provenance) -> String {
    format!(
        "whois={} ct={} dom={}",
        source_label(sources.whois),
        source_label(sources.ct),
        source_label(sources.dom)
    )
}

// Configuration plumbing shared by every subcommand

fn flag(args: &ArgMatches, id: &str) -> bool {
    matches!(args.try_get_one::<bool>(id), Ok(Some(true)))
}

fn string_arg<'a>(args: &'a ArgMatches, id: &str) -> Option<&'a String> {
    args.try_get_one::<String>(id).ok().flatten()
}

fn path_arg<'a>(args: &'a ArgMatches, id: &str) -> Option<&'a PathBuf> {
    args.try_get_one::<PathBuf>(id).ok().flatten()
}

/// Apply command-line overrides on top of a loaded config.
pub fn apply_overrides(config: &mut PhishGuardConfig, args: &ArgMatches) -> Result<()> {
    if let Some(cache) = path_arg(args, "cache") {
        config.cache_path = cache.clone();
    }
    if let Some(model) = path_arg(args, "model") {
        config.model_path = Some(model.clone());
    }
    if let Some(key) = path_arg(args, "private-key") {
        config.signing.private_key_path = Some(key.clone());
    }
    if let Some(key) = path_arg(args, "public-key") {
        config.signing.public_key_path = Some(key.clone());
    }
    if let Some(secret) = string_arg(args, "hmac-secret") {
        config.signing.hmac_secret = Some(secret.clone());
    }
    if let Some(mode) = string_arg(args, "mode") {
        config.network_mode = mode.parse::<NetworkMode>().map_err(anyhow::Error::msg)?;
    }

    config.toggles.disable_dom |= flag(args, "disable-dom");
    config.toggles.disable_ct |= flag(args, "disable-ct");
    config.toggles.disable_whois |= flag(args, "disable-whois");
    config.toggles.url_only |= flag(args, "url-only");
    if flag(args, "no-reputation") {
        config.reputation.enabled = false;
    }

    Ok(())
}

/// Load `--config` (or defaults), apply overrides and validate once.
pub fn load_config(args: &ArgMatches) -> Result<PhishGuardConfig> {
    let mut config = match path_arg(args, "config") {
        Some(path) => PhishGuardConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PhishGuardConfig::default(),
    };
    apply_overrides(&mut config, args)?;
    config.validate()?;
    Ok(config)
}

fn build_prober(config: &PhishGuardConfig) -> Result<Prober> {
    Prober::with_settings(config.probes.to_settings()).context("Failed to build HTTP client")
}

pub fn build_engine(config: &PhishGuardConfig) -> Result<VerdictEngine<Prober, LogisticScorer>> {
    let model_path = config
        .model_path()
        .context("No model configured; pass --model or set model_path in the config file")?;
    let scorer = LogisticScorer::load(&model_path)?;
    let signer = SigningContext::from_config(&config.signing)?;
    let cache = EnrichmentCache::open(config.cache_path());
    let prober = build_prober(config)?;

    Ok(VerdictEngine::new(cache, prober, scorer, signer, config))
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

fn write_output(path: &Path, contents: &str) -> Result<PathBuf> {
    let path = expand_path(path);
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

// ============================================================================
// check
// ============================================================================

pub async fn handle_check(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let url = args
        .get_one::<String>("URL")
        .context("A URL to check is required")?;
    let as_json = flag(args, "json");

    let engine = build_engine(&config)?;
    let progress = if as_json {
        ProgressBar::hidden()
    } else {
        spinner(&format!("Checking {} ({})", url, config.network_mode))?
    };

    let verdict = engine.evaluate(url).await?;
    progress.finish_and_clear();

    let bundle = serde_json::to_string_pretty(&verdict)?;
    if let Some(output) = path_arg(args, "output") {
        let written = write_output(output, &bundle)?;
        if !as_json {
            println!("{} Signed verdict saved to {}", "✓".green().bold(), written.display());
        }
    }

    if as_json {
        println!("{}", bundle);
    } else {
        print_verdict(&verdict);
    }
    Ok(())
}

fn print_verdict(verdict: &SignedVerdict) {
    let payload = &verdict.payload;
    let prediction = match payload.prediction {
        Prediction::Phishing => "PHISHING".red().bold(),
        Prediction::Legit => "LEGIT".green().bold(),
    };

    println!();
    print_divider();
    println!("{}", "  PHISHGUARD VERDICT".bright_white().bold());
    print_divider();
    println!("{} URL:          {}", "→".blue(), payload.url.bright_white());
    println!("{} Prediction:   {}", "→".blue(), prediction);
    println!(
        "{} Probability:  {:.6} (threshold {:.2})",
        "→".blue(),
        payload.probability,
        payload.threshold
    );
    println!("{} Model:        {}", "→".blue(), payload.model);
    println!(
        "{} Enrichment:   {} (cache hit: {}, fallback: {})",
        "→".blue(),
        format_sources(&payload.sources),
        payload.cache_hit,
        payload.used_fallback
    );
    if payload.reputation.used {
        println!(
            "{} Reputation:   {} is {}",
            "→".blue(),
            payload.reputation.etld1.as_deref().unwrap_or("?"),
            payload.reputation.label.as_deref().unwrap_or("trusted").green()
        );
    }
    let toggles = payload.toggles_applied;
    if toggles.dom || toggles.ct || toggles.whois || toggles.url_only {
        println!(
            "{} Toggles:      dom={} ct={} whois={} url_only={}",
            "→".blue(),
            toggles.dom,
            toggles.ct,
            toggles.whois,
            toggles.url_only
        );
    }
    println!(
        "{} Valid until:  {} (req {})",
        "→".blue(),
        payload.exp,
        payload.req_id.dimmed()
    );
    print_divider();
    println!(
        "{} Signed (RSA {}..., HMAC {}...)",
        "✓".green().bold(),
        &verdict.signature[..verdict.signature.len().min(16)],
        &verdict.hmac[..verdict.hmac.len().min(16)]
    );
}

// ============================================================================
// warm
// ============================================================================

/// Built-in URLs, then `--file`, then `--add`, de-duplicated.
pub fn collect_warm_urls(args: &ArgMatches) -> Result<Vec<String>> {
    let mut urls: Vec<String> = WARM_DEFAULT_URLS.iter().map(|u| u.to_string()).collect();

    if let Some(file) = path_arg(args, "file") {
        urls.extend(load_urls_from_file(&expand_path(file))?);
    }
    if let Ok(Some(extra)) = args.try_get_many::<String>("add") {
        urls.extend(extra.cloned());
    }

    Ok(dedupe_urls(urls))
}

pub async fn handle_warm(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let urls = collect_warm_urls(args)?;
    let workers = args
        .try_get_one::<usize>("threads")
        .ok()
        .flatten()
        .copied()
        .unwrap_or(DEFAULT_WARM_WORKERS)
        .max(1);

    let cache = EnrichmentCache::open(config.cache_path());
    let prober = build_prober(&config)?;

    println!("{} Warming cache at {}", "→".blue(), cache.path().display());

    let progress = ProgressBar::new(urls.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut results: Vec<(usize, Resolution)> = stream::iter(urls.iter().enumerate())
        .map(|(index, url)| {
            let cache = &cache;
            let prober = &prober;
            let progress = &progress;
            async move {
                let extraction = extract_features(cache, prober, url, NetworkMode::Fetch).await;
                progress.set_message(extraction.resolution.domain.clone());
                progress.inc(1);
                (index, extraction.resolution)
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;
    progress.finish_and_clear();
    results.sort_by_key(|(index, _)| *index);

    let mut with_fallback = 0;
    for (index, resolution) in &results {
        let marker = if resolution.used_fallback {
            with_fallback += 1;
            "!".yellow().bold()
        } else {
            "✓".green().bold()
        };
        println!(
            "   {} {:<50} {}  fallback={}",
            marker,
            urls[*index],
            format_sources(&resolution.sources),
            resolution.used_fallback
        );
    }

    println!();
    println!(
        "{} Done. Wrote/updated: {}",
        "✓".green().bold(),
        cache.path().display()
    );
    println!("   Warmed: {}, with fallback: {}", results.len(), with_fallback);
    Ok(())
}

// ============================================================================
// verify
// ============================================================================

/// Result of checking a saved bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleCheck {
    pub signature_valid: bool,
    /// `None` when no shared secret was available.
    pub hmac_valid: Option<bool>,
    pub expired: bool,
}

impl BundleCheck {
    pub fn passed(&self) -> bool {
        self.signature_valid && self.hmac_valid != Some(false)
    }
}

/// Check a signed bundle against `public_key_pem` and, when given, the
/// shared secret. The payload is checked as raw JSON.
pub fn check_bundle(
    bundle: &SignedVerdict<Value>,
    public_key_pem: &str,
    secret: Option<&[u8]>,
    now: i64,
) -> BundleCheck {
    BundleCheck {
        signature_valid: verify(public_key_pem, &bundle.payload, &bundle.signature),
        hmac_valid: secret.map(|s| verify_hmac(s, &bundle.payload, &bundle.hmac)),
        expired: bundle
            .payload
            .get("exp")
            .and_then(Value::as_i64)
            .is_some_and(|exp| exp < now),
    }
}

pub fn handle_verify(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let path = args
        .get_one::<PathBuf>("bundle")
        .context("--bundle is required")?;
    let path = expand_path(path);

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read bundle {}", path.display()))?;
    let bundle: SignedVerdict<Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a signed verdict", path.display()))?;

    let pinned = match path_arg(args, "pubkey") {
        Some(key) => Some(
            fs::read_to_string(expand_path(key))
                .with_context(|| format!("Failed to read public key {}", key.display()))?,
        ),
        None => None,
    };
    let public_key_pem = pinned.as_deref().unwrap_or(&bundle.pubkey_pem);

    let secret = match &config.signing.hmac_secret {
        Some(secret) => Some(parse_shared_secret(secret)?),
        None => None,
    };

    let check = check_bundle(&bundle, public_key_pem, secret.as_deref(), Utc::now().timestamp());

    let mark = |ok: bool| if ok { "✓".green().bold() } else { "✗".red().bold() };
    println!("{} RSA signature", mark(check.signature_valid));
    if pinned.is_none() {
        println!(
            "  {} checked against the embedded key; pass --pubkey to pin a trusted key",
            "•".yellow()
        );
    }
    match check.hmac_valid {
        Some(ok) => println!("{} HMAC tag", mark(ok)),
        None => println!("{} HMAC tag skipped (no shared secret configured)", "•".yellow()),
    }
    if check.expired {
        println!("{} Verdict has expired", "⚠".yellow().bold());
    }

    if !check.passed() {
        bail!("Verification failed for {}", path.display());
    }
    Ok(())
}

// ============================================================================
// pubkey / keygen
// ============================================================================

pub fn handle_pubkey(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let signer = SigningContext::from_config(&config.signing)?;

    if let Some(output) = path_arg(args, "output") {
        let written = write_output(output, signer.public_key_pem())?;
        eprintln!("{} Public key written to {}", "✓".green().bold(), written.display());
    } else {
        print!("{}", signer.public_key_pem());
    }
    Ok(())
}

pub fn handle_keygen(args: &ArgMatches) -> Result<()> {
    let dir = path_arg(args, "out")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let bits = args
        .try_get_one::<usize>("bits")
        .ok()
        .flatten()
        .copied()
        .unwrap_or(DEFAULT_KEY_BITS);
    if bits < 2048 {
        bail!("Refusing to generate an RSA key shorter than 2048 bits");
    }

    let progress = spinner(&format!("Generating {}-bit RSA key pair...", bits))?;
    let keys = write_key_files(&dir, bits)?;
    progress.finish_and_clear();

    println!("{} Private key: {}", "✓".green().bold(), keys.private_key_path.display());
    println!("{} Public key:  {}", "✓".green().bold(), keys.public_key_path.display());
    println!();
    println!("{}", "Shared HMAC secret (store it safely):".bright_white().bold());
    println!("{}", keys.hmac_secret);
    Ok(())
}
