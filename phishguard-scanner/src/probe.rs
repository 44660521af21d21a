use crate::error::{ProbeError, Result};
use crate::result::{DomMetrics, ProbeOutcome};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_RDAP_BASE: &str = "https://rdap.org";
pub const DEFAULT_CT_BASE: &str = "https://crt.sh";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Hosts whose links are followed before analysis.
pub const SHORTENERS: [&str; 6] = ["bit.ly", "goo.gl", "tinyurl.com", "ow.ly", "is.gd", "t.co"];

/// A source of the three enrichment signals.
///
/// Implementations must bound every call by a timeout and must never panic;
/// whatever goes wrong is reported through [`ProbeOutcome`].
pub trait Enricher: Send + Sync {
    /// Days since the registrable domain was registered.
    fn domain_age(&self, domain: &str) -> impl Future<Output = ProbeOutcome<u32>> + Send;

    /// 0 when certificate-transparency logs know the host, 1 otherwise.
    fn ct_flag(&self, domain: &str) -> impl Future<Output = ProbeOutcome<u8>> + Send;

    /// Structural metrics of the page served at `url`.
    fn dom_metrics(&self, url: &str) -> impl Future<Output = ProbeOutcome<DomMetrics>> + Send;

    /// Resolve a link shortener to its destination. The default leaves the URL alone.
    fn expand_url(&self, url: &str) -> impl Future<Output = String> + Send {
        let url = url.to_string();
        async move { url }
    }
}

/// Endpoints and time budgets used by [`Prober`].
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub rdap_base: String,
    pub ct_base: String,
    pub user_agent: String,
    pub whois_timeout: Duration,
    pub ct_timeout: Duration,
    pub dom_timeout: Duration,
    pub expand_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            rdap_base: DEFAULT_RDAP_BASE.to_string(),
            ct_base: DEFAULT_CT_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            whois_timeout: Duration::from_secs(5),
            ct_timeout: Duration::from_secs(4),
            dom_timeout: Duration::from_secs(6),
            expand_timeout: Duration::from_secs(5),
        }
    }
}

/// Network-backed [`Enricher`]: RDAP for registration age, crt.sh for
/// certificate transparency and a plain GET for the DOM scan.
pub struct Prober {
    client: Client,
    settings: ProbeSettings,
    shorteners: HashSet<String>,
}

impl Prober {
    pub fn new() -> Result<Self> {
        Self::with_settings(ProbeSettings::default())
    }

    pub fn with_settings(settings: ProbeSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            settings,
            shorteners: SHORTENERS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn with_shorteners<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shorteners = hosts.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    async fn fetch_registration_age(&self, domain: &str) -> Result<Option<u32>> {
        let endpoint = format!(
            "{}/domain/{}",
            self.settings.rdap_base.trim_end_matches('/'),
            domain
        );
        debug!("RDAP lookup {}", endpoint);

        let response = self
            .client
            .get(&endpoint)
            .header(ACCEPT, "application/rdap+json, application/json")
            .timeout(self.settings.whois_timeout)
            .send()
            .await?;

        // Registries answer 404 for names they don't hold
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        registration_age_days(&body, Utc::now())
    }

    async fn fetch_ct_flag(&self, host: &str) -> Result<u8> {
        let endpoint = format!("{}/", self.settings.ct_base.trim_end_matches('/'));
        debug!("CT lookup {} for {}", endpoint, host);

        let response = self
            .client
            .get(&endpoint)
            .query(&[("q", host), ("output", "json")])
            .timeout(self.settings.ct_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(1);
        }

        let body = response.text().await?;
        Ok(ct_flag_from_body(&body))
    }

    async fn fetch_dom_metrics(&self, url: &str) -> Result<DomMetrics> {
        let page_url =
            Url::parse(url).map_err(|e| ProbeError::InvalidUrl(format!("{}: {}", url, e)))?;
        debug!("DOM scan {}", page_url);

        let response = self
            .client
            .get(page_url.clone())
            .timeout(self.settings.dom_timeout)
            .send()
            .await?;
        let body = response.text().await?;

        parse_dom_metrics(&body, &page_url)
    }

    async fn follow_shortener(&self, url: &Url) -> Result<Option<String>> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.settings.expand_timeout)
            .send()
            .await?;

        if response.url() != url {
            return Ok(Some(response.url().to_string()));
        }

        let body = response.text().await?;
        meta_refresh_target(&body, url)
    }
}

impl Enricher for Prober {
    async fn domain_age(&self, domain: &str) -> ProbeOutcome<u32> {
        let outcome = ProbeOutcome::from(self.fetch_registration_age(domain).await);
        if let ProbeOutcome::Failed(ref e) = outcome {
            debug!("Domain age probe failed for {}: {}", domain, e);
        }
        outcome
    }

    async fn ct_flag(&self, domain: &str) -> ProbeOutcome<u8> {
        match self.fetch_ct_flag(domain).await {
            Ok(flag) => ProbeOutcome::Value(flag),
            Err(e) => {
                debug!("CT probe failed for {}: {}", domain, e);
                ProbeOutcome::Failed(e.to_string())
            }
        }
    }

    async fn dom_metrics(&self, url: &str) -> ProbeOutcome<DomMetrics> {
        match self.fetch_dom_metrics(url).await {
            Ok(metrics) => ProbeOutcome::Value(metrics),
            Err(e) => {
                debug!("DOM probe failed for {}: {}", url, e);
                ProbeOutcome::Failed(e.to_string())
            }
        }
    }

    async fn expand_url(&self, url: &str) -> String {
        let candidate = if url.contains("://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };

        let Ok(parsed) = Url::parse(&candidate) else {
            return candidate;
        };
        if !self.shorteners.contains(&netloc(&parsed)) {
            return candidate;
        }

        match self.follow_shortener(&parsed).await {
            Ok(Some(target)) => {
                debug!("Expanded {} -> {}", candidate, target);
                target
            }
            Ok(None) => candidate,
            Err(e) => {
                debug!("Shortener expansion failed for {}: {}", candidate, e);
                candidate
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RdapDomain {
    #[serde(default)]
    events: Vec<RdapEvent>,
}

#[derive(Debug, Deserialize)]
struct RdapEvent {
    #[serde(rename = "eventAction")]
    action: String,
    #[serde(rename = "eventDate")]
    date: Option<String>,
}

/// Age in whole days of the `registration` event of an RDAP domain object.
///
/// `Ok(None)` when the event is missing, undated or not in the past.
pub fn registration_age_days(body: &str, now: DateTime<Utc>) -> Result<Option<u32>> {
    let domain: RdapDomain =
        serde_json::from_str(body).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let created = domain
        .events
        .iter()
        .find(|event| event.action.eq_ignore_ascii_case("registration"))
        .and_then(|event| event.date.as_deref())
        .and_then(parse_event_date);

    let Some(created) = created else {
        return Ok(None);
    };

    let days = (now - created).num_days();
    if days <= 0 {
        return Ok(None);
    }
    Ok(u32::try_from(days).ok())
}

fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Map a crt.sh JSON body to the CT flag: any entries means 0.
pub fn ct_flag_from_body(body: &str) -> u8 {
    match serde_json::from_str::<Value>(body) {
        Ok(value) if is_truthy(&value) => 0,
        _ => 1,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ProbeError::ParseError(format!("{}: {}", css, e)))
}

/// Host plus explicit port, lower-cased. Empty for URLs without a host.
fn netloc(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host.to_lowercase(), port),
        (Some(host), None) => host.to_lowercase(),
        _ => String::new(),
    }
}

/// Count forms, password inputs, iframes and the external/internal split of
/// image, script and stylesheet references.
pub fn parse_dom_metrics(html: &str, page_url: &Url) -> Result<DomMetrics> {
    let document = Html::parse_document(html);
    let page_host = netloc(page_url);

    let forms = document.select(&selector("form")?).count();
    let iframes = document.select(&selector("iframe")?).count();
    let has_password = document.select(&selector("input")?).any(|input| {
        input
            .value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("password"))
    });

    let mut external = 0usize;
    let mut internal = 0usize;
    for (tag, attr) in [("img", "src"), ("script", "src"), ("link", "href")] {
        let css = format!("{}[{}]", tag, attr);
        for element in document.select(&selector(&css)?) {
            let Some(reference) = element.value().attr(attr) else {
                continue;
            };
            let host = page_url
                .join(reference)
                .map(|resolved| netloc(&resolved))
                .unwrap_or_default();
            if !host.is_empty() && host != page_host {
                external += 1;
            } else {
                internal += 1;
            }
        }
    }

    Ok(DomMetrics::new(
        forms as u32,
        has_password,
        external as f64 / internal.max(1) as f64,
        iframes as u32,
    ))
}

/// Destination of the first `<meta http-equiv="refresh">` tag, if any.
pub fn meta_refresh_target(html: &str, base: &Url) -> Result<Option<String>> {
    let document = Html::parse_document(html);

    let refresh = document.select(&selector("meta[http-equiv]")?).find(|meta| {
        meta.value()
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
    });
    let Some(content) = refresh.and_then(|meta| meta.value().attr("content")) else {
        return Ok(None);
    };

    for part in content.split(';').map(str::trim) {
        if part.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("url=")) {
            let target = part[4..].trim_matches(|c| c == ' ' || c == '\'' || c == '"');
            return Ok(base.join(target).ok().map(|u| u.to_string()));
        }
    }
    Ok(None)
}
