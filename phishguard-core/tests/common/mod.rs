// Shared test doubles

#![allow(dead_code)]

use phishguard_scanner::{DomMetrics, Enricher, ProbeOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How many times each signal was requested.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCalls {
    pub age: usize,
    pub ct: usize,
    pub dom: usize,
}

impl ProbeCalls {
    pub fn each(n: usize) -> Self {
        Self { age: n, ct: n, dom: n }
    }
}

/// Canned enrichment answers that count how often they were asked.
pub struct StubEnricher {
    pub age: ProbeOutcome<u32>,
    pub ct: ProbeOutcome<u8>,
    pub dom: ProbeOutcome<DomMetrics>,
    pub delay: Duration,
    age_calls: AtomicUsize,
    ct_calls: AtomicUsize,
    dom_calls: AtomicUsize,
}

impl StubEnricher {
    /// Old domain, known to CT, one login form.
    pub fn healthy() -> Self {
        Self {
            age: ProbeOutcome::Value(10_000),
            ct: ProbeOutcome::Value(0),
            dom: ProbeOutcome::Value(DomMetrics::new(1, true, 0.0, 0)),
            delay: Duration::ZERO,
            age_calls: AtomicUsize::new(0),
            ct_calls: AtomicUsize::new(0),
            dom_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            age: ProbeOutcome::Failed("connection refused".into()),
            ct: ProbeOutcome::Failed("timed out".into()),
            dom: ProbeOutcome::Failed("connection reset".into()),
            delay: Duration::ZERO,
            age_calls: AtomicUsize::new(0),
            ct_calls: AtomicUsize::new(0),
            dom_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of enrichment fetches, counted once per domain lookup.
    pub fn fetches(&self) -> usize {
        self.age_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> ProbeCalls {
        ProbeCalls {
            age: self.age_calls.load(Ordering::SeqCst),
            ct: self.ct_calls.load(Ordering::SeqCst),
            dom: self.dom_calls.load(Ordering::SeqCst),
        }
    }
}

impl Enricher for StubEnricher {
    async fn domain_age(&self, _domain: &str) -> ProbeOutcome<u32> {
        self.age_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.age.clone()
    }

    async fn ct_flag(&self, _domain: &str) -> ProbeOutcome<u8> {
        self.ct_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.ct.clone()
    }

    async fn dom_metrics(&self, _url: &str) -> ProbeOutcome<DomMetrics> {
        self.dom_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.dom.clone()
    }
}
