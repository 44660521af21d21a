use serde::{Deserialize, Serialize};

/// Outcome of a single enrichment probe.
///
/// Probes never return errors to their caller. A transport failure or a
/// timeout is `Failed`, a lookup that completed but carried no usable answer
/// is `Unknown`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    Value(T),
    Unknown,
    Failed(String),
}

impl<T> From<crate::error::Result<Option<T>>> for ProbeOutcome<T> {
    fn from(result: crate::error::Result<Option<T>>) -> Self {
        match result {
            Ok(Some(v)) => ProbeOutcome::Value(v),
            Ok(None) => ProbeOutcome::Unknown,
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        }
    }
}

/// Structural page metrics gathered by the DOM probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomMetrics {
    pub forms: u32,
    pub has_password: bool,
    pub ext_int_ratio: f64,
    pub iframes: u32,
}

impl DomMetrics {
    pub fn new(forms: u32, has_password: bool, ext_int_ratio: f64, iframes: u32) -> Self {
        Self {
            forms,
            has_password,
            ext_int_ratio,
            iframes,
        }
    }
}
