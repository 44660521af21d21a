pub mod error;
pub mod probe;
pub mod result;

pub use error::ProbeError;
pub use probe::{Enricher, ProbeSettings, Prober};
pub use result::{DomMetrics, ProbeOutcome};
