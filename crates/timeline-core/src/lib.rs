//! # Incident Timeline Core
//!
//! Shared building blocks for the incident timeline pipeline.
//!
//! This crate provides:
//! - Severity ranks and opaque severity codes carried by samples
//! - Raw series as returned by the metrics backend, with label extraction
//! - Finalized incident, alert and table-row records
//! - Chart span types consumed by renderers
//! - Pipeline configuration and the shared error type

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod records;
pub mod series;
pub mod types;

pub use config::TimelineConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::TimelineConfig;
    pub use crate::error::{Error, Result};
    pub use crate::records::{
        Alert, AlertState, ChartRow, ChartSpan, FillKey, GroupedAlert, Incident, TimeWindow,
    };
    pub use crate::series::{AlertKey, AlertSeries, IncidentKey, IncidentSeries, RawSeries, TimelineRecord};
    pub use crate::types::{Sample, Severity, SeverityCode};
}
