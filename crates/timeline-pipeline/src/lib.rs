//! # Incident Timeline Pipeline
//!
//! Reconstructs incident and alert intervals from noisy sample streams.
//!
//! Data flows consolidator → merger → lifecycle, then splits into the chart
//! segmenter and the table aggregator. All stages are synchronous and take
//! "now" as an argument; the only async piece is the [`RefreshRegistry`]
//! used by callers to supersede in-flight refreshes.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod aggregator;
pub mod consolidator;
pub mod lifecycle;
pub mod merger;
pub mod pipeline;
pub mod registry;
pub mod segmenter;

pub use aggregator::{aggregate_state, group_alerts_for_table};
pub use consolidator::{dedup_samples, split_on_gaps, Interval, SampleConsolidator};
pub use lifecycle::{assign_ordinals, clip_to_window, is_resolved, LifecycleDeriver};
pub use merger::merge_records;
pub use pipeline::{TimelinePipeline, TimelineSnapshot};
pub use registry::{RefreshRegistry, RefreshTicket};
pub use segmenter::{pad_values, ChartSegmenter};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::pipeline::{TimelinePipeline, TimelineSnapshot};
    pub use crate::registry::{RefreshRegistry, RefreshTicket};
    pub use incident_timeline_core::prelude::*;
}
