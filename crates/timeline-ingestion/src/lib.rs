//! # Incident Timeline Ingestion
//!
//! Boundary between the metrics backend and the pipeline.
//!
//! This crate provides:
//! - The [`SeriesSource`] seam implemented by concrete backends
//! - Payload decoding for bare series arrays and query-API envelopes
//! - [`FileSource`] for replaying captured responses
//! - Day-chunk fan-out with ordered concatenation

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod chunking;
pub mod sources;

pub use chunking::{day_chunks, fetch_chunked};
pub use sources::{decode_series, restrict_to_range, FileSource, SeriesSource};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chunking::{day_chunks, fetch_chunked};
    pub use crate::sources::{FileSource, SeriesSource};
}
