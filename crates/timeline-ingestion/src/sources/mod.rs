//! # Series Sources
//!
//! Where raw incident and alert series come from.
//!
//! A source answers one range query at a time; fanning a window out into
//! day-sized queries is done by [`crate::chunking::fetch_chunked`]. Sources
//! return whatever the backend holds for the range. Duplicates across
//! overlapping queries are expected and are removed by the pipeline.
//!
//! Accepted payloads:
//! - a bare array `[{ "metric": {...}, "values": [[ts, code], ...] }, ...]`
//! - a query-API envelope `{ "status": "success", "data": { "result": [...] } }`

pub mod file;

pub use file::FileSource;

use async_trait::async_trait;
use incident_timeline_core::{records::TimeWindow, series::RawSeries, Error, Result};
use serde::Deserialize;

/// Common trait for all series sources
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Fetch every series with samples inside `range`
    async fn fetch(&self, range: &TimeWindow) -> Result<Vec<RawSeries>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Bare(Vec<RawSeries>),
    Envelope(Envelope),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    result: Vec<RawSeries>,
}

/// Decode a payload in either accepted shape.
///
/// An envelope reporting `"status": "error"` becomes [`Error::Upstream`].
pub fn decode_series(payload: &str) -> Result<Vec<RawSeries>> {
    match serde_json::from_str::<Payload>(payload)? {
        Payload::Bare(series) => Ok(series),
        Payload::Envelope(envelope) => {
            if envelope.status.as_deref() == Some("error") {
                return Err(Error::upstream(
                    envelope
                        .error
                        .unwrap_or_else(|| "query failed without a message".to_string()),
                ));
            }
            Ok(envelope.data.unwrap_or_default().result)
        }
    }
}

/// Keep only samples inside `range`; series left empty are dropped
pub fn restrict_to_range(series: Vec<RawSeries>, range: &TimeWindow) -> Vec<RawSeries> {
    series
        .into_iter()
        .filter_map(|mut s| {
            s.values.retain(|sample| range.contains_secs(sample.timestamp));
            (!s.values.is_empty()).then_some(s)
        })
        .collect()
}
