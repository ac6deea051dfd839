//! Day-chunk fan-out.
//!
//! A window is queried as consecutive day-sized ranges, all in flight at
//! once. Results are concatenated in chunk order so the output does not
//! depend on which request finishes first. Adjacent chunks share their
//! boundary instant; a sample sitting exactly on it comes back twice and is
//! deduplicated downstream.

use crate::sources::SeriesSource;
use chrono::Duration;
use futures::future::try_join_all;
use incident_timeline_core::{records::TimeWindow, series::RawSeries, Result};
use tracing::{debug, info};

/// Split `range` into consecutive day-sized ranges.
///
/// The last chunk is cut short at `range.end`. An inverted range yields no
/// chunks; an empty one yields a single zero-length chunk.
pub fn day_chunks(range: &TimeWindow) -> Vec<TimeWindow> {
    if range.start > range.end {
        return Vec::new();
    }

    let day = Duration::days(1);
    let mut chunks = Vec::new();
    let mut start = range.start;

    loop {
        let end = (start + day).min(range.end);
        chunks.push(TimeWindow::new(start, end));
        if end >= range.end {
            break;
        }
        start = end;
    }
    chunks
}

/// Fetch `range` from `source` one day at a time, concurrently.
///
/// Fails if any chunk fails.
pub async fn fetch_chunked<S>(source: &S, range: &TimeWindow) -> Result<Vec<RawSeries>>
where
    S: SeriesSource + ?Sized,
{
    let chunks = day_chunks(range);
    debug!(source = source.name(), chunks = chunks.len(), "Fetching day chunks");

    let results = try_join_all(chunks.iter().map(|chunk| source.fetch(chunk))).await?;
    let series: Vec<RawSeries> = results.into_iter().flatten().collect();

    info!(
        source = source.name(),
        chunks = chunks.len(),
        series = series.len(),
        "Fetched series"
    );
    Ok(series)
}
