//! Severity ranks, severity codes and samples.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity rank with a total order: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Rank 0
    Info,
    /// Rank 1
    Warning,
    /// Rank 2
    Critical,
}

impl Severity {
    /// All severities, lowest first
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    /// Numeric rank as used on the wire
    pub fn rank(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Parse either encoding a producer may use: `"0".."2"` or the lowercase name.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "0" | "info" => Some(Self::Info),
            "1" | "warning" => Some(Self::Warning),
            "2" | "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| Error::validation(format!("unknown severity: {s}")))
    }
}

/// Severity code as emitted by the producing source.
///
/// The literal string is preserved so output keeps the producer's encoding.
/// Only the rank is interpreted, and only when two samples share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityCode(String);

impl SeverityCode {
    /// Wrap a raw code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The literal code
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rank of the code, `None` for state tokens such as `"firing"`
    pub fn rank(&self) -> Option<Severity> {
        Severity::from_code(&self.0)
    }

    /// Whether this code wins a same-timestamp tie against `other`.
    ///
    /// Unranked codes lose to every ranked code.
    pub fn outranks(&self, other: &SeverityCode) -> bool {
        self.rank() > other.rank()
    }
}

impl fmt::Display for SeverityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeverityCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for SeverityCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<Severity> for SeverityCode {
    fn from(severity: Severity) -> Self {
        Self(severity.rank().to_string())
    }
}

/// Largest timestamp magnitude (epoch seconds) kept on decode.
///
/// Chosen so the millisecond form and any `DateTime<Utc>` built from it
/// stay representable.
pub const MAX_TIMESTAMP_SECS: i64 = 8_000_000_000_000;

/// One observation: a timestamp in epoch seconds and a severity code.
///
/// Encoded on the wire as `[timestampSeconds, "code"]`; fractional seconds
/// are floored when decoding and out-of-range values are clamped to
/// `±MAX_TIMESTAMP_SECS` (NaN decodes as 0).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(f64, String)", into = "(i64, String)")]
pub struct Sample {
    /// Epoch seconds
    pub timestamp: i64,
    /// Severity code
    pub code: SeverityCode,
}

impl Sample {
    /// Create a sample
    pub fn new(timestamp: i64, code: impl Into<SeverityCode>) -> Self {
        Self {
            timestamp,
            code: code.into(),
        }
    }

    /// Timestamp in epoch milliseconds
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.saturating_mul(1000)
    }

    /// Synthetic copy placed `offset_secs` earlier with the same code
    pub fn shifted_back(&self, offset_secs: i64) -> Self {
        Self {
            timestamp: self.timestamp.saturating_sub(offset_secs),
            code: self.code.clone(),
        }
    }
}

impl From<(f64, String)> for Sample {
    fn from((timestamp, code): (f64, String)) -> Self {
        let bound = MAX_TIMESTAMP_SECS as f64;
        let secs = if timestamp.is_nan() {
            0
        } else {
            timestamp.floor().clamp(-bound, bound) as i64
        };
        Self::new(secs, code)
    }
}

impl From<Sample> for (i64, String) {
    fn from(sample: Sample) -> Self {
        (sample.timestamp, sample.code.0)
    }
}
