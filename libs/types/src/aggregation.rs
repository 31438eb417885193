//! Supported statistics and the minimum-record policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ComputeError;

/// Minimum number of records any statistic may be computed over.
///
/// Bounds re-identification risk for individual contributors. Not configurable.
pub const MIN_RECORDS: u64 = 10;

/// Statistic requested over a company's record set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Average,
    Count,
    Median,
}

impl AggregationType {
    pub const ALL: [AggregationType; 4] = [
        AggregationType::Sum,
        AggregationType::Average,
        AggregationType::Count,
        AggregationType::Median,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Average => "average",
            AggregationType::Count => "count",
            AggregationType::Median => "median",
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the raw string stored on the ledger. Case-insensitive.
impl FromStr for AggregationType {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregationType::Sum),
            "average" => Ok(AggregationType::Average),
            "count" => Ok(AggregationType::Count),
            "median" => Ok(AggregationType::Median),
            _ => Err(ComputeError::UnsupportedAggregation(s.to_string())),
        }
    }
}

/// Whether a record count satisfies the minimum-record policy
pub fn meets_minimum(count: u64) -> bool {
    count >= MIN_RECORDS
}
