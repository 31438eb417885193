//! Statistic computation over decoded record values
//!
//! All arithmetic is `Decimal`, so results are exact and deterministic across
//! runs and platforms.

use rust_decimal::Decimal;
use tracing::debug;
use types::aggregation::AggregationType;
use types::errors::ComputeError;
use types::request::EncryptedRecord;

use crate::codec::decode_batch;

/// Decode a batch and compute the requested statistic.
///
/// Every record is decoded first; any decode failure aborts the computation.
pub fn compute(records: &[EncryptedRecord], kind: AggregationType) -> Result<Decimal, ComputeError> {
    let values = decode_batch(records)?;
    let result = aggregate(&values, kind)?;

    debug!(
        aggregation = %kind,
        records = records.len(),
        result = %result,
        "Aggregation computed"
    );

    Ok(result)
}

/// Compute a statistic over already-decoded values.
pub fn aggregate(values: &[Decimal], kind: AggregationType) -> Result<Decimal, ComputeError> {
    match kind {
        AggregationType::Sum => checked_sum(values, kind),
        AggregationType::Average => {
            if values.is_empty() {
                return Err(empty(kind));
            }
            let sum = checked_sum(values, kind)?;
            sum.checked_div(Decimal::from(values.len()))
                .ok_or_else(|| overflow(kind))
        }
        AggregationType::Count => Ok(Decimal::from(values.len())),
        AggregationType::Median => median(values),
    }
}

fn checked_sum(values: &[Decimal], kind: AggregationType) -> Result<Decimal, ComputeError> {
    values.iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(*v).ok_or_else(|| overflow(kind))
    })
}

/// Odd length: the central value. Even length: mean of the two central values.
fn median(values: &[Decimal]) -> Result<Decimal, ComputeError> {
    let kind = AggregationType::Median;
    if values.is_empty() {
        return Err(empty(kind));
    }

    let mut sorted = values.to_vec();
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Ok(sorted[mid]);
    }

    let pair = sorted[mid - 1]
        .checked_add(sorted[mid])
        .ok_or_else(|| overflow(kind))?;
    Ok(pair / Decimal::TWO)
}

fn empty(kind: AggregationType) -> ComputeError {
    ComputeError::EmptyInput {
        aggregation: kind.to_string(),
    }
}

fn overflow(kind: AggregationType) -> ComputeError {
    ComputeError::Overflow {
        aggregation: kind.to_string(),
    }
}
