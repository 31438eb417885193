//! Record wire codec
//!
//! Records travel as hex strings (optionally `0x`-prefixed) of UTF-8 JSON
//! objects. The only field the engine reads is the numeric `value`; fields such
//! as `timestamp`, `index` or `companyId` are carried along and ignored.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use types::errors::ComputeError;
use types::request::EncryptedRecord;

/// Decode one record into its numeric value.
///
/// `index` is the record's position in the batch and is reported back in
/// `ComputeError::DecodeError`.
pub fn decode_record(index: usize, record: &EncryptedRecord) -> Result<Decimal, ComputeError> {
    let fail = |reason: String| ComputeError::DecodeError { index, reason };

    let wire = record.as_str().trim();
    let hex_str = wire
        .strip_prefix("0x")
        .or_else(|| wire.strip_prefix("0X"))
        .unwrap_or(wire);

    let bytes = hex::decode(hex_str).map_err(|e| fail(format!("invalid hex: {}", e)))?;
    let text = String::from_utf8(bytes).map_err(|e| fail(format!("invalid utf-8: {}", e)))?;
    let json: Value =
        serde_json::from_str(&text).map_err(|e| fail(format!("invalid json: {}", e)))?;

    match json.get("value") {
        Some(Value::Number(n)) => number_to_decimal(n).ok_or_else(|| fail(format!("value {} out of range", n))),
        Some(other) => Err(fail(format!("non-numeric value: {}", other))),
        None => Err(fail("missing value field".to_string())),
    }
}

/// Decode every record of a batch, in order. Fails on the first bad record.
pub fn decode_batch(records: &[EncryptedRecord]) -> Result<Vec<Decimal>, ComputeError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| decode_record(index, record))
        .collect()
}

/// Encode a JSON record into its `0x`-prefixed wire form.
pub fn encode_record(record: &Value) -> EncryptedRecord {
    EncryptedRecord::new(format!("0x{}", hex::encode(record.to_string())))
}

/// Encode a bare value as a minimal record.
pub fn encode_value(value: i64) -> EncryptedRecord {
    encode_record(&serde_json::json!({ "value": value }))
}

fn number_to_decimal(n: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
