//! Aggregation Compute Engine
//!
//! Pure computation of a named statistic over a batch of opaque records:
//! - `codec`: record wire form (hex of UTF-8 JSON with a numeric `value`)
//! - `engine`: sum / average / count / median over decoded values
//!
//! Decoding is all-or-nothing. A single undecodable record aborts the whole
//! computation; no partial results are ever produced.

pub mod codec;
pub mod engine;

pub use engine::{aggregate, compute};
