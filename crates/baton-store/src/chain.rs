//! Hash-chain primitives for knowledge store records.
//!
//! Hash input layout (bytes, in order):
//!   1. record_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. kind as UTF-8 bytes, then a 0 byte
//!   4. parent_id as UTF-8 bytes (empty for roots), then a 0 byte
//!   5. timestamp as RFC 3339 with nanoseconds
//!   6. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   7. canonical JSON of the attributes (keys sorted by `BTreeMap`)
//!
//! Events are appended after a record is hashed and are not covered.

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use baton_contracts::{
    error::{BatonError, BatonResult},
    record::Record,
};

/// `prev_hash` of the first record in a store.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the lowercase hex SHA-256 of a record's hashed fields.
///
/// `record.this_hash` and `record.events` are ignored.
pub fn hash_record(record: &Record) -> BatonResult<String> {
    let attributes = serde_json::to_vec(&record.attributes).map_err(|e| BatonError::StoreWrite {
        reason: format!("attributes of record {} do not serialize: {e}", record.record_id),
    })?;
    let parent = record
        .parent_id
        .map(|p| p.to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(record.record_id.to_string().as_bytes());
    hasher.update(record.sequence.to_le_bytes());
    hasher.update(record.kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(parent.as_bytes());
    hasher.update([0u8]);
    hasher.update(
        record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(record.prev_hash.as_bytes());
    hasher.update(&attributes);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify prev-hash linkage, sequence numbering, and hash correctness.
///
/// An empty chain is valid.
pub fn verify_chain(records: &[Record]) -> bool {
    let mut expected_prev = GENESIS_HASH.to_string();

    for (position, record) in records.iter().enumerate() {
        if record.sequence != position as u64 || record.prev_hash != expected_prev {
            return false;
        }
        match hash_record(record) {
            Ok(recomputed) if recomputed == record.this_hash => {}
            _ => return false,
        }
        expected_prev = record.this_hash.clone();
    }

    true
}
