//! Shared helpers for PostgreSQL row conversion.

use gavel_core::error::{StorageError, StorageResult};

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error naming the offending field if the length doesn't
/// match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::Serialization(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Parse a NUMERIC-rendered amount string to u128.
pub fn parse_amount(s: &str, field_name: &str) -> StorageResult<u128> {
    s.parse().map_err(|e| {
        StorageError::Serialization(format!(
            "{} parse error: {} (value: {})",
            field_name, e, s
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Errors must name the field so a bad row is debuggable.
    #[test]
    fn error_includes_field_name() {
        let bad_bytes = vec![1u8; 16];
        let err = bytes_to_hash32(bad_bytes, "block.parent_hash").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("block.parent_hash"));
        assert!(msg.contains("expected 32"));
    }

    #[test]
    fn amounts_above_u64_parse() {
        let value = u128::MAX.to_string();
        assert_eq!(parse_amount(&value, "bid.amount").unwrap(), u128::MAX);
    }

    #[test]
    fn negative_amount_is_rejected() {
        let err = parse_amount("-5", "bid.amount").unwrap_err();
        assert!(err.to_string().contains("bid.amount"));
    }
}
