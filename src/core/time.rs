//! Wall-clock timestamps for log entries.
//!
//! Entry timestamps are seconds-granularity and exist for the log
//! cleaner's age-based policy, not for ordering. Ordering comes from
//! versions; timestamps may drift across machines and that is acceptable.

/// Seconds since the Unix epoch, truncated to 32 bits.
///
/// Stored in OBJECT and TOMBSTONE entries so the cleaner can prefer
/// reclaiming colder segments.
pub fn seconds_timestamp() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_timestamp_nonzero() {
        assert!(seconds_timestamp() > 0);
    }
}
