//! Snowflake pagination-cursor derivation
//!
//! Discord message ids are snowflakes: the high 42 bits carry the
//! creation time as milliseconds since the Discord epoch
//! (2015-01-01T00:00:00Z). A synthetic id built from a timestamp alone
//! sorts correctly against real ids, which is all a pagination cursor
//! needs. The reverse mapping is never required here.

use chrono::{DateTime, Utc};

/// Milliseconds of the Discord epoch relative to the Unix epoch
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Derive a snowflake cursor id from a timestamp.
///
/// Instants before the Discord epoch clamp to zero.
pub fn from_timestamp(instant: DateTime<Utc>) -> String {
    let offset_ms = (instant.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
    (offset_ms << 22).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn epoch_maps_to_zero() {
        let epoch = Utc.timestamp_millis_opt(DISCORD_EPOCH_MS).unwrap();
        assert_eq!(from_timestamp(epoch), "0");
    }

    #[test]
    fn known_timestamp_round_trips_through_shift() {
        // 2023-01-01T00:00:00Z
        let instant = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let id: u64 = from_timestamp(instant).parse().unwrap();
        assert_eq!(
            (id >> 22) as i64,
            instant.timestamp_millis() - DISCORD_EPOCH_MS
        );
    }

    #[test]
    fn cursor_ordering_follows_time_ordering() {
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap();
        let a: u64 = from_timestamp(earlier).parse().unwrap();
        let b: u64 = from_timestamp(later).parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn pre_epoch_instant_clamps_to_zero() {
        let instant = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(from_timestamp(instant), "0");
    }
}
