use chrono::{DateTime, Utc};

/// Converts a message's `time` field (seconds since the Unix epoch, as a
/// float) into a `DateTime<Utc>`. Messages with an out-of-range or
/// otherwise unrepresentable timestamp fall back to the epoch rather than
/// panicking -- malformed timestamps are caught earlier, during content
/// parsing.
pub fn timestamp_to_datetime(time: f64) -> DateTime<Utc> {
    let secs = time.trunc() as i64;
    let nanos = ((time.fract()) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_whole_seconds() {
        let dt = timestamp_to_datetime(1_700_000_000.0);
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn keeps_fractional_precision() {
        let dt = timestamp_to_datetime(1_700_000_000.5);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }
}
