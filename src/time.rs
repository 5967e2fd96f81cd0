use chrono::{DateTime, Utc};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
pub const NTP_UNIX_OFFSET: i64 = 2208988800;

const FRACTION_SCALE: f64 = 4294967296.0;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Captures the current wall-clock time as an NTP64 timestamp.
///
/// The upper 32 bits carry whole seconds since 1900-01-01 UTC, the lower 32 bits
/// the binary fraction of a second.
///
/// ```
/// use ntp_probe::time::{now_to_ntp64, ntp64_to_seconds};
/// let now = now_to_ntp64();
/// println!("NTP seconds: {}", ntp64_to_seconds(now));
/// ```
pub fn now_to_ntp64() -> u64 {
    time_to_ntp64(Utc::now())
}

/// Encodes a UTC date and time as an NTP64 timestamp.
///
/// Seconds wrap modulo 2^32 (era 0 ends in 2036).
pub fn time_to_ntp64(date: DateTime<Utc>) -> u64 {
    let secs = (date.timestamp() + NTP_UNIX_OFFSET) as u32;
    let fraction = ((date.timestamp_subsec_nanos() as u64) << 32) / NANOS_PER_SEC;

    ((secs as u64) << 32) | fraction
}

/// Decodes an NTP64 timestamp (era 0) into a UTC date and time.
pub fn ntp64_to_time(ntp: u64) -> DateTime<Utc> {
    let secs = (ntp >> 32) as i64 - NTP_UNIX_OFFSET;
    let fraction = ntp & 0xFFFF_FFFF;
    // Round to the nearest nanosecond so that encode/decode is stable.
    let nanos = ((fraction * NANOS_PER_SEC + (1 << 31)) >> 32).min(NANOS_PER_SEC - 1) as u32;

    DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Converts an NTP64 timestamp to floating seconds since the NTP epoch.
///
/// All timing arithmetic happens on these values rather than on the raw
/// fixed-point integers, which would overflow on subtraction.
pub fn ntp64_to_seconds(ntp: u64) -> f64 {
    let seconds = (ntp >> 32) as f64;
    let fraction = (ntp & 0xFFFF_FFFF) as f64 / FRACTION_SCALE;
    seconds + fraction
}

/// Decodes a 16.16 fixed-point field (root delay, root dispersion) into seconds.
pub fn time32_to_seconds(value: u32) -> f64 {
    let whole = value >> 16;
    let fraction = value & 0xFFFF;
    whole as f64 + fraction as f64 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_to_ntp64_test() {
        const TEST_CASES: &[(i64, u32)] = &[(1_525_987, 0), (0, 0), (2_584_229, 151_000_000)];

        for &(secs, nanos) in TEST_CASES {
            let sample = DateTime::<Utc>::from_timestamp(secs, nanos).expect("Invalid timestamp");
            let test_val = time_to_ntp64(sample);

            let expected_secs = secs + NTP_UNIX_OFFSET;
            let actual_secs = (test_val >> 32) as i64;
            assert_eq!(actual_secs, expected_secs, "Mismatch in seconds field");

            let ntp_frac = test_val & 0xFFFF_FFFF;
            let actual_nanos = (ntp_frac * NANOS_PER_SEC) >> 32;
            assert!(
                (nanos as i64 - actual_nanos as i64).abs() <= 1,
                "Mismatch in fractional nanos: expected {}, got {}",
                nanos,
                actual_nanos
            );
        }
    }

    #[test]
    fn ntp64_time_roundtrip_within_one_nanosecond() {
        const TEST_CASES: &[(i64, u32)] = &[
            (0, 0),
            (1_700_000_000, 1),
            (1_700_000_000, 999_999_999),
            (1_234_567_890, 123_456_789),
        ];

        for &(secs, nanos) in TEST_CASES {
            let sample = DateTime::<Utc>::from_timestamp(secs, nanos).expect("Invalid timestamp");
            let back = ntp64_to_time(time_to_ntp64(sample));
            let diff = (back - sample).num_nanoseconds().expect("diff overflow");
            assert!(diff.abs() <= 1, "roundtrip drifted by {}ns", diff);
        }
    }

    #[test]
    fn ntp64_to_time_unix_epoch() {
        let ntp = (NTP_UNIX_OFFSET as u64) << 32;
        assert_eq!(ntp64_to_time(ntp), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn ntp64_to_seconds_splits_fraction() {
        assert_eq!(ntp64_to_seconds(0), 0.0);
        assert_eq!(ntp64_to_seconds(1 << 32), 1.0);
        assert_eq!(ntp64_to_seconds((5 << 32) | 0x8000_0000), 5.5);
        assert_eq!(ntp64_to_seconds((7 << 32) | 0x4000_0000), 7.25);
    }

    #[test]
    fn now_is_monotonic_on_unadjusted_clock() {
        let mut last = ntp64_to_seconds(now_to_ntp64());
        for _ in 0..1000 {
            let next = ntp64_to_seconds(now_to_ntp64());
            assert!(next >= last, "clock went backwards: {} < {}", next, last);
            last = next;
        }
    }

    #[test]
    fn now_is_after_ntp_era_start_of_unix() {
        assert!(now_to_ntp64() >> 32 > NTP_UNIX_OFFSET as u64);
    }

    #[test]
    fn time32_to_seconds_test() {
        assert_eq!(time32_to_seconds(0), 0.0);
        assert_eq!(time32_to_seconds(0x0001_0000), 1.0);
        assert_eq!(time32_to_seconds(0x0000_8000), 0.5);
        assert_eq!(time32_to_seconds(0x0002_4000), 2.25);
    }
}
