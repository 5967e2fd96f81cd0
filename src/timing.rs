//! Four-timestamp offset and round-trip delay (RFC 5905 Section 8).
//!
//! ```text
//!   client            server
//!     t1 ----request---> t2
//!     t4 <---response--- t3
//! ```

use crate::time::ntp64_to_seconds;

/// Clock offset and round-trip delay of one exchange, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTrip {
    /// Estimated offset of the server clock relative to ours.
    pub offset: f64,
    /// Round-trip delay with server processing time removed.
    pub rtt: f64,
}

impl RoundTrip {
    /// Computes offset and delay from four timestamps in floating seconds.
    ///
    /// No era wraparound handling: all four values are assumed to be in the
    /// same NTP era.
    pub fn from_seconds(t1: f64, t2: f64, t3: f64, t4: f64) -> Self {
        RoundTrip {
            offset: ((t2 - t1) + (t3 - t4)) / 2.0,
            rtt: (t4 - t1) - (t3 - t2),
        }
    }

    /// Computes offset and delay from four raw NTP64 timestamps.
    pub fn from_ntp64(t1: u64, t2: u64, t3: u64, t4: u64) -> Self {
        Self::from_seconds(
            ntp64_to_seconds(t1),
            ntp64_to_seconds(t2),
            ntp64_to_seconds(t3),
            ntp64_to_seconds(t4),
        )
    }
}
