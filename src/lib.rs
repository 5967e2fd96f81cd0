//! ntp-probe - multi-version NTP measurement client.
//!
//! Builds requests for NTP versions 1 through 5 (both NTPv5 draft header
//! layouts), decodes whatever version the server answers with and computes
//! clock offset and round-trip delay. NTS measurements are supported through
//! an external key-exchange provider.
//!
//! # Usage
//!
//! Measure one version:
//! ```bash
//! ntp-probe ntpv4 time.example.net
//! ```
//!
//! Scan every version:
//! ```bash
//! ntp-probe allntpv time.example.net -t 3 -d
//! ```

/// Command-line configuration and validation.
pub mod configuration;
/// Per-measurement debug trace.
pub mod debug_log;
/// Single-exchange measurement over UDP.
pub mod measurement;
/// NTS measurements via an external key exchange.
pub mod nts;
/// NTP header layouts and wire serialization.
pub mod packets;
/// Response decoding for every header layout.
pub mod parser;
/// Normalized results and text/JSON rendering.
pub mod report;
/// Client request construction.
pub mod request;
/// Sequential scan over all protocol versions.
pub mod scan;
/// NTP timestamp conversions.
pub mod time;
/// Offset and round-trip delay computation.
pub mod timing;
/// Extension field support per RFC 7822.
pub mod tlv;
/// Protocol version and NTPv5 draft identifiers.
pub mod version;
