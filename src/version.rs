use std::fmt;

use clap::ValueEnum;

/// Draft identifier of the NTPv5 header with stratum..era ahead of root delay.
pub const DRAFT_05: &str = "draft-ietf-ntp-ntpv5-05";
/// Draft identifier of the NTPv5 header with root delay/dispersion ahead of timescale.
pub const DRAFT_06: &str = "draft-ietf-ntp-ntpv5-06";

/// NTP protocol version requested by the client.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, ValueEnum)]
pub enum NtpVersion {
    /// NTPv1 (RFC 1059).
    #[value(name = "ntpv1")]
    V1,
    /// NTPv2 (RFC 1119).
    #[value(name = "ntpv2")]
    V2,
    /// NTPv3 (RFC 1305).
    #[value(name = "ntpv3")]
    V3,
    /// NTPv4 (RFC 5905).
    #[value(name = "ntpv4")]
    V4,
    /// NTPv5 (IETF draft).
    #[value(name = "ntpv5")]
    V5,
}

impl NtpVersion {
    /// All versions in probing order.
    pub const ALL: [NtpVersion; 5] = [
        NtpVersion::V1,
        NtpVersion::V2,
        NtpVersion::V3,
        NtpVersion::V4,
        NtpVersion::V5,
    ];

    /// Version number as carried in the VN field.
    pub fn number(self) -> u8 {
        match self {
            NtpVersion::V1 => 1,
            NtpVersion::V2 => 2,
            NtpVersion::V3 => 3,
            NtpVersion::V4 => 4,
            NtpVersion::V5 => 5,
        }
    }

    /// Maps a VN field value to a version, if it is one we speak.
    pub fn from_number(vn: u8) -> Option<Self> {
        match vn {
            1 => Some(NtpVersion::V1),
            2 => Some(NtpVersion::V2),
            3 => Some(NtpVersion::V3),
            4 => Some(NtpVersion::V4),
            5 => Some(NtpVersion::V5),
            _ => None,
        }
    }

    /// Label used for reports, e.g. `ntpv3`.
    pub fn label(self) -> &'static str {
        match self {
            NtpVersion::V1 => "ntpv1",
            NtpVersion::V2 => "ntpv2",
            NtpVersion::V3 => "ntpv3",
            NtpVersion::V4 => "ntpv4",
            NtpVersion::V5 => "ntpv5",
        }
    }
}

impl fmt::Display for NtpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// NTPv5 header layout revision.
///
/// Nothing on the wire says which draft a server implements, so the choice is
/// driven by the caller's hint.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum V5Draft {
    #[default]
    Draft05,
    Draft06,
}

impl V5Draft {
    /// Picks the layout for a hint, falling back to draft-05 for anything
    /// other than the exact draft-06 identifier.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some(DRAFT_06) => V5Draft::Draft06,
            _ => V5Draft::Draft05,
        }
    }

    /// Returns true when `hint` names a draft we have a layout for.
    pub fn is_known(hint: &str) -> bool {
        hint == DRAFT_05 || hint == DRAFT_06
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(NtpVersion::from_str("ntpv1", false).unwrap(), NtpVersion::V1);
        assert_eq!(NtpVersion::from_str("ntpv5", false).unwrap(), NtpVersion::V5);
        assert!(NtpVersion::from_str("ntpv6", false).is_err());
        assert!(NtpVersion::from_str("", false).is_err());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(NtpVersion::V2.to_string(), "ntpv2");
        assert_eq!(NtpVersion::V4.to_string(), "ntpv4");
    }

    #[test]
    fn test_version_number_roundtrip() {
        for v in NtpVersion::ALL {
            assert_eq!(NtpVersion::from_number(v.number()), Some(v));
        }
        assert_eq!(NtpVersion::from_number(0), None);
        assert_eq!(NtpVersion::from_number(6), None);
        assert_eq!(NtpVersion::from_number(7), None);
    }

    #[test]
    fn test_draft_hint_defaults_to_05() {
        assert_eq!(V5Draft::from_hint(None), V5Draft::Draft05);
        assert_eq!(V5Draft::from_hint(Some("")), V5Draft::Draft05);
        assert_eq!(V5Draft::from_hint(Some("draft-ietf-ntp-ntpv5-04")), V5Draft::Draft05);
        assert_eq!(V5Draft::from_hint(Some(DRAFT_05)), V5Draft::Draft05);
        assert_eq!(V5Draft::from_hint(Some(DRAFT_06)), V5Draft::Draft06);
    }

    #[test]
    fn test_draft_is_known() {
        assert!(V5Draft::is_known(DRAFT_05));
        assert!(V5Draft::is_known(DRAFT_06));
        assert!(!V5Draft::is_known("draft-ietf-ntp-ntpv5-07"));
    }
}
