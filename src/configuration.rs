use std::time::Duration;

pub use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::measurement::{MeasureOptions, DEFAULT_TIMEOUT, NTP_PORT};
use crate::report::OutputFormat;
use crate::version::{NtpVersion, V5Draft, DRAFT_05, DRAFT_06};

/// Exit code for a malformed command line.
pub const EXIT_INVALID_CONFIGURATION: i32 = -100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("timeout must be > 0, got {0}")]
    InvalidTimeout(f64),

    #[error("draft_ntpv5 mode requires --draft")]
    MissingDraft,
}

/// What to measure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProbeMode {
    #[value(name = "ntpv1")]
    Ntpv1,
    #[value(name = "ntpv2")]
    Ntpv2,
    #[value(name = "ntpv3")]
    Ntpv3,
    #[value(name = "ntpv4")]
    Ntpv4,
    #[value(name = "ntpv5")]
    Ntpv5,
    /// NTPv5 with an explicit draft identification.
    #[value(name = "draft_ntpv5")]
    DraftNtpv5,
    /// Every version from 1 to 5, one after another.
    #[value(name = "allntpv")]
    AllVersions,
}

impl ProbeMode {
    /// The single version this mode probes, `None` for a full scan.
    pub fn version(self) -> Option<NtpVersion> {
        match self {
            ProbeMode::Ntpv1 => Some(NtpVersion::V1),
            ProbeMode::Ntpv2 => Some(NtpVersion::V2),
            ProbeMode::Ntpv3 => Some(NtpVersion::V3),
            ProbeMode::Ntpv4 => Some(NtpVersion::V4),
            ProbeMode::Ntpv5 | ProbeMode::DraftNtpv5 => Some(NtpVersion::V5),
            ProbeMode::AllVersions => None,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Configuration {
    /// Measurement mode
    #[arg(value_enum)]
    pub mode: ProbeMode,
    /// Server host name or IP address
    pub host: String,
    /// NTPv5 draft to request, e.g. draft-ietf-ntp-ntpv5-06
    #[arg(long)]
    pub draft: Option<String>,
    /// Seconds to wait for a reply
    #[arg(short = 't', long, default_value_t = 7.0)]
    pub timeout: f64,
    /// Print the debug trace of each measurement
    #[arg(short, long)]
    pub debug: bool,
    /// Server UDP port
    #[arg(short = 'p', long, default_value_t = NTP_PORT)]
    pub port: u16,
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.timeout <= 0.0 || Duration::try_from_secs_f64(self.timeout).is_err() {
            return Err(ConfigurationError::InvalidTimeout(self.timeout));
        }

        match self.draft.as_deref() {
            Some(draft) if !V5Draft::is_known(draft) => {
                log::warn!(
                    "draft can be either {} or {}. The {} header will be used for parsing",
                    DRAFT_05,
                    DRAFT_06,
                    DRAFT_05
                );
            }
            None if self.mode == ProbeMode::DraftNtpv5 => {
                return Err(ConfigurationError::MissingDraft);
            }
            _ => {}
        }

        Ok(())
    }

    /// Library-level options. A timeout `validate()` would reject falls back
    /// to the default.
    pub fn measure_options(&self) -> MeasureOptions {
        MeasureOptions {
            timeout: Duration::try_from_secs_f64(self.timeout).unwrap_or(DEFAULT_TIMEOUT),
            draft: self.draft.clone().filter(|d| !d.is_empty()),
            port: self.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Configuration {
        Configuration::try_parse_from(std::iter::once("ntp-probe").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let conf = parse(&["ntpv4", "time.example.net"]);
        assert_eq!(conf.mode, ProbeMode::Ntpv4);
        assert_eq!(conf.host, "time.example.net");
        assert_eq!(conf.timeout, 7.0);
        assert_eq!(conf.port, 123);
        assert_eq!(conf.output, OutputFormat::Json);
        assert!(!conf.debug);
        assert!(conf.validate().is_ok());

        let opts = conf.measure_options();
        assert_eq!(opts.timeout, Duration::from_secs(7));
        assert!(opts.draft.is_none());
    }

    #[test]
    fn test_all_flags() {
        let conf = parse(&[
            "ntpv5",
            "192.0.2.1",
            "--draft",
            "draft-ietf-ntp-ntpv5-06",
            "-t",
            "2.5",
            "-d",
            "-p",
            "10123",
            "-o",
            "text",
        ]);
        assert_eq!(conf.mode.version(), Some(NtpVersion::V5));
        assert!(conf.debug);
        assert_eq!(conf.output, OutputFormat::Text);

        let opts = conf.measure_options();
        assert_eq!(opts.timeout, Duration::from_millis(2500));
        assert_eq!(opts.draft.as_deref(), Some("draft-ietf-ntp-ntpv5-06"));
        assert_eq!(opts.port, 10123);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(parse(&["allntpv", "h"]).mode.version(), None);
        assert_eq!(parse(&["draft_ntpv5", "h", "--draft", "x"]).mode, ProbeMode::DraftNtpv5);
        assert!(Configuration::try_parse_from(["ntp-probe", "ntpv6", "h"]).is_err());
        assert!(Configuration::try_parse_from(["ntp-probe", "ntpv4"]).is_err());
    }

    #[test]
    fn test_rejects_non_positive_timeout() {
        let conf = parse(&["ntpv3", "h", "-t", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::InvalidTimeout(0.0)));
        let conf = parse(&["ntpv3", "h", "--timeout=-1.5"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::InvalidTimeout(-1.5)));
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let conf = parse(&["ntpv4", "h", "-t", "1e20"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::InvalidTimeout(1e20)));
        assert_eq!(conf.measure_options().timeout, DEFAULT_TIMEOUT);

        let conf = parse(&["ntpv4", "h", "-t", "inf"]);
        assert!(conf.validate().is_err());
        let conf = parse(&["ntpv4", "h", "-t", "NaN"]);
        assert!(conf.validate().is_err());
    }

    #[test]
    fn test_unknown_draft_only_warns() {
        let conf = parse(&["ntpv5", "h", "--draft", "draft-ietf-ntp-ntpv5-09"]);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_draft_mode_needs_draft() {
        let conf = parse(&["draft_ntpv5", "h"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::MissingDraft));
    }
}
