use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::measurement::{measure, MeasureOptions, Probe};
use crate::report::MeasurementResult;
use crate::version::NtpVersion;

/// Pause between consecutive probes of the same server.
pub const PROBE_SPACING: Duration = Duration::from_millis(500);

/// What a single version probe produced.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProbeBody {
    Measured(Box<MeasurementResult>),
    Failed { error: String },
}

/// Report entry for one protocol version.
#[derive(Debug, Serialize)]
pub struct VersionEntry {
    #[serde(rename = "type")]
    pub label: String,
    pub result: ProbeBody,
    pub return_code: i32,
}

impl VersionEntry {
    /// Builds the entry for `version`, handing back the probe's debug log.
    pub fn from_probe(version: NtpVersion, probe: Probe) -> (Self, String) {
        let return_code = probe.code();
        let result = match probe.outcome {
            Ok(result) => ProbeBody::Measured(Box::new(result)),
            Err(e) => ProbeBody::Failed {
                error: e.to_string(),
            },
        };
        (
            VersionEntry {
                label: version.label().to_string(),
                result,
                return_code,
            },
            probe.debug_log,
        )
    }
}

/// Aggregate of a full version scan, keyed by `ntpv1`..`ntpv5`.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    #[serde(flatten)]
    pub entries: BTreeMap<String, VersionEntry>,
    /// Concatenated debug logs, one section per version.
    #[serde(skip)]
    pub debug_log: String,
}

impl ScanReport {
    /// The scan itself always succeeds; per-version codes live in the entries.
    pub fn code(&self) -> i32 {
        0
    }
}

/// Probes `host` with every version in turn.
///
/// Probes never overlap and are spaced by [`PROBE_SPACING`]. A failing
/// version is recorded and the scan moves on.
pub async fn scan_all_versions(host: &str, opts: &MeasureOptions) -> ScanReport {
    let mut entries = BTreeMap::new();
    let mut debug_log = String::new();

    for (i, version) in NtpVersion::ALL.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(PROBE_SPACING).await;
        }

        log::info!("Scanning {} with {}", host, version);
        let probe = measure(host, version, opts).await;
        let (entry, probe_log) = VersionEntry::from_probe(version, probe);

        debug_log.push_str(&format!("--- {} ---\n", version));
        debug_log.push_str(&probe_log);
        entries.insert(version.label().to_string(), entry);
    }

    ScanReport { entries, debug_log }
}
