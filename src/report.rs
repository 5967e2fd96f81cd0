//! Normalized measurement records and their text/JSON rendering.
//!
//! Every decoder, whatever the wire layout, produces a [`MeasurementResult`].
//! Version-specific header fields live in [`HeaderFields`] and are flattened
//! into the same JSON object as the common fields.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::tlv::ExtensionField;

/// Output format for measurement reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One `key: value` pair per line.
    Text,
    /// Indented JSON for machine consumption.
    #[default]
    Json,
}

/// The first wire timestamp found to be exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    OrigTimestampZero,
    RecvTimestampZero,
    TxTimestampZero,
}

impl AnomalyKind {
    /// Checks origin, receive and transmit timestamps in that order and
    /// reports only the first zero one.
    pub fn detect(orig: Option<u64>, recv: u64, tx: u64) -> Option<Self> {
        if orig == Some(0) {
            Some(AnomalyKind::OrigTimestampZero)
        } else if recv == 0 {
            Some(AnomalyKind::RecvTimestampZero)
        } else if tx == 0 {
            Some(AnomalyKind::TxTimestampZero)
        } else {
            None
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AnomalyKind::OrigTimestampZero => "timestamps are invalid, orig_timestamp (t1) is 0",
            AnomalyKind::RecvTimestampZero => "timestamps are invalid, recv_timestamp (t2) is 0",
            AnomalyKind::TxTimestampZero => "timestamps are invalid, tx_timestamp (t3) is 0",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for AnomalyKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

/// NTPv1 header fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V1Fields {
    pub li_status: u8,
    #[serde(rename = "type")]
    pub msg_type: u8,
    pub precision: u16,
    pub est_error: u32,
    pub est_drift_rate: u32,
    pub ref_id: u32,
    pub ref_timestamp: u64,
    pub orig_timestamp: u64,
    pub recv_timestamp: u64,
    pub tx_timestamp: u64,
}

/// NTPv2/v3/v4 header fields. Root delay and dispersion are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassicFields {
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub root_delay: f64,
    pub root_disp: f64,
    pub ref_id: u32,
    pub ref_timestamp: u64,
    pub orig_timestamp: u64,
    pub recv_timestamp: u64,
    pub tx_timestamp: u64,
}

/// Decoded NTPv5 flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct V5Flags {
    pub synchronized: bool,
    pub interleaved: bool,
    pub auth_nak: bool,
}

impl V5Flags {
    pub const SYNCHRONIZED: u16 = 0x0001;
    pub const INTERLEAVED: u16 = 0x0002;
    pub const AUTH_NAK: u16 = 0x0004;

    pub fn decode(flags: u16) -> Self {
        V5Flags {
            synchronized: flags & Self::SYNCHRONIZED != 0,
            interleaved: flags & Self::INTERLEAVED != 0,
            auth_nak: flags & Self::AUTH_NAK != 0,
        }
    }
}

/// NTPv5 header fields plus the client-side cookie check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V5Fields {
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub timescale: u8,
    pub era: u8,
    pub flags_raw: u16,
    pub flags_decoded: V5Flags,
    pub root_delay: f64,
    pub root_disp: f64,
    pub server_cookie: u64,
    pub client_cookie: u64,
    pub recv_timestamp: u64,
    pub tx_timestamp: u64,
    /// Whether the server echoed the cookie we sent.
    pub client_cookie_valid: bool,
    /// Draft used for decoding, or a note that none was requested.
    pub draft: String,
}

/// Fields reported for an NTS-authenticated NTPv4 exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NtsFields {
    #[serde(rename = "Measured server port")]
    pub measured_port: String,
    pub ref_id_raw: String,
    pub ref_id: String,
    pub server_recv_time: u64,
    pub server_sent_time: u64,
    pub precision: f64,
    pub stratum: u8,
    pub root_delay: f64,
    pub poll: f64,
    pub root_disp: f64,
    pub ref_time: u64,
    pub root_dist: f64,
    #[serde(rename = "kissCode")]
    pub kiss_code: String,
    #[serde(rename = "minError")]
    pub min_error: f64,
    #[serde(
        rename = "warning_KE_wanted_diff_ip",
        skip_serializing_if = "Option::is_none"
    )]
    pub ke_redirect_warning: Option<String>,
}

/// Version-specific part of a [`MeasurementResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderFields {
    V1(V1Fields),
    Classic(ClassicFields),
    V5(V5Fields),
    Nts(NtsFields),
}

/// Normalized outcome of one successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementResult {
    /// Dial target as given by the caller.
    #[serde(rename = "Host", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Address the reply actually came from.
    #[serde(rename = "Measured server IP", skip_serializing_if = "Option::is_none")]
    pub measured_ip: Option<String>,
    pub leap: u8,
    pub version: u8,
    pub mode: u8,
    #[serde(flatten)]
    pub header: HeaderFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<ExtensionField>>,
    /// Raw NTP64 t1.
    pub client_sent_time: u64,
    /// Raw NTP64 t4.
    pub client_recv_time: u64,
    pub rtt: f64,
    pub offset: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<AnomalyKind>,
}

impl MeasurementResult {
    /// Records where the exchange went.
    pub fn annotate(&mut self, host: &str, measured_ip: impl ToString) {
        self.host = Some(host.to_string());
        self.measured_ip = Some(measured_ip.to_string());
    }
}

/// Serializes a report as indented JSON.
pub fn to_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => format!("{{\"error\": \"could not serialize result: {}\"}}", e),
    }
}

/// Renders a report as `key: value` lines, nesting objects with indentation.
pub fn to_text<T: Serialize>(value: &T) -> String {
    let mut out = String::new();
    match serde_json::to_value(value) {
        Ok(v) => write_text(&mut out, &v, 0),
        Err(e) => out.push_str(&format!("could not render result: {}\n", e)),
    }
    out
}

fn write_text(out: &mut String, value: &serde_json::Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                match v {
                    serde_json::Value::Object(_) => {
                        out.push_str(&format!("{}{}:\n", indent, key));
                        write_text(out, v, depth + 1);
                    }
                    serde_json::Value::String(s) => {
                        out.push_str(&format!("{}{}: {}\n", indent, key, s))
                    }
                    other => out.push_str(&format!("{}{}: {}\n", indent, key, other)),
                }
            }
        }
        other => out.push_str(&format!("{}{}\n", indent, other)),
    }
}

/// Renders a report in the requested format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(value),
        OutputFormat::Text => to_text(value),
    }
}
