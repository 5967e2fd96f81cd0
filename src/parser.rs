//! Response decoding.
//!
//! The server's VN field selects a [`HeaderLayout`]; each layout has one decode
//! function producing a [`MeasurementResult`].

use crate::debug_log::DebugLog;
use crate::packets::{
    leap_of, mode_of, version_of, HeaderLayout, HeaderV1, HeaderV3, HeaderV5, ParseError,
    HEADER_SIZE,
};
use crate::report::{
    AnomalyKind, ClassicFields, HeaderFields, MeasurementResult, V1Fields, V5Fields, V5Flags,
};
use crate::time::time32_to_seconds;
use crate::timing::RoundTrip;
use crate::tlv::{scan_extensions, ExtensionField};
use crate::version::V5Draft;

/// Recorded in place of a draft name when the request carried none.
pub const NO_DRAFT_NOTE: &str = "did not use an extension field for draft";

/// What the client remembers about its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientState {
    /// Transmit time (t1) as raw NTP64.
    pub t1: u64,
    /// Receive time (t4) as raw NTP64, captured right after the read.
    pub t4: u64,
    /// Cookie sent in an NTPv5 request, zero otherwise.
    pub client_cookie: u64,
}

/// Decodes a response, picking the layout from its version field.
///
/// # Errors
/// Returns [`ParseError`] for datagrams shorter than 48 bytes or with a
/// version outside 1..=5. No partial result is produced.
pub fn parse_response(
    data: &[u8],
    client: &ClientState,
    draft: Option<&str>,
    log: &mut DebugLog,
) -> Result<MeasurementResult, ParseError> {
    log.line(format_args!("received response: {} bytes", data.len()));
    log.hex_dump(data);

    let layout = HeaderLayout::for_response(data, draft)?;
    decode(layout, data, client, draft, log)
}

/// Decodes a response with an explicit layout.
pub fn decode(
    layout: HeaderLayout,
    data: &[u8],
    client: &ClientState,
    draft: Option<&str>,
    log: &mut DebugLog,
) -> Result<MeasurementResult, ParseError> {
    match layout {
        HeaderLayout::V1 => decode_v1(data, client),
        HeaderLayout::V2V3 => decode_classic(data, client),
        HeaderLayout::V4 => {
            let mut result = decode_classic(data, client)?;
            result.extensions = trailing_extensions(data, log);
            Ok(result)
        }
        HeaderLayout::V5Draft05 => decode_v5(data, client, V5Draft::Draft05, draft, log),
        HeaderLayout::V5Draft06 => decode_v5(data, client, V5Draft::Draft06, draft, log),
    }
}

/// NTPv1 decoder.
pub fn decode_v1(data: &[u8], client: &ClientState) -> Result<MeasurementResult, ParseError> {
    let h = HeaderV1::from_bytes(data)?;
    let timing = RoundTrip::from_ntp64(client.t1, h.recv_timestamp, h.tx_timestamp, client.t4);

    Ok(MeasurementResult {
        host: None,
        measured_ip: None,
        leap: leap_of(h.li_status),
        version: version_of(h.li_status),
        mode: mode_of(h.li_status),
        header: HeaderFields::V1(V1Fields {
            li_status: h.li_status,
            msg_type: h.msg_type,
            precision: h.precision,
            est_error: h.est_error,
            est_drift_rate: h.est_drift_rate,
            ref_id: h.ref_id,
            ref_timestamp: h.ref_timestamp,
            orig_timestamp: h.orig_timestamp,
            recv_timestamp: h.recv_timestamp,
            tx_timestamp: h.tx_timestamp,
        }),
        extensions: None,
        client_sent_time: client.t1,
        client_recv_time: client.t4,
        rtt: timing.rtt,
        offset: timing.offset,
        anomaly: AnomalyKind::detect(
            Some(h.orig_timestamp),
            h.recv_timestamp,
            h.tx_timestamp,
        ),
    })
}

/// NTPv2/v3 decoder, also the fixed-header part of NTPv4.
pub fn decode_classic(data: &[u8], client: &ClientState) -> Result<MeasurementResult, ParseError> {
    let h = HeaderV3::from_bytes(data)?;
    let timing = RoundTrip::from_ntp64(client.t1, h.recv_timestamp, h.tx_timestamp, client.t4);

    Ok(MeasurementResult {
        host: None,
        measured_ip: None,
        leap: leap_of(h.li_vn_mode),
        version: version_of(h.li_vn_mode),
        mode: mode_of(h.li_vn_mode),
        header: HeaderFields::Classic(ClassicFields {
            stratum: h.stratum,
            poll: h.poll,
            precision: h.precision,
            root_delay: time32_to_seconds(h.root_delay),
            root_disp: time32_to_seconds(h.root_dispersion),
            ref_id: h.ref_id,
            ref_timestamp: h.ref_timestamp,
            orig_timestamp: h.orig_timestamp,
            recv_timestamp: h.recv_timestamp,
            tx_timestamp: h.tx_timestamp,
        }),
        extensions: None,
        client_sent_time: client.t1,
        client_recv_time: client.t4,
        rtt: timing.rtt,
        offset: timing.offset,
        anomaly: AnomalyKind::detect(
            Some(h.orig_timestamp),
            h.recv_timestamp,
            h.tx_timestamp,
        ),
    })
}

/// NTPv5 decoder for either draft layout.
pub fn decode_v5(
    data: &[u8],
    client: &ClientState,
    layout: V5Draft,
    draft: Option<&str>,
    log: &mut DebugLog,
) -> Result<MeasurementResult, ParseError> {
    let h = HeaderV5::from_bytes(data, layout)?;
    let timing = RoundTrip::from_ntp64(client.t1, h.recv_timestamp, h.tx_timestamp, client.t4);

    let draft = match draft {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => NO_DRAFT_NOTE.to_string(),
    };

    Ok(MeasurementResult {
        host: None,
        measured_ip: None,
        leap: leap_of(h.li_vn_mode),
        version: version_of(h.li_vn_mode),
        mode: mode_of(h.li_vn_mode),
        header: HeaderFields::V5(V5Fields {
            stratum: h.stratum,
            poll: h.poll,
            precision: h.precision,
            timescale: h.timescale,
            era: h.era,
            flags_raw: h.flags,
            flags_decoded: V5Flags::decode(h.flags),
            root_delay: time32_to_seconds(h.root_delay),
            root_disp: time32_to_seconds(h.root_dispersion),
            server_cookie: h.server_cookie,
            client_cookie: h.client_cookie,
            recv_timestamp: h.recv_timestamp,
            tx_timestamp: h.tx_timestamp,
            client_cookie_valid: h.client_cookie == client.client_cookie,
            draft,
        }),
        extensions: trailing_extensions(data, log),
        client_sent_time: client.t1,
        client_recv_time: client.t4,
        rtt: timing.rtt,
        offset: timing.offset,
        anomaly: AnomalyKind::detect(None, h.recv_timestamp, h.tx_timestamp),
    })
}

fn trailing_extensions(data: &[u8], log: &mut DebugLog) -> Option<Vec<ExtensionField>> {
    let tail = data.get(HEADER_SIZE..).filter(|t| !t.is_empty())?;
    log.line(format_args!(
        "extension(s) detected: {} bytes: {:02X?}",
        tail.len(),
        tail
    ));
    Some(scan_extensions(tail))
}
