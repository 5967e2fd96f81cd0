//! Client request construction for every supported version.
//!
//! Builders capture t1 themselves via [`now_to_ntp64`]; the `assemble_*`
//! functions take it as a parameter so the wire image can be checked exactly.

use rand::RngCore;

use crate::debug_log::DebugLog;
use crate::packets::{li_vn_mode, HeaderV1, HeaderV3, HeaderV5, MODE_CLIENT};
use crate::time::now_to_ntp64;
use crate::tlv::ExtensionField;
use crate::version::{NtpVersion, V5Draft};

/// NTPv1 message type for a client request.
pub const V1_TYPE_CLIENT: u8 = 1;

/// A serialized request together with the client state needed to read the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub bytes: Vec<u8>,
    /// Transmit time (t1) as raw NTP64.
    pub t1: u64,
    /// Random cookie sent in an NTPv5 request.
    pub client_cookie: Option<u64>,
}

/// Assembles an NTPv1 request header.
///
/// Status byte 0, type 1 (client), everything else zero except the transmit
/// timestamp.
pub fn assemble_v1_request(transmit_timestamp: u64) -> HeaderV1 {
    HeaderV1 {
        msg_type: V1_TYPE_CLIENT,
        tx_timestamp: transmit_timestamp,
        ..Default::default()
    }
}

/// Assembles an NTPv2, v3 or v4 request header (LI=0, mode 3).
pub fn assemble_classic_request(version: NtpVersion, transmit_timestamp: u64) -> HeaderV3 {
    HeaderV3 {
        li_vn_mode: li_vn_mode(0, version.number(), MODE_CLIENT),
        tx_timestamp: transmit_timestamp,
        ..Default::default()
    }
}

/// Assembles an NTPv5 request header carrying `client_cookie`.
pub fn assemble_v5_request(client_cookie: u64) -> HeaderV5 {
    HeaderV5 {
        li_vn_mode: li_vn_mode(0, NtpVersion::V5.number(), MODE_CLIENT),
        client_cookie,
        ..Default::default()
    }
}

/// Builds a 48-byte NTPv1 request. Returns the bytes and t1.
pub fn build_v1_request() -> (Vec<u8>, u64) {
    let t1 = now_to_ntp64();
    (assemble_v1_request(t1).to_bytes().to_vec(), t1)
}

/// Builds a 48-byte NTPv2/v3/v4 request. Returns the bytes and t1.
pub fn build_classic_request(version: NtpVersion) -> (Vec<u8>, u64) {
    let t1 = now_to_ntp64();
    (assemble_classic_request(version, t1).to_bytes().to_vec(), t1)
}

/// Builds an NTPv5 request with a fresh random client cookie.
///
/// A non-empty `draft` appends a Draft Identification extension field.
/// Returns the bytes and the cookie.
pub fn build_v5_request<R: RngCore + ?Sized>(
    draft: Option<&str>,
    rng: &mut R,
    log: &mut DebugLog,
) -> (Vec<u8>, u64) {
    let client_cookie = rng.next_u64();
    let header = assemble_v5_request(client_cookie);
    // Request fields that move between drafts are all zero.
    let mut buf = header.to_bytes(V5Draft::Draft05).to_vec();

    if let Some(name) = draft.filter(|d| !d.is_empty()) {
        let field = ExtensionField::draft_identification(name);
        log.line(format_args!(
            "len draft (sent) ext field: {}, content: {}",
            field.wire_size(),
            name
        ));
        field.write_to(&mut buf);
    }

    (buf, client_cookie)
}

/// Builds the request for `version`.
///
/// For NTPv5, t1 is captured just before the request is built since the
/// header carries no transmit timestamp.
pub fn build_request<R: RngCore + ?Sized>(
    version: NtpVersion,
    draft: Option<&str>,
    rng: &mut R,
    log: &mut DebugLog,
) -> ClientRequest {
    match version {
        NtpVersion::V1 => {
            let (bytes, t1) = build_v1_request();
            ClientRequest {
                bytes,
                t1,
                client_cookie: None,
            }
        }
        NtpVersion::V2 | NtpVersion::V3 | NtpVersion::V4 => {
            let (bytes, t1) = build_classic_request(version);
            ClientRequest {
                bytes,
                t1,
                client_cookie: None,
            }
        }
        NtpVersion::V5 => {
            let t1 = now_to_ntp64();
            let (bytes, cookie) = build_v5_request(draft, rng, log);
            ClientRequest {
                bytes,
                t1,
                client_cookie: Some(cookie),
            }
        }
    }
}
