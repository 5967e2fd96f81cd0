//! NTP header structures for protocol versions 1 through 5.
//!
//! Every version uses a 48-byte fixed header but the field layout differs:
//!
//! - **v1** (RFC 1059): status/type/precision/error/drift/refid + four timestamps.
//! - **v2/v3/v4** (RFC 1119, 1305, 5905): LI|VN|Mode, stratum, poll, precision,
//!   root delay/dispersion, refid + four timestamps. v4 may append extension fields.
//! - **v5** (IETF drafts): cookies replace the origin timestamp. Draft-05 puts
//!   timescale/era/flags ahead of root delay/dispersion, draft-06 swaps them.
//!
//! All fields are serialized big-endian with explicit offsets.

use thiserror::Error;

use crate::version::V5Draft;

/// Size of the fixed NTP header shared by all versions.
pub const HEADER_SIZE: usize = 48;

/// Client association mode.
pub const MODE_CLIENT: u8 = 3;

/// Server association mode.
pub const MODE_SERVER: u8 = 4;

/// Errors that can occur while decoding a response header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The datagram is smaller than the 48-byte fixed header.
    #[error("response too short: {0} bytes")]
    TooShort(usize),

    /// The server declared a version number we have no decoder for.
    #[error("unknown version: {0}")]
    UnknownVersion(u8),
}

/// Packs leap indicator, version number and mode into the first header byte.
pub fn li_vn_mode(leap: u8, version: u8, mode: u8) -> u8 {
    ((leap & 0x03) << 6) | ((version & 0x07) << 3) | (mode & 0x07)
}

/// Leap indicator (bits 6-7).
pub fn leap_of(byte0: u8) -> u8 {
    (byte0 >> 6) & 0x03
}

/// Version number (bits 3-5).
pub fn version_of(byte0: u8) -> u8 {
    (byte0 >> 3) & 0x07
}

/// Association mode (bits 0-2).
pub fn mode_of(byte0: u8) -> u8 {
    byte0 & 0x07
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(raw)
}

fn check_len(buf: &[u8]) -> Result<(), ParseError> {
    if buf.len() < HEADER_SIZE {
        return Err(ParseError::TooShort(buf.len()));
    }
    Ok(())
}

/// Header layout selected for decoding a response.
///
/// The server's VN field picks the layout, except for v5 where the draft
/// revision comes from the caller because it is not visible on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    V1,
    V2V3,
    V4,
    V5Draft05,
    V5Draft06,
}

impl HeaderLayout {
    /// Selects the layout for a response from its declared version.
    ///
    /// # Errors
    /// Returns [`ParseError::TooShort`] for an empty datagram and
    /// [`ParseError::UnknownVersion`] for VN values outside 1..=5.
    pub fn for_response(data: &[u8], draft_hint: Option<&str>) -> Result<Self, ParseError> {
        let byte0 = *data.first().ok_or(ParseError::TooShort(0))?;
        match version_of(byte0) {
            1 => Ok(HeaderLayout::V1),
            2 | 3 => Ok(HeaderLayout::V2V3),
            4 => Ok(HeaderLayout::V4),
            5 => Ok(match V5Draft::from_hint(draft_hint) {
                V5Draft::Draft05 => HeaderLayout::V5Draft05,
                V5Draft::Draft06 => HeaderLayout::V5Draft06,
            }),
            other => Err(ParseError::UnknownVersion(other)),
        }
    }
}

/// NTPv1 header (RFC 1059).
///
/// Wire format:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  LI | Status  |     Type      |           Precision           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Estimated Error                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     Estimated Drift Rate                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Reference Clock Identifier                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Reference / Originate / Receive / Transmit           |
/// |                    Timestamps (4 x 64 bits)                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderV1 {
    pub li_status: u8,
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

impl HeaderV1 {
    /// Serializes the header to its 48-byte wire format.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.li_status;
        buf[1] = self.msg_type;
        buf[2..4].copy_from_slice(&self.precision.to_be_bytes());
        buf[4..8].copy_from_slice(&self.est_error.to_be_bytes());
        buf[8..12].copy_from_slice(&self.est_drift_rate.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ref_id.to_be_bytes());
        buf[16..24].copy_from_slice(&self.ref_timestamp.to_be_bytes());
        buf[24..32].copy_from_slice(&self.orig_timestamp.to_be_bytes());
        buf[32..40].copy_from_slice(&self.recv_timestamp.to_be_bytes());
        buf[40..48].copy_from_slice(&self.tx_timestamp.to_be_bytes());
        buf
    }

    /// Deserializes the header from big-endian wire format.
    ///
    /// # Errors
    /// Returns an error if the buffer is smaller than 48 bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ParseError> {
        check_len(buf)?;
        Ok(Self {
            li_status: buf[0],
            msg_type: buf[1],
            precision: read_u16(buf, 2),
            est_error: read_u32(buf, 4),
            est_drift_rate: read_u32(buf, 8),
            ref_id: read_u32(buf, 12),
            ref_timestamp: read_u64(buf, 16),
            orig_timestamp: read_u64(buf, 24),
            recv_timestamp: read_u64(buf, 32),
            tx_timestamp: read_u64(buf, 40),
        })
    }
}

/// NTPv2/v3/v4 header (RFC 5905 Section 7.3).
///
/// Wire format:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |LI | VN  |Mode |    Stratum    |     Poll      |  Precision    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Root Delay                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Root Dispersion                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Reference ID                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Reference / Origin / Receive / Transmit              |
/// |                    Timestamps (4 x 64 bits)                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderV3 {
    pub li_vn_mode: u8,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub root_delay: u32,
    pub root_dispersion: u32,
    pub ref_id: u32,
    pub ref_timestamp: u64,
    pub orig_timestamp: u64,
    pub recv_timestamp: u64,
    pub tx_timestamp: u64,
}

impl HeaderV3 {
    /// Serializes the header to its 48-byte wire format.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.li_vn_mode;
        buf[1] = self.stratum;
        buf[2] = self.poll as u8;
        buf[3] = self.precision as u8;
        buf[4..8].copy_from_slice(&self.root_delay.to_be_bytes());
        buf[8..12].copy_from_slice(&self.root_dispersion.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ref_id.to_be_bytes());
        buf[16..24].copy_from_slice(&self.ref_timestamp.to_be_bytes());
        buf[24..32].copy_from_slice(&self.orig_timestamp.to_be_bytes());
        buf[32..40].copy_from_slice(&self.recv_timestamp.to_be_bytes());
        buf[40..48].copy_from_slice(&self.tx_timestamp.to_be_bytes());
        buf
    }

    /// Deserializes the header from big-endian wire format.
    ///
    /// # Errors
    /// Returns an error if the buffer is smaller than 48 bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ParseError> {
        check_len(buf)?;
        Ok(Self {
            li_vn_mode: buf[0],
            stratum: buf[1],
            poll: buf[2] as i8,
            precision: buf[3] as i8,
            root_delay: read_u32(buf, 4),
            root_dispersion: read_u32(buf, 8),
            ref_id: read_u32(buf, 12),
            ref_timestamp: read_u64(buf, 16),
            orig_timestamp: read_u64(buf, 24),
            recv_timestamp: read_u64(buf, 32),
            tx_timestamp: read_u64(buf, 40),
        })
    }
}

/// NTPv5 header fields, independent of the draft ordering.
///
/// Draft-05 wire order (bytes 4-15):
/// ```text
/// |   Timescale   |      Era      |             Flags             |
/// |                         Root Delay                            |
/// |                       Root Dispersion                         |
/// ```
/// Draft-06 wire order (bytes 4-15):
/// ```text
/// |                         Root Delay                            |
/// |                       Root Dispersion                         |
/// |   Timescale   |      Era      |             Flags             |
/// ```
/// Bytes 16-47 (server cookie, client cookie, receive and transmit
/// timestamps) are the same in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderV5 {
    pub li_vn_mode: u8,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub timescale: u8,
    pub era: u8,
    pub flags: u16,
    pub root_delay: u32,
    pub root_dispersion: u32,
    pub server_cookie: u64,
    pub client_cookie: u64,
    pub recv_timestamp: u64,
    pub tx_timestamp: u64,
}

impl HeaderV5 {
    /// Serializes the header using the field order of `draft`.
    pub fn to_bytes(&self, draft: V5Draft) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.li_vn_mode;
        buf[1] = self.stratum;
        buf[2] = self.poll as u8;
        buf[3] = self.precision as u8;

        let (scale_at, delay_at) = match draft {
            V5Draft::Draft05 => (4, 8),
            V5Draft::Draft06 => (12, 4),
        };
        buf[scale_at] = self.timescale;
        buf[scale_at + 1] = self.era;
        buf[scale_at + 2..scale_at + 4].copy_from_slice(&self.flags.to_be_bytes());
        buf[delay_at..delay_at + 4].copy_from_slice(&self.root_delay.to_be_bytes());
        buf[delay_at + 4..delay_at + 8].copy_from_slice(&self.root_dispersion.to_be_bytes());

        buf[16..24].copy_from_slice(&self.server_cookie.to_be_bytes());
        buf[24..32].copy_from_slice(&self.client_cookie.to_be_bytes());
        buf[32..40].copy_from_slice(&self.recv_timestamp.to_be_bytes());
        buf[40..48].copy_from_slice(&self.tx_timestamp.to_be_bytes());
        buf
    }

    /// Deserializes the header using the field order of `draft`.
    ///
    /// # Errors
    /// Returns an error if the buffer is smaller than 48 bytes.
    pub fn from_bytes(buf: &[u8], draft: V5Draft) -> Result<Self, ParseError> {
        check_len(buf)?;

        let (scale_at, delay_at) = match draft {
            V5Draft::Draft05 => (4, 8),
            V5Draft::Draft06 => (12, 4),
        };

        Ok(Self {
            li_vn_mode: buf[0],
            stratum: buf[1],
            poll: buf[2] as i8,
            precision: buf[3] as i8,
            timescale: buf[scale_at],
            era: buf[scale_at + 1],
            flags: read_u16(buf, scale_at + 2),
            root_delay: read_u32(buf, delay_at),
            root_dispersion: read_u32(buf, delay_at + 4),
            server_cookie: read_u64(buf, 16),
            client_cookie: read_u64(buf, 24),
            recv_timestamp: read_u64(buf, 32),
            tx_timestamp: read_u64(buf, 40),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v5() -> HeaderV5 {
        HeaderV5 {
            li_vn_mode: li_vn_mode(0, 5, MODE_SERVER),
            stratum: 2,
            poll: 4,
            precision: -20,
            timescale: 1,
            era: 0,
            flags: 0x0003,
            root_delay: 0x0001_8000,
            root_dispersion: 0x0000_4000,
            server_cookie: 0x1111_2222_3333_4444,
            client_cookie: 0xAAAA_BBBB_CCCC_DDDD,
            recv_timestamp: 0xE000_0000_0000_0001,
            tx_timestamp: 0xE000_0000_0000_0002,
        }
    }

    #[test]
    fn test_li_vn_mode_packing() {
        let byte = li_vn_mode(3, 4, MODE_CLIENT);
        assert_eq!(byte, 0xE3);
        assert_eq!(leap_of(byte), 3);
        assert_eq!(version_of(byte), 4);
        assert_eq!(mode_of(byte), 3);
        assert_eq!(li_vn_mode(0, 5, MODE_CLIENT), 0x2B);
    }

    #[test]
    fn test_v1_field_offsets() {
        let header = HeaderV1 {
            li_status: 0x08,
            msg_type: 2,
            precision: 0xFFEC,
            est_error: 1,
            est_drift_rate: 2,
            ref_id: 0x4750_5300,
            ref_timestamp: 3,
            orig_timestamp: 4,
            recv_timestamp: 5,
            tx_timestamp: 6,
        };
        let buf = header.to_bytes();
        assert_eq!(buf[0], 0x08);
        assert_eq!(buf[1], 2);
        assert_eq!(&buf[2..4], &[0xFF, 0xEC]);
        assert_eq!(&buf[12..16], b"GPS\0");
        assert_eq!(buf[47], 6);
        assert_eq!(HeaderV1::from_bytes(&buf).unwrap(), header);
    }

    #[test]
    fn test_v3_signed_fields() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = li_vn_mode(0, 3, MODE_SERVER);
        buf[2] = 0xFA; // poll -6
        buf[3] = 0xE9; // precision -23
        let header = HeaderV3::from_bytes(&buf).unwrap();
        assert_eq!(header.poll, -6);
        assert_eq!(header.precision, -23);
        assert_eq!(header.to_bytes(), buf);
    }

    #[test]
    fn test_short_buffers_rejected() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert_eq!(HeaderV1::from_bytes(&buf), Err(ParseError::TooShort(47)));
        assert_eq!(HeaderV3::from_bytes(&buf), Err(ParseError::TooShort(47)));
        assert_eq!(
            HeaderV5::from_bytes(&buf, V5Draft::Draft05),
            Err(ParseError::TooShort(47))
        );
    }

    #[test]
    fn test_v5_draft_layouts_differ() {
        let header = sample_v5();
        let d05 = header.to_bytes(V5Draft::Draft05);
        let d06 = header.to_bytes(V5Draft::Draft06);

        assert_eq!(d05[4], 1); // timescale first in draft-05
        assert_eq!(&d05[8..12], &[0x00, 0x01, 0x80, 0x00]);
        assert_eq!(&d06[4..8], &[0x00, 0x01, 0x80, 0x00]); // root delay first in draft-06
        assert_eq!(d06[12], 1);
        assert_eq!(&d05[16..48], &d06[16..48]);

        assert_eq!(HeaderV5::from_bytes(&d05, V5Draft::Draft05).unwrap(), header);
        assert_eq!(HeaderV5::from_bytes(&d06, V5Draft::Draft06).unwrap(), header);
        assert_ne!(HeaderV5::from_bytes(&d06, V5Draft::Draft05).unwrap(), header);
    }

    #[test]
    fn test_layout_follows_declared_version() {
        let mut buf = [0u8; HEADER_SIZE];
        let cases = [
            (1, HeaderLayout::V1),
            (2, HeaderLayout::V2V3),
            (3, HeaderLayout::V2V3),
            (4, HeaderLayout::V4),
            (5, HeaderLayout::V5Draft05),
        ];
        for (vn, expected) in cases {
            buf[0] = li_vn_mode(0, vn, MODE_SERVER);
            assert_eq!(HeaderLayout::for_response(&buf, None), Ok(expected));
        }
    }

    #[test]
    fn test_layout_v5_uses_draft_hint() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = li_vn_mode(0, 5, MODE_SERVER);
        assert_eq!(
            HeaderLayout::for_response(&buf, Some("draft-ietf-ntp-ntpv5-06")),
            Ok(HeaderLayout::V5Draft06)
        );
        assert_eq!(
            HeaderLayout::for_response(&buf, Some("bogus")),
            Ok(HeaderLayout::V5Draft05)
        );
    }

    #[test]
    fn test_layout_unknown_versions() {
        let mut buf = [0u8; HEADER_SIZE];
        for vn in [0u8, 6, 7] {
            buf[0] = li_vn_mode(0, vn, MODE_SERVER);
            assert_eq!(
                HeaderLayout::for_response(&buf, None),
                Err(ParseError::UnknownVersion(vn))
            );
        }
    }

    #[test]
    fn test_layout_empty_datagram() {
        assert_eq!(
            HeaderLayout::for_response(&[], None),
            Err(ParseError::TooShort(0))
        );
    }
}
