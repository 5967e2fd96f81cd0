//! NTP extension field support (RFC 7822 framing, as used by NTPv4 and NTPv5).
//!
//! # Extension Field Wire Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Field Type           |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Value...                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Unlike STAMP-style TLVs, the Length counts the whole field including its
//! own 4-byte header.

use serde::Serialize;
use thiserror::Error;

/// Extension field header size in bytes (2 bytes type, 2 bytes length).
pub const TLV_HEADER_SIZE: usize = 4;

/// Draft Identification extension field type (NTPv5 drafts).
pub const DRAFT_IDENTIFICATION: u16 = 0xF5FF;

/// Wire length of the Draft Identification field sent in requests.
///
/// Fixed regardless of the draft string: servers ignored requests that carried
/// the exact 27-byte length, 28 is what they answer to.
pub const DRAFT_IDENTIFICATION_LEN: usize = 28;

/// Errors that can occur while parsing a single extension field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TlvError {
    /// Buffer is too small to contain an extension field header.
    #[error("Buffer too small for extension header: need {TLV_HEADER_SIZE} bytes, got {0}")]
    BufferTooSmall(usize),

    /// Declared length is shorter than the header itself.
    #[error("Extension length {0} is shorter than its {TLV_HEADER_SIZE}-byte header")]
    LengthTooShort(usize),

    /// Declared length exceeds the bytes left in the packet.
    #[error("Extension length {length} exceeds remaining buffer size {available}")]
    LengthExceedsBuffer { length: usize, available: usize },
}

/// A single decoded extension field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionField {
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: u16,
    /// Total wire length, header included.
    pub length: u16,
    /// Value bytes (everything after the header, padding included).
    #[serde(rename = "data")]
    pub value: Vec<u8>,
    /// Draft name carried by a Draft Identification field.
    #[serde(rename = "draft_str", skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
}

impl ExtensionField {
    /// Parses one extension field from the start of `buf`.
    ///
    /// Returns the field and the number of bytes it occupies.
    ///
    /// # Errors
    /// Returns an error if the header is incomplete or the declared length is
    /// below 4 or past the end of `buf`.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), TlvError> {
        if buf.len() < TLV_HEADER_SIZE {
            return Err(TlvError::BufferTooSmall(buf.len()));
        }

        let field_type = u16::from_be_bytes([buf[0], buf[1]]);
        let length = u16::from_be_bytes([buf[2], buf[3]]);
        let total = length as usize;

        if total < TLV_HEADER_SIZE {
            return Err(TlvError::LengthTooShort(total));
        }
        if total > buf.len() {
            return Err(TlvError::LengthExceedsBuffer {
                length: total,
                available: buf.len(),
            });
        }

        let value = buf[TLV_HEADER_SIZE..total].to_vec();
        let draft = (field_type == DRAFT_IDENTIFICATION).then(|| decode_draft_name(&value));

        Ok((
            Self {
                field_type,
                length,
                value,
                draft,
            },
            total,
        ))
    }

    /// Builds the Draft Identification field for an NTPv5 request.
    ///
    /// The field is always [`DRAFT_IDENTIFICATION_LEN`] bytes; longer names are
    /// truncated and shorter ones zero padded.
    pub fn draft_identification(draft: &str) -> Self {
        let mut value = vec![0u8; DRAFT_IDENTIFICATION_LEN - TLV_HEADER_SIZE];
        let name = draft.as_bytes();
        let copy_len = name.len().min(value.len());
        value[..copy_len].copy_from_slice(&name[..copy_len]);

        Self {
            field_type: DRAFT_IDENTIFICATION,
            length: DRAFT_IDENTIFICATION_LEN as u16,
            draft: Some(decode_draft_name(&value)),
            value,
        }
    }

    /// Appends the wire encoding of this field to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.field_type.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.value);
    }

    /// Returns the wire size of this field.
    pub fn wire_size(&self) -> usize {
        TLV_HEADER_SIZE + self.value.len()
    }
}

fn decode_draft_name(value: &[u8]) -> String {
    let end = value.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&value[..end]).into_owned()
}

/// Scans the bytes following the fixed header into extension fields.
///
/// Scanning stops quietly when fewer than four bytes remain or when a field
/// declares an impossible length; whatever was collected up to that point is
/// returned. A broken trailer never fails the packet as a whole.
pub fn scan_extensions(buf: &[u8]) -> Vec<ExtensionField> {
    let mut fields = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        match ExtensionField::parse(&buf[offset..]) {
            Ok((field, consumed)) => {
                fields.push(field);
                offset += consumed;
            }
            Err(TlvError::BufferTooSmall(_)) => break,
            Err(e) => {
                log::debug!("Stopped extension scan at offset {}: {}", offset, e);
                break;
            }
        }
    }

    fields
}
