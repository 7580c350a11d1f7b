//! Intel HEX record decoding
//!
//! One record is one line of text:
//!
//! ```text
//! :BBAAAATTDD...DDCC
//! ```
//!
//! - `BB`: payload byte count
//! - `AAAA`: 16-bit load address (big-endian)
//! - `TT`: record type
//! - `DD...DD`: payload, `BB` bytes
//! - `CC`: checksum; the sum of every byte on the line is 0 mod 256

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest legal record: marker, byte count, address, type, checksum.
pub const MIN_RECORD_CHARS: usize = 11;

/// Fixed (non-payload) byte fields of a record: byte count, two address
/// bytes, record type, checksum.
const FIXED_FIELD_BYTES: usize = 5;

/// Errors produced while decoding a single record line
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("record does not start with ':'")]
    MissingStartCode,

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("record too short: {length} characters, minimum is {MIN_RECORD_CHARS}")]
    TooShort { length: usize },

    #[error("record length mismatch: expected {expected} characters, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("checksum mismatch: record bytes sum to {sum:#04x}, expected 0")]
    ChecksumMismatch { sum: u8 },

    #[error("record truncated: payload extends past end of line")]
    Truncated,
}

/// Record types defined by the Intel HEX format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Payload bytes destined for the memory image
    Data,
    /// Terminates the image; the permissive parser reads no further
    EndOfFile,
    /// Segment-style addressing (accepted, not interpreted)
    ExtendedSegmentAddress,
    /// Segment-style entry point (accepted, not interpreted)
    StartSegmentAddress,
    /// Supplies the high 16 bits of subsequent data record addresses
    ExtendedLinearAddress,
    /// Linear entry point (accepted, not interpreted)
    StartLinearAddress,
}

impl RecordKind {
    /// Map a raw record type byte to its kind
    ///
    /// Returns `None` for type bytes above 0x05. The validator rejects
    /// those; the permissive parser skips them like any other
    /// non-data record.
    pub fn from_type(record_type: u8) -> Option<Self> {
        match record_type {
            0x00 => Some(RecordKind::Data),
            0x01 => Some(RecordKind::EndOfFile),
            0x02 => Some(RecordKind::ExtendedSegmentAddress),
            0x03 => Some(RecordKind::StartSegmentAddress),
            0x04 => Some(RecordKind::ExtendedLinearAddress),
            0x05 => Some(RecordKind::StartLinearAddress),
            _ => None,
        }
    }
}

/// One fully decoded record line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Number of payload bytes
    pub byte_count: u8,
    /// 16-bit record-local load address
    pub address: u16,
    /// Raw record type byte (not range-checked here)
    pub record_type: u8,
    /// Payload bytes, `byte_count` of them
    pub payload: Vec<u8>,
    /// Checksum byte as it appeared on the line
    pub checksum: u8,
}

impl Record {
    /// Decode one line into a record, applying every line-local rule.
    ///
    /// The line must already be stripped of trailing whitespace. Checks
    /// run in order, each with its own error: start marker, hex
    /// alphabet, minimum length, declared length, checksum. The record
    /// type byte is returned raw; only the validator restricts its
    /// range.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let body = line.strip_prefix(':').ok_or(RecordError::MissingStartCode)?;
        let bytes = hex::decode(body)?;

        if line.len() < MIN_RECORD_CHARS {
            return Err(RecordError::TooShort { length: line.len() });
        }

        let byte_count = bytes[0] as usize;
        let expected = 1 + 2 * (byte_count + FIXED_FIELD_BYTES);
        if line.len() != expected {
            return Err(RecordError::LengthMismatch {
                expected,
                actual: line.len(),
            });
        }

        let sum = bytes.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
        if sum != 0 {
            return Err(RecordError::ChecksumMismatch { sum });
        }

        Ok(Record {
            byte_count: bytes[0],
            address: u16::from_be_bytes([bytes[1], bytes[2]]),
            record_type: bytes[3],
            payload: bytes[4..4 + byte_count].to_vec(),
            checksum: bytes[4 + byte_count],
        })
    }

    /// Kind of this record, or `None` for an out-of-range type byte
    pub fn kind(&self) -> Option<RecordKind> {
        RecordKind::from_type(self.record_type)
    }
}
