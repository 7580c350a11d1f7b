//! Intel HEX grammar validation
//!
//! Checks a file against the full record grammar and stops at the first
//! violation with a specific diagnosis. Unlike the permissive parser in
//! [`crate::image`], every line must be a well-formed record: correct
//! marker, hex alphabet, declared length, checksum, and a known record
//! type. Cross-record rules are enforced too — exactly one end-of-file
//! record, and no data record may rewrite an address a previous record
//! already claimed.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::record::{Record, RecordError, RecordKind};

/// First grammar violation found in a file
#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Record { line: usize, source: RecordError },

    #[error("line {line}: unknown record type {record_type:#04X}")]
    UnknownRecordType { line: usize, record_type: u8 },

    #[error("line {line}: multiple end-of-file records")]
    MultipleEof { line: usize },

    #[error("overlapping data at address {address:#X}")]
    OverlappingData { address: u32 },

    #[error("missing end-of-file record")]
    MissingEof,
}

/// Validate an Intel HEX file against the full format grammar.
///
/// Returns at the first rule violation. Line-local failures carry the
/// 1-based line number; file-level failures (overlap, end-of-file
/// cardinality) describe the offending condition. A file the validator
/// accepts always parses through [`crate::image::parse_hex_file`] with
/// every data byte landing at a unique address.
pub fn validate_hex_file<P: AsRef<Path>>(path: P) -> Result<(), ValidateError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut eof_seen = false;
    let mut extended_linear: u16 = 0;
    let mut written: HashSet<u32> = HashSet::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;

        let record = Record::parse(line.trim_end())
            .map_err(|source| ValidateError::Record { line: number, source })?;

        let kind = RecordKind::from_type(record.record_type).ok_or(
            ValidateError::UnknownRecordType {
                line: number,
                record_type: record.record_type,
            },
        )?;

        match kind {
            RecordKind::EndOfFile => {
                if eof_seen {
                    return Err(ValidateError::MultipleEof { line: number });
                }
                eof_seen = true;
            }
            RecordKind::Data => {
                let base = u32::from(extended_linear) << 16 | u32::from(record.address);
                for offset in 0..record.payload.len() as u32 {
                    let address = base.wrapping_add(offset);
                    if !written.insert(address) {
                        return Err(ValidateError::OverlappingData { address });
                    }
                }
            }
            RecordKind::ExtendedLinearAddress => {
                // The generic length rule is the only payload size
                // constraint; a short payload leaves the state alone.
                if let [high, low, ..] = record.payload[..] {
                    extended_linear = u16::from_be_bytes([high, low]);
                }
            }
            _ => {}
        }
    }

    if !eof_seen {
        return Err(ValidateError::MissingEof);
    }

    Ok(())
}
