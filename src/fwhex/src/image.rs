//! Sparse flash images reconstructed from Intel HEX files
//!
//! [`parse_hex_file`] rebuilds the memory contents a HEX file describes
//! as a sparse address-to-byte map. Reconstruction is permissive by
//! design: it assumes well-formed input and skips anything it does not
//! understand, so images produced by unusual toolchains still load.
//! Grammar enforcement lives in [`crate::validate`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::record::{RecordError, RecordKind};

/// Errors from permissive image reconstruction
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Record { line: usize, source: RecordError },
}

/// Sparse mapping from 32-bit absolute flash address to byte value
///
/// Iteration and pattern search run in ascending address order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlashImage {
    bytes: BTreeMap<u32, u8>,
}

impl FlashImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a byte, overwriting any previous value at the address
    pub fn insert(&mut self, address: u32, value: u8) {
        self.bytes.insert(address, value);
    }

    /// Byte at `address`, if one was written
    pub fn get(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    /// Number of addresses holding a byte
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no byte has been written
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowest written address
    pub fn min_address(&self) -> Option<u32> {
        self.bytes.keys().next().copied()
    }

    /// Highest written address
    pub fn max_address(&self) -> Option<u32> {
        self.bytes.keys().next_back().copied()
    }

    /// Iterate over `(address, byte)` pairs in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.bytes.iter().map(|(&address, &value)| (address, value))
    }

    /// Find the lowest address at which `pattern` occurs contiguously.
    ///
    /// The search is sparse-aware: every byte of the window must be
    /// present in the image, so a gap at any offset disqualifies that
    /// candidate. Returns `None` for an empty pattern or when the image
    /// holds fewer bytes than the pattern.
    pub fn find_pattern(&self, pattern: &[u8]) -> Option<u32> {
        let (&first, rest) = pattern.split_first()?;
        if self.bytes.len() < pattern.len() {
            return None;
        }

        self.bytes
            .iter()
            .filter(|&(_, &value)| value == first)
            .map(|(&address, _)| address)
            .find(|&address| {
                rest.iter().enumerate().all(|(offset, &expected)| {
                    address
                        .checked_add(offset as u32 + 1)
                        .and_then(|next| self.get(next))
                        == Some(expected)
                })
            })
    }

    /// Number of fixed-size pages touched by the occupied address range
    ///
    /// Counts from the page containing the lowest written address
    /// through the page containing the highest. Gaps in between still
    /// count: one byte at each end of a large range reports every page
    /// spanned. Returns 0 for an empty image. `page_size` must be
    /// nonzero.
    pub fn pages_used(&self, page_size: u32) -> u32 {
        match (self.min_address(), self.max_address()) {
            (Some(min), Some(max)) => max / page_size - min / page_size + 1,
            _ => 0,
        }
    }
}

/// Reconstruct a [`FlashImage`] from an Intel HEX file.
///
/// Permissive reconstruction: lines that are empty or do not start with
/// `:` are skipped, checksums and record lengths are not verified, and
/// record types other than data, extended linear address, and
/// end-of-file are ignored. A data record at an address already written
/// overwrites it. Hex decoding failures abort the parse.
pub fn parse_hex_file<P: AsRef<Path>>(path: P) -> Result<FlashImage, ParseError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut image = FlashImage::new();
    let mut extended_linear: u16 = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() || !line.starts_with(':') {
            continue;
        }

        let fail = |source: RecordError| ParseError::Record {
            line: index + 1,
            source,
        };

        let bytes = hex::decode(&line[1..]).map_err(|err| fail(err.into()))?;
        if bytes.len() < 4 {
            return Err(fail(RecordError::Truncated));
        }

        let byte_count = bytes[0] as usize;
        match RecordKind::from_type(bytes[3]) {
            Some(RecordKind::Data) => {
                let payload = bytes
                    .get(4..4 + byte_count)
                    .ok_or_else(|| fail(RecordError::Truncated))?;
                let address = u16::from_be_bytes([bytes[1], bytes[2]]);
                let base = u32::from(extended_linear) << 16 | u32::from(address);
                for (offset, &value) in payload.iter().enumerate() {
                    image.insert(base.wrapping_add(offset as u32), value);
                }
            }
            Some(RecordKind::ExtendedLinearAddress) => {
                let payload = bytes
                    .get(4..6)
                    .ok_or_else(|| fail(RecordError::Truncated))?;
                extended_linear = u16::from_be_bytes([payload[0], payload[1]]);
            }
            Some(RecordKind::EndOfFile) => break,
            _ => {}
        }
    }

    Ok(image)
}

/// Parse `path` and count the flash pages its image touches.
///
/// `page_size` is the device's erase page size in bytes (2048 for the
/// STM32 parts this tooling targets).
pub fn calculate_flash_pages_used<P: AsRef<Path>>(
    path: P,
    page_size: u32,
) -> Result<u32, ParseError> {
    let image = parse_hex_file(path)?;
    Ok(image.pages_used(page_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_hex_file(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_parse_data_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "simple.hex",
            &[":04000000AABBCCDDEE", ":00000001FF"],
        );

        let image = parse_hex_file(&path).unwrap();
        assert_eq!(image.len(), 4);
        assert_eq!(image.get(0x0000), Some(0xAA));
        assert_eq!(image.get(0x0003), Some(0xDD));
        assert_eq!(image.get(0x0004), None);
    }

    #[test]
    fn test_extended_linear_address_relocates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "high.hex",
            &[":020000040800F2", ":0100000042BD", ":00000001FF"],
        );

        let image = parse_hex_file(&path).unwrap();
        assert_eq!(image.get(0x0800_0000), Some(0x42));
        assert_eq!(image.get(0x0000_0000), None);
    }

    #[test]
    fn test_skips_blank_and_non_record_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "noisy.hex",
            &["", "# comment", ":0100000011EE", ":00000001FF"],
        );

        let image = parse_hex_file(&path).unwrap();
        assert_eq!(image.get(0), Some(0x11));
    }

    #[test]
    fn test_stops_at_eof_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "trailing.hex",
            &[":0100000011EE", ":00000001FF", ":01001000559A"],
        );

        let image = parse_hex_file(&path).unwrap();
        assert_eq!(image.len(), 1);
        assert_eq!(image.get(0x0010), None);
    }

    #[test]
    fn test_later_write_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "overlap.hex",
            &[":0100000011EE", ":0100000022DD", ":00000001FF"],
        );

        let image = parse_hex_file(&path).unwrap();
        assert_eq!(image.get(0), Some(0x22));
    }

    #[test]
    fn test_ignores_unknown_and_start_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "start.hex",
            &[":04000005080041218D", ":0100000011EE", ":00000001FF"],
        );

        let image = parse_hex_file(&path).unwrap();
        assert_eq!(image.len(), 1);
    }

    #[test]
    fn test_bad_hex_aborts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "bad.hex",
            &[":01000000ZZEE", ":00000001FF"],
        );

        let err = parse_hex_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Record {
                line: 1,
                source: RecordError::InvalidHex(_)
            }
        ));
    }

    #[test]
    fn test_truncated_payload_aborts() {
        let temp_dir = tempfile::tempdir().unwrap();
        // Declares four payload bytes but the line ends after one
        let path = write_hex_file(temp_dir.path(), "short.hex", &[":0400000011"]);

        let err = parse_hex_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Record {
                line: 1,
                source: RecordError::Truncated
            }
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = parse_hex_file(temp_dir.path().join("nope.hex")).unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "twice.hex",
            &[":020000040800F2", ":04000000AABBCCDDEE", ":00000001FF"],
        );

        let first = parse_hex_file(&path).unwrap();
        let second = parse_hex_file(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_pattern_ascending_and_sparse() {
        let mut image = FlashImage::new();
        for (offset, value) in [0x10, 0x20, 0x30].into_iter().enumerate() {
            image.insert(0x100 + offset as u32, value);
            image.insert(0x200 + offset as u32, value);
        }

        // Lowest of two full matches wins
        assert_eq!(image.find_pattern(&[0x10, 0x20, 0x30]), Some(0x100));

        // A gap inside the window disqualifies the candidate
        let mut gappy = FlashImage::new();
        gappy.insert(0x100, 0x10);
        gappy.insert(0x102, 0x30);
        gappy.insert(0x200, 0x99);
        assert_eq!(gappy.find_pattern(&[0x10, 0x20, 0x30]), None);
    }

    #[test]
    fn test_find_pattern_degenerate_inputs() {
        let mut image = FlashImage::new();
        image.insert(0, 0xAB);

        assert_eq!(image.find_pattern(&[]), None);
        assert_eq!(image.find_pattern(&[0xAB, 0xCD]), None);
        assert_eq!(FlashImage::new().find_pattern(&[0xAB]), None);
    }

    #[test]
    fn test_pages_used_boundaries() {
        let mut at_zero = FlashImage::new();
        at_zero.insert(0, 0x00);
        assert_eq!(at_zero.pages_used(2048), 1);

        let mut at_page_start = FlashImage::new();
        at_page_start.insert(2048, 0x00);
        assert_eq!(at_page_start.pages_used(2048), 1);

        let mut spanning = FlashImage::new();
        spanning.insert(0, 0x00);
        spanning.insert(2048, 0x00);
        assert_eq!(spanning.pages_used(2048), 2);

        assert_eq!(FlashImage::new().pages_used(2048), 0);
    }

    #[test]
    fn test_calculate_flash_pages_used() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_hex_file(
            temp_dir.path(),
            "pages.hex",
            &[":0100000000FF", ":0108000000F7", ":00000001FF"],
        );

        assert_eq!(calculate_flash_pages_used(&path, 2048).unwrap(), 2);
    }

    #[test]
    fn test_min_max_address() {
        let mut image = FlashImage::new();
        assert_eq!(image.min_address(), None);
        assert_eq!(image.max_address(), None);

        image.insert(0x0800_0000, 0x01);
        image.insert(0x0000_0010, 0x02);
        assert_eq!(image.min_address(), Some(0x0000_0010));
        assert_eq!(image.max_address(), Some(0x0800_0000));
    }
}
