//! Bootloader signature location and version extraction
//!
//! The bootloader places a fixed 16-byte signature (emitted by its
//! linker script) directly ahead of its version bytes. Locating that
//! signature in a parsed image yields the version's address without
//! knowing the link layout of the particular build.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::{parse_hex_file, ParseError};

/// Signature bytes the bootloader linker script embeds ahead of the
/// version fields
pub const BOOTLOADER_SIGNATURE: [u8; 16] = [
    0x20, 0x0F, 0xF9, 0xA7, 0x17, 0x7D, 0x4E, 0x99, 0xDB, 0x53, 0xA2, 0x72, 0xE7, 0xC3, 0xE1, 0xFA,
];

/// Errors from bootloader version extraction
#[derive(Error, Debug)]
pub enum VersionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("bootloader signature not found in image")]
    SignatureNotFound,

    #[error("version bytes missing after bootloader signature")]
    VersionMissing,
}

/// Bootloader version read from behind the signature
///
/// `major` is a plain binary value; `minor` holds the ASCII code of a
/// revision character (0x68 for revision 'h').
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootloaderVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.major, self.minor as char)
    }
}

/// Extract the bootloader version embedded in an Intel HEX firmware image.
///
/// Parses the file permissively, locates [`BOOTLOADER_SIGNATURE`] at the
/// lowest address it occurs, and reads the two version bytes that follow
/// it. Some images carry a third byte (`major + minor` mod 256) after
/// the version; it is intentionally not verified so that images written
/// before it was introduced remain readable.
pub fn extract_bootloader_version<P: AsRef<Path>>(path: P) -> Result<BootloaderVersion, VersionError> {
    let image = parse_hex_file(path)?;

    let signature = image
        .find_pattern(&BOOTLOADER_SIGNATURE)
        .ok_or(VersionError::SignatureNotFound)?;

    let major_address = signature
        .checked_add(BOOTLOADER_SIGNATURE.len() as u32)
        .ok_or(VersionError::VersionMissing)?;
    let minor_address = major_address
        .checked_add(1)
        .ok_or(VersionError::VersionMissing)?;

    let major = image.get(major_address).ok_or(VersionError::VersionMissing)?;
    let minor = image.get(minor_address).ok_or(VersionError::VersionMissing)?;

    Ok(BootloaderVersion { major, minor })
}
