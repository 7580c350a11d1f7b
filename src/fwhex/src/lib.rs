//! # fwhex
//!
//! Intel HEX firmware image tooling: parsing, validation, and
//! bootloader inspection.
//!
//! This library provides functionality to:
//! - Reconstruct the sparse flash image an Intel HEX file describes
//! - Validate a file against the full Intel HEX record grammar
//! - Locate the bootloader signature and read the version behind it
//! - Count the flash pages an image occupies
//!
//! ## Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = fwhex::parse_hex_file("firmware.hex")?;
//! println!("{} bytes across {} pages", image.len(), image.pages_used(2048));
//!
//! if let Err(err) = fwhex::validate_hex_file("firmware.hex") {
//!     eprintln!("invalid image: {err}");
//! }
//!
//! let version = fwhex::extract_bootloader_version("firmware.hex")?;
//! println!("bootloader {version}");
//! # Ok(())
//! # }
//! ```

pub mod bootloader;
pub mod image;
pub mod record;
pub mod validate;

use std::path::Path;

// Re-export commonly used items
#[doc(inline)]
pub use bootloader::{
    extract_bootloader_version, BootloaderVersion, VersionError, BOOTLOADER_SIGNATURE,
};
#[doc(inline)]
pub use image::{calculate_flash_pages_used, parse_hex_file, FlashImage, ParseError};
#[doc(inline)]
pub use record::{Record, RecordError, RecordKind};
#[doc(inline)]
pub use validate::{validate_hex_file, ValidateError};

/// Check whether a file exists, without interpreting its contents
pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}
