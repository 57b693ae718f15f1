// Axel '0vercl0k' Souchet - October 2 2026
//! Magic-byte classification of the input.
//!
//! Crash-dumps are recognized by their first eight bytes; a small set of
//! common non-dump formats (people upload screenshots and archives) is told
//! apart from plain garbage so the error message can say what was uploaded.
use std::fmt::Write;

use serde::Serialize;
use tracing::debug;

use crate::error::FormatError;

/// Nothing we know about is smaller than this.
pub const MIN_DUMP_SIZE: usize = 32;

/// How many bytes end up in the hex preview of an error.
const PREVIEW_LEN: usize = 16;

/// Which kind of crash-dump the buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DumpSignature {
    /// `MDMP`: a minidump, user-mode or kernel.
    Minidump,
    /// `PAGEDU64`: a 64-bit kernel / complete dump.
    KernelDump64,
    /// `PAGEDUMP`: a 32-bit kernel / complete dump.
    KernelDumpLegacy,
}

impl DumpSignature {
    /// Is it one of the `PAGEDU*` kernel dumps?
    #[must_use]
    pub fn is_kernel_dump(&self) -> bool {
        matches!(self, Self::KernelDump64 | Self::KernelDumpLegacy)
    }
}

/// Known non-dump magics, checked in order.
static FOREIGN_MAGICS: &[(&[u8], &str)] = &[
    (&[0x89, 0x50, 0x4e, 0x47], "PNG"),
    (&[0x50, 0x4b, 0x03, 0x04], "ZIP"),
    (b"%PDF", "PDF"),
    (b"GIF87a", "GIF"),
    (b"GIF89a", "GIF"),
    (&[0xff, 0xd8], "JPEG"),
    (b"MZ", "PE"),
];

/// Render the first bytes of `data` as `aa bb cc ..`.
#[must_use]
pub fn hex_preview(data: &[u8]) -> String {
    let mut out = String::with_capacity(PREVIEW_LEN * 3);
    for (idx, byte) in data.iter().take(PREVIEW_LEN).enumerate() {
        if idx != 0 {
            out.push(' ');
        }

        // Writing into a `String` cannot fail.
        let _ = write!(out, "{byte:02x}");
    }

    out
}

/// Classify `data`.
///
/// # Examples
///
/// ```
/// # use crashdump_triage::{detect_format, DumpSignature, FormatError};
/// let mut dump = vec![0u8; 64];
/// dump[..8].copy_from_slice(b"PAGEDU64");
/// assert_eq!(detect_format(&dump), Ok(DumpSignature::KernelDump64));
/// assert_eq!(detect_format(&dump[..8]), Err(FormatError::TooSmall(8)));
/// ```
pub fn detect_format(data: &[u8]) -> Result<DumpSignature, FormatError> {
    if data.len() < MIN_DUMP_SIZE {
        return Err(FormatError::TooSmall(data.len()));
    }

    let magic = &data[..8];
    let signature = match (&magic[..4], &magic[4..]) {
        (b"MDMP", _) => Some(DumpSignature::Minidump),
        (b"PAGE", b"DU64") => Some(DumpSignature::KernelDump64),
        (b"PAGE", b"DUMP") => Some(DumpSignature::KernelDumpLegacy),
        _ => None,
    };

    if let Some(signature) = signature {
        debug!("detected {signature:?}");
        return Ok(signature);
    }

    let preview = hex_preview(data);
    if let Some(&(_, kind)) = FOREIGN_MAGICS
        .iter()
        .find(|(foreign, _)| data.starts_with(foreign))
    {
        debug!("input is a {kind} file");
        return Err(FormatError::WrongFormat { kind, preview });
    }

    Err(FormatError::Unrecognized(preview))
}
