// Axel '0vercl0k' Souchet - March 19 2024
//! This is the error taxonomy used across the codebase.
//!
//! Only a [`FormatError`] aborts an analysis; every other error is local to the
//! component that hit it and degrades that component's contribution to the
//! final report (see [`crate::analyze`]).
use std::fmt::{self, Display};

use serde::Serialize;
use thiserror::Error;

use crate::{Gpa, Gva};

pub type Result<R> = std::result::Result<R, Error>;

/// Identifies which page table entry level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PxeKind {
    Pml4e,
    Pdpte,
    Pde,
    Pte,
}

/// The input is not something we know how to analyze; nothing downstream can
/// proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Not even enough bytes to hold the smallest header we know about.
    #[error("buffer is too small to be a crash-dump ({0} bytes)")]
    TooSmall(usize),
    /// The magic bytes belong to a known, non crash-dump, file format.
    #[error("this is a {kind} file, not a crash-dump (starts with {preview})")]
    WrongFormat { kind: &'static str, preview: String },
    /// Nothing we recognize.
    #[error("unrecognized file format (starts with {0})")]
    Unrecognized(String),
}

impl FormatError {
    /// The name of the detected non-dump format, if any.
    #[must_use]
    pub fn detected_kind(&self) -> Option<&'static str> {
        match self {
            Self::WrongFormat { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// A structure extends past the end of the buffer (`TruncatedBuffer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("reading {width} bytes at {offset:#x} runs past the end of the buffer ({len:#x})")]
    Truncated { offset: u64, width: u64, len: u64 },
    #[error("overflow while computing an offset: {0}")]
    Overflow(&'static str),
}

/// Represent the fundamental reason an address translation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslationFailure {
    /// A page table entry exists in the dump but is marked as not present.
    #[error("{gva} isn't present at the {level:?} level")]
    NotPresent { gva: Gva, level: PxeKind },
    /// A physical page needed for the translation, or backing the final
    /// address, is missing from the dump.
    #[error("{gpa} is needed to translate {gva} but is missing from the dump")]
    NotInDump { gva: Gva, gpa: Gpa },
    /// A virtual address that no memory range of the dump covers.
    #[error("{0} isn't backed by any memory range of the dump")]
    Unmapped(Gva),
    #[error("overflow while translating {0}")]
    Overflow(Gva),
}

/// An extracted value passed the format checks but not the plausibility
/// checks. These end up in the report, they never block extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    /// Which part of the analysis raised it.
    pub component: &'static str,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            message: message.into(),
        }
    }
}

impl Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.component, self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("format: {0}")]
    Format(#[from] FormatError),
    #[error("read: {0}")]
    Read(#[from] ReadError),
    #[error("translation: {0}")]
    Translation(#[from] TranslationFailure),
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
    #[error("invalid UNICODE_STRING")]
    InvalidUnicodeString,
    #[error("utf16: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),
    #[error("stream {0} is missing from the minidump")]
    MissingStream(u32),
}

impl Error {
    /// Is it a memory error (truncation / translation), as opposed to data
    /// that is structurally wrong?
    #[must_use]
    pub fn is_memory_error(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Translation(_))
    }
}
