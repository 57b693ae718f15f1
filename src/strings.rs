// Axel '0vercl0k' Souchet - October 6 2026
//! Bounded printable string extraction (ASCII and UTF-16LE).
use serde::Serialize;
use tracing::debug;

use crate::budget::Deadline;
use crate::config::ScanLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Encoding {
    Ascii,
    Utf16Le,
}

/// A run of printable characters found in the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedString {
    pub text: String,
    /// File offset of the first character.
    pub offset: u64,
    pub encoding: Encoding,
}

/// Everything the scanners found, sorted by offset.
#[derive(Debug, Default, Clone)]
pub struct ScannedStrings {
    pub strings: Vec<ExtractedString>,
    /// Did a scan stop early because of the time budget?
    pub truncated: bool,
}

impl ScannedStrings {
    /// The strings that were decoded from `encoding`.
    pub fn with_encoding(&self, encoding: Encoding) -> impl Iterator<Item = &ExtractedString> {
        self.strings.iter().filter(move |s| s.encoding == encoding)
    }

    /// The last string starting at or before `offset`.
    #[must_use]
    pub fn preceding(&self, offset: u64) -> Option<&ExtractedString> {
        let idx = self.strings.partition_point(|s| s.offset <= offset);

        idx.checked_sub(1).map(|idx| &self.strings[idx])
    }
}

fn is_printable(b: u8) -> bool {
    b.is_ascii_graphic() || b == b' ' || b == b'\t'
}

/// Accumulates one encoding's runs and enforces the limits.
struct Collector<'a> {
    limits: &'a ScanLimits,
    encoding: Encoding,
    run: String,
    run_offset: u64,
    out: Vec<ExtractedString>,
}

impl<'a> Collector<'a> {
    fn new(limits: &'a ScanLimits, encoding: Encoding) -> Self {
        Self {
            limits,
            encoding,
            run: String::new(),
            run_offset: 0,
            out: Vec::new(),
        }
    }

    fn push(&mut self, offset: u64, c: char) {
        if self.run.is_empty() {
            self.run_offset = offset;
        }

        self.run.push(c);
    }

    fn end_run(&mut self) {
        if self.run.len() >= self.limits.min_string_length
            && self.out.len() < self.limits.max_strings
        {
            self.out.push(ExtractedString {
                text: std::mem::take(&mut self.run),
                offset: self.run_offset,
                encoding: self.encoding,
            });
        }

        self.run.clear();
    }

    fn is_full(&self) -> bool {
        self.out.len() >= self.limits.max_strings
    }

    fn finish(mut self) -> Vec<ExtractedString> {
        self.end_run();

        self.out
    }
}

/// Extract the printable strings of the first [`ScanLimits::strings_window`]
/// bytes of `data`. Running out of time keeps what was found so far.
#[must_use]
pub fn scan_strings(data: &[u8], limits: &ScanLimits, deadline: &Deadline) -> ScannedStrings {
    let window = usize::try_from(limits.strings_window).unwrap_or(usize::MAX);
    let scan = &data[..data.len().min(window)];
    let mut out = ScannedStrings::default();

    // ASCII.
    let mut ascii = Collector::new(limits, Encoding::Ascii);
    for (i, &b) in scan.iter().enumerate() {
        if deadline.expired_at(i) {
            debug!("strings/ascii time budget exhausted at {i:#x}");
            out.truncated = true;
            break;
        }

        if ascii.is_full() {
            break;
        }

        if is_printable(b) {
            ascii.push(i as u64, char::from(b));
        } else {
            ascii.end_run();
        }
    }

    // UTF-16LE, on even offsets.
    let mut utf16 = Collector::new(limits, Encoding::Utf16Le);
    for (i, chunk) in scan.chunks_exact(2).enumerate() {
        if deadline.expired_at(i) {
            debug!("strings/utf16le time budget exhausted at {:#x}", i * 2);
            out.truncated = true;
            break;
        }

        if utf16.is_full() {
            break;
        }

        match u16::from_le_bytes([chunk[0], chunk[1]]) {
            ch @ 0x20..=0x7e | ch @ 0x09 => utf16.push(i as u64 * 2, char::from(ch as u8)),
            _ => utf16.end_run(),
        }
    }

    out.strings = ascii.finish();
    out.strings.extend(utf16.finish());
    out.strings
        .sort_by(|a, b| (a.offset, a.encoding).cmp(&(b.offset, b.encoding)));

    out
}
