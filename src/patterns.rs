// Axel '0vercl0k' Souchet - October 6 2026
//! The precompiled regex patterns shared by the bug-check text scan, the
//! module extraction, the stack pattern scan and the symbol resolver.
//!
//! The `bytes` flavors run straight over the dump; the others run over
//! strings that were already extracted.
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

// Bug-check text, as the blue screen prints it:
// `*** STOP: 0x0000001E (0xC0000005,0xFFFFF8031D4A2123,0x00000000,0x00000000)`
// Older screens and logs print the code alone, so the parameters are optional.
pub static RE_STOP_LINE: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(
        r"(?i)STOP:\s*0x([0-9a-f]{1,8})(?-u:\b)(?:\s*\(\s*0x([0-9a-f]{1,16})\s*,\s*0x([0-9a-f]{1,16})\s*,\s*0x([0-9a-f]{1,16})\s*,\s*0x([0-9a-f]{1,16})\s*\))?",
    )
    .expect("valid stop line regex")
});

// .. and as the debugger prints it: `BugCheck 1E, {c0000005, fffff803`1d4a2123, 0, 0}`
pub static RE_BUGCHECK_LINE: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(
        r"(?i)BugCheck\s+(?:0x)?([0-9a-f]{1,8})\s*,\s*\{\s*(?:0x)?([0-9a-f`]{1,17})\s*,\s*(?:0x)?([0-9a-f`]{1,17})\s*,\s*(?:0x)?([0-9a-f`]{1,17})\s*,\s*(?:0x)?([0-9a-f`]{1,17})\s*\}",
    )
    .expect("valid bugcheck line regex")
});

// Module file names anywhere in a string; validate with the legitimacy filter.
pub static RE_MODULE_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9_\-]{1,64}\.(?:sys|dll|exe)\b").expect("valid module candidate regex")
});

// A whole module file name, nothing else.
pub static RE_MODULE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9_\-]+\.(?:sys|dll|exe)$").expect("valid module name regex")
});

// `module!function+0xoffset`; the offset is optional.
pub static RE_SYMBOL_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z0-9_]{1,64})!([A-Za-z_?@$][A-Za-z0-9_?@$]{0,127})(?:\+0x([0-9A-Fa-f]{1,16}))?")
        .expect("valid symbol frame regex")
});

// Exported kernel routines: `KeBugCheckEx`, `KiPageFault`, `IopfCallDriver`, ..
pub static RE_KERNEL_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Ke|Ki|Ex|Io|Iof|Iop|Iopf|Mm|Mi|Ob|Ps|Psp|Rtl|Hal|Nt|Zw)[A-Z][A-Za-z0-9_]{2,63}\b")
        .expect("valid kernel function regex")
});

// Something a symbol can be named after.
pub static RE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_@$]{3,127}$").expect("valid identifier regex")
});

// A line of a text symbol index: `fffff803`1d4a2000 nt!KeBugCheckEx`.
pub static RE_INDEX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:0x)?([0-9A-Fa-f`]{1,17})\s+([A-Za-z0-9_]{1,64}![^\s+]{1,256})\s*$")
        .expect("valid symbol index regex")
});

/// Parse a hex number the way debuggers print them: optional `0x` prefix and
/// optional backticks in the middle.
#[must_use]
pub fn parse_hex(raw: &[u8]) -> Option<u64> {
    let raw = raw
        .strip_prefix(b"0x")
        .or_else(|| raw.strip_prefix(b"0X"))
        .unwrap_or(raw);
    let digits = raw
        .iter()
        .filter(|&&b| b != b'`')
        .map(|&b| char::from(b))
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }

    u64::from_str_radix(&digits, 16).ok()
}
