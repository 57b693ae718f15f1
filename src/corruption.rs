// Axel '0vercl0k' Souchet - October 11 2026
//! Memory corruption indicators.
//!
//! The scans only look at bytes: freed / uninitialized memory fills, guard
//! bytes that were partially overwritten and pool headers that disagree with
//! their neighbours. None of it depends on the rest of the analysis having
//! succeeded. A broken frame pointer chain, found by the stack walk, can be
//! turned into an indicator with [`stack_indicator`].
use serde::Serialize;
use tracing::debug;

use crate::budget::Deadline;
use crate::config::AnalysisConfig;
use crate::error::ValidationWarning;
use crate::stack::WalkEnd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorruptionKind {
    UseAfterFree,
    DoubleFree,
    BufferOverflow,
    Uninitialized,
    StackCorruption,
    HeapCorruption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionIndicator {
    pub kind: CorruptionKind,
    /// File offset.
    pub offset: u64,
    /// 0 to 100.
    pub confidence: u8,
    pub details: String,
}

/// A 32-bit fill pattern and what it means.
struct Fill {
    value: u32,
    kind: CorruptionKind,
    /// Confidence of a run of the minimum length.
    base_confidence: u8,
    what: &'static str,
}

static FILLS: &[Fill] = &[
    Fill {
        value: 0xfeee_feee,
        kind: CorruptionKind::UseAfterFree,
        base_confidence: 60,
        what: "freed heap memory",
    },
    Fill {
        value: 0xdddd_dddd,
        kind: CorruptionKind::UseAfterFree,
        base_confidence: 55,
        what: "freed debug heap memory",
    },
    Fill {
        value: 0xdead_beef,
        kind: CorruptionKind::UseAfterFree,
        base_confidence: 45,
        what: "poisoned memory",
    },
    Fill {
        value: 0xbaad_f00d,
        kind: CorruptionKind::Uninitialized,
        base_confidence: 50,
        what: "uninitialized heap memory",
    },
    Fill {
        value: 0xcdcd_cdcd,
        kind: CorruptionKind::Uninitialized,
        base_confidence: 45,
        what: "uninitialized debug heap memory",
    },
    // Also what code sections are padded with, hence the low confidence.
    Fill {
        value: 0xcccc_cccc,
        kind: CorruptionKind::Uninitialized,
        base_confidence: 20,
        what: "uninitialized stack memory",
    },
];

/// Minimum number of consecutive fill values.
const MIN_FILL_REPEATS: usize = 4;

/// Guard bytes surrounding allocations.
static GUARD_BYTES: &[(u8, &str)] = &[
    (0xfd, "no man's land guard"),
    (0xab, "heap tail guard"),
];

const GUARD_WINDOW: usize = 16;
/// A window with at least this many guard bytes (but not all of them) was
/// written over.
const GUARD_THRESHOLD: usize = 12;

/// x64 `POOL_HEADER`.
const POOL_HEADER_SIZE: usize = 16;
const POOL_BLOCK_UNIT: usize = 16;
const PAGE_SIZE: usize = 0x1_000;

/// Sort by offset then kind, and cap.
pub fn finalize(
    mut indicators: Vec<CorruptionIndicator>,
    max_findings: usize,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<CorruptionIndicator> {
    indicators.sort_by_key(|i| (i.offset, i.kind));
    indicators.dedup_by_key(|i| (i.offset, i.kind));
    if indicators.len() > max_findings {
        warnings.push(ValidationWarning::new(
            "corruption",
            format!(
                "{} corruption indicators, keeping the first {max_findings}",
                indicators.len()
            ),
        ));
        indicators.truncate(max_findings);
    }

    indicators
}

/// Turn the way a frame pointer walk ended into an indicator, if it says
/// anything about the stack being corrupted. An unreadable frame only means
/// the page isn't in the dump.
#[must_use]
pub fn stack_indicator(end: &WalkEnd) -> Option<CorruptionIndicator> {
    match *end {
        WalkEnd::Cycle {
            rbp,
            file_offset: Some(offset),
        } => Some(CorruptionIndicator {
            kind: CorruptionKind::StackCorruption,
            offset,
            confidence: 60,
            details: format!("the frame pointer chain loops back to {rbp:#x}"),
        }),
        WalkEnd::BadReturn {
            rbp,
            address,
            file_offset: Some(offset),
        } if address != 0 => Some(CorruptionIndicator {
            kind: CorruptionKind::StackCorruption,
            offset,
            confidence: 40,
            details: format!(
                "the frame at {rbp:#x} returns to {address:#x} which isn't code"
            ),
        }),
        _ => None,
    }
}

/// Scans a window of the dump.
pub struct MemoryCorruptionAnalyzer<'a> {
    config: &'a AnalysisConfig,
    deadline: &'a Deadline,
}

impl<'a> MemoryCorruptionAnalyzer<'a> {
    #[must_use]
    pub fn new(config: &'a AnalysisConfig, deadline: &'a Deadline) -> Self {
        Self { config, deadline }
    }

    /// Run every scan over the start of `data`. Findings come out unsorted
    /// and uncapped; [`finalize`] them once everything was gathered.
    pub fn scan(&self, data: &[u8], warnings: &mut Vec<ValidationWarning>) -> Vec<CorruptionIndicator> {
        let window = usize::try_from(self.config.scan.corruption_window)
            .map_or(data.len(), |w| w.min(data.len()));
        let data = &data[..window];
        let mut indicators = Vec::new();
        self.fills(data, &mut indicators);
        self.guards(data, &mut indicators);
        self.pools(data, &mut indicators);
        if self.deadline.was_exhausted() {
            warnings.push(ValidationWarning::new(
                "corruption",
                "out of time, the corruption scan is partial",
            ));
        }

        debug!("{} corruption indicators", indicators.len());

        indicators
    }

    /// Runs of fill values on 32-bit boundaries.
    fn fills(&self, data: &[u8], out: &mut Vec<CorruptionIndicator>) {
        let mut run_start = 0;
        let mut run_len = 0;
        let mut run_value = 0;
        let mut flush = |start: usize, len: usize, value: u32| {
            if len < MIN_FILL_REPEATS {
                return;
            }

            let Some(fill) = FILLS.iter().find(|f| f.value == value) else {
                return;
            };

            // Longer runs are more telling, up to a point.
            let bonus = ((len - MIN_FILL_REPEATS) * 2).min(30) as u8;
            out.push(CorruptionIndicator {
                kind: fill.kind,
                offset: start as u64,
                confidence: (fill.base_confidence + bonus).min(95),
                details: format!("{len} consecutive {value:#010x} ({})", fill.what),
            });
        };

        for (idx, chunk) in data.chunks_exact(4).enumerate() {
            if self.deadline.expired_at(idx) {
                break;
            }

            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if run_len > 0 && value == run_value {
                run_len += 1;
                continue;
            }

            flush(run_start, run_len, run_value);
            run_start = idx * 4;
            run_value = value;
            run_len = 1;
        }

        flush(run_start, run_len, run_value);
    }

    /// Guard byte windows where most, but not all, bytes are intact.
    fn guards(&self, data: &[u8], out: &mut Vec<CorruptionIndicator>) {
        for (idx, window) in data.chunks_exact(GUARD_WINDOW).enumerate() {
            if self.deadline.expired_at(idx) {
                break;
            }

            for &(guard, what) in GUARD_BYTES {
                let matching = window.iter().filter(|&&b| b == guard).count();
                if !(GUARD_THRESHOLD..GUARD_WINDOW).contains(&matching) {
                    continue;
                }

                out.push(CorruptionIndicator {
                    kind: CorruptionKind::BufferOverflow,
                    offset: (idx * GUARD_WINDOW) as u64,
                    confidence: (40 + (matching - GUARD_THRESHOLD) * 10) as u8,
                    details: format!(
                        "{matching} of {GUARD_WINDOW} bytes are {guard:#04x} ({what}), the rest was overwritten"
                    ),
                });
            }
        }
    }

    /// Pool pages: chains of `POOL_HEADER`s starting at a page boundary.
    fn pools(&self, data: &[u8], out: &mut Vec<CorruptionIndicator>) {
        for (idx, page) in data.chunks_exact(PAGE_SIZE).enumerate() {
            if self.deadline.expired() {
                break;
            }

            pool_page(page, (idx * PAGE_SIZE) as u64, out);
        }
    }
}

/// The bits of a `POOL_HEADER` we look at.
#[derive(Debug, Clone, Copy)]
struct PoolHeader {
    previous_size: u8,
    block_size: u8,
    pool_type: u8,
    tag: [u8; 4],
}

impl PoolHeader {
    fn parse(raw: &[u8]) -> Option<Self> {
        let raw = raw.get(..POOL_HEADER_SIZE)?;

        Some(Self {
            previous_size: raw[0],
            block_size: raw[2],
            pool_type: raw[3],
            tag: [raw[4], raw[5], raw[6], raw[7]],
        })
    }

    fn has_tag(&self) -> bool {
        self.tag.iter().all(|b| b.is_ascii_alphanumeric() || *b == b' ')
    }

    fn is_free(&self) -> bool {
        self.pool_type == 0
    }
}

/// Walk the pool headers of a page. A page is only considered a pool page if
/// its first two headers look like ones.
fn pool_page(page: &[u8], page_offset: u64, out: &mut Vec<CorruptionIndicator>) {
    let Some(first) = PoolHeader::parse(page) else {
        return;
    };

    if first.previous_size != 0 || first.block_size == 0 || !first.has_tag() {
        return;
    }

    let second_at = usize::from(first.block_size) * POOL_BLOCK_UNIT;
    match PoolHeader::parse(page.get(second_at..).unwrap_or_default()) {
        Some(second) if second.has_tag() && second.block_size != 0 => {}
        _ => return,
    }

    let mut previous = first;
    let mut at = second_at;
    while let Some(header) = PoolHeader::parse(page.get(at..).unwrap_or_default()) {
        let offset = page_offset + at as u64;
        if header.previous_size != previous.block_size {
            out.push(CorruptionIndicator {
                kind: CorruptionKind::HeapCorruption,
                offset,
                confidence: 70,
                details: format!(
                    "pool header PreviousSize is {:#x} but the previous block is {:#x}",
                    header.previous_size, previous.block_size
                ),
            });
            break;
        }

        if header.is_free() && previous.is_free() {
            out.push(CorruptionIndicator {
                kind: CorruptionKind::DoubleFree,
                offset,
                confidence: 50,
                details: "two adjacent free pool blocks were not coalesced".into(),
            });
        }

        if header.block_size == 0 {
            break;
        }

        previous = header;
        at += usize::from(header.block_size) * POOL_BLOCK_UNIT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(data: &[u8]) -> Vec<CorruptionIndicator> {
        let config = AnalysisConfig::default();
        let deadline = Deadline::unlimited();
        let mut warnings = Vec::new();
        let found = MemoryCorruptionAnalyzer::new(&config, &deadline).scan(data, &mut warnings);

        finalize(found, config.max_findings, &mut warnings)
    }

    #[test]
    fn freed_fill() {
        let mut data = vec![0u8; 0x100];
        for chunk in data[0x40..0x60].chunks_exact_mut(4) {
            chunk.copy_from_slice(&0xfeee_feeeu32.to_le_bytes());
        }

        // Too short to mean anything.
        for chunk in data[0x80..0x8c].chunks_exact_mut(4) {
            chunk.copy_from_slice(&0xdddd_ddddu32.to_le_bytes());
        }

        let found = scan(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CorruptionKind::UseAfterFree);
        assert_eq!(found[0].offset, 0x40);
        assert_eq!(found[0].confidence, 68);
    }

    #[test]
    fn guard_bytes() {
        let mut data = vec![0u8; 0x40];
        data[0x10..0x20].fill(0xfd);
        data[0x1c..0x20].copy_from_slice(b"AAAA");
        // Intact guards are fine.
        data[0x20..0x30].fill(0xab);

        let found = scan(&data);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CorruptionKind::BufferOverflow);
        assert_eq!(found[0].offset, 0x10);
        assert_eq!(found[0].confidence, 40);
    }

    fn pool_header(data: &mut [u8], at: usize, previous: u8, size: u8, pool_type: u8) {
        data[at] = previous;
        data[at + 2] = size;
        data[at + 3] = pool_type;
        data[at + 4..at + 8].copy_from_slice(b"Tag1");
    }

    #[test]
    fn pool_headers() {
        let mut data = vec![0u8; 0x2000];
        // A healthy page..
        pool_header(&mut data, 0, 0, 4, 2);
        pool_header(&mut data, 0x40, 4, 8, 2);
        pool_header(&mut data, 0xc0, 8, 0, 2);
        // ..and one whose third header doesn't agree with the second.
        pool_header(&mut data, 0x1000, 0, 4, 2);
        pool_header(&mut data, 0x1040, 4, 2, 0);
        pool_header(&mut data, 0x1060, 2, 2, 0);
        pool_header(&mut data, 0x1080, 7, 2, 2);

        let found = scan(&data);
        assert_eq!(
            found.iter().map(|f| (f.kind, f.offset)).collect::<Vec<_>>(),
            [
                (CorruptionKind::DoubleFree, 0x1060),
                (CorruptionKind::HeapCorruption, 0x1080)
            ]
        );
    }

    #[test]
    fn broken_frame_chain() {
        let cycle = WalkEnd::Cycle {
            rbp: 0x1000,
            file_offset: Some(0x2000),
        };
        assert_eq!(
            stack_indicator(&cycle).map(|i| i.kind),
            Some(CorruptionKind::StackCorruption)
        );
        assert_eq!(stack_indicator(&WalkEnd::Unreadable { rbp: 0x1000 }), None);
        assert_eq!(stack_indicator(&WalkEnd::Complete), None);
    }

    #[test]
    fn findings_are_capped() {
        let mut warnings = Vec::new();
        let indicators = (0..10)
            .rev()
            .map(|i| CorruptionIndicator {
                kind: CorruptionKind::UseAfterFree,
                offset: i,
                confidence: 50,
                details: String::new(),
            })
            .collect();
        let kept = finalize(indicators, 3, &mut warnings);
        assert_eq!(kept.iter().map(|i| i.offset).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(warnings.len(), 1);
    }
}
