// Axel '0vercl0k' Souchet - October 10 2026
//! Call stack reconstruction.
//!
//! With a thread context and readable virtual memory, the saved frame
//! pointer chain is followed. Without, frames are recovered from text that
//! looks like a stack trace (`module!function+0x...`, driver names, kernel
//! routine names) in the extracted strings.
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::AddressHeuristics;
use crate::context::ThreadContext;
use crate::modules::is_legitimate_module_name;
use crate::patterns::{RE_KERNEL_FUNCTION, RE_MODULE_CANDIDATE, RE_SYMBOL_FRAME};
use crate::strings::ScannedStrings;
use crate::symbols::SymbolResolver;
use crate::virt::VirtualMemory;
use crate::Gva;

/// How a frame was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FrameSource {
    FramePointer,
    PatternScan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    /// Frames recovered from text have no address.
    pub address: Option<u64>,
    pub symbol: Option<String>,
    pub source: FrameSource,
}

/// Why a frame pointer walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WalkEnd {
    /// A null frame pointer.
    Complete,
    /// The frame cap was hit.
    Capped,
    /// The frame at `rbp` couldn't be read.
    Unreadable { rbp: u64 },
    /// The return address of the frame at `rbp` isn't code.
    BadReturn {
        rbp: u64,
        address: u64,
        file_offset: Option<u64>,
    },
    /// `rbp` was already visited.
    Cycle { rbp: u64, file_offset: Option<u64> },
}

/// What a frame pointer walk produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackWalk {
    pub frames: Vec<StackFrame>,
    pub end: WalkEnd,
}

/// Where the frames come from.
pub struct StackReconstructor<'a> {
    heuristics: &'a AddressHeuristics,
    resolver: &'a SymbolResolver<'a>,
    max_frames: usize,
}

impl<'a> StackReconstructor<'a> {
    #[must_use]
    pub fn new(
        heuristics: &'a AddressHeuristics,
        resolver: &'a SymbolResolver<'a>,
        max_frames: usize,
    ) -> Self {
        Self {
            heuristics,
            resolver,
            max_frames: max_frames.max(1),
        }
    }

    fn frame(&self, memory: &dyn VirtualMemory, address: u64) -> StackFrame {
        let file_offset = memory.locate(Gva::new(address)).ok().map(|c| c.offset);

        StackFrame {
            address: Some(address),
            symbol: self.resolver.resolve(address, file_offset),
            source: FrameSource::FramePointer,
        }
    }

    /// Read a pointer sized value.
    fn read_pointer(memory: &dyn VirtualMemory, addr: u64, wide: bool) -> Option<u64> {
        let gva = Gva::new(addr);
        if wide {
            memory.read_u64(gva).ok()
        } else {
            memory.read_u32(gva).ok().map(u64::from)
        }
    }

    /// Follow the saved frame pointers starting from `context`. The first
    /// frame is the instruction pointer; every frame after is the return
    /// address stored right above a saved frame pointer.
    pub fn walk(&self, memory: &dyn VirtualMemory, context: &ThreadContext, wide: bool) -> StackWalk {
        let width = if wide { 8 } else { 4 };
        let mut frames = vec![self.frame(memory, context.rip)];
        let mut seen = BTreeSet::new();
        let mut rbp = context.rbp;
        let end = loop {
            if frames.len() >= self.max_frames {
                break WalkEnd::Capped;
            }

            if rbp == 0 {
                break WalkEnd::Complete;
            }

            let file_offset = memory.locate(Gva::new(rbp)).ok().map(|c| c.offset);
            if !seen.insert(rbp) {
                debug!("frame pointer {rbp:#x} was already visited");
                break WalkEnd::Cycle { rbp, file_offset };
            }

            let saved = Self::read_pointer(memory, rbp, wide);
            let ret = rbp
                .checked_add(width)
                .and_then(|addr| Self::read_pointer(memory, addr, wide));
            let (Some(saved), Some(ret)) = (saved, ret) else {
                trace!("frame at {rbp:#x} is unreadable");
                break WalkEnd::Unreadable { rbp };
            };

            if !self.heuristics.is_code_address(ret) {
                trace!("{ret:#x} doesn't look like a return address");
                break WalkEnd::BadReturn {
                    rbp,
                    address: ret,
                    file_offset,
                };
            }

            if frames.last().and_then(|f| f.address) != Some(ret) {
                frames.push(self.frame(memory, ret));
            }

            rbp = saved;
        };

        debug!("frame pointer walk: {} frames, {end:?}", frames.len());

        StackWalk { frames, end }
    }

    /// Recover frames from text. Candidates are ranked by: has a module
    /// prefix, is a kernel routine, has an offset. Ties keep the order they
    /// were found in.
    #[must_use]
    pub fn scan(&self, strings: &ScannedStrings) -> Vec<StackFrame> {
        // Symbol -> (score, discovery order).
        let mut candidates = BTreeMap::<String, (u32, usize)>::new();
        let mut add = |symbol: &str, score: u32| {
            let order = candidates.len();
            let entry = candidates.entry(symbol.to_string()).or_insert((score, order));
            entry.0 = entry.0.max(score);
        };

        for s in &strings.strings {
            let mut covered = Vec::new();
            for caps in RE_SYMBOL_FRAME.captures_iter(&s.text) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };

                let mut score = 4;
                if RE_KERNEL_FUNCTION.is_match(&caps[2]) {
                    score += 2;
                }

                if caps.get(3).is_some() {
                    score += 1;
                }

                covered.push(whole.range());
                add(whole.as_str(), score);
            }

            let outside = |start: usize| !covered.iter().any(|r| r.contains(&start));
            for m in RE_KERNEL_FUNCTION.find_iter(&s.text) {
                if outside(m.start()) {
                    add(m.as_str(), 2);
                }
            }

            for m in RE_MODULE_CANDIDATE.find_iter(&s.text) {
                let name = m.as_str();
                let is_driver = name
                    .rsplit_once('.')
                    .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("sys"));
                if is_driver && outside(m.start()) && is_legitimate_module_name(name) {
                    add(name, 4);
                }
            }
        }

        let mut ranked = candidates.into_iter().collect::<Vec<_>>();
        ranked.sort_by_key(|(_, (score, order))| (std::cmp::Reverse(*score), *order));

        ranked
            .into_iter()
            .take(self.max_frames)
            .map(|(symbol, _)| StackFrame {
                address: None,
                symbol: Some(symbol),
                source: FrameSource::PatternScan,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::{Encoding, ExtractedString};
    use crate::virt::{MemoryRange, MinidumpMemory};
    use crate::BinaryReader;

    const STACK: u64 = 0xffff_f880_0000_0000;
    const RIP: u64 = 0xfffff803_1d4a2123;

    fn context(rbp: u64) -> ThreadContext {
        ThreadContext {
            thread_id: None,
            rip: RIP,
            rsp: STACK,
            rbp,
            cr3_override: None,
            priority: None,
        }
    }

    fn memory(data: &[u8]) -> MinidumpMemory<'_> {
        MinidumpMemory::with_ranges(
            BinaryReader::new(data),
            vec![MemoryRange {
                start: STACK,
                size: data.len() as u64,
                file_offset: 0,
            }],
        )
    }

    fn frame(data: &mut [u8], at: usize, saved: u64, ret: u64) {
        data[at..at + 8].copy_from_slice(&saved.to_le_bytes());
        data[at + 8..at + 16].copy_from_slice(&ret.to_le_bytes());
    }

    fn addresses(frames: &[StackFrame]) -> Vec<u64> {
        frames.iter().filter_map(|f| f.address).collect()
    }

    #[test]
    fn chain() {
        let mut data = vec![0u8; 0x1000];
        frame(&mut data, 0x100, STACK + 0x200, 0xfffff803_1d4a3000);
        frame(&mut data, 0x200, STACK + 0x300, 0xfffff803_1d4a4000);
        frame(&mut data, 0x300, 0, 0xfffff803_1d4a5000);
        let memory = memory(&data);
        let heuristics = AddressHeuristics::default();
        let resolver = SymbolResolver::new();
        let walker = StackReconstructor::new(&heuristics, &resolver, 25);

        let walk = walker.walk(&memory, &context(STACK + 0x100), true);
        assert_eq!(
            addresses(&walk.frames),
            [RIP, 0xfffff803_1d4a3000, 0xfffff803_1d4a4000, 0xfffff803_1d4a5000]
        );
        assert_eq!(walk.end, WalkEnd::Complete);
        assert!(walk.frames.iter().all(|f| f.source == FrameSource::FramePointer));

        let walker = StackReconstructor::new(&heuristics, &resolver, 2);
        let walk = walker.walk(&memory, &context(STACK + 0x100), true);
        assert_eq!(walk.frames.len(), 2);
        assert_eq!(walk.end, WalkEnd::Capped);
    }

    #[test]
    fn cycle() {
        let mut data = vec![0u8; 0x1000];
        // A -> B -> A
        frame(&mut data, 0x100, STACK + 0x200, 0xfffff803_1d4a3000);
        frame(&mut data, 0x200, STACK + 0x100, 0xfffff803_1d4a4000);
        let memory = memory(&data);
        let heuristics = AddressHeuristics::default();
        let resolver = SymbolResolver::new();
        let walker = StackReconstructor::new(&heuristics, &resolver, 25);

        let walk = walker.walk(&memory, &context(STACK + 0x100), true);
        assert_eq!(
            addresses(&walk.frames),
            [RIP, 0xfffff803_1d4a3000, 0xfffff803_1d4a4000]
        );
        assert_eq!(
            walk.end,
            WalkEnd::Cycle {
                rbp: STACK + 0x100,
                file_offset: Some(0x100)
            }
        );
    }

    #[test]
    fn broken_chain() {
        let mut data = vec![0u8; 0x1000];
        frame(&mut data, 0x100, STACK + 0x200, 0xfffff803_1d4a3000);
        frame(&mut data, 0x200, STACK + 0x300, 0x4141_4141_4141_4141);
        // Same return address twice in a row only shows up once.
        frame(&mut data, 0x400, STACK + 0x500, RIP);
        frame(&mut data, 0x500, STACK + 0x10_000, 0xfffff803_1d4a3000);
        let memory = memory(&data);
        let heuristics = AddressHeuristics::default();
        let resolver = SymbolResolver::new();
        let walker = StackReconstructor::new(&heuristics, &resolver, 25);

        let walk = walker.walk(&memory, &context(STACK + 0x100), true);
        assert_eq!(addresses(&walk.frames), [RIP, 0xfffff803_1d4a3000]);
        assert_eq!(
            walk.end,
            WalkEnd::BadReturn {
                rbp: STACK + 0x200,
                address: 0x4141_4141_4141_4141,
                file_offset: Some(0x200)
            }
        );

        let walk = walker.walk(&memory, &context(STACK + 0x400), true);
        assert_eq!(addresses(&walk.frames), [RIP, 0xfffff803_1d4a3000]);
        assert_eq!(
            walk.end,
            WalkEnd::Unreadable {
                rbp: STACK + 0x10_000
            }
        );
    }

    #[test]
    fn narrow_frames() {
        let mut data = vec![0u8; 0x1000];
        data[0x100..0x104].copy_from_slice(&0u32.to_le_bytes());
        data[0x104..0x108].copy_from_slice(&0x7700_1000u32.to_le_bytes());
        let memory = MinidumpMemory::with_ranges(
            BinaryReader::new(&data),
            vec![MemoryRange {
                start: 0x0012_f000,
                size: 0x1000,
                file_offset: 0,
            }],
        );
        let heuristics = AddressHeuristics::default();
        let resolver = SymbolResolver::new();
        let walker = StackReconstructor::new(&heuristics, &resolver, 25);
        let mut ctx = context(0x0012_f100);
        ctx.rip = 0x7700_2000;

        let walk = walker.walk(&memory, &ctx, false);
        assert_eq!(addresses(&walk.frames), [0x7700_2000, 0x7700_1000]);
        assert_eq!(walk.end, WalkEnd::Complete);
    }

    #[test]
    fn pattern_scan() {
        let texts = [
            "fffff803`1d4a2000 nt!KeBugCheckEx+0x107",
            "mydrv.sys",
            "IopfCallDriver",
            "mydrv!DispatchIoctl",
            "nt!KeBugCheckEx+0x107",
            "wxr.sys",
        ];
        let strings = ScannedStrings {
            strings: texts
                .iter()
                .enumerate()
                .map(|(i, t)| ExtractedString {
                    text: t.to_string(),
                    offset: i as u64 * 0x20,
                    encoding: Encoding::Ascii,
                })
                .collect(),
            truncated: false,
        };
        let heuristics = AddressHeuristics::default();
        let resolver = SymbolResolver::new();
        let walker = StackReconstructor::new(&heuristics, &resolver, 25);

        let frames = walker.scan(&strings);
        let symbols = frames
            .iter()
            .filter_map(|f| f.symbol.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(
            symbols,
            [
                "nt!KeBugCheckEx+0x107",
                "mydrv.sys",
                "mydrv!DispatchIoctl",
                "IopfCallDriver"
            ]
        );
        assert!(frames.iter().all(|f| f.address.is_none()));

        let walker = StackReconstructor::new(&heuristics, &resolver, 2);
        assert_eq!(walker.scan(&strings).len(), 2);
    }
}
