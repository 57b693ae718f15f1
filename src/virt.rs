// Axel '0vercl0k' Souchet - November 9 2025
//! Virtual memory: the x86-64 page table walk and the two ways a dump can
//! back a virtual address.
//!
//! Kernel dumps embed the page tables, so a [`Gva`] is turned into a [`Gpa`]
//! with [`AddressTranslator::translate`] and then into a file offset with
//! [`PhysicalMemory`]. Minidumps don't have page tables but list the virtual
//! ranges they captured in their memory streams ([`MinidumpMemory`]). Both
//! implement [`VirtualMemory`] which is what the module walker and the stack
//! walker consume.
use std::cmp::min;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{PxeKind, TranslationFailure, ValidationWarning};
use crate::gxa::{paging, Gpa, Gva, Gxa, PageKind};
use crate::physmem::PhysicalMemory;
use crate::pxe::{Pfn, Pxe};
use crate::streams::StreamDirectory;
use crate::structs::{
    MEMORY_DESCRIPTOR64_SIZE, MEMORY_DESCRIPTOR_SIZE, STREAM_TYPE_MEMORY64_LIST,
    STREAM_TYPE_MEMORY_LIST,
};
use crate::BinaryReader;

/// The details related to a virtual to physical address translation.
///
/// If you are wondering why there is no 'readable' field, it is because
/// [`AddressTranslator::translate`] returns an error if one of the PXE is
/// marked as not present. In other words, if the translation succeeds, the
/// page is at least readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Translation {
    /// The physical page backing the virtual address that was requested.
    #[serde(skip)]
    pub pfn: Pfn,
    /// The byte offset in that physical page.
    pub offset: u64,
    /// The kind of physical page.
    pub page_kind: PageKind,
    /// Is the page writable?
    pub writable: bool,
    /// Is the page executable?
    pub executable: bool,
    /// Is the page user accessible?
    pub user_accessible: bool,
}

impl Translation {
    #[must_use]
    pub fn huge_page(pxes: &[Pxe; 2], gva: Gva) -> Self {
        Self::inner_new(pxes, PageKind::Huge, gva)
    }

    #[must_use]
    pub fn large_page(pxes: &[Pxe; 3], gva: Gva) -> Self {
        Self::inner_new(pxes, PageKind::Large, gva)
    }

    #[must_use]
    pub fn new(pxes: &[Pxe; 4], gva: Gva) -> Self {
        Self::inner_new(pxes, PageKind::Normal, gva)
    }

    /// Create a new instance from the PXEs walked and the original GVA.
    fn inner_new<const N: usize>(pxes: &[Pxe; N], page_kind: PageKind, gva: Gva) -> Self {
        let writable = pxes.iter().all(Pxe::writable);
        let executable = pxes.iter().all(Pxe::executable);
        let user_accessible = pxes.iter().all(Pxe::user_accessible);
        let pfn = pxes[N - 1].pfn;
        let offset = page_kind.page_offset(gva.u64());

        Self {
            pfn,
            offset,
            page_kind,
            writable,
            executable,
            user_accessible,
        }
    }

    /// The physical address backing the virtual address. The low frame bits
    /// of large / huge pages (PAT, reserved) are ignored.
    #[must_use]
    pub fn gpa(&self) -> Gpa {
        let base = self.pfn.gpa().u64() & !(self.page_kind.size() - 1);

        Gpa::new(base | self.offset)
    }
}

/// Walks the 4-level x86-64 page tables stored in a kernel dump.
#[derive(Debug, Clone, Copy)]
pub struct AddressTranslator<'buf> {
    reader: BinaryReader<'buf>,
    physmem: &'buf PhysicalMemory,
    dtb: Gpa,
}

impl<'buf> AddressTranslator<'buf> {
    #[must_use]
    pub fn new(reader: BinaryReader<'buf>, physmem: &'buf PhysicalMemory, dtb: Gpa) -> Self {
        Self {
            reader,
            physmem,
            dtb,
        }
    }

    #[must_use]
    pub fn dtb(&self) -> Gpa {
        self.dtb
    }

    /// Translate a [`Gva`] into a [`Gpa`] using the directory table base the
    /// translator has been created with.
    pub fn translate(&self, gva: Gva) -> Result<Translation, TranslationFailure> {
        let read_pxe = |base: Gpa, idx: u64, level: PxeKind| -> Result<Pxe, TranslationFailure> {
            let gpa = base
                .u64()
                .checked_add(idx * paging::PXE_SIZE)
                .map(Gpa::new)
                .ok_or(TranslationFailure::Overflow(gva))?;
            // If the physical page isn't in the dump, say which gva we were
            // translating and where.
            let raw = self
                .physmem
                .read_u64(&self.reader, gpa)
                .ok_or(TranslationFailure::NotInDump { gva, gpa })?;
            let pxe = Pxe::from(raw);
            trace!("{level:?} for {gva} @ {gpa}: {raw:#x}");

            Ok(pxe)
        };
        let not_present = |level| TranslationFailure::NotPresent { gva, level };

        // Aligning in case PCID bits are set (bits 11:0)
        let pml4_base = self.dtb.page_align();
        let pml4e = read_pxe(pml4_base, gva.pml4e_idx(), PxeKind::Pml4e)?;
        if !pml4e.present() {
            return Err(not_present(PxeKind::Pml4e));
        }

        let pdpte = read_pxe(pml4e.pfn.gpa(), gva.pdpe_idx(), PxeKind::Pdpte)?;
        if !pdpte.present() {
            return Err(not_present(PxeKind::Pdpte));
        }

        // huge pages:
        // 7 (PS) - Page size; must be 1 (otherwise, this entry references a page
        // directory; see Table 4-1.
        if pdpte.large_page() {
            return Ok(Translation::huge_page(&[pml4e, pdpte], gva));
        }

        let pde = read_pxe(pdpte.pfn.gpa(), gva.pde_idx(), PxeKind::Pde)?;
        if !pde.present() {
            return Err(not_present(PxeKind::Pde));
        }

        // large pages:
        // 7 (PS) - Page size; must be 1 (otherwise, this entry references a page
        // table; see Table 4-18.
        if pde.large_page() {
            return Ok(Translation::large_page(&[pml4e, pdpte, pde], gva));
        }

        let pte = read_pxe(pde.pfn.gpa(), gva.pte_idx(), PxeKind::Pte)?;
        // We'll allow reading from a transition PTE, so return an error only if
        // it's not one, otherwise we'll carry on.
        if !pte.present() && !pte.transition() {
            return Err(not_present(PxeKind::Pte));
        }

        Ok(Translation::new(&[pml4e, pdpte, pde, pte], gva))
    }

    /// Translate a [`Gva`] all the way down to an offset in the dump. The
    /// offset is always inside of the buffer.
    #[must_use]
    pub fn file_offset(&self, gva: Gva) -> Option<u64> {
        self.locate(gva).ok().map(|chunk| chunk.offset)
    }
}

/// A bunch of contiguous bytes in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Where it starts in the file.
    pub offset: u64,
    /// How many bytes can be read from there before the next virtual
    /// address has to be located again.
    pub len: u64,
}

/// Something that can read virtual memory out of a dump.
pub trait VirtualMemory {
    /// The dump.
    fn reader(&self) -> BinaryReader<'_>;

    /// Find where the content of `gva` is in the file.
    fn locate(&self, gva: Gva) -> Result<Chunk, TranslationFailure>;

    /// Read virtual memory starting at `gva` into `buf`. This returns how many
    /// bytes were read, stopping at the first address that can't be
    /// located.
    fn read(&self, gva: Gva, buf: &mut [u8]) -> usize {
        self.read_exact(gva, buf).map_or_else(|(read, _)| read, |()| buf.len())
    }

    /// Read exactly `buf.len()` bytes starting at `gva`. On failure, this
    /// returns how many bytes were read and why it stopped.
    fn read_exact(&self, gva: Gva, buf: &mut [u8]) -> Result<(), (usize, TranslationFailure)> {
        let reader = self.reader();
        // Amount of bytes left to read.
        let mut amount_left = buf.len();
        // Total amount of bytes that we have successfully read.
        let mut total_read = 0;
        // The current gva we are reading from.
        let mut addr = gva;
        while amount_left > 0 {
            let chunk = self.locate(addr).map_err(|e| (total_read, e))?;
            // Either we read the chunk until its end, or we stop before if we
            // can get by with less.
            let amount_wanted = min(amount_left as u64, chunk.len);
            let src = reader
                .bytes(chunk.offset, amount_wanted)
                .map_err(|_| (total_read, TranslationFailure::Unmapped(addr)))?;
            buf[total_read..total_read + src.len()].copy_from_slice(src);
            total_read += src.len();
            amount_left -= src.len();
            if amount_left == 0 {
                break;
            }

            addr = addr
                .u64()
                .checked_add(amount_wanted)
                .map(Gva::new)
                .ok_or((total_read, TranslationFailure::Overflow(addr)))?;
        }

        Ok(())
    }

    fn read_u64(&self, gva: Gva) -> Result<u64, TranslationFailure> {
        let mut buf = [0; 8];
        self.read_exact(gva, &mut buf).map_err(|(_, e)| e)?;

        Ok(u64::from_le_bytes(buf))
    }

    fn read_u32(&self, gva: Gva) -> Result<u32, TranslationFailure> {
        let mut buf = [0; 4];
        self.read_exact(gva, &mut buf).map_err(|(_, e)| e)?;

        Ok(u32::from_le_bytes(buf))
    }

    fn read_u16(&self, gva: Gva) -> Result<u16, TranslationFailure> {
        let mut buf = [0; 2];
        self.read_exact(gva, &mut buf).map_err(|(_, e)| e)?;

        Ok(u16::from_le_bytes(buf))
    }
}

impl<'buf> VirtualMemory for AddressTranslator<'buf> {
    fn reader(&self) -> BinaryReader<'_> {
        self.reader
    }

    fn locate(&self, gva: Gva) -> Result<Chunk, TranslationFailure> {
        let gpa = self.translate(gva)?.gpa();
        let offset = self
            .physmem
            .translate(&self.reader, gpa)
            .ok_or(TranslationFailure::NotInDump { gva, gpa })?;
        // Physical pages are not necessarily contiguous in the file, even
        // inside of a large page.
        let len = min(paging::PAGE_SIZE - gpa.offset(), self.reader.len() - offset);

        Ok(Chunk { offset, len })
    }
}

/// A virtual memory range captured in a minidump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryRange {
    pub start: u64,
    pub size: u64,
    pub file_offset: u64,
}

impl MemoryRange {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr - self.start < self.size
    }
}

/// Virtual memory backed by the memory streams of a minidump.
#[derive(Debug, Clone)]
pub struct MinidumpMemory<'buf> {
    reader: BinaryReader<'buf>,
    /// Sorted by `start`.
    ranges: Vec<MemoryRange>,
}

impl<'buf> MinidumpMemory<'buf> {
    /// Gather the ranges of the `MemoryListStream` and the
    /// `Memory64ListStream`. Ranges whose content is cut by the end of the
    /// file are clipped.
    pub fn from_streams(
        reader: BinaryReader<'buf>,
        streams: &StreamDirectory,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Self {
        let mut ranges = Vec::new();
        if let Some(location) = streams.get(STREAM_TYPE_MEMORY_LIST) {
            Self::memory_list(&reader, location.rva.into(), &mut ranges);
        }

        if let Some(location) = streams.get(STREAM_TYPE_MEMORY64_LIST) {
            Self::memory64_list(&reader, location.rva.into(), &mut ranges);
        }

        ranges.retain(|r| r.size != 0);
        ranges.sort_by_key(|r| r.start);
        ranges.dedup_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[0].start.saturating_add(pair[0].size) > pair[1].start {
                warnings.push(ValidationWarning::new(
                    "memory",
                    format!("memory range {:#x} overlaps its neighbour", pair[1].start),
                ));
            }
        }

        debug!("{} memory ranges in the minidump", ranges.len());

        Self { reader, ranges }
    }

    /// Build from ranges directly.
    #[must_use]
    pub fn with_ranges(reader: BinaryReader<'buf>, mut ranges: Vec<MemoryRange>) -> Self {
        ranges.sort_by_key(|r| r.start);

        Self { reader, ranges }
    }

    fn clip(reader: &BinaryReader, start: u64, size: u64, file_offset: u64) -> Option<MemoryRange> {
        let available = reader.len().checked_sub(file_offset)?;

        Some(MemoryRange {
            start,
            size: min(size, available),
            file_offset,
        })
    }

    /// `MINIDUMP_MEMORY_LIST`: `u32` count then `MINIDUMP_MEMORY_DESCRIPTOR`s.
    fn memory_list(reader: &BinaryReader, offset: u64, ranges: &mut Vec<MemoryRange>) {
        let Ok(count) = reader.read_u32(offset) else {
            return;
        };

        for idx in 0..u64::from(count) {
            let desc = offset + 4 + idx * MEMORY_DESCRIPTOR_SIZE;
            let (Ok(start), Ok(size), Ok(rva)) = (
                reader.read_u64(desc),
                reader.read_u32(desc + 8),
                reader.read_u32(desc + 12),
            ) else {
                break;
            };

            ranges.extend(Self::clip(reader, start, size.into(), rva.into()));
        }
    }

    /// `MINIDUMP_MEMORY64_LIST`: `u64` count, `u64` base rva then
    /// `MINIDUMP_MEMORY_DESCRIPTOR64`s; the content of every range follows the
    /// previous one starting at the base rva.
    fn memory64_list(reader: &BinaryReader, offset: u64, ranges: &mut Vec<MemoryRange>) {
        let (Ok(count), Ok(mut file_offset)) = (reader.read_u64(offset), reader.read_u64(offset + 8))
        else {
            return;
        };

        for idx in 0..count {
            let Some(desc) = idx
                .checked_mul(MEMORY_DESCRIPTOR64_SIZE)
                .and_then(|o| o.checked_add(offset + 16))
            else {
                break;
            };

            let (Ok(start), Ok(size)) = (reader.read_u64(desc), reader.read_u64(desc + 8)) else {
                break;
            };

            let Some(range) = Self::clip(reader, start, size, file_offset) else {
                break;
            };

            ranges.push(range);
            let Some(next) = file_offset.checked_add(size) else {
                break;
            };

            file_offset = next;
        }
    }

    pub fn ranges(&self) -> &[MemoryRange] {
        &self.ranges
    }
}

impl<'buf> VirtualMemory for MinidumpMemory<'buf> {
    fn reader(&self) -> BinaryReader<'_> {
        self.reader
    }

    fn locate(&self, gva: Gva) -> Result<Chunk, TranslationFailure> {
        let addr = gva.u64();
        let idx = self.ranges.partition_point(|r| r.start <= addr);
        let range = idx
            .checked_sub(1)
            .and_then(|idx| self.ranges.get(idx))
            .filter(|r| r.contains(addr))
            .ok_or(TranslationFailure::Unmapped(gva))?;
        let delta = addr - range.start;

        Ok(Chunk {
            offset: range.file_offset + delta,
            len: range.size - delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DTB: u64 = 0x1000;
    const PDPT: u64 = 0x2000;
    const PD: u64 = 0x3000;
    const PT: u64 = 0x4000;
    const PAGE: u64 = 0x5000;
    const PRESENT_RW: u64 = 0b11;

    fn set(data: &mut [u8], offset: u64, value: u64) {
        let offset = offset as usize;
        data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Map `gva` to `PAGE` through a flat physical image.
    fn page_tables(gva: Gva) -> Vec<u8> {
        let mut data = vec![0u8; 0x6000];
        set(&mut data, DTB + gva.pml4e_idx() * 8, PDPT | PRESENT_RW);
        set(&mut data, PDPT + gva.pdpe_idx() * 8, PD | PRESENT_RW);
        set(&mut data, PD + gva.pde_idx() * 8, PT | PRESENT_RW);
        set(&mut data, PT + gva.pte_idx() * 8, PAGE | PRESENT_RW);

        data
    }

    #[test]
    fn normal_page() {
        let gva = Gva::new(0xfffff803_1d4a2123);
        let data = page_tables(gva);
        let physmem = PhysicalMemory::flat();
        let translator = AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(DTB));
        let translation = translator.translate(gva).unwrap();

        assert_eq!(translation.page_kind, PageKind::Normal);
        assert_eq!(translation.gpa(), Gpa::new(PAGE + 0x123));
        assert!(translation.writable);
        assert_eq!(translator.file_offset(gva), Some(PAGE + 0x123));
        // PCID bits in CR3 are ignored.
        let pcid = AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(DTB | 0x2));
        assert_eq!(pcid.file_offset(gva), Some(PAGE + 0x123));
    }

    #[test]
    fn not_present_at_every_level() {
        let gva = Gva::new(0xfffff803_1d4a2123);
        let physmem = PhysicalMemory::flat();
        for (table, idx, level) in [
            (DTB, gva.pml4e_idx(), PxeKind::Pml4e),
            (PDPT, gva.pdpe_idx(), PxeKind::Pdpte),
            (PD, gva.pde_idx(), PxeKind::Pde),
            (PT, gva.pte_idx(), PxeKind::Pte),
        ] {
            let mut data = page_tables(gva);
            let entry = table + idx * 8;
            let raw = u64::from_le_bytes(data[entry as usize..entry as usize + 8].try_into().unwrap());
            set(&mut data, entry, raw & !paging::PRESENT_BIT);
            let translator =
                AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(DTB));

            assert_eq!(
                translator.translate(gva),
                Err(TranslationFailure::NotPresent { gva, level })
            );
            assert_eq!(translator.file_offset(gva), None);
        }
    }

    #[test]
    fn large_page_skips_the_pt() {
        let gva = Gva::new(0x7ff6_1234_5678);
        let mut data = page_tables(gva);
        // 2MB page at 0x20_0000, the PT is not consulted at all.
        set(
            &mut data,
            PD + gva.pde_idx() * 8,
            0x20_0000 | paging::LARGE_PAGE_BIT | PRESENT_RW,
        );
        set(&mut data, PT + gva.pte_idx() * 8, 0);
        let physmem = PhysicalMemory::flat();
        let translator = AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(DTB));
        let translation = translator.translate(gva).unwrap();

        assert_eq!(translation.page_kind, PageKind::Large);
        assert_eq!(translation.gpa(), Gpa::new(0x20_0000 + (gva.u64() & 0x1f_ffff)));
        // The translated offset is past the end of this small buffer.
        assert_eq!(translator.file_offset(gva), None);
    }

    #[test]
    fn huge_page() {
        let gva = Gva::new(0x7ff6_1234_5678);
        let mut data = page_tables(gva);
        set(
            &mut data,
            PDPT + gva.pdpe_idx() * 8,
            0x4000_0000 | paging::LARGE_PAGE_BIT | PRESENT_RW,
        );
        let physmem = PhysicalMemory::flat();
        let translator = AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(DTB));
        let translation = translator.translate(gva).unwrap();

        assert_eq!(translation.page_kind, PageKind::Huge);
        assert_eq!(translation.gpa(), Gpa::new(0x4000_0000 + (gva.u64() & 0x3fff_ffff)));
    }

    #[test]
    fn missing_tables() {
        let gva = Gva::new(0xfffff803_1d4a2123);
        let data = page_tables(gva);
        let physmem = PhysicalMemory::flat();
        // The PML4 is outside of the dump.
        let translator =
            AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(0x10_0000));
        assert!(matches!(
            translator.translate(gva),
            Err(TranslationFailure::NotInDump { .. })
        ));
    }

    #[test]
    fn reads_straddle_pages() {
        let gva = Gva::new(0xfffff803_1d4a2ffc);
        let mut data = page_tables(gva);
        data[(PAGE + 0xffc) as usize..(PAGE + 0x1000) as usize].copy_from_slice(&[1, 2, 3, 4]);
        let physmem = PhysicalMemory::flat();
        let translator = AddressTranslator::new(BinaryReader::new(&data), &physmem, Gpa::new(DTB));

        assert_eq!(translator.read_u32(gva), Ok(0x0403_0201));
        // The next page isn't mapped.
        let mut buf = [0u8; 8];
        assert_eq!(translator.read(gva, &mut buf), 4);
        assert!(translator.read_u64(gva).is_err());
    }

    #[test]
    fn minidump_ranges() {
        let mut data = vec![0u8; 0x100];
        data[0x80..0x88].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        let memory = MinidumpMemory::with_ranges(
            BinaryReader::new(&data),
            vec![
                MemoryRange {
                    start: 0x7ff0_0000,
                    size: 0x10,
                    file_offset: 0x80,
                },
                MemoryRange {
                    start: 0x1000,
                    size: 0x10,
                    file_offset: 0x90,
                },
            ],
        );

        assert_eq!(memory.read_u64(Gva::new(0x7ff0_0000)), Ok(0x1122_3344_5566_7788));
        assert_eq!(memory.read_u32(Gva::new(0x7ff0_0004)), Ok(0x1122_3344));
        assert_eq!(
            memory.read_u64(Gva::new(0x7ff0_000c)),
            Err(TranslationFailure::Unmapped(Gva::new(0x7ff0_0010)))
        );
        assert_eq!(
            memory.locate(Gva::new(0x2000)),
            Err(TranslationFailure::Unmapped(Gva::new(0x2000)))
        );
    }

    #[test]
    fn memory64_list() {
        let mut data = vec![0u8; 0x200];
        // Memory64ListStream at 0x20: 2 ranges, content from 0x100.
        data[0x20..0x28].copy_from_slice(&2u64.to_le_bytes());
        data[0x28..0x30].copy_from_slice(&0x100u64.to_le_bytes());
        data[0x30..0x38].copy_from_slice(&0x10_000u64.to_le_bytes());
        data[0x38..0x40].copy_from_slice(&0x80u64.to_le_bytes());
        data[0x40..0x48].copy_from_slice(&0x20_000u64.to_le_bytes());
        // Cut by the end of the file.
        data[0x48..0x50].copy_from_slice(&0x1000u64.to_le_bytes());
        data[0x180..0x188].copy_from_slice(&0xdead_beefu64.to_le_bytes());
        let mut ranges = Vec::new();
        MinidumpMemory::memory64_list(&BinaryReader::new(&data), 0x20, &mut ranges);

        assert_eq!(
            ranges,
            vec![
                MemoryRange {
                    start: 0x10_000,
                    size: 0x80,
                    file_offset: 0x100
                },
                MemoryRange {
                    start: 0x20_000,
                    size: 0x80,
                    file_offset: 0x180
                }
            ]
        );
        let memory = MinidumpMemory::with_ranges(BinaryReader::new(&data), ranges);
        assert_eq!(memory.read_u64(Gva::new(0x20_000)), Ok(0xdead_beef));
    }
}
