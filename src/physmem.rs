// Axel '0vercl0k' Souchet - February 25 2024
//! This maps the physical address space stored in a kernel dump to offsets in
//! the file.
//!
//! Every kind of kernel dump stores physical pages packed one after another;
//! what differs is how you figure out which page is where:
//!   - [`DumpType::Full`] dumps describe the pages with the runs of the header,
//!   - [`DumpType::Bmp`] dumps with a bitmap that follows a [`BmpHeader64`],
//!   - kernel / complete memory dumps with [`PfnRange`]s that follow a
//!     [`RdmpHeader64`].
//!
//! Consecutive pages are collapsed into [`Extent`]s, which keeps the lookup
//! cheap and the memory usage proportional to the number of holes instead of
//! the number of pages. When nothing describes the layout the buffer is
//! treated as a flat physical image.
use std::cmp::min;

use serde::Serialize;
use tracing::{debug, warn};

use crate::bits::Bits;
use crate::error::ValidationWarning;
use crate::gxa::{paging, Gxa};
use crate::header::DumpHeader;
use crate::structs::{
    header32, header64, BmpHeader64, DumpType, PfnRange, PhysmemRun, RdmpHeader64,
};
use crate::{BinaryReader, DumpSignature, Gpa};

/// Where the physical layout comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhysmemSource {
    /// The runs of the dump header.
    Runs,
    /// The bitmap of a BMP dump.
    Bitmap,
    /// The PFN ranges of a kernel / complete memory dump.
    PfnRanges,
    /// A physical address is a file offset.
    Flat,
}

/// A bunch of consecutive physical pages stored consecutively in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub base_page: u64,
    pub page_count: u64,
    pub file_offset: u64,
}

impl Extent {
    fn end_page(&self) -> Option<u64> {
        self.base_page.checked_add(self.page_count)
    }
}

/// Physical address to file offset translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMemory {
    source: PhysmemSource,
    /// Sorted by `base_page`.
    extents: Vec<Extent>,
}

impl PhysicalMemory {
    /// A flat image.
    #[must_use]
    pub fn flat() -> Self {
        Self {
            source: PhysmemSource::Flat,
            extents: Vec::new(),
        }
    }

    /// Build the layout for a kernel dump. Layout metadata that doesn't look
    /// right makes us fall back to a flat image, with a warning.
    pub fn from_header(
        reader: &BinaryReader,
        header: &DumpHeader,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Self {
        let header_size = match header.signature {
            DumpSignature::KernelDump64 => header64::SIZE,
            DumpSignature::KernelDumpLegacy => header32::SIZE,
            DumpSignature::Minidump => return Self::flat(),
        };

        use DumpType as D;
        let built = match header.dump_type {
            Some(D::Bmp) => Self::bmp_physmem(reader, header_size),
            Some(dump_type @ (D::KernelMemory | D::KernelAndUserMemory | D::CompleteMemory)) => {
                Self::kernel_physmem(reader, header_size, dump_type)
            }
            Some(D::Full | D::Triage) | None if !header.physical_memory_runs.is_empty() => {
                Ok(Self::full_physmem(&header.physical_memory_runs, header_size))
            }
            _ => return Self::flat(),
        };

        match built {
            Ok(physmem) => {
                debug!(
                    "physmem from {:?}: {} extents, {} pages",
                    physmem.source,
                    physmem.extents.len(),
                    physmem.page_count()
                );
                physmem.check_overlaps(warnings);

                physmem
            }
            Err(reason) => {
                warn!("falling back to a flat physical layout: {reason}");
                warnings.push(ValidationWarning::new(
                    "physmem",
                    format!("{reason}, treating the dump as a flat physical image"),
                ));

                Self::flat()
            }
        }
    }

    fn new(source: PhysmemSource, mut extents: Vec<Extent>) -> Self {
        extents.sort_by_key(|e| e.base_page);

        Self { source, extents }
    }

    /// Build the physical memory map for a [`DumpType::Full`] dump.
    ///
    /// Here is how runs works. Every `runs` document a number of consecutive
    /// physical pages starting at a `PFN`. This means that you can have
    /// "holes" in the physical address space and you don't need to write any
    /// data for them. Here is a small example:
    ///   - Run[0]: BasePage = 1_337, PageCount = 2
    ///   - Run[1]: BasePage = 1_400, PageCount = 1
    ///
    /// In the above, there is a "hole" between the two runs. It has 2+1 memory
    /// pages at: Pfn(1_337+0), Pfn(1_337+1) and Pfn(1_400+0) (but nothing
    /// at Pfn(1_339)).
    ///
    /// In terms of the content of those physical memory pages, they are packed
    /// and stored one after another. If the first page of the first run is
    /// at file offset 0x2_000, then the first page of the second run is at
    /// file offset 0x2_000+(2*0x1_000).
    fn full_physmem(runs: &[PhysmemRun], first_page: u64) -> Self {
        let mut extents = Vec::with_capacity(runs.len());
        let mut file_offset = Some(first_page);
        for run in runs {
            // Once the offsets overflow, no page can be in the file anyway.
            let Some(offset) = file_offset else {
                break;
            };

            if run.page_count != 0 {
                extents.push(Extent {
                    base_page: run.base_page,
                    page_count: run.page_count,
                    file_offset: offset,
                });
            }

            file_offset = run
                .page_count
                .checked_mul(paging::PAGE_SIZE)
                .and_then(|size| offset.checked_add(size));
        }

        Self::new(PhysmemSource::Runs, extents)
    }

    /// Build the physical memory map for a [`DumpType::Bmp`] dump.
    fn bmp_physmem(reader: &BinaryReader, header_size: u64) -> Result<Self, &'static str> {
        let bmp_header =
            BmpHeader64::parse(reader, header_size).map_err(|_| "bmp header is truncated")?;
        if !bmp_header.looks_good() {
            return Err("bmp header doesn't look right");
        }

        // The bitmap can't be larger than what is left in the file.
        let bitmap = reader
            .tail(header_size + BmpHeader64::BITMAP_OFFSET, bmp_header.pages / 8)
            .map_err(|_| "bmp bitmap is truncated")?;
        let mut extents: Vec<Extent> = Vec::new();
        let mut file_offset = bmp_header.first_page;

        // Walk the bitmap byte per byte..
        for (bitmap_idx, &byte) in bitmap.iter().enumerate() {
            if byte == 0 {
                continue;
            }

            // ..and walk every bits.
            for bit_idx in 0..8 {
                // If it's not set, go to the next.
                if byte.bit(bit_idx) == 0 {
                    continue;
                }

                let pfn = (bitmap_idx as u64) * 8 + bit_idx as u64;
                match extents.last_mut() {
                    Some(last) if last.end_page() == Some(pfn) => last.page_count += 1,
                    _ => extents.push(Extent {
                        base_page: pfn,
                        page_count: 1,
                        file_offset,
                    }),
                }

                file_offset = file_offset
                    .checked_add(paging::PAGE_SIZE)
                    .ok_or("bmp page offset overflow")?;
            }
        }

        Ok(Self::new(PhysmemSource::Bitmap, extents))
    }

    /// Build the physical memory map for [`DumpType::KernelMemory`] /
    /// [`DumpType::KernelAndUserMemory`] and [`DumpType::CompleteMemory`] dump.
    fn kernel_physmem(
        reader: &BinaryReader,
        header_size: u64,
        dump_type: DumpType,
    ) -> Result<Self, &'static str> {
        let rdmp = RdmpHeader64::parse(reader, header_size).map_err(|_| "rdmp header is truncated")?;
        if !rdmp.looks_good() {
            return Err("rdmp header doesn't look right");
        }

        if rdmp.metadata_size % PfnRange::SIZE != 0 {
            return Err("metadata size is not a multiple of 16");
        }

        // `CompleteMemoryDump` type seems to be bound by the
        // `total_number_of_pages` field, *not* by `metadata_size`. The other
        // kinds have something else at that offset.
        let page_budget =
            (dump_type == DumpType::CompleteMemory).then_some(rdmp.total_number_of_pages);

        let mut extents = Vec::new();
        let mut page_count = 0u64;
        let mut file_offset = rdmp.first_page_offset;
        let mut cursor = header_size + RdmpHeader64::SIZE;
        for _ in 0..rdmp.metadata_size / PfnRange::SIZE {
            if let Some(budget) = page_budget {
                if page_count == budget {
                    break;
                }

                if page_count > budget {
                    return Err("pfn ranges describe more than total_number_of_pages");
                }
            }

            let Ok(range) = PfnRange::parse(reader, cursor) else {
                break;
            };

            if range.page_file_number == 0 {
                break;
            }

            extents.push(Extent {
                base_page: range.page_file_number,
                page_count: range.number_of_pages,
                file_offset,
            });

            file_offset = range
                .number_of_pages
                .checked_mul(paging::PAGE_SIZE)
                .and_then(|size| file_offset.checked_add(size))
                .ok_or("overflow w/ page_offset")?;
            page_count = page_count
                .checked_add(range.number_of_pages)
                .ok_or("overflow w/ page_count")?;
            cursor += PfnRange::SIZE;
        }

        Ok(Self::new(PhysmemSource::PfnRanges, extents))
    }

    fn check_overlaps(&self, warnings: &mut Vec<ValidationWarning>) {
        for pair in self.extents.windows(2) {
            let overlaps = pair[0].end_page().map_or(true, |end| end > pair[1].base_page);
            if overlaps {
                warnings.push(ValidationWarning::new(
                    "physmem",
                    format!("physical page {:#x} is described twice", pair[1].base_page),
                ));
            }
        }
    }

    #[must_use]
    pub fn source(&self) -> PhysmemSource {
        self.source
    }

    /// Number of physical pages described; zero for a flat image.
    #[must_use]
    pub fn page_count(&self) -> u64 {
        self.extents
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.page_count))
    }

    pub fn extents(&self) -> impl ExactSizeIterator<Item = &Extent> + '_ {
        self.extents.iter()
    }

    /// Translate a [`Gpa`] into the file offset of where its content resides
    /// in. The returned offset is always inside of the buffer.
    #[must_use]
    pub fn translate(&self, reader: &BinaryReader, gpa: Gpa) -> Option<u64> {
        let offset = match self.source {
            PhysmemSource::Flat => gpa.u64(),
            _ => {
                let pfn = gpa.pfn();
                let idx = self.extents.partition_point(|e| e.base_page <= pfn);
                let extent = self.extents.get(idx.checked_sub(1)?)?;
                let page_idx = pfn - extent.base_page;
                if page_idx >= extent.page_count {
                    return None;
                }

                page_idx
                    .checked_mul(paging::PAGE_SIZE)?
                    .checked_add(extent.file_offset)?
                    .checked_add(gpa.offset())?
            }
        };

        (offset < reader.len()).then_some(offset)
    }

    /// Read physical memory starting at `gpa` into a `buffer`. This returns
    /// how many bytes were read; reads stop at the first page that isn't in
    /// the dump.
    pub fn read(&self, reader: &BinaryReader, gpa: Gpa, buffer: &mut [u8]) -> usize {
        // Amount of bytes left to read.
        let mut amount_left = buffer.len();
        // Total amount of bytes that we have successfully read.
        let mut total_read = 0;
        // The current gpa we are reading from.
        let mut addr = gpa;
        while amount_left > 0 {
            let Some(offset) = self.translate(reader, addr) else {
                break;
            };

            // We need to take care of reads that straddle different physical
            // memory pages. Either we read until the end of the page, or we
            // stop if the user wants us to read less.
            let left_in_page = (paging::PAGE_SIZE - addr.offset()) as usize;
            let amount_wanted = min(amount_left, left_in_page);
            let Ok(src) = reader.tail(offset, amount_wanted as u64) else {
                break;
            };

            buffer[total_read..total_read + src.len()].copy_from_slice(src);
            total_read += src.len();
            amount_left -= src.len();
            // If we couldn't read as much as we wanted, we're done.
            if src.len() != amount_wanted {
                break;
            }

            let Some(next) = addr.next_aligned_page() else {
                break;
            };

            addr = next;
        }

        total_read
    }

    /// Read an exact amount of physical memory starting at `gpa`.
    pub fn read_exact(&self, reader: &BinaryReader, gpa: Gpa, buffer: &mut [u8]) -> Option<()> {
        (self.read(reader, gpa, buffer) == buffer.len()).then_some(())
    }

    /// Read a `u64` in physical memory at `gpa`.
    pub fn read_u64(&self, reader: &BinaryReader, gpa: Gpa) -> Option<u64> {
        let mut buffer = [0; 8];
        self.read_exact(reader, gpa, &mut buffer)?;

        Some(u64::from_le_bytes(buffer))
    }
}
