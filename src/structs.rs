// Axel '0vercl0k' Souchet - February 25 2024
//! This has all the raw layouts that make up Windows crash-dumps: kernel dump
//! headers (`DUMP_HEADER64` / `DUMP_HEADER32`) and the minidump records.
//!
//! Nothing here is transmuted out of the buffer; every structure is decoded
//! field by field through a [`BinaryReader`] so a truncated or hostile input
//! can only ever produce a [`ReadError`].
use crate::error::{ReadError, Result};
use crate::{BinaryReader, Error};

/// Field offsets of `DUMP_HEADER64`. Padding adjustments come from reversing
/// `nt!IoFillDumpHeader`.
pub mod header64 {
    pub const MAJOR_VERSION: u64 = 0x8;
    pub const MINOR_VERSION: u64 = 0xc;
    pub const DIRECTORY_TABLE_BASE: u64 = 0x10;
    pub const PFN_DATABASE: u64 = 0x18;
    pub const PS_LOADED_MODULE_LIST: u64 = 0x20;
    pub const MACHINE_IMAGE_TYPE: u64 = 0x30;
    pub const NUMBER_PROCESSORS: u64 = 0x34;
    /// Not 0x80: that's `KdDebuggerDataBlock`'s neighbourhood.
    pub const BUG_CHECK_CODE: u64 = 0x38;
    pub const BUG_CHECK_PARAMETERS: u64 = 0x40;
    pub const PHYSICAL_MEMORY_BLOCK: u64 = 0x88;
    pub const PHYSICAL_MEMORY_BLOCK_SIZE: u64 = 700;
    pub const CONTEXT_RECORD: u64 = 0x348;
    pub const CONTEXT_RECORD_SIZE: u64 = 3_000;
    pub const EXCEPTION_RECORD: u64 = 0xf00;
    pub const DUMP_TYPE: u64 = 0xf98;
    pub const SIZE: u64 = 0x2_000;
}

/// Field offsets of `DUMP_HEADER32`.
pub mod header32 {
    pub const MAJOR_VERSION: u64 = 0x8;
    pub const MINOR_VERSION: u64 = 0xc;
    pub const DIRECTORY_TABLE_BASE: u64 = 0x10;
    pub const PFN_DATABASE: u64 = 0x14;
    pub const PS_LOADED_MODULE_LIST: u64 = 0x18;
    pub const MACHINE_IMAGE_TYPE: u64 = 0x20;
    pub const NUMBER_PROCESSORS: u64 = 0x24;
    pub const BUG_CHECK_CODE: u64 = 0x28;
    pub const BUG_CHECK_PARAMETERS: u64 = 0x2c;
    pub const PHYSICAL_MEMORY_BLOCK: u64 = 0x64;
    pub const PHYSICAL_MEMORY_BLOCK_SIZE: u64 = 700;
    pub const CONTEXT_RECORD: u64 = 0x320;
    pub const CONTEXT_RECORD_SIZE: u64 = 1_200;
    pub const EXCEPTION_RECORD: u64 = 0x7d0;
    pub const SIZE: u64 = 0x1_000;
}

/// Types of kernel crash dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u32)]
pub enum DumpType {
    // Old dump types from dbgeng.dll
    Full = 0x1,
    /// Small memory dump (`Minidump*.dmp` written at bug check time).
    Triage = 0x4,
    Bmp = 0x5,
    /// Produced by `.dump /k`.
    KernelMemory = 0x8,
    /// Produced by `.dump /ka`.
    KernelAndUserMemory = 0x9,
    /// Produced by `.dump /f`.
    CompleteMemory = 0xa,
}

impl TryFrom<u32> for DumpType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            x if x == DumpType::Full as u32 => Ok(DumpType::Full),
            x if x == DumpType::Triage as u32 => Ok(DumpType::Triage),
            x if x == DumpType::Bmp as u32 => Ok(DumpType::Bmp),
            x if x == DumpType::KernelMemory as u32 => Ok(DumpType::KernelMemory),
            x if x == DumpType::KernelAndUserMemory as u32 => Ok(DumpType::KernelAndUserMemory),
            x if x == DumpType::CompleteMemory as u32 => Ok(DumpType::CompleteMemory),
            _ => Err(Error::InvalidData("unknown dump type")),
        }
    }
}

/// A run of consecutive physical pages, `PHYSMEM_RUN`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PhysmemRun {
    pub base_page: u64,
    pub page_count: u64,
}

/// The head of a `PHYSMEM_DESC`; the runs follow it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhysmemDesc {
    pub number_of_runs: u32,
    pub number_of_pages: u64,
}

/// The 64-bit flavor is `{u32 runs; u32 pad; u64 pages; {u64, u64} runs[]}`
/// while the 32-bit flavor is `{u32 runs; u32 pages; {u32, u32} runs[]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysmemFlavor {
    Desc64,
    Desc32,
}

impl PhysmemFlavor {
    /// Size of the descriptor head.
    #[must_use]
    pub const fn desc_size(&self) -> u64 {
        match self {
            Self::Desc64 => 0x10,
            Self::Desc32 => 0x8,
        }
    }

    /// Size of one run.
    #[must_use]
    pub const fn run_size(&self) -> u64 {
        match self {
            Self::Desc64 => 0x10,
            Self::Desc32 => 0x8,
        }
    }
}

impl PhysmemDesc {
    pub fn parse(reader: &BinaryReader, offset: u64, flavor: PhysmemFlavor) -> Result<Self> {
        let number_of_runs = reader.read_u32(offset)?;
        let number_of_pages = match flavor {
            PhysmemFlavor::Desc64 => reader.read_u64(offset + 8)?,
            PhysmemFlavor::Desc32 => reader.read_u32(offset + 4)?.into(),
        };

        Ok(Self {
            number_of_runs,
            number_of_pages,
        })
    }
}

impl PhysmemRun {
    pub fn parse(
        reader: &BinaryReader,
        offset: u64,
        flavor: PhysmemFlavor,
    ) -> std::result::Result<Self, ReadError> {
        Ok(match flavor {
            PhysmemFlavor::Desc64 => Self {
                base_page: reader.read_u64(offset)?,
                page_count: reader.read_u64(offset + 8)?,
            },
            PhysmemFlavor::Desc32 => Self {
                base_page: reader.read_u32(offset)?.into(),
                page_count: reader.read_u32(offset + 4)?.into(),
            },
        })
    }
}

const BMPHEADER64_EXPECTED_SIGNATURE: u32 = 0x50_4D_44_53; // 'PMDS'
const BMPHEADER64_EXPECTED_SIGNATURE2: u32 = 0x50_4D_44_46; // 'PMDF'
const BMPHEADER64_EXPECTED_VALID_DUMP: u32 = 0x50_4D_55_44; // 'PMUD'

/// The header of a bitmap dump; it sits right after the dump header and the
/// bitmap follows it.
#[derive(Debug, Default, Clone, Copy)]
pub struct BmpHeader64 {
    pub signature: u32,
    pub valid_dump: u32,
    /// The offset of the first page in the file.
    pub first_page: u64,
    /// Total number of pages present in the bitmap.
    pub total_present_pages: u64,
    /// Total number of pages in image. This dictates the total size of the
    /// bitmap. This is not the same as the TotalPresentPages which is only
    /// the sum of the bits set to 1.
    pub pages: u64,
}

impl BmpHeader64 {
    /// Offset of the bitmap from the start of this header.
    pub const BITMAP_OFFSET: u64 = 0x38;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            signature: reader.read_u32(offset)?,
            valid_dump: reader.read_u32(offset + 4)?,
            // According to rekall there's a gap there, the first page is at 0x20.
            first_page: reader.read_u64(offset + 0x20)?,
            total_present_pages: reader.read_u64(offset + 0x28)?,
            pages: reader.read_u64(offset + 0x30)?,
        })
    }

    #[must_use]
    pub fn looks_good(&self) -> bool {
        (self.signature == BMPHEADER64_EXPECTED_SIGNATURE
            || self.signature == BMPHEADER64_EXPECTED_SIGNATURE2)
            && self.valid_dump == BMPHEADER64_EXPECTED_VALID_DUMP
    }
}

const RDMP_HEADER64_EXPECTED_MARKER: u32 = 0x40;
const RDMP_HEADER64_EXPECTED_SIGNATURE: u32 = 0x50_4D_44_52; // 'PMDR'
const RDMP_HEADER64_EXPECTED_VALID_DUMP: u32 = 0x50_4D_55_44; // 'PMUD'

/// The header of kernel / complete memory dumps. It is followed by an array of
/// [`PfnRange`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdmpHeader64 {
    pub marker: u32,
    pub signature: u32,
    pub valid_dump: u32,
    pub metadata_size: u64,
    pub first_page_offset: u64,
    /// Only meaningful for [`DumpType::CompleteMemory`].
    pub total_number_of_pages: u64,
}

impl RdmpHeader64 {
    /// Size of both `KernelRdmpHeader64` and `FullRdmpHeader64`.
    pub const SIZE: u64 = 0x30;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            marker: reader.read_u32(offset)?,
            signature: reader.read_u32(offset + 0x4)?,
            valid_dump: reader.read_u32(offset + 0x8)?,
            metadata_size: reader.read_u64(offset + 0x10)?,
            first_page_offset: reader.read_u64(offset + 0x18)?,
            total_number_of_pages: reader.read_u64(offset + 0x28)?,
        })
    }

    #[must_use]
    pub fn looks_good(&self) -> bool {
        if self.marker != RDMP_HEADER64_EXPECTED_MARKER {
            return false;
        }

        if self.signature != RDMP_HEADER64_EXPECTED_SIGNATURE {
            return false;
        }

        if self.valid_dump != RDMP_HEADER64_EXPECTED_VALID_DUMP {
            return false;
        }

        // Checked arithmetic: both fields come straight from the file.
        match (
            self.metadata_size.checked_sub(0x20),
            self.first_page_offset.checked_sub(0x20_40),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A range of consecutive physical pages in a kernel / complete memory dump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PfnRange {
    pub page_file_number: u64,
    pub number_of_pages: u64,
}

impl PfnRange {
    pub const SIZE: u64 = 0x10;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            page_file_number: reader.read_u64(offset)?,
            number_of_pages: reader.read_u64(offset + 8)?,
        })
    }
}

/// `EXCEPTION_RECORD64`, shared by the kernel dump header and the minidump
/// exception stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord64 {
    pub exception_code: u32,
    pub exception_flags: u32,
    pub exception_record: u64,
    pub exception_address: u64,
    pub number_parameters: u32,
    pub exception_information: [u64; EXCEPTION_MAXIMUM_PARAMETERS],
}

pub const EXCEPTION_MAXIMUM_PARAMETERS: usize = 15;

impl ExceptionRecord64 {
    pub const SIZE: u64 = 0x98;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            exception_code: reader.read_u32(offset)?,
            exception_flags: reader.read_u32(offset + 0x4)?,
            exception_record: reader.read_u64(offset + 0x8)?,
            exception_address: reader.read_u64(offset + 0x10)?,
            number_parameters: reader.read_u32(offset + 0x18)?,
            exception_information: reader.read_u64s(offset + 0x20)?,
        })
    }

    /// The parameters the record claims to carry, bounded by the array.
    #[must_use]
    pub fn parameters(&self) -> &[u64] {
        let n = (self.number_parameters as usize).min(EXCEPTION_MAXIMUM_PARAMETERS);

        &self.exception_information[..n]
    }
}

/// `EXCEPTION_RECORD32`, found in the legacy kernel dump header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord32 {
    pub exception_code: u32,
    pub exception_flags: u32,
    pub exception_address: u32,
    pub number_parameters: u32,
    pub exception_information: [u32; EXCEPTION_MAXIMUM_PARAMETERS],
}

impl ExceptionRecord32 {
    pub const SIZE: u64 = 0x50;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        let mut exception_information = [0; EXCEPTION_MAXIMUM_PARAMETERS];
        for (idx, slot) in exception_information.iter_mut().enumerate() {
            *slot = reader.read_u32(offset + 0x14 + idx as u64 * 4)?;
        }

        Ok(Self {
            exception_code: reader.read_u32(offset)?,
            exception_flags: reader.read_u32(offset + 0x4)?,
            exception_address: reader.read_u32(offset + 0xc)?,
            number_parameters: reader.read_u32(offset + 0x10)?,
            exception_information,
        })
    }

    #[must_use]
    pub fn parameters(&self) -> &[u32] {
        let n = (self.number_parameters as usize).min(EXCEPTION_MAXIMUM_PARAMETERS);

        &self.exception_information[..n]
    }
}

/// The registers we care about in an x64 `CONTEXT`.
pub mod context64 {
    pub const RSP: u64 = 0x98;
    pub const RBP: u64 = 0xa0;
    pub const RIP: u64 = 0xf8;
    pub const SIZE: u64 = 0x4d0;
}

/// The registers we care about in an x86 `CONTEXT`.
pub mod context32 {
    pub const EBP: u64 = 0xb4;
    pub const EIP: u64 = 0xb8;
    pub const ESP: u64 = 0xc4;
    pub const SIZE: u64 = 0x2cc;
}

pub const STREAM_TYPE_UNUSED: u32 = 0;
pub const STREAM_TYPE_THREAD_LIST: u32 = 3;
pub const STREAM_TYPE_MODULE_LIST: u32 = 4;
pub const STREAM_TYPE_MEMORY_LIST: u32 = 5;
pub const STREAM_TYPE_EXCEPTION: u32 = 6;
pub const STREAM_TYPE_SYSTEM_INFO: u32 = 7;
pub const STREAM_TYPE_MEMORY64_LIST: u32 = 9;

pub const ARCH_X86: u16 = 0;
pub const ARCH_X64: u16 = 9;

/// `MINIDUMP_HEADER`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MinidumpHeader {
    pub signature: u32,
    pub version: u16,
    pub implementation_version: u16,
    pub number_of_streams: u32,
    pub stream_directory_rva: u32,
    pub checksum: u32,
    pub timedatestamp: u32,
    pub flags: u64,
}

impl MinidumpHeader {
    pub const SIZE: u64 = 0x20;

    pub fn parse(reader: &BinaryReader) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            signature: reader.read_u32(0x0)?,
            version: reader.read_u16(0x4)?,
            implementation_version: reader.read_u16(0x6)?,
            number_of_streams: reader.read_u32(0x8)?,
            stream_directory_rva: reader.read_u32(0xc)?,
            checksum: reader.read_u32(0x10)?,
            timedatestamp: reader.read_u32(0x14)?,
            flags: reader.read_u64(0x18)?,
        })
    }
}

/// `MINIDUMP_LOCATION_DESCRIPTOR`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LocationDescriptor32 {
    pub data_size: u32,
    pub rva: u32,
}

impl LocationDescriptor32 {
    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            data_size: reader.read_u32(offset)?,
            rva: reader.read_u32(offset + 4)?,
        })
    }

    /// Does the location fit in the buffer?
    #[must_use]
    pub fn fits(&self, reader: &BinaryReader) -> bool {
        reader.contains(self.rva.into(), self.data_size.into())
    }
}

/// `MINIDUMP_DIRECTORY`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    pub stream_type: u32,
    pub location: LocationDescriptor32,
}

impl Directory {
    pub const SIZE: u64 = 12;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            stream_type: reader.read_u32(offset)?,
            location: LocationDescriptor32::parse(reader, offset + 4)?,
        })
    }
}

/// `MINIDUMP_EXCEPTION_STREAM`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionStream {
    pub thread_id: u32,
    pub exception_record: ExceptionRecord64,
    pub thread_context: LocationDescriptor32,
}

impl ExceptionStream {
    pub const SIZE: u64 = 0xa8;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            thread_id: reader.read_u32(offset)?,
            exception_record: ExceptionRecord64::parse(reader, offset + 0x8)?,
            thread_context: LocationDescriptor32::parse(reader, offset + 0xa0)?,
        })
    }
}

/// `MINIDUMP_THREAD`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry {
    pub thread_id: u32,
    pub suspend_count: u32,
    pub priority_class: u32,
    pub priority: u32,
    pub teb: u64,
    pub stack_start: u64,
    pub stack: LocationDescriptor32,
    pub thread_context: LocationDescriptor32,
}

impl ThreadEntry {
    pub const SIZE: u64 = 48;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            thread_id: reader.read_u32(offset)?,
            suspend_count: reader.read_u32(offset + 0x4)?,
            priority_class: reader.read_u32(offset + 0x8)?,
            priority: reader.read_u32(offset + 0xc)?,
            teb: reader.read_u64(offset + 0x10)?,
            stack_start: reader.read_u64(offset + 0x18)?,
            stack: LocationDescriptor32::parse(reader, offset + 0x20)?,
            thread_context: LocationDescriptor32::parse(reader, offset + 0x28)?,
        })
    }
}

/// `VS_FIXEDFILEINFO`, the bits we use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixedFileInfo {
    pub signature: u32,
    pub struc_version: u32,
    pub file_version_ms: u32,
    pub file_version_ls: u32,
}

pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xfeef_04bd;

impl FixedFileInfo {
    pub const SIZE: u64 = 52;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            signature: reader.read_u32(offset)?,
            struc_version: reader.read_u32(offset + 0x4)?,
            file_version_ms: reader.read_u32(offset + 0x8)?,
            file_version_ls: reader.read_u32(offset + 0xc)?,
        })
    }

    #[must_use]
    pub fn looks_good(&self) -> bool {
        self.signature == FIXED_FILE_INFO_SIGNATURE
    }
}

/// `MINIDUMP_MODULE`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEntry {
    pub base_of_image: u64,
    pub size_of_image: u32,
    pub checksum: u32,
    pub time_date_stamp: u32,
    pub module_name_rva: u32,
    pub version_info: FixedFileInfo,
}

impl ModuleEntry {
    pub const SIZE: u64 = 108;

    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        // The whole record has to be there, even the parts we don't decode.
        reader.bytes(offset, Self::SIZE)?;

        Ok(Self {
            base_of_image: reader.read_u64(offset)?,
            size_of_image: reader.read_u32(offset + 0x8)?,
            checksum: reader.read_u32(offset + 0xc)?,
            time_date_stamp: reader.read_u32(offset + 0x10)?,
            module_name_rva: reader.read_u32(offset + 0x14)?,
            version_info: FixedFileInfo::parse(reader, offset + 0x18)?,
        })
    }
}

/// `MINIDUMP_SYSTEM_INFO`, the bits we use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfoStream {
    pub processor_arch: u16,
    pub number_of_processors: u8,
    pub product_type: u8,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
}

impl SystemInfoStream {
    pub fn parse(reader: &BinaryReader, offset: u64) -> std::result::Result<Self, ReadError> {
        Ok(Self {
            processor_arch: reader.read_u16(offset)?,
            number_of_processors: reader.read_u8(offset + 0x6)?,
            product_type: reader.read_u8(offset + 0x7)?,
            major_version: reader.read_u32(offset + 0x8)?,
            minor_version: reader.read_u32(offset + 0xc)?,
            build_number: reader.read_u32(offset + 0x10)?,
        })
    }
}

/// `MINIDUMP_MEMORY_DESCRIPTOR`.
pub const MEMORY_DESCRIPTOR_SIZE: u64 = 16;
/// `MINIDUMP_MEMORY_DESCRIPTOR64`.
pub const MEMORY_DESCRIPTOR64_SIZE: u64 = 16;

/// Field offsets of the kernel's `KLDR_DATA_TABLE_ENTRY` (x64).
pub mod kldr64 {
    pub const IN_LOAD_ORDER_LINKS: u64 = 0x0;
    pub const DLL_BASE: u64 = 0x30;
    pub const SIZE_OF_IMAGE: u64 = 0x40;
    pub const FULL_DLL_NAME: u64 = 0x48;
    pub const BASE_DLL_NAME: u64 = 0x58;
    pub const CHECKSUM: u64 = 0x78;
    pub const SIZE: u64 = 0x80;
}
