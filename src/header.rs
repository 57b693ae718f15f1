// Axel '0vercl0k' Souchet - October 3 2026
//! Structured header extraction for every format [`crate::detect_format`]
//! recognizes.
//!
//! Kernel dumps carry most of what the rest of the analysis needs right in
//! their header (CR3, `PsLoadedModuleList`, the physical memory runs, ..).
//! Minidumps only carry the stream directory location; the machine fields
//! are filled later from the `SystemInfoStream` (see
//! [`DumpHeader::apply_system_info`]).
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, ValidationWarning};
use crate::streams::StreamDirectory;
use crate::structs::{
    header32, header64, DumpType, MinidumpHeader, PhysmemDesc, PhysmemFlavor, PhysmemRun,
    SystemInfoStream, ARCH_X64, ARCH_X86, STREAM_TYPE_SYSTEM_INFO,
};
use crate::{BinaryReader, DumpSignature};

/// `IMAGE_FILE_MACHINE_AMD64`.
pub const MACHINE_AMD64: u32 = 0x8664;
/// `IMAGE_FILE_MACHINE_I386`.
pub const MACHINE_I386: u32 = 0x14c;

/// The minidump specific header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinidumpFields {
    pub number_of_streams: u32,
    pub stream_directory_rva: u32,
    pub checksum: u32,
    pub timestamp: u32,
    pub flags: u64,
}

/// What the `SystemInfoStream` of a minidump tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub processor_architecture: u16,
    pub processor_count: u8,
    pub product_type: u8,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
}

impl SystemInfo {
    /// Parse the `SystemInfoStream` if there's one.
    pub fn from_streams(reader: &BinaryReader, streams: &StreamDirectory) -> Result<Option<Self>> {
        let Some(location) = streams.get(STREAM_TYPE_SYSTEM_INFO) else {
            return Ok(None);
        };

        let raw = SystemInfoStream::parse(reader, location.rva.into())?;

        Ok(Some(Self {
            processor_architecture: raw.processor_arch,
            processor_count: raw.number_of_processors,
            product_type: raw.product_type,
            major_version: raw.major_version,
            minor_version: raw.minor_version,
            build_number: raw.build_number,
        }))
    }
}

/// The header of a crash-dump, regardless of its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpHeader {
    pub signature: DumpSignature,
    pub major_version: u32,
    pub minor_version: u32,
    /// `IMAGE_FILE_MACHINE_*`.
    pub machine_type: Option<u32>,
    pub processor_count: Option<u32>,
    /// CR3.
    pub directory_table_base: Option<u64>,
    pub pfn_database: Option<u64>,
    /// `nt!PsLoadedModuleList`.
    pub module_list_pointer: Option<u64>,
    /// Ordered like they are in the dump.
    pub physical_memory_runs: Vec<PhysmemRun>,
    /// Only 64-bit kernel dumps have one.
    pub dump_type: Option<DumpType>,
    pub minidump: Option<MinidumpFields>,
    pub system_info: Option<SystemInfo>,
}

impl DumpHeader {
    /// Parse the header of a buffer whose format has already been detected.
    /// Fields that are cut by the end of the buffer are left absent and a
    /// warning is recorded; only the leading version fields are mandatory.
    pub fn parse(
        reader: &BinaryReader,
        signature: DumpSignature,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Result<Self> {
        let header = match signature {
            DumpSignature::Minidump => Self::parse_minidump(reader)?,
            DumpSignature::KernelDump64 => Self::parse_kernel64(reader, warnings)?,
            DumpSignature::KernelDumpLegacy => Self::parse_kernel32(reader, warnings)?,
        };

        debug!(
            "parsed {:?} header v{}.{}, {} physmem runs",
            header.signature,
            header.major_version,
            header.minor_version,
            header.physical_memory_runs.len()
        );

        Ok(header)
    }

    /// A header with nothing but the signature filled.
    pub(crate) fn empty(signature: DumpSignature, major_version: u32, minor_version: u32) -> Self {
        Self {
            signature,
            major_version,
            minor_version,
            machine_type: None,
            processor_count: None,
            directory_table_base: None,
            pfn_database: None,
            module_list_pointer: None,
            physical_memory_runs: Vec::new(),
            dump_type: None,
            minidump: None,
            system_info: None,
        }
    }

    fn parse_minidump(reader: &BinaryReader) -> Result<Self> {
        let raw = MinidumpHeader::parse(reader)?;
        let mut header = Self::empty(
            DumpSignature::Minidump,
            raw.version.into(),
            raw.implementation_version.into(),
        );

        header.minidump = Some(MinidumpFields {
            number_of_streams: raw.number_of_streams,
            stream_directory_rva: raw.stream_directory_rva,
            checksum: raw.checksum,
            timestamp: raw.timedatestamp,
            flags: raw.flags,
        });

        Ok(header)
    }

    fn parse_kernel64(reader: &BinaryReader, warnings: &mut Vec<ValidationWarning>) -> Result<Self> {
        let mut header = Self::empty(
            DumpSignature::KernelDump64,
            reader.read_u32(header64::MAJOR_VERSION)?,
            reader.read_u32(header64::MINOR_VERSION)?,
        );

        header.directory_table_base = reader.read_u64(header64::DIRECTORY_TABLE_BASE).ok();
        header.pfn_database = reader.read_u64(header64::PFN_DATABASE).ok();
        header.module_list_pointer = reader.read_u64(header64::PS_LOADED_MODULE_LIST).ok();
        header.machine_type = reader.read_u32(header64::MACHINE_IMAGE_TYPE).ok();
        header.processor_count = reader.read_u32(header64::NUMBER_PROCESSORS).ok();
        header.dump_type = match reader.read_u32(header64::DUMP_TYPE) {
            Ok(raw) => match DumpType::try_from(raw) {
                Ok(dump_type) => Some(dump_type),
                Err(_) => {
                    warnings.push(ValidationWarning::new(
                        "header",
                        format!("unknown dump type {raw:#x}"),
                    ));
                    None
                }
            },
            Err(_) => None,
        };

        header.physical_memory_runs = parse_runs(
            reader,
            header64::PHYSICAL_MEMORY_BLOCK,
            header64::PHYSICAL_MEMORY_BLOCK_SIZE,
            PhysmemFlavor::Desc64,
            warnings,
        );

        Ok(header)
    }

    fn parse_kernel32(reader: &BinaryReader, warnings: &mut Vec<ValidationWarning>) -> Result<Self> {
        let mut header = Self::empty(
            DumpSignature::KernelDumpLegacy,
            reader.read_u32(header32::MAJOR_VERSION)?,
            reader.read_u32(header32::MINOR_VERSION)?,
        );

        let read = |offset| reader.read_u32(offset).ok();
        header.directory_table_base = read(header32::DIRECTORY_TABLE_BASE).map(u64::from);
        header.pfn_database = read(header32::PFN_DATABASE).map(u64::from);
        header.module_list_pointer = read(header32::PS_LOADED_MODULE_LIST).map(u64::from);
        header.machine_type = read(header32::MACHINE_IMAGE_TYPE);
        header.processor_count = read(header32::NUMBER_PROCESSORS);
        header.physical_memory_runs = parse_runs(
            reader,
            header32::PHYSICAL_MEMORY_BLOCK,
            header32::PHYSICAL_MEMORY_BLOCK_SIZE,
            PhysmemFlavor::Desc32,
            warnings,
        );

        Ok(header)
    }

    /// Fill the machine fields of a minidump header from its `SystemInfoStream`.
    pub fn apply_system_info(&mut self, info: SystemInfo) {
        self.machine_type = match info.processor_architecture {
            ARCH_X64 => Some(MACHINE_AMD64),
            ARCH_X86 => Some(MACHINE_I386),
            _ => None,
        };
        self.processor_count = Some(info.processor_count.into());
        self.system_info = Some(info);
    }

    /// Is the dumped machine a 64-bit one? Unknown machines are assumed to be.
    #[must_use]
    pub fn is_64bit(&self) -> bool {
        match self.signature {
            DumpSignature::KernelDump64 => true,
            DumpSignature::KernelDumpLegacy => false,
            DumpSignature::Minidump => self.machine_type != Some(MACHINE_I386),
        }
    }
}

/// A dump whose header (and stream directory, for minidumps) has been parsed;
/// this is what every extractor works off.
#[derive(Debug, Clone)]
pub struct ParsedDump<'buf> {
    pub reader: BinaryReader<'buf>,
    pub header: DumpHeader,
    /// Empty for kernel dumps.
    pub streams: StreamDirectory,
}

impl<'buf> ParsedDump<'buf> {
    /// Parse the header and, for minidumps, the stream directory and the
    /// system information. Only a header that can't be read at all is an
    /// error; everything past it degrades into warnings.
    pub fn parse(
        reader: BinaryReader<'buf>,
        signature: DumpSignature,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Result<Self> {
        let mut header = DumpHeader::parse(&reader, signature, warnings)?;
        let streams = match header.minidump {
            Some(fields) => StreamDirectory::parse(&reader, &fields, warnings),
            None => StreamDirectory::default(),
        };

        match SystemInfo::from_streams(&reader, &streams) {
            Ok(Some(info)) => header.apply_system_info(info),
            Ok(None) => {}
            Err(e) => warnings.push(ValidationWarning::new(
                "header",
                format!("system info stream: {e}"),
            )),
        }

        Ok(Self {
            reader,
            header,
            streams,
        })
    }

    #[must_use]
    pub fn signature(&self) -> DumpSignature {
        self.header.signature
    }

    /// Size of the fixed header region the scans skip.
    #[must_use]
    pub fn header_size(&self) -> u64 {
        match self.header.signature {
            DumpSignature::KernelDump64 => header64::SIZE,
            DumpSignature::KernelDumpLegacy => header32::SIZE,
            DumpSignature::Minidump => MinidumpHeader::SIZE,
        }
    }
}

/// Parse the physical memory runs of a kernel dump. The descriptor lives in a
/// fixed size union of the header, so the run count is bounded by it; running
/// into the end of the buffer stops the parsing where it is.
fn parse_runs(
    reader: &BinaryReader,
    offset: u64,
    block_size: u64,
    flavor: PhysmemFlavor,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<PhysmemRun> {
    let Ok(desc) = PhysmemDesc::parse(reader, offset, flavor) else {
        warnings.push(ValidationWarning::new(
            "header",
            "physical memory descriptor is truncated",
        ));
        return Vec::new();
    };

    let max_runs = (block_size - flavor.desc_size()) / flavor.run_size();
    let number_of_runs = u64::from(desc.number_of_runs);
    if number_of_runs > max_runs {
        warn!("{number_of_runs} physmem runs don't fit in the header, capping to {max_runs}");
        warnings.push(ValidationWarning::new(
            "header",
            format!("{number_of_runs} physical memory runs claimed, only {max_runs} fit"),
        ));
    }

    let mut runs = Vec::new();
    let mut pages = 0u64;
    let mut cursor = offset + flavor.desc_size();
    for run_idx in 0..number_of_runs.min(max_runs) {
        let Ok(run) = PhysmemRun::parse(reader, cursor, flavor) else {
            warnings.push(ValidationWarning::new(
                "header",
                format!("physical memory run {run_idx} is truncated"),
            ));
            break;
        };

        pages = pages.saturating_add(run.page_count);
        runs.push(run);
        cursor += flavor.run_size();
    }

    if runs.len() as u64 == number_of_runs && pages != desc.number_of_pages {
        warnings.push(ValidationWarning::new(
            "header",
            format!(
                "runs cover {pages} pages but the descriptor claims {}",
                desc.number_of_pages
            ),
        ));
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel64(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[..8].copy_from_slice(b"PAGEDU64");
        data[0x8..0xc].copy_from_slice(&15u32.to_le_bytes());
        data[0xc..0x10].copy_from_slice(&19041u32.to_le_bytes());
        data[0x10..0x18].copy_from_slice(&0x1ad000u64.to_le_bytes());
        data[0x20..0x28].copy_from_slice(&0xfffff803_1d42a2d0u64.to_le_bytes());
        data[0x30..0x34].copy_from_slice(&MACHINE_AMD64.to_le_bytes());
        data[0x34..0x38].copy_from_slice(&4u32.to_le_bytes());

        data
    }

    fn set_runs(data: &mut [u8], runs: &[(u64, u64)]) {
        let total: u64 = runs.iter().map(|(_, count)| count).sum();
        data[0x88..0x8c].copy_from_slice(&(runs.len() as u32).to_le_bytes());
        data[0x90..0x98].copy_from_slice(&total.to_le_bytes());
        for (idx, (base, count)) in runs.iter().enumerate() {
            let off = 0x98 + idx * 16;
            data[off..off + 8].copy_from_slice(&base.to_le_bytes());
            data[off + 8..off + 16].copy_from_slice(&count.to_le_bytes());
        }
    }

    #[test]
    fn kernel_header() {
        let mut data = kernel64(0x2000);
        set_runs(&mut data, &[(1, 0x9e), (0x100, 0x200)]);
        data[0xf98..0xf9c].copy_from_slice(&1u32.to_le_bytes());
        let mut warnings = Vec::new();
        let header = DumpHeader::parse(
            &BinaryReader::new(&data),
            DumpSignature::KernelDump64,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(header.major_version, 15);
        assert_eq!(header.minor_version, 19041);
        assert_eq!(header.directory_table_base, Some(0x1ad000));
        assert_eq!(header.module_list_pointer, Some(0xfffff803_1d42a2d0));
        assert_eq!(header.machine_type, Some(MACHINE_AMD64));
        assert_eq!(header.processor_count, Some(4));
        assert_eq!(header.dump_type, Some(DumpType::Full));
        assert_eq!(
            header.physical_memory_runs,
            vec![
                PhysmemRun {
                    base_page: 1,
                    page_count: 0x9e
                },
                PhysmemRun {
                    base_page: 0x100,
                    page_count: 0x200
                }
            ]
        );
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn truncated_runs_stop_early() {
        let mut data = kernel64(0x2000);
        set_runs(&mut data, &[(1, 1), (2, 1), (3, 1)]);
        // Cut the buffer in the middle of the second run.
        data.truncate(0x98 + 16 + 8);
        let mut warnings = Vec::new();
        let header = DumpHeader::parse(
            &BinaryReader::new(&data),
            DumpSignature::KernelDump64,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(header.physical_memory_runs.len(), 1);
        assert_eq!(header.dump_type, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn too_many_runs_are_capped() {
        let mut data = kernel64(0x2000);
        data[0x88..0x8c].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
        let mut warnings = Vec::new();
        let header = DumpHeader::parse(
            &BinaryReader::new(&data),
            DumpSignature::KernelDump64,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(header.physical_memory_runs.len(), 42);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn legacy_header() {
        let mut data = vec![0u8; 0x1000];
        data[..8].copy_from_slice(b"PAGEDUMP");
        data[0x10..0x14].copy_from_slice(&0x39000u32.to_le_bytes());
        data[0x18..0x1c].copy_from_slice(&0x8055_a420u32.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&MACHINE_I386.to_le_bytes());
        let header = DumpHeader::parse(
            &BinaryReader::new(&data),
            DumpSignature::KernelDumpLegacy,
            &mut Vec::new(),
        )
        .unwrap();

        assert_eq!(header.directory_table_base, Some(0x39000));
        assert_eq!(header.module_list_pointer, Some(0x8055_a420));
        assert!(!header.is_64bit());
    }

    #[test]
    fn minidump_header() {
        let mut data = vec![0u8; 0x40];
        data[..4].copy_from_slice(b"MDMP");
        data[4..6].copy_from_slice(&0xa793u16.to_le_bytes());
        data[8..12].copy_from_slice(&3u32.to_le_bytes());
        data[12..16].copy_from_slice(&0x20u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&0x5f5e_1000u32.to_le_bytes());
        let header = DumpHeader::parse(
            &BinaryReader::new(&data),
            DumpSignature::Minidump,
            &mut Vec::new(),
        )
        .unwrap();

        let fields = header.minidump.unwrap();
        assert_eq!(header.major_version, 0xa793);
        assert_eq!(fields.number_of_streams, 3);
        assert_eq!(fields.stream_directory_rva, 0x20);
        assert_eq!(fields.timestamp, 0x5f5e_1000);
        assert_eq!(header.directory_table_base, None);
        assert!(header.is_64bit());
    }

    #[test]
    fn system_info_fills_the_machine() {
        let mut data = vec![0u8; 0x80];
        data[..4].copy_from_slice(b"MDMP");
        data[8..12].copy_from_slice(&1u32.to_le_bytes());
        data[12..16].copy_from_slice(&0x20u32.to_le_bytes());
        // One directory entry: SystemInfo, 0x38 bytes at 0x40.
        data[0x20..0x24].copy_from_slice(&STREAM_TYPE_SYSTEM_INFO.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&0x38u32.to_le_bytes());
        data[0x28..0x2c].copy_from_slice(&0x40u32.to_le_bytes());
        data[0x40..0x42].copy_from_slice(&ARCH_X86.to_le_bytes());
        data[0x46] = 2;
        data[0x48..0x4c].copy_from_slice(&10u32.to_le_bytes());
        data[0x50..0x54].copy_from_slice(&19045u32.to_le_bytes());

        let mut warnings = Vec::new();
        let dump = ParsedDump::parse(
            BinaryReader::new(&data),
            DumpSignature::Minidump,
            &mut warnings,
        )
        .unwrap();

        assert_eq!(dump.header.machine_type, Some(MACHINE_I386));
        assert_eq!(dump.header.processor_count, Some(2));
        assert_eq!(dump.header.system_info.unwrap().build_number, 19045);
        assert!(!dump.header.is_64bit());
        assert_eq!(dump.header_size(), 0x20);
        assert!(warnings.is_empty(), "{warnings:?}");
    }
}
