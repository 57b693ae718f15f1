// Axel '0vercl0k' Souchet - October 7 2026
//! Just enough PE parsing to get a file version out of an image, and the
//! table of driver versions known to be trouble.
use std::fmt::{self, Display};

use memchr::memmem;
use serde::Serialize;
use tracing::trace;

use crate::error::{Error, Result};
use crate::structs::{FixedFileInfo, FIXED_FILE_INFO_SIGNATURE};
use crate::BinaryReader;

const DOS_SIGNATURE: u16 = 0x5a4d; // 'ZM'
const PE_SIGNATURE: u32 = 0x4550; // 'EP\0\0'
const E_LFANEW: u64 = 0x3c;
/// `e_lfanew` values past this are garbage.
const MAX_E_LFANEW: u32 = 0x1000;
const SECTION_HEADER_SIZE: u64 = 40;
const MAX_SECTIONS: u16 = 96;

/// How the image is laid out: as it is on disk, or as the loader mapped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    File,
    Mapped,
}

/// A four part file version, `major.minor.build.revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl FileVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Build it off the two halves of `VS_FIXEDFILEINFO`.
    #[must_use]
    pub const fn from_parts(ms: u32, ls: u32) -> Self {
        Self::new((ms >> 16) as u16, ms as u16, (ls >> 16) as u16, ls as u16)
    }

    /// `None` if it isn't a `VS_FIXEDFILEINFO`.
    #[must_use]
    pub fn from_fixed(info: &FixedFileInfo) -> Option<Self> {
        info.looks_good()
            .then(|| Self::from_parts(info.file_version_ms, info.file_version_ls))
    }
}

impl Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl Serialize for FileVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What we pull out of a PE image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeInfo {
    pub machine: u16,
    pub number_of_sections: u16,
    pub timestamp: u32,
    pub size_of_image: Option<u32>,
    pub checksum: Option<u32>,
    pub version: Option<FileVersion>,
    /// `OriginalFilename` of the version resource.
    pub original_filename: Option<String>,
}

/// A section header, the bits we use.
#[derive(Debug, Clone, Copy)]
struct Section {
    name: [u8; 8],
    virtual_size: u32,
    virtual_address: u32,
    size_of_raw_data: u32,
    pointer_to_raw_data: u32,
}

impl Section {
    fn parse(reader: &BinaryReader, offset: u64) -> Result<Self> {
        let mut name = [0; 8];
        name.copy_from_slice(reader.bytes(offset, 8)?);

        Ok(Self {
            name,
            virtual_size: reader.read_u32(offset + 8)?,
            virtual_address: reader.read_u32(offset + 12)?,
            size_of_raw_data: reader.read_u32(offset + 16)?,
            pointer_to_raw_data: reader.read_u32(offset + 20)?,
        })
    }

    /// Where the section content is and how big it is.
    fn span(&self, layout: ImageLayout) -> (u64, u64) {
        match layout {
            ImageLayout::File => (self.pointer_to_raw_data.into(), self.size_of_raw_data.into()),
            ImageLayout::Mapped => (
                self.virtual_address.into(),
                self.virtual_size.max(self.size_of_raw_data).into(),
            ),
        }
    }
}

/// Does `image` start like a PE?
#[must_use]
pub fn looks_like_pe(image: &[u8]) -> bool {
    let reader = BinaryReader::new(image);
    let (Ok(dos), Ok(lfanew)) = (reader.read_u16(0), reader.read_u32(E_LFANEW)) else {
        return false;
    };

    dos == DOS_SIGNATURE
        && lfanew <= MAX_E_LFANEW
        && reader.read_u32(lfanew.into()).ok() == Some(PE_SIGNATURE)
}

/// Parse the headers of the PE image at the start of `image` and dig its
/// version out of the `.rsrc` section. A missing version isn't an error.
pub fn parse_pe(image: &[u8], layout: ImageLayout) -> Result<PeInfo> {
    let reader = BinaryReader::new(image);
    if reader.read_u16(0)? != DOS_SIGNATURE {
        return Err(Error::InvalidData("no MZ signature"));
    }

    let lfanew = reader.read_u32(E_LFANEW)?;
    if lfanew > MAX_E_LFANEW {
        return Err(Error::InvalidData("e_lfanew is too far"));
    }

    let nt = u64::from(lfanew);
    if reader.read_u32(nt)? != PE_SIGNATURE {
        return Err(Error::InvalidData("no PE signature"));
    }

    let coff = nt + 4;
    let machine = reader.read_u16(coff)?;
    let number_of_sections = reader.read_u16(coff + 2)?;
    let timestamp = reader.read_u32(coff + 4)?;
    let size_of_optional_header = reader.read_u16(coff + 16)?;
    let optional = coff + 20;
    // Both PE32 and PE32+ have these at the same place.
    let size_of_image = reader.read_u32(optional + 56).ok();
    let checksum = reader.read_u32(optional + 64).ok();

    let mut info = PeInfo {
        machine,
        number_of_sections,
        timestamp,
        size_of_image,
        checksum,
        version: None,
        original_filename: None,
    };

    let sections = optional + u64::from(size_of_optional_header);
    for idx in 0..number_of_sections.min(MAX_SECTIONS) {
        let Ok(section) = Section::parse(&reader, sections + u64::from(idx) * SECTION_HEADER_SIZE)
        else {
            break;
        };

        if &section.name[..5] != b".rsrc" {
            continue;
        }

        let (start, size) = section.span(layout);
        let Ok(rsrc) = reader.tail(start, size) else {
            trace!("the .rsrc section is outside of the image");
            break;
        };

        info.version = find_version(rsrc);
        info.original_filename = find_string_value(rsrc, "OriginalFilename");
        break;
    }

    Ok(info)
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Find the `VS_FIXEDFILEINFO` following a `VS_VERSION_INFO` key.
fn find_version(rsrc: &[u8]) -> Option<FileVersion> {
    let key = memmem::find(rsrc, &utf16("VS_VERSION_INFO"))?;
    // The fixed info is right after the key and its padding.
    let after = &rsrc[key..rsrc.len().min(key + 0x40)];
    let signature = memmem::find(after, &FIXED_FILE_INFO_SIGNATURE.to_le_bytes())?;
    let reader = BinaryReader::new(rsrc);
    let fixed = FixedFileInfo::parse(&reader, (key + signature) as u64).ok()?;

    FileVersion::from_fixed(&fixed)
}

/// Find the value of a `StringFileInfo` entry.
fn find_string_value(rsrc: &[u8], name: &str) -> Option<String> {
    let mut key = utf16(name);
    key.extend_from_slice(&[0, 0]);
    let at = memmem::find(rsrc, &key)?;
    // The value is 32-bit aligned; resource data always starts aligned.
    let value = (at + key.len() + 3) & !3;
    let reader = BinaryReader::new(rsrc);
    let len = rsrc.len().saturating_sub(value).min(0x200);
    let text = reader.read_utf16(value as u64, len as u64).ok()?;

    (!text.is_empty()).then_some(text)
}

/// A driver version that is known to cause crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownBadVersion {
    /// Lowercase file name.
    pub module: &'static str,
    /// Versions below this one are affected.
    pub fixed_in: FileVersion,
    pub issue: &'static str,
}

static KNOWN_BAD_VERSIONS: &[KnownBadVersion] = &[
    KnownBadVersion {
        module: "rtkvhd64.sys",
        fixed_in: FileVersion::new(6, 0, 1, 8000),
        issue: "old Realtek audio driver, frequent DPC watchdog timeouts",
    },
    KnownBadVersion {
        module: "iastora.sys",
        fixed_in: FileVersion::new(13, 0, 0, 0),
        issue: "old Intel RST storage driver, DPC watchdog violations",
    },
    KnownBadVersion {
        module: "iastorac.sys",
        fixed_in: FileVersion::new(17, 0, 0, 0),
        issue: "old Intel RST storage driver, DPC watchdog violations",
    },
    KnownBadVersion {
        module: "netwtw04.sys",
        fixed_in: FileVersion::new(20, 70, 0, 0),
        issue: "old Intel wireless driver, IRQL bug-checks",
    },
    KnownBadVersion {
        module: "atikmdag.sys",
        fixed_in: FileVersion::new(8, 1, 1, 1000),
        issue: "old AMD display driver, video TDR failures",
    },
    KnownBadVersion {
        module: "nvlddmkm.sys",
        fixed_in: FileVersion::new(10, 18, 13, 0),
        issue: "old NVIDIA display driver, video TDR failures",
    },
    KnownBadVersion {
        module: "e1d65x64.sys",
        fixed_in: FileVersion::new(12, 15, 0, 0),
        issue: "old Intel Ethernet driver, IRQL bug-checks",
    },
];

/// Is `version` of `module` a known bad one?
#[must_use]
pub fn known_bad_version(module: &str, version: FileVersion) -> Option<&'static KnownBadVersion> {
    KNOWN_BAD_VERSIONS
        .iter()
        .find(|bad| bad.module.eq_ignore_ascii_case(module) && version < bad.fixed_in)
}
