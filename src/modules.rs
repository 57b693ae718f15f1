// Axel '0vercl0k' Souchet - October 8 2026
//! Recover the list of loaded drivers / modules.
//!
//! In order of preference: the minidump `ModuleListStream`, the kernel's
//! `PsLoadedModuleList` walked through virtual memory, and finally names
//! recovered from printable strings plus PE images found in the buffer.
//! Every name, wherever it comes from, goes through
//! [`is_legitimate_module_name`].
use std::collections::{BTreeMap, BTreeSet};

use memchr::memmem;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::budget::Deadline;
use crate::config::AnalysisConfig;
use crate::error::{Error, Result, ValidationWarning};
use crate::header::ParsedDump;
use crate::patterns::{RE_MODULE_CANDIDATE, RE_MODULE_NAME};
use crate::pe::{self, known_bad_version, FileVersion, ImageLayout};
use crate::streams::StreamLocation;
use crate::strings::ScannedStrings;
use crate::structs::{kldr64, ModuleEntry, STREAM_TYPE_MODULE_LIST};
use crate::virt::VirtualMemory;
use crate::{BinaryReader, Gva, Gxa};

/// Lists longer than this are bogus.
const MAX_LIST_ENTRIES: usize = 0x1_000;

/// How much of an image is read through virtual memory to find its version.
const MAX_IMAGE_READ: u32 = 0x20_0000;

/// Names that keep showing up in generated reports but that don't exist.
static BLOCKLIST: &[&str] = &[
    "wxr.sys",
    "web.sys",
    "vs.sys",
    "fake.sys",
    "driver.sys",
    "example.sys",
    "unknown.sys",
    "test.sys",
    "sample.sys",
];

/// The kernel and the modules it can't run without; they go first.
static SYSTEM_MODULES: &[&str] = &[
    "ntoskrnl.exe",
    "ntkrnlmp.exe",
    "ntkrnlpa.exe",
    "ntkrpamp.exe",
    "hal.dll",
    "kdcom.dll",
    "ci.dll",
    "clfs.sys",
    "cng.sys",
    "ksecdd.sys",
    "acpi.sys",
    "pci.sys",
    "wdf01000.sys",
    "fltmgr.sys",
    "ntfs.sys",
    "ndis.sys",
    "tcpip.sys",
    "storport.sys",
    "classpnp.sys",
    "disk.sys",
    "partmgr.sys",
    "volmgr.sys",
    "win32k.sys",
    "win32kbase.sys",
    "win32kfull.sys",
    "ntdll.dll",
    "kernel32.dll",
    "kernelbase.dll",
];

/// Where a module came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ModuleSource {
    MinidumpStream,
    LoadedModuleList,
    StringScan,
    PeHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub path: Option<String>,
    pub base: Option<u64>,
    pub size: Option<u32>,
    pub timestamp: Option<u32>,
    pub checksum: Option<u32>,
    pub version: Option<FileVersion>,
    pub source: ModuleSource,
    /// Known problems with this module.
    pub flags: Vec<String>,
}

impl ModuleInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, source: ModuleSource) -> Self {
        Self {
            name: name.into(),
            path: None,
            base: None,
            size: None,
            timestamp: None,
            checksum: None,
            version: None,
            source,
            flags: Vec::new(),
        }
    }

    /// `[base, end)` if both are known.
    #[must_use]
    pub fn range(&self) -> Option<(u64, u64)> {
        let base = self.base?;
        let end = base.checked_add(self.size?.into())?;

        Some((base, end))
    }

    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.range()
            .is_some_and(|(base, end)| (base..end).contains(&addr))
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        is_system_module(&self.name)
    }

    /// Fill whatever we don't know with what `other` knows.
    fn merge(&mut self, other: Self) {
        self.path = self.path.take().or(other.path);
        self.base = self.base.or(other.base);
        self.size = self.size.or(other.size);
        self.timestamp = self.timestamp.or(other.timestamp);
        self.checksum = self.checksum.or(other.checksum);
        self.version = self.version.or(other.version);
    }
}

/// Is `name` something that could be a real module file name?
#[must_use]
pub fn is_legitimate_module_name(name: &str) -> bool {
    (4..=64).contains(&name.len())
        && RE_MODULE_NAME.is_match(name)
        && !BLOCKLIST.iter().any(|b| b.eq_ignore_ascii_case(name))
}

#[must_use]
pub fn is_system_module(name: &str) -> bool {
    SYSTEM_MODULES.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Last component of a Windows or POSIX path.
fn basename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Parse the `ModuleListStream`: a `u32` count followed by `MINIDUMP_MODULE`
/// records whose names are `MINIDUMP_STRING`s.
pub fn parse_module_list_stream(
    reader: &BinaryReader,
    location: StreamLocation,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<ModuleInfo> {
    let offset = u64::from(location.rva);
    let Ok(count) = reader.read_u32(offset) else {
        warnings.push(ValidationWarning::new("modules", "module list stream is truncated"));
        return Vec::new();
    };

    let mut modules = Vec::new();
    for idx in 0..u64::from(count).min(MAX_LIST_ENTRIES as u64) {
        let Ok(entry) = ModuleEntry::parse(reader, offset + 4 + idx * ModuleEntry::SIZE) else {
            warnings.push(ValidationWarning::new(
                "modules",
                format!("module list stream is truncated after {idx} of {count} entries"),
            ));
            break;
        };

        let name_rva = u64::from(entry.module_name_rva);
        let path = reader
            .read_u32(name_rva)
            .and_then(|len| reader.read_utf16(name_rva + 4, len.into()));
        let Ok(path) = path else {
            trace!("module {idx} has an unreadable name");
            continue;
        };

        let name = basename(&path);
        if !is_legitimate_module_name(name) {
            warnings.push(ValidationWarning::new(
                "modules",
                format!("dropping module with an implausible name {name:?}"),
            ));
            continue;
        }

        let mut module = ModuleInfo::new(name, ModuleSource::MinidumpStream);
        module.path = (path != name).then(|| path.clone());
        module.base = Some(entry.base_of_image);
        module.size = Some(entry.size_of_image);
        module.timestamp = Some(entry.time_date_stamp);
        module.checksum = Some(entry.checksum);
        module.version = FileVersion::from_fixed(&entry.version_info);
        modules.push(module);
    }

    modules
}

fn field(base: Gva, offset: u64) -> Result<Gva> {
    base.u64()
        .checked_add(offset)
        .map(Gva::new)
        .ok_or(Error::InvalidData("address overflow"))
}

/// Read an x64 `UNICODE_STRING`.
fn read_unicode_string(memory: &dyn VirtualMemory, at: Gva) -> Result<String> {
    let length = memory.read_u16(at)?;
    if (length % 2) != 0 {
        return Err(Error::InvalidUnicodeString);
    }

    let buffer = memory.read_u64(field(at, 8)?)?;
    let mut raw = vec![0; length.into()];
    memory
        .read_exact(Gva::new(buffer), &mut raw)
        .map_err(|(_, e)| e)?;
    let units = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect::<Vec<_>>();

    Ok(String::from_utf16(&units)?)
}

/// Read one `KLDR_DATA_TABLE_ENTRY`. We try `BaseDllName` first for the name,
/// and fall back on the last component of `FullDllName`.
fn read_kldr_entry(memory: &dyn VirtualMemory, entry: Gva) -> Result<ModuleInfo> {
    let base = memory.read_u64(field(entry, kldr64::DLL_BASE)?)?;
    let size = memory.read_u32(field(entry, kldr64::SIZE_OF_IMAGE)?)?;
    let checksum = memory.read_u32(field(entry, kldr64::CHECKSUM)?)?;
    let full_name = read_unicode_string(memory, field(entry, kldr64::FULL_DLL_NAME)?)
        .ok()
        .filter(|n| !n.is_empty());
    let name = match read_unicode_string(memory, field(entry, kldr64::BASE_DLL_NAME)?) {
        Ok(name) if !name.is_empty() => name,
        _ => full_name
            .as_deref()
            .map(basename)
            .map(str::to_string)
            .ok_or(Error::InvalidUnicodeString)?,
    };

    let mut module = ModuleInfo::new(name, ModuleSource::LoadedModuleList);
    module.path = full_name.filter(|p| p != &module.name);
    module.base = Some(base);
    module.size = Some(size);
    module.checksum = Some(checksum);

    Ok(module)
}

/// Walk the circular `LIST_ENTRY` of `KLDR_DATA_TABLE_ENTRY`s hanging off
/// `head`. A failure stops the walk; what was read until then is kept.
pub fn walk_loaded_module_list(
    memory: &dyn VirtualMemory,
    head: Gva,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<ModuleInfo> {
    let mut modules = Vec::new();
    let mut seen = BTreeSet::new();
    let mut entry = match memory.read_u64(head) {
        Ok(flink) => Gva::new(flink),
        Err(e) => {
            warnings.push(ValidationWarning::new(
                "modules",
                format!("cannot read PsLoadedModuleList: {e}"),
            ));
            return modules;
        }
    };

    // It is circular, so we are done once we are back to the head.
    while entry != head {
        if !seen.insert(entry) {
            warnings.push(ValidationWarning::new(
                "modules",
                format!("loaded module list loops back to {entry}"),
            ));
            break;
        }

        if seen.len() > MAX_LIST_ENTRIES {
            warnings.push(ValidationWarning::new(
                "modules",
                "loaded module list is too long, truncating it",
            ));
            break;
        }

        match read_kldr_entry(memory, entry) {
            Ok(module) if is_legitimate_module_name(&module.name) => modules.push(module),
            Ok(module) => warnings.push(ValidationWarning::new(
                "modules",
                format!("dropping module with an implausible name {:?}", module.name),
            )),
            Err(e) if e.is_memory_error() => {
                warnings.push(ValidationWarning::new(
                    "modules",
                    format!("loaded module list is unreadable at {entry}: {e}"),
                ));
                break;
            }
            Err(e) => trace!("skipping module entry at {entry}: {e}"),
        }

        let next = field(entry, kldr64::IN_LOAD_ORDER_LINKS)
            .and_then(|flink| memory.read_u64(flink).map_err(Error::from));
        match next {
            Ok(next) => entry = Gva::new(next),
            Err(e) => {
                warnings.push(ValidationWarning::new(
                    "modules",
                    format!("cannot follow the loaded module list at {entry}: {e}"),
                ));
                break;
            }
        }
    }

    modules
}

/// Module names mentioned in printable strings.
#[must_use]
pub fn modules_from_strings(strings: &ScannedStrings) -> Vec<ModuleInfo> {
    let mut modules = Vec::new();
    for s in &strings.strings {
        for m in RE_MODULE_CANDIDATE.find_iter(&s.text) {
            let name = m.as_str();
            if !is_legitimate_module_name(name) {
                trace!("rejecting module candidate {name:?}");
                continue;
            }

            let mut module = ModuleInfo::new(name, ModuleSource::StringScan);
            // Keep the path when the string is one.
            if m.end() == s.text.len() && s.text[..m.start()].ends_with('\\') {
                module.path = Some(s.text.clone());
            }

            modules.push(module);
        }
    }

    modules
}

/// PE images found in `data`, named after their `OriginalFilename`. Images
/// without a usable name are skipped.
#[must_use]
pub fn modules_from_pe_headers(data: &[u8], deadline: &Deadline) -> Vec<ModuleInfo> {
    let mut modules = Vec::new();
    for (i, offset) in memmem::find_iter(data, b"MZ").enumerate() {
        if deadline.expired_at(i) {
            debug!("out of time while looking for PE images");
            break;
        }

        let image = &data[offset..];
        if !pe::looks_like_pe(image) {
            continue;
        }

        // In memory images are mapped, but files captured in a buffer aren't.
        let info = match pe::parse_pe(image, ImageLayout::Mapped) {
            Ok(info) if info.version.is_some() => Ok(info),
            _ => pe::parse_pe(image, ImageLayout::File),
        };

        let Ok(info) = info else {
            continue;
        };

        let Some(name) = info
            .original_filename
            .as_deref()
            .map(basename)
            .filter(|n| is_legitimate_module_name(n))
        else {
            trace!("PE image at {offset:#x} has no usable name");
            continue;
        };

        let mut module = ModuleInfo::new(name, ModuleSource::PeHeader);
        module.size = info.size_of_image;
        module.timestamp = Some(info.timestamp);
        module.checksum = info.checksum;
        module.version = info.version;
        modules.push(module);
    }

    modules
}

/// Get the version of a loaded module by reading its image through virtual
/// memory.
fn version_from_memory(memory: &dyn VirtualMemory, module: &ModuleInfo) -> Option<FileVersion> {
    let base = module.base?;
    let size = module.size?.min(MAX_IMAGE_READ);
    let mut image = vec![0; size as usize];
    let read = memory.read(Gva::new(base), &mut image);
    image.truncate(read);

    pe::parse_pe(&image, ImageLayout::Mapped).ok()?.version
}

/// Deduplicate by lowercase name (merging what the duplicates know), put the
/// system modules first, cap the list, then flag overlaps and known bad
/// versions.
pub fn finalize(
    modules: Vec<ModuleInfo>,
    max_modules: usize,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<ModuleInfo> {
    let mut index = BTreeMap::<String, usize>::new();
    let mut out: Vec<ModuleInfo> = Vec::with_capacity(modules.len());
    for module in modules {
        let key = module.name.to_ascii_lowercase();
        if let Some(&idx) = index.get(&key) {
            out[idx].merge(module);
            continue;
        }

        index.insert(key, out.len());
        out.push(module);
    }

    // Stable, so discovery order is kept otherwise.
    out.sort_by_key(|m| !m.is_system());
    if out.len() > max_modules {
        warnings.push(ValidationWarning::new(
            "modules",
            format!("{} modules found, keeping the first {max_modules}", out.len()),
        ));
        out.truncate(max_modules);
    }

    let mut ranges = out
        .iter()
        .filter_map(|m| m.range().map(|r| (r, m.name.as_str())))
        .collect::<Vec<_>>();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let ((_, end), name) = pair[0];
        let ((next_base, _), next_name) = pair[1];
        if end > next_base {
            warnings.push(ValidationWarning::new(
                "modules",
                format!("{name} overlaps {next_name}"),
            ));
        }
    }

    for module in &mut out {
        let Some(version) = module.version else {
            continue;
        };

        if let Some(bad) = known_bad_version(&module.name, version) {
            warn!("{} {version} is a known bad version", module.name);
            module.flags.push(format!(
                "version {version} is older than {}: {}",
                bad.fixed_in, bad.issue
            ));
            warnings.push(ValidationWarning::new(
                "modules",
                format!("{} {version}: {}", module.name, bad.issue),
            ));
        }
    }

    out
}

/// Runs the sources over a parsed dump.
pub struct ModuleListExtractor<'a, 'buf> {
    dump: &'a ParsedDump<'buf>,
    memory: Option<&'a dyn VirtualMemory>,
    strings: &'a ScannedStrings,
    config: &'a AnalysisConfig,
    deadline: &'a Deadline,
}

impl<'a, 'buf> ModuleListExtractor<'a, 'buf> {
    #[must_use]
    pub fn new(
        dump: &'a ParsedDump<'buf>,
        memory: Option<&'a dyn VirtualMemory>,
        strings: &'a ScannedStrings,
        config: &'a AnalysisConfig,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            dump,
            memory,
            strings,
            config,
            deadline,
        }
    }

    pub fn extract(&self, warnings: &mut Vec<ValidationWarning>) -> Vec<ModuleInfo> {
        let mut modules = self
            .dump
            .streams
            .get(STREAM_TYPE_MODULE_LIST)
            .map(|location| parse_module_list_stream(&self.dump.reader, location, warnings))
            .unwrap_or_default();

        if modules.is_empty() {
            modules = self.loaded_module_list(warnings);
        }

        if modules.is_empty() {
            debug!("no structured module list, falling back to the heuristics");
            modules = modules_from_strings(self.strings);
            if let Ok(window) = self.dump.reader.tail(0, self.config.scan.strings_window) {
                modules.extend(modules_from_pe_headers(window, self.deadline));
            }
        }

        debug!("{} modules before clean-up", modules.len());
        finalize(modules, self.config.max_modules, warnings)
    }

    fn loaded_module_list(&self, warnings: &mut Vec<ValidationWarning>) -> Vec<ModuleInfo> {
        let (Some(memory), Some(head)) = (self.memory, self.dump.header.module_list_pointer)
        else {
            return Vec::new();
        };

        if !self.dump.signature().is_kernel_dump() {
            return Vec::new();
        }

        let mut modules = walk_loaded_module_list(memory, Gva::new(head), warnings);
        for module in &mut modules {
            if self.deadline.expired() {
                break;
            }

            module.version = version_from_memory(memory, module);
        }

        modules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::tests::build_pe;
    use crate::strings::{Encoding, ExtractedString};
    use crate::virt::{MemoryRange, MinidumpMemory};

    fn strings(texts: &[&str]) -> ScannedStrings {
        ScannedStrings {
            strings: texts
                .iter()
                .enumerate()
                .map(|(i, t)| ExtractedString {
                    text: t.to_string(),
                    offset: i as u64 * 0x100,
                    encoding: Encoding::Ascii,
                })
                .collect(),
            truncated: false,
        }
    }

    #[test]
    fn legitimacy() {
        assert!(is_legitimate_module_name("ntoskrnl.exe"));
        assert!(is_legitimate_module_name("Wdf01000.sys"));
        assert!(is_legitimate_module_name("hal.dll"));
        assert!(!is_legitimate_module_name("wxr.sys"));
        assert!(!is_legitimate_module_name("WXR.SYS"));
        assert!(!is_legitimate_module_name("fake.sys"));
        assert!(!is_legitimate_module_name("a.sy"));
        assert!(!is_legitimate_module_name("my driver.sys"));
        assert!(!is_legitimate_module_name(r"C:\Windows\ntoskrnl.exe"));
        assert!(!is_legitimate_module_name(&format!("{}.sys", "a".repeat(61))));
    }

    #[test]
    fn string_scan() {
        let strings = strings(&[
            "blabla wxr.sys crashed",
            r"\SystemRoot\system32\ntoskrnl.exe",
            "Loaded myDrv.sys, web.sys",
            "nothing to see",
        ]);
        let modules = modules_from_strings(&strings);
        let names = modules.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();

        assert_eq!(names, ["ntoskrnl.exe", "myDrv.sys"]);
        assert_eq!(
            modules[0].path.as_deref(),
            Some(r"\SystemRoot\system32\ntoskrnl.exe")
        );
        assert_eq!(modules[1].path, None);
        assert!(modules.iter().all(|m| m.source == ModuleSource::StringScan));
    }

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn module_list_stream() {
        let mut data = vec![0u8; 0x400];
        data[0x100..0x104].copy_from_slice(&3u32.to_le_bytes());
        let names = [r"C:\Windows\System32\ntdll.dll", "wxr.sys", "app.exe"];
        for (idx, name) in names.iter().enumerate() {
            let record = 0x104 + idx * 108;
            let name_rva = 0x300 + idx * 0x40;
            data[record..record + 8].copy_from_slice(&(0x7ff0_0000_0000u64 + idx as u64 * 0x10_0000).to_le_bytes());
            data[record + 8..record + 12].copy_from_slice(&0x1000u32.to_le_bytes());
            data[record + 0x10..record + 0x14].copy_from_slice(&0x1337u32.to_le_bytes());
            data[record + 0x14..record + 0x18].copy_from_slice(&(name_rva as u32).to_le_bytes());
            let name = utf16(name);
            data[name_rva..name_rva + 4].copy_from_slice(&(name.len() as u32).to_le_bytes());
            data[name_rva + 4..name_rva + 4 + name.len()].copy_from_slice(&name);
        }

        let mut warnings = Vec::new();
        let location = StreamLocation {
            rva: 0x100,
            size: 4 + 3 * 108,
        };
        let modules = parse_module_list_stream(&BinaryReader::new(&data), location, &mut warnings);

        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name, "ntdll.dll");
        assert_eq!(modules[0].path.as_deref(), Some(names[0]));
        assert_eq!(modules[0].base, Some(0x7ff0_0000_0000));
        assert_eq!(modules[0].size, Some(0x1000));
        assert_eq!(modules[0].timestamp, Some(0x1337));
        assert_eq!(modules[0].version, None);
        assert_eq!(modules[1].name, "app.exe");
        assert_eq!(modules[1].path, None);
        assert_eq!(warnings.len(), 1);
    }

    /// Lay out a `PsLoadedModuleList` in a buffer mapped at `VA`.
    const VA: u64 = 0xffff_f800_0000_0000;

    fn write_entry(data: &mut [u8], at: usize, flink: u64, base: u64, name: &str) {
        data[at..at + 8].copy_from_slice(&flink.to_le_bytes());
        data[at + 0x30..at + 0x38].copy_from_slice(&base.to_le_bytes());
        data[at + 0x40..at + 0x44].copy_from_slice(&0x1000u32.to_le_bytes());
        let name = utf16(name);
        let buffer = at + 0x100;
        data[buffer..buffer + name.len()].copy_from_slice(&name);
        let base_dll_name = at + kldr64::BASE_DLL_NAME as usize;
        data[base_dll_name..base_dll_name + 2].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[base_dll_name + 8..base_dll_name + 16]
            .copy_from_slice(&(VA + buffer as u64).to_le_bytes());
        data[at + 0x78..at + 0x7c].copy_from_slice(&0xc0ffeeu32.to_le_bytes());
    }

    fn memory(data: &[u8]) -> MinidumpMemory<'_> {
        MinidumpMemory::with_ranges(
            BinaryReader::new(data),
            vec![MemoryRange {
                start: VA,
                size: data.len() as u64,
                file_offset: 0,
            }],
        )
    }

    #[test]
    fn loaded_module_list() {
        let mut data = vec![0u8; 0x1000];
        let head = VA;
        data[0..8].copy_from_slice(&(VA + 0x200).to_le_bytes());
        write_entry(&mut data, 0x200, VA + 0x400, 0xfffff803_1d400000, "ntoskrnl.exe");
        write_entry(&mut data, 0x400, VA + 0x600, 0xfffff803_2d400000, "wxr.sys");
        write_entry(&mut data, 0x600, head, 0xfffff803_3d400000, "mydrv.sys");

        let mut warnings = Vec::new();
        let memory = memory(&data);
        let modules = walk_loaded_module_list(&memory, Gva::new(head), &mut warnings);

        let names = modules.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["ntoskrnl.exe", "mydrv.sys"]);
        assert_eq!(modules[0].base, Some(0xfffff803_1d400000));
        assert_eq!(modules[0].size, Some(0x1000));
        assert_eq!(modules[0].checksum, Some(0xc0ffee));
        assert_eq!(modules[0].source, ModuleSource::LoadedModuleList);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn loaded_module_list_cycle() {
        let mut data = vec![0u8; 0x1000];
        data[0..8].copy_from_slice(&(VA + 0x200).to_le_bytes());
        write_entry(&mut data, 0x200, VA + 0x400, 0xfffff803_1d400000, "ntoskrnl.exe");
        // Points back to the first entry instead of the head.
        write_entry(&mut data, 0x400, VA + 0x200, 0xfffff803_2d400000, "hal.dll");

        let mut warnings = Vec::new();
        let memory = memory(&data);
        let modules = walk_loaded_module_list(&memory, Gva::new(VA), &mut warnings);

        assert_eq!(modules.len(), 2);
        assert!(warnings[0].message.contains("loops"));
    }

    #[test]
    fn loaded_module_list_unreadable() {
        let mut data = vec![0u8; 0x1000];
        data[0..8].copy_from_slice(&0x1337u64.to_le_bytes());
        let mut warnings = Vec::new();
        let memory = memory(&data);
        let modules = walk_loaded_module_list(&memory, Gva::new(VA), &mut warnings);

        assert!(modules.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn pe_sniffing() {
        let image = build_pe((0x0006_0000, 0x0001_1000), "RTKVHD64.sys");
        let mut data = vec![0u8; 0x300];
        data.extend_from_slice(&image);
        let modules = modules_from_pe_headers(&data, &Deadline::unlimited());

        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "RTKVHD64.sys");
        assert_eq!(modules[0].source, ModuleSource::PeHeader);
        assert_eq!(modules[0].version, Some(FileVersion::new(6, 0, 1, 0x1000)));
        assert_eq!(modules[0].size, Some(0x6000));
    }

    #[test]
    fn clean_up() {
        let mut a = ModuleInfo::new("mydrv.sys", ModuleSource::StringScan);
        a.base = Some(0x1000);
        a.size = Some(0x2000);
        let mut b = ModuleInfo::new("MYDRV.SYS", ModuleSource::PeHeader);
        b.version = Some(FileVersion::new(1, 2, 3, 4));
        b.base = Some(0x9000);
        let mut c = ModuleInfo::new("other.sys", ModuleSource::StringScan);
        c.base = Some(0x2000);
        c.size = Some(0x1000);
        let mut d = ModuleInfo::new("rtkvhd64.sys", ModuleSource::PeHeader);
        d.version = Some(FileVersion::new(6, 0, 1, 7000));
        let nt = ModuleInfo::new("ntoskrnl.exe", ModuleSource::StringScan);

        let mut warnings = Vec::new();
        let modules = finalize(vec![a, b, c, d, nt], 3, &mut warnings);
        let names = modules.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();

        assert_eq!(names, ["ntoskrnl.exe", "mydrv.sys", "other.sys"]);
        assert_eq!(modules[1].version, Some(FileVersion::new(1, 2, 3, 4)));
        assert_eq!(modules[1].base, Some(0x1000));
        // Truncation, then the overlap between mydrv.sys and other.sys.
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].message.contains("overlaps"));

        let mut warnings = Vec::new();
        let mut d = ModuleInfo::new("rtkvhd64.sys", ModuleSource::PeHeader);
        d.version = Some(FileVersion::new(6, 0, 1, 7000));
        let modules = finalize(vec![d], 100, &mut warnings);
        assert_eq!(modules[0].flags.len(), 1);
        assert_eq!(warnings.len(), 1);
    }
}
