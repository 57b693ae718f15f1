// Axel '0vercl0k' Souchet - October 12 2026
//! Put every component together into a [`StructuredDumpInfo`].
//!
//! Only a buffer that isn't a crash-dump stops the analysis; everything else
//! degrades the part of the report it affects, and says so in
//! [`StructuredDumpInfo::warnings`].
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::budget::Deadline;
use crate::bugcheck::{BugCheckExtractor, BugCheckInfo};
use crate::config::AnalysisConfig;
use crate::context::{extract_exception, extract_thread_context, ExceptionInfo, ThreadContext};
use crate::corruption::{self, CorruptionIndicator, MemoryCorruptionAnalyzer};
use crate::error::{FormatError, ValidationWarning};
use crate::format::detect_format;
use crate::header::{DumpHeader, ParsedDump};
use crate::modules::{ModuleInfo, ModuleListExtractor};
use crate::physmem::PhysicalMemory;
use crate::stack::{StackFrame, StackReconstructor};
use crate::streams::StreamDirectory;
use crate::strings::scan_strings;
use crate::symbols::{SymbolIndex, SymbolResolver};
use crate::virt::{AddressTranslator, MinidumpMemory, VirtualMemory};
use crate::{BinaryReader, DumpSignature, Gpa};

/// Scans that check the time budget; each one gets an equal share.
const TIMED_SCANS: u32 = 4;

/// Everything recovered from a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredDumpInfo {
    pub signature: DumpSignature,
    pub header: DumpHeader,
    pub bug_check: Option<BugCheckInfo>,
    pub exception: Option<ExceptionInfo>,
    /// System modules first, then in discovery order.
    pub modules: Vec<ModuleInfo>,
    pub thread_context: Option<ThreadContext>,
    /// Innermost frame first.
    pub stack: Vec<StackFrame>,
    /// Sorted by offset, then kind.
    pub corruption: Vec<CorruptionIndicator>,
    pub warnings: Vec<ValidationWarning>,
}

/// Analyze `buffer` with the default configuration.
pub fn analyze(buffer: &[u8]) -> Result<StructuredDumpInfo, FormatError> {
    DumpAnalyzer::default().analyze(buffer)
}

/// Analyze `buffer` with `config`.
pub fn analyze_with(
    buffer: &[u8],
    config: &AnalysisConfig,
) -> Result<StructuredDumpInfo, FormatError> {
    DumpAnalyzer::new(config.clone()).analyze(buffer)
}

/// An analysis, configured.
#[derive(Debug, Default, Clone)]
pub struct DumpAnalyzer {
    config: AnalysisConfig,
    /// Only used in diagnostics.
    filename: Option<String>,
    symbols: Option<SymbolIndex>,
}

impl DumpAnalyzer {
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Resolve addresses with a text symbol index.
    #[must_use]
    pub fn with_symbols(mut self, symbols: SymbolIndex) -> Self {
        self.symbols = Some(symbols);
        self
    }

    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn name(&self) -> &str {
        self.filename.as_deref().unwrap_or("<buffer>")
    }

    /// Run the analysis.
    pub fn analyze(&self, buffer: &[u8]) -> Result<StructuredDumpInfo, FormatError> {
        let signature = detect_format(buffer).map_err(|e| {
            warn!("{}: {e}", self.name());
            e
        })?;

        info!("{}: analyzing a {signature:?} ({} bytes)", self.name(), buffer.len());
        let config = &self.config;
        let reader = BinaryReader::new(buffer);
        let mut warnings = Vec::new();

        let dump = ParsedDump::parse(reader, signature, &mut warnings).unwrap_or_else(|e| {
            warnings.push(ValidationWarning::new(
                "header",
                format!("the header is unreadable: {e}"),
            ));

            ParsedDump {
                reader,
                header: DumpHeader::empty(signature, 0, 0),
                streams: StreamDirectory::default(),
            }
        });

        let strings_deadline = Deadline::share(config.time_budget_ms, TIMED_SCANS);
        let strings = scan_strings(buffer, &config.scan, &strings_deadline);
        if strings.truncated {
            warnings.push(ValidationWarning::new(
                "strings",
                "out of time, the string extraction is partial",
            ));
        }

        let bugcheck_deadline = Deadline::share(config.time_budget_ms, TIMED_SCANS);
        let bug_check =
            BugCheckExtractor::new(&dump, config, &bugcheck_deadline).extract(&mut warnings);
        let exception = extract_exception(&dump, &mut warnings);
        let thread_context = extract_thread_context(&dump, &mut warnings);

        // Virtual memory: page tables for 64-bit kernel dumps, memory ranges
        // for minidumps.
        let dtb = thread_context
            .and_then(|c| c.cr3_override)
            .or(dump.header.directory_table_base)
            .filter(|&dtb| dtb != 0);
        let physmem = (signature == DumpSignature::KernelDump64 && dtb.is_some())
            .then(|| PhysicalMemory::from_header(&reader, &dump.header, &mut warnings));
        let translator = physmem
            .as_ref()
            .zip(dtb)
            .map(|(physmem, dtb)| AddressTranslator::new(reader, physmem, Gpa::new(dtb)));
        let user_memory = (signature == DumpSignature::Minidump)
            .then(|| MinidumpMemory::from_streams(reader, &dump.streams, &mut warnings))
            .filter(|memory| !memory.ranges().is_empty());
        let memory = match (&translator, &user_memory) {
            (Some(translator), _) => Some(translator as &dyn VirtualMemory),
            (None, Some(memory)) => Some(memory as &dyn VirtualMemory),
            (None, None) => None,
        };

        let modules_deadline = Deadline::share(config.time_budget_ms, TIMED_SCANS);
        let modules = ModuleListExtractor::new(&dump, memory, &strings, config, &modules_deadline)
            .extract(&mut warnings);

        let resolver = SymbolResolver::new()
            .with_index(self.symbols.clone().unwrap_or_default())
            .with_modules(&modules)
            .with_strings(&strings);
        let reconstructor =
            StackReconstructor::new(&config.heuristics, &resolver, config.frame_cap());
        let mut corruption_found = Vec::new();
        let stack = match (memory, thread_context.as_ref()) {
            (Some(memory), Some(context)) => {
                let walk = reconstructor.walk(memory, context, dump.header.is_64bit());
                corruption_found.extend(corruption::stack_indicator(&walk.end));
                walk.frames
            }
            _ => {
                debug!("no context or no memory, scanning for frames instead");
                reconstructor.scan(&strings)
            }
        };

        let corruption_deadline = Deadline::share(config.time_budget_ms, TIMED_SCANS);
        corruption_found.extend(
            MemoryCorruptionAnalyzer::new(config, &corruption_deadline)
                .scan(buffer, &mut warnings),
        );
        let corruption = corruption::finalize(corruption_found, config.max_findings, &mut warnings);

        let exhausted = [
            &strings_deadline,
            &bugcheck_deadline,
            &modules_deadline,
            &corruption_deadline,
        ]
        .iter()
        .any(|d| d.was_exhausted());
        if exhausted {
            warn!("{}: ran out of time, some scans are partial", self.name());
        }

        debug!(
            "{}: {} modules, {} frames, {} corruption indicators, {} warnings",
            self.name(),
            modules.len(),
            stack.len(),
            corruption.len(),
            warnings.len()
        );

        Ok(StructuredDumpInfo {
            signature,
            header: dump.header,
            bug_check,
            exception,
            modules,
            thread_context,
            stack,
            corruption,
            warnings,
        })
    }
}
