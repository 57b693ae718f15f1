// Axel '0vercl0k' Souchet - February 25 2024
#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]
mod analysis;
mod bits;
mod budget;
pub mod bugcheck;
mod config;
mod context;
pub mod corruption;
mod error;
mod format;
mod gxa;
mod header;
pub mod modules;
mod patterns;
pub mod pe;
mod physmem;
mod pxe;
mod reader;
pub mod stack;
mod streams;
mod strings;
mod structs;
pub mod symbols;
mod virt;

pub use analysis::{analyze, analyze_with, DumpAnalyzer, StructuredDumpInfo};
pub use bits::Bits;
pub use budget::Deadline;
pub use bugcheck::{
    BugCheckExtractor, BugCheckInfo, Severity, Strategy, StrategySet, Validation,
};
pub use config::{AddressHeuristics, AnalysisConfig, ScanLimits};
pub use context::{extract_exception, extract_thread_context, ExceptionInfo, ThreadContext};
pub use corruption::{CorruptionIndicator, CorruptionKind, MemoryCorruptionAnalyzer};
pub use error::{Error, FormatError, PxeKind, ReadError, Result, TranslationFailure, ValidationWarning};
pub use format::{detect_format, DumpSignature, MIN_DUMP_SIZE};
pub use gxa::{Gpa, Gva, Gxa, PageKind};
pub use header::{DumpHeader, MinidumpFields, ParsedDump, SystemInfo};
pub use modules::{is_legitimate_module_name, ModuleInfo, ModuleListExtractor, ModuleSource};
pub use pe::FileVersion;
pub use physmem::{PhysicalMemory, PhysmemSource};
pub use pxe::{Pfn, Pxe, PxeFlags};
pub use reader::BinaryReader;
pub use stack::{FrameSource, StackFrame, StackReconstructor, StackWalk, WalkEnd};
pub use streams::{StreamDirectory, StreamLocation};
pub use strings::{scan_strings, Encoding, ExtractedString, ScannedStrings};
pub use structs::{DumpType, PhysmemRun};
pub use symbols::{SymbolIndex, SymbolResolver};
pub use virt::{AddressTranslator, Chunk, MemoryRange, MinidumpMemory, Translation, VirtualMemory};
