// Axel '0vercl0k' Souchet - October 5 2026
//! Recover the bug-check code and its four parameters.
//!
//! Several strategies are tried in order and the first one producing an
//! acceptable candidate wins:
//!
//! 1. [`Strategy::StructuredOffset`]: the fields of the kernel dump header,
//! 2. [`Strategy::ExceptionStream`]: a `STATUS_BREAKPOINT` exception record in
//!    a minidump, which is how the kernel carries a bug-check in there,
//! 3. [`Strategy::MarkerScan`]: candidates around a `KiBug` marker,
//! 4. [`Strategy::TextPattern`]: a `STOP:` / `BugCheck` line of text,
//! 5. [`Strategy::HeuristicScan`]: anything that looks real in the first
//!    128KB.
//!
//! The winning strategy is part of the result.
mod codes;
mod validate;

use bitflags::bitflags;
use memchr::memmem;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

pub use codes::{
    bugcheck_name, is_fake_code, is_status_code, is_valid_bugcheck_code, FAKE_CODES,
    STATUS_BREAKPOINT,
};
pub use validate::{assess, validate_parameters, Assessment, Severity, Validation};

use crate::budget::Deadline;
use crate::config::AnalysisConfig;
use crate::error::ValidationWarning;
use crate::header::ParsedDump;
use crate::patterns::{parse_hex, RE_BUGCHECK_LINE, RE_STOP_LINE};
use crate::structs::{ExceptionStream, STREAM_TYPE_EXCEPTION};
use crate::{BinaryReader, DumpSignature};

/// The marker the kernel's bug-check path leaves around.
const MARKER: &[u8] = b"KiBug";

/// How far around a marker candidates are looked for.
const MARKER_RADIUS: usize = 0x100;

/// Offset of `ExceptionInformation` in `EXCEPTION_RECORD64`.
const EXCEPTION_INFORMATION_OFFSET: u64 = 0x20;

/// How a bug-check was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Strategy {
    StructuredOffset,
    ExceptionStream,
    MarkerScan,
    TextPattern,
    HeuristicScan,
}

bitflags! {
    /// A set of [`Strategy`]s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StrategySet: u32 {
        const STRUCTURED_OFFSET = 1 << 0;
        const EXCEPTION_STREAM = 1 << 1;
        const MARKER_SCAN = 1 << 2;
        const TEXT_PATTERN = 1 << 3;
        const HEURISTIC_SCAN = 1 << 4;
    }
}

impl Strategy {
    /// Every strategy, in the order they are tried.
    pub const ALL: [Self; 5] = [
        Self::StructuredOffset,
        Self::ExceptionStream,
        Self::MarkerScan,
        Self::TextPattern,
        Self::HeuristicScan,
    ];

    #[must_use]
    pub fn flag(self) -> StrategySet {
        match self {
            Self::StructuredOffset => StrategySet::STRUCTURED_OFFSET,
            Self::ExceptionStream => StrategySet::EXCEPTION_STREAM,
            Self::MarkerScan => StrategySet::MARKER_SCAN,
            Self::TextPattern => StrategySet::TEXT_PATTERN,
            Self::HeuristicScan => StrategySet::HEURISTIC_SCAN,
        }
    }
}

/// A recovered bug-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugCheckInfo {
    pub code: u32,
    /// `None` if the code isn't in the table; names are never made up.
    pub name: Option<&'static str>,
    pub parameters: [u64; 4],
    pub validation: Validation,
    pub analysis: Assessment,
    pub strategy: Strategy,
    /// Where in the file the code was read from.
    pub offset: u64,
}

/// A code and its parameters, before any plausibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    code: u32,
    parameters: [u64; 4],
    offset: u64,
}

/// How the parameters are laid out after the code: 64-bit machines have
/// `u64`s starting 8 bytes after the code, 32-bit ones `u32`s right after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLayout {
    Wide,
    Narrow,
}

impl ParamLayout {
    fn read(self, reader: &BinaryReader, offset: u64) -> Option<Candidate> {
        let code = reader.read_u32(offset).ok()?;
        let parameters = match self {
            Self::Wide => reader.read_u64s::<4>(offset.checked_add(8)?).ok()?,
            Self::Narrow => {
                let mut parameters = [0u64; 4];
                for (idx, slot) in parameters.iter_mut().enumerate() {
                    *slot = reader.read_u32(offset + 4 + idx as u64 * 4).ok()?.into();
                }

                parameters
            }
        };

        Some(Candidate {
            code,
            parameters,
            offset,
        })
    }
}

/// Runs the strategies over a parsed dump.
pub struct BugCheckExtractor<'a, 'buf> {
    dump: &'a ParsedDump<'buf>,
    config: &'a AnalysisConfig,
    deadline: &'a Deadline,
}

impl<'a, 'buf> BugCheckExtractor<'a, 'buf> {
    #[must_use]
    pub fn new(
        dump: &'a ParsedDump<'buf>,
        config: &'a AnalysisConfig,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            dump,
            config,
            deadline,
        }
    }

    /// Try every enabled strategy in order; the first acceptable candidate
    /// wins. Failed parameter checks of the winner end up in `warnings`.
    pub fn extract(&self, warnings: &mut Vec<ValidationWarning>) -> Option<BugCheckInfo> {
        for strategy in Strategy::ALL {
            if !self.config.strategies.contains(strategy.flag()) {
                trace!("{strategy:?} is disabled");
                continue;
            }

            let Some(info) = self.run(strategy) else {
                debug!("{strategy:?} found nothing");
                continue;
            };

            debug!(
                "{strategy:?} found bug-check {:#x} at {:#x}",
                info.code, info.offset
            );
            warnings.extend(
                info.validation
                    .errors
                    .iter()
                    .map(|e| ValidationWarning::new("bugcheck", e.clone())),
            );

            return Some(info);
        }

        if self.config.strategies.contains(StrategySet::STRUCTURED_OFFSET) {
            self.explain_structured_rejection(warnings);
        }

        None
    }

    /// Run a single strategy, regardless of whether it is enabled.
    #[must_use]
    pub fn run(&self, strategy: Strategy) -> Option<BugCheckInfo> {
        match strategy {
            Strategy::StructuredOffset => self.structured(),
            Strategy::ExceptionStream => self.exception_stream(),
            Strategy::MarkerScan => self.marker_scan(),
            Strategy::TextPattern => self.text_pattern(),
            Strategy::HeuristicScan => self.heuristic_scan(),
        }
    }

    fn layout(&self) -> ParamLayout {
        if self.dump.header.is_64bit() {
            ParamLayout::Wide
        } else {
            ParamLayout::Narrow
        }
    }

    fn structured_candidate(&self) -> Option<Candidate> {
        use crate::structs::{header32, header64};

        match self.dump.signature() {
            DumpSignature::KernelDump64 => {
                ParamLayout::Wide.read(&self.dump.reader, header64::BUG_CHECK_CODE)
            }
            DumpSignature::KernelDumpLegacy => {
                ParamLayout::Narrow.read(&self.dump.reader, header32::BUG_CHECK_CODE)
            }
            DumpSignature::Minidump => None,
        }
    }

    fn structured(&self) -> Option<BugCheckInfo> {
        let candidate = self.structured_candidate()?;

        self.accept(candidate, Strategy::StructuredOffset, true)
    }

    /// Say why the header's bug-check wasn't taken, when nothing else was
    /// found either.
    fn explain_structured_rejection(&self, warnings: &mut Vec<ValidationWarning>) {
        let Some(candidate) = self.structured_candidate() else {
            return;
        };

        let heuristics = &self.config.heuristics;
        let message = if is_fake_code(candidate.code) {
            format!("header bug-check {:#x} is a known fake value", candidate.code)
        } else if !is_valid_bugcheck_code(candidate.code, heuristics) {
            format!("header bug-check {:#x} is not a valid code", candidate.code)
        } else {
            let validation =
                validate_parameters(candidate.code, &candidate.parameters, heuristics);
            format!(
                "header bug-check {:#x} rejected: {}",
                candidate.code,
                validation.errors.join(", ")
            )
        };

        warnings.push(ValidationWarning::new("bugcheck", message));
    }

    fn exception_stream(&self) -> Option<BugCheckInfo> {
        let location = self.dump.streams.get(STREAM_TYPE_EXCEPTION)?;
        let stream = ExceptionStream::parse(&self.dump.reader, location.rva.into()).ok()?;
        let record = &stream.exception_record;
        if record.exception_code != STATUS_BREAKPOINT {
            trace!(
                "exception stream carries {:#x}, not a bug-check",
                record.exception_code
            );
            return None;
        }

        let info = &record.exception_information;
        let code = u32::try_from(info[0]).ok()?;
        let candidate = Candidate {
            code,
            parameters: [info[1], info[2], info[3], info[4]],
            offset: u64::from(location.rva) + 8 + EXCEPTION_INFORMATION_OFFSET,
        };

        self.accept(candidate, Strategy::ExceptionStream, false)
    }

    fn marker_scan(&self) -> Option<BugCheckInfo> {
        let reader = &self.dump.reader;
        let window = reader.tail(0, self.config.scan.marker_window).ok()?;
        let layout = self.layout();
        for (idx, hit) in memmem::find_iter(window, MARKER).enumerate() {
            if self.deadline.expired_at(idx) {
                warn!("ran out of time scanning for markers");
                break;
            }

            trace!("marker at {hit:#x}");
            let start = hit.saturating_sub(MARKER_RADIUS) & !3;
            let end = hit.saturating_add(MARKER_RADIUS).min(window.len());
            for offset in (start..end).step_by(4) {
                let Some(candidate) = layout.read(reader, offset as u64) else {
                    break;
                };

                if !has_parameters(&candidate) {
                    continue;
                }

                if let Some(info) = self.accept(candidate, Strategy::MarkerScan, true) {
                    return Some(info);
                }
            }
        }

        None
    }

    fn text_pattern(&self) -> Option<BugCheckInfo> {
        let window = self
            .dump
            .reader
            .tail(0, self.config.scan.marker_window)
            .ok()?;

        for re in [&*RE_STOP_LINE, &*RE_BUGCHECK_LINE] {
            for caps in re.captures_iter(window) {
                let Some(code) = parse_hex(&caps[1]).and_then(|c| u32::try_from(c).ok()) else {
                    continue;
                };

                // A bare `STOP:` line carries no parameters; they stay zero.
                let mut parameters = [0u64; 4];
                let mut complete = true;
                for (idx, slot) in parameters.iter_mut().enumerate() {
                    let Some(raw) = caps.get(idx + 2) else {
                        continue;
                    };

                    match parse_hex(raw.as_bytes()) {
                        Some(value) => *slot = value,
                        None => complete = false,
                    }
                }

                if !complete {
                    continue;
                }

                let offset = caps.get(0).map_or(0, |m| m.start() as u64);
                let candidate = Candidate {
                    code,
                    parameters,
                    offset,
                };

                if let Some(info) = self.accept(candidate, Strategy::TextPattern, false) {
                    return Some(info);
                }
            }
        }

        None
    }

    fn heuristic_scan(&self) -> Option<BugCheckInfo> {
        let reader = &self.dump.reader;
        let heuristics = &self.config.heuristics;
        let layout = self.layout();
        let start = self.dump.header_size();
        let end = self.config.scan.heuristic_window.min(reader.len());
        for (idx, offset) in (start..end).step_by(4).enumerate() {
            if self.deadline.expired_at(idx) {
                warn!("ran out of time in the heuristic bug-check scan at {offset:#x}");
                break;
            }

            let Some(candidate) = layout.read(reader, offset) else {
                break;
            };

            // Cheap rejections first, most of the buffer dies here.
            if candidate.code == 0 || !has_parameters(&candidate) {
                continue;
            }

            if !is_valid_bugcheck_code(candidate.code, heuristics) {
                continue;
            }

            let named = bugcheck_name(candidate.code).is_some();
            let status = is_status_code(candidate.code) && heuristics.accept_status_codes;
            let kernel_param = candidate
                .parameters
                .iter()
                .any(|&p| heuristics.is_kernel_address(p));
            if !(named || status) || !(status || kernel_param) {
                continue;
            }

            if let Some(info) = self.accept(candidate, Strategy::HeuristicScan, true) {
                return Some(info);
            }
        }

        None
    }

    /// Turn a candidate into a result if its code is plausible and, when
    /// `strict`, if its parameters pass validation.
    fn accept(
        &self,
        candidate: Candidate,
        strategy: Strategy,
        strict: bool,
    ) -> Option<BugCheckInfo> {
        let heuristics = &self.config.heuristics;
        if !is_valid_bugcheck_code(candidate.code, heuristics) {
            trace!(
                "{strategy:?}: {:#x} at {:#x} is not a bug-check code",
                candidate.code,
                candidate.offset
            );
            return None;
        }

        let validation = validate_parameters(candidate.code, &candidate.parameters, heuristics);
        if strict && !validation.valid {
            trace!(
                "{strategy:?}: {:#x} at {:#x} has implausible parameters",
                candidate.code,
                candidate.offset
            );
            return None;
        }

        Some(BugCheckInfo {
            code: candidate.code,
            name: bugcheck_name(candidate.code),
            parameters: candidate.parameters,
            validation,
            analysis: assess(candidate.code),
            strategy,
            offset: candidate.offset,
        })
    }
}

fn has_parameters(candidate: &Candidate) -> bool {
    candidate.parameters.iter().any(|&p| p != 0)
}
