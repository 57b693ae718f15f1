// Axel '0vercl0k' Souchet - October 4 2026
//! Knobs of the analysis. Everything has a sensible [`Default`]; callers
//! usually only tweak the time budget or disable a bug-check strategy.
use serde::{Deserialize, Serialize};

use crate::bugcheck::StrategySet;

/// How far the different scans are allowed to look into the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Window of the `KiBug` marker scan and of the text scan.
    pub marker_window: u64,
    /// Window of the last resort bug-check scan.
    pub heuristic_window: u64,
    /// Window of the printable string extraction.
    pub strings_window: u64,
    /// Window of the memory corruption scan.
    pub corruption_window: u64,
    /// Minimum length of an extracted string (in characters).
    pub min_string_length: usize,
    /// Maximum number of strings extracted per encoding.
    pub max_strings: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            marker_window: 64 * 1_024,
            heuristic_window: 128 * 1_024,
            strings_window: 1_048_576, // 1 MiB
            corruption_window: 1_048_576,
            min_string_length: 4,
            max_strings: 20_000,
        }
    }
}

/// The plausibility heuristics. None of them are authoritative; they are
/// best-effort approximations that can be tuned per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressHeuristics {
    /// First canonical kernel-space address on x64.
    pub kernel_start: u64,
    /// First kernel-space address of a 32-bit system (2GB/2GB split).
    pub legacy_kernel_start: u64,
    /// Where user-mode code can plausibly live.
    pub user_code_start: u64,
    pub user_code_end: u64,
    /// Do we accept NTSTATUS-looking codes (`0xC0000000` range) as bug-check
    /// codes?
    pub accept_status_codes: bool,
}

impl Default for AddressHeuristics {
    fn default() -> Self {
        Self {
            kernel_start: 0xffff_8000_0000_0000,
            legacy_kernel_start: 0x8000_0000,
            user_code_start: 0x1_0000,
            user_code_end: 0x7fff_ffff_0000,
            accept_status_codes: true,
        }
    }
}

impl AddressHeuristics {
    /// Does `addr` look like a kernel-space address? 32-bit values are
    /// compared against the legacy split.
    #[must_use]
    pub fn is_kernel_address(&self, addr: u64) -> bool {
        if addr >= self.kernel_start {
            return true;
        }

        addr <= u64::from(u32::MAX) && addr >= self.legacy_kernel_start
    }

    /// Does `addr` look like somewhere user-mode code could be?
    #[must_use]
    pub fn is_user_code_address(&self, addr: u64) -> bool {
        (self.user_code_start..self.user_code_end).contains(&addr)
    }

    /// Is it a plausible return address?
    #[must_use]
    pub fn is_code_address(&self, addr: u64) -> bool {
        addr >= self.kernel_start || self.is_user_code_address(addr)
    }
}

/// Everything that drives an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Which bug-check strategies are allowed to run.
    pub strategies: StrategySet,
    pub scan: ScanLimits,
    pub heuristics: AddressHeuristics,
    /// Maximum number of stack frames; clamped to `1..=64`.
    pub max_frames: usize,
    /// Maximum number of modules in the report.
    pub max_modules: usize,
    /// Maximum number of corruption findings in the report.
    pub max_findings: usize,
    /// Wall clock budget for the large scans, in milliseconds. Running out of
    /// time truncates the scan that is running, it never aborts the analysis.
    pub time_budget_ms: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategies: StrategySet::all(),
            scan: ScanLimits::default(),
            heuristics: AddressHeuristics::default(),
            max_frames: 25,
            max_modules: 100,
            max_findings: 64,
            time_budget_ms: None,
        }
    }
}

impl AnalysisConfig {
    /// The frame cap, clamped.
    #[must_use]
    pub fn frame_cap(&self) -> usize {
        self.max_frames.clamp(1, 64)
    }
}
