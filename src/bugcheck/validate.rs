// Axel '0vercl0k' Souchet - October 5 2026
//! Structural sanity checks of bug-check parameters, and the severity / likely
//! cause classification used by the report.
//!
//! None of this ever changes the extracted code: a failed validation only
//! shows up as [`Validation::errors`].
use serde::Serialize;

use crate::config::AddressHeuristics;

/// Outcome of the per-code parameter checks.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// What the report says about a bug-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub severity: Severity,
    pub likely_causes: Vec<&'static str>,
}

/// `AccessType` values of the IRQL bug-checks: read, write, execute.
const IRQL_ACCESS_TYPES: &[u64] = &[0, 1, 8];

/// `AccessType` values of `PAGE_FAULT_IN_NONPAGED_AREA`; 2 and 10 show up on
/// recent builds.
const PAGE_FAULT_ACCESS_TYPES: &[u64] = &[0, 1, 2, 8, 10];

/// Sub-codes of `BAD_POOL_CALLER`.
const BAD_POOL_CALLER_TYPES: &[u64] = &[
    0x00, 0x01, 0x02, 0x04, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x40,
    0x41, 0x42, 0x43, 0x44, 0x46, 0x47, 0x48, 0x50, 0x60, 0x61, 0x62, 0x63, 0x99, 0x9a, 0x9b,
    0x9c, 0x9d, 0x9e, 0xa0,
];

/// Filter manager error codes of `FLTMGR_FILE_SYSTEM`.
const FLTMGR_ERRORS: std::ops::RangeInclusive<u64> = 0x66..=0x78;

/// Highest IRQL.
const MAX_IRQL: u64 = 31;

/// Collects the failed checks of one validation.
struct Checker<'a> {
    heuristics: &'a AddressHeuristics,
    errors: Vec<String>,
}

impl<'a> Checker<'a> {
    fn new(heuristics: &'a AddressHeuristics) -> Self {
        Self {
            heuristics,
            errors: Vec::new(),
        }
    }

    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.errors.push(message());
        }
    }

    fn kernel_address(&mut self, idx: usize, what: &str, value: u64) {
        let ok = self.heuristics.is_kernel_address(value);
        self.check(ok, || {
            format!("parameter {} ({what}) {value:#x} is not a kernel address", idx + 1)
        });
    }

    /// Zero is fine, anything else has to look like kernel memory.
    fn optional_kernel_address(&mut self, idx: usize, what: &str, value: u64) {
        if value != 0 {
            self.kernel_address(idx, what, value);
        }
    }

    fn code_address(&mut self, idx: usize, what: &str, value: u64) {
        let ok = self.heuristics.is_code_address(value);
        self.check(ok, || {
            format!("parameter {} ({what}) {value:#x} is not a code address", idx + 1)
        });
    }

    fn one_of(&mut self, idx: usize, what: &str, value: u64, allowed: &[u64]) {
        self.check(allowed.contains(&value), || {
            format!("parameter {} ({what}) {value:#x} is not a known value", idx + 1)
        });
    }

    fn status_code(&mut self, idx: usize, value: u64) {
        let ok = value != 0 && value <= u64::from(u32::MAX);
        self.check(ok, || {
            format!(
                "parameter {} (exception code) {value:#x} is not an NTSTATUS",
                idx + 1
            )
        });
    }

    fn finish(self) -> Validation {
        Validation {
            valid: self.errors.is_empty(),
            errors: self.errors,
        }
    }
}

/// Check the four parameters of `code`. Codes without a dedicated validator
/// only have to clear the weak bar: not all zero, not all ones.
#[must_use]
pub fn validate_parameters(
    code: u32,
    params: &[u64; 4],
    heuristics: &AddressHeuristics,
) -> Validation {
    let mut c = Checker::new(heuristics);
    let [p1, p2, p3, p4] = *params;
    match code {
        // IRQL_NOT_LESS_OR_EQUAL / DRIVER_IRQL_NOT_LESS_OR_EQUAL.
        0x0a | 0xd1 => {
            c.check(p2 <= MAX_IRQL, || {
                format!("parameter 2 (IRQL) {p2:#x} is above {MAX_IRQL}")
            });
            c.one_of(2, "access type", p3, IRQL_ACCESS_TYPES);
            c.code_address(3, "faulting instruction", p4);
        }
        // KMODE_EXCEPTION_NOT_HANDLED.
        0x1e | 0x8e | 0x1000_008e => {
            c.status_code(0, p1);
            c.kernel_address(1, "exception address", p2);
        }
        // SYSTEM_THREAD_EXCEPTION_NOT_HANDLED.
        0x7e | 0x1000_007e => {
            c.status_code(0, p1);
            c.kernel_address(1, "exception address", p2);
            c.optional_kernel_address(2, "exception record", p3);
            c.optional_kernel_address(3, "context record", p4);
        }
        // PAGE_FAULT_IN_NONPAGED_AREA.
        0x50 => {
            c.check(p1 != 0, || "parameter 1 (referenced memory) is zero".into());
            c.one_of(1, "access type", p2, PAGE_FAULT_ACCESS_TYPES);
            if p3 != 0 {
                c.code_address(2, "faulting instruction", p3);
            }
        }
        // BAD_POOL_CALLER.
        0xc2 => c.one_of(0, "violation type", p1, BAD_POOL_CALLER_TYPES),
        // FLTMGR_FILE_SYSTEM.
        0xf5 => c.check(FLTMGR_ERRORS.contains(&p1), || {
            format!("parameter 1 (filter manager error) {p1:#x} is not a known error")
        }),
        // KERNEL_SECURITY_CHECK_FAILURE.
        0x139 => {
            c.check(p1 <= 0x40, || {
                format!("parameter 1 (failure type) {p1:#x} is not a known type")
            });
            c.optional_kernel_address(1, "trap frame", p2);
            c.optional_kernel_address(2, "exception record", p3);
        }
        // WHEA_UNCORRECTABLE_ERROR.
        0x124 => {
            c.check(p1 <= 0x10, || {
                format!("parameter 1 (error source) {p1:#x} is not a known source")
            });
            c.kernel_address(1, "WHEA error record", p2);
        }
        // DPC_WATCHDOG_VIOLATION.
        0x133 => {
            c.one_of(0, "violation type", p1, &[0, 1]);
            if p1 == 0 {
                c.check(p3 != 0, || "parameter 3 (time limit) is zero".into());
            }
        }
        // These are raised with blank parameters.
        0xe2 | 0xdead_dead | 0x161 => {}
        _ => {
            c.check(params.iter().any(|&p| p != 0), || {
                "all parameters are zero".into()
            });
            c.check(
                !params
                    .iter()
                    .all(|&p| p == u64::from(u32::MAX) || p == u64::MAX),
                || "all parameters are 0xffffffff".into(),
            );
        }
    }

    c.finish()
}

const HARDWARE: &[&str] = &[
    "Hardware failure reported by the processor (machine check)",
    "Overheating or unstable overclocking",
    "Faulty RAM, CPU or motherboard",
];
const POOL: &[&str] = &[
    "Driver corrupting pool memory",
    "Buffer overflow in a kernel-mode driver",
    "Faulty RAM",
];
const MEMORY_MANAGER: &[&str] = &[
    "Faulty RAM",
    "Driver corrupting memory management structures",
];
const INTEGRITY: &[&str] = &[
    "Kernel code or data structure modified",
    "Stack buffer overrun detected by a security cookie",
    "Incompatible security or anti-cheat software",
];
const CRITICAL_PROCESS: &[&str] = &[
    "A critical system process terminated",
    "Corrupted system files",
    "Disk or storage failure",
];
const STORAGE: &[&str] = &[
    "Storage controller driver problem",
    "Failing disk or cable",
    "File system corruption",
];
const IRQL: &[&str] = &[
    "Driver accessed pageable memory at a raised IRQL",
    "Driver used an invalid or freed pointer",
];
const EXCEPTION: &[&str] = &[
    "Unhandled exception in a kernel-mode driver",
    "Incompatible or outdated driver",
    "Faulty RAM",
];
const BAD_REFERENCE: &[&str] = &[
    "Driver referenced invalid or freed memory",
    "Faulty RAM",
    "Antivirus or file system filter driver",
];
const FILTER: &[&str] = &["File system filter driver (antivirus, backup, encryption)"];
const VERIFIER: &[&str] = &["Driver Verifier caught a driver violating the rules"];
const POWER: &[&str] = &[
    "Driver did not complete a power IRP in time",
    "Outdated device driver",
];
const WATCHDOG: &[&str] = &[
    "Driver stuck at a raised IRQL or in an endless loop",
    "Graphics or storage driver timeout",
    "Firmware or hardware not responding",
];
const MANUAL: &[&str] = &["Crash initiated manually or by a live dump request"];
const UNKNOWN: &[&str] = &["Faulty or incompatible driver", "Hardware problem"];

/// Classify a bug-check for the report.
#[must_use]
pub fn assess(code: u32) -> Assessment {
    let (severity, likely_causes) = match code {
        0x124 | 0x9c | 0x80 => (Severity::Critical, HARDWARE),
        0x19 | 0xc2 | 0xc5 | 0x13a | 0xc1 | 0xd0 => (Severity::Critical, POOL),
        0x1a | 0x4e | 0x12b => (Severity::Critical, MEMORY_MANAGER),
        0x109 | 0x139 => (Severity::Critical, INTEGRITY),
        0xef | 0xf4 | 0xc000_021a => (Severity::Critical, CRITICAL_PROCESS),
        0x7b | 0xed | 0x7a | 0x77 => (Severity::Critical, STORAGE),
        0x0a | 0xd1 => (Severity::High, IRQL),
        0x1e | 0x7e | 0x8e | 0x1000_007e | 0x1000_008e | 0x3b => (Severity::High, EXCEPTION),
        0x50 | 0xd5 | 0xd6 | 0xcc | 0xcd => (Severity::High, BAD_REFERENCE),
        0xf5 => (Severity::High, FILTER),
        0xc4 | 0xc9 | 0xe6 => (Severity::High, VERIFIER),
        0x9f => (Severity::High, POWER),
        0x133 | 0x101 | 0x102 | 0xea | 0x1000_00ea | 0x116 | 0x117 => {
            (Severity::Medium, WATCHDOG)
        }
        0xe2 | 0xdead_dead | 0x161 | 0x1c8 => (Severity::Low, MANUAL),
        _ => (Severity::Medium, UNKNOWN),
    };

    Assessment {
        severity,
        likely_causes: likely_causes.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(code: u32, params: [u64; 4]) -> Validation {
        validate_parameters(code, &params, &AddressHeuristics::default())
    }

    #[test]
    fn irql_not_less_or_equal() {
        let ok = validate(0xd1, [0x28, 2, 0, 0xfffff806_2a6b1234]);
        assert!(ok.valid, "{:?}", ok.errors);

        let bad = validate(0xd1, [0x28, 0x40, 5, 0x1337]);
        assert!(!bad.valid);
        assert_eq!(bad.errors.len(), 3);
    }

    #[test]
    fn kmode_exception() {
        assert!(validate(0x1e, [0xc000_0005, 0xfffff803_1d4a2123, 0, 0x10]).valid);
        assert!(!validate(0x1e, [0, 0xfffff803_1d4a2123, 0, 0]).valid);
        assert!(!validate(0x1e, [0xc000_0005, 0x1234, 0, 0]).valid);
    }

    #[test]
    fn sub_codes() {
        assert!(validate(0xf5, [0x6a, 0xffffe001_12345678, 0, 0]).valid);
        assert!(!validate(0xf5, [0x1, 0, 0, 0]).valid);
        assert!(validate(0xc2, [0x7, 0x1097, 0, 0xffffe001_12345678]).valid);
        assert!(validate(0x133, [0, 0x501, 0x500, 0]).valid);
        assert!(!validate(0x133, [3, 0, 0, 0]).valid);
    }

    #[test]
    fn weak_bar() {
        assert!(validate(0x83, [1, 0, 0, 0]).valid);
        assert!(!validate(0x83, [0; 4]).valid);
        assert!(!validate(0x83, [0xffff_ffff; 4]).valid);
        // Manually initiated crashes have blank parameters.
        assert!(validate(0xe2, [0; 4]).valid);
    }

    #[test]
    fn assessment() {
        assert_eq!(assess(0x124).severity, Severity::Critical);
        assert_eq!(assess(0xd1).severity, Severity::High);
        assert_eq!(assess(0x133).severity, Severity::Medium);
        assert_eq!(assess(0xe2).severity, Severity::Low);
        assert!(!assess(0x1337).likely_causes.is_empty());
    }
}
