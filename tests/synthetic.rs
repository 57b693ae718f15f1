// Axel '0vercl0k' Souchet - October 14 2026
mod common;

use common::*;
use crashdump_triage::{
    analyze, analyze_with, is_legitimate_module_name, AddressTranslator, AnalysisConfig,
    BinaryReader, CorruptionKind, DumpSignature, FormatError, FrameSource, Gpa, Gva, Gxa, PageKind,
    PhysicalMemory, PxeKind, Strategy, TranslationFailure,
};

#[test]
fn formats() {
    for (magic, signature) in [
        (&b"MDMP\x93\xa7\0\0"[..], DumpSignature::Minidump),
        (&b"PAGEDU64"[..], DumpSignature::KernelDump64),
        (&b"PAGEDUMP"[..], DumpSignature::KernelDumpLegacy),
    ] {
        let data = with_magic(magic, 0x2000);
        let report = analyze(&data).unwrap();
        assert_eq!(report.signature, signature);
        assert_eq!(report.header.signature, signature);
    }

    assert_eq!(analyze(b"PAGEDU64"), Err(FormatError::TooSmall(8)));
    assert_eq!(analyze(&[]), Err(FormatError::TooSmall(0)));
}

#[test]
fn not_a_dump() {
    let png = with_magic(b"\x89PNG\r\n\x1a\n", 0x100);
    let err = analyze(&png).unwrap_err();
    assert_eq!(err.detected_kind(), Some("PNG"));
    assert!(err.to_string().contains("PNG"));

    let garbage = with_magic(b"\x7fELF", 0x100);
    assert!(matches!(analyze(&garbage), Err(FormatError::Unrecognized(_))));
}

#[test]
fn kernel_bugcheck() {
    let dump = KernelDump::new().bugcheck(0x1e, [0xc000_0005, KERNEL_ADDRESS, 0, 0x10]);
    let report = analyze(&dump.data).unwrap();
    let bug_check = report.bug_check.unwrap();

    assert_eq!(bug_check.code, 0x1e);
    assert_eq!(bug_check.name, Some("KMODE_EXCEPTION_NOT_HANDLED"));
    assert_eq!(bug_check.parameters, [0xc000_0005, KERNEL_ADDRESS, 0, 0x10]);
    assert_eq!(bug_check.strategy, Strategy::StructuredOffset);
    assert_eq!(bug_check.offset, 0x38);
    assert_eq!(report.header.major_version, 15);
    assert_eq!(report.header.directory_table_base, Some(DTB));
}

#[test]
fn fake_bugcheck_is_rejected() {
    let text = b"*** STOP: 0x000065F4 (0x00000000,0x00000000,0x00000000,0x00000000)";
    let dump = KernelDump::new()
        .bugcheck(0x65f4, [0xc000_0005, KERNEL_ADDRESS, 0, 0x10])
        .bytes(0x2400, text);
    let report = analyze(&dump.data).unwrap();

    assert_eq!(report.bug_check, None);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.component == "bugcheck" && w.message.contains("fake")));
}

#[test]
fn minidump_breakpoint_carries_the_bugcheck() {
    let data = minidump_with_exception(0x8000_0003, &[0x1e, 0xc000_0005, KERNEL_ADDRESS, 0, 0]);
    let report = analyze(&data).unwrap();
    let bug_check = report.bug_check.unwrap();

    assert_eq!(bug_check.code, 0x1e);
    assert_eq!(bug_check.name, Some("KMODE_EXCEPTION_NOT_HANDLED"));
    assert_eq!(bug_check.strategy, Strategy::ExceptionStream);
    assert_eq!(bug_check.parameters, [0xc000_0005, KERNEL_ADDRESS, 0, 0]);

    let exception = report.exception.unwrap();
    assert_eq!(exception.code, 0x8000_0003);
    assert_eq!(exception.name, Some("STATUS_BREAKPOINT"));
    assert_eq!(exception.thread_id, Some(0x1337));
}

#[test]
fn translation() {
    let mut dump = KernelDump::new();
    let large = Gva::new(STACK_GVA + 0x20_0000);
    set_u64(
        &mut dump.data,
        PD + large.pde_idx() * 8,
        0x20_0000 | LARGE_PAGE | PRESENT_RW,
    );

    let physmem = PhysicalMemory::flat();
    let translator =
        AddressTranslator::new(BinaryReader::new(&dump.data), &physmem, Gpa::new(DTB));

    let present = translator.translate(Gva::new(STACK_GVA + 0x10)).unwrap();
    assert_eq!(present.page_kind, PageKind::Normal);
    assert_eq!(present.gpa(), Gpa::new(STACK_PAGE + 0x10));
    assert!(present.writable);

    let missing = Gva::new(STACK_GVA + 0x1000);
    assert_eq!(
        translator.translate(missing),
        Err(TranslationFailure::NotPresent {
            gva: missing,
            level: PxeKind::Pte
        })
    );

    let translation = translator.translate(Gva::new(large.u64() + 0x1234)).unwrap();
    assert_eq!(translation.page_kind, PageKind::Large);
    assert_eq!(translation.gpa(), Gpa::new(0x20_2234));
}

#[test]
fn module_names() {
    assert!(!is_legitimate_module_name("wxr.sys"));
    assert!(!is_legitimate_module_name("fake.sys"));
    assert!(is_legitimate_module_name("ntoskrnl.exe"));
    assert!(is_legitimate_module_name("nvlddmkm.sys"));

    let dump = KernelDump::new()
        .bytes(0x2400, b"blabla wxr.sys crashed\0")
        .bytes(0x2500, br"\SystemRoot\system32\ntoskrnl.exe");
    let report = analyze(&dump.data).unwrap();
    let names = report
        .modules
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>();

    assert!(names.contains(&"ntoskrnl.exe"));
    assert!(!names.contains(&"wxr.sys"));
}

#[test]
fn frame_pointer_cycle() {
    let rbp = STACK_GVA + 0x100;
    let next = STACK_GVA + 0x200;
    let ret1 = 0xfffff803_1d4a3000;
    let ret2 = 0xfffff803_1d4a4000;
    let dump = KernelDump::new()
        .context(KERNEL_ADDRESS, STACK_GVA + 0x80, rbp)
        .frame(rbp, next, ret1)
        .frame(next, rbp, ret2);
    let report = analyze(&dump.data).unwrap();

    let context = report.thread_context.unwrap();
    assert_eq!(context.rip, KERNEL_ADDRESS);
    assert_eq!(context.rbp, rbp);

    let addresses = report
        .stack
        .iter()
        .map(|f| f.address)
        .collect::<Vec<_>>();
    assert_eq!(addresses, [Some(KERNEL_ADDRESS), Some(ret1), Some(ret2)]);
    assert!(report
        .stack
        .iter()
        .all(|f| f.source == FrameSource::FramePointer));

    assert!(report.corruption.iter().any(|c| {
        c.kind == CorruptionKind::StackCorruption && c.offset == STACK_PAGE + 0x100
    }));
}

#[test]
fn stack_from_text() {
    let text = b"nt!KeBugCheckEx+0x107 nvlddmkm.sys nt!KiPageFault+0x42e";
    let dump = KernelDump::new().bytes(0x2400, text);
    let report = analyze(&dump.data).unwrap();

    assert_eq!(report.thread_context, None);
    assert!(!report.stack.is_empty());
    assert!(report
        .stack
        .iter()
        .all(|f| f.source == FrameSource::PatternScan && f.address.is_none()));
    assert!(report
        .stack
        .iter()
        .any(|f| f.symbol.as_deref() == Some("nt!KeBugCheckEx+0x107")));
}

#[test]
fn freed_memory() {
    let fill = 0xfeee_feeeu32.to_le_bytes().repeat(16);
    let dump = KernelDump::new().bytes(0x2800, &fill);
    let report = analyze(&dump.data).unwrap();

    let uaf = report
        .corruption
        .iter()
        .find(|c| c.kind == CorruptionKind::UseAfterFree)
        .unwrap();
    assert_eq!(uaf.offset, 0x2800);
    assert!(uaf.confidence > 60);
}

#[test]
fn corruption_is_capped_once() {
    let rbp = STACK_GVA + 0x100;
    let next = STACK_GVA + 0x200;
    let fill = 0xfeee_feeeu32.to_le_bytes().repeat(16);
    let dump = KernelDump::new()
        .context(KERNEL_ADDRESS, STACK_GVA + 0x80, rbp)
        .frame(rbp, next, 0xfffff803_1d4a3000)
        .frame(next, rbp, 0xfffff803_1d4a4000)
        .bytes(0x2800, &fill)
        .bytes(0x2900, &fill);
    let config = AnalysisConfig {
        max_findings: 2,
        ..Default::default()
    };
    let report = analyze_with(&dump.data, &config).unwrap();

    // The stack finding sorts last and is the one that doesn't make the cut.
    let offsets = report
        .corruption
        .iter()
        .map(|c| c.offset)
        .collect::<Vec<_>>();
    assert_eq!(offsets, [0x2800, 0x2900]);
    assert_eq!(
        report
            .warnings
            .iter()
            .filter(|w| w.component == "corruption")
            .count(),
        1
    );
}

#[test]
fn out_of_time_still_reports() {
    let dump = KernelDump::new().bugcheck(0x1e, [0xc000_0005, KERNEL_ADDRESS, 0, 0x10]);
    let config = AnalysisConfig {
        time_budget_ms: Some(0),
        ..Default::default()
    };
    let report = analyze_with(&dump.data, &config).unwrap();

    assert_eq!(report.signature, DumpSignature::KernelDump64);
    assert_eq!(report.bug_check.map(|b| b.code), Some(0x1e));
}

#[test]
fn deterministic() {
    let dump = KernelDump::new()
        .bugcheck(0x1e, [0xc000_0005, KERNEL_ADDRESS, 0, 0x10])
        .context(KERNEL_ADDRESS, STACK_GVA + 0x80, STACK_GVA + 0x100)
        .frame(STACK_GVA + 0x100, 0, 0xfffff803_1d4a3000)
        .bytes(0x2400, br"\SystemRoot\system32\ntoskrnl.exe");

    let first = analyze(&dump.data).unwrap();
    let second = analyze(&dump.data).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
