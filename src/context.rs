// Axel '0vercl0k' Souchet - October 9 2026
//! Faulting thread register state and exception record.
use serde::Serialize;
use tracing::debug;

use crate::error::{ReadError, ValidationWarning};
use crate::header::ParsedDump;
use crate::streams::StreamLocation;
use crate::structs::{
    context32, context64, header32, header64, ExceptionRecord32, ExceptionRecord64,
    ExceptionStream, ThreadEntry, STREAM_TYPE_EXCEPTION, STREAM_TYPE_THREAD_LIST,
};
use crate::{BinaryReader, DumpSignature};

/// Thread lists claiming more threads than this are bogus.
const MAX_THREADS: u32 = 0x1_0000;

/// The registers the stack walk needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreadContext {
    /// Kernel dumps embed a context without saying which thread it belongs
    /// to.
    pub thread_id: Option<u32>,
    pub rip: u64,
    pub rsp: u64,
    pub rbp: u64,
    /// Page tables to walk instead of the header's CR3. Never filled by the
    /// extraction; callers that know better set it.
    pub cr3_override: Option<u64>,
    pub priority: Option<u32>,
}

/// The exception that was being dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionInfo {
    pub code: u32,
    pub name: Option<&'static str>,
    pub address: u64,
    pub parameters: Vec<u64>,
    pub thread_id: Option<u32>,
}

static EXCEPTION_NAMES: &[(u32, &str)] = &[
    (0x4000_0015, "STATUS_FATAL_APP_EXIT"),
    (0x8000_0002, "STATUS_DATATYPE_MISALIGNMENT"),
    (0x8000_0003, "STATUS_BREAKPOINT"),
    (0x8000_0004, "STATUS_SINGLE_STEP"),
    (0xc000_0005, "STATUS_ACCESS_VIOLATION"),
    (0xc000_0006, "STATUS_IN_PAGE_ERROR"),
    (0xc000_0008, "STATUS_INVALID_HANDLE"),
    (0xc000_000d, "STATUS_INVALID_PARAMETER"),
    (0xc000_0017, "STATUS_NO_MEMORY"),
    (0xc000_001d, "STATUS_ILLEGAL_INSTRUCTION"),
    (0xc000_0025, "STATUS_NONCONTINUABLE_EXCEPTION"),
    (0xc000_0026, "STATUS_INVALID_DISPOSITION"),
    (0xc000_008c, "STATUS_ARRAY_BOUNDS_EXCEEDED"),
    (0xc000_008d, "STATUS_FLOAT_DENORMAL_OPERAND"),
    (0xc000_008e, "STATUS_FLOAT_DIVIDE_BY_ZERO"),
    (0xc000_008f, "STATUS_FLOAT_INEXACT_RESULT"),
    (0xc000_0090, "STATUS_FLOAT_INVALID_OPERATION"),
    (0xc000_0091, "STATUS_FLOAT_OVERFLOW"),
    (0xc000_0092, "STATUS_FLOAT_STACK_CHECK"),
    (0xc000_0093, "STATUS_FLOAT_UNDERFLOW"),
    (0xc000_0094, "STATUS_INTEGER_DIVIDE_BY_ZERO"),
    (0xc000_0095, "STATUS_INTEGER_OVERFLOW"),
    (0xc000_0096, "STATUS_PRIVILEGED_INSTRUCTION"),
    (0xc000_00fd, "STATUS_STACK_OVERFLOW"),
    (0xc000_0135, "STATUS_DLL_NOT_FOUND"),
    (0xc000_0142, "STATUS_DLL_INIT_FAILED"),
    (0xc000_0374, "STATUS_HEAP_CORRUPTION"),
    (0xc000_0409, "STATUS_STACK_BUFFER_OVERRUN"),
    (0xc000_0417, "STATUS_INVALID_CRUNTIME_PARAMETER"),
    (0xc000_041d, "STATUS_FATAL_USER_CALLBACK_EXCEPTION"),
    (0xc000_0420, "STATUS_ASSERTION_FAILURE"),
    (0xe06d_7363, "CPP_EH_EXCEPTION"),
];

/// Name of an exception code.
#[must_use]
pub fn exception_name(code: u32) -> Option<&'static str> {
    EXCEPTION_NAMES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|idx| EXCEPTION_NAMES[idx].1)
}

/// Read the registers out of a `CONTEXT` at `offset`.
fn read_context(
    reader: &BinaryReader,
    offset: u64,
    wide: bool,
) -> Result<(u64, u64, u64), ReadError> {
    if wide {
        Ok((
            reader.read_u64(offset + context64::RIP)?,
            reader.read_u64(offset + context64::RSP)?,
            reader.read_u64(offset + context64::RBP)?,
        ))
    } else {
        Ok((
            reader.read_u32(offset + context32::EIP)?.into(),
            reader.read_u32(offset + context32::ESP)?.into(),
            reader.read_u32(offset + context32::EBP)?.into(),
        ))
    }
}

impl ThreadContext {
    fn new(rip: u64, rsp: u64, rbp: u64) -> Self {
        Self {
            thread_id: None,
            rip,
            rsp,
            rbp,
            cr3_override: None,
            priority: None,
        }
    }

    /// A zeroed context means there is nothing there.
    fn is_empty(&self) -> bool {
        self.rip == 0 && self.rsp == 0
    }
}

/// Get the register state of the thread that crashed: the context embedded
/// in a kernel dump header, or the context of the exception stream (falling
/// back on the first thread of the thread list) of a minidump.
pub fn extract_thread_context(
    dump: &ParsedDump,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<ThreadContext> {
    let reader = &dump.reader;
    let context = match dump.signature() {
        DumpSignature::KernelDump64 => {
            read_context(reader, header64::CONTEXT_RECORD, true).map(|(rip, rsp, rbp)| {
                Some(ThreadContext::new(rip, rsp, rbp))
            })
        }
        DumpSignature::KernelDumpLegacy => {
            read_context(reader, header32::CONTEXT_RECORD, false).map(|(rip, rsp, rbp)| {
                Some(ThreadContext::new(rip, rsp, rbp))
            })
        }
        DumpSignature::Minidump => Ok(minidump_context(dump, warnings)),
    };

    let context = match context {
        Ok(context) => context?,
        Err(e) => {
            warnings.push(ValidationWarning::new(
                "context",
                format!("the context record is truncated: {e}"),
            ));
            return None;
        }
    };

    if context.is_empty() {
        debug!("the context is zeroed");
        warnings.push(ValidationWarning::new("context", "the context record is empty"));
        return None;
    }

    Some(context)
}

fn context_at(
    dump: &ParsedDump,
    location: StreamLocation,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<ThreadContext> {
    let wide = dump.header.is_64bit();
    let needed = if wide { context64::SIZE } else { context32::SIZE };
    if u64::from(location.size) < needed {
        warnings.push(ValidationWarning::new(
            "context",
            format!(
                "thread context at {:#x} is too small ({:#x} bytes)",
                location.rva, location.size
            ),
        ));
        return None;
    }

    match read_context(&dump.reader, location.rva.into(), wide) {
        Ok((rip, rsp, rbp)) => Some(ThreadContext::new(rip, rsp, rbp)),
        Err(e) => {
            warnings.push(ValidationWarning::new(
                "context",
                format!("thread context is truncated: {e}"),
            ));
            None
        }
    }
}

/// Every entry of the `ThreadListStream`.
fn threads(dump: &ParsedDump) -> Vec<ThreadEntry> {
    let Some(location) = dump.streams.get(STREAM_TYPE_THREAD_LIST) else {
        return Vec::new();
    };

    let offset = u64::from(location.rva);
    let Ok(count) = dump.reader.read_u32(offset) else {
        return Vec::new();
    };

    (0..u64::from(count.min(MAX_THREADS)))
        .map_while(|idx| ThreadEntry::parse(&dump.reader, offset + 4 + idx * ThreadEntry::SIZE).ok())
        .collect()
}

fn minidump_context(
    dump: &ParsedDump,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<ThreadContext> {
    let threads = threads(dump);
    let exception = dump
        .streams
        .get(STREAM_TYPE_EXCEPTION)
        .and_then(|location| ExceptionStream::parse(&dump.reader, location.rva.into()).ok());

    if let Some(exception) = exception {
        let mut context = context_at(dump, exception.thread_context.into(), warnings)?;
        context.thread_id = Some(exception.thread_id);
        context.priority = threads
            .iter()
            .find(|t| t.thread_id == exception.thread_id)
            .map(|t| t.priority);

        return Some(context);
    }

    let thread = threads.first()?;
    debug!("no exception stream, using thread {}", thread.thread_id);
    let mut context = context_at(dump, thread.thread_context.into(), warnings)?;
    context.thread_id = Some(thread.thread_id);
    context.priority = Some(thread.priority);

    Some(context)
}

/// Get the exception record: the one of the kernel dump header, or the one of
/// the minidump exception stream. Empty records are absent.
pub fn extract_exception(
    dump: &ParsedDump,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<ExceptionInfo> {
    let reader = &dump.reader;
    let exception = match dump.signature() {
        DumpSignature::KernelDump64 => {
            ExceptionRecord64::parse(reader, header64::EXCEPTION_RECORD).map(|record| {
                ExceptionInfo {
                    code: record.exception_code,
                    name: exception_name(record.exception_code),
                    address: record.exception_address,
                    parameters: record.parameters().to_vec(),
                    thread_id: None,
                }
            })
        }
        DumpSignature::KernelDumpLegacy => {
            ExceptionRecord32::parse(reader, header32::EXCEPTION_RECORD).map(|record| {
                ExceptionInfo {
                    code: record.exception_code,
                    name: exception_name(record.exception_code),
                    address: record.exception_address.into(),
                    parameters: record.parameters().iter().copied().map(u64::from).collect(),
                    thread_id: None,
                }
            })
        }
        DumpSignature::Minidump => {
            let location = dump.streams.get(STREAM_TYPE_EXCEPTION)?;
            ExceptionStream::parse(reader, location.rva.into()).map(|stream| {
                let record = stream.exception_record;
                ExceptionInfo {
                    code: record.exception_code,
                    name: exception_name(record.exception_code),
                    address: record.exception_address,
                    parameters: record.parameters().to_vec(),
                    thread_id: Some(stream.thread_id),
                }
            })
        }
    };

    match exception {
        Ok(exception) if exception.code == 0 => None,
        Ok(exception) => Some(exception),
        Err(e) => {
            warnings.push(ValidationWarning::new(
                "exception",
                format!("the exception record is truncated: {e}"),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MACHINE_I386;
    use crate::structs::STREAM_TYPE_SYSTEM_INFO;

    #[test]
    fn names_are_sorted() {
        assert!(EXCEPTION_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(exception_name(0xc000_0005), Some("STATUS_ACCESS_VIOLATION"));
        assert_eq!(exception_name(0x1337), None);
    }

    fn kernel64() -> Vec<u8> {
        let mut data = vec![0u8; 0x2000];
        data[0..8].copy_from_slice(b"PAGEDU64");
        data[8..12].copy_from_slice(&15u32.to_le_bytes());
        let ctx = header64::CONTEXT_RECORD as usize;
        data[ctx + 0xf8..ctx + 0x100].copy_from_slice(&0xfffff803_1d4a2123u64.to_le_bytes());
        data[ctx + 0x98..ctx + 0xa0].copy_from_slice(&0xfffff803_20001000u64.to_le_bytes());
        data[ctx + 0xa0..ctx + 0xa8].copy_from_slice(&0xfffff803_20001100u64.to_le_bytes());
        let exc = header64::EXCEPTION_RECORD as usize;
        data[exc..exc + 4].copy_from_slice(&0xc000_0005u32.to_le_bytes());
        data[exc + 0x10..exc + 0x18].copy_from_slice(&0xfffff803_1d4a2123u64.to_le_bytes());
        data[exc + 0x18..exc + 0x1c].copy_from_slice(&2u32.to_le_bytes());
        data[exc + 0x20..exc + 0x28].copy_from_slice(&1u64.to_le_bytes());
        data[exc + 0x28..exc + 0x30].copy_from_slice(&0x10u64.to_le_bytes());

        data
    }

    fn parse(data: &[u8]) -> ParsedDump<'_> {
        let reader = BinaryReader::new(data);
        let signature = crate::detect_format(data).unwrap();
        ParsedDump::parse(reader, signature, &mut Vec::new()).unwrap()
    }

    #[test]
    fn kernel_dump() {
        let data = kernel64();
        let dump = parse(&data);
        let mut warnings = Vec::new();
        let context = extract_thread_context(&dump, &mut warnings).unwrap();
        assert_eq!(context.rip, 0xfffff803_1d4a2123);
        assert_eq!(context.rsp, 0xfffff803_20001000);
        assert_eq!(context.rbp, 0xfffff803_20001100);
        assert_eq!(context.thread_id, None);

        let exception = extract_exception(&dump, &mut warnings).unwrap();
        assert_eq!(exception.code, 0xc000_0005);
        assert_eq!(exception.name, Some("STATUS_ACCESS_VIOLATION"));
        assert_eq!(exception.parameters, [1, 0x10]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn empty_records_are_absent() {
        let mut data = vec![0u8; 0x2000];
        data[0..8].copy_from_slice(b"PAGEDU64");
        let dump = parse(&data);
        let mut warnings = Vec::new();
        assert_eq!(extract_thread_context(&dump, &mut warnings), None);
        assert_eq!(extract_exception(&dump, &mut warnings), None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn truncated_kernel_dump() {
        let mut data = kernel64();
        data.truncate(0x400);
        let dump = parse(&data);
        let mut warnings = Vec::new();
        assert_eq!(extract_thread_context(&dump, &mut warnings), None);
        assert_eq!(extract_exception(&dump, &mut warnings), None);
        assert_eq!(warnings.len(), 2);
    }

    /// A 32-bit minidump with a system info stream, a thread list and an
    /// optional exception stream.
    fn minidump(with_exception: bool) -> Vec<u8> {
        let mut data = vec![0u8; 0x1000];
        data[0..4].copy_from_slice(b"MDMP");
        let streams: &[(u32, u32, u32)] = if with_exception {
            &[
                (STREAM_TYPE_SYSTEM_INFO, 0x38, 0x100),
                (STREAM_TYPE_THREAD_LIST, 4 + 2 * 48, 0x200),
                (STREAM_TYPE_EXCEPTION, 0xa8, 0x300),
            ]
        } else {
            &[
                (STREAM_TYPE_SYSTEM_INFO, 0x38, 0x100),
                (STREAM_TYPE_THREAD_LIST, 4 + 2 * 48, 0x200),
            ]
        };
        data[8..12].copy_from_slice(&(streams.len() as u32).to_le_bytes());
        data[12..16].copy_from_slice(&0x20u32.to_le_bytes());
        for (idx, (ty, size, rva)) in streams.iter().enumerate() {
            let off = 0x20 + idx * 12;
            data[off..off + 4].copy_from_slice(&ty.to_le_bytes());
            data[off + 4..off + 8].copy_from_slice(&size.to_le_bytes());
            data[off + 8..off + 12].copy_from_slice(&rva.to_le_bytes());
        }

        // x86.
        data[0x100..0x102].copy_from_slice(&0u16.to_le_bytes());

        // Two threads, with their context at 0x400 and 0x700.
        data[0x200..0x204].copy_from_slice(&2u32.to_le_bytes());
        for (idx, (tid, ctx)) in [(0x10u32, 0x400u32), (0x20, 0x700)].iter().enumerate() {
            let entry = 0x204 + idx * 48;
            data[entry..entry + 4].copy_from_slice(&tid.to_le_bytes());
            data[entry + 0xc..entry + 0x10].copy_from_slice(&(8 + idx as u32).to_le_bytes());
            data[entry + 0x28..entry + 0x2c].copy_from_slice(&(context32::SIZE as u32).to_le_bytes());
            data[entry + 0x2c..entry + 0x30].copy_from_slice(&ctx.to_le_bytes());
            let ctx = *ctx as usize;
            data[ctx + 0xb8..ctx + 0xbc].copy_from_slice(&(0x7700_1000 + idx as u32).to_le_bytes());
            data[ctx + 0xc4..ctx + 0xc8].copy_from_slice(&0x0012_f000u32.to_le_bytes());
            data[ctx + 0xb4..ctx + 0xb8].copy_from_slice(&0x0012_f100u32.to_le_bytes());
        }

        // The exception happened on the second thread.
        data[0x300..0x304].copy_from_slice(&0x20u32.to_le_bytes());
        data[0x308..0x30c].copy_from_slice(&0xc000_0374u32.to_le_bytes());
        data[0x318..0x320].copy_from_slice(&0x7700_1001u64.to_le_bytes());
        data[0x3a0..0x3a4].copy_from_slice(&(context32::SIZE as u32).to_le_bytes());
        data[0x3a4..0x3a8].copy_from_slice(&0x700u32.to_le_bytes());

        data
    }

    #[test]
    fn minidump_exception_thread() {
        let data = minidump(true);
        let dump = parse(&data);
        assert_eq!(dump.header.machine_type, Some(MACHINE_I386));
        let mut warnings = Vec::new();
        let context = extract_thread_context(&dump, &mut warnings).unwrap();
        assert_eq!(context.thread_id, Some(0x20));
        assert_eq!(context.rip, 0x7700_1001);
        assert_eq!(context.rsp, 0x0012_f000);
        assert_eq!(context.rbp, 0x0012_f100);
        assert_eq!(context.priority, Some(9));

        let exception = extract_exception(&dump, &mut warnings).unwrap();
        assert_eq!(exception.name, Some("STATUS_HEAP_CORRUPTION"));
        assert_eq!(exception.thread_id, Some(0x20));
        assert_eq!(exception.address, 0x7700_1001);
        assert!(warnings.is_empty());
    }

    #[test]
    fn minidump_first_thread() {
        let data = minidump(false);
        let dump = parse(&data);
        let mut warnings = Vec::new();
        let context = extract_thread_context(&dump, &mut warnings).unwrap();
        assert_eq!(context.thread_id, Some(0x10));
        assert_eq!(context.rip, 0x7700_1000);
        assert_eq!(context.priority, Some(8));
        assert_eq!(extract_exception(&dump, &mut warnings), None);
        assert!(warnings.is_empty());
    }
}
