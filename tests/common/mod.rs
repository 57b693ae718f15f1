// Axel '0vercl0k' Souchet - October 14 2026
//! Builders for small synthetic crash-dumps.
#![allow(dead_code)]

use crashdump_triage::Gva;

pub const KERNEL_ADDRESS: u64 = 0xfffff803_1d4a2123;
pub const PRESENT_RW: u64 = 0b11;
/// `PS` bit of a PDE / PDPTE.
pub const LARGE_PAGE: u64 = 1 << 7;

/// Where the page tables of [`KernelDump`] live; the physical memory is flat
/// so these are file offsets too.
pub const DTB: u64 = 0x3000;
pub const PDPT: u64 = 0x4000;
pub const PD: u64 = 0x5000;
pub const PT: u64 = 0x6000;
pub const STACK_PAGE: u64 = 0x7000;
/// Virtual address of the stack page.
pub const STACK_GVA: u64 = 0xfffff803_2000_1000;

pub fn set_u32(data: &mut [u8], offset: u64, value: u32) {
    let offset = offset as usize;
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn set_u64(data: &mut [u8], offset: u64, value: u64) {
    let offset = offset as usize;
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn set_bytes(data: &mut [u8], offset: u64, bytes: &[u8]) {
    let offset = offset as usize;
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// A buffer that starts with `magic`.
pub fn with_magic(magic: &[u8], len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[..magic.len()].copy_from_slice(magic);

    data
}

/// A `PAGEDU64` dump without physical memory runs (so its physical memory is
/// a flat image of the file) whose page tables map one stack page.
pub struct KernelDump {
    pub data: Vec<u8>,
}

impl KernelDump {
    pub fn new() -> Self {
        let mut data = with_magic(b"PAGEDU64", 0x8000);
        set_u32(&mut data, 0x8, 15);
        set_u32(&mut data, 0xc, 19_041);
        set_u64(&mut data, 0x10, DTB);
        set_u32(&mut data, 0x30, 0x8664);
        set_u32(&mut data, 0x34, 4);

        let mut dump = Self { data };
        dump.map(Gva::new(STACK_GVA), STACK_PAGE);

        dump
    }

    /// Map the 4KB page at `gva` to the physical page `gpa`.
    pub fn map(&mut self, gva: Gva, gpa: u64) {
        let data = &mut self.data;
        set_u64(data, DTB + gva.pml4e_idx() * 8, PDPT | PRESENT_RW);
        set_u64(data, PDPT + gva.pdpe_idx() * 8, PD | PRESENT_RW);
        set_u64(data, PD + gva.pde_idx() * 8, PT | PRESENT_RW);
        set_u64(data, PT + gva.pte_idx() * 8, gpa | PRESENT_RW);
    }

    pub fn bugcheck(mut self, code: u32, parameters: [u64; 4]) -> Self {
        set_u32(&mut self.data, 0x38, code);
        for (idx, p) in parameters.iter().enumerate() {
            set_u64(&mut self.data, 0x40 + idx as u64 * 8, *p);
        }

        self
    }

    /// Fill the `CONTEXT` embedded in the header.
    pub fn context(mut self, rip: u64, rsp: u64, rbp: u64) -> Self {
        set_u64(&mut self.data, 0x348 + 0x98, rsp);
        set_u64(&mut self.data, 0x348 + 0xa0, rbp);
        set_u64(&mut self.data, 0x348 + 0xf8, rip);

        self
    }

    /// Write a frame (saved frame pointer, then return address) at `gva`
    /// which has to be in the stack page.
    pub fn frame(mut self, gva: u64, saved_rbp: u64, ret: u64) -> Self {
        let offset = STACK_PAGE + (gva - STACK_GVA);
        set_u64(&mut self.data, offset, saved_rbp);
        set_u64(&mut self.data, offset + 8, ret);

        self
    }

    pub fn bytes(mut self, offset: u64, bytes: &[u8]) -> Self {
        set_bytes(&mut self.data, offset, bytes);

        self
    }
}

/// A minidump with a single exception stream whose record carries `code` and
/// `parameters`.
pub fn minidump_with_exception(code: u32, parameters: &[u64]) -> Vec<u8> {
    let mut data = with_magic(b"MDMP", 0x400);
    // Signature version, number of streams, directory rva.
    set_u32(&mut data, 0x4, 0xa793);
    set_u32(&mut data, 0x8, 1);
    set_u32(&mut data, 0xc, 0x20);

    // The directory: type, size, rva.
    set_u32(&mut data, 0x20, 6);
    set_u32(&mut data, 0x24, 0xa8);
    set_u32(&mut data, 0x28, 0x40);

    // The exception stream: thread id, alignment, then the record.
    set_u32(&mut data, 0x40, 0x1337);
    set_u32(&mut data, 0x48, code);
    set_u64(&mut data, 0x58, KERNEL_ADDRESS);
    set_u32(&mut data, 0x60, parameters.len() as u32);
    for (idx, p) in parameters.iter().enumerate() {
        set_u64(&mut data, 0x68 + idx as u64 * 8, *p);
    }

    data
}
