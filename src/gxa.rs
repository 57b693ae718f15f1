// Axel '0vercl0k' Souchet - May 30 2023
//! This contains types that are useful to manipulate
//! Guest Virtual Addresses ([`Gva`]) and Guest Physical Addresses ([`Gpa`]).
//! Because ultimately they are both [`u64`] under the hood, a lot of operations
//! apply to both [`Gva`] & [`Gpa`] ([`Gxa::page_align`], etc.) and those are
//! implemented into the parent trait [`Gxa`].
//!
//! The x86-64 paging constants live in [`paging`]; nothing else in the crate
//! should spell out a shift or a mask on its own.
//!
//! # Examples
//!
//! ```
//! use crashdump_triage::{Gva, Gxa};
//! let gva = Gva::new(1337);
//! let page_aligned_gva = gva.page_align();
//! let page_offset = gva.offset();
//! ```
use std::fmt::{self, Display};

use serde::{Serialize, Serializer};

use crate::pxe::Pfn;

/// Shifts and masks of the 4-level x86-64 paging structures.
pub mod paging {
    /// Size of a normal page.
    pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;
    pub const PAGE_SHIFT: u64 = 12;
    /// Bits 11:0.
    pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;
    /// Every table has 512 entries.
    pub const TABLE_INDEX_MASK: u64 = 0b1_1111_1111;
    /// Size of a page table entry.
    pub const PXE_SIZE: u64 = 8;
    pub const PT_SHIFT: u64 = 12;
    pub const PD_SHIFT: u64 = 21;
    pub const PDPT_SHIFT: u64 = 30;
    pub const PML4_SHIFT: u64 = 39;
    /// Offset bits of a 2MB page mapped by a PDE.
    pub const LARGE_PAGE_OFFSET_MASK: u64 = (1 << PD_SHIFT) - 1;
    /// Offset bits of a 1GB page mapped by a PDPTE.
    pub const HUGE_PAGE_OFFSET_MASK: u64 = (1 << PDPT_SHIFT) - 1;
    /// Bits 51:12 of a PXE hold the page frame number.
    pub const PFN_MASK: u64 = 0x000f_ffff_ffff_f000;
    /// Bit 0 of a PXE.
    pub const PRESENT_BIT: u64 = 1 << 0;
    /// Bit 7 of a PDPTE / PDE.
    pub const LARGE_PAGE_BIT: u64 = 1 << 7;
    /// Bit 11 of a PTE (software bit used by Windows).
    pub const TRANSITION_BIT: u64 = 1 << 11;

    /// Extract the table index for the level whose shift is `shift`.
    #[must_use]
    pub const fn table_index(addr: u64, shift: u64) -> u64 {
        (addr >> shift) & TABLE_INDEX_MASK
    }
}

/// The size of the page a translation ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageKind {
    /// 4KB.
    Normal,
    /// 2MB.
    Large,
    /// 1GB.
    Huge,
}

impl PageKind {
    /// Size of the page.
    #[must_use]
    pub const fn size(&self) -> u64 {
        match self {
            Self::Normal => paging::PAGE_SIZE,
            Self::Large => paging::LARGE_PAGE_OFFSET_MASK + 1,
            Self::Huge => paging::HUGE_PAGE_OFFSET_MASK + 1,
        }
    }

    /// Offset of `addr` inside a page of this size.
    #[must_use]
    pub const fn page_offset(&self, addr: u64) -> u64 {
        addr & (self.size() - 1)
    }
}

/// A bunch of useful methods to manipulate 64-bit addresses of
/// any kind.
pub trait Gxa: Sized + Default + Copy + From<u64> {
    /// Get the underlying [`u64`] out of it.
    fn u64(&self) -> u64;

    /// Get the page offset.
    fn offset(&self) -> u64 {
        self.u64() & paging::PAGE_OFFSET_MASK
    }

    /// Is it page aligned?
    #[must_use]
    fn page_aligned(&self) -> bool {
        self.offset() == 0
    }

    /// Page-align it.
    #[must_use]
    fn page_align(&self) -> Self {
        Self::from(self.u64() & !paging::PAGE_OFFSET_MASK)
    }

    /// Get the next aligned page, `None` if it overflows.
    #[must_use]
    fn next_aligned_page(self) -> Option<Self> {
        self.page_align()
            .u64()
            .checked_add(paging::PAGE_SIZE)
            .map(Self::from)
    }
}

/// Strong type for Guest Physical Addresses.
///
/// # Examples
///
/// ```
/// # use crashdump_triage::{Gxa, Gpa};
/// let gpa = Gpa::new(0x1337_123);
/// assert_eq!(gpa.offset(), 0x123);
/// assert_eq!(gpa.page_aligned(), false);
/// let aligned_gpa = gpa.page_align();
/// assert_eq!(aligned_gpa.u64(), 0x1337_000);
/// assert_eq!(gpa.next_aligned_page().unwrap().u64(), 0x1338_000);
/// ```
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Default, PartialOrd, Ord)]
pub struct Gpa(u64);

impl Gpa {
    /// Create a new [`Gpa`].
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a new [`Gpa`] from a Page Frame Number or PFN.
    ///
    /// # Examples
    ///
    /// ```
    /// # use crashdump_triage::{Gxa, Gpa, Pfn};
    /// let gpa = Gpa::from_pfn(Pfn::new(0x1337));
    /// assert_eq!(gpa.u64(), 0x1337_000);
    /// ```
    #[must_use]
    pub const fn from_pfn(pfn: Pfn) -> Self {
        Self(pfn.u64() << paging::PAGE_SHIFT)
    }

    /// Get the Page Frame Number from a [`Gpa`].
    #[must_use]
    pub const fn pfn(&self) -> u64 {
        self.0 >> paging::PAGE_SHIFT
    }
}

impl Gxa for Gpa {
    fn u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Gpa {
    fn from(value: u64) -> Self {
        Gpa(value)
    }
}

impl From<Gpa> for u64 {
    fn from(value: Gpa) -> Self {
        value.0
    }
}

impl Display for Gpa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPA:{:#x}", self.0)
    }
}

/// Strong type for Guest Virtual Addresses.
///
/// # Examples
///
/// ```
/// # use crashdump_triage::{Gxa, Gva};
/// let gva = Gva::new(0x1337_fff);
/// assert_eq!(gva.offset(), 0xfff);
/// assert_eq!(gva.page_align().u64(), 0x1337_000);
/// ```
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Default, PartialOrd, Ord)]
pub struct Gva(u64);

impl Gva {
    /// Create a new [`Gva`].
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the PTE index of the [`Gva`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use crashdump_triage::Gva;
    /// let first = Gva::new(0xff_ff_b9_dc_ee_77_31_37);
    /// assert_eq!(first.pte_idx(), 371);
    /// let second = Gva::new(0xff_ff_11_22_33_44_55_66);
    /// assert_eq!(second.pte_idx(), 0x45);
    /// ```
    #[must_use]
    pub const fn pte_idx(&self) -> u64 {
        paging::table_index(self.0, paging::PT_SHIFT)
    }

    /// Get the PDE index of the [`Gva`].
    #[must_use]
    pub const fn pde_idx(&self) -> u64 {
        paging::table_index(self.0, paging::PD_SHIFT)
    }

    /// Get the PDPE index of the [`Gva`].
    #[must_use]
    pub const fn pdpe_idx(&self) -> u64 {
        paging::table_index(self.0, paging::PDPT_SHIFT)
    }

    /// Get the PML4 index of the [`Gva`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use crashdump_triage::Gva;
    /// let second = Gva::new(0xff_ff_11_22_33_44_55_66);
    /// assert_eq!(second.pml4e_idx(), 0x22);
    /// ```
    #[must_use]
    pub const fn pml4e_idx(&self) -> u64 {
        paging::table_index(self.0, paging::PML4_SHIFT)
    }
}

impl Gxa for Gva {
    fn u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Gva {
    fn from(value: u64) -> Self {
        Gva(value)
    }
}

impl From<Gva> for u64 {
    fn from(value: Gva) -> Self {
        value.0
    }
}

impl Display for Gva {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gva:{:#x}", self.0)
    }
}

// Addresses end up in reports as plain integers.
impl Serialize for Gva {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl Serialize for Gpa {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}
