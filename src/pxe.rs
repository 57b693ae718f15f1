// Axel '0vercl0k' Souchet - June 5 2023
//! This defines [`Pxe`] / [`Pfn`] types that makes it easier to manipulate PFNs
//! and PXEs.
//!
//! # Examples
//!
//! ```
//! # use crashdump_triage::{Pxe, PxeFlags, Pfn};
//! let pxe = Pxe::new(
//!     Pfn::new(0x6d600),
//!     PxeFlags::USER_ACCESSIBLE | PxeFlags::ACCESSED | PxeFlags::PRESENT
//! );
//! let encoded = u64::from(pxe);
//! let decoded = Pxe::from(encoded);
//! assert_eq!(decoded, pxe);
//! ```
use bitflags::bitflags;

use crate::gxa::paging;
use crate::Gpa;

bitflags! {
    /// The various bits and flags that a [`Pxe`] has.
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
    pub struct PxeFlags: u64 {
        const PRESENT = paging::PRESENT_BIT;
        const WRITABLE = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLED = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        const LARGE_PAGE = paging::LARGE_PAGE_BIT;
        const TRANSITION = paging::TRANSITION_BIT;
        const NO_EXECUTE = 1 << 63;
    }
}

impl Default for PxeFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Strong type for a Page Frame Number.
///
/// # Examples
///
/// ```
/// # use crashdump_triage::{Pfn, Gpa};
/// let pfn = Pfn::new(0x1337);
/// assert_eq!(pfn.gpa(), Gpa::new(0x1337000));
/// ```
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Default, PartialOrd, Ord)]
pub struct Pfn(u64);

impl Pfn {
    #[must_use]
    pub const fn new(pfn: u64) -> Self {
        Self(pfn)
    }

    #[must_use]
    pub const fn u64(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn gpa(&self) -> Gpa {
        Gpa::from_pfn(*self)
    }
}

impl From<u64> for Pfn {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A [`Pxe`] is a set of flags ([`PxeFlags`]) and a Page Frame Number (PFN).
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Default, PartialOrd, Ord)]
pub struct Pxe {
    /// The PFN of the next table or the final page.
    pub pfn: Pfn,
    /// PXE flags.
    pub flags: PxeFlags,
}

impl Pxe {
    /// Create a [`Pxe`] from a `pfn` and a set of `flags`.
    #[must_use]
    pub fn new(pfn: Pfn, flags: PxeFlags) -> Self {
        Self { pfn, flags }
    }

    /// Is the bit Present/Valid turned on?
    ///
    /// # Examples
    ///
    /// ```
    /// # use crashdump_triage::{Pxe, PxeFlags, Pfn};
    /// let p = Pxe::new(Pfn::new(0x6d600), PxeFlags::PRESENT);
    /// assert!(p.present());
    /// let np = Pxe::new(Pfn::new(0x1337), PxeFlags::USER_ACCESSIBLE);
    /// assert!(!np.present());
    /// ```
    #[must_use]
    pub fn present(&self) -> bool {
        self.flags.contains(PxeFlags::PRESENT)
    }

    /// Is it a large page?
    #[must_use]
    pub fn large_page(&self) -> bool {
        self.flags.contains(PxeFlags::LARGE_PAGE)
    }

    /// Is it a transition PTE?
    ///
    /// # Examples
    ///
    /// ```
    /// # use crashdump_triage::Pxe;
    /// let p = Pxe::from(0x166B7880);
    /// let np = Pxe::from(0xA000000077AF867);
    /// assert!(p.transition());
    /// assert!(!np.transition());
    /// ```
    #[must_use]
    pub fn transition(&self) -> bool {
        !self.present() && self.flags.contains(PxeFlags::TRANSITION)
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.flags.contains(PxeFlags::WRITABLE)
    }

    #[must_use]
    pub fn executable(&self) -> bool {
        !self.flags.contains(PxeFlags::NO_EXECUTE)
    }

    #[must_use]
    pub fn user_accessible(&self) -> bool {
        self.flags.contains(PxeFlags::USER_ACCESSIBLE)
    }
}

/// Convert a [`u64`] into a [`Pxe`].
impl From<u64> for Pxe {
    /// # Examples
    ///
    /// ```
    /// # use crashdump_triage::{Pxe, PxeFlags, Pfn};
    /// let pxe = Pxe::from(0x6D_60_00_25);
    /// assert_eq!(pxe.pfn.u64(), 0x6d600);
    /// assert_eq!(pxe.flags, PxeFlags::USER_ACCESSIBLE | PxeFlags::ACCESSED | PxeFlags::PRESENT);
    /// ```
    fn from(value: u64) -> Self {
        let pfn = Pfn::new((value & paging::PFN_MASK) >> paging::PAGE_SHIFT);
        let flags = PxeFlags::from_bits_retain(value & !paging::PFN_MASK);

        Self::new(pfn, flags)
    }
}

/// Convert a [`Pxe`] into a [`u64`].
impl From<Pxe> for u64 {
    fn from(pxe: Pxe) -> Self {
        debug_assert!(pxe.pfn.u64() <= paging::PFN_MASK >> paging::PAGE_SHIFT);

        pxe.flags.bits() | (pxe.pfn.u64() << paging::PAGE_SHIFT)
    }
}
