use bitfield_struct::bitfield;

/// Permission and status bits of a leaf page-table entry (bits 0..=11).
///
/// The same 12-bit value is what the inverted page table and the software
/// translation cache record as the *permission snapshot* of a mapping.
///
/// | Bit  | Name              | Meaning |
/// |------|-------------------|---------|
/// | 0    | `P` (present)     | Valid mapping if set |
/// | 1    | `RW`              | Writable if set |
/// | 2    | `US`              | User-mode accessible if set |
/// | 3    | `PWT`             | Write-through caching |
/// | 4    | `PCD`             | Disable caching |
/// | 5    | `A`               | Accessed |
/// | 6    | `D`               | Dirty |
/// | 7    | `PS`              | Large page (always clear for 4 KiB leaves) |
/// | 8    | `G`               | Global |
/// | 9–11 | OS avail          | Reserved for OS use |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageFlags;
/// let f = PageFlags::user_rw();
/// assert!(f.present() && f.writable() && f.user());
/// assert_eq!(f.into_bits(), 0b111);
/// ```
#[bitfield(u16)]
#[derive(PartialEq, Eq, Hash)]
pub struct PageFlags {
    /// Present (P, bit 0).
    pub present: bool,
    /// Writable (RW, bit 1). Clear for read-only.
    pub writable: bool,
    /// User/Supervisor (US, bit 2). Clear restricts to supervisor only.
    pub user: bool,
    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,
    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,
    /// Accessed (A, bit 5).
    pub accessed: bool,
    /// Dirty (D, bit 6).
    pub dirty: bool,
    /// Page Size (PS, bit 7).
    pub large_page: bool,
    /// Global (G, bit 8).
    pub global: bool,
    /// OS-available (bits 9..=11); hardware ignores these.
    #[bits(3)]
    pub os_available: u8,
    #[bits(4)]
    __: u8,
}

impl PageFlags {
    /// Mask of the bits a page-table entry stores below its frame number.
    pub const MASK: u16 = 0x0FFF;

    /// Present, writable, user-accessible: a fresh user data page.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
    }

    /// Present, read-only, user-accessible.
    #[inline]
    #[must_use]
    pub const fn user_ro() -> Self {
        Self::new().with_present(true).with_user(true)
    }

    /// Build from the low 12 bits of a raw entry; higher bits are discarded.
    #[inline]
    #[must_use]
    pub const fn from_entry_bits(raw: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self::from_bits((raw & Self::MASK as u64) as u16)
    }
}

impl From<PageFlags> for u64 {
    #[inline]
    fn from(flags: PageFlags) -> Self {
        Self::from(flags.into_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_bits_are_dropped() {
        let f = PageFlags::from_entry_bits(0xFFFF_F005);
        assert!(f.present());
        assert!(f.user());
        assert!(!f.writable());
        assert_eq!(f.into_bits(), 0x005);
    }

    #[test]
    fn read_only_differs_from_read_write() {
        assert_ne!(PageFlags::user_ro(), PageFlags::user_rw());
        assert_eq!(PageFlags::user_rw().with_writable(false), PageFlags::user_ro());
    }
}
