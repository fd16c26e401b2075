//! Raw access to the DRAM address window.
//!
//! The calibration runs before the memory subsystem is usable, so DRAM is accessed through
//! explicit volatile accesses instead of references into it.

/// 32-bit and 64-bit accesses at byte offsets into the DRAM window.
///
/// Offsets are always naturally aligned. Implementations must not cache or merge accesses.
pub trait DramWindow {
    fn read32(&mut self, offset: u64) -> u32;
    fn write32(&mut self, offset: u64, value: u32);

    fn read64(&mut self, offset: u64) -> u64 {
        let low = self.read32(offset) as u64;
        let high = self.read32(offset + 4) as u64;
        low | (high << 32)
    }

    fn write64(&mut self, offset: u64, value: u64) {
        self.write32(offset, value as u32);
        self.write32(offset + 4, (value >> 32) as u32);
    }
}

impl<W: DramWindow + ?Sized> DramWindow for &mut W {
    #[inline]
    fn read32(&mut self, offset: u64) -> u32 {
        (**self).read32(offset)
    }

    #[inline]
    fn write32(&mut self, offset: u64, value: u32) {
        (**self).write32(offset, value)
    }

    #[inline]
    fn read64(&mut self, offset: u64) -> u64 {
        (**self).read64(offset)
    }

    #[inline]
    fn write64(&mut self, offset: u64, value: u64) {
        (**self).write64(offset, value)
    }
}

/// DRAM base address of the BMC SoC memory map.
pub const DRAM_BASE_ADDR: usize = 0x0000_0000;

/// Memory mapped DRAM window using volatile accesses.
pub struct MmioDramWindow {
    base: usize,
    len: u64,
}

impl MmioDramWindow {
    /// # Safety
    ///
    /// `base..base + len` must be mapped as device or strongly ordered memory, and nothing else
    /// may access it while the window exists.
    pub const unsafe fn new(base: usize, len: u64) -> Self {
        Self { base, len }
    }

    #[inline]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn addr(&self, offset: u64, size: u64) -> usize {
        debug_assert!(offset % size == 0 && offset + size <= self.len);
        self.base + offset as usize
    }
}

impl DramWindow for MmioDramWindow {
    #[inline]
    fn read32(&mut self, offset: u64) -> u32 {
        // Safety: The constructor contract guarantees the address is mapped.
        unsafe { core::ptr::read_volatile(self.addr(offset, 4) as *const u32) }
    }

    #[inline]
    fn write32(&mut self, offset: u64, value: u32) {
        // Safety: The constructor contract guarantees the address is mapped.
        unsafe { core::ptr::write_volatile(self.addr(offset, 4) as *mut u32, value) }
    }

    #[inline]
    fn read64(&mut self, offset: u64) -> u64 {
        // Safety: The constructor contract guarantees the address is mapped.
        unsafe { core::ptr::read_volatile(self.addr(offset, 8) as *const u64) }
    }

    #[inline]
    fn write64(&mut self, offset: u64, value: u64) {
        // Safety: The constructor contract guarantees the address is mapped.
        unsafe { core::ptr::write_volatile(self.addr(offset, 8) as *mut u64, value) }
    }
}
