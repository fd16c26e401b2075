//! Register and register field access.
use core::fmt;

/// Absolute address of a 32-bit register.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reg(u32);

impl Reg {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn addr(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reg({:#010x})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("value {value:#x} does not fit into a {width} bit field")]
    Overflow { value: u32, width: u8 },
}

/// Named bit field inside a register.
///
/// Writes to a field which does not span the whole register are read-modify-write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    reg: Reg,
    offset: u8,
    width: u8,
}

impl Field {
    /// Creates a new field descriptor. Panics at compile time for const descriptors if the field
    /// does not fit into a 32-bit register.
    pub const fn new(reg: Reg, offset: u8, width: u8) -> Self {
        assert!(width >= 1 && width <= 32);
        assert!(offset as u32 + width as u32 <= 32);
        Self { reg, offset, width }
    }

    #[inline]
    pub const fn reg(&self) -> Reg {
        self.reg
    }

    #[inline]
    pub const fn offset(&self) -> u8 {
        self.offset
    }

    #[inline]
    pub const fn width(&self) -> u8 {
        self.width
    }

    #[inline]
    pub const fn spans_register(&self) -> bool {
        self.width == 32
    }

    /// Largest value the field can hold.
    pub const fn max_value(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Mask of the field at its position in the register.
    pub const fn mask(&self) -> u32 {
        self.max_value() << self.offset
    }

    /// Extracts the field value from a raw register value.
    pub const fn extract(&self, raw: u32) -> u32 {
        (raw >> self.offset) & self.max_value()
    }

    /// Inserts a value into a raw register value. Excess bits of the value are dropped.
    pub const fn insert(&self, raw: u32, value: u32) -> u32 {
        (raw & !self.mask()) | ((value & self.max_value()) << self.offset)
    }

    pub fn read<B: RegisterBus + ?Sized>(&self, bus: &mut B) -> u32 {
        bus.read_field(*self)
    }

    /// Writes the field. Bits of the value which do not fit into the field are masked.
    pub fn write<B: RegisterBus + ?Sized>(&self, bus: &mut B, value: u32) {
        bus.write_field(*self, value)
    }

    /// Writes the field, rejecting values which do not fit.
    pub fn write_checked<B: RegisterBus + ?Sized>(
        &self,
        bus: &mut B,
        value: u32,
    ) -> Result<(), FieldError> {
        if value > self.max_value() {
            return Err(FieldError::Overflow {
                value,
                width: self.width,
            });
        }
        bus.write_field(*self, value);
        Ok(())
    }
}

/// Composite register with a fixed address.
pub trait Register: Copy {
    const REG: Reg;

    fn from_raw(raw: u32) -> Self;
    fn to_raw(self) -> u32;
}

macro_rules! impl_register {
    ($ty:ty, $reg:expr) => {
        impl $crate::field::Register for $ty {
            const REG: $crate::field::Reg = $reg;

            #[inline]
            fn from_raw(raw: u32) -> Self {
                Self::new_with_raw_value(raw)
            }

            #[inline]
            fn to_raw(self) -> u32 {
                self.raw_value()
            }
        }
    };
}

pub(crate) use impl_register;

/// Access to the memory subsystem registers.
///
/// Every call is one bus transaction, and calls are executed in program order. Reads take a
/// mutable reference because some status registers have read side effects.
pub trait RegisterBus {
    fn read(&mut self, reg: Reg) -> u32;
    fn write(&mut self, reg: Reg, value: u32);

    fn read_field(&mut self, field: Field) -> u32 {
        field.extract(self.read(field.reg()))
    }

    fn write_field(&mut self, field: Field, value: u32) {
        if field.spans_register() {
            self.write(field.reg(), value);
        } else {
            let raw = self.read(field.reg());
            self.write(field.reg(), field.insert(raw, value));
        }
    }

    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Reg, f: F) {
        let raw = self.read(reg);
        self.write(reg, f(raw));
    }

    fn read_reg<R: Register>(&mut self) -> R {
        R::from_raw(self.read(R::REG))
    }

    fn write_reg<R: Register>(&mut self, value: R) {
        self.write(R::REG, value.to_raw());
    }

    fn modify_reg<R: Register, F: FnOnce(R) -> R>(&mut self, f: F) {
        let value = self.read_reg::<R>();
        self.write_reg(f(value));
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    #[inline]
    fn read(&mut self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// Register bus using volatile accesses to the memory mapped registers.
pub struct MmioRegisterBus {
    _private: (),
}

impl MmioRegisterBus {
    /// # Safety
    ///
    /// The caller must ensure that the memory subsystem registers are only accessed through this
    /// handle while it exists, and that the register addresses are mapped as device memory.
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl RegisterBus for MmioRegisterBus {
    #[inline]
    fn read(&mut self, reg: Reg) -> u32 {
        // Safety: All register addresses in this crate are valid, aligned MMIO addresses.
        unsafe { core::ptr::read_volatile(reg.addr() as usize as *const u32) }
    }

    #[inline]
    fn write(&mut self, reg: Reg, value: u32) {
        // Safety: All register addresses in this crate are valid, aligned MMIO addresses.
        unsafe { core::ptr::write_volatile(reg.addr() as usize as *mut u32, value) }
    }
}
