//! Global control registers which are relevant for DDR bring-up.
use crate::field::{Field, Reg, impl_register};

pub const GCR_BASE_ADDR: u32 = 0xF080_0000;

/// Integration control register 2. Holds the boot state of the memory subsystem.
pub const INTCR2: Reg = Reg::new(GCR_BASE_ADDR + 0x060);
pub const RESET_CTRL: Reg = Reg::new(GCR_BASE_ADDR + 0x024);
/// Memory size boundary registers. Both must hold the same value.
pub const GMMAP0: Reg = Reg::new(GCR_BASE_ADDR + 0x044);
pub const GMMAP1: Reg = Reg::new(GCR_BASE_ADDR + 0x048);
/// Scratch register holding the usable DRAM size in bytes, clamped to 2 GiB.
pub const SCRATCH_SIZE: Reg = Reg::new(GCR_BASE_ADDR + 0x0E0);
/// Scratch register holding the usable DRAM size in MiB.
pub const SCRATCH_SIZE_MB: Reg = Reg::new(GCR_BASE_ADDR + 0x0E4);

pub const GMMAP0_BOUNDARY: Field = Field::new(GMMAP0, 0, 7);
pub const GMMAP1_BOUNDARY: Field = Field::new(GMMAP1, 0, 7);
pub const SCRATCH_SIZE_FIELD: Field = Field::new(SCRATCH_SIZE, 0, 32);
pub const SCRATCH_SIZE_MB_FIELD: Field = Field::new(SCRATCH_SIZE_MB, 0, 32);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct IntCr2 {
    /// Set by an earlier boot stage once the DDR was calibrated.
    #[bit(13, rw)]
    ddr_configured: bool,
    /// Memory controller is running and serving requests.
    #[bit(12, rw)]
    mc_running: bool,
}

impl_register!(IntCr2, INTCR2);

/// Reset control. A set bit holds the block in reset.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ResetControl {
    #[bit(1, rw)]
    phy_reset: bool,
    #[bit(0, rw)]
    mc_reset: bool,
}

impl_register!(ResetControl, RESET_CTRL);
