//! DDR4 memory controller (MC) registers.
use arbitrary_int::{u2, u4, u5, u10};

use crate::dram::ModeRegister;
use crate::field::{Field, Reg, impl_register};

pub const MC_BASE_ADDR: u32 = 0xF082_4000;

pub const CTRL: Reg = Reg::new(MC_BASE_ADDR);
pub const STATUS: Reg = Reg::new(MC_BASE_ADDR + 0x004);
pub const TIMING: Reg = Reg::new(MC_BASE_ADDR + 0x008);
pub const MRS: Reg = Reg::new(MC_BASE_ADDR + 0x010);
pub const ADDR_MAP: Reg = Reg::new(MC_BASE_ADDR + 0x020);
pub const REFRESH: Reg = Reg::new(MC_BASE_ADDR + 0x030);
pub const ECC_CTRL: Reg = Reg::new(MC_BASE_ADDR + 0x040);
pub const ECC_STATUS: Reg = Reg::new(MC_BASE_ADDR + 0x044);
pub const MEM_INIT_START: Reg = Reg::new(MC_BASE_ADDR + 0x070);
pub const MEM_INIT_SIZE: Reg = Reg::new(MC_BASE_ADDR + 0x074);
pub const MEM_INIT_CTRL: Reg = Reg::new(MC_BASE_ADDR + 0x078);

/// Number of ECC exclusion regions.
pub const ECC_EXCLUSION_COUNT: usize = 4;
const ECC_EXCL_BASE: u32 = MC_BASE_ADDR + 0x050;

/// Start address register of ECC exclusion region `n`.
pub const fn ecc_exclusion_start(n: usize) -> Reg {
    assert!(n < ECC_EXCLUSION_COUNT);
    Reg::new(ECC_EXCL_BASE + n as u32 * 8)
}

/// End address register (inclusive) of ECC exclusion region `n`.
pub const fn ecc_exclusion_end(n: usize) -> Reg {
    assert!(n < ECC_EXCLUSION_COUNT);
    Reg::new(ECC_EXCL_BASE + n as u32 * 8 + 4)
}

/// Memory initialization engine size, in units of 4 KiB.
pub const MEM_INIT_SIZE_PAGES: Field = Field::new(MEM_INIT_SIZE, 0, 32);
/// Memory initialization engine start address, in units of 4 KiB.
pub const MEM_INIT_START_PAGE: Field = Field::new(MEM_INIT_START, 0, 32);

/// Registers dumped on a calibration failure.
pub const REGISTERS: &[(&str, Reg)] = &[
    ("MC_CTRL", CTRL),
    ("MC_STATUS", STATUS),
    ("MC_TIMING", TIMING),
    ("MC_MRS", MRS),
    ("MC_ADDR_MAP", ADDR_MAP),
    ("MC_REFRESH", REFRESH),
    ("MC_ECC_CTRL", ECC_CTRL),
    ("MC_ECC_STATUS", ECC_STATUS),
    ("MC_MEM_INIT_START", MEM_INIT_START),
    ("MC_MEM_INIT_SIZE", MEM_INIT_SIZE),
    ("MC_MEM_INIT_CTRL", MEM_INIT_CTRL),
];

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct McControl {
    /// Starts the DFI initialization sequence of the controller.
    #[bit(0, rw)]
    start: bool,
}

impl_register!(McControl, CTRL);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct McStatus {
    #[bit(0, r)]
    initialized: bool,
}

impl_register!(McStatus, STATUS);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DramTiming {
    #[bits(16..=20, rw)]
    write_recovery: u5,
    #[bits(8..=12, rw)]
    cas_write_latency: u5,
    #[bits(0..=4, rw)]
    cas_latency: u5,
}

impl_register!(DramTiming, TIMING);

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum MrsCommandType {
    ModeRegisterSet = 0b00,
    ZqCalibrationLong = 0b01,
    ZqCalibrationShort = 0b10,
    PrechargeAll = 0b11,
}

/// Manual DRAM command interface. Hardware clears [MrsCommand::go] once the command was issued.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MrsCommand {
    #[bit(31, rw)]
    go: bool,
    #[bits(20..=21, rw)]
    command: MrsCommandType,
    #[bits(16..=18, rw)]
    mode_register: ModeRegister,
    /// Address bits A15:A0 driven with the command.
    #[bits(0..=15, rw)]
    data: u16,
}

impl_register!(MrsCommand, MRS);

/// Address mapping. The diff fields reduce the number of decoded bank, row and column address
/// bits from the maximum supported configuration.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
#[derive(PartialEq, Eq)]
pub struct AddrMap {
    #[bits(8..=9, rw)]
    col_diff: u2,
    #[bits(4..=5, rw)]
    row_diff: u2,
    #[bits(0..=1, rw)]
    bank_diff: u2,
}

impl_register!(AddrMap, ADDR_MAP);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct RefreshControl {
    #[bit(31, rw)]
    disable: bool,
    /// tRFC in DRAM clocks.
    #[bits(16..=25, rw)]
    t_rfc: u10,
    /// tREFI in DRAM clocks.
    #[bits(0..=15, rw)]
    t_refi: u16,
}

impl_register!(RefreshControl, REFRESH);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct EccControl {
    /// One enable bit per exclusion region.
    #[bits(4..=7, rw)]
    exclusion_enable: u4,
    /// Write 1 to clear the error status.
    #[bit(1, rw)]
    clear_status: bool,
    #[bit(0, rw)]
    enable: bool,
}

impl_register!(EccControl, ECC_CTRL);

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum EccErrorKind {
    None = 0b00,
    SingleCorrectable = 0b01,
    MultipleCorrectable = 0b10,
    Uncorrectable = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct EccStatus {
    #[bits(8..=15, r)]
    syndrome: u8,
    #[bits(0..=1, r)]
    kind: EccErrorKind,
}

impl_register!(EccStatus, ECC_STATUS);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MemInitControl {
    #[bit(1, r)]
    done: bool,
    /// Hardware clears the bit once the engine finished.
    #[bit(0, rw)]
    go: bool,
}

impl_register!(MemInitControl, MEM_INIT_CTRL);
