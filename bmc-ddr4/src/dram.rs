//! DDR4 SDRAM mode register layouts (JEDEC JESD79-4).
//!
//! The values are driven on the address bus A15:A0 with an MRS command, see
//! [crate::mc::MrsCommand].
use arbitrary_int::{u2, u3, u6};

#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum ModeRegister {
    Mr0 = 0,
    Mr1 = 1,
    Mr2 = 2,
    Mr3 = 3,
    Mr4 = 4,
    Mr5 = 5,
    Mr6 = 6,
    /// Reserved for the registering clock driver.
    Mr7 = 7,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum BurstLength {
    Bl8 = 0b00,
    OnTheFly = 0b01,
    Bc4 = 0b10,
    Reserved = 0b11,
}

/// The CAS latency code is split across three field groups.
#[bitbybit::bitfield(u16, default = 0x0, debug)]
pub struct Mr0 {
    /// CL code bit 4 (A12).
    #[bit(12, rw)]
    cas_latency_4: bool,
    #[bits(9..=11, rw)]
    write_recovery: u3,
    #[bit(8, rw)]
    dll_reset: bool,
    /// CL code bits 3:1 (A6:A4).
    #[bits(4..=6, rw)]
    cas_latency_3_1: u3,
    #[bit(3, rw)]
    read_burst_interleaved: bool,
    /// CL code bit 0 (A2).
    #[bit(2, rw)]
    cas_latency_0: bool,
    #[bits(0..=1, rw)]
    burst_length: BurstLength,
}

#[bitbybit::bitfield(u16, default = 0x0, debug)]
pub struct Mr1 {
    #[bits(8..=10, rw)]
    rtt_nom: u3,
    #[bit(7, rw)]
    write_leveling: bool,
    #[bits(1..=2, rw)]
    output_driver: u2,
    #[bit(0, rw)]
    dll_enable: bool,
}

#[bitbybit::bitfield(u16, default = 0x0, debug)]
pub struct Mr2 {
    #[bits(9..=11, rw)]
    rtt_wr: u3,
    #[bits(3..=5, rw)]
    cas_write_latency: u3,
}

#[bitbybit::bitfield(u16, default = 0x0, debug)]
pub struct Mr5 {
    #[bits(6..=8, rw)]
    rtt_park: u3,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum VrefRange {
    /// 60 % to 92.5 % of VDDQ.
    Range1 = 0,
    /// 45 % to 77.5 % of VDDQ.
    Range2 = 1,
}

#[bitbybit::bitfield(u16, default = 0x0, debug)]
pub struct Mr6 {
    #[bit(7, rw)]
    vref_training: bool,
    #[bit(6, rw)]
    vref_range: VrefRange,
    #[bits(0..=5, rw)]
    vref_value: u6,
}

/// Lower bound of VREF range 1 in per-mille of VDDQ.
pub const VREF_RANGE1_BASE_PERMILLE: u32 = 600;
/// VREF step size in tenths of a per-mille of VDDQ.
pub const VREF_STEP_DECI_PERMILLE: u32 = 65;
/// Largest valid VREF code.
pub const VREF_MAX_CODE: u8 = 50;
