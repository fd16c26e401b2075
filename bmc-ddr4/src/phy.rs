//! DDR4 PHY registers.
//!
//! Several registers exist once per data lane or once per data bit. They are banked behind
//! [LANE_SEL]: the lane (and bit) must be selected before the banked register is accessed, and
//! no other access to [LANE_SEL] may happen in between.
use arbitrary_int::{u2, u3, u4, u5, u10};

use crate::field::{Field, Reg, impl_register};

pub const PHY_BASE_ADDR: u32 = 0xF05F_0000;

pub const LANE_SEL: Reg = Reg::new(PHY_BASE_ADDR);
pub const DLL_RECAL_TRIM: Reg = Reg::new(PHY_BASE_ADDR + 0x004);
pub const DLL_STATUS: Reg = Reg::new(PHY_BASE_ADDR + 0x008);
pub const PAD_CTRL: Reg = Reg::new(PHY_BASE_ADDR + 0x00C);
pub const ZQ_CAL: Reg = Reg::new(PHY_BASE_ADDR + 0x010);
/// Mirror of DRAM MR1 (upper half) and MR0 (lower half).
pub const MR01: Reg = Reg::new(PHY_BASE_ADDR + 0x014);
/// Mirror of DRAM MR5 (upper half) and MR2 (lower half).
pub const MR25: Reg = Reg::new(PHY_BASE_ADDR + 0x018);
pub const LATENCY_ADJ: Reg = Reg::new(PHY_BASE_ADDR + 0x01C);
pub const WINDOW_TRIM: Reg = Reg::new(PHY_BASE_ADDR + 0x020);
pub const MAIN_CLK_DELTA: Reg = Reg::new(PHY_BASE_ADDR + 0x024);
/// Lane banked.
pub const DLL_TRIM_1: Reg = Reg::new(PHY_BASE_ADDR + 0x028);
/// Lane banked.
pub const DLL_TRIM_2: Reg = Reg::new(PHY_BASE_ADDR + 0x02C);
/// Lane banked.
pub const DLL_TRIM_3: Reg = Reg::new(PHY_BASE_ADDR + 0x030);
pub const DLL_ADRCTRL: Reg = Reg::new(PHY_BASE_ADDR + 0x034);
/// Lane and bit banked.
pub const OP_BIT_TRIM: Reg = Reg::new(PHY_BASE_ADDR + 0x040);
/// Lane and bit banked.
pub const IP_BIT_TRIM: Reg = Reg::new(PHY_BASE_ADDR + 0x044);
pub const WRLVL_CTRL: Reg = Reg::new(PHY_BASE_ADDR + 0x050);
/// Lane banked.
pub const WRLVL_RESULT: Reg = Reg::new(PHY_BASE_ADDR + 0x054);
pub const BIT_LVL_CTRL: Reg = Reg::new(PHY_BASE_ADDR + 0x058);
pub const MPR_PATTERN: Reg = Reg::new(PHY_BASE_ADDR + 0x05C);
/// Lane banked.
pub const VREF_CTRL: Reg = Reg::new(PHY_BASE_ADDR + 0x060);
/// Lane banked.
pub const VREF_WINDOWS: Reg = Reg::new(PHY_BASE_ADDR + 0x064);
pub const SCL_START: Reg = Reg::new(PHY_BASE_ADDR + 0x070);
pub const SCL_STATUS: Reg = Reg::new(PHY_BASE_ADDR + 0x074);
pub const SCL_DATA_0: Reg = Reg::new(PHY_BASE_ADDR + 0x078);
pub const SCL_DATA_1: Reg = Reg::new(PHY_BASE_ADDR + 0x07C);
pub const DYN_RECAL: Reg = Reg::new(PHY_BASE_ADDR + 0x080);

/// Registers banked per lane.
pub const LANE_BANKED: &[Reg] = &[
    DLL_TRIM_1,
    DLL_TRIM_2,
    DLL_TRIM_3,
    WRLVL_RESULT,
    VREF_CTRL,
    VREF_WINDOWS,
];

/// Registers banked per lane and per bit.
pub const BIT_BANKED: &[Reg] = &[OP_BIT_TRIM, IP_BIT_TRIM];

/// Registers dumped on a calibration failure. Banked registers are dumped for every lane.
pub const REGISTERS: &[(&str, Reg)] = &[
    ("PHY_LANE_SEL", LANE_SEL),
    ("PHY_DLL_RECAL_TRIM", DLL_RECAL_TRIM),
    ("PHY_DLL_STATUS", DLL_STATUS),
    ("PHY_PAD_CTRL", PAD_CTRL),
    ("PHY_ZQ_CAL", ZQ_CAL),
    ("PHY_MR01", MR01),
    ("PHY_MR25", MR25),
    ("PHY_LATENCY_ADJ", LATENCY_ADJ),
    ("PHY_WINDOW_TRIM", WINDOW_TRIM),
    ("PHY_MAIN_CLK_DELTA", MAIN_CLK_DELTA),
    ("PHY_DLL_ADRCTRL", DLL_ADRCTRL),
    ("PHY_WRLVL_CTRL", WRLVL_CTRL),
    ("PHY_BIT_LVL_CTRL", BIT_LVL_CTRL),
    ("PHY_MPR_PATTERN", MPR_PATTERN),
    ("PHY_SCL_START", SCL_START),
    ("PHY_SCL_STATUS", SCL_STATUS),
    ("PHY_SCL_DATA_0", SCL_DATA_0),
    ("PHY_SCL_DATA_1", SCL_DATA_1),
    ("PHY_DYN_RECAL", DYN_RECAL),
];

/// Lane banked registers dumped on a calibration failure.
pub const LANE_REGISTERS: &[(&str, Reg)] = &[
    ("PHY_DLL_TRIM_1", DLL_TRIM_1),
    ("PHY_DLL_TRIM_2", DLL_TRIM_2),
    ("PHY_DLL_TRIM_3", DLL_TRIM_3),
    ("PHY_WRLVL_RESULT", WRLVL_RESULT),
    ("PHY_VREF_CTRL", VREF_CTRL),
    ("PHY_VREF_WINDOWS", VREF_WINDOWS),
];

// Trim fields. Delay trims use a sign-magnitude encoding with the sign in the top bit.

/// Output delay line trim of the selected lane.
pub const LANE_TRIM: Field = Field::new(DLL_TRIM_1, 0, 7);
pub const DQS_OUT_TRIM: Field = Field::new(DLL_TRIM_2, 0, 7);
pub const DQS_IN_TRIM: Field = Field::new(DLL_TRIM_2, 8, 7);
pub const LANE_PHASE: Field = Field::new(DLL_TRIM_3, 0, 4);
pub const LANE_PHASE_TRIM: Field = Field::new(DLL_TRIM_3, 8, 7);
/// Output data mask delay of the selected lane.
pub const DM_OUT_TRIM: Field = Field::new(DLL_TRIM_3, 16, 6);
pub const ADRCTRL_DELAY: Field = Field::new(DLL_ADRCTRL, 0, 7);
/// Address/control master delay line trim level, 0 to 2.
pub const ADRCTRL_MASTER_TRIM: Field = Field::new(DLL_ADRCTRL, 8, 2);
/// Output delay of the selected bit.
pub const OP_BIT_TRIM_FIELD: Field = Field::new(OP_BIT_TRIM, 0, 6);
/// Input delay of the selected bit.
pub const IP_BIT_TRIM_FIELD: Field = Field::new(IP_BIT_TRIM, 0, 6);
pub const WRLVL_DELAY: Field = Field::new(WRLVL_RESULT, 0, 7);
pub const MPR_PATTERN_FIELD: Field = Field::new(MPR_PATTERN, 0, 8);
/// Read VREF code of the selected lane.
pub const VREF_CODE: Field = Field::new(VREF_CTRL, 0, 6);
pub const MAIN_CLK_DELTA_FIELD: Field = Field::new(MAIN_CLK_DELTA, 0, 6);
pub const SCL_DATA_0_FIELD: Field = Field::new(SCL_DATA_0, 0, 32);
pub const SCL_DATA_1_FIELD: Field = Field::new(SCL_DATA_1, 0, 32);
pub const MR01_FIELD: Field = Field::new(MR01, 0, 32);
pub const MR25_FIELD: Field = Field::new(MR25, 0, 32);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct LaneSelect {
    #[bits(8..=10, rw)]
    bit: u3,
    #[bits(0..=1, rw)]
    lane: u2,
}

impl_register!(LaneSelect, LANE_SEL);

/// Master/slave delay line recalibration trims.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct RecalTrim {
    #[bits(16..=23, rw)]
    lane1: u8,
    #[bits(8..=15, rw)]
    lane0: u8,
    #[bits(0..=7, rw)]
    adrctrl: u8,
}

impl_register!(RecalTrim, DLL_RECAL_TRIM);

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum DllLockState {
    Unlocked = 0b00,
    MasterLocked = 0b01,
    SlaveLocked = 0b10,
    Locked = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DllStatus {
    #[bits(16..=17, r)]
    lock: DllLockState,
    /// Measured master delay line length in delay taps.
    #[bits(0..=9, r)]
    mdl_len: u10,
}

impl_register!(DllStatus, DLL_STATUS);

/// Pad drive strength and termination codes.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct PadControl {
    #[bits(20..=23, rw)]
    clk_drive: u4,
    #[bits(16..=19, rw)]
    adrctrl_drive: u4,
    #[bits(12..=15, rw)]
    dqs_odt: u4,
    #[bits(8..=11, rw)]
    dqs_drive: u4,
    #[bits(4..=7, rw)]
    dq_odt: u4,
    #[bits(0..=3, rw)]
    dq_drive: u4,
}

impl_register!(PadControl, PAD_CTRL);

/// Impedance calibration. The done bits are set by hardware, start bits self-clear.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ZqCalibration {
    #[bit(9, rw)]
    tx_done: bool,
    #[bit(8, rw)]
    rx_done: bool,
    #[bit(1, rw)]
    tx_start: bool,
    #[bit(0, rw)]
    rx_start: bool,
}

impl_register!(ZqCalibration, ZQ_CAL);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct LatencyAdjust {
    #[bits(8..=12, rw)]
    write: u5,
    #[bits(0..=4, rw)]
    read: u5,
}

impl_register!(LatencyAdjust, LATENCY_ADJ);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct WindowTrim {
    #[bits(8..=11, rw)]
    dqs_gate: u4,
    #[bits(0..=3, rw)]
    window: u4,
}

impl_register!(WindowTrim, WINDOW_TRIM);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct WriteLevelControl {
    #[bit(9, rw)]
    fail: bool,
    #[bit(8, rw)]
    done: bool,
    #[bit(1, rw)]
    start: bool,
    #[bit(0, rw)]
    enable: bool,
}

impl_register!(WriteLevelControl, WRLVL_CTRL);

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum BitLevelDirection {
    Read = 0,
    Write = 1,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct BitLevelControl {
    #[bit(9, rw)]
    fail: bool,
    #[bit(8, rw)]
    done: bool,
    /// Forces the write trims found by write bit leveling onto the data path.
    #[bit(3, rw)]
    wr_trim_override: bool,
    /// Use the DRAM multi purpose register pattern instead of the array.
    #[bit(2, rw)]
    use_mpr: bool,
    #[bit(1, rw)]
    direction: BitLevelDirection,
    #[bit(0, rw)]
    start: bool,
}

impl_register!(BitLevelControl, BIT_LVL_CTRL);

/// Eye window edges measured by the last bit leveling run, for the selected lane.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct VrefWindows {
    #[bits(16..=23, r)]
    window_1: u8,
    #[bits(0..=7, r)]
    window_0: u8,
}

impl_register!(VrefWindows, VREF_WINDOWS);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SclControl {
    #[bit(8, rw)]
    done: bool,
    #[bit(2, rw)]
    save_restore: bool,
    #[bit(1, rw)]
    write_only: bool,
    #[bit(0, rw)]
    start: bool,
}

impl_register!(SclControl, SCL_START);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SclStatus {
    /// One failure bit per lane.
    #[bits(0..=1, r)]
    lane_fail: u2,
}

impl_register!(SclStatus, SCL_STATUS);

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct DynamicRecal {
    /// Recalibration interval in microseconds.
    #[bits(8..=23, rw)]
    interval: u16,
    #[bit(2, rw)]
    periodic_dll_recal: bool,
    #[bit(1, rw)]
    dyn_write_bit_level: bool,
    #[bit(0, rw)]
    dyn_read_bit_level: bool,
}

impl_register!(DynamicRecal, DYN_RECAL);
