//! Simulated memory subsystem used by the unit tests.
//!
//! The register file emulates lane/bit banking and completes all hardware triggered operations
//! immediately. The DRAM model is sparse and decodes addresses according to the programmed
//! address map: accesses beyond the decoded space hit an absent rank, accesses within it alias
//! modulo the installed size.
extern crate std;

use core::ops::Range;
use std::{
    cell::{RefCell, RefMut},
    collections::HashMap,
    rc::Rc,
    vec::Vec,
};

use bmc_ddr4::{
    Reg, RegisterBus,
    dram::ModeRegister,
    mc::{self, AddrMap, EccControl, MemInitControl, MrsCommand, MrsCommandType},
    phy::{
        self, BitLevelControl, BitLevelDirection, LaneSelect, SclControl, WriteLevelControl,
        ZqCalibration,
    },
};
use embedded_hal::{delay::DelayNs, digital::PinState};

use crate::{
    memory::DramWindow,
    signal::{BootSignals, Direction, DriveMode, Pull},
    time::{Clock, Timestamp},
};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Read back from addresses which are not backed by a rank.
const ABSENT_RANK: u32 = 0xDEAD_BEEF;
const DUAL_DIE_ALIAS: u64 = 64 * MIB;

pub struct SimState {
    regs: HashMap<Reg, u32>,
    banked: HashMap<(Reg, u8, u8), u32>,
    lane: u8,
    bit: u8,
    pub writes: Vec<(Reg, u32)>,
    pub reads: usize,

    pub mdl_len: u16,
    pub zq_stuck: bool,
    pub dll_never_locks: bool,
    pub write_level_fail: bool,
    /// Raw write leveling result per lane.
    pub write_level_result: [u32; 2],
    pub mpr_bit_level_fail: bool,
    pub array_bit_level_fail: bool,
    pub scl_lane_fail: u8,
    /// Read VREF code with the widest eye, per lane.
    pub phy_vref_target: [u8; 2],
    /// DRAM VREF code with the widest eye.
    pub dram_vref_target: u8,
    /// DRAM VREF code below which write bit leveling fails.
    pub dram_vref_fail_below: u8,
    last_bit_level: BitLevelDirection,
    pub dram_vref: u8,
    pub mrs_log: Vec<(ModeRegister, u16)>,
    /// Number of upcoming commands which are executed but never clear the go bit.
    pub mrs_unacknowledged: usize,
    pub zq_long_count: usize,
    pub ecc_status: u32,

    pub dram_size: u64,
    /// Address map (bank diff, row diff) under which the device aliases like a dual die package.
    pub dual_die_map: Option<(u8, u8)>,
    /// Data lines which read back inverted.
    pub faulty_dq: u16,
    /// Offsets affected by [SimState::faulty_dq].
    pub faulty_window: Range<u64>,
    pub memory: HashMap<u64, u32>,
    pub mem_init_runs: usize,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            regs: HashMap::new(),
            banked: HashMap::new(),
            lane: 0,
            bit: 0,
            writes: Vec::new(),
            reads: 0,
            mdl_len: 128,
            zq_stuck: false,
            dll_never_locks: false,
            write_level_fail: false,
            write_level_result: [0x05, 0x43],
            mpr_bit_level_fail: false,
            array_bit_level_fail: false,
            scl_lane_fail: 0,
            phy_vref_target: [26, 29],
            dram_vref_target: 18,
            dram_vref_fail_below: 0,
            last_bit_level: BitLevelDirection::Read,
            dram_vref: 0,
            mrs_log: Vec::new(),
            mrs_unacknowledged: 0,
            zq_long_count: 0,
            ecc_status: 0,
            dram_size: 2 * GIB,
            dual_die_map: None,
            faulty_dq: 0,
            faulty_window: 0..u64::MAX,
            memory: HashMap::new(),
            mem_init_runs: 0,
        }
    }
}

impl SimState {
    fn bank_key(&self, reg: Reg) -> Option<(Reg, u8, u8)> {
        if phy::BIT_BANKED.contains(&reg) {
            Some((reg, self.lane, self.bit))
        } else if phy::LANE_BANKED.contains(&reg) {
            Some((reg, self.lane, 0))
        } else {
            None
        }
    }

    fn stored(&self, reg: Reg) -> u32 {
        match self.bank_key(reg) {
            Some(key) => self.banked.get(&key),
            None => self.regs.get(&reg),
        }
        .copied()
        .unwrap_or(0)
    }

    fn store(&mut self, reg: Reg, value: u32) {
        match self.bank_key(reg) {
            Some(key) => self.banked.insert(key, value),
            None => self.regs.insert(reg, value),
        };
    }

    pub fn lane_value(&self, reg: Reg, lane: usize) -> u32 {
        self.banked.get(&(reg, lane as u8, 0)).copied().unwrap_or(0)
    }

    pub fn bit_value(&self, reg: Reg, lane: usize, bit: usize) -> u32 {
        self.banked
            .get(&(reg, lane as u8, bit as u8))
            .copied()
            .unwrap_or(0)
    }

    fn vref_windows(&self) -> u32 {
        let lane = self.lane as usize;
        let distance = match self.last_bit_level {
            BitLevelDirection::Read => {
                let code = phy::VREF_CODE.extract(self.lane_value(phy::VREF_CTRL, lane));
                code.abs_diff(self.phy_vref_target[lane] as u32)
            }
            BitLevelDirection::Write => {
                (self.dram_vref as u32).abs_diff(self.dram_vref_target as u32)
            }
        };
        // Windows are balanced within one code of the optimum.
        let skew = distance.saturating_sub(1).min(32);
        let window_0 = 32 - skew;
        let window_1 = 32 + skew;
        window_0 | (window_1 << 16)
    }

    fn read_reg(&self, reg: Reg) -> u32 {
        match reg {
            phy::DLL_STATUS => {
                let lock = if self.dll_never_locks { 0b01 } else { 0b11 };
                self.mdl_len as u32 | (lock << 16)
            }
            phy::VREF_WINDOWS => self.vref_windows(),
            mc::ECC_STATUS => self.ecc_status,
            _ => self.stored(reg),
        }
    }

    fn write_reg(&mut self, reg: Reg, value: u32) {
        self.writes.push((reg, value));
        let value = match reg {
            phy::LANE_SEL => {
                let select = LaneSelect::new_with_raw_value(value);
                self.lane = select.lane().value();
                self.bit = select.bit().value();
                value
            }
            phy::ZQ_CAL => {
                let mut zq = ZqCalibration::new_with_raw_value(value);
                if !self.zq_stuck {
                    zq.set_rx_done(zq.rx_start());
                    zq.set_tx_done(zq.tx_start());
                }
                zq.with_rx_start(false).with_tx_start(false).raw_value()
            }
            phy::WRLVL_CTRL => {
                let mut ctrl = WriteLevelControl::new_with_raw_value(value);
                if ctrl.start() {
                    ctrl.set_start(false);
                    ctrl.set_done(true);
                    ctrl.set_fail(self.write_level_fail);
                    for lane in 0..2u8 {
                        self.banked.insert(
                            (phy::WRLVL_RESULT, lane, 0),
                            self.write_level_result[lane as usize],
                        );
                    }
                }
                ctrl.raw_value()
            }
            phy::BIT_LVL_CTRL => {
                let mut ctrl = BitLevelControl::new_with_raw_value(value);
                if ctrl.start() {
                    ctrl.set_start(false);
                    ctrl.set_done(true);
                    let fail = if ctrl.use_mpr() {
                        self.mpr_bit_level_fail
                    } else {
                        self.array_bit_level_fail
                            || (ctrl.direction() == BitLevelDirection::Write
                                && self.dram_vref < self.dram_vref_fail_below)
                    };
                    ctrl.set_fail(fail);
                    self.last_bit_level = ctrl.direction();
                }
                ctrl.raw_value()
            }
            phy::SCL_START => {
                let mut ctrl = SclControl::new_with_raw_value(value);
                if ctrl.start() {
                    ctrl.set_start(false);
                    ctrl.set_done(true);
                    self.regs.insert(phy::SCL_STATUS, self.scl_lane_fail as u32);
                }
                ctrl.raw_value()
            }
            mc::MRS => {
                let mut cmd = MrsCommand::new_with_raw_value(value);
                if cmd.go() {
                    if self.mrs_unacknowledged > 0 {
                        self.mrs_unacknowledged -= 1;
                    } else {
                        cmd.set_go(false);
                    }
                    match cmd.command() {
                        MrsCommandType::ModeRegisterSet => {
                            self.mrs_log.push((cmd.mode_register(), cmd.data()));
                            if cmd.mode_register() == ModeRegister::Mr6 {
                                self.dram_vref = (cmd.data() & 0x3F) as u8;
                            }
                        }
                        MrsCommandType::ZqCalibrationLong => self.zq_long_count += 1,
                        _ => (),
                    }
                }
                cmd.raw_value()
            }
            mc::CTRL => {
                if value & 1 != 0 {
                    self.regs.insert(mc::STATUS, 1);
                }
                value
            }
            mc::ECC_CTRL => {
                let ctrl = EccControl::new_with_raw_value(value);
                if ctrl.clear_status() {
                    self.ecc_status = 0;
                }
                ctrl.with_clear_status(false).raw_value()
            }
            mc::MEM_INIT_CTRL => {
                let ctrl = MemInitControl::new_with_raw_value(value);
                if ctrl.go() {
                    self.memory.clear();
                    self.mem_init_runs += 1;
                    // Done, go cleared.
                    0b10
                } else {
                    value
                }
            }
            _ => value,
        };
        self.store(reg, value);
    }

    fn decoded_size(&self) -> u64 {
        let map = AddrMap::new_with_raw_value(self.stored(mc::ADDR_MAP));
        let diff = map.bank_diff().value() + map.row_diff().value() + map.col_diff().value();
        (4 * GIB) >> diff
    }

    fn physical(&self, offset: u64) -> Option<u64> {
        if offset >= self.decoded_size() {
            return None;
        }
        let map = AddrMap::new_with_raw_value(self.stored(mc::ADDR_MAP));
        if self.dual_die_map == Some((map.bank_diff().value(), map.row_diff().value())) {
            return Some(offset % DUAL_DIE_ALIAS);
        }
        Some(offset % self.dram_size)
    }
}

#[derive(Clone)]
pub struct SimBus(Rc<RefCell<SimState>>);

impl SimBus {
    /// Register bus and DRAM window sharing one simulated SoC.
    pub fn new_pair() -> (SimBus, SimMemory) {
        let state = Rc::new(RefCell::new(SimState::default()));
        (SimBus(state.clone()), SimMemory(state))
    }

    pub fn state(&self) -> RefMut<'_, SimState> {
        self.0.borrow_mut()
    }

    /// Register value without counting a bus access.
    pub fn peek(&self, reg: Reg) -> u32 {
        self.0.borrow().stored(reg)
    }

    pub fn peek_lane(&self, reg: Reg, lane: usize) -> u32 {
        self.0.borrow().lane_value(reg, lane)
    }

    pub fn peek_bit(&self, reg: Reg, lane: usize, bit: usize) -> u32 {
        self.0.borrow().bit_value(reg, lane, bit)
    }

    /// Writes a register without recording the access.
    pub fn poke(&self, reg: Reg, value: u32) {
        self.0.borrow_mut().store(reg, value);
    }

    pub fn write_count(&self, reg: Reg) -> usize {
        self.0.borrow().writes.iter().filter(|(r, _)| *r == reg).count()
    }
}

impl RegisterBus for SimBus {
    fn read(&mut self, reg: Reg) -> u32 {
        let mut state = self.0.borrow_mut();
        state.reads += 1;
        state.read_reg(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.0.borrow_mut().write_reg(reg, value);
    }
}

pub struct SimMemory(Rc<RefCell<SimState>>);

impl DramWindow for SimMemory {
    fn read32(&mut self, offset: u64) -> u32 {
        let state = self.0.borrow();
        match state.physical(offset) {
            Some(phys) => {
                let fault = if state.faulty_window.contains(&offset) {
                    state.faulty_dq as u32
                } else {
                    0
                };
                state.memory.get(&phys).copied().unwrap_or(0) ^ (fault | (fault << 16))
            }
            None => ABSENT_RANK ^ offset as u32,
        }
    }

    fn write32(&mut self, offset: u64, value: u32) {
        let mut state = self.0.borrow_mut();
        if let Some(phys) = state.physical(offset) {
            state.memory.insert(phys, value);
        }
    }
}

#[derive(Default)]
pub struct SimTimer {
    pub now_ns: u64,
}

impl DelayNs for SimTimer {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns += ns as u64;
    }
}

impl Clock for SimTimer {
    fn now(&mut self) -> Timestamp {
        let micros = self.now_ns / 1000;
        Timestamp::new((micros / 1_000_000) as u32, (micros % 1_000_000) as u32)
    }
}

#[derive(Default)]
pub struct SimSignals {
    pub configured: Vec<u8>,
    pub levels: Vec<(u8, PinState)>,
}

impl SimSignals {
    pub fn level(&self, pin: u8) -> Option<PinState> {
        self.levels
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
    }
}

impl BootSignals for SimSignals {
    fn configure(&mut self, pin: u8, direction: Direction, _pull: Pull, _drive: DriveMode) {
        assert_eq!(direction, Direction::Output);
        self.configured.push(pin);
    }

    fn write(&mut self, pin: u8, level: PinState) {
        self.levels.push((pin, level));
    }
}
