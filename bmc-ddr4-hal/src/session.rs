//! Calibration session: configuration, computed results and diagnostics of one DDR bring-up.
use heapless::Vec;

use crate::phy::mode_regs::ModeRegisters;
use crate::sweep::SweepParameter;
use crate::time::{self, Hertz};

/// DRAM speed class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SpeedClass {
    #[default]
    Ddr4_1600,
    /// The fast speed class. Some trims use different defaults for it.
    Ddr4_2133,
}

impl SpeedClass {
    #[inline]
    pub const fn is_fast(self) -> bool {
        matches!(self, SpeedClass::Ddr4_2133)
    }

    /// DRAM clock, half the data rate.
    pub const fn dram_clock(self) -> Hertz {
        match self {
            SpeedClass::Ddr4_1600 => Hertz::MHz(800),
            SpeedClass::Ddr4_2133 => Hertz::MHz(1066),
        }
    }

    /// DRAM clock period in picoseconds.
    pub fn clock_period_ps(self) -> u32 {
        time::period_ps(self.dram_clock())
    }

    /// Write recovery time in clocks.
    pub const fn write_recovery_clocks(self) -> u8 {
        match self {
            SpeedClass::Ddr4_1600 => 12,
            SpeedClass::Ddr4_2133 => 16,
        }
    }

    /// Converts nanoseconds to DRAM clocks, rounding up.
    pub fn ns_to_clocks(self, ns: u32) -> u32 {
        (ns * 1000).div_ceil(self.clock_period_ps())
    }
}

/// Drive strength or termination setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impedance {
    /// Driver or termination disabled.
    Off,
    /// High impedance, only valid for dynamic write termination.
    HighZ,
    Ohms(u16),
}

impl Impedance {
    pub const fn ohms(self) -> Option<u16> {
        match self {
            Impedance::Ohms(ohms) => Some(ohms),
            _ => None,
        }
    }
}

/// Region excluded from ECC checking. Both addresses are DRAM offsets, the end is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccExclusion {
    pub start: u32,
    pub end: u32,
}

/// GPIO pins used to signal the result of the memory test to external equipment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalPins {
    pub pass: Option<u8>,
    pub complete: Option<u8>,
}

/// Largest magnitude of a write leveling adjustment.
pub const WRITE_LEVEL_ADJUST_MAX: i8 = 16;

/// Manual per-lane values which replace computed or trained defaults. `None` keeps the default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ManualOverrides {
    pub recal_trim_adrctrl: Option<u8>,
    pub recal_trim_lane: [Option<u8>; 2],
    /// Signed input DQS delay.
    pub dqs_in: [Option<i8>; 2],
    /// Signed output DQS delay.
    pub dqs_out: [Option<i8>; 2],
    pub lane_phase: [Option<u8>; 2],
    pub lane_phase_trim: [Option<i8>; 2],
    /// Added to the write leveling result, bounded by [WRITE_LEVEL_ADJUST_MAX].
    pub write_level_adjust: [Option<i8>; 2],
    pub phy_vref: [Option<u8>; 2],
    pub dram_vref: Option<u8>,
    pub boundary_encoding: Option<u8>,
}

impl ManualOverrides {
    pub fn has_recal_trim(&self) -> bool {
        self.recal_trim_adrctrl.is_some() || self.recal_trim_lane.iter().any(Option::is_some)
    }
}

/// Dynamic recalibration options. Setting both is a misconfiguration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DynamicRecal {
    /// Enable periodic recalibration while the DRAM is in use.
    pub periodic: bool,
    /// Disable all dynamic recalibration.
    pub disabled: bool,
}

/// Optional diagnostic sweeps, one bit per [SweepParameter].
#[bitbybit::bitfield(u16, default = 0x0, debug)]
pub struct DiagnosticSweeps {
    #[bit(9, rw)]
    addr_ctrl_master_trim: bool,
    #[bit(8, rw)]
    dram_vref: bool,
    #[bit(7, rw)]
    phy_vref: bool,
    #[bit(6, rw)]
    addr_ctrl_delay: bool,
    #[bit(5, rw)]
    output_lane_trim: bool,
    #[bit(4, rw)]
    input_dqs: bool,
    #[bit(3, rw)]
    output_dqs: bool,
    #[bit(2, rw)]
    output_dm: bool,
    #[bit(1, rw)]
    input_dq: bool,
    #[bit(0, rw)]
    output_dq: bool,
}

impl DiagnosticSweeps {
    pub fn contains(&self, parameter: SweepParameter) -> bool {
        self.raw_value() & (1 << u8::from(parameter)) != 0
    }

    /// Selected sweeps in execution order.
    pub fn selected(self) -> impl Iterator<Item = SweepParameter> {
        SweepParameter::ALL
            .into_iter()
            .filter(move |parameter| self.contains(*parameter))
    }
}

/// Board specific configuration of the memory subsystem.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub speed: SpeedClass,
    /// CAS latency in clocks.
    pub cas_latency: u8,
    /// CAS write latency in clocks.
    pub cas_write_latency: u8,
    pub soc_drive: Impedance,
    pub soc_odt: Impedance,
    pub dram_drive: Impedance,
    pub dram_rtt_nom: Impedance,
    pub dram_rtt_wr: Impedance,
    pub dram_rtt_park: Impedance,
    /// Largest DRAM size supported by the board, in bytes.
    pub max_size: u64,
    pub ecc: bool,
    pub ecc_exclusions: Vec<EccExclusion, 4>,
    pub gpio: SignalPins,
    pub overrides: ManualOverrides,
    pub diagnostic_sweeps: DiagnosticSweeps,
    pub dynamic_recal: DynamicRecal,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            speed: SpeedClass::Ddr4_1600,
            cas_latency: 11,
            cas_write_latency: 9,
            soc_drive: Impedance::Ohms(40),
            soc_odt: Impedance::Ohms(48),
            dram_drive: Impedance::Ohms(34),
            dram_rtt_nom: Impedance::Ohms(60),
            dram_rtt_wr: Impedance::Off,
            dram_rtt_park: Impedance::Off,
            max_size: 2 * 1024 * 1024 * 1024,
            ecc: false,
            ecc_exclusions: Vec::new(),
            gpio: SignalPins::default(),
            overrides: ManualOverrides::default(),
            diagnostic_sweeps: DiagnosticSweeps::new_with_raw_value(0),
            dynamic_recal: DynamicRecal::default(),
        }
    }
}

/// Package topology found by geometry discovery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    #[default]
    SingleDie,
    /// Dual die package, detected through a low address alias.
    DualDie,
}

/// Values computed by the calibration phases.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub read_latency_adj: u8,
    pub write_latency_adj: u8,
    pub mode_registers: Option<ModeRegisters>,
    /// Detected DRAM size in bytes, clamped to the configured maximum.
    pub raw_size: Option<u64>,
    /// Size available to software. Reduced by the ECC check bytes if ECC is enabled.
    pub usable_size: Option<u64>,
    pub topology: Topology,
    pub boundary_encoding: Option<u8>,
    pub dram_vref: Option<u8>,
    pub phy_vref: [Option<u8>; 2],
    /// Signed per-lane write leveling delay after the manual adjustment.
    pub write_level_delay: [Option<i8>; 2],
}

/// Degradation counters and flags. Non-fatal issues are collected here instead of aborting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    /// Sweeps or training steps which found no valid window and used a default.
    pub hardware_errors: u32,
    pub zq_incomplete: bool,
    pub dll_unlocked: bool,
    pub mpr_bit_level_failed: bool,
    pub dram_vref_implausible: bool,
    /// Correctable ECC events seen by the stress tests.
    pub ecc_corrected: u32,
}

impl Diagnostics {
    pub fn degraded(&self) -> bool {
        self.hardware_errors > 0
            || self.zq_incomplete
            || self.dll_unlocked
            || self.mpr_bit_level_failed
            || self.dram_vref_implausible
    }
}

/// Mutable state threaded through all calibration phases of one boot.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    pub config: SessionConfig,
    pub derived: Derived,
    pub diagnostics: Diagnostics,
    /// Trace every sweep sample.
    pub verbose: bool,
}

impl CalibrationSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            derived: Derived::default(),
            diagnostics: Diagnostics::default(),
            verbose: false,
        }
    }

    /// Clears all computed values before a new calibration attempt.
    pub fn reset_derived(&mut self) {
        self.derived = Derived::default();
        self.diagnostics = Diagnostics::default();
    }

    pub fn mode_registers(&self) -> Result<ModeRegisters, crate::Error> {
        self.derived.mode_registers.ok_or(crate::Error::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_class_conversions() {
        assert_eq!(SpeedClass::Ddr4_1600.dram_clock().raw(), 800_000_000);
        assert_eq!(SpeedClass::Ddr4_1600.ns_to_clocks(260), 208);
        assert_eq!(SpeedClass::Ddr4_2133.ns_to_clocks(550), 587);
        assert!(!SpeedClass::Ddr4_1600.is_fast());
        assert!(SpeedClass::Ddr4_2133.is_fast());
    }

    #[test]
    fn diagnostic_sweep_selection() {
        let sweeps = DiagnosticSweeps::new_with_raw_value(0)
            .with_input_dqs(true)
            .with_output_dq(true)
            .with_dram_vref(true);
        let mut selected = sweeps.selected();
        assert_eq!(selected.next(), Some(SweepParameter::OutputDq));
        assert_eq!(selected.next(), Some(SweepParameter::InputDqs));
        assert_eq!(selected.next(), Some(SweepParameter::DramVref));
        assert_eq!(selected.next(), None);
    }

    #[test]
    fn recal_override_detection() {
        let mut overrides = ManualOverrides::default();
        assert!(!overrides.has_recal_trim());
        overrides.recal_trim_lane[1] = Some(0x20);
        assert!(overrides.has_recal_trim());
    }
}
