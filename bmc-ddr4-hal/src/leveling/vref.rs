//! Reference voltage training.
//!
//! Both sides sweep the reference voltage code around the midpoint of the expected signal swing
//! and pick the code where the two eye window edges reported by bit leveling are most balanced.
//! The read side reference is set per lane in the PHY, the write side reference is a single
//! DRAM setting programmed through MR6.
use core::ops::RangeInclusive;

use arbitrary_int::u6;
use bmc_ddr4::{
    LANE_COUNT, RegisterBus,
    dram::{
        ModeRegister, VREF_MAX_CODE, VREF_RANGE1_BASE_PERMILLE, VREF_STEP_DECI_PERMILLE,
    },
    phy::{self, BitLevelDirection, VrefWindows},
};
use embedded_hal::delay::DelayNs;

use super::bit_level::run_bit_level;
use crate::{
    Error,
    phy::{
        mode_regs::{T_VREFDQE, mr6, write_mode_register},
        select_lane,
    },
    session::{CalibrationSession, Impedance, SessionConfig, SpeedClass},
};

/// Codes swept on each side of the midpoint.
pub const VREF_SWEEP_HALF_RANGE: u8 = 10;
pub const PHY_VREF_MAX_CODE: u8 = 63;
/// DRAM VREF codes outside this range indicate that no usable sample was found.
pub const DRAM_VREF_PLAUSIBLE: RangeInclusive<u8> = 5..=45;

/// Midpoint of the signal swing in per-mille of VDDQ for a driver terminated to VDDQ.
///
/// Without termination the signal swings rail to rail.
pub fn swing_midpoint_permille(driver: Impedance, termination: Impedance) -> u32 {
    match (driver.ohms(), termination.ohms()) {
        (Some(ron), Some(rtt)) => {
            let (ron, rtt) = (ron as u32, rtt as u32);
            500 + 500 * ron / (ron + rtt)
        }
        _ => 500,
    }
}

/// PHY VREF code for the DRAM driving into the SoC termination.
pub fn phy_vref_midpoint(config: &SessionConfig) -> u8 {
    let permille = swing_midpoint_permille(config.dram_drive, config.soc_odt);
    let code = (permille - 500) * 128 / 1000;
    code.min(PHY_VREF_MAX_CODE as u32) as u8
}

/// DRAM VREF code (range 1) for the SoC driving into the DRAM termination.
pub fn dram_vref_midpoint(config: &SessionConfig) -> u8 {
    let permille = swing_midpoint_permille(config.soc_drive, config.dram_rtt_nom);
    let code = permille.saturating_sub(VREF_RANGE1_BASE_PERMILLE) * 10 / VREF_STEP_DECI_PERMILLE;
    code.min(VREF_MAX_CODE as u32) as u8
}

/// DRAM VREF of a range 1 code in percent of VDDQ.
pub fn dram_vref_percent(code: u8) -> f32 {
    (VREF_RANGE1_BASE_PERMILLE as f32 + code as f32 * VREF_STEP_DECI_PERMILLE as f32 / 10.0)
        / 10.0
}

fn sweep_range(midpoint: u8, max: u8) -> RangeInclusive<u8> {
    midpoint.saturating_sub(VREF_SWEEP_HALF_RANGE)..=(midpoint + VREF_SWEEP_HALF_RANGE).min(max)
}

/// Codes with the smallest window imbalance seen so far. Codes must be recorded in ascending
/// order.
#[derive(Debug, Default, Clone, Copy)]
struct BestCodes {
    min_diff: Option<u32>,
    lowest: u8,
    highest: u8,
}

impl BestCodes {
    fn record(&mut self, code: u8, diff: u32) {
        match self.min_diff {
            Some(min) if diff > min => (),
            Some(min) if diff == min => self.highest = code,
            _ => {
                self.min_diff = Some(diff);
                self.lowest = code;
                self.highest = code;
            }
        }
    }

    fn midpoint(&self) -> Option<u8> {
        self.min_diff
            .map(|_| ((self.lowest as u16 + self.highest as u16) / 2) as u8)
    }
}

fn window_imbalance<B: RegisterBus>(bus: &mut B, lane: usize) -> u32 {
    select_lane(bus, lane);
    let windows = bus.read_reg::<VrefWindows>();
    windows.window_0().abs_diff(windows.window_1()) as u32
}

fn vref_code(code: u8) -> Result<u6, Error> {
    if code > VREF_MAX_CODE {
        return Err(Error::ParameterOutOfRange);
    }
    Ok(u6::new(code))
}

/// Enters VREF training mode and sets the code. The DRAM needs the training mode to accept a
/// new VREF value.
pub fn enter_dram_vref_training<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    speed: SpeedClass,
    code: u8,
) -> Result<(), Error> {
    let value = mr6(vref_code(code)?, true);
    write_mode_register(bus, delay, speed, ModeRegister::Mr6, value)?;
    write_mode_register(bus, delay, speed, ModeRegister::Mr6, value)?;
    delay.delay_us(T_VREFDQE.to_micros());
    Ok(())
}

pub fn exit_dram_vref_training<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    speed: SpeedClass,
    code: u8,
) -> Result<(), Error> {
    let value = mr6(vref_code(code)?, false);
    write_mode_register(bus, delay, speed, ModeRegister::Mr6, value)?;
    delay.delay_us(T_VREFDQE.to_micros());
    Ok(())
}

/// Programs a DRAM VREF code with the complete MR6 training sequence.
pub fn program_dram_vref<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    speed: SpeedClass,
    code: u8,
) -> Result<(), Error> {
    enter_dram_vref_training(bus, delay, speed, code)?;
    exit_dram_vref_training(bus, delay, speed, code)
}

/// Trains the read side reference voltage of both lanes.
///
/// Lanes with a manual override are programmed with it and not trained. A lane without any
/// passing sample uses the computed midpoint and counts as a hardware error.
pub fn train_phy_vref<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
) -> Result<(), Error> {
    let midpoint = phy_vref_midpoint(&session.config);
    for lane in 0..LANE_COUNT {
        let code = match session.config.overrides.phy_vref[lane] {
            Some(code) => code,
            None => {
                let mut best = BestCodes::default();
                for code in sweep_range(midpoint, PHY_VREF_MAX_CODE) {
                    select_lane(bus, lane);
                    phy::VREF_CODE.write(bus, code as u32);
                    if run_bit_level(bus, delay, BitLevelDirection::Read, false).is_err() {
                        continue;
                    }
                    best.record(code, window_imbalance(bus, lane));
                }
                best.midpoint().unwrap_or_else(|| {
                    log::warn!("lane {} no passing PHY VREF sample, using {}", lane, midpoint);
                    session.diagnostics.hardware_errors += 1;
                    midpoint
                })
            }
        };
        select_lane(bus, lane);
        phy::VREF_CODE
            .write_checked(bus, code as u32)
            .map_err(|_| Error::ParameterOutOfRange)?;
        session.derived.phy_vref[lane] = Some(code);
        log::debug!("lane {} PHY VREF code {}", lane, code);
    }
    Ok(())
}

/// Trains the write side reference voltage of the DRAM.
///
/// The score of a code is the sum of the window imbalance of both lanes. A code outside the
/// plausible range or a sweep without passing samples is flagged in the diagnostics but does not
/// fail the phase.
pub fn train_dram_vref<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
) -> Result<(), Error> {
    let speed = session.config.speed;
    if let Some(code) = session.config.overrides.dram_vref {
        program_dram_vref(bus, delay, speed, code)?;
        session.derived.dram_vref = Some(code);
        log::debug!("DRAM VREF code {} (manual)", code);
        return Ok(());
    }

    let midpoint = dram_vref_midpoint(&session.config);
    let mut best = BestCodes::default();
    for code in sweep_range(midpoint, VREF_MAX_CODE) {
        enter_dram_vref_training(bus, delay, speed, code)?;
        if run_bit_level(bus, delay, BitLevelDirection::Write, false).is_err() {
            continue;
        }
        let score = (0..LANE_COUNT)
            .map(|lane| window_imbalance(bus, lane))
            .sum();
        best.record(code, score);
    }
    let code = match best.midpoint() {
        Some(code) => code,
        None => {
            log::error!("no passing DRAM VREF sample");
            session.diagnostics.dram_vref_implausible = true;
            midpoint
        }
    };
    if !DRAM_VREF_PLAUSIBLE.contains(&code) {
        log::error!("implausible DRAM VREF code {}", code);
        session.diagnostics.dram_vref_implausible = true;
    }
    enter_dram_vref_training(bus, delay, speed, code)?;
    exit_dram_vref_training(bus, delay, speed, code)?;
    session.derived.dram_vref = Some(code);
    log::info!(
        "DRAM VREF code {} ({}% of VDDQ)",
        code,
        dram_vref_percent(code)
    );
    Ok(())
}
