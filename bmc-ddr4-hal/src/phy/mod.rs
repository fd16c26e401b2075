//! # PHY bring-up
//!
//! First calibration phase. It places the PHY pads, the delay trims and the DRAM mode register
//! values into a known state which is ready for training:
//!
//!  1. Computes the DRAM mode registers and mirrors them into the PHY.
//!  2. Programs the read and write latency adjustments.
//!  3. Programs the pad drive strength and termination.
//!  4. Programs the speed class dependent default trims.
//!  5. Programs the delay line recalibration trims.
//!  6. Runs the RX and TX impedance calibration.
//!  7. Applies the manual per-lane DQS and phase overrides.
//!  8. Waits for the analog DLL to lock.
use arbitrary_int::{Number, u2, u3, u4, u5};
use bmc_ddr4::{
    BITS_PER_LANE, Field, LANE_COUNT, RegisterBus,
    phy::{
        self, DllLockState, DllStatus, LaneSelect, LatencyAdjust, RecalTrim, WindowTrim,
        ZqCalibration,
    },
};
use embedded_hal::delay::DelayNs;

use crate::{
    Error, PollTarget,
    session::{CalibrationSession, ManualOverrides, SpeedClass},
    time::POLL_INTERVAL,
};

pub mod impedance;
pub mod mode_regs;

pub use mode_regs::ModeRegisters;

pub const ZQ_POLL_BUDGET: u32 = 1000;
pub const DLL_LOCK_POLL_BUDGET: u32 = 1000;

/// Smallest CAS (write) latency supported by the PHY without adjustment.
const BASE_LATENCY: u8 = 9;

/// Selects the lane for the lane banked PHY registers.
pub fn select_lane<B: RegisterBus>(bus: &mut B, lane: usize) {
    select_bit(bus, lane, 0);
}

/// Selects the lane and bit for the bit banked PHY registers.
pub fn select_bit<B: RegisterBus>(bus: &mut B, lane: usize, bit: usize) {
    debug_assert!(lane < LANE_COUNT && bit < BITS_PER_LANE);
    bus.write_reg(
        LaneSelect::builder()
            .with_bit(u3::new(bit as u8))
            .with_lane(u2::new(lane as u8))
            .build(),
    );
}

/// Sign-magnitude encoding used by the delay trims. The sign is the top bit of the field.
pub const fn encode_sign_magnitude(value: i16, width: u8) -> u32 {
    let magnitude = value.unsigned_abs() as u32 & ((1 << (width - 1)) - 1);
    if value < 0 {
        magnitude | (1 << (width - 1))
    } else {
        magnitude
    }
}

pub const fn decode_sign_magnitude(raw: u32, width: u8) -> i16 {
    let sign = 1 << (width - 1);
    let magnitude = (raw & (sign - 1)) as i16;
    if raw & sign != 0 { -magnitude } else { magnitude }
}

fn fits_signed(field: Field, value: i16) -> bool {
    let max = (1i16 << (field.width() - 1)) - 1;
    (-max..=max).contains(&value)
}

/// Writes a signed delay to a sign-magnitude field. Fails if the magnitude does not fit.
pub fn write_signed<B: RegisterBus>(bus: &mut B, field: Field, value: i16) -> Result<(), Error> {
    if !fits_signed(field, value) {
        return Err(Error::ParameterOutOfRange);
    }
    field.write(bus, encode_sign_magnitude(value, field.width()));
    Ok(())
}

/// Runs the PHY bring-up phase.
///
/// The whole sequence always runs. If the impedance calibration or the DLL lock wait exhausted
/// their polling budget, [Error::CalibrationIncomplete] is returned afterwards so the caller can
/// decide whether to retry. Out of range lane overrides are rejected before any register is
/// written.
pub fn phy_bringup<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
) -> Result<(), Error> {
    log::info!("DDR4 PHY bring-up, {:?}", session.config.speed);
    check_lane_overrides(&session.config.overrides)?;
    let mode_regs = mode_regs::compute_mode_registers(&session.config)?;
    session.derived.mode_registers = Some(mode_regs);
    phy::MR01_FIELD.write(bus, mode_regs.phy_mr01());
    phy::MR25_FIELD.write(bus, mode_regs.phy_mr25());

    let latency = program_latency(
        bus,
        session.config.cas_latency,
        session.config.cas_write_latency,
    );
    session.derived.read_latency_adj = latency.read().value();
    session.derived.write_latency_adj = latency.write().value();

    impedance::program_pads(bus, &session.config);
    program_default_trims(bus, session.config.speed);
    program_recal_trim(bus, &session.config.overrides);

    let zq_ok = run_zq_calibration(bus, delay);
    apply_lane_overrides(bus, &session.config.overrides)?;
    let dll_ok = wait_dll_lock(bus, delay);

    session.diagnostics.zq_incomplete = !zq_ok;
    session.diagnostics.dll_unlocked = !dll_ok;
    if zq_ok && dll_ok {
        log::debug!("DDR4 PHY bring-up done");
        Ok(())
    } else {
        Err(Error::CalibrationIncomplete {
            zq: !zq_ok,
            dll_lock: !dll_ok,
        })
    }
}

fn program_latency<B: RegisterBus>(
    bus: &mut B,
    cas_latency: u8,
    cas_write_latency: u8,
) -> LatencyAdjust {
    let to_adj = |latency: u8| u5::new(latency.saturating_sub(BASE_LATENCY).min(u5::MAX.value()));
    let latency = LatencyAdjust::builder()
        .with_write(to_adj(cas_write_latency))
        .with_read(to_adj(cas_latency))
        .build();
    bus.write_reg(latency);
    latency
}

/// Clears all delay trims and programs the speed class dependent window trims.
pub fn program_default_trims<B: RegisterBus>(bus: &mut B, speed: SpeedClass) {
    for lane in 0..LANE_COUNT {
        select_lane(bus, lane);
        phy::LANE_TRIM.write(bus, 0);
        phy::DQS_OUT_TRIM.write(bus, 0);
        phy::DQS_IN_TRIM.write(bus, 0);
        phy::DM_OUT_TRIM.write(bus, 0);
        for bit in 0..BITS_PER_LANE {
            select_bit(bus, lane, bit);
            phy::OP_BIT_TRIM_FIELD.write(bus, 0);
            phy::IP_BIT_TRIM_FIELD.write(bus, 0);
        }
    }
    let (window, dqs_gate) = if speed.is_fast() { (3, 6) } else { (2, 4) };
    bus.write_reg(
        WindowTrim::builder()
            .with_dqs_gate(u4::new(dqs_gate))
            .with_window(u4::new(window))
            .build(),
    );
}

/// Default delay line recalibration trim: a quarter of the measured master delay line length,
/// or half of it if any recalibration trim is overridden manually.
pub fn default_recal_trim(mdl_len: u16, overrides: &ManualOverrides) -> u8 {
    let trim = if overrides.has_recal_trim() {
        mdl_len / 2
    } else {
        mdl_len / 4
    };
    trim.min(u8::MAX as u16) as u8
}

fn program_recal_trim<B: RegisterBus>(bus: &mut B, overrides: &ManualOverrides) {
    let mdl_len = bus.read_reg::<DllStatus>().mdl_len().value();
    let default = default_recal_trim(mdl_len, overrides);
    let trim = RecalTrim::builder()
        .with_lane1(overrides.recal_trim_lane[1].unwrap_or(default))
        .with_lane0(overrides.recal_trim_lane[0].unwrap_or(default))
        .with_adrctrl(overrides.recal_trim_adrctrl.unwrap_or(default))
        .build();
    bus.write_reg(trim);
    log::debug!("DLL master delay line length {}, recal trims {:?}", mdl_len, trim);
}

/// Runs the RX and then the TX impedance calibration. Returns false if one of them did not
/// complete within the polling budget.
fn run_zq_calibration<B: RegisterBus, D: DelayNs>(bus: &mut B, delay: &mut D) -> bool {
    bus.write_reg(ZqCalibration::DEFAULT.with_rx_start(true));
    let rx = crate::poll_until(
        bus,
        delay,
        PollTarget::ZqCalibration,
        ZQ_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| bus.read_reg::<ZqCalibration>().rx_done(),
    );
    if rx.is_err() {
        log::error!("DDR PHY RX impedance calibration timeout");
    }
    bus.write_reg(ZqCalibration::DEFAULT.with_tx_start(true));
    let tx = crate::poll_until(
        bus,
        delay,
        PollTarget::ZqCalibration,
        ZQ_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| bus.read_reg::<ZqCalibration>().tx_done(),
    );
    if tx.is_err() {
        log::error!("DDR PHY TX impedance calibration timeout");
    }
    rx.is_ok() && tx.is_ok()
}

fn check_lane_overrides(overrides: &ManualOverrides) -> Result<(), Error> {
    for lane in 0..LANE_COUNT {
        let signed = [
            (phy::DQS_IN_TRIM, overrides.dqs_in[lane]),
            (phy::DQS_OUT_TRIM, overrides.dqs_out[lane]),
            (phy::LANE_PHASE_TRIM, overrides.lane_phase_trim[lane]),
        ];
        let signed_ok = signed.iter().all(|(field, value)| {
            value.is_none_or(|value| fits_signed(*field, value as i16))
        });
        let phase_ok = overrides.lane_phase[lane]
            .is_none_or(|phase| phase as u32 <= phy::LANE_PHASE.max_value());
        if !signed_ok || !phase_ok {
            log::error!("lane {} manual DQS/phase override out of range", lane);
            return Err(Error::ParameterOutOfRange);
        }
    }
    Ok(())
}

fn apply_lane_overrides<B: RegisterBus>(
    bus: &mut B,
    overrides: &ManualOverrides,
) -> Result<(), Error> {
    for lane in 0..LANE_COUNT {
        let lane_overrides = [
            overrides.dqs_in[lane],
            overrides.dqs_out[lane],
            overrides.lane_phase_trim[lane],
        ];
        if lane_overrides.iter().all(Option::is_none) && overrides.lane_phase[lane].is_none() {
            continue;
        }
        select_lane(bus, lane);
        if let Some(dqs_in) = overrides.dqs_in[lane] {
            write_signed(bus, phy::DQS_IN_TRIM, dqs_in as i16)?;
        }
        if let Some(dqs_out) = overrides.dqs_out[lane] {
            write_signed(bus, phy::DQS_OUT_TRIM, dqs_out as i16)?;
        }
        if let Some(phase) = overrides.lane_phase[lane] {
            phy::LANE_PHASE
                .write_checked(bus, phase as u32)
                .map_err(|_| Error::ParameterOutOfRange)?;
        }
        if let Some(trim) = overrides.lane_phase_trim[lane] {
            write_signed(bus, phy::LANE_PHASE_TRIM, trim as i16)?;
        }
        log::debug!("lane {} manual DQS/phase overrides applied", lane);
    }
    Ok(())
}

/// Waits for the analog DLL to lock. Returns false on timeout.
fn wait_dll_lock<B: RegisterBus, D: DelayNs>(bus: &mut B, delay: &mut D) -> bool {
    match crate::poll_until(
        bus,
        delay,
        PollTarget::DllLock,
        DLL_LOCK_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| bus.read_reg::<DllStatus>().lock() == DllLockState::Locked,
    ) {
        Ok(polls) => {
            log::debug!("DDR PHY DLL locked after {} polls", polls);
            true
        }
        Err(_) => {
            log::error!("DDR PHY DLL lock timeout");
            false
        }
    }
}
