//! Self calibrating logic (SCL) read capture training.
use bmc_ddr4::{
    RegisterBus,
    phy::{self, SclControl, SclStatus},
};
use embedded_hal::delay::DelayNs;

use super::LEVELING_POLL_BUDGET;
use crate::{Error, Phase, PollTarget, time::POLL_INTERVAL};

/// Training data written to the DRAM by the SCL engine.
pub const SCL_PATTERN_0: u32 = 0x789B_3DE0;
pub const SCL_PATTERN_1: u32 = 0xF10E_4A56;

fn scl_pass<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    ctrl: SclControl,
) -> Result<(), Error> {
    bus.write_reg(ctrl.with_done(false).with_start(true));
    crate::poll_until(
        bus,
        delay,
        PollTarget::Scl,
        LEVELING_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| bus.read_reg::<SclControl>().done(),
    )?;
    let status = bus.read_reg::<SclStatus>();
    if status.lane_fail().value() != 0 {
        log::error!("DDR SCL failed, {:?}", status);
        return Err(Error::Fail(Phase::Scl));
    }
    Ok(())
}

/// Writes the training data, then runs the capture training with save and restore of the
/// trained values.
pub fn run_scl<B: RegisterBus, D: DelayNs>(bus: &mut B, delay: &mut D) -> Result<(), Error> {
    phy::MAIN_CLK_DELTA_FIELD.write(bus, 0);
    phy::SCL_DATA_0_FIELD.write(bus, SCL_PATTERN_0);
    phy::SCL_DATA_1_FIELD.write(bus, SCL_PATTERN_1);
    let result = scl_pass(bus, delay, SclControl::DEFAULT.with_write_only(true)).and_then(|_| {
        scl_pass(bus, delay, SclControl::DEFAULT.with_save_restore(true))
    });
    result.map_err(|e| match e {
        Error::Timeout(_) => {
            log::error!("DDR SCL timeout");
            Error::Fail(Phase::Scl)
        }
        e => e,
    })?;
    log::debug!("DDR SCL done");
    Ok(())
}
