//! Hardware assisted write leveling.
use bmc_ddr4::{
    LANE_COUNT, RegisterBus,
    phy::{self, WriteLevelControl},
};
use embedded_hal::delay::DelayNs;

use super::LEVELING_POLL_BUDGET;
use crate::{
    Error, Phase, PollTarget,
    phy::{decode_sign_magnitude, select_lane, write_signed},
    session::{CalibrationSession, WRITE_LEVEL_ADJUST_MAX},
    time::POLL_INTERVAL,
};

/// Largest magnitude of the lane trim.
const LANE_TRIM_MAX: i16 = 63;

/// Manual adjustment of a lane, bounded to [WRITE_LEVEL_ADJUST_MAX].
fn bounded_adjust(adjust: Option<i8>, lane: usize) -> i16 {
    let Some(adjust) = adjust else {
        return 0;
    };
    let bounded = adjust.clamp(-WRITE_LEVEL_ADJUST_MAX, WRITE_LEVEL_ADJUST_MAX);
    if bounded != adjust {
        log::warn!(
            "lane {} write leveling adjustment {} limited to {}",
            lane,
            adjust,
            bounded
        );
    }
    bounded as i16
}

/// Runs write leveling and programs the adjusted per-lane results into the lane trims.
///
/// A timeout or a failure reported by the PHY fails the phase.
pub fn run_write_leveling<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
) -> Result<(), Error> {
    let enabled = WriteLevelControl::DEFAULT.with_enable(true);
    bus.write_reg(enabled);
    bus.write_reg(enabled.with_start(true));
    let result = crate::poll_until(
        bus,
        delay,
        PollTarget::WriteLeveling,
        LEVELING_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| bus.read_reg::<WriteLevelControl>().done(),
    );
    let ctrl = bus.read_reg::<WriteLevelControl>();
    bus.write_reg(WriteLevelControl::DEFAULT);
    if result.is_err() || ctrl.fail() {
        log::error!("DDR write leveling failed, {:?}", ctrl);
        return Err(Error::Fail(Phase::WriteLeveling));
    }

    for lane in 0..LANE_COUNT {
        select_lane(bus, lane);
        let measured = decode_sign_magnitude(phy::WRLVL_DELAY.read(bus), phy::WRLVL_DELAY.width());
        let adjust = bounded_adjust(session.config.overrides.write_level_adjust[lane], lane);
        let trim = (measured + adjust).clamp(-LANE_TRIM_MAX, LANE_TRIM_MAX);
        write_signed(bus, phy::LANE_TRIM, trim)?;
        session.derived.write_level_delay[lane] = Some(trim as i8);
        log::debug!(
            "lane {} write leveling {} adjusted by {}: {}",
            lane,
            measured,
            adjust,
            trim
        );
    }
    Ok(())
}
