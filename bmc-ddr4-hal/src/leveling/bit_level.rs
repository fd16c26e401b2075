//! Read and write bit leveling.
use bmc_ddr4::{
    RegisterBus,
    phy::{self, BitLevelControl, BitLevelDirection},
};
use embedded_hal::delay::DelayNs;

use super::LEVELING_POLL_BUDGET;
use crate::{Error, Phase, PollTarget, session::CalibrationSession, time::POLL_INTERVAL};

/// Pattern loaded into the DRAM multi purpose register for MPR bit leveling.
pub const MPR_PATTERN: u8 = 0x55;

/// Runs one bit leveling pass and waits for it to complete.
///
/// The write trim override bit is left untouched. Returns [Error::Timeout] if the PHY did not
/// complete and [Error::Fail] with [Phase::BitLeveling] if it reported a failure.
pub fn run_bit_level<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    direction: BitLevelDirection,
    use_mpr: bool,
) -> Result<(), Error> {
    bus.modify_reg::<BitLevelControl, _>(|ctrl| {
        ctrl.with_fail(false)
            .with_done(false)
            .with_use_mpr(use_mpr)
            .with_direction(direction)
            .with_start(true)
    });
    crate::poll_until(
        bus,
        delay,
        PollTarget::BitLeveling,
        LEVELING_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| bus.read_reg::<BitLevelControl>().done(),
    )?;
    if bus.read_reg::<BitLevelControl>().fail() {
        return Err(Error::Fail(Phase::BitLeveling));
    }
    Ok(())
}

/// Read bit leveling against the MPR pattern. A failure is only recorded in the diagnostics.
pub fn run_mpr_bit_leveling<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
) {
    phy::MPR_PATTERN_FIELD.write(bus, MPR_PATTERN as u32);
    if let Err(e) = run_bit_level(bus, delay, BitLevelDirection::Read, true) {
        log::warn!("DDR MPR bit leveling failed: {}", e);
        session.diagnostics.mpr_bit_level_failed = true;
    }
}

fn set_write_trim_override<B: RegisterBus>(bus: &mut B, enable: bool) {
    bus.modify_reg::<BitLevelControl, _>(|ctrl| {
        ctrl.with_start(false).with_wr_trim_override(enable)
    });
}

/// Read and write bit leveling on the DRAM array. The write pass runs with the write trim
/// override enabled. Any failure or timeout fails the phase.
pub fn run_array_bit_leveling<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
) -> Result<(), Error> {
    let fail = |e: Error| {
        log::error!("DDR bit leveling failed: {}", e);
        Error::Fail(Phase::BitLeveling)
    };
    run_bit_level(bus, delay, BitLevelDirection::Read, false).map_err(fail)?;
    set_write_trim_override(bus, true);
    let write = run_bit_level(bus, delay, BitLevelDirection::Write, false);
    set_write_trim_override(bus, false);
    write.map_err(fail)?;
    log::debug!("DDR bit leveling done");
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::session::SessionConfig;
    use crate::sim::{SimBus, SimTimer};

    #[test]
    fn mpr_failure_is_not_fatal() {
        let (mut bus, _) = SimBus::new_pair();
        bus.state().mpr_bit_level_fail = true;
        let mut timer = SimTimer::default();
        let mut session = CalibrationSession::new(SessionConfig::default());
        run_mpr_bit_leveling(&mut bus, &mut timer, &mut session);
        assert!(session.diagnostics.mpr_bit_level_failed);
        assert_eq!(bus.peek(phy::MPR_PATTERN), 0x55);
        let ctrl = BitLevelControl::new_with_raw_value(bus.peek(phy::BIT_LVL_CTRL));
        assert!(ctrl.use_mpr());
    }

    #[test]
    fn write_pass_is_wrapped_in_trim_override() {
        let (mut bus, _) = SimBus::new_pair();
        let mut timer = SimTimer::default();
        run_array_bit_leveling(&mut bus, &mut timer).unwrap();

        let writes: std::vec::Vec<BitLevelControl> = bus
            .state()
            .writes
            .iter()
            .filter(|(reg, _)| *reg == phy::BIT_LVL_CTRL)
            .map(|(_, raw)| BitLevelControl::new_with_raw_value(*raw))
            .collect();
        assert_eq!(writes.len(), 4);
        assert!(writes[0].start() && writes[0].direction() == BitLevelDirection::Read);
        assert!(!writes[0].wr_trim_override() && !writes[0].use_mpr());
        assert!(!writes[1].start() && writes[1].wr_trim_override());
        assert!(writes[2].start() && writes[2].direction() == BitLevelDirection::Write);
        assert!(writes[2].wr_trim_override());
        assert!(!writes[3].start() && !writes[3].wr_trim_override());
    }

    #[test]
    fn array_failure_fails_phase() {
        let (mut bus, _) = SimBus::new_pair();
        // Read pass succeeds, write pass fails.
        bus.state().dram_vref_fail_below = 10;
        let mut timer = SimTimer::default();
        assert_eq!(
            run_array_bit_leveling(&mut bus, &mut timer),
            Err(Error::Fail(Phase::BitLeveling))
        );
        // The override is released even though the pass failed.
        let ctrl = BitLevelControl::new_with_raw_value(bus.peek(phy::BIT_LVL_CTRL));
        assert!(!ctrl.wr_trim_override());
    }
}
