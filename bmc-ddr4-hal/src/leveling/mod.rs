//! # Leveling pipeline
//!
//! Trains the data path after the PHY bring-up and the DRAM initialization. The phases run in
//! this order:
//!
//!  1. Write leveling.
//!  2. Read bit leveling against the DRAM MPR pattern.
//!  3. PHY (read) VREF training.
//!  4. DRAM (write) VREF training.
//!  5. Read and write bit leveling against the DRAM array.
//!  6. SCL read capture training.
//!  7. Dynamic recalibration setup.
//!
//! MPR bit leveling and VREF plausibility problems only degrade the session, all other failures
//! abort the pipeline.
use embedded_hal::delay::DelayNs;

use bmc_ddr4::RegisterBus;

use crate::{Error, session::CalibrationSession};

pub mod bit_level;
pub mod recal;
pub mod scl;
pub mod vref;
pub mod write_level;

/// Polls for the completion of a hardware leveling operation, one microsecond apart.
pub const LEVELING_POLL_BUDGET: u32 = 1000;

/// Runs all leveling phases.
///
/// Requires the mode registers computed by the PHY bring-up, returns [Error::NotInitialized]
/// otherwise.
pub fn leveling_pipeline<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
) -> Result<(), Error> {
    session.mode_registers()?;
    recal::validate(session.config.dynamic_recal)?;

    write_level::run_write_leveling(bus, delay, session)?;
    bit_level::run_mpr_bit_leveling(bus, delay, session);
    vref::train_phy_vref(bus, delay, session)?;
    vref::train_dram_vref(bus, delay, session)?;
    bit_level::run_array_bit_leveling(bus, delay)?;
    scl::run_scl(bus, delay)?;
    recal::configure_dynamic_recal(bus, session.config.dynamic_recal)?;

    log::info!(
        "DDR leveling done, write leveling {:?}, PHY VREF {:?}, DRAM VREF {:?}",
        session.derived.write_level_delay,
        session.derived.phy_vref,
        session.derived.dram_vref
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use bmc_ddr4::phy;

    use super::*;
    use crate::{
        Phase,
        phy::mode_regs::compute_mode_registers,
        session::{DynamicRecal, SessionConfig},
        sim::{SimBus, SimTimer},
    };

    fn session(config: SessionConfig) -> CalibrationSession {
        let mut session = CalibrationSession::new(config);
        session.derived.mode_registers = compute_mode_registers(&session.config).ok();
        session
    }

    #[test]
    fn requires_mode_registers() {
        let (mut bus, _) = SimBus::new_pair();
        let mut timer = SimTimer::default();
        let mut session = CalibrationSession::new(SessionConfig::default());
        assert_eq!(
            leveling_pipeline(&mut bus, &mut timer, &mut session),
            Err(Error::NotInitialized)
        );
        assert!(bus.state().writes.is_empty());
    }

    #[test]
    fn misconfiguration_is_detected_before_training() {
        let (mut bus, _) = SimBus::new_pair();
        let mut timer = SimTimer::default();
        let mut session = session(SessionConfig {
            dynamic_recal: DynamicRecal {
                periodic: true,
                disabled: true,
            },
            ..Default::default()
        });
        assert_eq!(
            leveling_pipeline(&mut bus, &mut timer, &mut session),
            Err(Error::Fail(Phase::Misconfiguration))
        );
        assert!(bus.state().writes.is_empty());
    }

    #[test]
    fn full_pipeline() {
        let (mut bus, _) = SimBus::new_pair();
        bus.state().mpr_bit_level_fail = true;
        let mut timer = SimTimer::default();
        let mut session = session(SessionConfig::default());
        leveling_pipeline(&mut bus, &mut timer, &mut session).unwrap();

        assert_eq!(session.derived.write_level_delay, [Some(5), Some(-3)]);
        assert_eq!(session.derived.phy_vref, [Some(26), Some(29)]);
        assert_eq!(session.derived.dram_vref, Some(18));
        assert!(session.diagnostics.mpr_bit_level_failed);
        assert!(session.diagnostics.degraded());
        assert_eq!(bus.write_count(phy::SCL_START), 2);
    }

    #[test]
    fn scl_failure_aborts() {
        let (mut bus, _) = SimBus::new_pair();
        bus.state().scl_lane_fail = 0b01;
        let mut timer = SimTimer::default();
        let mut session = session(SessionConfig::default());
        assert_eq!(
            leveling_pipeline(&mut bus, &mut timer, &mut session),
            Err(Error::Fail(Phase::Scl))
        );
        assert_eq!(bus.write_count(phy::DYN_RECAL), 0);
    }
}
