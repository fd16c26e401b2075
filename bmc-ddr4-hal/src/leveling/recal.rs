//! Dynamic recalibration while the DRAM is in use.
use bmc_ddr4::{RegisterBus, phy::DynamicRecal};

use crate::{Error, Phase, session};

/// Interval of the periodic recalibration, in microseconds.
pub const DYNAMIC_RECAL_INTERVAL_US: u16 = 1000;

/// Rejects enabling and disabling the dynamic recalibration at the same time.
pub fn validate(options: session::DynamicRecal) -> Result<(), Error> {
    if options.periodic && options.disabled {
        log::error!("dynamic recalibration both enabled and disabled");
        return Err(Error::Fail(Phase::Misconfiguration));
    }
    Ok(())
}

/// Enables or disables the dynamic recalibration. The hardware default is left untouched if
/// neither option is set.
pub fn configure_dynamic_recal<B: RegisterBus>(
    bus: &mut B,
    options: session::DynamicRecal,
) -> Result<(), Error> {
    validate(options)?;
    if options.periodic {
        bus.modify_reg::<DynamicRecal, _>(|recal| {
            recal
                .with_interval(DYNAMIC_RECAL_INTERVAL_US)
                .with_periodic_dll_recal(true)
                .with_dyn_write_bit_level(true)
                .with_dyn_read_bit_level(true)
        });
        log::debug!("periodic recalibration every {} us", DYNAMIC_RECAL_INTERVAL_US);
    } else if options.disabled {
        bus.modify_reg::<DynamicRecal, _>(|recal| {
            recal
                .with_periodic_dll_recal(false)
                .with_dyn_write_bit_level(false)
                .with_dyn_read_bit_level(false)
        });
    }
    Ok(())
}
