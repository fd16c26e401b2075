//! # DDR4 bring-up and calibration for BMC-class SoCs
//!
//! This crate brings up the DDR4 memory subsystem at boot time on top of the register map
//! provided by the [bmc_ddr4] crate. It configures the PHY, trains the signal timing (write
//! leveling, bit leveling, reference voltage search), discovers the installed DRAM capacity and
//! validates the result with pattern based stress tests.
//!
//! The main entry point is [init::configure_ddr4]. All hardware accesses go through the
//! [bmc_ddr4::RegisterBus] and [memory::DramWindow] traits, delays and timestamps through
//! [embedded_hal::delay::DelayNs] and [time::Clock].
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod diag;
pub mod error;
pub mod geometry;
pub mod init;
pub mod leveling;
pub mod memory;
pub mod phy;
pub mod session;
pub mod signal;
pub mod stress;
pub mod sweep;
pub mod time;

#[cfg(test)]
pub(crate) mod sim;

pub use bmc_ddr4 as regs;
pub use error::{Error, Phase, PollTarget};
pub use init::{
    ControllerBringup, DdrResources, DefaultControllerBringup, InitReport, configure_ddr4,
};
pub use session::{CalibrationSession, SessionConfig};

use bmc_ddr4::RegisterBus;
use embedded_hal::delay::DelayNs;
use time::Microseconds;

/// Polls a hardware condition up to `budget` times, waiting `interval` between two polls.
///
/// Returns the number of polls it took, or [Error::Timeout] once the budget is exhausted.
pub(crate) fn poll_until<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    target: PollTarget,
    budget: u32,
    interval: Microseconds,
    mut done: impl FnMut(&mut B) -> bool,
) -> Result<u32, Error> {
    for polls in 1..=budget {
        if done(bus) {
            return Ok(polls);
        }
        delay.delay_us(interval.to_micros());
    }
    Err(Error::Timeout(target))
}
