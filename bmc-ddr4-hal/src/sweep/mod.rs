//! # Sweep framework
//!
//! Steps a [SweepParameter] through its whole range, runs a memory test at every position and
//! derives the passing window (eye) of every data line from the collected failure masks. With
//! centering enabled, the center of each eye is programmed afterwards. Eyes which are too small
//! to be trusted restore the value found before the sweep.
//!
//! The memory test is abstracted by [FailureMaskTest] so the framework does not depend on the
//! stress test engine.
use bmc_ddr4::{BITS_PER_LANE, DQ_COUNT, LANE_COUNT, RegisterBus};
use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::{Error, session::CalibrationSession};

pub mod eye;
pub mod params;

pub use eye::{Eye, find_eye, lane_mask};
pub use params::{Scope, SweepParameter};

/// Capacity of the sample buffer, enough for the widest parameter range.
pub const MAX_SAMPLES: usize = 128;

/// Lane selection bit mask, bit 0 for lane 0.
pub const ALL_LANES: u8 = 0b11;

/// Memory test used as the fitness function of a sweep.
pub trait FailureMaskTest<B: RegisterBus> {
    /// Returns the mask of data lines which failed. Lines set in `pre_failed` are reported as
    /// failed without being tested.
    fn failure_mask(&mut self, bus: &mut B, pre_failed: u16) -> u16;
}

impl<B: RegisterBus, F: FnMut(&mut B, u16) -> u16> FailureMaskTest<B> for F {
    fn failure_mask(&mut self, bus: &mut B, pre_failed: u16) -> u16 {
        self(bus, pre_failed)
    }
}

/// Sample buffer of the sweep in progress. Reused between sweeps.
#[derive(Debug, Default)]
pub struct SweepContext {
    samples: Vec<u16, MAX_SAMPLES>,
}

impl SweepContext {
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    /// Failure masks of the last sweep, indexed by sweep position.
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepRequest {
    pub parameter: SweepParameter,
    /// Lanes to sweep. The other lanes keep their value and are not tested.
    pub lanes: u8,
    /// Program the eye centers after the sweep instead of restoring the original values.
    pub center: bool,
}

impl SweepRequest {
    pub const fn new(parameter: SweepParameter) -> Self {
        Self {
            parameter,
            lanes: ALL_LANES,
            center: true,
        }
    }

    #[inline]
    pub const fn lane_selected(&self, lane: usize) -> bool {
        self.lanes & (1 << lane) != 0
    }

    /// Data lines of the lanes which are not swept.
    pub const fn pre_failed(&self) -> u16 {
        let mut mask = 0;
        let mut lane = 0;
        while lane < LANE_COUNT {
            if !self.lane_selected(lane) {
                mask |= lane_mask(lane);
            }
            lane += 1;
        }
        mask
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// One eye per data line, lane or one for the bus, depending on the parameter scope.
    pub eyes: Vec<Eye, DQ_COUNT>,
    /// Set if at least one eye was too small and the original value was restored.
    pub hw_error: bool,
}

/// Hardware instance of a parameter.
#[derive(Debug, Clone, Copy)]
struct Instance {
    lane: usize,
    bit: usize,
}

fn instances(scope: Scope) -> impl Iterator<Item = Instance> {
    let (lanes, bits) = match scope {
        Scope::Bit => (LANE_COUNT, BITS_PER_LANE),
        Scope::Lane => (LANE_COUNT, 1),
        Scope::Global => (1, 1),
    };
    (0..lanes).flat_map(move |lane| (0..bits).map(move |bit| Instance { lane, bit }))
}

/// Sweeps one parameter.
///
/// Lanes outside the request's lane mask keep their value and their data lines are passed to
/// the test as pre-failed. Too small eyes are counted as hardware errors in the session
/// diagnostics.
pub fn sweep<B: RegisterBus, D: DelayNs, T: FailureMaskTest<B>>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
    ctx: &mut SweepContext,
    test: &mut T,
    request: SweepRequest,
) -> Result<SweepOutcome, Error> {
    let parameter = request.parameter;
    let scope = parameter.scope();
    let selected =
        |instance: &Instance| scope == Scope::Global || request.lane_selected(instance.lane);

    let mut original: Vec<i16, DQ_COUNT> = Vec::new();
    for instance in instances(scope) {
        let value = parameter.read(bus, session, instance.lane, instance.bit);
        original.push(value).map_err(|_| Error::ParameterOutOfRange)?;
    }

    let pre_failed = request.pre_failed();
    ctx.samples.clear();
    for value in parameter.range() {
        let mut step = || -> Result<(), Error> {
            for instance in instances(scope).filter(|instance| selected(instance)) {
                parameter.write(bus, delay, session, instance.lane, instance.bit, value)?;
            }
            let mask = test.failure_mask(bus, pre_failed);
            if session.verbose {
                log::trace!("{:?} {:>4}: {:#06x}", parameter, value, mask);
            }
            ctx.samples
                .push(mask)
                .map_err(|_| Error::ParameterOutOfRange)
        };
        if let Err(e) = step() {
            log::error!("{:?} sweep aborted at {}: {:?}", parameter, value, e);
            restore(bus, delay, session, request, &original);
            return Err(e);
        }
    }

    let eyes: Vec<Eye, DQ_COUNT> = match scope {
        Scope::Bit => Vec::from_slice(&eye::bit_eyes(&ctx.samples)),
        Scope::Lane => Vec::from_slice(&eye::lane_eyes(&ctx.samples)),
        Scope::Global => Vec::from_slice(&[find_eye(&ctx.samples, !pre_failed)]),
    }
    .map_err(|_| Error::ParameterOutOfRange)?;

    let start = *parameter.range().start();
    let mut hw_error = false;
    for (index, instance) in instances(scope).enumerate() {
        if !selected(&instance) {
            continue;
        }
        let eye = eyes[index];
        let value = match eye.center {
            Some(center) if request.center && eye.size >= parameter.min_eye() => {
                start + center as i16
            }
            _ => {
                if request.center {
                    log::warn!(
                        "{:?} lane {} bit {}: eye of {} too small, restoring {}",
                        parameter,
                        instance.lane,
                        instance.bit,
                        eye.size,
                        original[index]
                    );
                    hw_error = true;
                }
                original[index]
            }
        };
        parameter.write(bus, delay, session, instance.lane, instance.bit, value)?;
    }
    if hw_error {
        session.diagnostics.hardware_errors += 1;
    }
    Ok(SweepOutcome { eyes, hw_error })
}

/// Writes back the values found before the sweep. Failures are logged and otherwise ignored.
fn restore<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
    request: SweepRequest,
    original: &[i16],
) {
    let parameter = request.parameter;
    let scope = parameter.scope();
    for (instance, value) in instances(scope).zip(original) {
        if scope != Scope::Global && !request.lane_selected(instance.lane) {
            continue;
        }
        if let Err(e) = parameter.write(bus, delay, session, instance.lane, instance.bit, *value) {
            log::error!(
                "{:?} lane {} bit {}: restoring {} failed: {:?}",
                parameter,
                instance.lane,
                instance.bit,
                value,
                e
            );
        }
    }
}

/// Runs a diagnostic sweep with centering over both lanes.
///
/// The memory must pass a sanity test before and after the sweep. If it does not, the DRAM is
/// considered unresponsive and [Error::DramUnresponsive] is returned.
pub fn diagnostic_sweep<B: RegisterBus, D: DelayNs, T: FailureMaskTest<B>>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
    ctx: &mut SweepContext,
    test: &mut T,
    parameter: SweepParameter,
) -> Result<SweepOutcome, Error> {
    sanity_check(bus, test, parameter, "before")?;
    let outcome = sweep(bus, delay, session, ctx, test, SweepRequest::new(parameter))?;
    for (index, eye) in outcome.eyes.iter().enumerate() {
        log::info!(
            "{:?} eye {}: center {:?}, size {}",
            parameter,
            index,
            eye.center,
            eye.size
        );
    }
    sanity_check(bus, test, parameter, "after")?;
    Ok(outcome)
}

fn sanity_check<B: RegisterBus, T: FailureMaskTest<B>>(
    bus: &mut B,
    test: &mut T,
    parameter: SweepParameter,
    when: &str,
) -> Result<(), Error> {
    let mask = test.failure_mask(bus, 0);
    if mask != 0 {
        log::error!(
            "DRAM failing {} {:?} sweep, failure mask {:#06x}",
            when,
            parameter,
            mask
        );
        return Err(Error::DramUnresponsive);
    }
    Ok(())
}

/// Runs all diagnostic sweeps selected in the session configuration.
pub fn run_diagnostic_sweeps<B: RegisterBus, D: DelayNs, T: FailureMaskTest<B>>(
    bus: &mut B,
    delay: &mut D,
    session: &mut CalibrationSession,
    ctx: &mut SweepContext,
    test: &mut T,
) -> Result<(), Error> {
    for parameter in session.config.diagnostic_sweeps.selected() {
        diagnostic_sweep(bus, delay, session, ctx, test, parameter)?;
    }
    Ok(())
}
