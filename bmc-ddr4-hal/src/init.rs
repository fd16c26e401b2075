//! # DDR4 bring-up orchestration
//!
//! [configure_ddr4] runs the complete boot time bring-up of the memory subsystem:
//!
//!  1. Guard against a second initialization.
//!  2. Reset pulse of the memory controller and the PHY.
//!  3. PHY bring-up, see [crate::phy].
//!  4. Controller initialization through [ControllerBringup].
//!  5. DRAM mode register programming and ZQ calibration.
//!  6. Leveling pipeline with refresh disabled, see [crate::leveling].
//!  7. Optional diagnostic sweeps, see [crate::sweep].
//!  8. Geometry discovery, see [crate::geometry].
//!  9. Quick stress test and publication of the size.
//! 10. Optional ECC initialization.
//! 11. Long stress test and result signaling.
//!
//! Steps 2 to 9 are retried as a whole for errors which a new attempt could resolve.
use arbitrary_int::{Number, u4, u5, u6};
use bmc_ddr4::{
    RegisterBus,
    dram::ModeRegister,
    gcr::{self, IntCr2, ResetControl},
    mc::{self, DramTiming, EccControl, McControl, McStatus, MemInitControl, RefreshControl},
};
use embedded_hal::delay::DelayNs;

use crate::{
    Error, Phase, PollTarget, diag,
    geometry::{self, GIB, MIB},
    leveling::{self, vref},
    memory::DramWindow,
    phy::{
        self,
        mode_regs::{mr6, write_mode_register, zq_calibration_long},
    },
    session::{CalibrationSession, Topology},
    signal::{self, BootSignals},
    stress::{LONG_WINDOW_WORDS, StressTest},
    sweep::{self, SweepContext},
    time::{Clock, Microseconds, POLL_INTERVAL},
};

/// Hold time of the reset pulse, and wait time after it.
pub const RESET_HOLD: Microseconds = Microseconds::micros(10);
pub const CONTROLLER_INIT_POLL_BUDGET: u32 = 1000;
/// Polls of the memory initialization engine, [MEM_INIT_POLL_INTERVAL] apart.
pub const MEM_INIT_POLL_BUDGET: u32 = 100_000;
pub const MEM_INIT_POLL_INTERVAL: Microseconds = Microseconds::micros(100);
/// The size scratch register only holds sizes up to 2 GiB.
pub const SCRATCH_SIZE_MAX: u64 = 2 * GIB;
const PAGE_SHIFT: u32 = 12;

/// Chip specific controller initialization. Called once per attempt, after the PHY bring-up
/// and before the DRAM mode registers are programmed.
pub trait ControllerBringup<B: RegisterBus> {
    fn init_controller<D: DelayNs>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        session: &CalibrationSession,
    ) -> Result<(), Error>;
}

/// Programs the DRAM timing and starts the controller initialization sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultControllerBringup;

impl<B: RegisterBus> ControllerBringup<B> for DefaultControllerBringup {
    fn init_controller<D: DelayNs>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        session: &CalibrationSession,
    ) -> Result<(), Error> {
        let config = &session.config;
        let clocks = |value: u8| u5::new(value.min(u5::MAX.value()));
        bus.write_reg(
            DramTiming::builder()
                .with_write_recovery(clocks(config.speed.write_recovery_clocks()))
                .with_cas_write_latency(clocks(config.cas_write_latency))
                .with_cas_latency(clocks(config.cas_latency))
                .build(),
        );
        bus.write_reg(McControl::DEFAULT.with_start(true));
        let polls = crate::poll_until(
            bus,
            delay,
            PollTarget::ControllerInit,
            CONTROLLER_INIT_POLL_BUDGET,
            POLL_INTERVAL,
            |bus| bus.read_reg::<McStatus>().initialized(),
        )
        .inspect_err(|_| log::error!("DDR controller initialization timeout"))?;
        log::debug!("DDR controller initialized after {} polls", polls);
        Ok(())
    }
}

/// Hardware used by the bring-up.
pub struct DdrResources<'img, B, W, T, S> {
    pub bus: B,
    /// DRAM window, at least [geometry::probe_window_len] of the configured maximum size long.
    pub dram: W,
    /// Delay source and timestamps for the timing report.
    pub timer: T,
    pub signals: S,
    /// Image copied into the DRAM by the stress tests, usually the start of the SRAM.
    pub sram_image: &'img [u32],
}

impl<'img, B, W, T, S> DdrResources<'img, B, W, T, S> {
    pub fn new(bus: B, dram: W, timer: T, signals: S, sram_image: &'img [u32]) -> Self {
        Self {
            bus,
            dram,
            timer,
            signals,
            sram_image,
        }
    }
}

/// Summary of a successful bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    /// Number of attempts including the successful one.
    pub attempts: u16,
    pub raw_size: u64,
    pub usable_size: u64,
    pub topology: Topology,
    pub ecc: bool,
    /// Result of the long stress test. A failure does not revoke the published size.
    pub final_test_passed: bool,
    pub hardware_errors: u32,
    pub degraded: bool,
}

/// Brings up the DDR4 memory subsystem.
///
/// Runs up to `retries + 1` attempts. On success the usable size is published in the scratch
/// registers and the boundary registers hold the size encoding. Errors which are not
/// [retryable](Error::is_retryable) end the bring-up immediately. If the memory subsystem was
/// already initialized by an earlier boot stage, [Error::AlreadyInitialized] is returned after a
/// single register read.
pub fn configure_ddr4<B, W, T, S, C>(
    res: &mut DdrResources<'_, B, W, T, S>,
    bringup: &mut C,
    session: &mut CalibrationSession,
    retries: u8,
) -> Result<InitReport, Error>
where
    B: RegisterBus,
    W: DramWindow,
    T: DelayNs + Clock,
    S: BootSignals,
    C: ControllerBringup<B>,
{
    let intcr2 = res.bus.read_reg::<IntCr2>();
    if intcr2.ddr_configured() && intcr2.mc_running() {
        log::info!("DDR already initialized");
        return Err(Error::AlreadyInitialized);
    }
    signal::configure_pins(&mut res.signals, &session.config.gpio);

    let start = res.timer.now();
    let mut ctx = SweepContext::new();
    let mut attempt: u16 = 0;
    loop {
        attempt += 1;
        session.reset_derived();
        let attempt_start = res.timer.now();
        let last_attempt = attempt > retries as u16;
        let result = calibrate(res, bringup, session, &mut ctx, last_attempt);
        log::info!(
            "DDR calibration attempt {} took {} ms",
            attempt,
            res.timer.now().elapsed_since(attempt_start).to_millis()
        );
        match result {
            Ok(()) => break,
            Err(e) if e.is_retryable() && !last_attempt => {
                log::warn!("DDR calibration attempt {} failed: {}, retrying", attempt, e);
            }
            Err(e) => {
                log::error!("DDR calibration failed after {} attempts: {}", attempt, e);
                return Err(e);
            }
        }
    }

    let final_test_passed = finish(res, session)?;
    signal::raise(&mut res.signals, session.config.gpio.complete);
    res.bus
        .modify_reg::<IntCr2, _>(|intcr2| intcr2.with_ddr_configured(true));

    let report = InitReport {
        attempts: attempt,
        raw_size: session.derived.raw_size.unwrap_or(0),
        usable_size: session.derived.usable_size.unwrap_or(0),
        topology: session.derived.topology,
        ecc: session.config.ecc,
        final_test_passed,
        hardware_errors: session.diagnostics.hardware_errors,
        degraded: session.diagnostics.degraded(),
    };
    log::info!(
        "DDR ready in {} ms, {:?}",
        res.timer.now().elapsed_since(start).to_millis(),
        report
    );
    Ok(report)
}

/// One calibration attempt, up to and including the publication of the size.
fn calibrate<B, W, T, S, C>(
    res: &mut DdrResources<'_, B, W, T, S>,
    bringup: &mut C,
    session: &mut CalibrationSession,
    ctx: &mut SweepContext,
    last_attempt: bool,
) -> Result<(), Error>
where
    B: RegisterBus,
    W: DramWindow,
    T: DelayNs,
    C: ControllerBringup<B>,
{
    let DdrResources {
        bus,
        dram,
        timer,
        sram_image,
        ..
    } = res;

    reset_pulse(bus, timer);
    match phy::phy_bringup(bus, timer, session) {
        Ok(()) => (),
        Err(Error::CalibrationIncomplete { zq, dll_lock }) if last_attempt => {
            log::warn!(
                "DDR PHY calibration incomplete (ZQ {}, DLL lock {}), continuing degraded",
                zq,
                dll_lock
            );
        }
        Err(e) => return Err(e),
    }
    bringup.init_controller(bus, timer, session)?;
    program_mode_registers(bus, timer, session)?;

    set_refresh(bus, false);
    let leveling = leveling::leveling_pipeline(bus, timer, session);
    set_refresh(bus, true);
    leveling?;

    let mut test = StressTest::new(&mut *dram, *sram_image, false);
    sweep::run_diagnostic_sweeps(bus, timer, session, ctx, &mut test)?;

    geometry::discover(bus, dram, session)?;

    let mask = StressTest::new(&mut *dram, *sram_image, false).quick(bus);
    if mask != 0 {
        log::error!("DDR size validation failed, failure mask {:#06x}", mask);
        diag::dump_registers(bus);
        return Err(Error::Fail(Phase::Validation));
    }
    publish(bus, session.derived.usable_size.unwrap_or(0));
    Ok(())
}

/// ECC initialization and the final stress test. Returns the stress test result.
fn finish<B, W, T, S>(
    res: &mut DdrResources<'_, B, W, T, S>,
    session: &mut CalibrationSession,
) -> Result<bool, Error>
where
    B: RegisterBus,
    W: DramWindow,
    T: DelayNs,
    S: BootSignals,
{
    let raw_size = session.derived.raw_size.unwrap_or(0);
    let ecc = session.config.ecc;
    if ecc {
        init_ecc(&mut res.bus, &mut res.timer, session, raw_size)?;
    }

    let mut test = StressTest::new(&mut res.dram, res.sram_image, ecc);
    let mask = test.long(&mut res.bus, 0, LONG_WINDOW_WORDS);
    session.diagnostics.ecc_corrected += test.take_ecc_corrected();
    if mask != 0 {
        log::error!("DDR final stress test failed, failure mask {:#06x}", mask);
        return Ok(false);
    }
    log::info!("DDR final stress test passed");
    signal::raise(&mut res.signals, session.config.gpio.pass);
    if !ecc {
        run_memory_init(&mut res.bus, &mut res.timer, raw_size)?;
    }
    Ok(true)
}

fn reset_pulse<B: RegisterBus, D: DelayNs>(bus: &mut B, delay: &mut D) {
    bus.write_reg(
        ResetControl::DEFAULT
            .with_phy_reset(true)
            .with_mc_reset(true),
    );
    delay.delay_us(RESET_HOLD.to_micros());
    bus.write_reg(ResetControl::DEFAULT);
    delay.delay_us(RESET_HOLD.to_micros());
}

/// DRAM initialization sequence: MR3, MR6, MR5, MR4, MR2, MR1, MR0, then a long ZQ
/// calibration.
pub fn program_mode_registers<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &CalibrationSession,
) -> Result<(), Error> {
    let regs = session.mode_registers()?;
    let speed = session.config.speed;
    let vref = vref::dram_vref_midpoint(&session.config);
    let sequence = [
        (ModeRegister::Mr3, 0),
        (ModeRegister::Mr6, mr6(u6::new(vref), false)),
        (ModeRegister::Mr5, regs.mr5),
        (ModeRegister::Mr4, 0),
        (ModeRegister::Mr2, regs.mr2),
        (ModeRegister::Mr1, regs.mr1),
        (ModeRegister::Mr0, regs.mr0),
    ];
    for (mode_register, value) in sequence {
        write_mode_register(bus, delay, speed, mode_register, value)?;
    }
    zq_calibration_long(bus, delay, speed)?;
    log::debug!("DRAM mode registers programmed, {:?}", regs);
    Ok(())
}

fn set_refresh<B: RegisterBus>(bus: &mut B, enable: bool) {
    bus.modify_reg::<RefreshControl, _>(|refresh| refresh.with_disable(!enable));
}

fn publish<B: RegisterBus>(bus: &mut B, usable_size: u64) {
    gcr::SCRATCH_SIZE_FIELD.write(bus, usable_size.min(SCRATCH_SIZE_MAX) as u32);
    gcr::SCRATCH_SIZE_MB_FIELD.write(bus, (usable_size / MIB) as u32);
}

/// Programs the exclusion regions, enables ECC and initializes the check bits of the whole
/// memory.
fn init_ecc<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    session: &CalibrationSession,
    raw_size: u64,
) -> Result<(), Error> {
    let exclusions = &session.config.ecc_exclusions;
    for (n, exclusion) in exclusions.iter().enumerate() {
        bus.write(mc::ecc_exclusion_start(n), exclusion.start);
        bus.write(mc::ecc_exclusion_end(n), exclusion.end);
    }
    bus.write_reg(
        EccControl::DEFAULT
            .with_exclusion_enable(u4::new((1u8 << exclusions.len()) - 1))
            .with_clear_status(true)
            .with_enable(true),
    );
    run_memory_init(bus, delay, raw_size).map_err(|e| {
        log::error!("DDR ECC initialization failed: {}", e);
        Error::Fail(Phase::EccInit)
    })?;
    log::info!("DDR ECC enabled, {} exclusion regions", exclusions.len());
    Ok(())
}

/// Clears `size` bytes from the start of the DRAM with the memory initialization engine.
fn run_memory_init<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    size: u64,
) -> Result<(), Error> {
    mc::MEM_INIT_START_PAGE.write(bus, 0);
    mc::MEM_INIT_SIZE_PAGES.write(bus, (size >> PAGE_SHIFT) as u32);
    bus.write_reg(MemInitControl::DEFAULT.with_go(true));
    crate::poll_until(
        bus,
        delay,
        PollTarget::MemoryInit,
        MEM_INIT_POLL_BUDGET,
        MEM_INIT_POLL_INTERVAL,
        |bus| bus.read_reg::<MemInitControl>().done(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use embedded_hal::digital::PinState;

    use super::*;
    use crate::{
        session::{EccExclusion, SessionConfig, SignalPins},
        sim::{SimBus, SimMemory, SimSignals, SimTimer},
    };

    const IMAGE: [u32; 4] = [0xE59F_F018, 0xE59F_F018, 0xE59F_F018, 0xE59F_F018];

    type Resources = DdrResources<'static, SimBus, SimMemory, SimTimer, SimSignals>;

    fn resources() -> (SimBus, Resources) {
        let (bus, mem) = SimBus::new_pair();
        let res = DdrResources::new(
            bus.clone(),
            mem,
            SimTimer::default(),
            SimSignals::default(),
            &IMAGE,
        );
        (bus, res)
    }

    fn config() -> SessionConfig {
        SessionConfig {
            gpio: SignalPins {
                pass: Some(5),
                complete: Some(6),
            },
            ..Default::default()
        }
    }

    #[test]
    fn two_gib_without_ecc() {
        let (bus, mut res) = resources();
        let mut session = CalibrationSession::new(config());
        let report =
            configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 0).unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.raw_size, 2 * GIB);
        assert_eq!(report.usable_size, 2 * GIB);
        assert!(report.final_test_passed);
        assert!(!report.degraded);
        assert_eq!(bus.peek(gcr::GMMAP0), 0x6F);
        assert_eq!(bus.peek(gcr::GMMAP1), 0x6F);
        assert_eq!(bus.peek(gcr::SCRATCH_SIZE), 0x8000_0000);
        assert_eq!(bus.peek(gcr::SCRATCH_SIZE_MB), 2048);
        assert!(IntCr2::new_with_raw_value(bus.peek(gcr::INTCR2)).ddr_configured());
        // Bulk initialization only, ECC is off.
        assert_eq!(bus.state().mem_init_runs, 1);
        assert_eq!(res.signals.configured, [5, 6]);
        assert_eq!(res.signals.level(5), Some(PinState::High));
        assert_eq!(res.signals.level(6), Some(PinState::High));
    }

    #[test]
    fn mode_register_order() {
        let (bus, mut res) = resources();
        let mut session = CalibrationSession::new(config());
        configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 0).unwrap();

        // Refresh is enabled again after leveling.
        let refresh = RefreshControl::new_with_raw_value(bus.peek(mc::REFRESH));
        assert!(!refresh.disable());
        let state = bus.state();
        let order: [ModeRegister; 7] = core::array::from_fn(|i| state.mrs_log[i].0);
        assert_eq!(
            order,
            [
                ModeRegister::Mr3,
                ModeRegister::Mr6,
                ModeRegister::Mr5,
                ModeRegister::Mr4,
                ModeRegister::Mr2,
                ModeRegister::Mr1,
                ModeRegister::Mr0
            ]
        );
        // Initial VREF is the computed midpoint.
        assert_eq!(state.mrs_log[1].1, 15);
        assert_eq!(state.zq_long_count, 1);
    }

    #[test]
    fn half_gib_with_ecc() {
        let (bus, mut res) = resources();
        bus.state().dram_size = 512 * MIB;
        let mut config = config();
        config.ecc = true;
        config
            .ecc_exclusions
            .push(EccExclusion {
                start: 0x0100_0000,
                end: 0x01FF_FFFF,
            })
            .unwrap();
        let mut session = CalibrationSession::new(config);
        let report =
            configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 0).unwrap();

        assert_eq!(report.raw_size, 512 * MIB);
        assert_eq!(report.usable_size, 7 * ((512 * MIB) >> 3));
        assert!(report.ecc && report.final_test_passed);
        assert_eq!(bus.peek(gcr::SCRATCH_SIZE), 448 * MIB as u32);
        assert_eq!(bus.peek(gcr::SCRATCH_SIZE_MB), 448);
        let refresh = RefreshControl::new_with_raw_value(bus.peek(mc::REFRESH));
        assert_eq!(refresh.t_rfc().value(), 208);
        let ecc = EccControl::new_with_raw_value(bus.peek(mc::ECC_CTRL));
        assert!(ecc.enable());
        assert_eq!(ecc.exclusion_enable().value(), 0b0001);
        assert_eq!(bus.peek(mc::ecc_exclusion_end(0)), 0x01FF_FFFF);
        // The ECC initialization covers the raw size.
        assert_eq!(bus.peek(mc::MEM_INIT_SIZE), (512 * MIB >> 12) as u32);
        assert_eq!(bus.state().mem_init_runs, 1);
    }

    #[test]
    fn already_initialized_touches_nothing() {
        let (bus, mut res) = resources();
        bus.poke(gcr::INTCR2, (1 << 13) | (1 << 12));
        let mut session = CalibrationSession::new(config());
        assert_eq!(
            configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 3),
            Err(Error::AlreadyInitialized)
        );
        assert_eq!(bus.state().reads, 1);
        assert!(bus.state().writes.is_empty());
        assert!(res.signals.configured.is_empty());
    }

    #[derive(Default)]
    struct CountingBringup {
        calls: u8,
    }

    impl ControllerBringup<SimBus> for CountingBringup {
        fn init_controller<D: DelayNs>(
            &mut self,
            bus: &mut SimBus,
            delay: &mut D,
            session: &CalibrationSession,
        ) -> Result<(), Error> {
            self.calls += 1;
            DefaultControllerBringup.init_controller(bus, delay, session)
        }
    }

    #[test]
    fn persistent_failure_is_retried() {
        let (bus, mut res) = resources();
        bus.state().scl_lane_fail = 0b01;
        let mut session = CalibrationSession::new(config());
        let mut bringup = CountingBringup::default();
        assert_eq!(
            configure_ddr4(&mut res, &mut bringup, &mut session, 2),
            Err(Error::Fail(Phase::Scl))
        );
        assert_eq!(bringup.calls, 3);
        assert_eq!(bus.write_count(bmc_ddr4::phy::SCL_START), 3);
        // Nothing was published.
        assert_eq!(bus.write_count(gcr::SCRATCH_SIZE), 0);
        assert_eq!(res.signals.level(6), Some(PinState::Low));
    }

    #[test]
    fn misconfiguration_is_not_retried() {
        let (bus, mut res) = resources();
        let mut config = config();
        config.dynamic_recal.periodic = true;
        config.dynamic_recal.disabled = true;
        let mut session = CalibrationSession::new(config);
        assert_eq!(
            configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 2),
            Err(Error::Fail(Phase::Misconfiguration))
        );
        assert_eq!(bus.write_count(gcr::RESET_CTRL), 2);
    }

    #[test]
    fn incomplete_phy_calibration_continues_on_last_attempt() {
        let (bus, mut res) = resources();
        bus.state().dll_never_locks = true;
        let mut session = CalibrationSession::new(config());
        let report =
            configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 1).unwrap();
        assert_eq!(report.attempts, 2);
        assert!(report.degraded);
        assert!(session.diagnostics.dll_unlocked);
        // One reset pulse per attempt.
        assert_eq!(bus.write_count(gcr::RESET_CTRL), 4);
    }

    #[test]
    fn final_test_failure_keeps_published_size() {
        let (bus, mut res) = resources();
        // A faulty line beyond the quick test window.
        bus.state().faulty_dq = 0x0100;
        bus.state().faulty_window = 8192..8196;
        let mut session = CalibrationSession::new(config());
        let report =
            configure_ddr4(&mut res, &mut DefaultControllerBringup, &mut session, 0).unwrap();

        assert!(!report.final_test_passed);
        assert_eq!(bus.peek(gcr::SCRATCH_SIZE_MB), 2048);
        assert_eq!(bus.state().mem_init_runs, 0);
        assert_eq!(res.signals.level(5), Some(PinState::Low));
        assert_eq!(res.signals.level(6), Some(PinState::High));
    }
}
