//! # Time units and timestamps

use embedded_hal::delay::DelayNs;

// Frequency based

/// Hertz
pub type Hertz = fugit::HertzU32;
pub type Hz = Hertz;

/// MegaHertz
pub type MegaHertz = fugit::MegahertzU32;
pub type MHz = MegaHertz;

// Period based

/// Milliseconds
pub type Milliseconds = fugit::MillisDurationU32;

/// Microseconds
pub type Microseconds = fugit::MicrosDurationU32;

/// Nanoseconds
pub type Nanoseconds = fugit::NanosDurationU32;

/// Sub-second ticks per second of a [Timestamp].
pub const TICKS_PER_SECOND: u32 = 1_000_000;

/// Timestamp of a free running timer, split into seconds and microsecond ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Sub-second ticks, always below [TICKS_PER_SECOND].
    pub ticks: u32,
    pub seconds: u32,
}

impl Timestamp {
    pub const fn new(seconds: u32, ticks: u32) -> Self {
        Self { ticks, seconds }
    }

    /// Time elapsed since an earlier timestamp. The seconds counter may have wrapped in between.
    pub fn elapsed_since(self, earlier: Timestamp) -> Microseconds {
        let mut seconds = self.seconds.wrapping_sub(earlier.seconds);
        let ticks = if self.ticks >= earlier.ticks {
            self.ticks - earlier.ticks
        } else {
            seconds = seconds.wrapping_sub(1);
            self.ticks + TICKS_PER_SECOND - earlier.ticks
        };
        let micros = seconds.saturating_mul(TICKS_PER_SECOND).saturating_add(ticks);
        Microseconds::from_ticks(micros)
    }
}

/// Source of timestamps.
pub trait Clock {
    fn now(&mut self) -> Timestamp;
}

/// Poll interval of the fast hardware state machines.
pub const POLL_INTERVAL: Microseconds = Microseconds::micros(1);

/// Clock period in picoseconds, truncated.
pub fn period_ps(clock: Hertz) -> u32 {
    (1_000_000_000_000_u64 / clock.to_Hz() as u64) as u32
}

/// Delays for a number of cycles of the DRAM clock.
pub fn delay_dram_clocks<D: DelayNs + ?Sized>(delay: &mut D, clocks: u32, clock: Hertz) {
    let ns = (clocks * period_ps(clock)).div_ceil(1000);
    delay.delay_ns(ns);
}
