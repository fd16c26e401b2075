//! # Stress pattern test engine
//!
//! Writes test patterns into a small window at the start of the DRAM, reads them back and
//! reports a 16-bit mask of the failing data lines. The window is always usable because it lies
//! below the smallest supported DRAM size.
//!
//! Sub-tests in execution order, the slowest last:
//!
//!  1. Alternating pattern and its inverse.
//!  2. Golden numbers, each alternated with its inverse per word.
//!  3. Walking one and walking zero.
//!  4. Walking dead: quiet words alternated with a walking one, then the inverse.
//!  5. Copy and compare of an SRAM image.
//!
//! The test returns as soon as all lines failed.
use bmc_ddr4::{
    RegisterBus,
    mc::{EccControl, EccErrorKind, EccStatus},
};

use crate::{memory::DramWindow, sweep::FailureMaskTest};

pub mod patterns;

use patterns::{ALL_FAILED, ALTERNATING, GOLDEN_NUMBERS, fold};

/// Window size of the quick test, in 32-bit words.
pub const QUICK_WINDOW_WORDS: usize = 1024;
/// Default window size of the long test, in 32-bit words.
pub const LONG_WINDOW_WORDS: usize = 4096;

pub struct StressTest<'img, W> {
    window: W,
    sram_image: &'img [u32],
    ecc: bool,
    sweep_words: usize,
    ecc_corrected: u32,
}

impl<'img, W: DramWindow> StressTest<'img, W> {
    /// Creates a stress test over the given DRAM window.
    ///
    /// `sram_image` is copied into the window by the last sub-test. With `ecc` set, the ECC
    /// status is checked after every read instead of comparing the data.
    pub fn new(window: W, sram_image: &'img [u32], ecc: bool) -> Self {
        Self {
            window,
            sram_image,
            ecc,
            sweep_words: LONG_WINDOW_WORDS,
            ecc_corrected: 0,
        }
    }

    /// Window size used when running as the fitness function of a sweep.
    pub fn with_sweep_words(mut self, words: usize) -> Self {
        self.sweep_words = words;
        self
    }

    /// Number of correctable ECC events since the last call.
    pub fn take_ecc_corrected(&mut self) -> u32 {
        core::mem::take(&mut self.ecc_corrected)
    }

    /// Fixed length test used to validate the detected size.
    pub fn quick<B: RegisterBus>(&mut self, bus: &mut B) -> u16 {
        self.run(bus, 0, QUICK_WINDOW_WORDS)
    }

    /// Long test over `words` words. Lines in `pre_failed` are reported as failed and never
    /// tested as newly failing.
    pub fn long<B: RegisterBus>(&mut self, bus: &mut B, pre_failed: u16, words: usize) -> u16 {
        self.run(bus, pre_failed, words)
    }

    fn run<B: RegisterBus>(&mut self, bus: &mut B, pre_failed: u16, words: usize) -> u16 {
        let mut mask = pre_failed;
        mask |= self.pattern_pass(bus, words, |word| {
            if word % 2 == 0 {
                ALTERNATING
            } else {
                !ALTERNATING
            }
        });
        mask |= self.pattern_pass(bus, words, |word| {
            if word % 2 == 0 {
                !ALTERNATING
            } else {
                ALTERNATING
            }
        });
        if mask == ALL_FAILED {
            return mask;
        }
        for golden in GOLDEN_NUMBERS {
            mask |= self.pattern_pass(bus, words, |word| {
                if word % 2 == 0 { golden } else { !golden }
            });
            if mask == ALL_FAILED {
                return mask;
            }
        }
        for walking in [patterns::walking_one, patterns::walking_zero] {
            mask |= self.pattern_pass(bus, words, walking);
            if mask == ALL_FAILED {
                return mask;
            }
        }
        for walking in [patterns::walking_dead_low, patterns::walking_dead_high] {
            mask |= self.pattern_pass(bus, words, walking);
            if mask == ALL_FAILED {
                return mask;
            }
        }
        let image = self.sram_image;
        let image_words = words.min(image.len());
        if image_words > 0 {
            mask |= self.pattern_pass(bus, image_words, |word| image[word]);
        }
        mask
    }

    /// Fills the window with a pattern, then reads it back.
    fn pattern_pass<B: RegisterBus>(
        &mut self,
        bus: &mut B,
        words: usize,
        pattern: impl Fn(usize) -> u32,
    ) -> u16 {
        for word in 0..words {
            self.window.write32(word as u64 * 4, pattern(word));
        }
        let mut mask = 0;
        for word in 0..words {
            let actual = self.window.read32(word as u64 * 4);
            mask |= self.check(bus, actual, pattern(word));
            if mask == ALL_FAILED {
                break;
            }
        }
        mask
    }

    fn check<B: RegisterBus>(&mut self, bus: &mut B, actual: u32, expected: u32) -> u16 {
        if !self.ecc {
            return fold(actual ^ expected);
        }
        let status = bus.read_reg::<EccStatus>();
        match status.kind() {
            EccErrorKind::None => 0,
            EccErrorKind::SingleCorrectable | EccErrorKind::MultipleCorrectable => {
                // The syndrome is not mapped to data lines, correctable errors are only counted.
                self.ecc_corrected += 1;
                bus.modify_reg::<EccControl, _>(|ctrl| ctrl.with_clear_status(true));
                0
            }
            EccErrorKind::Uncorrectable => ALL_FAILED,
        }
    }
}

impl<B: RegisterBus, W: DramWindow> FailureMaskTest<B> for StressTest<'_, W> {
    fn failure_mask(&mut self, bus: &mut B, pre_failed: u16) -> u16 {
        self.long(bus, pre_failed, self.sweep_words)
    }
}
