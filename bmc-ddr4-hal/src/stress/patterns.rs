//! Test patterns of the stress test engine.

/// Every data line failed.
pub const ALL_FAILED: u16 = 0xFFFF;

pub const ALTERNATING: u32 = 0xAAAA_AAAA;

const GOLDEN_BASE: [u32; 8] = [
    // Single aggressor per byte, against quiet neighbours.
    0xFEFE_0101,
    0xFDFD_0202,
    0xF7F7_0808,
    0xEFEF_1010,
    // Lane against lane.
    0x00FF_FF00,
    // Adjacent lines in opposite directions.
    0x5A5A_A5A5,
    0x3C3C_C3C3,
    0x6996_9669,
];

/// Crosstalk patterns, each followed by its inverse.
pub const GOLDEN_NUMBERS: [u32; 16] = golden_numbers();

const fn golden_numbers() -> [u32; 16] {
    let mut table = [0; 16];
    let mut i = 0;
    while i < GOLDEN_BASE.len() {
        table[2 * i] = GOLDEN_BASE[i];
        table[2 * i + 1] = !GOLDEN_BASE[i];
        i += 1;
    }
    table
}

/// Places a 16-bit beat into both beats of a 32-bit word.
#[inline]
pub const fn duplicate(beat: u16) -> u32 {
    beat as u32 | ((beat as u32) << 16)
}

/// Folds a 32-bit XOR difference of two beats into a 16-bit per data line mask.
#[inline]
pub const fn fold(diff: u32) -> u16 {
    ((diff & 0xFFFF) | (diff >> 16)) as u16
}

/// Walking one, advancing by one line per word.
#[inline]
pub const fn walking_one(word: usize) -> u32 {
    duplicate(1 << (word % 16))
}

#[inline]
pub const fn walking_zero(word: usize) -> u32 {
    !walking_one(word)
}

/// All lines low, every second word carries a walking one.
#[inline]
pub const fn walking_dead_low(word: usize) -> u32 {
    if word % 2 == 0 { 0 } else { walking_one(word / 2) }
}

/// All lines high, every second word carries a walking zero.
#[inline]
pub const fn walking_dead_high(word: usize) -> u32 {
    !walking_dead_low(word)
}
