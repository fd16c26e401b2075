//! Eye finder.
//!
//! A sweep sample is the 16-bit failure mask returned by the memory test at one sweep position.
//! A bit set means the corresponding data line failed. The eye of a line is the longest run of
//! consecutive positions where the line passed.
use bmc_ddr4::{BITS_PER_LANE, DQ_COUNT, LANE_COUNT};

/// Passing window of one data line, lane or the whole bus.
///
/// `center` is an index into the sample buffer. `None` with a size of zero means that no
/// position passed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Eye {
    pub center: Option<u16>,
    pub size: u16,
}

impl Eye {
    pub const NONE: Eye = Eye {
        center: None,
        size: 0,
    };

    #[inline]
    pub const fn is_open(&self) -> bool {
        self.center.is_some()
    }
}

/// Data line mask of a lane.
#[inline]
pub const fn lane_mask(lane: usize) -> u16 {
    0xFF << (lane * BITS_PER_LANE)
}

/// Finds the eye of the lines selected by `mask`. A position passes if none of the selected
/// lines failed there.
///
/// The first of several equally long runs wins. The center is the stop index of the run minus
/// half the run length rounded up, but never before the start of the run.
pub fn find_eye(samples: &[u16], mask: u16) -> Eye {
    let mut best_start = 0;
    let mut best_len = 0;
    let mut run_start = None;
    for (index, sample) in samples.iter().enumerate() {
        if sample & mask != 0 {
            run_start = None;
            continue;
        }
        let start = *run_start.get_or_insert(index);
        let len = index + 1 - start;
        if len > best_len {
            best_start = start;
            best_len = len;
        }
    }
    if best_len == 0 {
        return Eye::NONE;
    }
    let stop_offset = best_len - 1;
    let center = best_start + stop_offset.saturating_sub(best_len.div_ceil(2));
    Eye {
        center: Some(center as u16),
        size: best_len as u16,
    }
}

/// One eye per data line.
pub fn bit_eyes(samples: &[u16]) -> [Eye; DQ_COUNT] {
    core::array::from_fn(|bit| find_eye(samples, 1 << bit))
}

/// One eye per lane. A lane fails at a position if any of its lines failed.
pub fn lane_eyes(samples: &[u16]) -> [Eye; LANE_COUNT] {
    core::array::from_fn(|lane| find_eye(samples, lane_mask(lane)))
}

/// Eye of the whole data bus.
pub fn bus_eye(samples: &[u16]) -> Eye {
    find_eye(samples, 0xFFFF)
}
