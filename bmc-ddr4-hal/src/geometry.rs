//! # DRAM geometry discovery
//!
//! The installed capacity is found through address aliasing. Under an address map which decodes
//! more address bits than the device has, a write to offset 0 reappears at the first offset equal
//! to the device size. Every candidate map is probed with a sentinel and its complement at power
//! of two offsets, starting at 128 MiB.
//!
//! A dual die package aliases at a fixed small offset under the map which does not match its
//! internal decode. This case is detected first and excludes that map.
use arbitrary_int::{Number, u2, u10};
use bmc_ddr4::{
    RegisterBus, gcr,
    mc::{AddrMap, RefreshControl},
};

use crate::{
    Error, Phase,
    memory::DramWindow,
    session::{CalibrationSession, SpeedClass, Topology},
};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

pub const SENTINEL: u64 = 0x5A5A_A5A5_0F0F_F0F0;
/// Alias offset of a dual die package.
pub const DUAL_DIE_OFFSET: u64 = 64 * MIB;
/// Smallest supported DRAM size and first probed offset.
pub const FIRST_PROBE: u64 = 128 * MIB;
/// Average refresh interval.
pub const T_REFI_NS: u32 = 7800;

/// Candidate (bank diff, row diff) address maps in probing order. The column diff is always 0.
pub const CANDIDATES: [(u8, u8); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The sentinel aliased at this offset, which is the device size.
    Size(u64),
    /// No alias up to the maximum size.
    NotFound,
    /// The map aliases at [DUAL_DIE_OFFSET].
    DualDieAlias,
}

/// Detected geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub map: AddrMap,
    pub size: u64,
    pub topology: Topology,
}

pub fn candidate_map((bank_diff, row_diff): (u8, u8)) -> AddrMap {
    AddrMap::builder()
        .with_col_diff(u2::new(0))
        .with_row_diff(u2::new(row_diff))
        .with_bank_diff(u2::new(bank_diff))
        .build()
}

/// Whether a write to offset 0 shows up at `offset`, for the sentinel and its complement.
fn mirrors<W: DramWindow>(window: &mut W, offset: u64) -> bool {
    for pattern in [SENTINEL, !SENTINEL] {
        window.write64(0, pattern);
        if window.read64(offset) != pattern {
            return false;
        }
    }
    true
}

/// Window length needed to probe for devices of up to `max_size` bytes. A device of exactly
/// `max_size` bytes is only seen through the alias at offset `max_size`.
pub const fn probe_window_len(max_size: u64) -> u64 {
    max_size + 8
}

/// Programs an address map and probes it for aliasing up to and including `max_size`.
///
/// The window must cover [probe_window_len] bytes.
pub fn probe<B: RegisterBus, W: DramWindow>(
    bus: &mut B,
    window: &mut W,
    map: AddrMap,
    max_size: u64,
) -> ProbeResult {
    bus.write_reg(map);
    if mirrors(window, DUAL_DIE_OFFSET) {
        return ProbeResult::DualDieAlias;
    }
    let mut offset = FIRST_PROBE;
    while offset <= max_size {
        if mirrors(window, offset) {
            return ProbeResult::Size(offset);
        }
        offset *= 2;
    }
    ProbeResult::NotFound
}

/// Picks the candidate with the largest size. The first one wins a tie.
pub fn select(results: &[ProbeResult]) -> Option<(usize, u64)> {
    results
        .iter()
        .enumerate()
        .filter_map(|(index, result)| match result {
            ProbeResult::Size(size) => Some((index, *size)),
            _ => None,
        })
        .fold(None, |best, (index, size)| match best {
            Some((_, best_size)) if best_size >= size => best,
            _ => Some((index, size)),
        })
}

/// Refresh cycle time of a density class in nanoseconds.
pub const fn t_rfc_ns(size: u64) -> u32 {
    if size <= 256 * MIB {
        160
    } else if size <= 512 * MIB {
        260
    } else if size <= GIB {
        350
    } else {
        550
    }
}

/// Encoding of the memory size boundary registers.
pub const fn boundary_encoding(size: u64) -> u8 {
    if size <= 128 * MIB {
        0x07
    } else if size <= 256 * MIB {
        0x0F
    } else if size <= 512 * MIB {
        0x1F
    } else if size <= GIB {
        0x3F
    } else if size <= 2 * GIB {
        0x6F
    } else {
        0x7F
    }
}

/// Size available to software, one byte in eight holds the ECC check bits.
pub const fn usable_size(raw_size: u64, ecc: bool) -> u64 {
    if ecc { 7 * (raw_size >> 3) } else { raw_size }
}

fn program_refresh<B: RegisterBus>(bus: &mut B, speed: SpeedClass, size: u64) {
    let t_rfc = speed.ns_to_clocks(t_rfc_ns(size)).min(u10::MAX.value() as u32) as u16;
    let t_refi = speed.ns_to_clocks(T_REFI_NS).min(u16::MAX as u32) as u16;
    bus.modify_reg::<RefreshControl, _>(|refresh| {
        refresh.with_t_rfc(u10::new(t_rfc)).with_t_refi(t_refi)
    });
}

/// Probes all candidate address maps and programs the winner.
///
/// Updates the size, topology and boundary encoding of the session and programs the refresh
/// timing and the boundary registers. Returns [Error::Fail] with [Phase::Geometry] if no map
/// aliased.
pub fn discover<B: RegisterBus, W: DramWindow>(
    bus: &mut B,
    window: &mut W,
    session: &mut CalibrationSession,
) -> Result<Geometry, Error> {
    let max_size = session.config.max_size;
    let mut results = [ProbeResult::NotFound; CANDIDATES.len()];
    let mut topology = Topology::SingleDie;
    for (result, candidate) in results.iter_mut().zip(CANDIDATES) {
        *result = probe(bus, window, candidate_map(candidate), max_size);
        if *result == ProbeResult::DualDieAlias {
            topology = Topology::DualDie;
        }
        log::debug!("address map {:?}: {:?}", candidate, result);
    }
    let Some((index, size)) = select(&results) else {
        log::error!("DRAM size not found, {:?}", results);
        return Err(Error::Fail(Phase::Geometry));
    };

    let map = candidate_map(CANDIDATES[index]);
    bus.write_reg(map);
    let size = size.min(max_size);
    program_refresh(bus, session.config.speed, size);

    let encoding = session
        .config
        .overrides
        .boundary_encoding
        .unwrap_or(boundary_encoding(size));
    for field in [gcr::GMMAP0_BOUNDARY, gcr::GMMAP1_BOUNDARY] {
        field
            .write_checked(bus, encoding as u32)
            .map_err(|_| Error::ParameterOutOfRange)?;
    }

    let usable = usable_size(size, session.config.ecc);
    session.derived.raw_size = Some(size);
    session.derived.usable_size = Some(usable);
    session.derived.topology = topology;
    session.derived.boundary_encoding = Some(encoding);
    log::info!(
        "DRAM size {} MiB ({} MiB usable), {:?}, boundary {:#04x}",
        size / MIB,
        usable / MIB,
        topology,
        encoding
    );
    Ok(Geometry {
        map,
        size,
        topology,
    })
}
