//! Register dump for failed calibrations.
use bmc_ddr4::{LANE_COUNT, RegisterBus, gcr, mc, phy};

use crate::phy::select_lane;

/// Logs all memory controller and PHY registers at error level. Lane banked PHY registers are
/// dumped once per lane, which changes the lane selection.
pub fn dump_registers<B: RegisterBus>(bus: &mut B) {
    log::error!("DDR register dump");
    for (name, reg) in [("GCR_INTCR2", gcr::INTCR2)]
        .iter()
        .chain(mc::REGISTERS)
        .chain(phy::REGISTERS)
    {
        let value = bus.read(*reg);
        log::error!("  {:<20} {:?} = {:#010x}", name, reg, value);
    }
    for lane in 0..LANE_COUNT {
        select_lane(bus, lane);
        for (name, reg) in phy::LANE_REGISTERS {
            let value = bus.read(*reg);
            log::error!("  {:<17} [{}] {:?} = {:#010x}", name, lane, reg, value);
        }
    }
}
