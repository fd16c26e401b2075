//! SoC pad drive strength and termination.
use arbitrary_int::u4;
use bmc_ddr4::{RegisterBus, phy::PadControl};

use super::mode_regs::{lookup, reverse_lookup};
use crate::session::{Impedance, SessionConfig};

/// PHY pad impedance encoding, shared by drivers and terminations.
pub const PAD_CODES: [(Impedance, u8); 8] = [
    (Impedance::Off, 0),
    (Impedance::Ohms(240), 1),
    (Impedance::Ohms(120), 2),
    (Impedance::Ohms(80), 3),
    (Impedance::Ohms(60), 4),
    (Impedance::Ohms(48), 5),
    (Impedance::Ohms(40), 6),
    (Impedance::Ohms(34), 7),
];
pub const PAD_DEFAULT: Impedance = Impedance::Ohms(48);

pub fn pad_code(impedance: Impedance) -> u4 {
    let code = lookup(&PAD_CODES, impedance).unwrap_or_else(|| {
        log::warn!("unsupported pad impedance {:?}, using {:?}", impedance, PAD_DEFAULT);
        5
    });
    u4::new(code)
}

/// Returns [None] for reserved codes.
pub fn pad_impedance(code: u4) -> Option<Impedance> {
    reverse_lookup(&PAD_CODES, code.value())
}

/// Pad configuration for the SoC drive and termination settings. Clock and address/control
/// pads are never terminated on the SoC side.
pub fn pad_control(config: &SessionConfig) -> PadControl {
    let drive = pad_code(config.soc_drive);
    let odt = pad_code(config.soc_odt);
    PadControl::builder()
        .with_clk_drive(drive)
        .with_adrctrl_drive(drive)
        .with_dqs_odt(odt)
        .with_dqs_drive(drive)
        .with_dq_odt(odt)
        .with_dq_drive(drive)
        .build()
}

pub fn program_pads<B: RegisterBus>(bus: &mut B, config: &SessionConfig) {
    let pads = pad_control(config);
    bus.write_reg(pads);
    log::debug!("DDR pads: {:?}", pads);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_pad_values_round_trip() {
        for (impedance, code) in PAD_CODES {
            let mapped = pad_code(impedance);
            assert_eq!(mapped.value(), code);
            assert_eq!(pad_impedance(mapped), Some(impedance));
        }
        assert_eq!(pad_impedance(u4::new(12)), None);
    }

    #[test]
    fn unsupported_pad_value_uses_default() {
        assert_eq!(pad_code(Impedance::Ohms(50)), pad_code(PAD_DEFAULT));
        assert_eq!(pad_code(Impedance::HighZ).value(), 5);
    }

    #[test]
    fn pad_control_from_config() {
        let config = SessionConfig {
            soc_drive: Impedance::Ohms(34),
            soc_odt: Impedance::Ohms(60),
            ..Default::default()
        };
        let pads = pad_control(&config);
        assert_eq!(pads.dq_drive().value(), 7);
        assert_eq!(pads.dq_odt().value(), 4);
        assert_eq!(pads.clk_drive().value(), 7);
        assert_eq!(pads.raw_value(), 0x0077_4747);
    }
}
