//! DDR4 mode register computation and programming.
//!
//! Drive strength and termination settings are mapped through fixed tables. Unsupported values
//! fall back to a documented default and log a warning instead of failing the bring-up.
use arbitrary_int::{u2, u3, u6};
use bmc_ddr4::{
    RegisterBus,
    dram::{BurstLength, ModeRegister, Mr0, Mr1, Mr2, Mr5, Mr6, VrefRange},
    mc::{MrsCommand, MrsCommandType},
};
use embedded_hal::delay::DelayNs;

use crate::{
    Error, PollTarget,
    session::{Impedance, SessionConfig, SpeedClass},
    time::{Microseconds, POLL_INTERVAL, delay_dram_clocks},
};

/// Mode register values which depend on the board configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModeRegisters {
    pub mr0: u16,
    pub mr1: u16,
    pub mr2: u16,
    pub mr5: u16,
}

impl ModeRegisters {
    /// Packed value of the PHY MR0/MR1 mirror register.
    pub const fn phy_mr01(&self) -> u32 {
        ((self.mr1 as u32) << 16) | self.mr0 as u32
    }

    /// Packed value of the PHY MR2/MR5 mirror register.
    pub const fn phy_mr25(&self) -> u32 {
        ((self.mr5 as u32) << 16) | self.mr2 as u32
    }
}

const CAS_LATENCY_CODES: [(u8, u8); 16] = [
    (9, 0),
    (10, 1),
    (11, 2),
    (12, 3),
    (13, 4),
    (14, 5),
    (15, 6),
    (16, 7),
    (18, 8),
    (20, 9),
    (22, 10),
    (24, 11),
    (23, 12),
    (17, 13),
    (19, 14),
    (21, 15),
];

const CAS_WRITE_LATENCY_CODES: [(u8, u8); 7] =
    [(9, 0), (10, 1), (11, 2), (12, 3), (14, 4), (16, 5), (18, 6)];

const WRITE_RECOVERY_CODES: [(u8, u8); 8] = [
    (10, 0),
    (12, 1),
    (14, 2),
    (16, 3),
    (18, 4),
    (20, 5),
    (24, 6),
    (22, 7),
];

/// RTT_NOM and RTT_PARK encoding.
pub const RTT_CODES: [(Impedance, u8); 8] = [
    (Impedance::Off, 0),
    (Impedance::Ohms(60), 1),
    (Impedance::Ohms(120), 2),
    (Impedance::Ohms(40), 3),
    (Impedance::Ohms(240), 4),
    (Impedance::Ohms(48), 5),
    (Impedance::Ohms(80), 6),
    (Impedance::Ohms(34), 7),
];
pub const RTT_DEFAULT: Impedance = Impedance::Ohms(60);

/// Dynamic write termination encoding.
pub const RTT_WR_CODES: [(Impedance, u8); 5] = [
    (Impedance::Off, 0),
    (Impedance::Ohms(120), 1),
    (Impedance::Ohms(240), 2),
    (Impedance::HighZ, 3),
    (Impedance::Ohms(80), 4),
];
pub const RTT_WR_DEFAULT: Impedance = Impedance::Off;

/// Output driver impedance encoding.
pub const DRIVER_CODES: [(Impedance, u8); 2] =
    [(Impedance::Ohms(34), 0), (Impedance::Ohms(48), 1)];
pub const DRIVER_DEFAULT: Impedance = Impedance::Ohms(34);

/// Polls for the MRS command to be issued.
pub const MRS_POLL_BUDGET: u32 = 100;
/// tMOD, MRS command to any other command.
pub const T_MOD_CLOCKS: u32 = 24;
/// tZQinit, ZQ calibration after initialization.
pub const T_ZQ_INIT_CLOCKS: u32 = 1024;
/// tVREFDQE, VREF training entry and step settle time in microseconds.
pub const T_VREFDQE: Microseconds = Microseconds::micros(1);

pub(crate) fn lookup<K: Copy + PartialEq, V: Copy>(table: &[(K, V)], key: K) -> Option<V> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

pub(crate) fn reverse_lookup<K: Copy, V: Copy + PartialEq>(
    table: &[(K, V)],
    value: V,
) -> Option<K> {
    table.iter().find(|(_, v)| *v == value).map(|(k, _)| *k)
}

pub fn cas_latency_code(cas_latency: u8) -> Option<u8> {
    lookup(&CAS_LATENCY_CODES, cas_latency)
}

pub fn cas_write_latency_code(cas_write_latency: u8) -> Option<u8> {
    lookup(&CAS_WRITE_LATENCY_CODES, cas_write_latency)
}

pub fn write_recovery_code(write_recovery: u8) -> Option<u8> {
    lookup(&WRITE_RECOVERY_CODES, write_recovery)
}

/// RTT_NOM/RTT_PARK code for a termination value.
pub fn rtt_code(rtt: Impedance) -> u3 {
    let code = lookup(&RTT_CODES, rtt).unwrap_or_else(|| {
        log::warn!("unsupported DRAM termination {:?}, using {:?}", rtt, RTT_DEFAULT);
        1
    });
    u3::new(code)
}

pub fn rtt_impedance(code: u3) -> Impedance {
    reverse_lookup(&RTT_CODES, code.value()).unwrap_or(RTT_DEFAULT)
}

pub fn rtt_wr_code(rtt_wr: Impedance) -> u3 {
    let code = lookup(&RTT_WR_CODES, rtt_wr).unwrap_or_else(|| {
        log::warn!(
            "unsupported DRAM write termination {:?}, using {:?}",
            rtt_wr,
            RTT_WR_DEFAULT
        );
        0
    });
    u3::new(code)
}

/// Returns [None] for reserved codes.
pub fn rtt_wr_impedance(code: u3) -> Option<Impedance> {
    reverse_lookup(&RTT_WR_CODES, code.value())
}

pub fn driver_code(drive: Impedance) -> u2 {
    let code = lookup(&DRIVER_CODES, drive).unwrap_or_else(|| {
        log::warn!("unsupported DRAM driver {:?}, using {:?}", drive, DRIVER_DEFAULT);
        0
    });
    u2::new(code)
}

/// Returns [None] for reserved codes.
pub fn driver_impedance(code: u2) -> Option<Impedance> {
    reverse_lookup(&DRIVER_CODES, code.value())
}

/// Computes MR0, MR1, MR2 and MR5 from the board configuration. Burst length is fixed to 8.
pub fn compute_mode_registers(config: &SessionConfig) -> Result<ModeRegisters, Error> {
    let Some(cl) = cas_latency_code(config.cas_latency) else {
        log::error!("unsupported CAS latency {}", config.cas_latency);
        return Err(Error::ParameterOutOfRange);
    };
    let Some(cwl) = cas_write_latency_code(config.cas_write_latency) else {
        log::error!("unsupported CAS write latency {}", config.cas_write_latency);
        return Err(Error::ParameterOutOfRange);
    };
    let wr = write_recovery_code(config.speed.write_recovery_clocks())
        .ok_or(Error::ParameterOutOfRange)?;

    let mr0 = Mr0::builder()
        .with_cas_latency_4((cl >> 4) & 1 == 1)
        .with_write_recovery(u3::new(wr))
        .with_dll_reset(true)
        .with_cas_latency_3_1(u3::new((cl >> 1) & 0b111))
        .with_read_burst_interleaved(false)
        .with_cas_latency_0(cl & 1 == 1)
        .with_burst_length(BurstLength::Bl8)
        .build();
    let mr1 = Mr1::builder()
        .with_rtt_nom(rtt_code(config.dram_rtt_nom))
        .with_write_leveling(false)
        .with_output_driver(driver_code(config.dram_drive))
        .with_dll_enable(true)
        .build();
    let mr2 = Mr2::builder()
        .with_rtt_wr(rtt_wr_code(config.dram_rtt_wr))
        .with_cas_write_latency(u3::new(cwl))
        .build();
    let mr5 = Mr5::builder()
        .with_rtt_park(rtt_code(config.dram_rtt_park))
        .build();
    Ok(ModeRegisters {
        mr0: mr0.raw_value(),
        mr1: mr1.raw_value(),
        mr2: mr2.raw_value(),
        mr5: mr5.raw_value(),
    })
}

/// MR6 value for a range 1 VREF code.
pub fn mr6(code: u6, training: bool) -> u16 {
    Mr6::builder()
        .with_vref_training(training)
        .with_vref_range(VrefRange::Range1)
        .with_vref_value(code)
        .build()
        .raw_value()
}

/// Issues a mode register set command and waits tMOD.
pub fn write_mode_register<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    speed: SpeedClass,
    mode_register: ModeRegister,
    value: u16,
) -> Result<(), Error> {
    issue_command(
        bus,
        delay,
        speed,
        MrsCommandType::ModeRegisterSet,
        mode_register,
        value,
        T_MOD_CLOCKS,
    )
}

/// Issues a long ZQ calibration command and waits tZQinit.
pub fn zq_calibration_long<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    speed: SpeedClass,
) -> Result<(), Error> {
    issue_command(
        bus,
        delay,
        speed,
        MrsCommandType::ZqCalibrationLong,
        ModeRegister::Mr0,
        // A10 selects the long calibration.
        1 << 10,
        T_ZQ_INIT_CLOCKS,
    )
}

fn issue_command<B: RegisterBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    speed: SpeedClass,
    command: MrsCommandType,
    mode_register: ModeRegister,
    data: u16,
    wait_clocks: u32,
) -> Result<(), Error> {
    bus.write_reg(
        MrsCommand::builder()
            .with_go(true)
            .with_command(command)
            .with_mode_register(mode_register)
            .with_data(data)
            .build(),
    );
    crate::poll_until(
        bus,
        delay,
        PollTarget::ModeRegisterSet,
        MRS_POLL_BUDGET,
        POLL_INTERVAL,
        |bus| !bus.read_reg::<MrsCommand>().go(),
    )
    .inspect_err(|_| {
        log::error!("{:?} command to {:?} not issued", command, mode_register);
    })?;
    delay_dram_clocks(delay, wait_clocks, speed.dram_clock());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_rtt_values_round_trip() {
        for (ohms, code) in RTT_CODES {
            let mapped = rtt_code(ohms);
            assert_eq!(mapped.value(), code);
            assert_eq!(rtt_impedance(mapped), ohms);
        }
    }

    #[test]
    fn documented_rtt_wr_values_round_trip() {
        for (ohms, code) in RTT_WR_CODES {
            let mapped = rtt_wr_code(ohms);
            assert_eq!(mapped.value(), code);
            assert_eq!(rtt_wr_impedance(mapped), Some(ohms));
        }
        assert_eq!(rtt_wr_impedance(u3::new(5)), None);
    }

    #[test]
    fn documented_driver_values_round_trip() {
        for (ohms, code) in DRIVER_CODES {
            let mapped = driver_code(ohms);
            assert_eq!(mapped.value(), code);
            assert_eq!(driver_impedance(mapped), Some(ohms));
        }
    }

    #[test]
    fn unsupported_values_fall_back_to_defaults() {
        assert_eq!(rtt_code(Impedance::Ohms(55)), rtt_code(RTT_DEFAULT));
        assert_eq!(rtt_code(Impedance::HighZ).value(), 1);
        assert_eq!(rtt_wr_code(Impedance::Ohms(60)), rtt_wr_code(RTT_WR_DEFAULT));
        assert_eq!(driver_code(Impedance::Ohms(40)), driver_code(DRIVER_DEFAULT));
    }

    #[test]
    fn cas_latency_split_across_mr0() {
        let mut config = SessionConfig {
            cas_latency: 24,
            ..Default::default()
        };
        // CL 24 is code 11 = 0b01011.
        let regs = compute_mode_registers(&config).unwrap();
        assert_eq!(regs.mr0 & (1 << 2), 1 << 2);
        assert_eq!((regs.mr0 >> 4) & 0b111, 0b101);
        assert_eq!(regs.mr0 & (1 << 12), 0);
        assert_eq!(regs.mr0 & 0b11, 0, "burst length 8");

        // CL 17 is code 13 = 0b01101, CL 21 is code 15.
        config.cas_latency = 17;
        let regs = compute_mode_registers(&config).unwrap();
        assert_eq!(regs.mr0 & (1 << 2), 1 << 2);
        assert_eq!((regs.mr0 >> 4) & 0b111, 0b110);
    }

    #[test]
    fn default_config_mode_registers() {
        let regs = compute_mode_registers(&SessionConfig::default()).unwrap();
        // CL 11: code 2, WR 12: code 1, DLL reset.
        assert_eq!(regs.mr0, (0b001 << 4) | (0b001 << 9) | (1 << 8));
        // DLL enable, 34 Ohm driver, RTT_NOM 60 Ohm.
        assert_eq!(regs.mr1, 1 | (1 << 8));
        // CWL 9, RTT_WR off.
        assert_eq!(regs.mr2, 0);
        assert_eq!(regs.mr5, 0);
        assert_eq!(regs.phy_mr01(), ((regs.mr1 as u32) << 16) | regs.mr0 as u32);
    }

    #[test]
    fn unsupported_latencies_are_rejected() {
        let config = SessionConfig {
            cas_latency: 8,
            ..Default::default()
        };
        assert_eq!(
            compute_mode_registers(&config),
            Err(Error::ParameterOutOfRange)
        );
        let config = SessionConfig {
            cas_write_latency: 13,
            ..Default::default()
        };
        assert_eq!(
            compute_mode_registers(&config),
            Err(Error::ParameterOutOfRange)
        );
    }

    #[test]
    fn mr6_training_value() {
        assert_eq!(mr6(u6::new(20), true), 0x80 | 20);
        assert_eq!(mr6(u6::new(20), false), 20);
    }
}
