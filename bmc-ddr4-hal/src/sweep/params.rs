//! Sweepable PHY and DRAM parameters.
use core::ops::RangeInclusive;

use bmc_ddr4::{Field, RegisterBus, dram::VREF_MAX_CODE, phy};
use embedded_hal::delay::DelayNs;

use crate::{
    Error,
    leveling::vref,
    phy::{decode_sign_magnitude, encode_sign_magnitude, select_bit, select_lane},
    session::CalibrationSession,
};

/// Delay or reference voltage setting which can be swept to measure its eye.
///
/// The discriminant is the bit position in [crate::session::DiagnosticSweeps].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum SweepParameter {
    /// Output delay of a single DQ line.
    OutputDq = 0,
    /// Input delay of a single DQ line.
    InputDq = 1,
    OutputDm = 2,
    OutputDqs = 3,
    InputDqs = 4,
    /// Output delay line trim of a lane.
    OutputLaneTrim = 5,
    /// Address and control output delay.
    AddrCtrlDelay = 6,
    /// SoC side read reference voltage.
    PhyVref = 7,
    /// DRAM side write reference voltage, programmed through MR6.
    DramVref = 8,
    /// Three level address and control master delay trim.
    AddrCtrlMasterTrim = 9,
}

/// Granularity at which a parameter is implemented in hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One setting per data line.
    Bit,
    /// One setting per lane, shared by all lines of the lane.
    Lane,
    /// One setting for the whole interface.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Sign in the top bit of the field.
    SignMagnitude,
    Identity,
}

impl SweepParameter {
    pub const ALL: [SweepParameter; 10] = [
        SweepParameter::OutputDq,
        SweepParameter::InputDq,
        SweepParameter::OutputDm,
        SweepParameter::OutputDqs,
        SweepParameter::InputDqs,
        SweepParameter::OutputLaneTrim,
        SweepParameter::AddrCtrlDelay,
        SweepParameter::PhyVref,
        SweepParameter::DramVref,
        SweepParameter::AddrCtrlMasterTrim,
    ];

    pub const fn scope(self) -> Scope {
        match self {
            SweepParameter::OutputDq | SweepParameter::InputDq => Scope::Bit,
            SweepParameter::OutputDm
            | SweepParameter::OutputDqs
            | SweepParameter::InputDqs
            | SweepParameter::OutputLaneTrim
            | SweepParameter::PhyVref => Scope::Lane,
            SweepParameter::AddrCtrlDelay
            | SweepParameter::DramVref
            | SweepParameter::AddrCtrlMasterTrim => Scope::Global,
        }
    }

    /// Swept values. Signed parameters are swept symmetrically around zero.
    pub const fn range(self) -> RangeInclusive<i16> {
        match self {
            SweepParameter::OutputDq | SweepParameter::InputDq | SweepParameter::OutputDm => {
                RangeInclusive::new(-31, 31)
            }
            SweepParameter::OutputDqs
            | SweepParameter::InputDqs
            | SweepParameter::OutputLaneTrim
            | SweepParameter::AddrCtrlDelay => RangeInclusive::new(-63, 63),
            SweepParameter::PhyVref => RangeInclusive::new(0, 63),
            SweepParameter::DramVref => RangeInclusive::new(0, VREF_MAX_CODE as i16),
            SweepParameter::AddrCtrlMasterTrim => RangeInclusive::new(0, 2),
        }
    }

    /// Smallest eye accepted when centering.
    pub const fn min_eye(self) -> u16 {
        match self {
            SweepParameter::OutputDq
            | SweepParameter::InputDq
            | SweepParameter::OutputDm
            | SweepParameter::PhyVref
            | SweepParameter::DramVref => 4,
            SweepParameter::OutputDqs | SweepParameter::InputDqs => 15,
            SweepParameter::OutputLaneTrim => 30,
            SweepParameter::AddrCtrlDelay => 20,
            SweepParameter::AddrCtrlMasterTrim => 1,
        }
    }

    /// Register field holding the parameter. The DRAM VREF is not readable and has none.
    pub const fn field(self) -> Option<Field> {
        Some(match self {
            SweepParameter::OutputDq => phy::OP_BIT_TRIM_FIELD,
            SweepParameter::InputDq => phy::IP_BIT_TRIM_FIELD,
            SweepParameter::OutputDm => phy::DM_OUT_TRIM,
            SweepParameter::OutputDqs => phy::DQS_OUT_TRIM,
            SweepParameter::InputDqs => phy::DQS_IN_TRIM,
            SweepParameter::OutputLaneTrim => phy::LANE_TRIM,
            SweepParameter::AddrCtrlDelay => phy::ADRCTRL_DELAY,
            SweepParameter::PhyVref => phy::VREF_CODE,
            SweepParameter::AddrCtrlMasterTrim => phy::ADRCTRL_MASTER_TRIM,
            SweepParameter::DramVref => return None,
        })
    }

    const fn encoding(self) -> Encoding {
        match self {
            SweepParameter::PhyVref
            | SweepParameter::DramVref
            | SweepParameter::AddrCtrlMasterTrim => Encoding::Identity,
            _ => Encoding::SignMagnitude,
        }
    }

    /// Field width of the parameter, 6 bits for the MR6 VREF value.
    const fn width(self) -> u8 {
        match self.field() {
            Some(field) => field.width(),
            None => 6,
        }
    }

    /// Register encoding of a value. Values outside [Self::range] are rejected.
    pub fn encode(self, value: i16) -> Result<u32, Error> {
        if !self.range().contains(&value) {
            return Err(Error::ParameterOutOfRange);
        }
        Ok(match self.encoding() {
            Encoding::SignMagnitude => encode_sign_magnitude(value, self.width()),
            Encoding::Identity => value as u32,
        })
    }

    pub const fn decode(self, raw: u32) -> i16 {
        match self.encoding() {
            Encoding::SignMagnitude => decode_sign_magnitude(raw, self.width()),
            Encoding::Identity => raw as i16,
        }
    }

    fn select<B: RegisterBus>(self, bus: &mut B, lane: usize, bit: usize) {
        match self.scope() {
            Scope::Bit => select_bit(bus, lane, bit),
            Scope::Lane => select_lane(bus, lane),
            Scope::Global => (),
        }
    }

    /// Current value of the parameter instance. Lane and bit are ignored where the scope does
    /// not need them.
    pub fn read<B: RegisterBus>(
        self,
        bus: &mut B,
        session: &CalibrationSession,
        lane: usize,
        bit: usize,
    ) -> i16 {
        match self.field() {
            Some(field) => {
                self.select(bus, lane, bit);
                self.decode(field.read(bus))
            }
            None => session
                .derived
                .dram_vref
                .unwrap_or_else(|| vref::dram_vref_midpoint(&session.config)) as i16,
        }
    }

    pub fn write<B: RegisterBus, D: DelayNs>(
        self,
        bus: &mut B,
        delay: &mut D,
        session: &mut CalibrationSession,
        lane: usize,
        bit: usize,
        value: i16,
    ) -> Result<(), Error> {
        let raw = self.encode(value)?;
        match self.field() {
            Some(field) => {
                self.select(bus, lane, bit);
                field.write(bus, raw);
            }
            None => {
                vref::program_dram_vref(bus, delay, session.config.speed, raw as u8)?;
                session.derived.dram_vref = Some(raw as u8);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::sim::{SimBus, SimTimer};
    use bmc_ddr4::dram::ModeRegister;

    #[test]
    fn discriminants_match_sweep_bits() {
        for (index, parameter) in SweepParameter::ALL.into_iter().enumerate() {
            assert_eq!(u8::from(parameter) as usize, index);
            assert_eq!(SweepParameter::try_from(index as u8).ok(), Some(parameter));
        }
        assert!(SweepParameter::try_from(10u8).is_err());
    }

    #[test]
    fn ranges_fit_sample_buffer() {
        for parameter in SweepParameter::ALL {
            let range = parameter.range();
            let len = (range.end() - range.start() + 1) as usize;
            assert!(len <= crate::sweep::MAX_SAMPLES);
            assert!(parameter.min_eye() as usize <= len);
            // Both ends are representable.
            let end = parameter.encode(*range.end()).unwrap();
            assert_eq!(parameter.decode(end), *range.end());
            let start = parameter.encode(*range.start()).unwrap();
            assert_eq!(parameter.decode(start), *range.start());
        }
    }

    #[test]
    fn encoding() {
        assert_eq!(SweepParameter::OutputDq.encode(-31), Ok(0x3F));
        assert_eq!(SweepParameter::OutputDqs.encode(-1), Ok(0x41));
        assert_eq!(SweepParameter::PhyVref.encode(40), Ok(40));
        assert_eq!(
            SweepParameter::OutputDq.encode(32),
            Err(Error::ParameterOutOfRange)
        );
        assert!(SweepParameter::AddrCtrlMasterTrim.encode(3).is_err());
    }

    #[test]
    fn bit_scoped_access_uses_lane_and_bit_select() {
        let (mut bus, _) = SimBus::new_pair();
        let mut timer = SimTimer::default();
        let mut session = CalibrationSession::new(SessionConfig::default());
        SweepParameter::OutputDq
            .write(&mut bus, &mut timer, &mut session, 1, 5, -7)
            .unwrap();
        assert_eq!(bus.peek_bit(phy::OP_BIT_TRIM, 1, 5), 0x27);
        assert_eq!(bus.peek_bit(phy::OP_BIT_TRIM, 1, 4), 0);
        assert_eq!(SweepParameter::OutputDq.read(&mut bus, &session, 1, 5), -7);
        assert_eq!(SweepParameter::OutputDq.read(&mut bus, &session, 0, 5), 0);
    }

    #[test]
    fn dram_vref_goes_through_mr6() {
        let (mut bus, _) = SimBus::new_pair();
        let mut timer = SimTimer::default();
        let mut session = CalibrationSession::new(SessionConfig::default());
        // Not trained yet: the computed midpoint.
        assert_eq!(SweepParameter::DramVref.read(&mut bus, &session, 0, 0), 15);
        SweepParameter::DramVref
            .write(&mut bus, &mut timer, &mut session, 0, 0, 22)
            .unwrap();
        assert_eq!(session.derived.dram_vref, Some(22));
        assert_eq!(bus.state().dram_vref, 22);
        assert!(bus.state().mrs_log.iter().all(|(mr, _)| *mr == ModeRegister::Mr6));
        assert_eq!(SweepParameter::DramVref.read(&mut bus, &session, 0, 0), 22);
    }
}
