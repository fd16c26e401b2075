//! # Register map for the BMC DDR4 memory subsystem
//!
//! This crate describes the registers of the DDR4 memory controller (MC), the DDR4 PHY and the
//! few global control registers (GCR) of the SoC which are relevant for memory bring-up.
//!
//! Simple registers and single fields are described with the [Field] descriptor, composite
//! registers are modelled as [bitbybit] bitfields which implement [Register]. All register
//! accesses go through the [RegisterBus] trait, which allows running the calibration code against
//! a simulated register file as well as the real hardware via [MmioRegisterBus].
#![no_std]

pub mod dram;
pub mod field;
pub mod gcr;
pub mod mc;
pub mod phy;

pub use field::{Field, FieldError, MmioRegisterBus, Reg, Register, RegisterBus};

/// Number of 8-bit data lanes.
pub const LANE_COUNT: usize = 2;
/// Data bits per lane.
pub const BITS_PER_LANE: usize = 8;
/// Total width of the data bus.
pub const DQ_COUNT: usize = LANE_COUNT * BITS_PER_LANE;

static_assertions::const_assert_eq!(DQ_COUNT, 16);
