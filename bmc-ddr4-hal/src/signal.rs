//! GPIO signaling of the memory test result to external test equipment.
use embedded_hal::digital::PinState;

use crate::session::SignalPins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    PushPull,
    OpenDrain,
}

/// GPIO access by pin number. Board code maps the numbers to its GPIO driver.
pub trait BootSignals {
    fn configure(&mut self, pin: u8, direction: Direction, pull: Pull, drive: DriveMode);
    fn write(&mut self, pin: u8, level: PinState);
}

impl<S: BootSignals + ?Sized> BootSignals for &mut S {
    fn configure(&mut self, pin: u8, direction: Direction, pull: Pull, drive: DriveMode) {
        (**self).configure(pin, direction, pull, drive)
    }

    fn write(&mut self, pin: u8, level: PinState) {
        (**self).write(pin, level)
    }
}

/// Used on boards without signal pins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignals;

impl BootSignals for NoSignals {
    fn configure(&mut self, _pin: u8, _direction: Direction, _pull: Pull, _drive: DriveMode) {}
    fn write(&mut self, _pin: u8, _level: PinState) {}
}

/// Configures all assigned pins as push-pull outputs, driven low.
pub fn configure_pins<S: BootSignals>(signals: &mut S, pins: &SignalPins) {
    for pin in [pins.pass, pins.complete].into_iter().flatten() {
        signals.configure(pin, Direction::Output, Pull::None, DriveMode::PushPull);
        signals.write(pin, PinState::Low);
    }
}

/// Drives the pin high if it is assigned.
pub fn raise<S: BootSignals>(signals: &mut S, pin: Option<u8>) {
    if let Some(pin) = pin {
        signals.write(pin, PinState::High);
    }
}
