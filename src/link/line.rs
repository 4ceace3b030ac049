use core::convert::Infallible;

use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::utils::InfallibleResult;

/// Shared open-drain signal line
///
/// The line is wired-AND: it reads high (idle) unless at least one node pulls
/// it low. Releasing the line lets the pull-up bring it back high.
pub trait Line {
    /// Sample current line level, `true` means high
    fn level(&mut self) -> bool;
    /// Drive the line, driving high is the same as releasing it
    fn drive(&mut self, level: bool);
    /// Stop pulling the line low
    fn release(&mut self);
}

/// Line on a single open-drain GPIO with a pull-up
pub struct OpenDrainLine<P> {
    pin: P,
}

impl<P> OpenDrainLine<P>
where
    P: InputPin<Error = Infallible> + OutputPin<Error = Infallible>,
{
    pub fn new(pin: P) -> Self {
        let mut line = Self { pin };
        line.release();
        line
    }

    pub fn free(self) -> P {
        self.pin
    }
}

impl<P> Line for OpenDrainLine<P>
where
    P: InputPin<Error = Infallible> + OutputPin<Error = Infallible>,
{
    fn level(&mut self) -> bool {
        self.pin.is_high().infallible()
    }

    fn drive(&mut self, level: bool) {
        if level {
            self.pin.set_high().infallible();
        } else {
            self.pin.set_low().infallible();
        }
    }

    fn release(&mut self) {
        self.pin.set_high().infallible();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::mock::*;

    #[test]
    fn open_drain_starts_released() {
        let pin = Pin::default();
        let mut line = OpenDrainLine::new(pin.clone());
        assert!(line.level());
        line.drive(false);
        assert!(!line.level());
        line.release();
        assert!(line.level());
        line.drive(false);
        line.drive(true);
        assert!(pin.is_high().infallible());
    }

    #[test]
    fn bus_is_wired_and() {
        let bus = Bus::new();
        let (mut a, mut b) = (bus.line(0), bus.line(1));
        assert!(a.level() && b.level());
        a.drive(false);
        assert!(!b.level());
        b.drive(false);
        a.release();
        assert!(!a.level());
        b.drive(true);
        assert!(a.level() && bus.level());
    }

    #[test]
    fn scripted_line_defaults_to_idle() {
        let mut line = ScriptedLine::new([false, true, false]);
        let levels: std::vec::Vec<_> = (0..5).map(|_| line.level()).collect();
        assert_eq!(levels, [false, true, false, true, true]);
        line.drive(false);
        line.release();
        assert_eq!(line.output, [false]);
        assert_eq!(line.released, 1);
    }
}
