use core::mem::MaybeUninit;

use embedded_hal::digital::v2::OutputPin;
use static_assertions as sa;

use crate::{hal::gpio, utils::InfallibleResult};

pub type TickPin = gpio::gpiob::PB0<gpio::Output<gpio::PushPull>>;
pub type FramePin = gpio::gpiob::PB1<gpio::Output<gpio::PushPull>>;

// Get the 0-sized pin structures, as there is no data this should be safe?
unsafe fn get_tick() -> TickPin {
    sa::const_assert_eq!(core::mem::size_of::<TickPin>(), 0);
    MaybeUninit::uninit().assume_init()
}
unsafe fn get_frame() -> FramePin {
    sa::const_assert_eq!(core::mem::size_of::<FramePin>(), 0);
    MaybeUninit::uninit().assume_init()
}

/// Debug GPIOs for observing the link with a logic analyzer
///
/// PB0 is high while the engine tick runs, PB1 is high while a frame is being
/// sent or received. Usable through a shared reference so it can be used from
/// any task without locks.
pub struct DebugGpio(());

impl DebugGpio {
    /// Takes the configured pins to make sure nobody else uses them
    pub fn new(_tick: TickPin, _frame: FramePin) -> Self {
        Self(())
    }

    /// Run given callback with the tick pin set high
    #[inline(always)]
    pub fn with_tick_mark<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut pin = unsafe { get_tick() };
        pin.set_high().infallible();
        let result = f();
        pin.set_low().infallible();
        result
    }

    #[inline(always)]
    pub fn set_frame_mark(&self, active: bool) {
        let mut pin = unsafe { get_frame() };
        if active {
            pin.set_high().infallible();
        } else {
            pin.set_low().infallible();
        }
    }
}
