//! Board support for a node on STM32F072
//!
//! Wire on PA8 (open-drain, internal pull-up), console on USART2 (PA2/PA3),
//! debug marks on PB0/PB1.

pub mod console;
pub mod debug;

use crate::hal::gpio;
use crate::link::OpenDrainLine;

/// Shared wire, driving high releases the line to the pull-up
pub type WirePin = gpio::gpioa::PA8<gpio::Output<gpio::OpenDrain>>;
pub type WireLine = OpenDrainLine<WirePin>;

/// Core clock frequency
pub const SYSCLK_HZ: u32 = 48_000_000;
pub const PCLK_HZ: u32 = 24_000_000;
