use core::convert::Infallible;

use crate::{hal, utils::InfallibleResult};
use hal::prelude::*;
use hal::gpio;

pub type Uart = hal::pac::USART2;
pub type Tx = gpio::gpioa::PA2<gpio::Alternate<gpio::AF1>>;
pub type Rx = gpio::gpioa::PA3<gpio::Alternate<gpio::AF1>>;
pub type Serial = hal::serial::Serial<Uart, Tx, Rx>;

/// Text console on USART2
pub struct Console {
    serial: Serial,
}

impl Console {
    pub const BAUD_RATE: u32 = 115_200;

    pub fn new(uart: Uart, (tx, rx): (Tx, Rx), rcc: &mut hal::rcc::Rcc) -> Self {
        let serial = Serial::usart2(uart, (tx, rx), Self::BAUD_RATE.bps(), rcc);
        Self { serial }
    }

    /// Read a received byte without waiting
    pub fn read(&mut self) -> Option<u8> {
        match self.serial.read() {
            Ok(byte) => Some(byte),
            Err(nb::Error::WouldBlock) => None,
            Err(nb::Error::Other(_)) => {
                defmt::warn!("Console receive error");
                None
            },
        }
    }

    /// Write bytes, waiting for the transmitter
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            nb::block!(self.serial.write(byte)).infallible();
        }
    }
}

impl ufmt::uWrite for Console {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}
