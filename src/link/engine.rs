use defmt::Format;

use super::line::Line;
use super::packet::Packet;
use super::queue::{Consumer, Producer};

/// What the engine is doing with the line
#[derive(Clone, Copy, PartialEq, Eq, Debug, Format)]
pub enum Mode {
    Idle,
    Sending,
    Receiving,
}

/// Frame counters, all saturating
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Format)]
pub struct Stats {
    /// Frames fully transmitted
    pub sent: u32,
    /// Frames received with correct parity and stored in receive queue
    pub received: u32,
    /// Frames discarded because of wrong parity
    pub parity_errors: u32,
    /// Frames discarded because declared size exceeds payload capacity
    pub overflows: u32,
    /// Valid frames discarded because receive queue was full
    pub dropped: u32,
}

fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

/// Bit-level protocol state machine
///
/// Call [`Engine::tick`] once per bit time. Each tick does at most one bit of
/// work and never waits on anything.
///
/// Frame on the wire (after the sender pulled the idle line low for one bit):
/// `sender(4) destination(4) size(8) payload(8*size) parity(1)`, everything
/// LSB-first, odd parity over all data bits and the parity bit.
pub struct Engine {
    mode: Mode,
    /// Index of the next frame bit
    bit: u16,
    /// Running parity of data bits, true if number of ones is odd
    odd: bool,
    packet: Packet,
    overflow: bool,
    stats: Stats,
}

impl Engine {
    pub const fn new() -> Self {
        Self {
            mode: Mode::Idle,
            bit: 0,
            odd: false,
            packet: Packet::EMPTY,
            overflow: false,
            stats: Stats {
                sent: 0,
                received: 0,
                parity_errors: 0,
                overflows: 0,
                dropped: 0,
            },
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Run one bit time
    pub fn tick<L: Line, const S: usize, const R: usize>(
        &mut self,
        line: &mut L,
        outbound: &mut Consumer<'_, S>,
        inbound: &mut Producer<'_, R>,
    ) {
        match self.mode {
            Mode::Receiving => self.receive(line.level(), inbound),
            Mode::Sending => self.send(line),
            Mode::Idle => {
                if !line.level() {
                    // Someone claimed the line, frame starts on next tick
                    self.start(Mode::Receiving, Packet::EMPTY);
                } else if let Some(packet) = outbound.dequeue() {
                    line.drive(false);
                    self.start(Mode::Sending, packet);
                }
            },
        }
    }

    fn start(&mut self, mode: Mode, packet: Packet) {
        self.mode = mode;
        self.bit = 0;
        self.odd = false;
        self.overflow = false;
        self.packet = packet;
    }

    fn reset(&mut self) {
        self.start(Mode::Idle, Packet::EMPTY);
    }

    fn send<L: Line>(&mut self, line: &mut L) {
        let parity_index = self.packet.parity_index();
        if self.bit < parity_index {
            let bit = self.packet.data_bit(self.bit);
            self.odd ^= bit;
            line.drive(bit);
            self.bit += 1;
        } else if self.bit == parity_index {
            // Make the total number of ones odd
            line.drive(!self.odd);
            self.bit += 1;
        } else {
            // Parity was held for a full bit time, now give the line back
            line.release();
            bump(&mut self.stats.sent);
            defmt::trace!("Sent {}", self.packet);
            self.reset();
        }
    }

    fn receive<const R: usize>(&mut self, level: bool, inbound: &mut Producer<'_, R>) {
        // Size is known once the header is in, so this is only true past the header
        if self.bit == self.packet.parity_index() {
            if !(self.odd ^ level) {
                bump(&mut self.stats.parity_errors);
                defmt::debug!("Parity error: {}", self.packet);
            } else if self.overflow {
                bump(&mut self.stats.overflows);
                defmt::warn!("Frame too long: size={=u8}", self.packet.size());
            } else if inbound.enqueue(&self.packet) {
                bump(&mut self.stats.received);
                defmt::trace!("Received {}", self.packet);
            } else {
                bump(&mut self.stats.dropped);
                defmt::warn!("Receive queue full, dropping {}", self.packet);
            }
            self.reset();
        } else {
            self.odd ^= level;
            if !self.packet.set_data_bit(self.bit, level) {
                self.overflow = true;
            }
            self.bit += 1;
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
