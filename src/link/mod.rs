//! Packet link over a single shared open-drain wire
//!
//! The link is split into two halves. [`Driver`] owns the protocol [`Engine`]
//! and the line and must be ticked once per bit time from a periodic
//! interrupt. [`Link`] is used by the application to queue packets for
//! sending and to pick up received ones. The halves only share two
//! lock-free [`PacketQueue`]s.

pub mod engine;
pub mod line;
pub mod packet;
pub mod queue;

pub use engine::{Engine, Mode, Stats};
pub use line::{Line, OpenDrainLine};
pub use packet::{NodeId, Packet, PacketError, PAYLOAD_CAPACITY};
pub use queue::{Consumer, PacketQueue, Producer};

/// Link parameters of this node
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub struct LinkConfig {
    /// Own node id, used as sender and for filtering received packets
    pub node: NodeId,
    /// Bit times per second, this is the tick rate of the [`Driver`]
    pub bit_rate: u32,
    /// Pause between polls of blocking [`Link`] calls
    pub poll_interval_ms: u32,
}

/// Pause taken by blocking calls between queue polls
pub trait Backoff {
    fn pause(&mut self);
}

impl<F: FnMut()> Backoff for F {
    fn pause(&mut self) {
        self()
    }
}

/// Application half of the link
pub struct Link<'a, const S: usize, const R: usize> {
    outbound: Producer<'a, S>,
    inbound: Consumer<'a, R>,
}

/// Interrupt half of the link
pub struct Driver<'a, L, const S: usize, const R: usize> {
    engine: Engine,
    line: L,
    outbound: Consumer<'a, S>,
    inbound: Producer<'a, R>,
}

/// Release the line and split both queues into the two halves of the link
pub fn split<'a, L: Line, const S: usize, const R: usize>(
    mut line: L,
    outbound: &'a mut PacketQueue<S>,
    inbound: &'a mut PacketQueue<R>,
) -> (Link<'a, S, R>, Driver<'a, L, S, R>) {
    line.release();
    let (out_p, out_c) = outbound.split();
    let (in_p, in_c) = inbound.split();
    let link = Link { outbound: out_p, inbound: in_c };
    let driver = Driver { engine: Engine::new(), line, outbound: out_c, inbound: in_p };
    (link, driver)
}

impl<'a, const S: usize, const R: usize> Link<'a, S, R> {
    /// Queue packet for sending, pausing while the send queue is full
    ///
    /// Returns false without queueing if the destination is not a valid node
    /// id. Returning true only means the packet has been queued.
    pub fn send_packet(&mut self, packet: &Packet, backoff: &mut impl Backoff) -> bool {
        if packet.destination() > NodeId::MAX {
            defmt::warn!("Invalid destination {=u8}", packet.destination().get());
            return false;
        }
        while !self.outbound.enqueue(packet) {
            backoff.pause();
        }
        true
    }

    /// Take next received packet, pausing until one is available
    pub fn get_packet(&mut self, backoff: &mut impl Backoff) -> Packet {
        loop {
            match self.inbound.dequeue() {
                Some(packet) => return packet,
                None => backoff.pause(),
            }
        }
    }

    /// Take next received packet if there is one
    pub fn try_get_packet(&mut self) -> Option<Packet> {
        self.inbound.dequeue()
    }

    pub fn has_packet(&self) -> bool {
        !self.inbound.is_empty()
    }
}

impl<'a, L: Line, const S: usize, const R: usize> Driver<'a, L, S, R> {
    /// Run one bit time of the protocol, call at the configured bit rate
    pub fn tick(&mut self) {
        self.engine.tick(&mut self.line, &mut self.outbound, &mut self.inbound);
    }

    pub fn stats(&self) -> &Stats {
        self.engine.stats()
    }

    pub fn mode(&self) -> Mode {
        self.engine.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::line::mock::{Bus, BusLine};
    use rand::prelude::*;
    use std::vec::Vec;

    type TestLink<'a> = Link<'a, 3, 5>;
    type TestDriver<'a> = Driver<'a, BusLine, 3, 5>;

    struct Node {
        send: PacketQueue<3>,
        recv: PacketQueue<5>,
    }

    impl Node {
        fn new() -> Self {
            Self { send: PacketQueue::new(), recv: PacketQueue::new() }
        }

        fn split(&mut self, bus: &Bus, index: u32) -> (TestLink<'_>, TestDriver<'_>) {
            split(bus.line(index), &mut self.send, &mut self.recv)
        }
    }

    fn packet(from: u8, to: u8, payload: &[u8]) -> Packet {
        Packet::new(NodeId::from_bits(from), NodeId::from_bits(to), payload).unwrap()
    }

    fn tick_all(drivers: &mut [&mut TestDriver<'_>], n: usize) {
        for _ in 0..n {
            for d in drivers.iter_mut() {
                d.tick();
            }
        }
    }

    fn no_wait() -> impl FnMut() {
        || panic!("Unexpected wait")
    }

    #[test]
    fn simple_exchange() {
        let bus = Bus::new();
        let (mut a, mut b) = (Node::new(), Node::new());
        let (mut link_a, mut drv_a) = a.split(&bus, 0);
        let (mut link_b, mut drv_b) = b.split(&bus, 1);
        let p = packet(2, 5, b"hi\0\0\0\0");

        assert!(link_a.send_packet(&p, &mut no_wait()));
        // claim + 64 data bits + parity, sender ticks first
        tick_all(&mut [&mut drv_a, &mut drv_b], 65);
        assert!(!link_b.has_packet());
        tick_all(&mut [&mut drv_a, &mut drv_b], 1);
        assert!(link_b.has_packet());
        assert_eq!(link_b.get_packet(&mut no_wait()), p);
        assert!(!link_a.has_packet());

        // parity is held for a full bit time, line is released on the following tick
        assert_eq!(drv_a.mode(), Mode::Sending);
        assert_eq!(drv_b.mode(), Mode::Idle);
        tick_all(&mut [&mut drv_a, &mut drv_b], 1);
        assert!(bus.level());
        assert_eq!(drv_a.stats().sent, 1);
        assert_eq!(drv_b.stats().received, 1);
        assert_eq!((drv_a.mode(), drv_b.mode()), (Mode::Idle, Mode::Idle));
    }

    #[test]
    fn receiver_ticking_first() {
        let bus = Bus::new();
        let (mut a, mut b) = (Node::new(), Node::new());
        let (mut link_a, mut drv_a) = a.split(&bus, 0);
        let (mut link_b, mut drv_b) = b.split(&bus, 1);
        let p = packet(2, 5, b"hi\0\0\0\0");

        assert!(link_a.send_packet(&p, &mut no_wait()));
        // receiver lags one tick behind the sender
        tick_all(&mut [&mut drv_b, &mut drv_a], 67);
        assert_eq!(link_b.try_get_packet(), Some(p));
        assert_eq!(drv_b.stats().parity_errors, 0);
    }

    #[test]
    fn invalid_destination_rejected() {
        let bus = Bus::new();
        let mut a = Node::new();
        let (mut link, mut drv) = a.split(&bus, 0);
        assert!(!link.send_packet(&packet(0, 9, b"x\0"), &mut no_wait()));
        assert!(!link.send_packet(&packet(0, 15, b"x\0"), &mut no_wait()));
        drv.tick();
        assert_eq!(drv.mode(), Mode::Idle);
        assert!(bus.level());
    }

    #[test]
    fn back_pressure() {
        let bus = Bus::new();
        let (mut a, mut b) = (Node::new(), Node::new());
        let (mut link_a, mut drv_a) = a.split(&bus, 0);
        let (mut link_b, mut drv_b) = b.split(&bus, 1);
        let packets: Vec<_> = (0..4u8).map(|i| packet(1, 2, &[b'a' + i, 0])).collect();

        let mut waits = 0;
        for p in packets.iter() {
            let mut backoff = || {
                waits += 1;
                tick_all(&mut [&mut drv_a, &mut drv_b], 1);
            };
            assert!(link_a.send_packet(p, &mut backoff));
        }
        // third packet had to wait until first one left the queue
        assert!(waits > 0);
        tick_all(&mut [&mut drv_a, &mut drv_b], 4 * 40);
        let received: Vec<_> = (0..4).map(|_| link_b.get_packet(&mut no_wait())).collect();
        assert_eq!(received, packets);
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let bus = Bus::new();
        let mut nodes: Vec<Node> = (0..3).map(|_| Node::new()).collect();
        let (mut links, mut drivers): (Vec<_>, Vec<_>) = nodes
            .iter_mut()
            .enumerate()
            .map(|(i, n)| n.split(&bus, i as u32))
            .unzip();
        let p = packet(0, NodeId::BROADCAST.get(), b"all\0");
        assert!(links[0].send_packet(&p, &mut no_wait()));
        for _ in 0..100 {
            for d in drivers.iter_mut() {
                d.tick();
            }
        }
        assert!(!links[0].has_packet());
        assert_eq!(links[1].try_get_packet(), Some(p));
        assert_eq!(links[2].try_get_packet(), Some(p));
    }

    #[test]
    fn every_bit_flip_is_detected() {
        let p = packet(3, 1, b"ok?\0");
        let frame: Vec<bool> = p.frame().collect();
        let mut checked = 0;
        for flip in 0..frame.len() {
            let mut corrupted = frame.clone();
            corrupted[flip] = !corrupted[flip];
            // clearing a size bit shortens the frame, parity is then taken mid-payload
            let size_bit = (8..16).contains(&flip);
            if size_bit && !corrupted[flip] {
                continue;
            }
            let mut levels = vec![false];
            levels.extend(corrupted);
            // keep the receiver clocking past the end of a lengthened frame
            let extra = if size_bit { 8 * 256 } else { 0 };

            let mut q_out = PacketQueue::<2>::new();
            let mut q_in = PacketQueue::<2>::new();
            let line = super::line::mock::ScriptedLine::new(levels);
            let (mut link, mut drv) = split(line, &mut q_out, &mut q_in);
            for _ in 0..frame.len() + 1 + extra {
                drv.tick();
            }
            assert!(!link.has_packet(), "flip of bit {} not detected", flip);
            assert_eq!(link.try_get_packet(), None);
            checked += 1;
        }
        assert!(checked > frame.len() - 8);
    }

    #[test]
    fn random_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let bus = Bus::new();
        let (mut a, mut b) = (Node::new(), Node::new());
        let (mut link_a, mut drv_a) = a.split(&bus, 0);
        let (mut link_b, mut drv_b) = b.split(&bus, 1);

        for _ in 0..50 {
            let len = rng.gen_range(0..=PAYLOAD_CAPACITY);
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let p = packet(rng.gen_range(0..=15), rng.gen_range(0..=8), &payload);
            let a_first = rng.gen_bool(0.5);

            assert!(link_a.send_packet(&p, &mut no_wait()));
            let ticks = p.frame_len() as usize + 2;
            if a_first {
                tick_all(&mut [&mut drv_a, &mut drv_b], ticks);
            } else {
                tick_all(&mut [&mut drv_b, &mut drv_a], ticks);
            }
            assert_eq!(link_b.try_get_packet(), Some(p));
        }
        assert_eq!(drv_b.stats().received, 50);
        assert_eq!(drv_a.stats().sent, 50);
    }

    #[test]
    fn driver_on_separate_thread() {
        let bus = Bus::new();
        let (mut a, mut b) = (Node::new(), Node::new());
        let (mut link_a, mut drv_a) = a.split(&bus, 0);
        let (mut link_b, mut drv_b) = b.split(&bus, 1);
        let packets: Vec<_> = (0..10u8).map(|i| packet(1, 2, &[i; 10])).collect();
        let done = std::sync::atomic::AtomicBool::new(false);
        const IN_FLIGHT: usize = 2;

        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(std::sync::atomic::Ordering::SeqCst) {
                    drv_a.tick();
                    drv_b.tick();
                }
            });
            let mut yield_now = std::thread::yield_now;
            let mut received = Vec::new();
            for (i, p) in packets.iter().enumerate() {
                assert!(link_a.send_packet(p, &mut yield_now));
                // outstanding packets never exceed receive queue capacity
                if i >= IN_FLIGHT {
                    received.push(link_b.get_packet(&mut yield_now));
                }
            }
            while received.len() < packets.len() {
                received.push(link_b.get_packet(&mut yield_now));
            }
            assert_eq!(received, packets);
            done.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(drv_b.stats().received, 10);
        assert_eq!(drv_b.stats().dropped, 0);
    }

    #[test]
    fn full_receive_queue_drops_frames() {
        let bus = Bus::new();
        let (mut a, mut b) = (Node::new(), Node::new());
        let (mut link_a, mut drv_a) = a.split(&bus, 0);
        let (mut link_b, mut drv_b) = b.split(&bus, 1);
        let packets: Vec<_> = (0..6u8).map(|i| packet(1, 2, &[i; 10])).collect();

        for p in packets.iter() {
            let mut backoff = || tick_all(&mut [&mut drv_a, &mut drv_b], 1);
            assert!(link_a.send_packet(p, &mut backoff));
        }
        tick_all(&mut [&mut drv_a, &mut drv_b], 6 * 120);
        assert_eq!(drv_a.stats().sent, 6);
        assert_eq!(drv_b.stats().received, 4);
        assert_eq!(drv_b.stats().dropped, 2);
        let received: Vec<_> = core::iter::from_fn(|| link_b.try_get_packet()).collect();
        assert_eq!(received, packets[..4]);
    }
}
