use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::packet::Packet;

/// Fixed-size single-producer single-consumer queue of packets
///
/// One slot is always kept empty to tell a full queue from an empty one, so
/// the queue holds at most `N - 1` packets. Head and tail are only loaded and
/// stored (no read-modify-write), which works on cores without atomic CAS
/// such as Cortex-M0.
///
/// The queue is used through the two halves returned by [`PacketQueue::split`].
/// The consumer only writes `head`, the producer only writes `tail`.
pub struct PacketQueue<const N: usize> {
    slots: UnsafeCell<[Packet; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Slots are only accessed through one Producer and one Consumer, see `split`
unsafe impl<const N: usize> Sync for PacketQueue<N> {}

impl<const N: usize> PacketQueue<N> {
    const MIN_SLOTS: () = assert!(N >= 2, "Queue needs at least 2 slots");

    pub const fn new() -> Self {
        let _ = Self::MIN_SLOTS;
        Self {
            slots: UnsafeCell::new([Packet::EMPTY; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Maximum number of packets stored at the same time
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        next(self.tail.load(Ordering::Acquire), N) == self.head.load(Ordering::Acquire)
    }

    /// Split queue into unique producer and consumer halves
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        (Producer { queue: self }, Consumer { queue: self })
    }
}

impl<const N: usize> Default for PacketQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
const fn next(i: usize, n: usize) -> usize {
    if i + 1 == n { 0 } else { i + 1 }
}

/// Enqueueing half of a [`PacketQueue`]
pub struct Producer<'a, const N: usize> {
    queue: &'a PacketQueue<N>,
}

/// Dequeueing half of a [`PacketQueue`]
pub struct Consumer<'a, const N: usize> {
    queue: &'a PacketQueue<N>,
}

// Each half must stay unique
static_assertions::assert_not_impl_any!(Producer<'static, 2>: Clone, Copy);
static_assertions::assert_not_impl_any!(Consumer<'static, 2>: Clone, Copy);

impl<'a, const N: usize> Producer<'a, N> {
    /// Copy packet into the queue, returns false if the queue is full
    pub fn enqueue(&mut self, packet: &Packet) -> bool {
        let tail = self.queue.tail.load(Ordering::Relaxed);
        let next_tail = next(tail, N);
        if next_tail == self.queue.head.load(Ordering::Acquire) {
            return false;
        }
        // Slot at `tail` is not visible to the consumer until tail is advanced
        let slot = unsafe { &mut (*self.queue.slots.get())[tail] };
        slot.copy_from(packet);
        self.queue.tail.store(next_tail, Ordering::Release);
        true
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }
}

impl<'a, const N: usize> Consumer<'a, N> {
    /// Take the oldest packet out of the queue
    pub fn dequeue(&mut self) -> Option<Packet> {
        let head = self.queue.head.load(Ordering::Relaxed);
        if head == self.queue.tail.load(Ordering::Acquire) {
            return None;
        }
        // Slot at `head` is owned by the consumer until head is advanced
        let slot = unsafe { &(*self.queue.slots.get())[head] };
        let mut packet = Packet::EMPTY;
        packet.copy_from(slot);
        self.queue.head.store(next(head, N), Ordering::Release);
        Some(packet)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
