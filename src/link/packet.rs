use defmt::Format;
use static_assertions as sa;

/// Number of payload bytes a packet can hold
pub const PAYLOAD_CAPACITY: usize = 128;

/// Number of header bits on the wire: sender(4), destination(4), size(8)
pub const HEADER_BITS: u16 = 16;

// Longest possible frame index must fit the engine bit counter
sa::const_assert!(HEADER_BITS as usize + 8 * u8::MAX as usize + 1 <= u16::MAX as usize);
sa::const_assert!(PAYLOAD_CAPACITY <= u8::MAX as usize);

const SENDER_SHIFT: u16 = 0;
const DESTINATION_SHIFT: u16 = 4;
const SIZE_SHIFT: u16 = 8;
const NIBBLE: u16 = 0x0f;
const BYTE: u16 = 0xff;

/// Identifier of a node on the shared line
///
/// On the wire this is a 4-bit field, so any value in `0..=15` may be received.
/// Nodes only address destinations in `0..=`[`NodeId::MAX`], where the highest
/// one is [`NodeId::BROADCAST`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Format)]
pub struct NodeId(u8);

impl NodeId {
    /// Destination meaning "deliver to all nodes"
    pub const BROADCAST: Self = Self(8);
    /// Highest destination accepted for sending
    pub const MAX: Self = Self::BROADCAST;

    /// Node id from the lowest 4 bits, higher bits are ignored
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & NIBBLE as u8)
    }

    /// Node id in the accepted range `0..=8`
    pub const fn new(id: u8) -> Option<Self> {
        if id <= Self::MAX.0 {
            Some(Self(id))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::BROADCAST.0
    }
}

/// Error when constructing a [`Packet`]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Format)]
pub enum PacketError {
    /// Payload does not fit in [`PAYLOAD_CAPACITY`]
    PayloadTooLong,
}

/// Unit of communication on the line
///
/// Payload bytes past `size` are always zero for packets built with
/// [`Packet::new`] or taken out of a [`super::queue::PacketQueue`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Packet {
    sender: NodeId,
    destination: NodeId,
    size: u8,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl Packet {
    /// All-zero packet, used to clear the working packet and queue slots
    pub const EMPTY: Self = Self {
        sender: NodeId(0),
        destination: NodeId(0),
        size: 0,
        payload: [0; PAYLOAD_CAPACITY],
    };

    pub fn new(sender: NodeId, destination: NodeId, payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() > PAYLOAD_CAPACITY {
            return Err(PacketError::PayloadTooLong);
        }
        let mut packet = Self {
            sender,
            destination,
            size: payload.len() as u8,
            ..Self::EMPTY
        };
        packet.payload[..payload.len()].copy_from_slice(payload);
        Ok(packet)
    }

    pub fn sender(&self) -> NodeId {
        self.sender
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Declared payload size (may exceed the capacity for a frame received from the wire)
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Meaningful payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.stored_len()]
    }

    /// Payload interpreted as NUL-terminated UTF-8 text
    pub fn text(&self) -> Option<&str> {
        let payload = self.payload();
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        core::str::from_utf8(&payload[..end]).ok()
    }

    /// True if this packet should be processed by node `id`
    pub fn is_for(&self, id: NodeId) -> bool {
        self.destination == id || self.destination.is_broadcast()
    }

    fn stored_len(&self) -> usize {
        (self.size as usize).min(PAYLOAD_CAPACITY)
    }

    /// Copy the header and exactly the meaningful payload bytes of `other`
    pub(crate) fn copy_from(&mut self, other: &Packet) {
        let n = other.stored_len();
        self.sender = other.sender;
        self.destination = other.destination;
        self.size = other.size;
        self.payload[..n].copy_from_slice(&other.payload[..n]);
    }

    /// Header packed as on the wire, `sender | destination << 4 | size << 8`
    pub const fn header(&self) -> u16 {
        (self.sender.0 as u16) << SENDER_SHIFT
            | (self.destination.0 as u16) << DESTINATION_SHIFT
            | (self.size as u16) << SIZE_SHIFT
    }

    fn set_header(&mut self, bits: u16) {
        self.sender = NodeId::from_bits(((bits >> SENDER_SHIFT) & NIBBLE) as u8);
        self.destination = NodeId::from_bits(((bits >> DESTINATION_SHIFT) & NIBBLE) as u8);
        self.size = ((bits >> SIZE_SHIFT) & BYTE) as u8;
    }

    /// Index of the parity bit, which is also the number of data bits in the frame
    pub fn parity_index(&self) -> u16 {
        HEADER_BITS + 8 * self.size as u16
    }

    /// Total number of bits in the frame, not counting the line claim
    pub fn frame_len(&self) -> u16 {
        self.parity_index() + 1
    }

    /// Data bit at frame position `index` (`index < parity_index()`)
    pub fn data_bit(&self, index: u16) -> bool {
        if index < HEADER_BITS {
            (self.header() >> index) & 1 != 0
        } else {
            let i = index - HEADER_BITS;
            match self.payload.get((i / 8) as usize) {
                Some(byte) => (byte >> (i % 8)) & 1 != 0,
                None => false,
            }
        }
    }

    /// Set data bit at frame position `index`
    ///
    /// Returns false if the bit falls outside of the payload buffer, in which
    /// case nothing is stored.
    pub fn set_data_bit(&mut self, index: u16, bit: bool) -> bool {
        if index < HEADER_BITS {
            let mask = 1 << index;
            let header = self.header();
            self.set_header(if bit { header | mask } else { header & !mask });
            true
        } else {
            let i = index - HEADER_BITS;
            match self.payload.get_mut((i / 8) as usize) {
                Some(byte) => {
                    let mask = 1 << (i % 8);
                    if bit {
                        *byte |= mask;
                    } else {
                        *byte &= !mask;
                    }
                    true
                },
                None => false,
            }
        }
    }

    /// Parity bit that makes the count of ones in the frame odd
    pub fn parity_bit(&self) -> bool {
        let ones = (0..self.parity_index())
            .filter(|&i| self.data_bit(i))
            .count();
        ones % 2 == 0
    }

    /// All bits of the frame in transmission order, including parity
    pub fn frame(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.parity_index())
            .map(move |i| self.data_bit(i))
            .chain(core::iter::once(self.parity_bit()))
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Format for Packet {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Packet({=u8} -> {=u8}, size={=u8}, {=[u8]})",
            self.sender.0, self.destination.0, self.size, self.payload())
    }
}
