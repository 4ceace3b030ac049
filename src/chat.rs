//! Text chat on top of the packet link
//!
//! Lines typed on the console have the form `N: message`, where `N` is the
//! destination node id. Message text travels as a NUL-terminated payload.

use heapless::String;

use crate::link::{NodeId, Packet, PAYLOAD_CAPACITY};

/// Maximum length of a typed line
pub const LINE_LEN: usize = 80;

/// Longest text that fits in a packet together with the NUL terminator
pub const MAX_TEXT_LEN: usize = PAYLOAD_CAPACITY - 1;

/// Capacity of a rendered message: `[NN] ` + text + `\r\n`
///
/// Received text may fill the whole payload when the sender omits the NUL.
pub const RENDER_LEN: usize = 5 + PAYLOAD_CAPACITY + 2;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// Accumulates console input into lines
#[derive(Default)]
pub struct LineEditor {
    line: String<LINE_LEN>,
}

impl LineEditor {
    pub const fn new() -> Self {
        Self { line: String::new() }
    }

    /// Current unfinished line
    pub fn as_str(&self) -> &str {
        self.line.as_str()
    }

    /// Feed one input byte, returns the line when it is finished
    ///
    /// Empty lines are not returned. Bytes that do not fit in the line or are
    /// not printable ASCII are ignored.
    pub fn push(&mut self, byte: u8) -> Option<String<LINE_LEN>> {
        match byte {
            b'\r' | b'\n' => {
                if self.line.is_empty() {
                    None
                } else {
                    Some(core::mem::take(&mut self.line))
                }
            },
            BACKSPACE | DELETE => {
                self.line.pop();
                None
            },
            b' '..=b'~' => {
                // full line, drop the character
                let _ = self.line.push(byte as char);
                None
            },
            _ => None,
        }
    }
}

/// Split `"N: message"` into destination digit and message
pub fn parse_line(line: &str) -> Option<(u8, &str)> {
    let bytes = line.as_bytes();
    match bytes {
        [digit @ b'0'..=b'9', b':', b' ', ..] => Some((digit - b'0', &line[3..])),
        _ => None,
    }
}

/// Build a text packet, `None` if the destination is not a valid node id
///
/// Text longer than [`MAX_TEXT_LEN`] is truncated on a character boundary.
pub fn compose(sender: NodeId, destination: u8, text: &str) -> Option<Packet> {
    let destination = NodeId::new(destination)?;
    let mut end = text.len().min(MAX_TEXT_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut payload = [0u8; PAYLOAD_CAPACITY];
    payload[..end].copy_from_slice(&text.as_bytes()[..end]);
    // includes the NUL terminator
    Packet::new(sender, destination, &payload[..end + 1]).ok()
}

/// Received chat message
#[derive(Debug, PartialEq, Eq)]
pub struct Message<'a> {
    pub sender: NodeId,
    pub text: &'a str,
}

/// Extract a message addressed to node `me` (directly or by broadcast)
pub fn accept(packet: &Packet, me: NodeId) -> Option<Message<'_>> {
    if !packet.is_for(me) {
        return None;
    }
    let text = packet.text()?;
    Some(Message { sender: packet.sender(), text })
}

impl<'a> Message<'a> {
    /// Console representation in a fixed buffer
    ///
    /// Always fits for messages returned by [`accept`], `None` only if `text`
    /// was set to something longer than a packet payload.
    pub fn render(&self) -> Option<String<RENDER_LEN>> {
        let mut out = String::new();
        ufmt::uwrite!(out, "{}", self).ok()?;
        Some(out)
    }
}

/// Console representation: `[sender] text\r\n`
impl<'a> ufmt::uDisplay for Message<'a> {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        ufmt::uwrite!(f, "[{}] {}\r\n", self.sender.get(), self.text)
    }
}

impl<'a> defmt::Format for Message<'a> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[{=u8}] {=str}", self.sender.get(), self.text)
    }
}
