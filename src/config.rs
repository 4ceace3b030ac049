//! Link configuration
//!
//! With feature `json-config` the values are generated by build.rs from a JSON
//! file, otherwise the defaults below are used.

#[cfg(feature = "json-config")]
pub use generated::{CONFIG, SEND_QUEUE_SLOTS, RECEIVE_QUEUE_SLOTS};

#[cfg(not(feature = "json-config"))]
pub use code::{CONFIG, SEND_QUEUE_SLOTS, RECEIVE_QUEUE_SLOTS};

#[cfg(feature = "json-config")]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

#[cfg(not(feature = "json-config"))]
mod code {
    use crate::link::{LinkConfig, NodeId};

    pub static CONFIG: LinkConfig = LinkConfig {
        node: NodeId::from_bits(0),
        bit_rate: 10_000,
        poll_interval_ms: 10,
    };

    pub const SEND_QUEUE_SLOTS: usize = 3;
    pub const RECEIVE_QUEUE_SLOTS: usize = 5;
}
