pub mod format;

use std::{path::Path, fs::File, io::{Write, BufReader}};

use anyhow::{ensure, Context};
use proc_macro2::TokenStream;
use quote::{quote, ToTokens, TokenStreamExt};
use serde::{Serialize, Deserialize};
use schemars::{JsonSchema, schema_for, schema::RootSchema};

/// Highest node id that can be assigned, it is also the broadcast id
pub const MAX_NODE_ID: u8 = 8;

/// Build-time configuration of a wirechat node
#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct WirechatConfig {
    /// Id of this node, 0-8
    #[serde(default)]
    pub node_id: u8,
    /// Line bit rate in bits per second
    #[serde(default = "default_bit_rate")]
    pub bit_rate: u32,
    /// Pause between polls of a full send queue or an empty receive queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,
    #[serde(default)]
    pub queues: QueueConfig,
}

/// Number of slots in packet queues, one slot is always kept free
#[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "default_send_slots")]
    pub send: usize,
    #[serde(default = "default_receive_slots")]
    pub receive: usize,
}

fn default_bit_rate() -> u32 { 10_000 }
fn default_poll_interval_ms() -> u32 { 10 }
fn default_send_slots() -> usize { 3 }
fn default_receive_slots() -> usize { 5 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self { send: default_send_slots(), receive: default_receive_slots() }
    }
}

impl Default for WirechatConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            bit_rate: default_bit_rate(),
            poll_interval_ms: default_poll_interval_ms(),
            queues: QueueConfig::default(),
        }
    }
}

impl ToTokens for WirechatConfig {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let node_id = &self.node_id;
        let bit_rate = &self.bit_rate;
        let poll_interval_ms = &self.poll_interval_ms;
        tokens.append_all(quote! {
            crate::link::LinkConfig {
                node: crate::link::NodeId::from_bits(#node_id),
                bit_rate: #bit_rate,
                poll_interval_ms: #poll_interval_ms,
            }
        })
    }
}

impl WirechatConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.node_id <= MAX_NODE_ID, "node_id must be in range 0-{}, got {}", MAX_NODE_ID, self.node_id);
        ensure!(self.bit_rate > 0, "bit_rate must be non-zero");
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be non-zero");
        ensure!(self.queues.send >= 2, "queues.send must be at least 2, got {}", self.queues.send);
        ensure!(self.queues.receive >= 2, "queues.receive must be at least 2, got {}", self.queues.receive);
        Ok(())
    }

    fn file_tokens(&self) -> TokenStream {
        let send = self.queues.send;
        let receive = self.queues.receive;
        quote! {
            pub static CONFIG: crate::link::LinkConfig = #self;
            pub const SEND_QUEUE_SLOTS: usize = #send;
            pub const RECEIVE_QUEUE_SLOTS: usize = #receive;
        }
    }

    fn to_string_pretty(&self) -> anyhow::Result<String> {
        let file = self.file_tokens();
        format::format_file(&file)
            .context(format!("Failed to parse:\n{}", file))
    }

    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        let code = self.to_string_pretty()?;
        file.write_all(code.as_bytes())?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(&mut reader)?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn schema() -> RootSchema {
        schema_for!(Self)
    }

    pub fn schema_to_file(path: &Path) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        let schema = Self::schema();
        let string = serde_json::to_string_pretty(&schema)?;
        file.write_all(string.as_bytes())?;
        Ok(())
    }
}
