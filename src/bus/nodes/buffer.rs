//! MediaBuffer — watermark-based lookahead between a source and a sink.
//!
//! The buffer holds a bounded list of pending media packets and signals
//! demand upstream with `Next` whenever it sits below capacity. Items
//! are handed downstream most-recently-inserted first: the lookahead is
//! a stack, not a queue, so a backlog is drained in reverse submission
//! order.

use crate::bus::node::{NodeBehavior, NodeCtx};
use crate::bus::packet::{ControlKind, Packet, PacketKind, PacketTag};
use crate::bus::registry::Registry;
use crate::config::BufferConfig;
use crate::error::Result;

/// Default number of media packets held ahead of the consumer.
pub const DEFAULT_LOOKAHEAD: usize = 5;

/// A bounded lookahead of media packets with demand signaling.
pub struct MediaBuffer {
    lookahead: Vec<Packet>,
    capacity: usize,
    demand: bool,
}

impl MediaBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOOKAHEAD)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lookahead: Vec::new(),
            capacity,
            demand: true,
        }
    }

    pub fn from_config(config: &BufferConfig) -> Self {
        Self::with_capacity(config.lookahead)
    }

    fn request_more_if_low(&self, ctx: &NodeCtx) {
        if self.lookahead.len() < self.capacity {
            tracing::debug!(
                node = %ctx.name(),
                stocked = self.lookahead.len(),
                "buffer below capacity, requesting more"
            );
            ctx.send(PacketKind::control(ControlKind::Next));
        }
    }

    /// Stocks an incoming media packet, or passes it straight through
    /// when the consumer is already waiting and nothing is stocked.
    fn on_media(&mut self, ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
        if self.lookahead.is_empty() && self.demand {
            tracing::debug!(node = %ctx.name(), "empty buffer, passing media through");
            ctx.forward(pkt);
        } else {
            self.lookahead.push(pkt.clone());
        }
        self.demand = false;
        self.request_more_if_low(ctx);
        Ok(())
    }

    /// Serves the consumer on `Next` or `PlaybackComplete`: pops the
    /// most-recently-inserted item, forwards it if present, and re-raises
    /// demand upstream. An empty lookahead is never a silent drop — the
    /// demand flag stays set until media arrives.
    fn on_demand(&mut self, ctx: &NodeCtx, _pkt: &Packet) -> Result<()> {
        self.demand = true;
        if let Some(next) = self.lookahead.pop() {
            tracing::debug!(node = %ctx.name(), "serving next media packet");
            ctx.forward(&next);
        }
        self.request_more_if_low(ctx);
        Ok(())
    }
}

impl NodeBehavior for MediaBuffer {
    fn name(&self) -> &str {
        "media-buffer"
    }

    fn registry() -> Registry<Self> {
        Registry::builder()
            .on("media", &[PacketTag::Media], Self::on_media)
            .on(
                "demand",
                &[PacketTag::Next, PacketTag::PlaybackComplete],
                Self::on_demand,
            )
            .build()
    }
}

impl Default for MediaBuffer {
    fn default() -> Self {
        Self::new()
    }
}
