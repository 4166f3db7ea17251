//! PacketFilter — permits only one packet type through.

use crate::bus::node::{NodeBehavior, NodeCtx};
use crate::bus::packet::{Packet, PacketTag};
use crate::bus::registry::Registry;
use crate::error::Result;

/// Re-broadcasts only packets whose tag matches (exactly or as a
/// subtype); everything else is swallowed.
pub struct PacketFilter {
    tag: PacketTag,
}

impl PacketFilter {
    pub fn new(tag: PacketTag) -> Self {
        Self { tag }
    }

    fn on_packet(&mut self, ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
        if pkt.is(self.tag) {
            ctx.forward(pkt);
        }
        Ok(())
    }
}

impl NodeBehavior for PacketFilter {
    fn name(&self) -> &str {
        "packet-filter"
    }

    fn registry() -> Registry<Self> {
        Registry::builder()
            .on_any("filter", Self::on_packet)
            .build()
    }
}
