//! SingleSource — a one-shot media source.

use crate::bus::node::{NodeBehavior, NodeCtx};
use crate::bus::packet::{Packet, PacketKind, PacketTag};
use crate::bus::registry::Registry;
use crate::error::Result;
use crate::media::MediaRef;

/// Broadcasts one media packet when told to Start, then exits.
pub struct SingleSource {
    media: MediaRef,
}

impl SingleSource {
    pub fn new(media: MediaRef) -> Self {
        Self { media }
    }

    fn on_start(&mut self, ctx: &NodeCtx, _pkt: &Packet) -> Result<()> {
        tracing::debug!(node = %ctx.name(), media = %self.media.describe(), "emitting media");
        ctx.send(PacketKind::Media(self.media.clone()));
        ctx.kill();
        Ok(())
    }
}

impl NodeBehavior for SingleSource {
    fn name(&self) -> &str {
        "single-source"
    }

    fn registry() -> Registry<Self> {
        Registry::builder()
            .on("start", &[PacketTag::Start], Self::on_start)
            .build()
    }
}
