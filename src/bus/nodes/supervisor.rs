//! Supervisor — the one recovery layer above the fault primitive.
//!
//! The runtime itself never restarts a faulted node; it only broadcasts
//! an Exception packet and dies. This node is the reference consumer of
//! that signal: wire it downstream of anything whose failure should tear
//! down the whole graph.

use crate::bus::node::{NodeBehavior, NodeCtx};
use crate::bus::packet::{Packet, PacketKind, PacketTag};
use crate::bus::registry::Registry;
use crate::bus::roster;
use crate::error::Result;

/// Listens for Exception packets and cascades a kill through every live
/// node when one arrives.
pub struct Supervisor;

impl Supervisor {
    pub fn new() -> Self {
        Self
    }

    fn on_exception(&mut self, ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
        if let PacketKind::Exception { message } = pkt.kind() {
            tracing::error!(
                node = %ctx.name(),
                origin = ?pkt.origin(),
                error = %message,
                "upstream fault, tearing down graph"
            );
        }
        ctx.kill();
        roster::kill_all_cascade();
        Ok(())
    }
}

impl NodeBehavior for Supervisor {
    fn name(&self) -> &str {
        "supervisor"
    }

    fn registry() -> Registry<Self> {
        Registry::builder()
            .on("exception", &[PacketTag::Exception], Self::on_exception)
            .build()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
