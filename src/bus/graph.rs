//! Graph wiring — the per-node output table.
//!
//! Edges are keyed by the exact packet tag they carry, or by the wildcard
//! key, which receives every packet. Multiple listeners may sit on one
//! edge; they are delivered to in connection order. Edges share ownership
//! of their downstream handle, but a handle found dead (its thread has
//! terminated) is pruned during the broadcast walk rather than delivered
//! to.

use crate::bus::node::NodeHandle;
use crate::bus::packet::PacketTag;
use std::collections::HashMap;

/// Directed, tag-keyed fan-out table from one node to its listeners.
#[derive(Default)]
pub(crate) struct OutputTable {
    edges: HashMap<Option<PacketTag>, Vec<NodeHandle>>,
}

impl OutputTable {
    /// Adds `downstream` to the edge for `tag` (`None` = wildcard).
    pub fn connect(&mut self, tag: Option<PacketTag>, downstream: NodeHandle) {
        self.edges.entry(tag).or_default().push(downstream);
    }

    /// Removes `downstream` from the edge for `tag`.
    pub fn disconnect(&mut self, tag: Option<PacketTag>, downstream: &NodeHandle) {
        if let Some(listeners) = self.edges.get_mut(&tag) {
            listeners.retain(|h| !h.is_same(downstream));
        }
    }

    /// Collects the live targets for a packet of `tag`: first the exact
    /// edge, then the wildcard edge. Dead listeners are pruned in place.
    pub fn collect(&mut self, tag: PacketTag) -> Vec<NodeHandle> {
        let mut targets = Vec::new();
        for key in [Some(tag), None] {
            if let Some(listeners) = self.edges.get_mut(&key) {
                listeners.retain(|h| {
                    if h.accepts_packets() {
                        true
                    } else {
                        tracing::debug!(node = %h.name(), "pruning dead listener");
                        false
                    }
                });
                targets.extend(listeners.iter().cloned());
            }
        }
        targets
    }

    /// Total number of listeners across all edges.
    pub fn listener_count(&self) -> usize {
        self.edges.values().map(|l| l.len()).sum()
    }
}
