//! LibraryNode — answers query packets from a set of collections.

use crate::bus::node::{NodeBehavior, NodeCtx};
use crate::bus::packet::{Packet, PacketKind, PacketTag};
use crate::bus::registry::Registry;
use crate::collection::Collection;
use crate::error::Result;
use crate::media::MediaRef;

/// A bus node owning an ordered list of collections. Each query packet
/// refreshes the collections in turn and accumulates matches up to the
/// requested limit; the reply is a QueryResult packet. A failing backend
/// becomes an Exception broadcast, not the death of the library.
pub struct LibraryNode {
    collections: Vec<Box<dyn Collection>>,
}

impl LibraryNode {
    pub fn new() -> Self {
        Self {
            collections: Vec::new(),
        }
    }

    pub fn with_collection(mut self, collection: Box<dyn Collection>) -> Self {
        self.collections.push(collection);
        self
    }

    fn on_query(&mut self, ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
        let PacketKind::Query { constraint, limit } = pkt.kind() else {
            return Ok(());
        };

        let mut results: Vec<MediaRef> = Vec::new();
        for collection in &self.collections {
            let outcome = collection
                .refresh()
                .and_then(|_| collection.find_media(constraint, *limit));
            match outcome {
                Ok(mut media) => results.append(&mut media),
                Err(e) => {
                    tracing::error!(node = %ctx.name(), error = %e, "collection backend failed");
                    ctx.send(PacketKind::Exception {
                        message: e.to_string(),
                    });
                }
            }
            if *limit > 0 && results.len() >= *limit {
                results.truncate(*limit);
                break;
            }
        }

        tracing::debug!(node = %ctx.name(), results = results.len(), "replying to query");
        ctx.send(PacketKind::QueryResult(results));
        Ok(())
    }
}

impl NodeBehavior for LibraryNode {
    fn name(&self) -> &str {
        "library"
    }

    fn registry() -> Registry<Self> {
        Registry::builder()
            .on("query", &[PacketTag::Query], Self::on_query)
            .build()
    }
}

impl Default for LibraryNode {
    fn default() -> Self {
        Self::new()
    }
}
