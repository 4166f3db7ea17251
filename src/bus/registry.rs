//! Dispatch registry — maps a node's operations to accepted packet tags.
//!
//! The registry is built once at node construction through
//! [`RegistryBuilder`]. Each registration pairs one handler with a
//! non-empty set of accepted tags (or a catch-all); a packet is handed to
//! every registration whose set accepts its tag, in registration order.

use crate::bus::node::NodeCtx;
use crate::bus::packet::{Packet, PacketTag};
use crate::error::Result;

/// A packet handler bound to the node's behavior type.
pub type Handler<B> = fn(&mut B, &NodeCtx, &Packet) -> Result<()>;

/// The tags a registration accepts.
#[derive(Debug, Clone)]
enum TagFilter {
    /// A specific set of tags, matched with subtype semantics.
    Tags(Vec<PacketTag>),
    /// Every packet, regardless of tag.
    Any,
}

impl TagFilter {
    fn accepts(&self, tag: PacketTag) -> bool {
        match self {
            TagFilter::Tags(tags) => tags.iter().any(|t| tag.is_a(*t)),
            TagFilter::Any => true,
        }
    }
}

/// One operation plus the packet tags it accepts.
pub struct Registration<B> {
    name: &'static str,
    filter: TagFilter,
    handler: Handler<B>,
}

impl<B> Registration<B> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if this registration accepts packets of `tag` (exactly, or as
    /// a subtype of an accepted tag).
    pub fn accepts(&self, tag: PacketTag) -> bool {
        self.filter.accepts(tag)
    }

    pub(crate) fn handler(&self) -> Handler<B> {
        self.handler
    }
}

/// The per-node dispatch table, built once at construction.
pub struct Registry<B> {
    entries: Vec<Registration<B>>,
}

impl<B> Registry<B> {
    pub fn builder() -> RegistryBuilder<B> {
        RegistryBuilder {
            entries: Vec::new(),
        }
    }

    /// True if any registration accepts the packet.
    pub fn handles(&self, pkt: &Packet) -> bool {
        let tag = pkt.tag();
        self.entries.iter().any(|e| e.accepts(tag))
    }

    /// Registrations accepting `tag`, in registration order.
    pub(crate) fn matching(&self, tag: PacketTag) -> impl Iterator<Item = &Registration<B>> {
        self.entries.iter().filter(move |e| e.accepts(tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder populating the registration table.
pub struct RegistryBuilder<B> {
    entries: Vec<Registration<B>>,
}

impl<B> RegistryBuilder<B> {
    /// Registers `handler` for the given tags.
    ///
    /// # Panics
    ///
    /// Panics if `tags` is empty — a registration that accepts nothing is
    /// a construction-time error, caught where the node is defined.
    pub fn on(mut self, name: &'static str, tags: &[PacketTag], handler: Handler<B>) -> Self {
        assert!(
            !tags.is_empty(),
            "registration '{name}' must accept at least one packet tag"
        );
        self.entries.push(Registration {
            name,
            filter: TagFilter::Tags(tags.to_vec()),
            handler,
        });
        self
    }

    /// Registers `handler` for every packet, regardless of tag.
    pub fn on_any(mut self, name: &'static str, handler: Handler<B>) -> Self {
        self.entries.push(Registration {
            name,
            filter: TagFilter::Any,
            handler,
        });
        self
    }

    pub fn build(self) -> Registry<B> {
        Registry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::packet::{Packet, PacketKind};

    struct Probe;

    fn noop(_: &mut Probe, _: &NodeCtx, _: &Packet) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_subtype_matching() {
        let reg: Registry<Probe> = Registry::builder()
            .on("kill", &[PacketTag::Kill], noop)
            .build();
        // KillAll is a subtype of Kill, so the kill registration accepts it.
        assert!(reg.handles(&Packet::new(PacketKind::KillAll)));
        assert!(!reg.handles(&Packet::new(PacketKind::Timeout)));
    }

    #[test]
    fn test_registration_order_preserved() {
        let reg: Registry<Probe> = Registry::builder()
            .on("first", &[PacketTag::Media], noop)
            .on_any("second", noop)
            .on("third", &[PacketTag::Media, PacketTag::MediaList], noop)
            .build();

        let names: Vec<_> = reg.matching(PacketTag::Media).map(|e| e.name()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    #[should_panic(expected = "at least one packet tag")]
    fn test_empty_tag_set_is_rejected() {
        let _: Registry<Probe> = Registry::builder().on("broken", &[], noop).build();
    }
}
