//! # mediabus: an actor-based media pipeline runtime
//!
//! Media pipelines are built out of independently-scheduled nodes that
//! communicate exclusively by typed, broadcast packets. Each node owns a
//! mailbox and a dispatch registry and runs on its own thread; edges fan
//! packets out by exact type or wildcard, and cancellation is itself a
//! packet that can cascade through the reachable subgraph.
//!
//! On top of the bus sits a hierarchical media cache: a SQLite-backed
//! mirror of a slower backend tree, searched through a composable
//! constraint AST that compiles down to a single filtered scan.
//!
//! ## Example
//!
//! ```no_run
//! use mediabus::bus::nodes::{MediaBuffer, MediaSink};
//! use mediabus::bus::packet::PacketTag;
//! use mediabus::bus::{roster, NodeHandle};
//! use mediabus::stream::MemoryStream;
//!
//! # fn main() -> mediabus::Result<()> {
//! let buffer = NodeHandle::new(MediaBuffer::new());
//! let sink = NodeHandle::new(MediaSink::new(Box::new(MemoryStream::empty()))?);
//!
//! // Media flows buffer → sink; completion flows back as demand.
//! buffer.connect(&sink, Some(PacketTag::Media));
//! sink.connect(&buffer, Some(PacketTag::PlaybackComplete));
//!
//! roster::kickstart(&[&buffer, &sink]);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod codec;
pub mod collection;
pub mod config;
pub mod error;
pub mod media;
pub mod query;
pub mod stream;

mod sync;

// Re-export commonly used types
pub use bus::{
    Lifecycle, NodeBehavior, NodeCtx, NodeHandle, Packet, PacketKind, PacketTag,
};
pub use collection::{Collection, DbCache, LibraryNode};
pub use config::Config;
pub use error::{MediaBusError, Result};
pub use media::{MediaObject, MediaRef, MetaValue, Metadata};
pub use query::Constraint;
