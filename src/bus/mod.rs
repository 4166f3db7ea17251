//! The actor/packet bus: typed packets, per-node mailboxes, dispatch
//! registries, the threaded node runtime, graph wiring, and the
//! process-wide roster.

pub mod mailbox;
pub mod node;
pub mod nodes;
pub mod packet;
pub mod registry;
pub mod roster;

mod graph;

pub use mailbox::{Mailbox, Received};
pub use node::{Lifecycle, NodeBehavior, NodeCtx, NodeHandle};
pub use packet::{ControlKind, ControlValue, NodeId, Notification, Packet, PacketKind, PacketTag};
pub use registry::{Registration, Registry, RegistryBuilder};
