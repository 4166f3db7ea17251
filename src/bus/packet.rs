//! Typed packets — the signaling unit of the bus.
//!
//! Packets are immutable value types. Sending a packet clones it once per
//! recipient, so no node can ever observe another node's copy. Every
//! packet carries a runtime tag from a closed enumeration; handler
//! predicates match tags by membership in a subtype table rather than by
//! reflection.

use crate::media::MediaRef;
use crate::query::Constraint;
use std::backtrace::Backtrace;
use std::sync::Arc;

/// Identity of a node, used as a non-owning packet origin reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u64);

/// Runtime type tag of a packet.
///
/// The tags form a shallow hierarchy: `KillAll` is a subtype of `Kill`,
/// the transport controls are subtypes of `Control`, the notifications of
/// `Notification`, `StreamProgress` of `Stream`, and `QueryResult` of
/// `MediaList`. [`PacketTag::is_a`] walks that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketTag {
    /// Guaranteed to be the first packet a node receives.
    Kickstart,
    /// Asks the node to terminate.
    Kill,
    /// Asks the node to terminate and forwards itself to all listeners.
    KillAll,
    /// Synthesized when the mailbox sits idle past the node's timeout.
    Timeout,
    /// Indicates an error occurred in an upstream node.
    Exception,
    /// Umbrella tag for transport control signals.
    Control,
    Start,
    Stop,
    Pause,
    Next,
    Prev,
    Enqueue,
    Load,
    Seek,
    Exit,
    /// One media reference.
    Media,
    /// An ordered sequence of media references.
    MediaList,
    /// A query against a media collection.
    Query,
    /// The reply to a query.
    QueryResult,
    /// Umbrella tag for stream status updates.
    Stream,
    StreamProgress,
    /// Umbrella tag for one-way status notifications.
    Notification,
    PlaybackComplete,
    PlaybackStarted,
    PlaybackStopped,
    Buffering,
    PlaylistEmpty,
}

impl PacketTag {
    /// Parent tag in the subtype table, if any.
    pub fn parent(self) -> Option<PacketTag> {
        use PacketTag::*;
        match self {
            KillAll => Some(Kill),
            Start | Stop | Pause | Next | Prev | Enqueue | Load | Seek | Exit => Some(Control),
            StreamProgress => Some(Stream),
            QueryResult => Some(MediaList),
            PlaybackComplete | PlaybackStarted | PlaybackStopped | Buffering | PlaylistEmpty => {
                Some(Notification)
            }
            _ => None,
        }
    }

    /// True if `self` is `tag` or a subtype of `tag`.
    pub fn is_a(self, tag: PacketTag) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == tag {
                return true;
            }
            current = t.parent();
        }
        false
    }
}

/// The transport control signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Start some operation.
    Start,
    /// Stop doing some operation.
    Stop,
    /// Pause something that can be continued later.
    Pause,
    /// Skip the current operation.
    Next,
    /// Go back to the previous operation.
    Prev,
    /// Passes along a source to enqueue.
    Enqueue,
    /// Carries a URI to load.
    Load,
    /// Carries a location to seek to.
    Seek,
    /// Indicates an upstream node has left the graph.
    Exit,
}

impl ControlKind {
    fn tag(self) -> PacketTag {
        match self {
            ControlKind::Start => PacketTag::Start,
            ControlKind::Stop => PacketTag::Stop,
            ControlKind::Pause => PacketTag::Pause,
            ControlKind::Next => PacketTag::Next,
            ControlKind::Prev => PacketTag::Prev,
            ControlKind::Enqueue => PacketTag::Enqueue,
            ControlKind::Load => PacketTag::Load,
            ControlKind::Seek => PacketTag::Seek,
            ControlKind::Exit => PacketTag::Exit,
        }
    }
}

/// Optional payload carried by a control packet.
#[derive(Clone)]
pub enum ControlValue {
    Text(String),
    Number(i64),
    Media(MediaRef),
}

impl std::fmt::Debug for ControlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlValue::Text(v) => write!(f, "Text({v:?})"),
            ControlValue::Number(v) => write!(f, "Number({v})"),
            ControlValue::Media(m) => write!(f, "Media({})", m.describe()),
        }
    }
}

/// One-way status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    /// Playback of the current media object has completed.
    PlaybackComplete,
    /// Playback of the current media object has started.
    PlaybackStarted,
    /// Playback was stopped.
    PlaybackStopped,
    /// The buffer is low and more data should be sent.
    Buffering,
    /// The playlist is empty.
    PlaylistEmpty,
}

impl Notification {
    fn tag(self) -> PacketTag {
        match self {
            Notification::PlaybackComplete => PacketTag::PlaybackComplete,
            Notification::PlaybackStarted => PacketTag::PlaybackStarted,
            Notification::PlaybackStopped => PacketTag::PlaybackStopped,
            Notification::Buffering => PacketTag::Buffering,
            Notification::PlaylistEmpty => PacketTag::PlaylistEmpty,
        }
    }
}

/// Packet payload, one variant per concrete packet type.
#[derive(Clone)]
pub enum PacketKind {
    Kickstart,
    Kill,
    KillAll,
    Timeout,
    Exception { message: String },
    Control { kind: ControlKind, data: Option<ControlValue> },
    Media(MediaRef),
    MediaList(Vec<MediaRef>),
    Query { constraint: Constraint, limit: usize },
    QueryResult(Vec<MediaRef>),
    StreamProgress { value: u64, max: u64 },
    Notify(Notification),
}

impl PacketKind {
    /// The runtime tag of this payload.
    pub fn tag(&self) -> PacketTag {
        match self {
            PacketKind::Kickstart => PacketTag::Kickstart,
            PacketKind::Kill => PacketTag::Kill,
            PacketKind::KillAll => PacketTag::KillAll,
            PacketKind::Timeout => PacketTag::Timeout,
            PacketKind::Exception { .. } => PacketTag::Exception,
            PacketKind::Control { kind, .. } => kind.tag(),
            PacketKind::Media(_) => PacketTag::Media,
            PacketKind::MediaList(_) => PacketTag::MediaList,
            PacketKind::Query { .. } => PacketTag::Query,
            PacketKind::QueryResult(_) => PacketTag::QueryResult,
            PacketKind::StreamProgress { .. } => PacketTag::StreamProgress,
            PacketKind::Notify(n) => n.tag(),
        }
    }

    /// Shorthand for a payload-less control packet.
    pub fn control(kind: ControlKind) -> PacketKind {
        PacketKind::Control { kind, data: None }
    }
}

impl std::fmt::Debug for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketKind::Exception { message } => write!(f, "Exception({message:?})"),
            PacketKind::Control { kind, data } => write!(f, "Control({kind:?}, {data:?})"),
            PacketKind::Media(m) => write!(f, "Media({})", m.describe()),
            PacketKind::MediaList(l) => write!(f, "MediaList(len={})", l.len()),
            PacketKind::Query { constraint, limit } => {
                write!(f, "Query({constraint:?}, limit={limit})")
            }
            PacketKind::QueryResult(l) => write!(f, "QueryResult(len={})", l.len()),
            PacketKind::StreamProgress { value, max } => {
                write!(f, "StreamProgress({value}/{max})")
            }
            other => write!(f, "{:?}", other.tag()),
        }
    }
}

/// An immutable typed message exchanged between nodes.
///
/// In debug builds a packet captures a backtrace at creation, so a fault
/// in a downstream handler can be traced back to the send site.
#[derive(Clone)]
pub struct Packet {
    kind: PacketKind,
    origin: Option<NodeId>,
    trace: Option<Arc<Backtrace>>,
}

impl Packet {
    /// A packet created outside the graph, with no origin node.
    pub fn new(kind: PacketKind) -> Self {
        Self {
            kind,
            origin: None,
            trace: capture_trace(),
        }
    }

    /// A packet originating from a node.
    pub(crate) fn from_node(origin: NodeId, kind: PacketKind) -> Self {
        Self {
            kind,
            origin: Some(origin),
            trace: capture_trace(),
        }
    }

    /// The synthetic packet guaranteed to arrive first.
    pub fn kickstart() -> Self {
        Self::new(PacketKind::Kickstart)
    }

    pub fn kind(&self) -> &PacketKind {
        &self.kind
    }

    /// The runtime tag of this packet.
    pub fn tag(&self) -> PacketTag {
        self.kind.tag()
    }

    /// True if this packet's tag is `tag` or a subtype of it.
    pub fn is(&self, tag: PacketTag) -> bool {
        self.tag().is_a(tag)
    }

    /// The node that created the packet, if it came from inside the graph.
    pub fn origin(&self) -> Option<NodeId> {
        self.origin
    }

    /// The creation backtrace, when one was captured.
    pub fn trace(&self) -> Option<&Backtrace> {
        self.trace.as_deref()
    }
}

fn capture_trace() -> Option<Arc<Backtrace>> {
    if cfg!(debug_assertions) {
        Some(Arc::new(Backtrace::capture()))
    } else {
        None
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.origin {
            Some(id) => write!(f, "<{:?} from node {}>", self.kind, id.0),
            None => write!(f, "<{:?}>", self.kind),
        }
    }
}
