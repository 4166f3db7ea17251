//! The node runtime.
//!
//! A node is the atomic element of a pipeline graph: it owns a mailbox
//! and a dispatch registry, and runs on its own dedicated thread. The
//! thread starts lazily when the first packet is accepted, with a
//! synthetic Kickstart packet enqueued ahead of anything else. Handlers
//! run synchronously on the node's thread, one packet at a time.
//!
//! Errors escaping a handler follow a single recovery path: the node
//! kills itself, broadcasts an Exception packet downstream, and the
//! thread terminates abnormally. Nothing restarts automatically —
//! supervision is the job of a node listening for Exception packets.

use crate::bus::graph::OutputTable;
use crate::bus::mailbox::{Mailbox, Received};
use crate::bus::packet::{NodeId, Packet, PacketKind, PacketTag};
use crate::bus::registry::Registry;
use crate::bus::roster;
use crate::sync::lock;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a node.
///
/// Created → Running (lazily, on first accepted packet) → Stopping (kill
/// dispatched) → Dead (thread exited).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub enum Lifecycle {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Dead = 3,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Lifecycle {
        match v {
            0 => Lifecycle::Created,
            1 => Lifecycle::Running,
            2 => Lifecycle::Stopping,
            _ => Lifecycle::Dead,
        }
    }
}

/// The behavior a node runs: a name, a dispatch registry built once at
/// construction, and an optional cleanup hook.
pub trait NodeBehavior: Send + Sized + 'static {
    /// Human-readable name, used for the thread name and logging.
    fn name(&self) -> &str;

    /// Declares the node's operations and the packet tags each accepts.
    fn registry() -> Registry<Self>;

    /// Called once when the node is asked to clean up and exit.
    fn on_kill(&mut self, _ctx: &NodeCtx) {}
}

type Starter = Box<dyn FnOnce() + Send>;

pub(crate) struct NodeShared {
    id: NodeId,
    name: String,
    mailbox: Mailbox,
    timeout: Option<Duration>,
    state: AtomicU8,
    outputs: Mutex<OutputTable>,
    starter: Mutex<Option<Starter>>,
}

impl NodeShared {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_lifecycle(&self, state: Lifecycle) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Copies the packet to every downstream edge matching its exact tag,
    /// then to every wildcard edge. Dead listeners are pruned during the
    /// walk. Targets are collected under the edge lock but delivered
    /// outside it, so cascades through the graph cannot deadlock.
    fn broadcast(&self, pkt: &Packet) {
        let targets = lock(&self.outputs).collect(pkt.tag());
        for target in targets {
            tracing::debug!(
                node = %self.name,
                to = %target.name(),
                packet = ?pkt,
                "sending packet"
            );
            target.accept(pkt.clone());
        }
    }

    /// Starts the node thread if it has not started yet, enqueueing a
    /// synthetic Kickstart ahead of the first packet unless that packet
    /// already is one.
    fn start_if_needed(&self, first: &Packet) {
        let mut starter = lock(&self.starter);
        if let Some(start) = starter.take() {
            tracing::debug!(node = %self.name, "autostarting");
            if first.tag() != PacketTag::Kickstart {
                self.mailbox.push(Packet::kickstart());
            }
            self.set_lifecycle(Lifecycle::Running);
            start();
        }
    }
}

/// Shared handle to a node. Edges and external callers hold these; the
/// node's state is destroyed when every handle has been dropped and the
/// thread has exited.
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<NodeShared>,
}

impl NodeHandle {
    /// Creates a node running `behavior`, with no mailbox timeout.
    pub fn new<B: NodeBehavior>(behavior: B) -> NodeHandle {
        Self::with_timeout(behavior, None)
    }

    /// Creates a node whose mailbox receive times out after `timeout`,
    /// synthesizing a Timeout packet per idle interval.
    pub fn with_timeout<B: NodeBehavior>(behavior: B, timeout: Option<Duration>) -> NodeHandle {
        let id = NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(NodeShared {
            id,
            name: behavior.name().to_string(),
            mailbox: Mailbox::new(),
            timeout,
            state: AtomicU8::new(Lifecycle::Created as u8),
            outputs: Mutex::new(OutputTable::default()),
            starter: Mutex::new(None),
        });

        let registry = B::registry();
        let thread_shared = Arc::clone(&shared);
        let starter: Starter = Box::new(move || {
            let run_shared = Arc::clone(&thread_shared);
            let spawned = std::thread::Builder::new()
                .name(format!("node-{}", thread_shared.name))
                .spawn(move || run_loop(run_shared, behavior, registry));
            if let Err(e) = spawned {
                tracing::error!(
                    node = %thread_shared.name,
                    error = %e,
                    "failed to start node thread"
                );
                thread_shared.set_lifecycle(Lifecycle::Dead);
            }
        });
        *lock(&shared.starter) = Some(starter);

        NodeHandle { shared }
    }

    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    /// True until a kill has been dispatched; dead nodes drop packets.
    pub fn accepts_packets(&self) -> bool {
        self.lifecycle() < Lifecycle::Stopping
    }

    pub fn is_dead(&self) -> bool {
        self.lifecycle() == Lifecycle::Dead
    }

    pub(crate) fn is_same(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Connects this node's output to `downstream` for packets of `tag`
    /// (`None` = wildcard, every packet).
    pub fn connect(&self, downstream: &NodeHandle, tag: Option<PacketTag>) {
        lock(&self.shared.outputs).connect(tag, downstream.clone());
    }

    /// Removes `downstream` from the edge for `tag`.
    pub fn disconnect(&self, downstream: &NodeHandle, tag: Option<PacketTag>) {
        lock(&self.shared.outputs).disconnect(tag, downstream);
    }

    /// Connects the outputs of `upstream` to this node, wildcard.
    pub fn listen_to(&self, upstream: &NodeHandle) {
        upstream.connect(self, None);
    }

    /// Total listeners currently wired to this node's outputs.
    pub fn listener_count(&self) -> usize {
        lock(&self.shared.outputs).listener_count()
    }

    /// Places a packet into the node's mailbox, starting the node thread
    /// first if needed. A cascade-flagged kill is forwarded downstream
    /// before it is enqueued here. Packets to a dead node are dropped
    /// with a warning.
    pub fn accept(&self, pkt: Packet) {
        if !self.accepts_packets() {
            tracing::warn!(node = %self.name(), packet = ?pkt, "packet received while dead");
            return;
        }
        if pkt.is(PacketTag::KillAll) {
            tracing::debug!(node = %self.name(), "cascading kill, forwarding downstream");
            self.shared.broadcast(&pkt);
        }
        self.shared.start_if_needed(&pkt);
        self.shared.mailbox.push(pkt);
    }

    /// Asks this node to terminate after its current mailbox item.
    pub fn kill(&self) {
        self.accept(Packet::from_node(self.id(), PacketKind::Kill));
    }

    /// Asks this node and everything reachable downstream to terminate.
    pub fn kill_cascade(&self) {
        self.accept(Packet::from_node(self.id(), PacketKind::KillAll));
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NodeHandle({} #{}, {:?})",
            self.shared.name,
            self.shared.id.0,
            self.lifecycle()
        )
    }
}

/// Capabilities handed to handlers while they run on the node's thread.
#[derive(Clone)]
pub struct NodeCtx {
    shared: Arc<NodeShared>,
}

impl NodeCtx {
    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// A handle to this node, e.g. for wiring or worker threads.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Broadcasts a new packet originating from this node.
    pub fn send(&self, kind: PacketKind) {
        self.shared
            .broadcast(&Packet::from_node(self.shared.id, kind));
    }

    /// Re-broadcasts an existing packet, preserving its origin.
    pub fn forward(&self, pkt: &Packet) {
        self.shared.broadcast(pkt);
    }

    /// Asks this node to terminate.
    pub fn kill(&self) {
        self.handle().kill();
    }
}

/// Marks the node dead and deregisters it when the thread exits, whether
/// the exit is orderly or a propagating fault.
struct ExitGuard {
    shared: Arc<NodeShared>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.shared.set_lifecycle(Lifecycle::Dead);
        roster::deregister(self.shared.id);
        tracing::debug!(node = %self.shared.name, "node thread exited");
    }
}

fn run_loop<B: NodeBehavior>(shared: Arc<NodeShared>, mut behavior: B, registry: Registry<B>) {
    roster::register(NodeHandle {
        shared: Arc::clone(&shared),
    });
    let _guard = ExitGuard {
        shared: Arc::clone(&shared),
    };
    let ctx = NodeCtx {
        shared: Arc::clone(&shared),
    };
    tracing::debug!(node = %shared.name, "node thread started");

    loop {
        let pkt = match shared.mailbox.recv(shared.timeout) {
            Received::Packet(p) => p,
            Received::TimedOut => Packet::from_node(shared.id, PacketKind::Timeout),
        };
        tracing::debug!(node = %shared.name, packet = ?pkt, "handling packet");

        for entry in registry.matching(pkt.tag()) {
            let handler = entry.handler();
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&mut behavior, &ctx, &pkt)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let message = e.to_string();
                    fault(&shared, &pkt, &message);
                    panic!(
                        "node '{}' handler '{}' failed: {message}",
                        shared.name,
                        entry.name()
                    );
                }
                Err(payload) => {
                    fault(&shared, &pkt, &panic_message(&payload));
                    resume_unwind(payload);
                }
            }
        }

        if pkt.is(PacketTag::Kill) {
            tracing::debug!(node = %shared.name, "caught kill packet, stopping");
            behavior.on_kill(&ctx);
            shared.set_lifecycle(Lifecycle::Stopping);
            break;
        }
    }
}

/// The single fault path: self-kill plus an Exception broadcast. The
/// caller re-raises afterwards so the thread terminates abnormally.
fn fault(shared: &NodeShared, pkt: &Packet, message: &str) {
    match pkt.trace() {
        Some(trace) => tracing::error!(
            node = %shared.name,
            error = %message,
            "handler fault; packet created at:\n{trace}"
        ),
        None => tracing::error!(node = %shared.name, error = %message, "handler fault"),
    }
    shared.set_lifecycle(Lifecycle::Stopping);
    shared.broadcast(&Packet::from_node(
        shared.id,
        PacketKind::Exception {
            message: message.to_string(),
        },
    ));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::packet::PacketKind;
    use crate::error::Result;
    use std::time::Instant;

    struct Probe {
        first_tag: Arc<Mutex<Option<PacketTag>>>,
    }

    impl Probe {
        fn on_packet(&mut self, _ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
            let mut first = lock(&self.first_tag);
            if first.is_none() {
                *first = Some(pkt.tag());
            }
            Ok(())
        }
    }

    impl NodeBehavior for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn registry() -> Registry<Self> {
            Registry::builder().on_any("probe", Self::on_packet).build()
        }
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_kickstart_is_injected_first() {
        let first = Arc::new(Mutex::new(None));
        let node = NodeHandle::new(Probe {
            first_tag: Arc::clone(&first),
        });

        node.accept(Packet::new(PacketKind::Kill));
        assert!(wait_until(2000, || node.is_dead()));
        assert_eq!(*lock(&first), Some(PacketTag::Kickstart));
    }

    #[test]
    fn test_kill_stops_node() {
        let node = NodeHandle::new(Probe {
            first_tag: Arc::new(Mutex::new(None)),
        });
        assert_eq!(node.lifecycle(), Lifecycle::Created);

        node.kill();
        assert!(wait_until(2000, || node.is_dead()));
        assert!(!node.accepts_packets());
    }

    #[test]
    fn test_dead_node_drops_packets() {
        let node = NodeHandle::new(Probe {
            first_tag: Arc::new(Mutex::new(None)),
        });
        node.kill();
        assert!(wait_until(2000, || node.is_dead()));
        // Must not panic or revive the node.
        node.accept(Packet::kickstart());
        assert!(node.is_dead());
    }
}
