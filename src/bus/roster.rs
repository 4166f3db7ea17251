//! Process-wide roster of live nodes.
//!
//! Nodes register when their thread starts and deregister when it exits;
//! the table is guarded by a single mutex. This replaces any notion of
//! enumerating threads: the roster is the only authority on which nodes
//! are live.

use crate::bus::node::NodeHandle;
use crate::bus::packet::{NodeId, Packet};
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

static ROSTER: OnceLock<Mutex<HashMap<u64, NodeHandle>>> = OnceLock::new();

fn roster() -> &'static Mutex<HashMap<u64, NodeHandle>> {
    ROSTER.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register(handle: NodeHandle) {
    lock(roster()).insert(handle.id().0, handle);
}

pub(crate) fn deregister(id: NodeId) {
    lock(roster()).remove(&id.0);
}

/// All nodes whose threads are currently running.
pub fn all_nodes() -> Vec<NodeHandle> {
    lock(roster()).values().cloned().collect()
}

/// Sends a plain kill to every live node.
pub fn kill_all() {
    for node in all_nodes() {
        tracing::debug!(node = %node.name(), "killing");
        node.kill();
    }
}

/// Sends a cascading kill to every live node, so each also tears down
/// its reachable subgraph.
pub fn kill_all_cascade() {
    for node in all_nodes() {
        tracing::debug!(node = %node.name(), "cascade-killing");
        node.kill_cascade();
    }
}

/// Starts up a set of nodes by injecting a Kickstart packet into each.
pub fn kickstart(nodes: &[&NodeHandle]) {
    for node in nodes {
        tracing::debug!(node = %node.name(), "kickstarting");
        node.accept(Packet::kickstart());
    }
}
