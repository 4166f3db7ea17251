//! Shared test support: a packet-recording node and wait helpers.
#![allow(dead_code)]

use mediabus::bus::{NodeBehavior, NodeCtx, NodeHandle, Packet, PacketTag, Registry};
use mediabus::error::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Records every packet it receives.
pub struct Collector {
    seen: Arc<Mutex<Vec<Packet>>>,
}

impl Collector {
    fn on_packet(&mut self, _ctx: &NodeCtx, pkt: &Packet) -> Result<()> {
        self.seen.lock().unwrap().push(pkt.clone());
        Ok(())
    }
}

impl NodeBehavior for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    fn registry() -> Registry<Self> {
        Registry::builder().on_any("collect", Self::on_packet).build()
    }
}

static INIT_LOGGING: std::sync::Once = std::sync::Once::new();

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Spawns a collector node, returning its handle and the packet log.
pub fn collector() -> (NodeHandle, Arc<Mutex<Vec<Packet>>>) {
    init_logging();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let node = NodeHandle::new(Collector {
        seen: Arc::clone(&seen),
    });
    (node, seen)
}

/// Number of recorded packets with the given exact tag.
pub fn count_tag(seen: &Arc<Mutex<Vec<Packet>>>, tag: PacketTag) -> usize {
    seen.lock().unwrap().iter().filter(|p| p.tag() == tag).count()
}

/// Polls `cond` until it holds or `deadline_ms` elapses.
pub fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Waits until `seen` holds at least `n` packets of `tag`.
pub fn wait_for_tag(seen: &Arc<Mutex<Vec<Packet>>>, tag: PacketTag, n: usize) -> bool {
    wait_until(2000, || count_tag(seen, tag) >= n)
}
