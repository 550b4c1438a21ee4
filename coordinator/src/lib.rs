//! Process-wide registry of live nodes (§2 item 6, §9 "Process-wide
//! coordinator"): port allocation, 1-D topology positions, bootstrap of an
//! empty network, and the `{register, unregister, lookup_port,
//! iterate_live}` interface nodes are handed at construction instead of
//! reaching into peers' fields directly.

use std::collections::HashSet;
use std::sync::Mutex;

use identifier::Identifier;
use thiserror::Error;

const FIRST_EPHEMERAL_PORT: u16 = 30_000;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CoordinatorError {
    #[error("identifier `{0}` is already registered")]
    DuplicateIdentifier(String),
    #[error("no live node is currently registered")]
    NoLiveNodes,
    #[error("no free port available")]
    PortsExhausted,
}

/// Everything the coordinator knows about one node, independent of that
/// node's own in-process state.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub id: Identifier,
    pub port: u16,
    pub position: f64,
    pub running: bool,
}

struct Registry {
    peers: Vec<PeerInfo>,
    used_ports: HashSet<u16>,
    next_port: u16,
}

impl Registry {
    fn find(&self, id: &Identifier) -> Option<usize> {
        self.peers.iter().position(|p| &p.id == id)
    }
}

pub struct Coordinator {
    inner: Mutex<Registry>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry {
                peers: Vec::new(),
                used_ports: HashSet::new(),
                next_port: FIRST_EPHEMERAL_PORT,
            }),
        }
    }

    /// A position on the `[0,1)` locality line, deterministic given the
    /// identifier so that repeated runs with the same node IDs converge to
    /// the same topology (§5 "Determinism for tests").
    pub fn position_for(&self, id: &Identifier) -> f64 {
        let max = 16f64.powi(id.width() as i32);
        id.numeric() as f64 / max
    }

    /// Reserves the next unused loopback port.
    #[tracing::instrument(skip(self))]
    pub fn allocate_port(&self) -> Result<u16, CoordinatorError> {
        let mut registry = self.inner.lock().expect("coordinator mutex poisoned");
        for _ in 0..u16::MAX {
            let candidate = registry.next_port;
            registry.next_port = registry.next_port.wrapping_add(1).max(FIRST_EPHEMERAL_PORT);
            if !registry.used_ports.contains(&candidate) {
                registry.used_ports.insert(candidate);
                return Ok(candidate);
            }
        }
        Err(CoordinatorError::PortsExhausted)
    }

    /// Registers a newly running node. Fails if the identifier is already
    /// known (§8 "Identifier collision on pre-assignment: rejected before
    /// start_server").
    #[tracing::instrument(skip(self))]
    pub fn register(&self, id: Identifier, port: u16, position: f64) -> Result<(), CoordinatorError> {
        let mut registry = self.inner.lock().expect("coordinator mutex poisoned");
        if registry.find(&id).is_some() {
            return Err(CoordinatorError::DuplicateIdentifier(id.to_string()));
        }
        registry.peers.push(PeerInfo {
            id,
            port,
            position,
            running: true,
        });
        Ok(())
    }

    /// Removes a node entirely, e.g. after a graceful leave.
    #[tracing::instrument(skip(self))]
    pub fn unregister(&self, id: &Identifier) {
        let mut registry = self.inner.lock().expect("coordinator mutex poisoned");
        if let Some(idx) = registry.find(id) {
            let peer = registry.peers.remove(idx);
            registry.used_ports.remove(&peer.port);
        }
    }

    /// Marks a node as not running without forgetting it, for the
    /// unexpected-leave path where peers discover the failure lazily.
    #[tracing::instrument(skip(self))]
    pub fn mark_not_running(&self, id: &Identifier) {
        let mut registry = self.inner.lock().expect("coordinator mutex poisoned");
        if let Some(idx) = registry.find(id) {
            registry.peers[idx].running = false;
        }
    }

    pub fn lookup_port(&self, id: &Identifier) -> Option<u16> {
        let registry = self.inner.lock().expect("coordinator mutex poisoned");
        registry.find(id).map(|idx| registry.peers[idx].port)
    }

    pub fn lookup(&self, id: &Identifier) -> Option<PeerInfo> {
        let registry = self.inner.lock().expect("coordinator mutex poisoned");
        registry.find(id).map(|idx| registry.peers[idx].clone())
    }

    /// Every node currently marked running, in registration order.
    pub fn iterate_live(&self) -> Vec<PeerInfo> {
        let registry = self.inner.lock().expect("coordinator mutex poisoned");
        registry.peers.iter().filter(|p| p.running).cloned().collect()
    }

    /// All known nodes regardless of liveness, for inspection surfaces.
    pub fn nodes(&self) -> Vec<PeerInfo> {
        let registry = self.inner.lock().expect("coordinator mutex poisoned");
        registry.peers.clone()
    }

    pub fn add(&self, peer: PeerInfo) -> Result<(), CoordinatorError> {
        self.register(peer.id, peer.port, peer.position)
    }

    pub fn remove(&self, id: &Identifier) {
        self.unregister(id);
    }

    /// Any running node, used as the join target for a freshly constructed
    /// node (the coordinator itself does not pick the topologically
    /// closest one — that refinement is left to the caller).
    pub fn bootstrap_candidate(&self) -> Option<PeerInfo> {
        self.iterate_live().into_iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.iterate_live().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> Identifier {
        Identifier::new(s, 4).unwrap()
    }

    #[test]
    fn register_rejects_duplicate_identifiers() {
        let coordinator = Coordinator::new();
        coordinator.register(id("4b19"), 30000, 0.1).unwrap();
        let err = coordinator.register(id("4b19"), 30001, 0.2).unwrap_err();
        assert_eq!(err, CoordinatorError::DuplicateIdentifier("4b19".to_string()));
    }

    #[test]
    fn allocate_port_never_repeats_a_live_port() {
        let coordinator = Coordinator::new();
        let a = coordinator.allocate_port().unwrap();
        let b = coordinator.allocate_port().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unregister_frees_the_port_for_reuse() {
        let coordinator = Coordinator::new();
        let port = coordinator.allocate_port().unwrap();
        coordinator.register(id("4b19"), port, 0.1).unwrap();
        coordinator.unregister(&id("4b19"));
        assert!(coordinator.lookup_port(&id("4b19")).is_none());
        assert!(coordinator.iterate_live().is_empty());
    }

    #[test]
    fn mark_not_running_excludes_from_iterate_live_but_not_nodes() {
        let coordinator = Coordinator::new();
        coordinator.register(id("4b19"), 30000, 0.1).unwrap();
        coordinator.mark_not_running(&id("4b19"));
        assert!(coordinator.iterate_live().is_empty());
        assert_eq!(coordinator.nodes().len(), 1);
    }

    #[test]
    fn position_for_is_deterministic() {
        let coordinator = Coordinator::new();
        assert_eq!(coordinator.position_for(&id("4b19")), coordinator.position_for(&id("4b19")));
        assert_ne!(coordinator.position_for(&id("4b19")), coordinator.position_for(&id("a3f1")));
    }

    #[test]
    fn empty_network_has_no_bootstrap_candidate() {
        let coordinator = Coordinator::new();
        assert!(coordinator.bootstrap_candidate().is_none());
        assert!(coordinator.is_empty());
    }
}
