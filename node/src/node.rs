//! The Pastry node: routing core, join/leave protocols, state rebuild, and
//! the insert/update/delete/lookup handlers (§4.4-§4.8).

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use identifier::{common_prefix_length, Identifier};
use itertools::Itertools;
use similarity::KdTree;
use types::{DhtError, Operation, Point, Request, Response, ResponsePayload};
use utils::NetworkConfig;

use crate::leaf_set::LeafSet;
use crate::neighborhood_set::NeighborhoodSet;
use crate::routing_table::RoutingTable;

/// Fixed per §4.3a: the original lookup handler bands reviews with these
/// parameters for every call.
const LSH_NUM_BANDS: usize = 4;
const LSH_NUM_ROWS: usize = 5;

struct NodeState {
    routing_table: RoutingTable,
    leaf_set: LeafSet,
    neighborhood_set: NeighborhoodSet,
    store: KdTree,
}

/// A snapshot of a node's structures, used by external collaborators
/// (§6 "Inspection surface").
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub id: Identifier,
    pub port: u16,
    pub position: f64,
    pub routing_table_known_ids: Vec<Identifier>,
    pub lmin: Vec<Identifier>,
    pub lmax: Vec<Identifier>,
    pub neighborhood_set: Vec<Identifier>,
    pub country_keys: Vec<(Identifier, String)>,
}

pub struct PastryNode {
    pub id: Identifier,
    pub position: f64,
    pub port: u16,
    config: NetworkConfig,
    coordinator: Arc<coordinator::Coordinator>,
    state: Mutex<NodeState>,
    running: AtomicBool,
}

impl PastryNode {
    /// Constructs a node outside the network; its tables stay empty until
    /// [`PastryNode::join`] completes (§3 "Lifecycle").
    pub fn new(
        id: Identifier,
        config: NetworkConfig,
        coordinator: Arc<coordinator::Coordinator>,
    ) -> Result<Arc<Self>, DhtError> {
        if coordinator.lookup(&id).is_some() {
            return Err(DhtError::DuplicateIdentifier(id.to_string()));
        }
        let position = coordinator.position_for(&id);
        let port = coordinator
            .allocate_port()
            .map_err(|e| DhtError::MalformedRequest(e.to_string()))?;
        let columns = config.routing_table_columns();
        let digits = config.hash_hex_digits;
        let leaf_capacity = config.leaf_set_size / 2;
        let neighborhood_capacity = config.neighborhood_set_capacity();

        Ok(Arc::new(Self {
            id: id.clone(),
            position,
            port,
            config,
            coordinator,
            state: Mutex::new(NodeState {
                routing_table: RoutingTable::new(digits, columns),
                leaf_set: LeafSet::new(id.clone(), leaf_capacity),
                neighborhood_set: NeighborhoodSet::new(position, neighborhood_capacity),
                store: KdTree::new(),
            }),
            running: AtomicBool::new(false),
        }))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the loopback listener and serves requests on a bounded
    /// worker pool, in its own thread (§5).
    pub fn start_server(self: &Arc<Self>) -> Result<(), DhtError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port);
        let listener = TcpListener::bind(addr)?;
        let pool_size = self.config.worker_pool_size;
        let max_message_size = self.config.max_message_size;
        let node = Arc::clone(self);
        thread::Builder::new()
            .name(format!("node-{}", self.id))
            .spawn(move || {
                let pool = utils::WorkerPool::new(pool_size);
                let handler: transport::Handler = {
                    let node = Arc::clone(&node);
                    Arc::new(move |request: Request| node.handle_request(request))
                };
                transport::serve_forever(listener, &pool, max_message_size, handler);
            })
            .map_err(DhtError::Transport)?;
        Ok(())
    }

    fn diagonal_digit(&self, row: usize) -> u8 {
        self.id.digit_value(row)
    }

    fn peer_addr(&self, id: &Identifier) -> Option<SocketAddr> {
        self.coordinator
            .lookup_port(id)
            .map(|port| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    /// Sends `request` to `target`; on transport failure, evicts `target`
    /// from local state and the coordinator before propagating the error
    /// (§5 "the caller treats the peer as dead").
    fn send(&self, target: &Identifier, request: Request) -> Result<Response, DhtError> {
        let Some(addr) = self.peer_addr(target) else {
            tracing::warn!(peer = %target, "peer no longer known to the coordinator, evicting");
            self.evict_peer(target);
            return Err(DhtError::NodeNotFound(target.to_string()));
        };
        match transport::send_request(addr, &request, self.config.max_message_size, None) {
            Ok(response) => Ok(response),
            Err(error) => {
                tracing::warn!(peer = %target, %error, "transport failure, evicting peer");
                self.evict_peer(target);
                Err(DhtError::MalformedRequest(format!("peer {target} unreachable: {error}")))
            }
        }
    }

    fn evict_peer(&self, id: &Identifier) {
        {
            let mut state = self.state.lock().expect("node mutex poisoned");
            state.routing_table.remove(id);
            state.leaf_set.remove(id);
            state.neighborhood_set.remove(id);
        }
        self.coordinator.mark_not_running(id);
        self.rebuild_state();
    }

    /// Full reconstruction of Lmin/Lmax, the neighborhood set, and the
    /// routing table from the coordinator's live set (§4.7).
    #[tracing::instrument(skip(self))]
    pub fn rebuild_state(&self) {
        let live = self.coordinator.iterate_live();
        let ids: Vec<Identifier> = live.iter().filter(|p| p.id != self.id).map(|p| p.id.clone()).collect();
        let positions: Vec<(Identifier, f64)> = live
            .iter()
            .filter(|p| p.id != self.id)
            .map(|p| (p.id.clone(), p.position))
            .collect();

        let mut state = self.state.lock().expect("node mutex poisoned");
        state.leaf_set.rebuild(&ids);
        state.neighborhood_set.rebuild(&positions);

        let digits = state.routing_table.digits();
        let columns = state.routing_table.columns();
        let mut fresh = RoutingTable::new(digits, columns);
        for id in &ids {
            let r = common_prefix_length(&self.id, id);
            if r >= digits {
                continue;
            }
            let col = id.digit_value(r);
            if col == self.diagonal_digit(r) {
                continue;
            }
            fresh.insert_if_empty(r, col as usize, id.clone());
        }
        state.routing_table = fresh;
    }

    /// §4.4 "next_hop(key)".
    pub fn next_hop(&self, key: &Identifier) -> Identifier {
        let state = self.state.lock().expect("node mutex poisoned");
        if state.leaf_set.span_contains(key) {
            return state.leaf_set.closest_to(key);
        }

        let i = common_prefix_length(&self.id, key);
        if i < state.routing_table.digits() {
            let c = key.digit_value(i) as usize;
            if let Some(t) = state.routing_table.entry(i, c) {
                return t.clone();
            }
        }

        let candidates: Vec<Identifier> = state
            .leaf_set
            .known_ids()
            .into_iter()
            .chain(state.neighborhood_set.known_ids())
            .chain(state.routing_table.known_ids())
            .sorted_by(|a, b| a.as_str().cmp(b.as_str()))
            .dedup()
            .collect();

        let owner_distance = self.id.numeric().abs_diff(key.numeric());
        for candidate in candidates {
            let cpl = common_prefix_length(&candidate, key);
            if cpl < i {
                continue;
            }
            let better = cpl > i || (cpl == i && candidate.numeric().abs_diff(key.numeric()) < owner_distance);
            if better {
                return candidate;
            }
        }
        self.id.clone()
    }

    fn is_responsible(&self, key: &Identifier) -> bool {
        let next = self.next_hop(key);
        if next == self.id {
            return true;
        }
        self.state.lock().expect("node mutex poisoned").leaf_set.contains(key)
    }

    // ---- request dispatch -------------------------------------------------

    #[tracing::instrument(skip(self, request))]
    pub fn handle_request(&self, mut request: Request) -> Response {
        request.hops.push(self.id.clone());
        match request.operation.clone() {
            Operation::Join { joining_node_id } => self.handle_join(&joining_node_id, request.hops),
            Operation::Presence { joining_node_id } => self.handle_presence(&joining_node_id, request.hops),
            Operation::UpdateRoutingRow { row_idx, row } => {
                self.handle_update_routing_row(row_idx, &row, request.hops)
            }
            Operation::UpdateRoutingEntry { row_idx, node_id } => {
                self.handle_update_routing_entry(row_idx, &node_id, request.hops)
            }
            Operation::UpdateLeafSet { lmin, lmax, key: _ } => self.handle_update_leaf_set(lmin, lmax, request.hops),
            Operation::GetLeafSet => self.handle_get_leaf_set(request.hops),
            Operation::Distance { node_position } => self.handle_distance(node_position, request.hops),
            Operation::Leave { leaving_node_id } => self.handle_leave(&leaving_node_id, request.hops),
            Operation::InsertKey {
                key,
                point,
                review,
                country,
            } => self.route_insert(key, point, review, country, request.hops),
            Operation::UpdateKey { key, criteria, data } => self.route_update(key, criteria, data, request.hops),
            Operation::DeleteKey { key } => self.route_delete(key, request.hops),
            Operation::Lookup {
                key,
                lower_bounds,
                upper_bounds,
                n,
            } => self.route_lookup(key, lower_bounds, upper_bounds, n, request.hops),
        }
    }

    // ---- join/presence/leave -----------------------------------------------

    fn handle_join(&self, joining: &Identifier, hops: Vec<Identifier>) -> Response {
        let digits = self.state.lock().expect("node mutex poisoned").routing_table.digits();
        let row_idx = common_prefix_length(&self.id, joining).min(digits.saturating_sub(1));
        let row = self.state.lock().expect("node mutex poisoned").routing_table.row(row_idx).to_vec();

        let next = self.next_hop(joining);
        if next == self.id {
            let state = self.state.lock().expect("node mutex poisoned");
            let leaf_set = Some((state.leaf_set.lmin().to_vec(), state.leaf_set.lmax().to_vec()));
            drop(state);
            return Response::success(
                "join traversal terminated",
                hops,
                ResponsePayload::Join {
                    rows: vec![(row_idx, row)],
                    leaf_set,
                },
            );
        }

        match self.send(&next, Request { operation: Operation::Join { joining_node_id: joining.clone() }, hops: hops.clone() }) {
            Ok(mut downstream) => {
                if let ResponsePayload::Join { rows: mut down_rows, leaf_set } = downstream.payload {
                    let mut rows = vec![(row_idx, row)];
                    rows.append(&mut down_rows);
                    downstream.payload = ResponsePayload::Join { rows, leaf_set };
                }
                downstream
            }
            Err(_) => Response::failure("next hop unreachable during join", hops),
        }
    }

    /// Drives the joining node's side of §4.5: contacts the bootstrap
    /// node, merges routing rows and the terminal leaf set, seeds the
    /// neighborhood set, registers with the coordinator, then broadcasts
    /// presence.
    #[tracing::instrument(skip(self))]
    pub fn join(self: &Arc<Self>) -> Result<(), DhtError> {
        if self.coordinator.is_empty() {
            self.coordinator
                .register(self.id.clone(), self.port, self.position)
                .map_err(|e| DhtError::DuplicateIdentifier(e.to_string()))?;
            self.running.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let bootstrap = self
            .coordinator
            .bootstrap_candidate()
            .ok_or_else(|| DhtError::NodeNotFound("no bootstrap node available".to_string()))?;

        let join_response = self.send(
            &bootstrap.id,
            Request::new(Operation::Join {
                joining_node_id: self.id.clone(),
            }),
        )?;
        if let ResponsePayload::Join { rows, leaf_set } = join_response.payload {
            let mut state = self.state.lock().expect("node mutex poisoned");
            for (row_idx, row) in rows {
                if row_idx < state.routing_table.digits() {
                    state.routing_table.merge_row(row_idx, &row, self.diagonal_digit(row_idx) as usize);
                }
            }
            if let Some((lmin, lmax)) = leaf_set {
                for id in lmin.into_iter().chain(lmax) {
                    state.leaf_set.try_admit(id);
                }
            }
        }

        let distance_response = self.send(
            &bootstrap.id,
            Request::new(Operation::Distance {
                node_position: self.position,
            }),
        )?;
        if let ResponsePayload::Distance { neighborhood_set, .. } = distance_response.payload {
            let mut state = self.state.lock().expect("node mutex poisoned");
            state.neighborhood_set.try_admit(bootstrap.id.clone(), bootstrap.position);
            for id in neighborhood_set {
                if let Some(peer) = self.coordinator.lookup(&id) {
                    state.neighborhood_set.try_admit(id, peer.position);
                }
            }
        }

        self.coordinator
            .register(self.id.clone(), self.port, self.position)
            .map_err(|e| DhtError::DuplicateIdentifier(e.to_string()))?;
        self.running.store(true, Ordering::SeqCst);
        self.broadcast_presence();
        Ok(())
    }

    fn broadcast_presence(&self) {
        let targets: Vec<Identifier> = {
            let state = self.state.lock().expect("node mutex poisoned");
            state
                .routing_table
                .known_ids()
                .into_iter()
                .chain(state.leaf_set.known_ids())
                .chain(state.neighborhood_set.known_ids())
                .sorted_by(|a, b| a.as_str().cmp(b.as_str()))
                .dedup()
                .collect()
        };
        for target in targets {
            let _ = self.send(
                &target,
                Request::new(Operation::Presence {
                    joining_node_id: self.id.clone(),
                }),
            );
        }
    }

    fn handle_presence(&self, joining: &Identifier, hops: Vec<Identifier>) -> Response {
        {
            let mut state = self.state.lock().expect("node mutex poisoned");
            let r = common_prefix_length(&self.id, joining);
            if r < state.routing_table.digits() {
                let col = joining.digit_value(r);
                if col != self.diagonal_digit(r) {
                    state.routing_table.insert_if_empty(r, col as usize, joining.clone());
                }
            }
            state.leaf_set.try_admit(joining.clone());
        }
        if let Some(peer) = self.coordinator.lookup(joining) {
            self.state
                .lock()
                .expect("node mutex poisoned")
                .neighborhood_set
                .try_admit(joining.clone(), peer.position);
        }
        let _ = self.send(
            joining,
            Request::new(Operation::UpdateRoutingEntry {
                row_idx: common_prefix_length(&self.id, joining),
                node_id: self.id.clone(),
            }),
        );
        Response::success("presence acknowledged", hops, ResponsePayload::Empty)
    }

    /// Initiates this node's own graceful departure (§4.6).
    #[tracing::instrument(skip(self))]
    pub fn leave(&self) -> Result<(), DhtError> {
        let targets: Vec<Identifier> = {
            let state = self.state.lock().expect("node mutex poisoned");
            state
                .routing_table
                .known_ids()
                .into_iter()
                .chain(state.leaf_set.known_ids())
                .chain(state.neighborhood_set.known_ids())
                .sorted_by(|a, b| a.as_str().cmp(b.as_str()))
                .dedup()
                .collect()
        };
        // Unregister before notifying peers: each recipient's handler
        // triggers a state rebuild from the coordinator's live set, which
        // must already exclude this node or the rebuild would re-admit it.
        self.coordinator.unregister(&self.id);
        self.running.store(false, Ordering::SeqCst);
        for target in targets {
            let _ = self.send(
                &target,
                Request::new(Operation::Leave {
                    leaving_node_id: self.id.clone(),
                }),
            );
        }
        Ok(())
    }

    fn handle_leave(&self, leaving: &Identifier, hops: Vec<Identifier>) -> Response {
        self.evict_peer(leaving);
        Response::success("departure acknowledged", hops, ResponsePayload::Empty)
    }

    fn handle_update_routing_row(&self, row_idx: usize, row: &[Option<Identifier>], hops: Vec<Identifier>) -> Response {
        let mut state = self.state.lock().expect("node mutex poisoned");
        if row_idx < state.routing_table.digits() {
            state.routing_table.merge_row(row_idx, row, self.diagonal_digit(row_idx) as usize);
        }
        Response::success("ack", hops, ResponsePayload::Empty)
    }

    /// Recomputes the row index itself rather than trusting the sender's
    /// `row_idx`, since only the receiver's own prefix with `node_id` is
    /// meaningful here.
    fn handle_update_routing_entry(&self, _row_idx: usize, node_id: &Identifier, hops: Vec<Identifier>) -> Response {
        let mut state = self.state.lock().expect("node mutex poisoned");
        let r = common_prefix_length(&self.id, node_id);
        if r < state.routing_table.digits() {
            let col = node_id.digit_value(r);
            if col != self.diagonal_digit(r) {
                state.routing_table.insert_if_empty(r, col as usize, node_id.clone());
            }
        }
        Response::success("ack", hops, ResponsePayload::Empty)
    }

    fn handle_update_leaf_set(&self, lmin: Vec<Identifier>, lmax: Vec<Identifier>, hops: Vec<Identifier>) -> Response {
        let mut state = self.state.lock().expect("node mutex poisoned");
        for id in lmin.into_iter().chain(lmax) {
            state.leaf_set.try_admit(id);
        }
        Response::success("ack", hops, ResponsePayload::Empty)
    }

    fn handle_get_leaf_set(&self, hops: Vec<Identifier>) -> Response {
        let state = self.state.lock().expect("node mutex poisoned");
        Response::success(
            "leaf set",
            hops,
            ResponsePayload::LeafSet {
                lmin: state.leaf_set.lmin().to_vec(),
                lmax: state.leaf_set.lmax().to_vec(),
            },
        )
    }

    fn handle_distance(&self, node_position: f64, hops: Vec<Identifier>) -> Response {
        let state = self.state.lock().expect("node mutex poisoned");
        let distance = (self.position - node_position).abs();
        Response::success(
            "distance",
            hops,
            ResponsePayload::Distance {
                distance,
                neighborhood_set: state.neighborhood_set.ids(),
            },
        )
    }

    // ---- content operations (§4.8) ----------------------------------------

    fn route_insert(&self, key: Identifier, point: Point, review: String, country: String, hops: Vec<Identifier>) -> Response {
        let mut attempts = 0;
        loop {
            if self.is_responsible(&key) {
                let country_name = country.clone();
                let mut state = self.state.lock().expect("node mutex poisoned");
                state.store.insert(point, review.clone(), key.clone(), country_name);
                return Response::success("inserted", hops, ResponsePayload::Empty);
            }
            let next = self.next_hop(&key);
            let forward = Request {
                operation: Operation::InsertKey {
                    key: key.clone(),
                    point,
                    review: review.clone(),
                    country: country.clone(),
                },
                hops: hops.clone(),
            };
            match self.send(&next, forward) {
                Ok(response) => return response,
                Err(_) if attempts == 0 => attempts += 1,
                Err(_) => return Response::failure("peer unreachable after one re-route attempt", hops),
            }
        }
    }

    fn route_update(
        &self,
        key: Identifier,
        criteria: Option<types::Criteria>,
        data: types::UpdateFields,
        hops: Vec<Identifier>,
    ) -> Response {
        let mut attempts = 0;
        loop {
            if self.is_responsible(&key) {
                let mut state = self.state.lock().expect("node mutex poisoned");
                let updated = state.store.update_points(&key, criteria.as_ref(), &data);
                return if updated > 0 {
                    Response::success(format!("updated {updated} point(s)"), hops, ResponsePayload::Empty)
                } else {
                    Response::failure("no matching records for update", hops)
                };
            }
            let next = self.next_hop(&key);
            let forward = Request {
                operation: Operation::UpdateKey {
                    key: key.clone(),
                    criteria: criteria.clone(),
                    data: data.clone(),
                },
                hops: hops.clone(),
            };
            match self.send(&next, forward) {
                Ok(response) => return response,
                Err(_) if attempts == 0 => attempts += 1,
                Err(_) => return Response::failure("peer unreachable after one re-route attempt", hops),
            }
        }
    }

    fn route_delete(&self, key: Identifier, hops: Vec<Identifier>) -> Response {
        let mut attempts = 0;
        loop {
            if self.is_responsible(&key) {
                let mut state = self.state.lock().expect("node mutex poisoned");
                let removed = state.store.delete_points(&key);
                return if removed > 0 {
                    Response::success(format!("deleted {removed} point(s)"), hops, ResponsePayload::Empty)
                } else {
                    Response::failure("no matching records for delete", hops)
                };
            }
            let next = self.next_hop(&key);
            let forward = Request {
                operation: Operation::DeleteKey { key: key.clone() },
                hops: hops.clone(),
            };
            match self.send(&next, forward) {
                Ok(response) => return response,
                Err(_) if attempts == 0 => attempts += 1,
                Err(_) => return Response::failure("peer unreachable after one re-route attempt", hops),
            }
        }
    }

    fn route_lookup(&self, key: Identifier, lower: Point, upper: Point, n: usize, hops: Vec<Identifier>) -> Response {
        let mut attempts = 0;
        loop {
            if self.is_responsible(&key) {
                let state = self.state.lock().expect("node mutex poisoned");
                let (points, reviews) = state.store.search(&lower, &upper);
                drop(state);
                let similar = if n == 0 || reviews.is_empty() {
                    Vec::new()
                } else {
                    let mut index = similarity::LshIndex::from_documents(&reviews, LSH_NUM_BANDS, LSH_NUM_ROWS);
                    index.find_similar_docs(std::num::NonZeroUsize::new(n).expect("n checked non-zero above"))
                };
                return Response::success(
                    "lookup complete",
                    hops,
                    ResponsePayload::Lookup { points, reviews, similar },
                );
            }
            let next = self.next_hop(&key);
            let forward = Request {
                operation: Operation::Lookup {
                    key: key.clone(),
                    lower_bounds: lower,
                    upper_bounds: upper,
                    n,
                },
                hops: hops.clone(),
            };
            match self.send(&next, forward) {
                Ok(response) => return response,
                Err(_) if attempts == 0 => attempts += 1,
                Err(_) => return Response::failure("peer unreachable after one re-route attempt", hops),
            }
        }
    }

    // ---- public entry points, callable on any live node (§4.8) ------------

    pub fn insert(&self, key: &Identifier, point: Point, review: String, country: String) -> Response {
        self.handle_request(Request::new(Operation::InsertKey {
            key: key.clone(),
            point,
            review,
            country,
        }))
    }

    pub fn update(&self, key: &Identifier, criteria: Option<types::Criteria>, data: types::UpdateFields) -> Response {
        self.handle_request(Request::new(Operation::UpdateKey {
            key: key.clone(),
            criteria,
            data,
        }))
    }

    pub fn delete(&self, key: &Identifier) -> Response {
        self.handle_request(Request::new(Operation::DeleteKey { key: key.clone() }))
    }

    pub fn lookup(&self, key: &Identifier, lower: Point, upper: Point, n: usize) -> Response {
        self.handle_request(Request::new(Operation::Lookup {
            key: key.clone(),
            lower_bounds: lower,
            upper_bounds: upper,
            n,
        }))
    }

    // ---- inspection surface (§6) --------------------------------------------

    pub fn state_snapshot(&self) -> StateSnapshot {
        let state = self.state.lock().expect("node mutex poisoned");
        StateSnapshot {
            id: self.id.clone(),
            port: self.port,
            position: self.position,
            routing_table_known_ids: state.routing_table.known_ids().into_iter().collect(),
            lmin: state.leaf_set.lmin().to_vec(),
            lmax: state.leaf_set.lmax().to_vec(),
            neighborhood_set: state.neighborhood_set.ids(),
            country_keys: state.store.unique_country_keys(),
        }
    }
}
