//! Cross-crate integration scenarios driving several real `PastryNode`s over
//! real loopback sockets through one shared in-process coordinator.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use coordinator::Coordinator;
use identifier::{hash_key, Identifier};
use node::PastryNode;
use types::{Criteria, Point, UpdateFields};
use utils::NetworkConfig;

fn id(s: &str) -> Identifier {
    Identifier::new(s, 4).unwrap()
}

fn spawn_node(coordinator: &Arc<Coordinator>, hex: &str) -> Arc<PastryNode> {
    let node = PastryNode::new(id(hex), NetworkConfig::default(), Arc::clone(coordinator)).unwrap();
    node.start_server().unwrap();
    thread::sleep(Duration::from_millis(20));
    node.join().unwrap();
    node
}

#[test]
fn bootstrap_node_starts_with_empty_tables_and_is_running() {
    let coordinator = Arc::new(Coordinator::new());
    let node = spawn_node(&coordinator, "4b19");

    let snapshot = node.state_snapshot();
    assert!(snapshot.lmin.is_empty());
    assert!(snapshot.lmax.is_empty());
    assert!(snapshot.routing_table_known_ids.is_empty());
    assert!(node.is_running());
}

#[test]
fn two_node_insert_routes_to_the_numerically_closest_node() {
    let coordinator = Arc::new(Coordinator::new());
    let a = spawn_node(&coordinator, "4b19");
    let b = spawn_node(&coordinator, "a3f1");

    let key = id("c0ff");
    let point = Point {
        year: 2019,
        rating: 92.0,
        price: 5.0,
    };
    let response = a.insert(&key, point, "x".to_string(), "XX".to_string());
    assert_eq!(response.status, types::Status::Success);

    assert_eq!(a.next_hop(&key), b.id);

    let lookup = a.lookup(&key, point, point, 1);
    assert_eq!(lookup.status, types::Status::Success);
    assert_eq!(lookup.hops, vec![a.id.clone(), b.id.clone()]);
    if let types::ResponsePayload::Lookup { points, .. } = lookup.payload {
        assert_eq!(points, vec![point]);
    } else {
        panic!("expected a Lookup payload");
    }
}

#[test]
fn eight_node_join_leaves_every_node_with_a_convergent_next_hop_chain() {
    let coordinator = Arc::new(Coordinator::new());
    let ids = ["1111", "2222", "3333", "4444", "5555", "6666", "7777", "8888"];
    let nodes: Vec<Arc<PastryNode>> = ids.iter().map(|hex| spawn_node(&coordinator, hex)).collect();

    let key = id("4500");
    for node in &nodes {
        let mut current = node.id.clone();
        let mut hop_count = 0;
        loop {
            let owner = nodes.iter().find(|n| n.id == current).unwrap();
            let next = owner.next_hop(&key);
            if next == current {
                break;
            }
            current = next;
            hop_count += 1;
            assert!(hop_count <= ids.len(), "next_hop traversal failed to converge");
        }
        assert!(ids.contains(&current.as_str()), "chain must terminate at a live node");
    }
}

#[test]
fn update_by_criteria_only_touches_the_matching_point() {
    let coordinator = Arc::new(Coordinator::new());
    let node = spawn_node(&coordinator, "4b19");
    let country_key = hash_key("IT", 4);

    node.insert(
        &country_key,
        Point {
            year: 2018,
            rating: 90.0,
            price: 4.0,
        },
        "a".to_string(),
        "IT".to_string(),
    );
    node.insert(
        &country_key,
        Point {
            year: 2019,
            rating: 92.0,
            price: 5.0,
        },
        "b".to_string(),
        "IT".to_string(),
    );

    let response = node.update(
        &country_key,
        Some(Criteria {
            year: Some(2019),
            ..Default::default()
        }),
        UpdateFields {
            price: Some(6.0),
            ..Default::default()
        },
    );
    assert_eq!(response.status, types::Status::Success);

    let lookup = node.lookup(
        &country_key,
        Point {
            year: 0,
            rating: 0.0,
            price: 0.0,
        },
        Point {
            year: 3000,
            rating: 100.0,
            price: 100.0,
        },
        1,
    );
    if let types::ResponsePayload::Lookup { points, .. } = lookup.payload {
        assert!(points.contains(&Point {
            year: 2018,
            rating: 90.0,
            price: 4.0,
        }));
        assert!(points.contains(&Point {
            year: 2019,
            rating: 92.0,
            price: 6.0,
        }));
    } else {
        panic!("expected a Lookup payload");
    }
}

#[test]
fn graceful_leave_removes_the_node_from_every_remaining_table() {
    let coordinator = Arc::new(Coordinator::new());
    let ids = ["1111", "2222", "3333", "4444", "5555", "6666", "7777", "8888"];
    let nodes: Vec<Arc<PastryNode>> = ids.iter().map(|hex| spawn_node(&coordinator, hex)).collect();

    let leaving = nodes.iter().find(|n| n.id == id("5555")).unwrap();
    leaving.leave().unwrap();
    thread::sleep(Duration::from_millis(20));

    for node in &nodes {
        if node.id == id("5555") {
            continue;
        }
        node.rebuild_state();
        let snapshot = node.state_snapshot();
        assert!(!snapshot.routing_table_known_ids.contains(&id("5555")));
        assert!(!snapshot.lmin.contains(&id("5555")));
        assert!(!snapshot.lmax.contains(&id("5555")));
        assert!(!snapshot.neighborhood_set.contains(&id("5555")));
    }

    let survivor = nodes.iter().find(|n| n.id == id("1111")).unwrap();
    let response = survivor.lookup(
        &id("5550"),
        Point {
            year: 0,
            rating: 0.0,
            price: 0.0,
        },
        Point {
            year: 0,
            rating: 0.0,
            price: 0.0,
        },
        0,
    );
    assert_eq!(response.status, types::Status::Success);
}

#[test]
fn unexpected_leave_is_discovered_lazily_on_next_send() {
    let coordinator = Arc::new(Coordinator::new());
    let ids = ["1111", "2222", "3333", "4444", "5555", "6666", "7777", "8888"];
    let nodes: Vec<Arc<PastryNode>> = ids.iter().map(|hex| spawn_node(&coordinator, hex)).collect();

    coordinator.unregister(&id("3333"));

    let originator = nodes.iter().find(|n| n.id == id("1111")).unwrap();
    let response = originator.lookup(
        &id("3300"),
        Point {
            year: 0,
            rating: 0.0,
            price: 0.0,
        },
        Point {
            year: 0,
            rating: 0.0,
            price: 0.0,
        },
        0,
    );
    assert_eq!(response.status, types::Status::Success);

    originator.rebuild_state();
    let snapshot = originator.state_snapshot();
    assert!(!snapshot.routing_table_known_ids.contains(&id("3333")));
}
