//! Multi-node ring scenarios over loopback TCP.
//!
//! Every test runs real nodes with real RPC servers on ephemeral ports,
//! but drives the maintenance rounds explicitly instead of starting the
//! timers, so convergence is deterministic.

use std::net::TcpListener;
use std::sync::Arc;

use tokio::task::JoinHandle;

use rondo::config::Config;
use rondo::dht::Did;
use rondo::dht::NodeRef;
use rondo::node::Node;
use rondo::rpc;

struct TestNode {
    node: Arc<Node>,
    server: JoinHandle<()>,
}

impl TestNode {
    fn me(&self) -> NodeRef {
        self.node.me().clone()
    }

    fn successor_id(&self) -> u128 {
        self.node.ring().successor().unwrap().id.value()
    }

    fn predecessor_id(&self) -> Option<u128> {
        self.node
            .ring()
            .predecessor()
            .unwrap()
            .map(|p| p.id.value())
    }

    fn successor_list_ids(&self) -> Vec<u128> {
        self.node
            .ring()
            .lock_successors()
            .unwrap()
            .list()
            .iter()
            .map(|n| n.id.value())
            .collect()
    }

    async fn lookup(&self, key: u128) -> u128 {
        let me = self.me();
        self.node
            .find_successor(Did::from(key), &me)
            .await
            .expect("lookup returned no node")
            .id
            .value()
    }

    fn kill(&self) {
        self.server.abort();
    }
}

/// Reserve `N` distinct loopback ports. The listeners are held together
/// so the kernel cannot hand the same port out twice, then dropped for
/// the nodes to rebind.
fn reserve_ports<const N: usize>() -> [u16; N] {
    let sockets: Vec<TcpListener> = (0..N)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let mut ports = [0u16; N];
    for (port, socket) in ports.iter_mut().zip(&sockets) {
        *port = socket.local_addr().unwrap().port();
    }
    ports
}

/// m = 3 config with a pinned id, matching the paper's toy ring.
fn config(port: u16, id: u128, known: Option<(u16, u128)>) -> Config {
    let mut config = Config::new("127.0.0.1", port);
    config.hash_bits = 3;
    config.id = Some(format!("{id:x}"));
    if let Some((known_port, known_id)) = known {
        config.known_host = Some("127.0.0.1".into());
        config.known_port = Some(known_port);
        config.known_id = Some(format!("{known_id:x}"));
    }
    config
}

async fn start(port: u16, id: u128, known: Option<(u16, u128)>) -> TestNode {
    let node = Arc::new(Node::new(&config(port, id, known)).unwrap());
    let (_addr, server) = rpc::server::spawn(Arc::clone(&node), ("127.0.0.1", port))
        .await
        .unwrap();
    node.join_cluster().await.unwrap();
    TestNode { node, server }
}

/// Run `rounds` of the maintenance every node would run on its timers.
async fn settle(nodes: &[&TestNode], rounds: usize) {
    for _ in 0..rounds {
        for n in nodes {
            n.node.check_predecessor().await;
            n.node.stabilize().await;
        }
    }
}

/// Re-resolve every finger of every node, like fix_fingers does over time.
async fn refresh_all_fingers(nodes: &[&TestNode]) {
    for n in nodes {
        let m = n.node.space().bits() as usize;
        for index in 1..m {
            n.node.refresh_finger(index).await;
        }
    }
}

#[tokio::test]
async fn test_single_node_ring() {
    let [port] = reserve_ports::<1>();
    let a = start(port, 1, None).await;

    assert_eq!(a.predecessor_id(), Some(1));
    assert_eq!(a.successor_id(), 1);
    assert_eq!(a.successor_list_ids(), vec![1]);
    {
        let finger = a.node.ring().lock_finger().unwrap();
        let starts: Vec<u128> = finger.list().iter().map(|e| e.start.value()).collect();
        assert_eq!(starts, vec![2, 3, 5]);
        assert!(finger.list().iter().all(|e| e.node.id.value() == 1));
    }
    // Any key resolves to the only member.
    assert_eq!(a.lookup(5).await, 1);
    assert_eq!(a.lookup(0).await, 1);

    a.kill();
}

#[tokio::test]
async fn test_two_node_join() {
    let [port_a, port_b] = reserve_ports::<2>();
    let a = start(port_a, 1, None).await;
    let b = start(port_b, 3, Some((port_a, 1))).await;
    settle(&[&a, &b], 3).await;

    assert_eq!(a.successor_id(), 3);
    assert_eq!(b.successor_id(), 1);
    assert_eq!(a.predecessor_id(), Some(3));
    assert_eq!(b.predecessor_id(), Some(1));

    for n in [&a, &b] {
        assert_eq!(n.lookup(2).await, 3);
        assert_eq!(n.lookup(0).await, 1);
    }

    a.kill();
    b.kill();
}

#[tokio::test]
async fn test_three_node_ring_lookups_and_fingers() {
    let [port_a, port_b, port_c] = reserve_ports::<3>();
    let a = start(port_a, 1, None).await;
    let b = start(port_b, 3, Some((port_a, 1))).await;
    settle(&[&a, &b], 2).await;
    let c = start(port_c, 5, Some((port_a, 1))).await;
    settle(&[&a, &b, &c], 3).await;
    refresh_all_fingers(&[&a, &b, &c]).await;
    settle(&[&a, &b, &c], 1).await;

    // Two independent lookups agree from every vantage point.
    for n in [&a, &b, &c] {
        assert_eq!(n.lookup(4).await, 5);
        assert_eq!(n.lookup(6).await, 1);
        assert_eq!(n.lookup(2).await, 3);
    }

    // Finger table of node 1: starts {2, 3, 5}, successors {3, 3, 5}.
    {
        let finger = a.node.ring().lock_finger().unwrap();
        let view: Vec<(u128, u128)> = finger
            .list()
            .iter()
            .map(|e| (e.start.value(), e.node.id.value()))
            .collect();
        assert_eq!(view, vec![(2, 3), (3, 3), (5, 5)]);
    }

    // Successor lists mirror the walk around the ring.
    assert_eq!(a.successor_list_ids(), vec![3, 5]);
    assert_eq!(b.successor_list_ids(), vec![5, 1]);
    assert_eq!(c.successor_list_ids(), vec![1, 3]);

    // The ring closes: everyone's successor's predecessor is themselves.
    assert_eq!(a.predecessor_id(), Some(5));
    assert_eq!(b.predecessor_id(), Some(1));
    assert_eq!(c.predecessor_id(), Some(3));

    a.kill();
    b.kill();
    c.kill();
}

#[tokio::test]
async fn test_successor_failure_repair() {
    let [port_a, port_b, port_c] = reserve_ports::<3>();
    let a = start(port_a, 1, None).await;
    let b = start(port_b, 3, Some((port_a, 1))).await;
    settle(&[&a, &b], 2).await;
    let c = start(port_c, 5, Some((port_a, 1))).await;
    settle(&[&a, &b, &c], 3).await;
    refresh_all_fingers(&[&a, &b, &c]).await;
    settle(&[&a, &b, &c], 1).await;
    assert_eq!(a.successor_id(), 3);

    // Node 3 dies. Its survivors route around it within three rounds.
    b.kill();
    for _ in 0..3 {
        a.node.check_predecessor().await;
        a.node.stabilize().await;
        c.node.check_predecessor().await;
        c.node.stabilize().await;
    }

    assert_eq!(a.successor_id(), 5);
    assert_eq!(a.successor_list_ids(), vec![5]);
    assert_eq!(c.predecessor_id(), Some(1));

    a.kill();
    c.kill();
}

#[tokio::test]
async fn test_wrap_around_lookup() {
    let [port_a, port_b] = reserve_ports::<2>();
    let a = start(port_a, 2, None).await;
    let b = start(port_b, 6, Some((port_a, 2))).await;
    settle(&[&a, &b], 3).await;

    // 7 has no node above it: the lookup wraps through 0 to node 2.
    assert_eq!(a.lookup(7).await, 2);
    assert_eq!(b.lookup(7).await, 2);
    assert_eq!(a.lookup(4).await, 6);
    assert_eq!(b.lookup(4).await, 6);

    a.kill();
    b.kill();
}

#[tokio::test]
async fn test_identifier_collision_is_fatal() {
    // Distinct addresses pinned to the same id cannot coexist.
    let bad = config(4101, 5, Some((4102, 5)));
    assert!(Node::new(&bad).is_err());
    // The same address is not a collision; it just means "first node".
    let same = config(4101, 5, Some((4101, 5)));
    assert!(Node::new(&same).is_ok());
}

#[tokio::test]
async fn test_join_via_dead_peer_fails() {
    let [port, dead_port] = reserve_ports::<2>();
    let node = Arc::new(Node::new(&config(port, 3, Some((dead_port, 1)))).unwrap());
    let (_addr, server) = rpc::server::spawn(Arc::clone(&node), ("127.0.0.1", port))
        .await
        .unwrap();
    assert!(node.join_cluster().await.is_err());
    server.abort();
}
