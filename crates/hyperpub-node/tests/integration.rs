//! End-to-end tests with real nodes on loopback TCP

use std::time::Duration;

use hyperpub_core::StateError;
use hyperpub_node::{HyperpubNode, NodeConfig, NodeError, PeerAddress};

fn addr(s: &str) -> PeerAddress {
    s.parse().unwrap()
}

async fn start_node(address: &str) -> HyperpubNode {
    hyperpub_logging::init_testing();
    let node = HyperpubNode::new(NodeConfig::local(addr(address), 0)).unwrap();
    node.start().await.unwrap();
    node
}

/// Dial `to` from `from` and wait until both sides see the link
async fn link(from: &HyperpubNode, to: &HyperpubNode) {
    let endpoint = to.local_addr().unwrap().to_string();
    from.connect(to.address(), &endpoint).await.unwrap();
    let (a, b) = (from.address(), to.address());
    wait_until(|| to.connected_peers().contains(&a) && from.connected_peers().contains(&b)).await;
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test]
async fn test_node_lifecycle() {
    hyperpub_logging::init_testing();
    let node = HyperpubNode::new(NodeConfig::local(addr("000"), 0)).unwrap();
    assert!(!node.is_started());
    assert!(node.local_addr().is_none());

    node.start().await.unwrap();
    assert!(node.is_started());
    assert!(node.local_addr().unwrap().port() > 0);
    assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));

    node.stop().await.unwrap();
    assert!(!node.is_started());
    // Stopping twice is a no-op
    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_create_publish_pull_scenario() {
    let a = start_node("000").await;
    let b = start_node("001").await;
    link(&a, &b).await;

    a.create_topic("T1").await.unwrap();
    wait_until(|| b.context().directory().contains("T1")).await;
    assert!(!b.context().subscriptions().is_subscribed("T1"));
    assert_eq!(b.context().directory().get("T1").unwrap(), Vec::<String>::new());

    a.publish("T1", "hello").await.unwrap();
    let report = a.pull_all();
    assert_eq!(report.messages_for("T1").unwrap(), ["hello"]);
    assert!(a.pull_all().messages_for("T1").unwrap().is_empty());

    // B stores the message but has nothing unread
    wait_until(|| b.context().directory().get("T1").is_some_and(|log| log.len() == 1)).await;
    assert_eq!(b.context().subscriptions().unread_count("T1"), 0);

    assert!(matches!(
        b.delete_topic("missing").await,
        Err(NodeError::State(StateError::TopicNotFound(_)))
    ));

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscriber_receives_published_messages() {
    let a = start_node("000").await;
    let b = start_node("001").await;
    link(&a, &b).await;

    a.create_topic("news").await.unwrap();
    wait_until(|| b.context().directory().contains("news")).await;
    b.subscribe("news").await.unwrap();

    for i in 0..5 {
        a.publish("news", &format!("item {}", i)).await.unwrap();
    }
    wait_until(|| b.context().subscriptions().unread_count("news") == 5).await;

    let report = b.pull_all();
    let expected: Vec<String> = (0..5).map(|i| format!("item {}", i)).collect();
    assert_eq!(report.messages_for("news").unwrap(), expected.as_slice());
    assert_eq!(a.context().directory().get("news").unwrap(), expected);

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_delete_propagates() {
    let a = start_node("000").await;
    let b = start_node("001").await;
    link(&a, &b).await;

    a.create_topic("gone").await.unwrap();
    wait_until(|| b.context().directory().contains("gone")).await;

    a.delete_topic("gone").await.unwrap();
    wait_until(|| !b.context().directory().contains("gone")).await;
    assert!(!b.context().subscriptions().has_queue("gone"));

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_sends_topic_snapshot() {
    let a = start_node("000").await;
    let b = start_node("001").await;
    b.create_topic("early").await.unwrap();

    link(&b, &a).await;
    wait_until(|| a.context().directory().contains("early")).await;
    assert!(!a.context().subscriptions().is_subscribed("early"));

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_request_topics_from_bootstrap() {
    let bootstrap = start_node("000").await;
    bootstrap.create_topic("alpha").await.unwrap();
    bootstrap.create_topic("beta").await.unwrap();

    let b = start_node("001").await;
    link(&b, &bootstrap).await;
    assert!(b.list_topics().is_empty());

    b.request_topics().await.unwrap();
    wait_until(|| b.list_topics().len() == 2).await;
    let names: Vec<String> = b.list_topics().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(b.list_topics().iter().all(|t| !t.subscribed));

    bootstrap.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_topic_list_round_trip_over_multiple_hops() {
    // Line 000 - 100 - 110 - 111
    let origin = start_node("000").await;
    let n100 = start_node("100").await;
    let n110 = start_node("110").await;
    let far = start_node("111").await;
    link(&n100, &origin).await;
    link(&n110, &n100).await;
    link(&far, &n110).await;

    origin.create_topic("deep").await.unwrap();
    // The creation broadcast only reaches 100
    wait_until(|| n100.context().directory().contains("deep")).await;
    assert!(!far.context().directory().contains("deep"));

    far.request_topics().await.unwrap();
    wait_until(|| far.context().directory().contains("deep")).await;
    assert!(!far.context().subscriptions().is_subscribed("deep"));

    for node in [&origin, &n100, &n110, &far] {
        node.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_subscribe_to_unknown_topic_fetches_list() {
    let bootstrap = start_node("000").await;
    bootstrap.create_topic("remote").await.unwrap();
    let b = start_node("010").await;
    link(&b, &bootstrap).await;

    assert!(matches!(
        b.subscribe("remote").await,
        Err(NodeError::State(StateError::TopicNotFound(_)))
    ));
    wait_until(|| b.context().directory().contains("remote")).await;
    b.subscribe("remote").await.unwrap();

    bootstrap.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_connect_neighbors() {
    let neighbor = start_node("01").await;
    let port = neighbor.local_addr().unwrap().port();

    // Neighbor 01 sits at base + 1
    let center = start_node("00").await;
    let connected = center.connect_neighbors("127.0.0.1", port - 1).await.unwrap();
    assert!(connected.contains(&addr("01")));
    wait_until(|| neighbor.connected_peers() == vec![addr("00")]).await;

    center.stop().await.unwrap();
    neighbor.stop().await.unwrap();
}
