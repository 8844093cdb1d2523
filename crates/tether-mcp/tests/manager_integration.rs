//! Connection lifecycle: idempotence, unwinding, collisions and the
//! disconnect-all barrier.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MockConnector, MockServer};
use serde_json::json;
use tether_mcp::{ConnectionManager, ConnectionStatus, Invoker, McpError, ServerDescriptor};
use tokio::sync::Notify;
use tokio::time::Instant;

fn manager(servers: Vec<(&str, MockServer)>) -> (Arc<ConnectionManager>, Arc<MockConnector>) {
    let names: Vec<&str> = servers.iter().map(|(n, _)| *n).collect();
    let descriptors = MockConnector::descriptors(&names);
    let connector = Arc::new(MockConnector::new(servers));
    let manager = Arc::new(ConnectionManager::new(descriptors, connector.clone()));
    (manager, connector)
}

async fn wait_for_status(manager: &ConnectionManager, name: &str, status: ConnectionStatus) {
    for _ in 0..200 {
        if manager.status(name).await == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("'{name}' never reached {status}");
}

#[tokio::test]
async fn connect_twice_is_idempotent() {
    let (manager, connector) = manager(vec![("github", MockServer::with_tools(&["search_repositories"]))]);

    manager.connect("github").await.unwrap();
    manager.connect("github").await.unwrap();

    assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
    assert_eq!(manager.list_connected().await, vec!["github"]);
    assert_eq!(manager.resolve("search_repositories").await.unwrap(), "github");
}

#[tokio::test]
async fn disconnect_never_connected_is_success() {
    let (manager, _) = manager(vec![("github", MockServer::with_tools(&["a"]))]);
    manager.disconnect("github").await.unwrap();
    manager.disconnect("github").await.unwrap();
    assert_eq!(manager.status("github").await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn unknown_server_is_rejected() {
    let (manager, _) = manager(vec![]);
    assert!(matches!(
        manager.connect("nope").await,
        Err(McpError::UnknownServer { name }) if name == "nope"
    ));
    assert!(matches!(
        manager.disconnect("nope").await,
        Err(McpError::UnknownServer { .. })
    ));
}

#[tokio::test]
async fn disabled_server_is_rejected() {
    let mut descriptor = ServerDescriptor::http("slack", "http://slack.invalid/mcp");
    descriptor.enabled = false;
    let connector = Arc::new(MockConnector::new(vec![("slack", MockServer::with_tools(&["x"]))]));
    let manager = ConnectionManager::new(vec![descriptor], connector.clone());

    assert!(matches!(
        manager.connect("slack").await,
        Err(McpError::ServerDisabled { .. })
    ));
    assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_handshake_unwinds() {
    let server = MockServer {
        fail_initialize: true,
        ..MockServer::with_tools(&["search"])
    };
    let (manager, _) = manager(vec![("broken", server.clone())]);

    match manager.connect("broken").await {
        Err(McpError::ConnectionFailed { server, reason }) => {
            assert_eq!(server, "broken");
            assert!(reason.contains("initialize rejected"));
        }
        other => panic!("Expected ConnectionFailed, got {other:?}"),
    }

    assert_eq!(server.close_count(), 1);
    assert_eq!(manager.status("broken").await, ConnectionStatus::Disconnected);
    assert!(manager.definitions().await.is_empty());
    assert!(manager.list_connected().await.is_empty());
}

#[tokio::test]
async fn later_server_wins_and_falls_back_on_disconnect() {
    let (manager, _) = manager(vec![
        ("first", MockServer::with_tools(&["search", "only_first"])),
        ("second", MockServer::with_tools(&["search"])),
    ]);
    manager.connect("first").await.unwrap();
    manager.connect("second").await.unwrap();

    assert_eq!(manager.resolve("search").await.unwrap(), "second");
    let names: Vec<String> = manager.definitions().await.into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["only_first", "search"]);
    assert_eq!(manager.capabilities().await.len(), 3);

    manager.disconnect("second").await.unwrap();
    assert_eq!(manager.resolve("search").await.unwrap(), "first");
}

#[tokio::test]
async fn disconnect_closes_transport_and_drops_capabilities() {
    let server = MockServer::with_tools(&["slack_post_message"]);
    let (manager, _) = manager(vec![("slack", server.clone())]);
    manager.connect("slack").await.unwrap();

    manager.disconnect("slack").await.unwrap();

    assert_eq!(server.close_count(), 1);
    assert!(matches!(
        manager.resolve("slack_post_message").await,
        Err(McpError::CapabilityNotFound { .. })
    ));
    // A fresh connect works after a disconnect.
    manager.connect("slack").await.unwrap();
    assert_eq!(manager.list_connected().await, vec!["slack"]);
}

#[tokio::test]
async fn connect_while_connecting_is_rejected() {
    let gate = Arc::new(Notify::new());
    let server = MockServer {
        handshake_gate: Some(gate.clone()),
        ..MockServer::with_tools(&["search"])
    };
    let (manager, _) = manager(vec![("slow", server)]);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect("slow").await })
    };
    wait_for_status(&manager, "slow", ConnectionStatus::Connecting).await;

    assert!(matches!(
        manager.connect("slow").await,
        Err(McpError::ConnectInProgress { .. })
    ));

    gate.notify_one();
    pending.await.unwrap().unwrap();
    assert_eq!(manager.status("slow").await, ConnectionStatus::Connected);
}

#[tokio::test]
async fn disconnect_all_abandons_in_flight_connect() {
    let gate = Arc::new(Notify::new());
    let slow = MockServer {
        handshake_gate: Some(gate.clone()),
        ..MockServer::with_tools(&["search"])
    };
    let fast = MockServer::with_tools(&["post"]);
    let (manager, _) = manager(vec![("slow", slow.clone()), ("fast", fast.clone())]);

    manager.connect("fast").await.unwrap();
    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect("slow").await })
    };
    wait_for_status(&manager, "slow", ConnectionStatus::Connecting).await;

    assert_eq!(manager.disconnect_all().await, 1);
    assert_eq!(fast.close_count(), 1);

    gate.notify_one();
    assert!(matches!(
        pending.await.unwrap(),
        Err(McpError::Abandoned { name }) if name == "slow"
    ));

    // The abandoned session was closed and never registered.
    assert_eq!(slow.close_count(), 1);
    assert!(manager.list_connected().await.is_empty());
    assert!(manager.definitions().await.is_empty());
    assert_eq!(manager.status("slow").await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn check_availability_does_not_connect() {
    let (manager, connector) = manager(vec![("github", MockServer::with_tools(&["a"]))]);
    let report = manager
        .check_availability("github", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(report.is_available());
    assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    assert!(matches!(
        manager.check_availability("nope", Duration::from_secs(5)).await,
        Err(McpError::UnknownServer { .. })
    ));
}

#[tokio::test]
async fn unavailable_server_is_never_opened() {
    let down = MockServer {
        unavailable: true,
        ..MockServer::with_tools(&["a"])
    };
    let (manager, connector) = manager(vec![("down", down)]);

    match manager.connect("down").await {
        Err(McpError::ConnectionFailed { server, reason }) => {
            assert_eq!(server, "down");
            assert!(reason.starts_with("unavailable"), "reason: {reason}");
        }
        other => panic!("Expected ConnectionFailed, got {other:?}"),
    }
    assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    assert_eq!(manager.status("down").await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn slow_teardown_does_not_block_other_servers() {
    let slow = MockServer::with_tools(&["slow_tool"]).slow_to_close(Duration::from_secs(2));
    let fast = MockServer::with_tools(&["fast_tool"]);
    let (manager, _) = manager(vec![("slow", slow.clone()), ("fast", fast.clone())]);
    manager.connect("slow").await.unwrap();
    manager.connect("fast").await.unwrap();

    let disconnecting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.disconnect("slow").await })
    };
    wait_for_status(&manager, "slow", ConnectionStatus::Disconnected).await;

    let started = Instant::now();
    let invoker = Invoker::new(manager.clone());
    invoker.invoke("fast_tool", json!({})).await.unwrap();
    assert_eq!(manager.list_connected().await, vec!["fast"]);
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "blocked for {:?}",
        started.elapsed()
    );
    assert!(matches!(
        invoker.invoke("slow_tool", json!({})).await,
        Err(McpError::CapabilityNotFound { .. })
    ));

    disconnecting.await.unwrap().unwrap();
    assert_eq!(slow.close_count(), 1);
    assert!(manager.resolve("slow_tool").await.is_err());
    assert_eq!(fast.call_count(), 1);
}

#[tokio::test]
async fn disconnect_all_closes_sessions_concurrently() {
    let delay = Duration::from_millis(400);
    let servers: Vec<MockServer> = (0..3)
        .map(|i| MockServer::with_tools(&[["a", "b", "c"][i]]).slow_to_close(delay))
        .collect();
    let (manager, _) = manager(vec![
        ("one", servers[0].clone()),
        ("two", servers[1].clone()),
        ("three", servers[2].clone()),
    ]);
    for name in ["one", "two", "three"] {
        manager.connect(name).await.unwrap();
    }

    let started = Instant::now();
    assert_eq!(manager.disconnect_all().await, 3);
    assert!(started.elapsed() < delay * 2, "took {:?}", started.elapsed());
    assert!(servers.iter().all(|s| s.close_count() == 1));
}
