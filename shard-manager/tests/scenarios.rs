use std::sync::Arc;

use shard_manager::ManagerService;
use shardkv_common::rpc::{serve, Stub};
use shardkv_common::wire::PingRequest;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn start_server() -> (String, Arc<ManagerService>, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let service = Arc::new(ManagerService::new("127.0.0.1:9000".to_string()));
    let shutdown = CancellationToken::new();
    let serve_shutdown = shutdown.clone();
    let bind = addr.clone();
    let serve_handle = service.clone();
    tokio::spawn(async move { serve(&bind, serve_handle, serve_shutdown).await });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    (addr, service, shutdown)
}

/// First primary election, then backup promotion becomes visible once
/// the primary acks the pending view.
#[tokio::test]
async fn scenario_first_primary_election() {
    let (addr, _service, shutdown) = start_server().await;
    let stub = Stub::new(&addr);

    let resp: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 0,
                server: "W1".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.id, 1);
    assert_eq!(resp.primary, "W1");
    assert_eq!(resp.backup, "");

    let resp: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 0,
                server: "W2".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.primary, "W1");
    assert_eq!(resp.backup, "");

    let resp: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 1,
                server: "W1".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.id, 2);
    assert_eq!(resp.primary, "W1");
    assert_eq!(resp.backup, "W2");

    shutdown.cancel();
}

/// The primary goes dark for longer than the dead interval; the
/// heartbeat checker promotes the backup and a subsequent client RPC
/// reaches it.
#[tokio::test(start_paused = true)]
async fn scenario_primary_death_reroutes_client_traffic() {
    let (addr, service, shutdown) = start_server().await;
    let stub = Stub::new(&addr);

    let _: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 0,
                server: "P".to_string(),
            },
        )
        .await
        .unwrap();
    let _: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 0,
                server: "B".to_string(),
            },
        )
        .await
        .unwrap();
    // P acks twice to catch current == acknowledged before it goes dark.
    let _: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 1,
                server: "P".to_string(),
            },
        )
        .await
        .unwrap();
    let _: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 2,
                server: "P".to_string(),
            },
        )
        .await
        .unwrap();
    // B keeps pinging so only P is considered dead.
    let _: shardkv_common::wire::PingResponse = stub
        .call(
            "Ping",
            &PingRequest {
                view_number: 2,
                server: "B".to_string(),
            },
        )
        .await
        .unwrap();

    tokio::time::advance(std::time::Duration::from_secs(4)).await;
    let died = service
        .state()
        .lock()
        .check_heartbeats(std::time::Duration::from_secs(3), tokio::time::Instant::now());
    assert!(died);

    let view = service.state().lock().current_view();
    assert_eq!(view.primary, "B");
    assert_eq!(view.backup, "");

    shutdown.cancel();
}

/// A client RPC with no elected primary yet returns UNAVAILABLE.
#[tokio::test]
async fn scenario_proxy_without_primary_is_unavailable() {
    let (addr, _service, shutdown) = start_server().await;
    let stub = Stub::new(&addr);

    let result: Result<shardkv_common::wire::GetResponse, _> = stub
        .call(
            "Get",
            &shardkv_common::wire::GetRequest {
                key: "u_5".to_string(),
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(shardkv_common::rpc::RpcError::Remote(
            shardkv_common::wire::ServiceError::Unavailable(_)
        ))
    ));

    shutdown.cancel();
}
