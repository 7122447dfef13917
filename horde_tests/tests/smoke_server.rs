use horde_client::GameClient;
use horde_shared::{
    config::WorldTuning,
    net::{ServerMsg, SCHEMA_VERSION},
};
use horde_tests::{expect, spawn_test_server};

/// Smoke test: a default world seeds enemies and streams snapshots.
#[tokio::test]
async fn server_streams_enemy_snapshots() -> anyhow::Result<()> {
    let srv = spawn_test_server(WorldTuning::default()).await?;
    let mut client = GameClient::connect(srv.addr).await?;
    assert_eq!(client.schema_version, SCHEMA_VERSION);

    let tick = expect(&mut client, |m| matches!(m, ServerMsg::EnemiesTick { .. })).await?;
    let ServerMsg::EnemiesTick { enemies } = tick else {
        unreachable!();
    };
    assert_eq!(enemies.len(), 20);
    assert!(enemies.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(client.world.enemies.len(), 20);
    Ok(())
}

#[tokio::test]
async fn wrong_protocol_fails_to_connect() -> anyhow::Result<()> {
    let srv = spawn_test_server(horde_tests::quiet_world()).await?;
    let err = GameClient::connect_with_protocol(srv.addr, 0)
        .await
        .err()
        .map(|e| e.to_string());
    assert!(err.is_some_and(|e| e.contains("rejected")));
    Ok(())
}

#[tokio::test]
async fn console_spawn_is_broadcast() -> anyhow::Result<()> {
    let srv = spawn_test_server(horde_tests::quiet_world()).await?;
    let mut client = GameClient::connect(srv.addr).await?;
    expect(&mut client, |m| matches!(m, ServerMsg::EnemyRoster { .. })).await?;

    srv.server.exec_console("spawn 2");
    for _ in 0..2 {
        expect(&mut client, |m| matches!(m, ServerMsg::EnemySpawned { .. })).await?;
    }
    assert_eq!(client.world.enemies.len(), 2);
    Ok(())
}
