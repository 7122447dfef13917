//! Shared helpers for the socket-level tests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use horde_client::GameClient;
use horde_server::server::{bind_ephemeral, GameServer};
use horde_shared::{
    character::InMemoryDirectory,
    config::WorldTuning,
    math::Vec2,
    net::{CharacterId, ServerMsg},
};
use tokio::task::JoinHandle;

/// How long tests wait for a message that should arrive.
pub const EXPECT: Duration = Duration::from_secs(2);
/// How long tests wait to be confident a message will not arrive.
pub const QUIET: Duration = Duration::from_millis(300);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A running server on an ephemeral port. Stops when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<GameServer>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// World without enemies, so tests only see what they cause.
pub fn quiet_world() -> WorldTuning {
    WorldTuning {
        initial_enemies: 0,
        max_enemies: 0,
        ..WorldTuning::default()
    }
}

pub async fn spawn_test_server(world: WorldTuning) -> anyhow::Result<TestServer> {
    init_tracing();
    let seeded = world.initial_enemies;
    let server = Arc::new(bind_ephemeral(world, Arc::new(InMemoryDirectory::new())).await?);
    let addr = server.local_addr()?;
    let task = server.clone().spawn();

    // The server seeds its enemies once its task starts running.
    let deadline = tokio::time::Instant::now() + EXPECT;
    while server.store().enemy_count() < seeded {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("server did not seed {seeded} enemies");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(TestServer { addr, server, task })
}

/// Connects, joins and waits for the join reply, leaving the inbox at the
/// point right after it.
pub async fn join_as(addr: SocketAddr, id: &str, at: Option<Vec2>) -> anyhow::Result<GameClient> {
    let mut client = GameClient::connect(addr).await?;
    // Initial sync on connect, then the join reply. Each ends in an enemy roster.
    expect(&mut client, |m| matches!(m, ServerMsg::EnemyRoster { .. })).await?;
    client.join(&CharacterId::from(id), &id.to_uppercase(), None, at).await?;
    expect(&mut client, |m| matches!(m, ServerMsg::EnemyRoster { .. })).await?;
    Ok(client)
}

/// Waits for a matching message or fails.
pub async fn expect(
    client: &mut GameClient,
    pred: impl FnMut(&ServerMsg) -> bool,
) -> anyhow::Result<ServerMsg> {
    client
        .wait_for(EXPECT, pred)
        .await?
        .ok_or_else(|| anyhow::anyhow!("expected message did not arrive"))
}

/// Asserts that no matching message arrives for a while.
pub async fn expect_none(
    client: &mut GameClient,
    pred: impl FnMut(&ServerMsg) -> bool,
) -> anyhow::Result<()> {
    if let Some(msg) = client.wait_for(QUIET, pred).await? {
        anyhow::bail!("unexpected message: {msg:?}");
    }
    Ok(())
}

pub fn joined(id: &str) -> impl Fn(&ServerMsg) -> bool + '_ {
    move |m| matches!(m, ServerMsg::PlayerJoined { player } if player.id.as_str() == id)
}

pub fn moved(id: &str) -> impl Fn(&ServerMsg) -> bool + '_ {
    move |m| matches!(m, ServerMsg::PlayerMoved { id: who, .. } if who.as_str() == id)
}

pub fn left(id: &str) -> impl Fn(&ServerMsg) -> bool + '_ {
    move |m| matches!(m, ServerMsg::PlayerLeft { id: who } if who.as_str() == id)
}
