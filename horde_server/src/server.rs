//! Server implementation.
//!
//! Connection flow:
//! - client sends `hello`; a wrong protocol gets `rejected` and is closed,
//! - server replies `welcome`, then the current roster and enemy snapshot,
//! - client sends `join`; from then on its messages go through the router,
//! - on EOF or a transport error the router runs the disconnect path.
//!
//! Each connection gets a reader (this task) and a writer task draining its
//! hub outbox. The timer loops run beside them for the server's lifetime.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use horde_shared::{
    character::CharacterDirectory,
    config::{ServerConfig, WorldTuning},
    net::{
        ClientMsg, ConnectionId, FrameReader, FrameWriter, ReliableConn, ReliableListener,
        ServerMsg, PROTOCOL_VERSION, SCHEMA_VERSION,
    },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, TokioClock},
    hub::{Dispatch, Hub},
    player::JoinRequest,
    router::EventRouter,
    scheduler::Timers,
    spawner,
    store::WorldStore,
};

/// Result of one operator console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleReply {
    Lines(Vec<String>),
    Quit,
}

/// Game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    listener: ReliableListener,
    store: Arc<WorldStore>,
    hub: Arc<Hub>,
    router: EventRouter,
    directory: Arc<dyn CharacterDirectory>,
    clock: Arc<dyn Clock>,
}

impl GameServer {
    /// Binds the listener. Nothing runs until [`GameServer::run`].
    pub async fn bind(
        cfg: ServerConfig,
        directory: Arc<dyn CharacterDirectory>,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let store = Arc::new(WorldStore::new());
        let router = EventRouter::new(store.clone(), cfg.world.clone());

        Ok(Self {
            cfg,
            listener,
            store,
            hub: Arc::new(Hub::new()),
            router,
            directory,
            clock: Arc::new(TokioClock::new()),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> &Arc<WorldStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Runs the server on a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run())
    }

    /// Starts the timers and accepts connections until the task is dropped.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let _timers = Timers::start(
            &self.cfg,
            self.store.clone(),
            self.hub.clone(),
            self.directory.clone(),
            self.clock.clone(),
        );
        info!(addr = %self.local_addr()?, "Server running");

        loop {
            let (conn, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve(conn, peer).await {
                    debug!(%peer, error = %e, "Connection closed with error");
                }
            });
        }
    }

    async fn serve(&self, conn: ReliableConn, peer: SocketAddr) -> anyhow::Result<()> {
        let (mut reader, mut writer) = conn.into_split();

        let hello: ClientMsg = reader.recv().await.context("read hello")?;
        match hello {
            ClientMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
            other => {
                let reason = match other {
                    ClientMsg::Hello { protocol } => {
                        format!("protocol {protocol} unsupported, expected {PROTOCOL_VERSION}")
                    }
                    _ => "expected hello".to_string(),
                };
                warn!(%peer, %reason, "Handshake rejected");
                writer.send(&ServerMsg::Rejected { reason: reason.clone() }).await?;
                writer.shutdown().await?;
                anyhow::bail!("handshake rejected: {reason}");
            }
        }

        let connection = ConnectionId::new_unique();
        writer
            .send(&ServerMsg::Welcome {
                connection_id: connection,
                schema_version: SCHEMA_VERSION,
            })
            .await?;
        info!(%connection, %peer, "Client connected");

        let outbox = self.hub.register(connection);
        self.hub.deliver_all(self.router.connected(connection));
        let writer_task = tokio::spawn(write_loop(connection, writer, outbox));

        let result = self.read_loop(connection, &mut reader).await;

        self.hub.unregister(connection);
        self.hub.deliver_all(self.router.disconnected(connection));
        info!(%connection, %peer, "Client disconnected");
        // The outbox sender is gone, so the writer drains and stops.
        let _ = writer_task.await;
        result
    }

    async fn read_loop(&self, connection: ConnectionId, reader: &mut FrameReader) -> anyhow::Result<()> {
        loop {
            let payload = match reader.recv_raw().await {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(%connection, error = %e, "Read ended");
                    return Ok(());
                }
            };
            let msg: ClientMsg = match serde_json::from_slice(&payload) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(%connection, error = %e, "Malformed message skipped");
                    continue;
                }
            };

            let dispatches = match JoinRequest::from_msg(&msg) {
                Some(req) => {
                    let req = self.complete_join(req).await;
                    self.router.join(connection, req)
                }
                None => self.router.handle(connection, msg),
            };
            self.hub.deliver_all(dispatches);
        }
    }

    /// Fills a sparse first join from the character directory. Rejoins keep
    /// their live state.
    async fn complete_join(&self, req: JoinRequest) -> JoinRequest {
        let complete = req.sprite.is_some() && req.position.is_some() && !req.name.trim().is_empty();
        if complete || self.store.player(&req.character_id).is_some() {
            return req;
        }
        match self.directory.character(&req.character_id).await {
            Some(stored) => req.fill_from(&stored),
            None => req,
        }
    }

    /// Executes an operator console command.
    pub fn exec_console(&self, line: &str) -> ConsoleReply {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(command) = tokens.first() else {
            return ConsoleReply::Lines(Vec::new());
        };

        match *command {
            "status" => {
                let mut out = vec![
                    format!("Connections: {}", self.hub.len()),
                    format!("Players: {}", self.store.player_count()),
                    format!(
                        "Enemies: {} (cap {})",
                        self.store.enemy_count(),
                        self.cfg.world.max_enemies
                    ),
                ];
                for p in self.store.player_snapshot() {
                    out.push(format!(
                        "  {} '{}' at ({:.1}, {:.1}) hp {}/{}",
                        p.id, p.name, p.x, p.y, p.health, p.max_health
                    ));
                }
                ConsoleReply::Lines(out)
            }
            "spawn" => {
                let count = match tokens.get(1).map(|n| n.parse::<usize>()) {
                    None => 1,
                    Some(Ok(n)) => n,
                    Some(Err(_)) => {
                        return ConsoleReply::Lines(vec!["Usage: spawn [count]".to_string()])
                    }
                };
                let mut rng = rand::thread_rng();
                let now = self.clock.now_ms();
                for _ in 0..count {
                    let msg = spawner::spawn_one(&self.store, &self.cfg.world, &mut rng, now);
                    self.hub.deliver(Dispatch::everyone(msg));
                }
                ConsoleReply::Lines(vec![format!(
                    "Spawned {count}, population {}",
                    self.store.enemy_count()
                )])
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                ConsoleReply::Quit
            }
            other => ConsoleReply::Lines(vec![format!(
                "Unknown command '{other}'. Commands: status, spawn [count], quit"
            )]),
        }
    }
}

async fn write_loop(
    connection: ConnectionId,
    mut writer: FrameWriter,
    mut outbox: mpsc::UnboundedReceiver<ServerMsg>,
) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = writer.send(&msg).await {
            debug!(%connection, error = %e, "Write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Helper for tests: a server on an ephemeral localhost port.
pub async fn bind_ephemeral(
    world: WorldTuning,
    directory: Arc<dyn CharacterDirectory>,
) -> anyhow::Result<GameServer> {
    let cfg = ServerConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        world,
        ..ServerConfig::default()
    };
    let mut server = GameServer::bind(cfg, directory).await?;
    server.cfg.server_addr = server.local_addr()?.to_string();
    Ok(server)
}
