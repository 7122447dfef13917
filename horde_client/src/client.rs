//! Client implementation.
//!
//! The client maintains:
//! - One reliable stream to the server (handshake, commands, events)
//! - A reader task feeding an inbox, so receiving with a timeout never
//!   cuts a frame in half
//! - A [`WorldMirror`] updated from every message it receives
//! - The character it joined as, if any

use std::net::SocketAddr;
use std::time::Duration;

use horde_shared::{
    math::Vec2,
    net::{
        CharacterId, ClientMsg, ConnectionId, EnemyId, FrameWriter, ProjectileView, ReliableConn,
        ServerMsg, PROTOCOL_VERSION,
    },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::mirror::WorldMirror;

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Handshake done, not joined yet.
    Connected,
    /// Playing as a character.
    Joined(CharacterId),
    /// Server closed the stream.
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub connection_id: ConnectionId,
    pub schema_version: u32,
    pub state: ClientState,
    pub world: WorldMirror,
    /// Last position this client reported.
    pub position: Vec2,
    peer: SocketAddr,
    writer: FrameWriter,
    inbox: mpsc::UnboundedReceiver<ServerMsg>,
    reader: JoinHandle<()>,
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl GameClient {
    /// Connects and performs the `hello` handshake.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        Self::connect_with_protocol(addr, PROTOCOL_VERSION).await
    }

    pub async fn connect_with_protocol(addr: SocketAddr, protocol: u32) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&ClientMsg::Hello { protocol }).await?;

        let (connection_id, schema_version) = match conn.recv().await? {
            ServerMsg::Welcome {
                connection_id,
                schema_version,
            } => (connection_id, schema_version),
            ServerMsg::Rejected { reason } => anyhow::bail!("rejected by server: {reason}"),
            other => anyhow::bail!("expected welcome, got {other:?}"),
        };
        info!(%connection_id, schema_version, "Connected to server");

        let peer = conn.peer_addr()?;
        let (mut frames, writer) = conn.into_split();
        let (tx, inbox) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            loop {
                match frames.recv::<ServerMsg>().await {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Server stream ended");
                        return;
                    }
                }
            }
        });

        Ok(Self {
            connection_id,
            schema_version,
            state: ClientState::Connected,
            world: WorldMirror::new(),
            position: Vec2::ZERO,
            peer,
            writer,
            inbox,
            reader,
        })
    }

    pub async fn send(&mut self, msg: &ClientMsg) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    /// Closes the write side; the server sees a disconnect.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await
    }

    pub async fn join(
        &mut self,
        character_id: &CharacterId,
        name: &str,
        sprite: Option<&str>,
        at: Option<Vec2>,
    ) -> anyhow::Result<()> {
        self.send(&ClientMsg::Join {
            character_id: character_id.clone(),
            name: name.to_string(),
            sprite: sprite.map(str::to_string),
            x: at.map(|p| p.x),
            y: at.map(|p| p.y),
        })
        .await?;
        if let Some(at) = at {
            self.position = at;
        }
        self.state = ClientState::Joined(character_id.clone());
        Ok(())
    }

    pub async fn move_to(&mut self, to: Vec2) -> anyhow::Result<()> {
        self.send(&ClientMsg::Move { x: to.x, y: to.y }).await?;
        self.position = to;
        Ok(())
    }

    pub async fn chat(&mut self, message: &str) -> anyhow::Result<()> {
        self.send(&ClientMsg::Chat {
            message: message.to_string(),
        })
        .await
    }

    /// Damage attributed to this client's own character.
    pub async fn hit_enemy(&mut self, enemy_id: EnemyId, damage: f32) -> anyhow::Result<()> {
        self.send(&ClientMsg::EnemyDamage { enemy_id, damage }).await
    }

    pub async fn fire(&mut self, projectile: ProjectileView) -> anyhow::Result<()> {
        self.send(&ClientMsg::Projectile(projectile)).await
    }

    /// Receives one message and applies it to the mirror.
    pub async fn recv(&mut self) -> anyhow::Result<ServerMsg> {
        match self.inbox.recv().await {
            Some(msg) => {
                self.world.apply(&msg);
                Ok(msg)
            }
            None => {
                if self.state != ClientState::Disconnected {
                    warn!(connection = %self.connection_id, "Disconnected from server");
                }
                self.state = ClientState::Disconnected;
                anyhow::bail!("server closed the connection")
            }
        }
    }

    /// Like [`GameClient::recv`], but `None` if nothing arrives in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerMsg>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Receives until `pred` matches, skipping everything else.
    /// `None` once `timeout` has elapsed in total.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&ServerMsg) -> bool,
    ) -> anyhow::Result<Option<ServerMsg>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.recv_timeout(left).await? {
                Some(msg) if pred(&msg) => return Ok(Some(msg)),
                Some(other) => debug!(?other, "Skipped while waiting"),
                None => return Ok(None),
            }
        }
    }

    pub fn character(&self) -> Option<&CharacterId> {
        match &self.state {
            ClientState::Joined(id) => Some(id),
            _ => None,
        }
    }

    pub fn server_peer(&self) -> SocketAddr {
        self.peer
    }
}
