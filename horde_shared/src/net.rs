//! Networking primitives.
//!
//! Goals:
//! - Provide a reliable, ordered, bidirectional channel (TCP with
//!   length-prefixed JSON frames).
//! - Provide the closed set of inbound (`ClientMsg`) and outbound
//!   (`ServerMsg`) message kinds.
//! - Keep serialization explicit and versionable.

use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

/// Protocol version for handshake compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Version of the outbound player/enemy view schema.
pub const SCHEMA_VERSION: u32 = 2;

/// Largest frame body accepted on either side.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport connection. A reconnecting player gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new_unique() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Stable player identity, independent of the transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        CharacterId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(s: &str) -> Self {
        CharacterId(s.to_string())
    }
}

/// Server-generated enemy id. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyId(pub u64);

impl fmt::Display for EnemyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enemy_{}", self.0)
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// First frame on every connection.
    Hello { protocol: u32 },
    Join {
        character_id: CharacterId,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sprite: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f32>,
    },
    Move { x: f32, y: f32 },
    Chat { message: String },
    /// Damage with explicit attacker attribution.
    Damage {
        enemy_id: EnemyId,
        damage: f32,
        attacker_character_id: CharacterId,
    },
    /// Damage attributed to the sending connection's character.
    EnemyDamage { enemy_id: EnemyId, damage: f32 },
    Projectile(ProjectileView),
    RequestRoster,
    RequestEnemies,
}

/// Server -> client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMsg {
    Welcome {
        connection_id: ConnectionId,
        schema_version: u32,
    },
    /// Handshake refused; the server closes the connection afterwards.
    Rejected { reason: String },
    Roster { players: Vec<PlayerView> },
    EnemyRoster { enemies: Vec<EnemyView> },
    PlayerJoined { player: PlayerView },
    PlayerMoved { id: CharacterId, x: f32, y: f32 },
    PlayerLeft { id: CharacterId },
    ChatBroadcast(ChatEnvelope),
    EnemySpawned { enemy: EnemyView },
    EnemiesTick { enemies: Vec<EnemyView> },
    EnemyDamaged {
        enemy_id: EnemyId,
        current_health: f32,
        max_health: f32,
    },
    EnemyDied {
        enemy_id: EnemyId,
        x: f32,
        y: f32,
        killer_character_id: CharacterId,
    },
    PlayerDamaged {
        player_id: CharacterId,
        current_health: f32,
        max_health: f32,
        damage: f32,
    },
    PlayerDied { player_id: CharacterId },
    ProjectileSpawned(ProjectileView),
}

/// Public view of a player record. The connection of record stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerView {
    pub id: CharacterId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub max_health: f32,
}

/// Coarse behaviour state of an enemy, for client animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnemyPhase {
    Paused,
    Moving,
    Attacking,
}

/// Public view of an enemy record. Every enemy message uses this one schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnemyView {
    pub id: EnemyId,
    pub x: f32,
    pub y: f32,
    pub sprite: String,
    pub max_health: f32,
    pub current_health: f32,
    pub phase: EnemyPhase,
    pub direction_x: f32,
    pub direction_y: f32,
    /// Facing angle in radians. Only meaningful for variants that rotate.
    pub facing: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<CharacterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatEnvelope {
    pub character_id: CharacterId,
    pub name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A cosmetic projectile, relayed as-is to the other clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectileView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub speed: f32,
    pub character_id: CharacterId,
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let payload = read_frame(&mut self.stream).await?;
        serde_json::from_slice(&payload).context("deserialize msg")
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { read }, FrameWriter { write })
    }
}

/// Read half of a split [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    read: OwnedReadHalf,
}

impl FrameReader {
    /// Reads the next frame body without decoding it.
    pub async fn recv_raw(&mut self) -> anyhow::Result<Vec<u8>> {
        read_frame(&mut self.read).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let payload = self.recv_raw().await?;
        serde_json::from_slice(&payload).context("deserialize msg")
    }
}

/// Write half of a split [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    write: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        write_frame(&mut self.write, msg).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.write.shutdown().await.context("tcp shutdown")
    }
}

async fn write_frame<W, T>(w: &mut W, msg: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    if payload.len() > MAX_FRAME_LEN {
        anyhow::bail!("frame of {} bytes exceeds limit", payload.len());
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R>(r: &mut R) -> anyhow::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame of {len} bytes exceeds limit");
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(payload)
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_uses_kebab_case_tags() {
        let msg: ClientMsg =
            decode_from_bytes(br#"{"type":"request-roster"}"#).unwrap();
        assert_eq!(msg, ClientMsg::RequestRoster);

        let msg: ClientMsg = decode_from_bytes(
            br#"{"type":"join","character_id":"c1","name":"Ann"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMsg::Join {
                character_id: CharacterId::from("c1"),
                name: "Ann".to_string(),
                sprite: None,
                x: None,
                y: None,
            }
        );
    }

    #[test]
    fn unknown_message_kind_is_rejected() {
        let res: anyhow::Result<ClientMsg> = decode_from_bytes(br#"{"type":"teleport"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn enemy_id_serializes_as_number() {
        let bytes = encode_to_bytes(&ServerMsg::PlayerDied {
            player_id: CharacterId::from("c9"),
        })
        .unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text, r#"{"type":"player-died","player_id":"c9"}"#);

        let bytes = encode_to_bytes(&EnemyId(7)).unwrap();
        assert_eq!(&bytes[..], b"7");
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new_unique();
        let b = ConnectionId::new_unique();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn frames_survive_a_split_connection() -> anyhow::Result<()> {
        let listener = ReliableListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;

        let accept = tokio::spawn(async move {
            let (conn, _) = listener.accept().await?;
            let (mut reader, mut writer) = conn.into_split();
            let msg: ClientMsg = reader.recv().await?;
            writer
                .send(&ServerMsg::Rejected {
                    reason: format!("{msg:?}"),
                })
                .await?;
            Ok::<_, anyhow::Error>(())
        });

        let mut client = ReliableConn::connect(addr).await?;
        client.send(&ClientMsg::RequestEnemies).await?;
        let reply: ServerMsg = client.recv().await?;
        assert_eq!(
            reply,
            ServerMsg::Rejected {
                reason: "RequestEnemies".to_string()
            }
        );
        accept.await??;
        Ok(())
    }
}
