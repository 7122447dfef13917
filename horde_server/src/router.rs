//! Inbound message dispatch.
//!
//! The router turns one inbound message into store mutations plus a list of
//! outbound [`Dispatch`]es. It never touches sockets and never awaits, so the
//! same code runs under the connection tasks and in plain unit tests.
//!
//! Messages from a connection with no bound character, for an enemy that no
//! longer exists, or from a superseded connection are dropped.

use std::sync::Arc;

use chrono::Utc;
use horde_shared::{
    config::WorldTuning,
    math::Vec2,
    net::{CharacterId, ChatEnvelope, ClientMsg, ConnectionId, EnemyId, ServerMsg},
};
use tracing::{debug, info};

use crate::{
    hub::Dispatch,
    player::JoinRequest,
    policy::{InputPolicy, TrustClient},
    store::WorldStore,
};

pub struct EventRouter {
    store: Arc<WorldStore>,
    tuning: WorldTuning,
    policy: Arc<dyn InputPolicy>,
}

impl EventRouter {
    pub fn new(store: Arc<WorldStore>, tuning: WorldTuning) -> Self {
        Self::with_policy(store, tuning, Arc::new(TrustClient))
    }

    pub fn with_policy(
        store: Arc<WorldStore>,
        tuning: WorldTuning,
        policy: Arc<dyn InputPolicy>,
    ) -> Self {
        Self {
            store,
            tuning,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<WorldStore> {
        &self.store
    }

    /// Initial sync for a fresh connection.
    pub fn connected(&self, connection: ConnectionId) -> Vec<Dispatch> {
        vec![
            Dispatch::only(
                connection,
                ServerMsg::Roster {
                    players: self.store.player_snapshot(),
                },
            ),
            Dispatch::only(
                connection,
                ServerMsg::EnemyRoster {
                    enemies: self.store.enemy_snapshot(),
                },
            ),
        ]
    }

    pub fn handle(&self, connection: ConnectionId, msg: ClientMsg) -> Vec<Dispatch> {
        match msg {
            ClientMsg::Hello { .. } => {
                debug!(%connection, "Repeated hello ignored");
                Vec::new()
            }
            ClientMsg::Join { .. } => match JoinRequest::from_msg(&msg) {
                Some(req) => self.join(connection, req),
                None => Vec::new(),
            },
            ClientMsg::Move { x, y } => self.on_move(connection, Vec2::new(x, y)),
            ClientMsg::Chat { message } => self.on_chat(connection, message),
            ClientMsg::Damage {
                enemy_id,
                damage,
                attacker_character_id,
            } => {
                if self.resolve(connection).is_none() {
                    return Vec::new();
                }
                self.on_damage(enemy_id, &attacker_character_id, damage)
            }
            ClientMsg::EnemyDamage { enemy_id, damage } => match self.resolve(connection) {
                Some(attacker) => self.on_damage(enemy_id, &attacker, damage),
                None => Vec::new(),
            },
            ClientMsg::Projectile(projectile) => {
                if self.resolve(connection).is_none() {
                    return Vec::new();
                }
                vec![Dispatch::everyone_except(
                    connection,
                    ServerMsg::ProjectileSpawned(projectile),
                )]
            }
            ClientMsg::RequestRoster => vec![Dispatch::only(
                connection,
                ServerMsg::Roster {
                    players: self.store.player_snapshot(),
                },
            )],
            ClientMsg::RequestEnemies => vec![Dispatch::only(
                connection,
                ServerMsg::EnemyRoster {
                    enemies: self.store.enemy_snapshot(),
                },
            )],
        }
    }

    pub fn join(&self, connection: ConnectionId, req: JoinRequest) -> Vec<Dispatch> {
        let character = req.character_id.clone();
        let outcome = self
            .store
            .join(connection, req, self.tuning.player_max_health);

        let mut out = Vec::new();
        if let Some(displaced) = outcome.displaced {
            out.push(Dispatch::everyone_except(
                connection,
                ServerMsg::PlayerLeft { id: displaced },
            ));
        }
        if outcome.created {
            info!(%character, %connection, name = %outcome.player.name, "Player joined");
            out.push(Dispatch::everyone_except(
                connection,
                ServerMsg::PlayerJoined {
                    player: outcome.player,
                },
            ));
        } else {
            info!(%character, %connection, revoked = ?outcome.revoked, "Player rejoined");
        }

        let players = self
            .store
            .player_snapshot()
            .into_iter()
            .filter(|p| p.id != character)
            .collect();
        out.push(Dispatch::only(connection, ServerMsg::Roster { players }));
        out.push(Dispatch::only(
            connection,
            ServerMsg::EnemyRoster {
                enemies: self.store.enemy_snapshot(),
            },
        ));
        out
    }

    /// Transport closed. Only the connection of record takes the player with it.
    pub fn disconnected(&self, connection: ConnectionId) -> Vec<Dispatch> {
        match self.store.leave(connection) {
            Some(player) => {
                info!(character = %player.id, %connection, "Player left");
                vec![Dispatch::everyone(ServerMsg::PlayerLeft { id: player.id })]
            }
            None => {
                debug!(%connection, "Disconnect without a live player");
                Vec::new()
            }
        }
    }

    fn resolve(&self, connection: ConnectionId) -> Option<CharacterId> {
        let character = self.store.resolve(connection);
        if character.is_none() {
            debug!(%connection, "Message from unbound connection dropped");
        }
        character
    }

    fn on_move(&self, connection: ConnectionId, to: Vec2) -> Vec<Dispatch> {
        let Some(character) = self.resolve(connection) else {
            return Vec::new();
        };
        let moved = self.store.with_player_mut(&character, |p| {
            if p.connection != connection {
                return None;
            }
            let to = self.policy.accept_move(p, to)?;
            p.position = to;
            Some(to)
        });
        match moved.flatten() {
            Some(at) => vec![Dispatch::everyone(ServerMsg::PlayerMoved {
                id: character,
                x: at.x,
                y: at.y,
            })],
            None => {
                debug!(%character, %connection, "Move dropped");
                Vec::new()
            }
        }
    }

    fn on_chat(&self, connection: ConnectionId, message: String) -> Vec<Dispatch> {
        let Some(character) = self.resolve(connection) else {
            return Vec::new();
        };
        let Some(name) = self.store.player(&character).map(|p| p.name) else {
            return Vec::new();
        };
        vec![Dispatch::everyone(ServerMsg::ChatBroadcast(ChatEnvelope {
            character_id: character,
            name,
            message,
            timestamp: Utc::now(),
        }))]
    }

    fn on_damage(&self, enemy_id: EnemyId, attacker: &CharacterId, damage: f32) -> Vec<Dispatch> {
        let Some(damage) = self.policy.accept_damage(enemy_id, attacker, damage) else {
            return Vec::new();
        };
        let Some(hit) = self.store.damage_enemy(enemy_id, attacker, damage) else {
            debug!(enemy = %enemy_id, "Damage for unknown enemy dropped");
            return Vec::new();
        };

        let mut out = vec![Dispatch::everyone(ServerMsg::EnemyDamaged {
            enemy_id,
            current_health: hit.outcome.current_health,
            max_health: hit.outcome.max_health,
        })];
        if hit.outcome.killed {
            info!(enemy = %enemy_id, killer = %attacker, "Enemy died");
            out.push(Dispatch::everyone(ServerMsg::EnemyDied {
                enemy_id,
                x: hit.position.x,
                y: hit.position.y,
                killer_character_id: attacker.clone(),
            }));
        }
        out
    }
}
