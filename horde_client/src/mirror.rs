//! Client-side copy of the world.
//!
//! The server is authoritative; the mirror only applies what it is told.
//! Players change on events, enemies on events plus the periodic snapshot.

use std::collections::BTreeMap;

use horde_shared::{
    math::Vec2,
    net::{CharacterId, EnemyId, EnemyView, PlayerView, ServerMsg},
};

#[derive(Debug, Default)]
pub struct WorldMirror {
    pub players: BTreeMap<CharacterId, PlayerView>,
    pub enemies: BTreeMap<EnemyId, EnemyView>,
    /// Most recent chat lines, oldest first.
    pub chat: Vec<String>,
}

const CHAT_HISTORY: usize = 50;

impl WorldMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::Roster { players } => {
                self.players = players.iter().map(|p| (p.id.clone(), p.clone())).collect();
            }
            ServerMsg::EnemyRoster { enemies } | ServerMsg::EnemiesTick { enemies } => {
                self.enemies = enemies.iter().map(|e| (e.id, e.clone())).collect();
            }
            ServerMsg::PlayerJoined { player } => {
                self.players.insert(player.id.clone(), player.clone());
            }
            ServerMsg::PlayerMoved { id, x, y } => {
                if let Some(p) = self.players.get_mut(id) {
                    p.x = *x;
                    p.y = *y;
                }
            }
            ServerMsg::PlayerLeft { id } => {
                self.players.remove(id);
            }
            ServerMsg::PlayerDamaged {
                player_id,
                current_health,
                max_health,
                ..
            } => {
                if let Some(p) = self.players.get_mut(player_id) {
                    p.health = *current_health;
                    p.max_health = *max_health;
                }
            }
            ServerMsg::PlayerDied { player_id } => {
                if let Some(p) = self.players.get_mut(player_id) {
                    p.health = 0.0;
                }
            }
            ServerMsg::EnemySpawned { enemy } => {
                self.enemies.insert(enemy.id, enemy.clone());
            }
            ServerMsg::EnemyDamaged {
                enemy_id,
                current_health,
                max_health,
            } => {
                if let Some(e) = self.enemies.get_mut(enemy_id) {
                    e.current_health = *current_health;
                    e.max_health = *max_health;
                }
            }
            ServerMsg::EnemyDied { enemy_id, .. } => {
                self.enemies.remove(enemy_id);
            }
            ServerMsg::ChatBroadcast(env) => {
                self.chat.push(format!("{}: {}", env.name, env.message));
                if self.chat.len() > CHAT_HISTORY {
                    self.chat.remove(0);
                }
            }
            ServerMsg::Welcome { .. } | ServerMsg::Rejected { .. } | ServerMsg::ProjectileSpawned(_) => {}
        }
    }

    /// Closest enemy to `from` within `range`.
    pub fn nearest_enemy(&self, from: Vec2, range: f32) -> Option<&EnemyView> {
        self.enemies
            .values()
            .map(|e| (e, from.distance(Vec2::new(e.x, e.y))))
            .filter(|(_, d)| *d <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(e, _)| e)
    }
}
