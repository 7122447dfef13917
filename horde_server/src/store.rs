//! World state store.
//!
//! Single owner of every player and enemy record. Records live in sharded
//! concurrent maps, so each one is mutated under its own shard lock and never
//! observed half-written. The connection registry is kept inside the store
//! and only changes together with the player map.
//!
//! Lock order: enemy record before player record, player record before the
//! registry. Nothing here awaits while holding a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{mapref::entry::Entry, DashMap};
use horde_shared::{
    math::Vec2,
    net::{CharacterId, ConnectionId, EnemyId, EnemyView, PlayerView},
};
use tracing::debug;

use crate::{
    enemy::{DamageOutcome, EnemyRecord},
    player::{JoinRequest, PlayerRecord},
    registry::ConnectionRegistry,
};

/// What a `join` did.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// False when an existing record was rebound.
    pub created: bool,
    pub player: PlayerView,
    /// Record removed because this connection previously played it.
    pub displaced: Option<CharacterId>,
    /// Connection that lost the character to this one.
    pub revoked: Option<ConnectionId>,
}

/// Result of damaging an enemy that exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyHit {
    pub outcome: DamageOutcome,
    /// Position at the moment of the hit.
    pub position: Vec2,
}

pub struct WorldStore {
    players: DashMap<CharacterId, PlayerRecord>,
    enemies: DashMap<EnemyId, EnemyRecord>,
    registry: ConnectionRegistry,
    next_enemy: AtomicU64,
}

impl Default for WorldStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldStore {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
            enemies: DashMap::new(),
            registry: ConnectionRegistry::new(),
            next_enemy: AtomicU64::new(1),
        }
    }

    pub fn resolve(&self, connection: ConnectionId) -> Option<CharacterId> {
        self.registry.resolve(connection)
    }

    pub fn connection_of(&self, character: &CharacterId) -> Option<ConnectionId> {
        self.registry.connection_of(character)
    }

    /// Creates the player or rebinds an existing one to `connection`.
    pub fn join(&self, connection: ConnectionId, req: JoinRequest, max_health: f32) -> JoinOutcome {
        let mut displaced = None;
        if let Some(previous) = self.registry.resolve(connection) {
            if previous != req.character_id {
                self.registry.unbind(connection);
                if self
                    .players
                    .remove_if(&previous, |_, p| p.connection == connection)
                    .is_some()
                {
                    debug!(character = %previous, %connection, "Connection switched character");
                    displaced = Some(previous);
                }
            }
        }

        let (created, player, revoked) = match self.players.entry(req.character_id.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.rejoin(connection, &req, max_health);
                let revoked = self.registry.bind(connection, &req.character_id);
                (false, record.view(), revoked)
            }
            Entry::Vacant(entry) => {
                let record = PlayerRecord::new(connection, &req, max_health);
                let revoked = self.registry.bind(connection, &req.character_id);
                let view = record.view();
                entry.insert(record);
                (true, view, revoked)
            }
        };

        JoinOutcome {
            created,
            player,
            displaced,
            revoked,
        }
    }

    /// Drops `connection`. The player record is removed only if this is still
    /// its connection of record.
    pub fn leave(&self, connection: ConnectionId) -> Option<PlayerRecord> {
        let character = self.registry.unbind(connection)?;
        self.players
            .remove_if(&character, |_, p| p.connection == connection)
            .map(|(_, record)| record)
    }

    pub fn player(&self, id: &CharacterId) -> Option<PlayerRecord> {
        self.players.get(id).map(|p| p.clone())
    }

    /// Runs `f` on the player record under its lock.
    pub fn with_player_mut<R>(
        &self,
        id: &CharacterId,
        f: impl FnOnce(&mut PlayerRecord) -> R,
    ) -> Option<R> {
        self.players.get_mut(id).map(|mut p| f(p.value_mut()))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Every player, sorted by character id.
    pub fn player_snapshot(&self) -> Vec<PlayerView> {
        let mut players: Vec<PlayerView> = self.players.iter().map(|p| p.view()).collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    pub fn next_enemy_id(&self) -> EnemyId {
        EnemyId(self.next_enemy.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert_enemy(&self, enemy: EnemyRecord) {
        self.enemies.insert(enemy.id, enemy);
    }

    pub fn enemy(&self, id: EnemyId) -> Option<EnemyRecord> {
        self.enemies.get(&id).map(|e| e.clone())
    }

    pub fn remove_enemy(&self, id: EnemyId) -> Option<EnemyRecord> {
        self.enemies.remove(&id).map(|(_, e)| e)
    }

    /// Runs `f` on the enemy record under its lock.
    pub fn with_enemy_mut<R>(&self, id: EnemyId, f: impl FnOnce(&mut EnemyRecord) -> R) -> Option<R> {
        self.enemies.get_mut(&id).map(|mut e| f(e.value_mut()))
    }

    /// Ledger update, health change and removal at zero as one locked step.
    pub fn damage_enemy(&self, id: EnemyId, attacker: &CharacterId, amount: f32) -> Option<EnemyHit> {
        match self.enemies.entry(id) {
            Entry::Occupied(mut entry) => {
                let enemy = entry.get_mut();
                let outcome = enemy.apply_damage(attacker, amount);
                let position = enemy.position;
                if enemy.is_dead() {
                    entry.remove();
                }
                Some(EnemyHit { outcome, position })
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn enemy_ids(&self) -> Vec<EnemyId> {
        let mut ids: Vec<EnemyId> = self.enemies.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    /// Every enemy, sorted by id.
    pub fn enemy_snapshot(&self) -> Vec<EnemyView> {
        let mut enemies: Vec<EnemyView> = self.enemies.iter().map(|e| e.view()).collect();
        enemies.sort_by_key(|e| e.id);
        enemies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemy::EnemyVariant;

    fn join_req(id: &str) -> JoinRequest {
        JoinRequest {
            character_id: CharacterId::from(id),
            name: id.to_uppercase(),
            sprite: None,
            position: None,
        }
    }

    #[test]
    fn reconnect_rebinds_without_duplicating() {
        let store = WorldStore::new();
        let first = store.join(ConnectionId(1), join_req("c1"), 100.0);
        assert!(first.created);

        let second = store.join(ConnectionId(2), join_req("c1"), 100.0);
        assert!(!second.created);
        assert_eq!(second.revoked, Some(ConnectionId(1)));
        assert_eq!(store.player_count(), 1);
        assert_eq!(store.resolve(ConnectionId(1)), None);
        assert_eq!(store.resolve(ConnectionId(2)), Some(CharacterId::from("c1")));
    }

    #[test]
    fn stale_leave_keeps_the_player() {
        let store = WorldStore::new();
        store.join(ConnectionId(1), join_req("c1"), 100.0);
        store.join(ConnectionId(2), join_req("c1"), 100.0);

        assert!(store.leave(ConnectionId(1)).is_none());
        assert_eq!(store.player_count(), 1);

        let gone = store.leave(ConnectionId(2)).map(|p| p.id);
        assert_eq!(gone, Some(CharacterId::from("c1")));
        assert_eq!(store.player_count(), 0);
        assert_eq!(store.connection_of(&CharacterId::from("c1")), None);
    }

    #[test]
    fn switching_character_displaces_the_old_record() {
        let store = WorldStore::new();
        store.join(ConnectionId(1), join_req("a"), 100.0);
        let out = store.join(ConnectionId(1), join_req("b"), 100.0);

        assert_eq!(out.displaced, Some(CharacterId::from("a")));
        assert!(store.player(&CharacterId::from("a")).is_none());
        let ids: Vec<String> = store.player_snapshot().into_iter().map(|p| p.id.0).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn damage_removes_enemy_at_zero() {
        let store = WorldStore::new();
        let id = store.next_enemy_id();
        store.insert_enemy(EnemyRecord::new(id, EnemyVariant::Enemy1, Vec2::new(3.0, 4.0)));
        let c1 = CharacterId::from("c1");

        let hit = store.damage_enemy(id, &c1, 60.0).unwrap();
        assert_eq!(hit.outcome.current_health, 40.0);
        assert!(!hit.outcome.killed);

        let hit = store.damage_enemy(id, &c1, 60.0).unwrap();
        assert!(hit.outcome.killed);
        assert_eq!(hit.position, Vec2::new(3.0, 4.0));
        assert!(store.enemy(id).is_none());
        assert!(store.damage_enemy(id, &c1, 1.0).is_none());
        assert!(store.enemy_snapshot().is_empty());
    }

    #[test]
    fn enemy_ids_are_monotonic_and_snapshots_sorted() {
        let store = WorldStore::new();
        let ids: Vec<EnemyId> = (0..4).map(|_| store.next_enemy_id()).collect();
        assert_eq!(ids, [EnemyId(1), EnemyId(2), EnemyId(3), EnemyId(4)]);

        for id in ids.iter().rev() {
            store.insert_enemy(EnemyRecord::new(*id, EnemyVariant::Enemy2, Vec2::ZERO));
        }
        store.remove_enemy(EnemyId(2));
        let seen: Vec<EnemyId> = store.enemy_snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(seen, [EnemyId(1), EnemyId(3), EnemyId(4)]);
        assert_eq!(store.next_enemy_id(), EnemyId(5));
    }

    #[test]
    fn concurrent_damage_kills_exactly_once() {
        let store = std::sync::Arc::new(WorldStore::new());
        let id = store.next_enemy_id();
        store.insert_enemy(EnemyRecord::new(id, EnemyVariant::Enemy1, Vec2::ZERO));

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let who = CharacterId::new(format!("c{n}"));
                    (0..10)
                        .filter_map(|_| store.damage_enemy(id, &who, 3.0))
                        .filter(|hit| hit.outcome.killed)
                        .count()
                })
            })
            .collect();
        let kills: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(kills, 1);
        assert!(store.enemy(id).is_none());
    }
}
