//! Enemy simulation.
//!
//! One call to [`EnemySimulation::tick`] advances every enemy's state machine
//! once and returns the events it produced. Each enemy is updated under its
//! own record lock; attacks then take the target player's lock (enemy before
//! player, never the reverse).
//!
//! Per enemy, per tick:
//! - no transition time yet: adopt `now` and stop,
//! - retarget to the top attacker in the damage ledger,
//! - live target in range: attack on cooldown,
//! - live target out of range: step toward it,
//! - otherwise: random walk (move for a while, pause for a while).

use std::sync::Arc;

use horde_shared::{
    config::WorldTuning,
    math::Vec2,
    net::{EnemyId, ServerMsg},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{clock::Clock, enemy::EnemyRecord, store::WorldStore};

pub struct EnemySimulation {
    store: Arc<WorldStore>,
    tuning: WorldTuning,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl EnemySimulation {
    pub fn new(store: Arc<WorldStore>, tuning: WorldTuning, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(store, tuning, clock, StdRng::from_entropy())
    }

    pub fn with_rng(
        store: Arc<WorldStore>,
        tuning: WorldTuning,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            tuning,
            clock,
            rng,
        }
    }

    /// Advances every enemy once. Returns player damage/death events.
    pub fn tick(&mut self) -> Vec<ServerMsg> {
        let now = self.clock.now_ms();
        let mut events = Vec::new();
        for id in self.store.enemy_ids() {
            self.advance(id, now, &mut events);
        }
        events
    }

    fn advance(&mut self, id: EnemyId, now: u64, events: &mut Vec<ServerMsg>) {
        let store = &self.store;
        let tuning = &self.tuning;
        let rng = &mut self.rng;
        // Enemies killed since `enemy_ids` was taken are simply gone.
        store.with_enemy_mut(id, |enemy| {
            if enemy.is_dead() {
                return;
            }
            let Some(last_change) = enemy.movement.last_change_ms else {
                enemy.movement.last_change_ms = Some(now);
                return;
            };

            if let Some(top) = enemy.ledger.top() {
                enemy.attack.target = Some(top.clone());
            }
            if enemy.attack.target.is_some() && chase(enemy, store, tuning, now, events) {
                return;
            }
            random_walk(enemy, last_change, tuning, now, rng);
        });
    }
}

/// Pursues or attacks the current target. Returns false, with the target
/// cleared, when the target is gone or dead.
fn chase(
    enemy: &mut EnemyRecord,
    store: &WorldStore,
    tuning: &WorldTuning,
    now: u64,
    events: &mut Vec<ServerMsg>,
) -> bool {
    let target = enemy
        .attack
        .target
        .as_ref()
        .and_then(|id| store.player(id))
        .filter(|p| p.is_alive());
    let Some(target) = target else {
        enemy.attack.target = None;
        enemy.attack.attacking = false;
        return false;
    };

    let delta = target.position - enemy.position;
    if delta.len() <= tuning.attack_range {
        enemy.movement.moving = false;
        enemy.movement.direction = Vec2::ZERO;
        enemy.attack.attacking = true;

        let ready = enemy
            .attack
            .last_attack_ms
            .map_or(true, |last| now.saturating_sub(last) >= tuning.attack_cooldown_ms);
        if ready {
            enemy.attack.last_attack_ms = Some(now);
            let hit = store.with_player_mut(&target.id, |p| {
                let left = p.take_damage(tuning.attack_damage);
                (left, p.max_health)
            });
            if let Some((current_health, max_health)) = hit {
                events.push(ServerMsg::PlayerDamaged {
                    player_id: target.id.clone(),
                    current_health,
                    max_health,
                    damage: tuning.attack_damage,
                });
                if current_health <= 0.0 {
                    events.push(ServerMsg::PlayerDied {
                        player_id: target.id.clone(),
                    });
                }
            }
        }
    } else {
        enemy.attack.attacking = false;
        enemy.movement.moving = true;
        let direction = delta.normalized();
        enemy.set_direction(direction);
        enemy.position = enemy.position + direction.scale(tuning.move_speed);
    }
    true
}

fn random_walk(
    enemy: &mut EnemyRecord,
    last_change: u64,
    tuning: &WorldTuning,
    now: u64,
    rng: &mut StdRng,
) {
    enemy.attack.attacking = false;
    let elapsed = now.saturating_sub(last_change);

    if enemy.movement.moving {
        if elapsed >= tuning.move_duration_ms {
            enemy.movement.moving = false;
            enemy.movement.direction = Vec2::ZERO;
            enemy.movement.last_change_ms = Some(now);
        } else {
            enemy.position = enemy.position + enemy.movement.direction.scale(tuning.move_speed);
        }
    } else if elapsed >= tuning.pause_duration_ms {
        enemy.set_direction(random_direction(rng));
        enemy.movement.moving = true;
        enemy.movement.last_change_ms = Some(now);
    }
}

/// Uniformly random unit vector.
pub fn random_direction(rng: &mut impl Rng) -> Vec2 {
    Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU))
}
