//! Enemy spawner.

use horde_shared::{config::WorldTuning, math::Vec2, net::ServerMsg};
use rand::Rng;
use tracing::debug;

use crate::{
    enemy::{EnemyRecord, EnemyVariant},
    sim::random_direction,
    store::WorldStore,
};

/// Creates one enemy and returns its `enemy-spawned` announcement.
///
/// Half of all enemies start mid-walk and half start paused, with the last
/// transition pushed back by a random amount so they fall out of step.
pub fn spawn_one(store: &WorldStore, tuning: &WorldTuning, rng: &mut impl Rng, now: u64) -> ServerMsg {
    let id = store.next_enemy_id();
    let variant = EnemyVariant::for_spawn(id.0);
    let h = tuning.spawn_half_extent.abs();
    let position = if h > 0.0 {
        Vec2::new(rng.gen_range(-h..=h), rng.gen_range(-h..=h))
    } else {
        Vec2::ZERO
    };

    let mut enemy = EnemyRecord::new(id, variant, position);
    if rng.gen_bool(0.5) {
        enemy.set_direction(random_direction(rng));
        enemy.movement.moving = true;
        enemy.movement.last_change_ms = Some(now.saturating_sub(backdate(rng, tuning.moving_backdate_ms)));
    } else {
        enemy.movement.last_change_ms = Some(now.saturating_sub(backdate(rng, tuning.paused_backdate_ms)));
    }

    let view = enemy.view();
    store.insert_enemy(enemy);
    debug!(enemy = %id, sprite = variant.sprite(), x = position.x, y = position.y, "Enemy spawned");
    ServerMsg::EnemySpawned { enemy: view }
}

fn backdate(rng: &mut impl Rng, max_ms: u64) -> u64 {
    if max_ms == 0 {
        0
    } else {
        rng.gen_range(0..=max_ms)
    }
}

/// Seeds the starting population.
pub fn seed_initial(store: &WorldStore, tuning: &WorldTuning, rng: &mut impl Rng, now: u64) -> Vec<ServerMsg> {
    (0..tuning.initial_enemies)
        .map(|_| spawn_one(store, tuning, rng, now))
        .collect()
}

/// Spawns one enemy if the population is below the cap.
pub fn admit(store: &WorldStore, tuning: &WorldTuning, rng: &mut impl Rng, now: u64) -> Option<ServerMsg> {
    (store.enemy_count() < tuning.max_enemies).then(|| spawn_one(store, tuning, rng, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn initial_population_cycles_variants_within_bounds() {
        let store = WorldStore::new();
        let tuning = WorldTuning::default();
        let mut rng = StdRng::seed_from_u64(1);
        let spawned = seed_initial(&store, &tuning, &mut rng, 60_000);
        assert_eq!(spawned.len(), 20);
        assert_eq!(store.enemy_count(), 20);

        for (n, enemy) in store.enemy_snapshot().iter().enumerate() {
            let expected = EnemyVariant::CYCLE[n % 5];
            assert_eq!(enemy.sprite, expected.sprite());
            assert_eq!(enemy.max_health, expected.max_health());
            assert_eq!(enemy.current_health, enemy.max_health);
            assert!(enemy.x.abs() <= 1000.0 && enemy.y.abs() <= 1000.0);
        }
    }

    #[test]
    fn spawned_enemies_are_backdated() {
        let store = WorldStore::new();
        let tuning = WorldTuning::default();
        let mut rng = StdRng::seed_from_u64(2);
        let now = 60_000;
        seed_initial(&store, &tuning, &mut rng, now);

        for id in store.enemy_ids() {
            let e = store.enemy(id).unwrap();
            let last = e.movement.last_change_ms.unwrap();
            if e.movement.moving {
                assert!(now - last <= tuning.moving_backdate_ms);
                assert!((e.movement.direction.len() - 1.0).abs() < 1e-5);
            } else {
                assert!(now - last <= tuning.paused_backdate_ms);
            }
        }
    }

    #[test]
    fn admission_stops_at_cap() {
        let store = WorldStore::new();
        let tuning = WorldTuning {
            max_enemies: 3,
            ..WorldTuning::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let admitted = (0..5)
            .filter_map(|_| admit(&store, &tuning, &mut rng, 0))
            .count();
        assert_eq!(admitted, 3);
        assert_eq!(store.enemy_count(), 3);
    }

    #[test]
    fn announcement_matches_store() {
        let store = WorldStore::new();
        let mut rng = StdRng::seed_from_u64(4);
        let ServerMsg::EnemySpawned { enemy } = spawn_one(&store, &WorldTuning::default(), &mut rng, 0) else {
            panic!("expected enemy-spawned");
        };
        assert_eq!(store.enemy(enemy.id).map(|e| e.view()), Some(enemy));
    }
}
