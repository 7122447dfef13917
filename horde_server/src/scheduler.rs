//! Timer-driven loops.
//!
//! Three independent tasks share the store and the hub:
//! - simulation: advances enemies and delivers the player damage it causes,
//! - broadcast: full enemy snapshot to everyone while any enemy exists,
//! - spawn: tops the population up toward the cap.
//!
//! All of them use `interval_at` with `MissedTickBehavior::Skip`, so a late
//! tick is dropped rather than replayed in a burst.

use std::{sync::Arc, time::Duration};

use horde_shared::{
    character::CharacterDirectory,
    config::ServerConfig,
    net::{CharacterId, ServerMsg},
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    clock::Clock,
    hub::{Dispatch, Hub},
    sim::EnemySimulation,
    spawner,
    store::WorldStore,
};

/// Handles to the running timer tasks. Dropping it stops them.
pub struct Timers {
    handles: Vec<JoinHandle<()>>,
}

impl Timers {
    /// Seeds the initial population, then starts the three loops.
    pub fn start(
        cfg: &ServerConfig,
        store: Arc<WorldStore>,
        hub: Arc<Hub>,
        directory: Arc<dyn CharacterDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tuning = cfg.world.clone();
        let mut rng = StdRng::from_entropy();
        let seeded = spawner::seed_initial(&store, &tuning, &mut rng, clock.now_ms());
        info!(enemies = seeded.len(), "Initial enemies spawned");
        hub.deliver_all(seeded.into_iter().map(Dispatch::everyone));

        let sim = EnemySimulation::new(store.clone(), tuning.clone(), clock.clone());
        let handles = vec![
            tokio::spawn(run_simulation(
                sim,
                hub.clone(),
                directory,
                Duration::from_millis(cfg.tick_ms.max(1)),
            )),
            tokio::spawn(run_broadcast(
                store.clone(),
                hub.clone(),
                Duration::from_millis(cfg.broadcast_ms.max(1)),
            )),
            tokio::spawn(async move {
                let mut ticker = ticker(Duration::from_millis(tuning.spawn_interval_ms.max(1)));
                loop {
                    ticker.tick().await;
                    if let Some(msg) = spawner::admit(&store, &tuning, &mut rng, clock.now_ms()) {
                        hub.deliver(Dispatch::everyone(msg));
                    }
                }
            }),
        ];
        Self { handles }
    }

    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_simulation(
    mut sim: EnemySimulation,
    hub: Arc<Hub>,
    directory: Arc<dyn CharacterDirectory>,
    period: Duration,
) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        for event in sim.tick() {
            if let ServerMsg::PlayerDied { player_id } = &event {
                info!(character = %player_id, "Player died");
                record_death(directory.clone(), player_id.clone());
            }
            hub.deliver(Dispatch::everyone(event));
        }
    }
}

/// Tells the directory about a death without holding up the tick.
fn record_death(directory: Arc<dyn CharacterDirectory>, character: CharacterId) {
    tokio::spawn(async move {
        if let Err(e) = directory.mark_dead(&character).await {
            debug!(%character, error = %e, "Death not recorded");
        }
    });
}

async fn run_broadcast(store: Arc<WorldStore>, hub: Arc<Hub>, period: Duration) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        if hub.is_empty() {
            continue;
        }
        // Taken under the hub's delivery order, so an `enemy-died` already
        // sent is never followed by a snapshot that still has the enemy.
        hub.deliver_fresh(|| {
            let enemies = store.enemy_snapshot();
            (!enemies.is_empty()).then_some(ServerMsg::EnemiesTick { enemies })
        });
    }
}
