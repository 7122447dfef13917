//! Enemy records.
//!
//! An enemy carries three pieces of mutable state besides its position:
//! - movement: direction, moving/paused, when that last flipped, facing,
//! - attack: current target, last attack time, attacking flag,
//! - a damage ledger that decides who it is angry at.

use horde_shared::{
    math::Vec2,
    net::{CharacterId, EnemyId, EnemyPhase, EnemyView},
};

/// Visual variant. Also decides max health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnemyVariant {
    Enemy1,
    Enemy2,
    Enemy3,
    Enemy4,
    Enemy5,
}

impl EnemyVariant {
    /// Spawn order. The spawner walks this list round-robin.
    pub const CYCLE: [EnemyVariant; 5] = [
        EnemyVariant::Enemy1,
        EnemyVariant::Enemy2,
        EnemyVariant::Enemy3,
        EnemyVariant::Enemy4,
        EnemyVariant::Enemy5,
    ];

    /// Variant for the `n`th spawned enemy (1-based).
    pub fn for_spawn(n: u64) -> Self {
        Self::CYCLE[(n.saturating_sub(1) % Self::CYCLE.len() as u64) as usize]
    }

    pub fn sprite(self) -> &'static str {
        match self {
            EnemyVariant::Enemy1 => "enemy-1",
            EnemyVariant::Enemy2 => "enemy-2",
            EnemyVariant::Enemy3 => "enemy-3",
            EnemyVariant::Enemy4 => "enemy-4",
            EnemyVariant::Enemy5 => "enemy-5",
        }
    }

    pub fn max_health(self) -> f32 {
        match self {
            EnemyVariant::Enemy1 => 100.0,
            EnemyVariant::Enemy2 => 101.0,
            EnemyVariant::Enemy3 => 102.0,
            EnemyVariant::Enemy4 => 103.0,
            EnemyVariant::Enemy5 => 104.0,
        }
    }

    /// Whether the client rotates this sprite to face its heading.
    pub fn tracks_facing(self) -> bool {
        self == EnemyVariant::Enemy5
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementState {
    pub direction: Vec2,
    pub moving: bool,
    /// `None` until the simulation first sees the enemy.
    pub last_change_ms: Option<u64>,
    pub facing: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttackState {
    pub target: Option<CharacterId>,
    pub last_attack_ms: Option<u64>,
    pub attacking: bool,
}

/// Cumulative damage per attacker, in first-hit order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DamageLedger {
    entries: Vec<(CharacterId, f32)>,
}

impl DamageLedger {
    /// Adds `amount` to `attacker`'s total and returns the new total.
    pub fn record(&mut self, attacker: &CharacterId, amount: f32) -> f32 {
        match self.entries.iter_mut().find(|(id, _)| id == attacker) {
            Some((_, total)) => {
                *total += amount;
                *total
            }
            None => {
                self.entries.push((attacker.clone(), amount));
                amount
            }
        }
    }

    pub fn total(&self, attacker: &CharacterId) -> f32 {
        self.entries
            .iter()
            .find(|(id, _)| id == attacker)
            .map_or(0.0, |(_, total)| *total)
    }

    /// Attacker with the highest total. On a tie the one that hit first wins.
    pub fn top(&self) -> Option<&CharacterId> {
        let mut best: Option<(&CharacterId, f32)> = None;
        for (id, total) in &self.entries {
            if *total > best.map_or(0.0, |(_, b)| b) {
                best = Some((id, *total));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one damage application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub current_health: f32,
    pub max_health: f32,
    /// True only for the hit that took health from above zero to zero.
    pub killed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnemyRecord {
    pub id: EnemyId,
    pub variant: EnemyVariant,
    pub position: Vec2,
    pub max_health: f32,
    pub health: f32,
    pub movement: MovementState,
    pub attack: AttackState,
    pub ledger: DamageLedger,
}

impl EnemyRecord {
    /// A paused enemy the simulation has not seen yet.
    pub fn new(id: EnemyId, variant: EnemyVariant, position: Vec2) -> Self {
        let max_health = variant.max_health();
        Self {
            id,
            variant,
            position,
            max_health,
            health: max_health,
            movement: MovementState {
                direction: Vec2::ZERO,
                moving: false,
                last_change_ms: None,
                facing: 0.0,
            },
            attack: AttackState::default(),
            ledger: DamageLedger::default(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }

    /// Records `amount` against `attacker` and lowers health, floored at zero.
    ///
    /// Negative or non-finite amounts count as zero, which keeps health
    /// within `[0, max_health]` and ledger totals monotonic.
    pub fn apply_damage(&mut self, attacker: &CharacterId, amount: f32) -> DamageOutcome {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        self.ledger.record(attacker, amount);

        let was_alive = !self.is_dead();
        self.health = (self.health - amount).clamp(0.0, self.max_health);
        DamageOutcome {
            current_health: self.health,
            max_health: self.max_health,
            killed: was_alive && self.is_dead(),
        }
    }

    /// Sets a new heading and keeps the facing angle in sync for variants
    /// that rotate.
    pub fn set_direction(&mut self, direction: Vec2) {
        self.movement.direction = direction;
        if self.variant.tracks_facing() && direction != Vec2::ZERO {
            self.movement.facing = direction.angle();
        }
    }

    pub fn phase(&self) -> EnemyPhase {
        if self.attack.attacking {
            EnemyPhase::Attacking
        } else if self.movement.moving {
            EnemyPhase::Moving
        } else {
            EnemyPhase::Paused
        }
    }

    pub fn view(&self) -> EnemyView {
        EnemyView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            sprite: self.variant.sprite().to_string(),
            max_health: self.max_health,
            current_health: self.health,
            phase: self.phase(),
            direction_x: self.movement.direction.x,
            direction_y: self.movement.direction.y,
            facing: self.movement.facing,
            target: self.attack.target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str) -> CharacterId {
        CharacterId::from(id)
    }

    #[test]
    fn variants_cycle_by_spawn_counter() {
        let sprites: Vec<&str> = (1..=7).map(|n| EnemyVariant::for_spawn(n).sprite()).collect();
        assert_eq!(
            sprites,
            ["enemy-1", "enemy-2", "enemy-3", "enemy-4", "enemy-5", "enemy-1", "enemy-2"]
        );
        assert_eq!(EnemyVariant::Enemy3.max_health(), 102.0);
    }

    #[test]
    fn ledger_tie_goes_to_first_attacker() {
        let mut ledger = DamageLedger::default();
        ledger.record(&c("a"), 30.0);
        ledger.record(&c("b"), 30.0);
        assert_eq!(ledger.top(), Some(&c("a")));

        ledger.record(&c("b"), 0.5);
        assert_eq!(ledger.top(), Some(&c("b")));
        assert_eq!(ledger.total(&c("b")), 30.5);
    }

    #[test]
    fn ledger_ignores_zero_totals() {
        let mut ledger = DamageLedger::default();
        ledger.record(&c("a"), 0.0);
        assert_eq!(ledger.top(), None);
        assert!(!ledger.is_empty());
    }

    #[test]
    fn damage_kills_once() {
        let mut e = EnemyRecord::new(EnemyId(5), EnemyVariant::Enemy1, Vec2::ZERO);
        let first = e.apply_damage(&c("c1"), 40.0);
        assert_eq!(first.current_health, 60.0);
        assert!(!first.killed);

        let second = e.apply_damage(&c("c2"), 61.0);
        assert_eq!(second.current_health, 0.0);
        assert!(second.killed);

        let third = e.apply_damage(&c("c2"), 1.0);
        assert!(!third.killed);
        assert_eq!(e.ledger.top(), Some(&c("c2")));
    }

    #[test]
    fn negative_and_nan_damage_are_ignored() {
        let mut e = EnemyRecord::new(EnemyId(1), EnemyVariant::Enemy2, Vec2::ZERO);
        e.apply_damage(&c("c1"), 10.0);
        e.apply_damage(&c("c1"), -50.0);
        e.apply_damage(&c("c1"), f32::NAN);
        assert_eq!(e.health, 91.0);
        assert_eq!(e.ledger.total(&c("c1")), 10.0);
    }

    #[test]
    fn only_rotating_variant_updates_facing() {
        let mut plain = EnemyRecord::new(EnemyId(1), EnemyVariant::Enemy1, Vec2::ZERO);
        plain.set_direction(Vec2::new(0.0, 1.0));
        assert_eq!(plain.movement.facing, 0.0);

        let mut rotating = EnemyRecord::new(EnemyId(2), EnemyVariant::Enemy5, Vec2::ZERO);
        rotating.set_direction(Vec2::new(0.0, 1.0));
        assert!((rotating.movement.facing - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
