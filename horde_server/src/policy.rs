//! Trust boundary for client-reported values.

use horde_shared::{
    math::Vec2,
    net::{CharacterId, EnemyId},
};

use crate::player::PlayerRecord;

/// Decides what a client is allowed to report. Returning `None` drops the
/// message; returning a value applies it (possibly adjusted).
pub trait InputPolicy: Send + Sync {
    fn accept_move(&self, player: &PlayerRecord, to: Vec2) -> Option<Vec2>;

    fn accept_damage(&self, enemy: EnemyId, attacker: &CharacterId, amount: f32) -> Option<f32>;
}

/// Accepts every reported position and damage value as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustClient;

impl InputPolicy for TrustClient {
    fn accept_move(&self, _player: &PlayerRecord, to: Vec2) -> Option<Vec2> {
        Some(to)
    }

    fn accept_damage(&self, _enemy: EnemyId, _attacker: &CharacterId, amount: f32) -> Option<f32> {
        Some(amount)
    }
}
