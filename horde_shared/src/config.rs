//! Configuration system.
//!
//! Loads server configuration from JSON strings/files. Every field has a
//! default, so a partial file only overrides what it names.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:3000`.
    pub server_addr: String,
    /// Enemy simulation tick interval.
    pub tick_ms: u64,
    /// Full enemy snapshot broadcast interval.
    pub broadcast_ms: u64,
    /// Gameplay constants.
    pub world: WorldTuning,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            tick_ms: 16,
            broadcast_ms: 100,
            world: WorldTuning::default(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

/// Gameplay constants for players, enemies and the spawner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldTuning {
    /// Health (and max health) of a freshly joined or repaired player.
    pub player_max_health: f32,

    /// Enemies spawn uniformly in `[-half_extent, half_extent]` on both axes.
    pub spawn_half_extent: f32,
    pub initial_enemies: usize,
    pub max_enemies: usize,
    pub spawn_interval_ms: u64,
    /// Upper bound of the random backdate for enemies spawned mid-walk.
    pub moving_backdate_ms: u64,
    /// Upper bound of the random backdate for enemies spawned paused.
    pub paused_backdate_ms: u64,

    /// Distance covered per simulation tick.
    pub move_speed: f32,
    pub move_duration_ms: u64,
    pub pause_duration_ms: u64,
    pub attack_range: f32,
    pub attack_cooldown_ms: u64,
    pub attack_damage: f32,
}

impl Default for WorldTuning {
    fn default() -> Self {
        Self {
            player_max_health: 100.0,
            spawn_half_extent: 1000.0,
            initial_enemies: 20,
            max_enemies: 50,
            spawn_interval_ms: 10_000,
            moving_backdate_ms: 2_000,
            paused_backdate_ms: 3_000,
            move_speed: 1.0,
            move_duration_ms: 2_000,
            pause_duration_ms: 3_000,
            attack_range: 64.0,
            attack_cooldown_ms: 500,
            attack_damage: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ServerConfig::from_json_str(
            r#"{ "server_addr": "0.0.0.0:4000", "world": { "max_enemies": 5 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "0.0.0.0:4000");
        assert_eq!(cfg.tick_ms, 16);
        assert_eq!(cfg.world.max_enemies, 5);
        assert_eq!(cfg.world.initial_enemies, 20);
        assert_eq!(cfg.world.attack_range, 64.0);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ServerConfig::from_json_str("{}").unwrap(), ServerConfig::default());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ServerConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }
}
