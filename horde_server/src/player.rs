//! Player records.

use horde_shared::{
    character::CharacterRecord,
    math::Vec2,
    net::{CharacterId, ClientMsg, ConnectionId, PlayerView},
};

/// Join request after the character directory has filled in any gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub character_id: CharacterId,
    pub name: String,
    pub sprite: Option<String>,
    pub position: Option<Vec2>,
}

impl JoinRequest {
    /// Builds a request from a `join` message. A position needs both axes.
    pub fn from_msg(msg: &ClientMsg) -> Option<Self> {
        match msg {
            ClientMsg::Join {
                character_id,
                name,
                sprite,
                x,
                y,
            } => Some(Self {
                character_id: character_id.clone(),
                name: name.clone(),
                sprite: sprite.clone(),
                position: x.zip(*y).map(|(x, y)| Vec2::new(x, y)),
            }),
            _ => None,
        }
    }

    /// Fills whatever the client left out from the stored character.
    pub fn fill_from(mut self, stored: &CharacterRecord) -> Self {
        if self.name.trim().is_empty() {
            self.name = stored.name.clone();
        }
        if self.sprite.is_none() {
            self.sprite = Some(stored.sprite.clone());
        }
        if self.position.is_none() {
            self.position = Some(Vec2::new(stored.position_x, stored.position_y));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: CharacterId,
    /// Connection of record. Only this connection may act for the player.
    pub connection: ConnectionId,
    pub name: String,
    pub sprite: Option<String>,
    pub position: Vec2,
    pub health: f32,
    pub max_health: f32,
}

impl PlayerRecord {
    pub fn new(connection: ConnectionId, req: &JoinRequest, max_health: f32) -> Self {
        Self {
            id: req.character_id.clone(),
            connection,
            name: req.name.clone(),
            sprite: req.sprite.clone(),
            position: req.position.unwrap_or(Vec2::ZERO),
            health: max_health,
            max_health,
        }
    }

    /// Applies a reconnecting join to an existing record.
    ///
    /// Position and sprite change only when the request carries them. A
    /// record left at zero health is restored to full.
    pub fn rejoin(&mut self, connection: ConnectionId, req: &JoinRequest, max_health: f32) {
        self.connection = connection;
        if let Some(position) = req.position {
            self.position = position;
        }
        if let Some(sprite) = &req.sprite {
            self.sprite = Some(sprite.clone());
        }
        if self.health <= 0.0 || self.max_health <= 0.0 {
            self.health = max_health;
            self.max_health = max_health;
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Applies `amount` damage floored at zero. Returns the health left.
    pub fn take_damage(&mut self, amount: f32) -> f32 {
        self.health = (self.health - amount).max(0.0);
        self.health
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            sprite: self.sprite.clone(),
            x: self.position.x,
            y: self.position.y,
            health: self.health,
            max_health: self.max_health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(x: Option<f32>) -> JoinRequest {
        JoinRequest {
            character_id: CharacterId::from("c1"),
            name: "Ann".into(),
            sprite: None,
            position: x.map(|x| Vec2::new(x, x)),
        }
    }

    #[test]
    fn join_message_needs_both_axes_for_a_position() {
        let msg = ClientMsg::Join {
            character_id: CharacterId::from("c1"),
            name: "Ann".into(),
            sprite: None,
            x: Some(3.0),
            y: None,
        };
        assert_eq!(JoinRequest::from_msg(&msg).unwrap().position, None);
        assert!(JoinRequest::from_msg(&ClientMsg::RequestRoster).is_none());
    }

    #[test]
    fn stored_character_fills_gaps_only() {
        let stored = CharacterRecord {
            id: CharacterId::from("c1"),
            account_id: horde_shared::character::AccountId("acc".into()),
            name: "Stored".into(),
            sprite: "knight".into(),
            position_x: 7.0,
            position_y: 8.0,
            created_at: chrono::Utc::now(),
            is_temporary: false,
            is_dead: false,
        };
        let mut r = req(Some(1.0));
        r.name = String::new();
        let filled = r.fill_from(&stored);
        assert_eq!(filled.name, "Stored");
        assert_eq!(filled.sprite.as_deref(), Some("knight"));
        assert_eq!(filled.position, Some(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn new_player_defaults_to_origin_and_full_health() {
        let p = PlayerRecord::new(ConnectionId(1), &req(None), 100.0);
        assert_eq!(p.position, Vec2::ZERO);
        assert_eq!(p.health, 100.0);
        assert_eq!(p.max_health, 100.0);
    }

    #[test]
    fn rejoin_repairs_dead_record_and_keeps_position_when_absent() {
        let mut p = PlayerRecord::new(ConnectionId(1), &req(Some(5.0)), 100.0);
        p.take_damage(150.0);
        assert_eq!(p.health, 0.0);

        p.rejoin(ConnectionId(2), &req(None), 100.0);
        assert_eq!(p.connection, ConnectionId(2));
        assert_eq!(p.position, Vec2::new(5.0, 5.0));
        assert_eq!(p.health, 100.0);
    }

    #[test]
    fn rejoin_keeps_partial_health() {
        let mut p = PlayerRecord::new(ConnectionId(1), &req(None), 100.0);
        p.take_damage(30.0);
        p.rejoin(ConnectionId(2), &req(Some(1.0)), 100.0);
        assert_eq!(p.health, 70.0);
        assert_eq!(p.position, Vec2::new(1.0, 1.0));
    }
}
