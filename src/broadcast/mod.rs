//! Shared roll history
//!
//! Every executed command is published as a [`RollEvent`] so other
//! participants can show it. Delivery is best effort: a lagging or absent
//! listener never affects the roller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::combat::{AttackOutcome, DamageSlot, HpResult, Resolution};

/// Default number of events buffered per listener
pub const DEFAULT_CAPACITY: usize = 64;

/// A resolved command as seen by other participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollEvent {
    pub id: Uuid,
    pub player_id: String,
    /// Cleaned command label
    pub command: String,
    pub attack_rolls: Option<Vec<AttackOutcome>>,
    pub damage_results: Option<Vec<DamageSlot>>,
    pub hp_result: Option<HpResult>,
    /// Whether the dice came from a physical/shared roller
    pub physical: bool,
    pub timestamp: DateTime<Utc>,
}

impl RollEvent {
    pub fn new(player_id: &str, command: &str, resolution: &Resolution, physical: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id: player_id.to_string(),
            command: command.to_string(),
            attack_rolls: resolution.attack_rolls.clone(),
            damage_results: resolution.damage_results.clone(),
            hp_result: resolution.hp_result,
            physical,
            timestamp: Utc::now(),
        }
    }

    /// Sum of all damage instances
    pub fn total_damage(&self) -> i64 {
        self.damage_results
            .iter()
            .flatten()
            .map(DamageSlot::total)
            .sum()
    }
}

/// Pub/sub channel for roll events
#[derive(Debug, Clone)]
pub struct RollBroadcaster {
    sender: broadcast::Sender<RollEvent>,
}

impl RollBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RollEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns how many listeners received it
    pub fn publish(&self, event: RollEvent) -> usize {
        match self.sender.send(event) {
            Ok(listeners) => listeners,
            Err(broadcast::error::SendError(event)) => {
                debug!(event = %event.id, "No listeners for roll event");
                0
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RollBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::DamageInstance;

    fn resolution() -> Resolution {
        Resolution {
            attack_rolls: None,
            damage_results: Some(vec![DamageSlot::Hit(vec![
                DamageInstance::new(7, "fi"),
                DamageInstance::new(2, ""),
            ])]),
            total_damage: 9,
            hp_result: Some(HpResult::after(20, 9)),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let broadcaster = RollBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        let event = RollEvent::new("alice", "dmg 1d8fi+2", &resolution(), false);
        assert_eq!(broadcaster.publish(event.clone()), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
        assert_eq!(received.total_damage(), 9);
    }

    #[test]
    fn test_publish_without_listeners() {
        let broadcaster = RollBroadcaster::new(4);
        let event = RollEvent::new("bob", "dmg 3", &resolution(), true);
        assert_eq!(broadcaster.publish(event), 0);
        assert_eq!(broadcaster.listener_count(), 0);
    }

    #[test]
    fn test_event_json_shape() {
        let event = RollEvent::new("carol", "dmg 1d8fi+2", &resolution(), false);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["player_id"], "carol");
        assert!(json["attack_rolls"].is_null());
        assert_eq!(json["hp_result"]["new"], 11);
    }
}
