//! Attack rolls
//!
//! A d20 attack is rolled normally, with advantage (two dice, keep the
//! higher) or with disadvantage (two dice, keep the lower). A natural 20 is a
//! critical hit: under advantage either die counts, under disadvantage both
//! dice must show 20.

use serde::{Deserialize, Serialize};

use super::damage::{Amount, Term};
use super::dice::{DiceGroup, GroupId};

/// The natural roll that makes an attack critical
pub const NATURAL_CRIT: i64 = 20;

/// Most attacks one command may roll
pub const MAX_ATTACKS: u32 = 100;

/// How the d20 is rolled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RollMode {
    #[default]
    #[serde(rename = "n")]
    Normal,
    #[serde(rename = "a")]
    Advantage,
    #[serde(rename = "d")]
    Disadvantage,
}

impl RollMode {
    /// Parse the `n`/`a`/`d` letter of an attack roll
    pub fn from_letter(letter: char) -> Option<RollMode> {
        match letter.to_ascii_lowercase() {
            'n' => Some(RollMode::Normal),
            'a' => Some(RollMode::Advantage),
            'd' => Some(RollMode::Disadvantage),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            RollMode::Normal => 'n',
            RollMode::Advantage => 'a',
            RollMode::Disadvantage => 'd',
        }
    }

    /// Number of d20s rolled per attack
    pub fn d20_count(&self) -> usize {
        match self {
            RollMode::Normal => 1,
            RollMode::Advantage | RollMode::Disadvantage => 2,
        }
    }

    /// Pick the kept d20 and whether it is a critical hit
    pub fn keep(&self, rolls: &[i64]) -> (i64, bool) {
        match self {
            RollMode::Normal => {
                let roll = rolls.first().copied().unwrap_or(0);
                (roll, roll == NATURAL_CRIT)
            }
            RollMode::Advantage => {
                let kept = rolls.iter().copied().max().unwrap_or(0);
                (kept, rolls.contains(&NATURAL_CRIT))
            }
            RollMode::Disadvantage => {
                let kept = rolls.iter().copied().min().unwrap_or(0);
                let crit = !rolls.is_empty() && rolls.iter().all(|&r| r == NATURAL_CRIT);
                (kept, crit)
            }
        }
    }
}

/// Result of one attack roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub is_hit: bool,
    pub is_crit: bool,
    /// Kept d20 plus all bonuses
    pub total_value: i64,
    /// Every d20 rolled for this attack, in roll order
    pub d20: Vec<i64>,
}

impl AttackOutcome {
    /// Evaluate an attack from its d20s and summed bonus.
    ///
    /// Crits always hit; a missing target AC means every attack hits.
    pub fn evaluate(mode: RollMode, d20: Vec<i64>, bonus: i64, target_ac: Option<i64>) -> Self {
        let (kept, is_crit) = mode.keep(&d20);
        let total_value = kept.saturating_add(bonus);
        let is_hit = match target_ac {
            None => true,
            Some(ac) => is_crit || total_value >= ac,
        };

        Self {
            is_hit,
            is_crit,
            total_value,
            d20,
        }
    }
}

/// Dice groups for one attack: the d20s first, then one group per dice bonus
pub fn attack_groups(attack: usize, mode: RollMode, bonus: &[Term], color: &str) -> Vec<DiceGroup> {
    let d20s = (0..mode.d20_count()).map(|slot| DiceGroup::d20(GroupId::new(attack, slot), color));

    let bonus_dice = bonus
        .iter()
        .filter_map(|term| match term.amount {
            Amount::Dice { count, sides } => Some((count, sides)),
            Amount::Flat(_) => None,
        })
        .enumerate()
        .map(|(i, (count, sides))| {
            DiceGroup::new(GroupId::new(attack, mode.d20_count() + i), count, sides, color)
        });

    d20s.chain(bonus_dice).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::damage::Sign;

    #[test]
    fn test_roll_mode_letters() {
        assert_eq!(RollMode::from_letter('n'), Some(RollMode::Normal));
        assert_eq!(RollMode::from_letter('A'), Some(RollMode::Advantage));
        assert_eq!(RollMode::from_letter('d'), Some(RollMode::Disadvantage));
        assert_eq!(RollMode::from_letter('x'), None);
        assert_eq!(RollMode::Advantage.letter(), 'a');
    }

    #[test]
    fn test_advantage_either_twenty_crits() {
        let outcome = AttackOutcome::evaluate(RollMode::Advantage, vec![3, 20], 0, Some(25));
        assert_eq!(outcome.total_value, 20);
        assert!(outcome.is_crit);
        assert!(outcome.is_hit);
    }

    #[test]
    fn test_disadvantage_needs_both_twenties() {
        let outcome = AttackOutcome::evaluate(RollMode::Disadvantage, vec![20, 15], 0, Some(16));
        assert_eq!(outcome.total_value, 15);
        assert!(!outcome.is_crit);
        assert!(!outcome.is_hit);

        let outcome = AttackOutcome::evaluate(RollMode::Disadvantage, vec![20, 20], -10, Some(30));
        assert!(outcome.is_crit);
        assert!(outcome.is_hit);
    }

    #[test]
    fn test_normal_hit_and_miss() {
        // 15 + 5 = 20 >= 18
        assert!(AttackOutcome::evaluate(RollMode::Normal, vec![15], 5, Some(18)).is_hit);
        // 10 + 3 = 13 < 18
        assert!(!AttackOutcome::evaluate(RollMode::Normal, vec![10], 3, Some(18)).is_hit);
        // Meeting the AC exactly hits
        assert!(AttackOutcome::evaluate(RollMode::Normal, vec![12], 4, Some(16)).is_hit);
    }

    #[test]
    fn test_extreme_bonus_saturates() {
        let outcome = AttackOutcome::evaluate(RollMode::Normal, vec![20], i64::MAX, Some(10));
        assert_eq!(outcome.total_value, i64::MAX);
        let outcome = AttackOutcome::evaluate(RollMode::Normal, vec![1], i64::MIN, Some(10));
        assert_eq!(outcome.total_value, i64::MIN + 1);
        assert!(!outcome.is_hit);
    }

    #[test]
    fn test_no_target_ac_always_hits() {
        let outcome = AttackOutcome::evaluate(RollMode::Normal, vec![1], -5, None);
        assert!(outcome.is_hit);
        assert!(!outcome.is_crit);
    }

    #[test]
    fn test_attack_groups_layout() {
        let bonus = vec![
            Term::new(Sign::Plus, Amount::Flat(2)),
            Term::new(Sign::Minus, Amount::Dice { count: 1, sides: 4 }),
        ];
        let groups = attack_groups(3, RollMode::Advantage, &bonus, "red");
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].id, GroupId::new(3, 0));
        assert_eq!(groups[1].sides, 20);
        assert_eq!(groups[2].id, GroupId::new(3, 2));
        assert_eq!((groups[2].count, groups[2].sides), (1, 4));
        assert!(groups.iter().all(|g| g.tag == "red"));
    }
}
