//! Structured result of parsing a command

use serde::{Deserialize, Serialize};

use super::grammar::Candidate;
use crate::combat::{Amount, DamageComponent, Defenses, RollMode, Term};

fn dice_in(amounts: impl Iterator<Item = Amount>) -> u64 {
    amounts
        .map(|amount| match amount {
            Amount::Dice { count, .. } => u64::from(count),
            Amount::Flat(_) => 0,
        })
        .fold(0, u64::saturating_add)
}

/// Everything a command asks for.
///
/// `num_attacks: None` is automatic-hit mode; `target_ac: None` means every
/// attack hits; `damage_components: None` means there is no damage phase,
/// while `Some(vec![])` is a damage phase that deals nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackParameters {
    pub num_attacks: Option<u32>,
    pub modifier: RollMode,
    pub attack_bonus: Vec<Term>,
    /// Dice theme tag; never affects results
    pub attack_color: String,
    pub base_target_ac: Option<i64>,
    pub ac_modifier: i64,
    pub target_ac: Option<i64>,
    pub damage_components: Option<Vec<DamageComponent>>,
    pub hp: Option<i64>,
    pub res: Vec<String>,
    pub vul: Vec<String>,
    pub imm: Vec<String>,
    pub save_content: Option<String>,
    pub load_content: Option<String>,
    pub delete_content: Option<String>,
}

impl AttackParameters {
    /// Fill the fields of the candidate's role
    pub(crate) fn assign(&mut self, candidate: Candidate) {
        match candidate {
            Candidate::Attack(roll) => {
                self.num_attacks = Some(roll.count);
                self.modifier = roll.mode;
                self.attack_color = roll.color;
                self.attack_bonus = roll.bonus;
            }
            Candidate::TargetAc(ac) => {
                self.base_target_ac = Some(ac.base);
                self.ac_modifier = ac.modifier;
                self.target_ac = Some(ac.total());
            }
            Candidate::Damage(components) => self.damage_components = Some(components),
            Candidate::Hp(hp) => self.hp = Some(hp),
            Candidate::Res(types) => self.res = types,
            Candidate::Vul(types) => self.vul = types,
            Candidate::Imm(types) => self.imm = types,
        }
    }

    pub fn defenses(&self) -> Defenses {
        Defenses::new(self.res.clone(), self.vul.clone(), self.imm.clone())
    }

    /// Dice rolled if every attack hits and every hit is a crit
    pub fn max_dice(&self) -> u64 {
        let damage = self
            .damage_components
            .as_deref()
            .map_or(0, |components| dice_in(components.iter().map(|c| c.amount)));

        match self.num_attacks {
            None => damage,
            Some(attacks) => {
                let d20s = self.modifier.d20_count() as u64;
                let bonus = dice_in(self.attack_bonus.iter().map(|t| t.amount));
                let crit_damage = damage.saturating_mul(2);
                let per_attack = d20s.saturating_add(bonus).saturating_add(crit_damage);
                u64::from(attacks).saturating_mul(per_attack)
            }
        }
    }
}
