//! Attack and damage resolution
//!
//! Resolution runs in two dice phases. The attack phase rolls every
//! attack's d20s and bonus dice in one request; the damage phase is built
//! only once all hits and crits are known, and rolls every hit's damage
//! dice in one request. Each phase is bounded by a timeout and can be
//! abandoned through a cancellation signal.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::attack::{attack_groups, AttackOutcome, RollMode};
use super::damage::{Amount, DamageComponent, DamageInstance, DamageSlot, Defenses, HpResult, Term};
use super::dice::{
    DiceError, DiceGroup, DiceSource, GroupId, GroupResult, RollPhase, RollRequest,
    MAX_DICE_PER_COMMAND,
};
use crate::command::AttackParameters;

/// Bound on a single dice phase
pub const DEFAULT_ROLL_TIMEOUT: Duration = Duration::from_secs(12);

/// Errors that stop a parsed command from being executed
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("command could roll {0} dice (limit {max})", max = MAX_DICE_PER_COMMAND)]
    TooManyDice(u64),
}

/// Limits and signals applied while waiting for dice
#[derive(Debug, Clone)]
pub struct RollControl {
    pub timeout: Duration,
    /// Seed handed to the dice source; random when absent
    pub seed: Option<u64>,
    /// Any value sent after resolution starts cancels the pending phase
    pub cancel: Option<watch::Receiver<u64>>,
}

impl Default for RollControl {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ROLL_TIMEOUT,
            seed: None,
            cancel: None,
        }
    }
}

impl RollControl {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<u64>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Everything a resolved command produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// One outcome per attack; `None` when no attack roll was made
    pub attack_rolls: Option<Vec<AttackOutcome>>,
    /// One slot per attack; `None` when the command had no damage phase
    pub damage_results: Option<Vec<DamageSlot>>,
    pub total_damage: i64,
    pub hp_result: Option<HpResult>,
}

impl Resolution {
    /// Number of attacks that hit
    pub fn hits(&self) -> usize {
        match (&self.attack_rolls, &self.damage_results) {
            (Some(rolls), _) => rolls.iter().filter(|r| r.is_hit).count(),
            (None, Some(slots)) => slots.iter().filter(|s| !s.is_miss()).count(),
            (None, None) => 0,
        }
    }
}

/// A hit carried from the attack phase into the damage phase
#[derive(Debug, Clone, Copy)]
struct Strike {
    attack: usize,
    crit: bool,
}

/// Per-group totals of one phase
#[derive(Debug, Default)]
struct Totals(HashMap<GroupId, i64>);

impl Totals {
    fn get(&self, attack: usize, slot: usize) -> i64 {
        self.0.get(&GroupId::new(attack, slot)).copied().unwrap_or(0)
    }
}

struct PhaseRunner<'a, 'd> {
    dice: &'a mut (dyn DiceSource + 'd),
    control: &'a mut RollControl,
    seed: u64,
}

impl PhaseRunner<'_, '_> {
    async fn roll(&mut self, phase: RollPhase, groups: Vec<DiceGroup>) -> Result<Totals, DiceError> {
        // Zero-dice groups total 0 and are never sent
        let groups: Vec<DiceGroup> = groups.into_iter().filter(|g| g.count > 0).collect();
        if groups.is_empty() {
            return Ok(Totals::default());
        }

        let seed = match phase {
            RollPhase::Attack => self.seed,
            RollPhase::Damage => self.seed.wrapping_add(1),
        };
        let request = RollRequest::new(phase, seed, groups);
        debug!(request = %request.id, ?phase, groups = request.groups.len(), "Rolling dice");

        let results = self.await_results(&request).await?;
        collect_totals(&request, results)
    }

    async fn await_results(&mut self, request: &RollRequest) -> Result<Vec<GroupResult>, DiceError> {
        let timeout = self.control.timeout;
        let rolled = tokio::time::timeout(timeout, self.dice.roll(request));

        match self.control.cancel.as_mut() {
            Some(cancel) => tokio::select! {
                res = rolled => res.map_err(|_| DiceError::Timeout(timeout))?,
                _ = cancelled(cancel) => Err(DiceError::Cancelled),
            },
            None => rolled.await.map_err(|_| DiceError::Timeout(timeout))?,
        }
    }
}

/// Completes when a cancellation is signalled; never completes if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<u64>) {
    if cancel.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn collect_totals(request: &RollRequest, results: Vec<GroupResult>) -> Result<Totals, DiceError> {
    let reported: HashMap<GroupId, Option<i64>> = results.into_iter().map(|r| (r.id, r.total)).collect();

    let mut totals = HashMap::with_capacity(request.groups.len());
    for group in &request.groups {
        let total = reported.get(&group.id).ok_or_else(|| {
            DiceError::Malformed(format!(
                "no result for group {}:{}",
                group.id.attack, group.id.slot
            ))
        })?;

        let value = match total {
            Some(t) if group.accepts(*t) => *t,
            other => {
                warn!(
                    attack = group.id.attack,
                    slot = group.id.slot,
                    count = group.count,
                    sides = group.sides,
                    total = ?other,
                    "Invalid dice total, counting as 0"
                );
                0
            }
        };
        totals.insert(group.id, value);
    }

    Ok(Totals(totals))
}

/// Sum the attack bonus terms of one attack. Dice terms read their rolled
/// totals from the slots following the d20s.
fn bonus_total(attack: usize, mode: RollMode, bonus: &[Term], totals: &Totals) -> i64 {
    let mut dice_slot = mode.d20_count();
    bonus
        .iter()
        .map(|term| {
            let magnitude = match term.amount {
                Amount::Dice { .. } => {
                    let rolled = totals.get(attack, dice_slot);
                    dice_slot += 1;
                    rolled
                }
                Amount::Flat(value) => value,
            };
            term.sign.apply(magnitude)
        })
        .fold(0, i64::saturating_add)
}

/// Damage dice for one hit; the slot of each group is its component index.
/// Crits double the dice count.
fn damage_groups(strike: Strike, components: &[DamageComponent]) -> Vec<DiceGroup> {
    components
        .iter()
        .enumerate()
        .filter_map(|(slot, component)| match component.amount {
            Amount::Dice { count, sides } => {
                let count = if strike.crit { count.saturating_mul(2) } else { count };
                Some(DiceGroup::new(
                    GroupId::new(strike.attack, slot),
                    count,
                    sides,
                    component.damage_type.as_str(),
                ))
            }
            Amount::Flat(_) => None,
        })
        .collect()
}

fn damage_instances(
    strike: Strike,
    components: &[DamageComponent],
    defenses: &Defenses,
    totals: &Totals,
) -> Vec<DamageInstance> {
    components
        .iter()
        .enumerate()
        .map(|(slot, component)| {
            let raw = match component.amount {
                Amount::Dice { .. } => totals.get(strike.attack, slot),
                Amount::Flat(value) => value,
            };
            // Clamped to 0 before defenses apply
            let base = component.sign.apply(raw).max(0);
            DamageInstance::new(defenses.apply(base, &component.damage_type), &component.damage_type)
        })
        .collect()
}

/// Resolve a parsed command against a dice source.
///
/// Without an attack roll the command is a single automatic hit: no d20 is
/// rolled, `attack_rolls` is `None` and damage is rolled once.
pub async fn resolve(
    params: &AttackParameters,
    dice: &mut dyn DiceSource,
    control: &mut RollControl,
) -> Result<Resolution, ResolveError> {
    let max_dice = params.max_dice();
    if max_dice > MAX_DICE_PER_COMMAND {
        return Err(ResolveError::TooManyDice(max_dice));
    }

    if let Some(cancel) = control.cancel.as_mut() {
        // Signals raised before this command started do not apply to it
        cancel.borrow_and_update();
    }

    let seed = control.seed.unwrap_or_else(rand::random);
    let mut runner = PhaseRunner { dice, control, seed };

    let (attack_rolls, slots): (Option<Vec<AttackOutcome>>, Vec<Option<Strike>>) =
        match params.num_attacks {
            None => (None, vec![Some(Strike { attack: 0, crit: false })]),
            Some(count) => {
                let count = count as usize;
                let mode = params.modifier;
                let groups = (0..count)
                    .flat_map(|i| attack_groups(i, mode, &params.attack_bonus, &params.attack_color))
                    .collect();
                let totals = runner.roll(RollPhase::Attack, groups).await?;

                let outcomes: Vec<AttackOutcome> = (0..count)
                    .map(|i| {
                        let d20 = (0..mode.d20_count()).map(|slot| totals.get(i, slot)).collect();
                        let bonus = bonus_total(i, mode, &params.attack_bonus, &totals);
                        AttackOutcome::evaluate(mode, d20, bonus, params.target_ac)
                    })
                    .collect();

                let slots = outcomes
                    .iter()
                    .enumerate()
                    .map(|(attack, o)| o.is_hit.then_some(Strike { attack, crit: o.is_crit }))
                    .collect();
                (Some(outcomes), slots)
            }
        };

    let damage_results = match &params.damage_components {
        None => None,
        Some(components) => {
            let groups = slots
                .iter()
                .flatten()
                .flat_map(|strike| damage_groups(*strike, components))
                .collect();
            let totals = runner.roll(RollPhase::Damage, groups).await?;

            let defenses = params.defenses();
            let results = slots
                .iter()
                .map(|slot| match slot {
                    Some(strike) => DamageSlot::Hit(damage_instances(*strike, components, &defenses, &totals)),
                    None => DamageSlot::Miss,
                })
                .collect::<Vec<_>>();
            Some(results)
        }
    };

    let total_damage: i64 = damage_results
        .iter()
        .flatten()
        .map(DamageSlot::total)
        .fold(0, i64::saturating_add);
    let hp_result = params.hp.map(|hp| HpResult::after(hp, total_damage));

    let resolution = Resolution {
        attack_rolls,
        damage_results,
        total_damage,
        hp_result,
    };
    info!(
        attacks = slots.len(),
        hits = resolution.hits(),
        total_damage,
        "Resolved attack command"
    );
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::dice::{FixedDice, RemoteDice};
    use crate::combat::damage::Sign;

    fn params() -> AttackParameters {
        AttackParameters::default()
    }

    async fn run(params: &AttackParameters, dice: &mut FixedDice) -> Resolution {
        resolve(params, dice, &mut RollControl::default().with_seed(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_hit_flat_damage() {
        let mut p = params();
        p.num_attacks = Some(1);
        p.target_ac = Some(1);
        p.damage_components = Some(vec![DamageComponent::flat(5, "")]);

        let mut dice = FixedDice::new([10]);
        let res = run(&p, &mut dice).await;

        let rolls = res.attack_rolls.unwrap();
        assert_eq!(rolls.len(), 1);
        assert!(rolls[0].is_hit);
        assert_eq!(rolls[0].total_value, 10);
        assert_eq!(
            res.damage_results,
            Some(vec![DamageSlot::Hit(vec![DamageInstance::new(5, "")])])
        );
        assert_eq!(res.total_damage, 5);
        // Flat damage needs no damage request
        assert_eq!(dice.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_misses_keep_their_slot() {
        let mut p = params();
        p.num_attacks = Some(3);
        p.target_ac = Some(15);
        p.damage_components = Some(vec![DamageComponent::dice(1, 6, "fi")]);

        // d20s: 14 (miss), 15 (hit), 2 (miss); then 1d6 for the hit
        let mut dice = FixedDice::new([14, 15, 2, 4]);
        let res = run(&p, &mut dice).await;

        let slots = res.damage_results.unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots[0].is_miss());
        assert_eq!(slots[1], DamageSlot::Hit(vec![DamageInstance::new(4, "fi")]));
        assert!(slots[2].is_miss());
        assert_eq!(res.total_damage, 4);
    }

    #[tokio::test]
    async fn test_crit_doubles_dice_not_flat() {
        let mut p = params();
        p.num_attacks = Some(1);
        p.target_ac = Some(30);
        p.damage_components = Some(vec![
            DamageComponent::dice(2, 6, ""),
            DamageComponent::flat(3, ""),
        ]);

        let mut dice = FixedDice::new([20, 17]);
        let res = run(&p, &mut dice).await;

        assert!(res.attack_rolls.as_ref().unwrap()[0].is_crit);
        let damage_request = &dice.requests()[1];
        assert_eq!(damage_request.phase, RollPhase::Damage);
        assert_eq!(damage_request.groups[0].count, 4);
        assert_eq!(res.total_damage, 20);
    }

    #[tokio::test]
    async fn test_automatic_hit_rolls_no_d20() {
        let mut p = params();
        p.damage_components = Some(vec![DamageComponent::dice(1, 8, "pi")]);

        let mut dice = FixedDice::new([6]);
        let res = run(&p, &mut dice).await;

        assert!(res.attack_rolls.is_none());
        assert_eq!(dice.requests().len(), 1);
        assert_eq!(dice.requests()[0].phase, RollPhase::Damage);
        assert_eq!(res.damage_results.unwrap().len(), 1);
        assert_eq!(res.total_damage, 6);
    }

    #[tokio::test]
    async fn test_no_damage_phase() {
        let mut p = params();
        p.num_attacks = Some(2);
        p.target_ac = Some(10);
        p.hp = Some(30);

        let mut dice = FixedDice::new([12, 3]);
        let res = run(&p, &mut dice).await;

        assert!(res.damage_results.is_none());
        assert_eq!(res.hits(), 1);
        assert_eq!(res.hp_result, Some(HpResult { old: 30, new: 30 }));
    }

    #[tokio::test]
    async fn test_empty_damage_list_gives_empty_instances() {
        let mut p = params();
        p.num_attacks = Some(1);
        p.damage_components = Some(vec![]);

        let mut dice = FixedDice::new([9]);
        let res = run(&p, &mut dice).await;
        assert_eq!(res.damage_results, Some(vec![DamageSlot::Hit(vec![])]));
        assert_eq!(res.total_damage, 0);
    }

    #[tokio::test]
    async fn test_bonus_dice_and_negative_damage_clamp() {
        let mut p = params();
        p.num_attacks = Some(1);
        p.modifier = RollMode::Advantage;
        p.target_ac = Some(17);
        p.attack_bonus = vec![
            Term::new(Sign::Plus, Amount::Flat(3)),
            Term::new(Sign::Minus, Amount::Dice { count: 1, sides: 4 }),
        ];
        p.damage_components = Some(vec![
            DamageComponent::dice(1, 6, ""),
            DamageComponent::flat(4, "").negated(),
        ]);

        // d20s 8, 16 -> keep 16; +3 -1d4(2) = 17 hits; then 1d6 = 5
        let mut dice = FixedDice::new([8, 16, 2, 5]);
        let res = run(&p, &mut dice).await;

        assert_eq!(res.attack_rolls.as_ref().unwrap()[0].total_value, 17);
        assert_eq!(
            res.damage_results.unwrap()[0],
            DamageSlot::Hit(vec![DamageInstance::new(5, ""), DamageInstance::new(0, "")])
        );
        assert_eq!(res.total_damage, 5);
    }

    #[tokio::test]
    async fn test_invalid_totals_count_as_zero() {
        let mut p = params();
        p.num_attacks = Some(1);
        p.target_ac = Some(5);
        p.damage_components = Some(vec![DamageComponent::dice(1, 6, "")]);

        // 40 is not a d20 result; the attack misses on 0
        let mut dice = FixedDice::new([40]);
        let res = run(&p, &mut dice).await;
        assert_eq!(res.attack_rolls.unwrap()[0].total_value, 0);
        assert!(res.damage_results.unwrap()[0].is_miss());
    }

    #[tokio::test]
    async fn test_defenses_in_pipeline() {
        let mut p = params();
        p.damage_components = Some(vec![
            DamageComponent::flat(5, "fi"),
            DamageComponent::flat(5, "co"),
            DamageComponent::flat(5, "ne"),
        ]);
        p.res = vec!["fi".to_string()];
        p.vul = vec!["co".to_string(), "fi".to_string()];
        p.imm = vec!["ne".to_string()];
        p.hp = Some(10);

        let res = run(&p, &mut FixedDice::new([])).await;
        assert_eq!(
            res.damage_results.unwrap()[0].instances(),
            &[
                DamageInstance::new(4, "fi"),
                DamageInstance::new(10, "co"),
                DamageInstance::new(0, "ne"),
            ]
        );
        assert_eq!(res.hp_result, Some(HpResult { old: 10, new: -4 }));
    }

    #[tokio::test]
    async fn test_extreme_flat_values_saturate() {
        let mut p = params();
        p.num_attacks = Some(2);
        p.target_ac = Some(i64::MAX);
        p.attack_bonus = vec![
            Term::new(Sign::Plus, Amount::Flat(i64::MAX)),
            Term::new(Sign::Plus, Amount::Flat(i64::MAX)),
        ];
        p.damage_components = Some(vec![
            DamageComponent::flat(i64::MAX, "fi"),
            DamageComponent::flat(i64::MAX, ""),
        ]);
        p.vul = vec!["fi".to_string()];
        p.hp = Some(0);

        let res = run(&p, &mut FixedDice::always(10)).await;
        let rolls = res.attack_rolls.as_ref().unwrap();
        assert!(rolls.iter().all(|r| r.total_value == i64::MAX && r.is_hit));
        assert_eq!(res.damage_results.as_ref().unwrap()[0].instances()[0].value, i64::MAX);
        assert_eq!(res.total_damage, i64::MAX);
        assert_eq!(res.hp_result, Some(HpResult { old: 0, new: -i64::MAX }));
    }

    #[tokio::test]
    async fn test_too_many_dice_rolls_nothing() {
        let mut p = params();
        p.num_attacks = Some(u32::MAX);
        let mut dice = FixedDice::always(10);
        let err = resolve(&p, &mut dice, &mut RollControl::default()).await.unwrap_err();
        assert!(matches!(err, ResolveError::TooManyDice(n) if n == u64::from(u32::MAX)));

        let mut p = params();
        p.damage_components = Some(vec![DamageComponent::dice(300_000_000, 6, "")]);
        let err = resolve(&p, &mut dice, &mut RollControl::default()).await.unwrap_err();
        assert!(matches!(err, ResolveError::TooManyDice(300_000_000)));
        assert!(dice.requests().is_empty());
    }

    #[tokio::test]
    async fn test_remote_timeout() {
        let (mut dice, _roller) = RemoteDice::channel(1);
        let mut p = params();
        p.num_attacks = Some(1);

        let mut control = RollControl::default().with_timeout(Duration::from_millis(20));
        let err = resolve(&p, &mut dice, &mut control).await.unwrap_err();
        assert!(matches!(err, ResolveError::Dice(DiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cancel_abandons_pending_roll() {
        let (mut dice, _roller) = RemoteDice::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(0u64);
        // Raised before the command starts: ignored
        cancel_tx.send(1).unwrap();

        let mut p = params();
        p.num_attacks = Some(1);
        let mut control = RollControl::default().with_cancel(cancel_rx);

        let task = tokio::spawn(async move { resolve(&p, &mut dice, &mut control).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        cancel_tx.send(2).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ResolveError::Dice(DiceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_group_is_malformed() {
        let (mut dice, mut roller) = RemoteDice::channel(1);
        tokio::spawn(async move {
            if let Some(pending) = roller.recv().await {
                pending.respond(vec![]);
            }
        });

        let mut p = params();
        p.num_attacks = Some(1);
        let err = resolve(&p, &mut dice, &mut RollControl::default()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Dice(DiceError::Malformed(_))));
    }
}
