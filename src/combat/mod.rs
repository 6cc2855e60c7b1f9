//! Combat resolution
//!
//! Implements d20-style attack commands with:
//! - Dice sources (local PRNG, scripted, remote simulation)
//! - Attack rolls with advantage/disadvantage and crits
//! - Typed damage expressions (e.g. "3d8fi+1d12co+3")
//! - Immunity, resistance, and vulnerability
//! - Two-phase batched resolution with timeout and cancellation

mod attack;
mod damage;
mod dice;
mod resolver;

pub use attack::{attack_groups, AttackOutcome, RollMode, MAX_ATTACKS, NATURAL_CRIT};
pub use damage::{
    parse_damage_expression, Amount, DamageComponent, DamageInstance, DamageParseError, DamageSlot,
    Defenses, HpResult, Sign, Term, MAX_FLAT_VALUE,
};
pub use dice::{
    DiceError, DiceGroup, DiceSource, FixedDice, GroupId, GroupResult, RemoteDice, RemoteRoll,
    RngDice, RollPhase, RollRequest, MAX_DICE_PER_COMMAND, MAX_DICE_PER_GROUP, MAX_SIDES,
};
pub use resolver::{resolve, Resolution, ResolveError, RollControl, DEFAULT_ROLL_TIMEOUT};
