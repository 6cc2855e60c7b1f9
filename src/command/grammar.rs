//! Per-role grammars
//!
//! Each role has its own grammar over normalized segment text. A
//! keyword-less segment is tried against every grammar whose role is still
//! open; the resulting candidates are assigned by the parser.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::combat::{
    parse_damage_expression, Amount, DamageComponent, RollMode, Sign, Term, MAX_FLAT_VALUE,
};

/// Semantic roles of a command, in assignment priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Attack,
    TargetAc,
    Damage,
    Hp,
    Res,
    Vul,
    Imm,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Attack,
        Role::TargetAc,
        Role::Damage,
        Role::Hp,
        Role::Res,
        Role::Vul,
        Role::Imm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Role::Attack => "attack",
            Role::TargetAc => "target_ac",
            Role::Damage => "damage",
            Role::Hp => "hp",
            Role::Res => "res",
            Role::Vul => "vul",
            Role::Imm => "imm",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parsed attack roll, e.g. `3a+5-1d4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackRoll {
    pub count: u32,
    pub mode: RollMode,
    pub color: String,
    pub bonus: Vec<Term>,
}

/// Parsed target AC, e.g. `15+2-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmorClass {
    pub base: i64,
    pub modifier: i64,
}

impl ArmorClass {
    pub fn total(&self) -> i64 {
        self.base + self.modifier
    }
}

/// One successful parse of a segment for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Attack(AttackRoll),
    TargetAc(ArmorClass),
    Damage(Vec<DamageComponent>),
    Hp(i64),
    Res(Vec<String>),
    Vul(Vec<String>),
    Imm(Vec<String>),
}

impl Candidate {
    pub fn role(&self) -> Role {
        match self {
            Candidate::Attack(_) => Role::Attack,
            Candidate::TargetAc(_) => Role::TargetAc,
            Candidate::Damage(_) => Role::Damage,
            Candidate::Hp(_) => Role::Hp,
            Candidate::Res(_) => Role::Res,
            Candidate::Vul(_) => Role::Vul,
            Candidate::Imm(_) => Role::Imm,
        }
    }
}

static ATTACK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([nad])([a-z]*)((?:[+-](?:\d+d\d+|\d+))*)$").unwrap());

static BONUS_TERM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+-])(\d+d\d+|\d+)").unwrap());

static AC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)((?:[+-]\d+)*)$").unwrap());

static AC_MODIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+-]\d+").unwrap());

static HP_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

static TYPE_LIST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+(?:\+[a-z]+)*$").unwrap());

fn parse_bonus_term(sign: &str, body: &str) -> Option<Term> {
    let sign = if sign == "-" { Sign::Minus } else { Sign::Plus };
    let amount = match body.split_once('d') {
        Some((count, sides)) => Amount::dice(count, sides)?,
        None => Amount::flat(body)?,
    };
    Some(Term::new(sign, amount))
}

/// `<count><n|a|d>[color][±bonus...]`
pub fn parse_attack_roll(text: &str) -> Option<AttackRoll> {
    let caps = ATTACK_REGEX.captures(text)?;
    let count = caps[1].parse().ok()?;
    let mode = caps[2].chars().next().and_then(RollMode::from_letter)?;

    let bonus = BONUS_TERM_REGEX
        .captures_iter(&caps[4])
        .map(|term| parse_bonus_term(&term[1], &term[2]))
        .collect::<Option<Vec<_>>>()?;

    Some(AttackRoll {
        count,
        mode,
        color: caps[3].to_string(),
        bonus,
    })
}

fn within_limit(value: i64) -> Option<i64> {
    (value.abs() <= MAX_FLAT_VALUE).then_some(value)
}

/// `<base>[±modifier...]`, modifiers summed. Base and summed modifier are
/// each limited to [`MAX_FLAT_VALUE`].
pub fn parse_target_ac(text: &str) -> Option<ArmorClass> {
    let caps = AC_REGEX.captures(text)?;
    let base = within_limit(caps[1].parse().ok()?)?;

    let mut modifier: i64 = 0;
    for m in AC_MODIFIER_REGEX.find_iter(&caps[2]) {
        let value = within_limit(m.as_str().parse().ok()?)?;
        modifier = within_limit(modifier + value)?;
    }

    Some(ArmorClass { base, modifier })
}

pub fn parse_hp(text: &str) -> Option<i64> {
    if !HP_REGEX.is_match(text) {
        return None;
    }
    within_limit(text.parse().ok()?)
}

/// `+`-joined lowercase damage type tags
pub fn parse_type_list(text: &str) -> Option<Vec<String>> {
    if !TYPE_LIST_REGEX.is_match(text) {
        return None;
    }
    Some(text.split('+').map(str::to_string).collect())
}

/// Parse text that a keyword has already assigned to `role`.
///
/// An empty damage expression is accepted here as "no damage".
pub fn parse_for_role(role: Role, text: &str) -> Option<Candidate> {
    match role {
        Role::Attack => parse_attack_roll(text).map(Candidate::Attack),
        Role::TargetAc => parse_target_ac(text).map(Candidate::TargetAc),
        Role::Damage => parse_damage_expression(text).ok().map(Candidate::Damage),
        Role::Hp => parse_hp(text).map(Candidate::Hp),
        Role::Res => parse_type_list(text).map(Candidate::Res),
        Role::Vul => parse_type_list(text).map(Candidate::Vul),
        Role::Imm => parse_type_list(text).map(Candidate::Imm),
    }
}

/// Every reading of a keyword-less segment among the roles `open` allows,
/// in priority order.
pub fn classify(text: &str, open: impl Fn(Role) -> bool) -> Vec<Candidate> {
    Role::ALL
        .into_iter()
        .filter(|role| open(*role))
        .filter_map(|role| parse_for_role(role, text))
        .filter(|candidate| !matches!(candidate, Candidate::Damage(terms) if terms.is_empty()))
        .collect()
}
