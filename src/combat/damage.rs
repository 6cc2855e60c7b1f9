//! Damage expressions and type-based modifiers
//!
//! Handles:
//! - Parsing `+`-joined damage terms (`2d6fi`, `3`, `-1d4`, `5bl`)
//! - Free-form damage type tags
//! - Immunity (0 damage), resistance (halved, rounded down), vulnerability (doubled)

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dice::{MAX_DICE_PER_GROUP, MAX_SIDES};

/// Largest flat value, armor class or hit point total a command may use
pub const MAX_FLAT_VALUE: i64 = 1_000_000;

/// Sign of a term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sign {
    #[default]
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl Sign {
    fn from_prefix(s: &str) -> Self {
        if s == "-" {
            Sign::Minus
        } else {
            Sign::Plus
        }
    }

    /// Apply this sign to a magnitude
    pub fn apply(&self, value: i64) -> i64 {
        match self {
            Sign::Plus => value,
            Sign::Minus => value.saturating_neg(),
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Plus => write!(f, "+"),
            Sign::Minus => write!(f, "-"),
        }
    }
}

/// Magnitude of a term: either dice to roll or a literal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Amount {
    Dice { count: u32, sides: u32 },
    Flat(i64),
}

impl Amount {
    /// Parse `<count>d<sides>`; `None` when either is out of range
    pub fn dice(count: &str, sides: &str) -> Option<Amount> {
        let count: u32 = count.parse().ok()?;
        let sides: u32 = sides.parse().ok()?;
        (count <= MAX_DICE_PER_GROUP && sides <= MAX_SIDES).then_some(Amount::Dice { count, sides })
    }

    /// Parse a flat magnitude; `None` above [`MAX_FLAT_VALUE`]
    pub fn flat(value: &str) -> Option<Amount> {
        let value: i64 = value.parse().ok()?;
        (value <= MAX_FLAT_VALUE).then_some(Amount::Flat(value))
    }

    pub fn is_dice(&self) -> bool {
        matches!(self, Amount::Dice { .. })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Dice { count, sides } => write!(f, "{}d{}", count, sides),
            Amount::Flat(value) => write!(f, "{}", value),
        }
    }
}

/// A signed, typeless term. Attack bonuses are lists of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub sign: Sign,
    pub amount: Amount,
}

impl Term {
    pub fn new(sign: Sign, amount: Amount) -> Self {
        Self { sign, amount }
    }

    pub fn is_dice(&self) -> bool {
        self.amount.is_dice()
    }
}

/// One typed term of a damage expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageComponent {
    pub sign: Sign,
    pub amount: Amount,
    /// Lowercase type tag; empty means untyped
    pub damage_type: String,
}

impl DamageComponent {
    pub fn dice(count: u32, sides: u32, damage_type: &str) -> Self {
        Self {
            sign: Sign::Plus,
            amount: Amount::Dice { count, sides },
            damage_type: damage_type.to_string(),
        }
    }

    pub fn flat(value: i64, damage_type: &str) -> Self {
        Self {
            sign: Sign::Plus,
            amount: Amount::Flat(value),
            damage_type: damage_type.to_string(),
        }
    }

    pub fn negated(mut self) -> Self {
        self.sign = Sign::Minus;
        self
    }

    pub fn is_dice(&self) -> bool {
        self.amount.is_dice()
    }
}

impl fmt::Display for DamageComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sign == Sign::Minus {
            write!(f, "-")?;
        }
        write!(f, "{}{}", self.amount, self.damage_type)
    }
}

/// Damage expression parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DamageParseError {
    #[error("invalid damage term '{0}'")]
    InvalidTerm(String),
}

/// Sign, count or value, optional `d<sides>`, optional type letters
static DAMAGE_TERM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d+)(?:d(\d+))?([a-z]*)$").unwrap());

/// Parse a damage expression such as `3d8fi+1d12co+3bl`.
///
/// The expression is split on `+`; blank terms are skipped, so an empty
/// expression yields an empty list ("no damage"). A `-` stays attached to
/// its term and becomes that component's sign.
///
/// # Examples
/// ```
/// use quickdice::combat::parse_damage_expression;
///
/// let components = parse_damage_expression("1d6fi+3").unwrap();
/// assert_eq!(components.len(), 2);
/// assert!(components[0].is_dice());
/// assert_eq!(components[0].damage_type, "fi");
///
/// assert!(parse_damage_expression("1d").is_err());
/// assert!(parse_damage_expression("fi").is_err());
/// ```
pub fn parse_damage_expression(expr: &str) -> Result<Vec<DamageComponent>, DamageParseError> {
    expr.split('+')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(parse_damage_term)
        .collect()
}

fn parse_damage_term(term: &str) -> Result<DamageComponent, DamageParseError> {
    let lowered = term.to_lowercase();
    let invalid = || DamageParseError::InvalidTerm(term.to_string());
    let caps = DAMAGE_TERM_REGEX.captures(&lowered).ok_or_else(invalid)?;

    let sign = Sign::from_prefix(&caps[1]);
    let damage_type = &caps[4];

    // "1d" / "1dfi": a dangling 'd' is a malformed die, not a type tag
    if caps.get(3).is_none() && damage_type.starts_with('d') {
        return Err(invalid());
    }

    let amount = match caps.get(3) {
        Some(sides) => Amount::dice(&caps[2], sides.as_str()),
        None => Amount::flat(&caps[2]),
    }
    .ok_or_else(invalid)?;

    Ok(DamageComponent {
        sign,
        amount,
        damage_type: damage_type.to_string(),
    })
}

/// Resistances, vulnerabilities and immunities of the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defenses {
    pub res: Vec<String>,
    pub vul: Vec<String>,
    pub imm: Vec<String>,
}

impl Defenses {
    pub fn new(res: Vec<String>, vul: Vec<String>, imm: Vec<String>) -> Self {
        Self { res, vul, imm }
    }

    fn listed(list: &[String], damage_type: &str) -> bool {
        list.iter().any(|t| t.eq_ignore_ascii_case(damage_type))
    }

    pub fn is_immune(&self, damage_type: &str) -> bool {
        Self::listed(&self.imm, damage_type)
    }

    pub fn is_resistant(&self, damage_type: &str) -> bool {
        Self::listed(&self.res, damage_type)
    }

    pub fn is_vulnerable(&self, damage_type: &str) -> bool {
        Self::listed(&self.vul, damage_type)
    }

    /// Scale a non-negative damage value by the target's defenses.
    ///
    /// Immunity wins outright. Otherwise resistance halves (rounding down)
    /// and vulnerability then doubles, so a type that is both comes out as
    /// `(value / 2) * 2`.
    pub fn apply(&self, value: i64, damage_type: &str) -> i64 {
        if self.is_immune(damage_type) {
            return 0;
        }

        let mut value = value;
        if self.is_resistant(damage_type) {
            value = value.div_euclid(2);
        }
        if self.is_vulnerable(damage_type) {
            value = value.saturating_mul(2);
        }
        value
    }
}

/// Final damage of one component for one attack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageInstance {
    pub value: i64,
    pub damage_type: String,
}

impl DamageInstance {
    pub fn new(value: i64, damage_type: &str) -> Self {
        Self {
            value,
            damage_type: damage_type.to_string(),
        }
    }
}

/// Damage outcome of one attack. Serialized as `"m"` for a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DamageSlot {
    Miss,
    Hit(Vec<DamageInstance>),
}

impl DamageSlot {
    pub fn is_miss(&self) -> bool {
        matches!(self, DamageSlot::Miss)
    }

    pub fn instances(&self) -> &[DamageInstance] {
        match self {
            DamageSlot::Miss => &[],
            DamageSlot::Hit(instances) => instances,
        }
    }

    pub fn total(&self) -> i64 {
        self.instances()
            .iter()
            .fold(0, |total, d| total.saturating_add(d.value))
    }
}

const MISS_MARKER: &str = "m";

impl Serialize for DamageSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DamageSlot::Miss => serializer.serialize_str(MISS_MARKER),
            DamageSlot::Hit(instances) => instances.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DamageSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Marker(String),
            Instances(Vec<DamageInstance>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Marker(m) if m == MISS_MARKER => Ok(DamageSlot::Miss),
            Repr::Marker(m) => Err(serde::de::Error::custom(format!(
                "unknown damage marker '{}'",
                m
            ))),
            Repr::Instances(instances) => Ok(DamageSlot::Hit(instances)),
        }
    }
}

/// Hit points before and after the command. `new` may go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpResult {
    pub old: i64,
    pub new: i64,
}

impl HpResult {
    pub fn after(old: i64, total_damage: i64) -> Self {
        Self {
            old,
            new: old.saturating_sub(total_damage),
        }
    }
}
