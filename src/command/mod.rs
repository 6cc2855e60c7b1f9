//! Command parser
//!
//! Turns free-form text such as `3a+2 vs 13 dmg 1d8fi hp 40 res fi` into
//! [`AttackParameters`]. Whitespace is insignificant and keywords are
//! optional where a segment can only mean one thing:
//!
//! 1. Keyword segments are parsed with their role's grammar.
//! 2. A keyword-less segment that fits exactly one open role takes it;
//!    otherwise it is deferred with all of its readings.
//! 3. Deferred segments, in order, take their highest-priority role that is
//!    still open (`attack > target_ac > damage > hp > res > vul > imm`).

mod grammar;
mod params;
mod segment;

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::combat::{MAX_ATTACKS, MAX_DICE_PER_COMMAND};

pub use grammar::{classify, parse_for_role, ArmorClass, AttackRoll, Candidate, Role};
pub use params::AttackParameters;
pub use segment::{normalize, segment, Keyword, Segment};

/// Reasons a command is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("invalid {role}: '{text}'")]
    InvalidSegment { role: Role, text: String },

    #[error("multiple {0} values")]
    Duplicate(&'static str),

    #[error("unable to determine what '{0}' is")]
    Unresolvable(String),

    #[error("invalid number of attacks: {0} (1 to {max})", max = MAX_ATTACKS)]
    InvalidAttackCount(u32),

    #[error("command could roll {0} dice (limit {max})", max = MAX_DICE_PER_COMMAND)]
    TooManyDice(u64),

    #[error("invalid {keyword} name '{name}'")]
    InvalidName { keyword: Keyword, name: String },
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub params: AttackParameters,
    /// Canonical `keyword text` form without save/load/delete, used as a label
    pub cleaned: String,
}

impl Command {
    /// Whether anything besides save/load/delete was given
    pub fn has_roll(&self) -> bool {
        !self.cleaned.is_empty()
    }
}

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").unwrap());

fn assign_meta(params: &mut AttackParameters, keyword: Keyword, name: &str) -> Result<(), ParseError> {
    let slot = match keyword {
        Keyword::Save => &mut params.save_content,
        Keyword::Load => &mut params.load_content,
        _ => &mut params.delete_content,
    };
    if slot.is_some() {
        return Err(ParseError::Duplicate(keyword.as_str()));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(ParseError::InvalidName {
            keyword,
            name: name.to_string(),
        });
    }
    *slot = Some(name.to_string());
    Ok(())
}

/// Parse a command. Pure: the same input always yields the same result.
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    parse_normalized(&normalize(input)).inspect_err(|e| debug!(input, error = %e, "Rejected command"))
}

fn parse_normalized(normalized: &str) -> Result<Command, ParseError> {
    if normalized.is_empty() {
        return Err(ParseError::Empty);
    }

    let segments = segment(normalized);
    let mut params = AttackParameters::default();
    let mut filled: BTreeSet<Role> = BTreeSet::new();
    let mut deferred: Vec<(&str, Vec<Candidate>)> = Vec::new();
    let mut labels = Vec::with_capacity(segments.len());

    for seg in &segments {
        match seg.keyword {
            Some(keyword) => match keyword.role() {
                None => assign_meta(&mut params, keyword, &seg.text)?,
                Some(role) => {
                    if !filled.insert(role) {
                        return Err(ParseError::Duplicate(role.name()));
                    }
                    let candidate = parse_for_role(role, &seg.text).ok_or_else(|| {
                        ParseError::InvalidSegment {
                            role,
                            text: seg.text.clone(),
                        }
                    })?;
                    params.assign(candidate);
                    labels.push(seg.label());
                }
            },
            None => {
                let mut candidates = classify(&seg.text, |role| !filled.contains(&role));
                if candidates.len() == 1 {
                    let candidate = candidates.remove(0);
                    filled.insert(candidate.role());
                    params.assign(candidate);
                } else {
                    deferred.push((seg.text.as_str(), candidates));
                }
                labels.push(seg.label());
            }
        }
    }

    for (text, candidates) in deferred {
        // Candidates are in priority order
        let candidate = candidates
            .into_iter()
            .find(|c| !filled.contains(&c.role()))
            .ok_or_else(|| ParseError::Unresolvable(text.to_string()))?;
        filled.insert(candidate.role());
        params.assign(candidate);
    }

    if let Some(count) = params.num_attacks {
        if count == 0 || count > MAX_ATTACKS {
            return Err(ParseError::InvalidAttackCount(count));
        }
    }
    let dice = params.max_dice();
    if dice > MAX_DICE_PER_COMMAND {
        return Err(ParseError::TooManyDice(dice));
    }

    Ok(Command {
        params,
        cleaned: labels.join(" "),
    })
}
