//! Dice sources
//!
//! A dice source turns batches of "roll N dice of type T" into one total per
//! group. Local sources sample a PRNG; remote sources hand the batch to an
//! external (physical or shared) simulation and wait for its answer.

use std::collections::VecDeque;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Most dice a single group may hold
pub const MAX_DICE_PER_GROUP: u32 = 1_000;

/// Most sides a die may have
pub const MAX_SIDES: u32 = 1_000;

/// Most dice one command may roll across both phases, crits included
pub const MAX_DICE_PER_COMMAND: u64 = 100_000;

/// Errors raised while obtaining dice results
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("dice roll timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("dice roll was cancelled")]
    Cancelled,

    #[error("dice roller is not available")]
    Disconnected,

    #[error("malformed dice results: {0}")]
    Malformed(String),
}

/// Stable identifier of a dice group within one command.
///
/// `attack` is the attack index, `slot` the position of the group among
/// that attack's dice (d20s first, then bonus or damage dice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId {
    pub attack: usize,
    pub slot: usize,
}

impl GroupId {
    pub fn new(attack: usize, slot: usize) -> Self {
        Self { attack, slot }
    }
}

/// One logical group of identical dice, e.g. "3d8" for fire damage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceGroup {
    pub id: GroupId,
    /// Number of dice to roll
    pub count: u32,
    /// Number of sides per die
    pub sides: u32,
    /// Cosmetic theme hint for rollers that render dice (colour or damage type)
    pub tag: String,
}

impl DiceGroup {
    pub fn new(id: GroupId, count: u32, sides: u32, tag: impl Into<String>) -> Self {
        Self {
            id,
            count,
            sides,
            tag: tag.into(),
        }
    }

    /// A single d20 for an attack roll
    pub fn d20(id: GroupId, tag: impl Into<String>) -> Self {
        Self::new(id, 1, 20, tag)
    }

    /// Whether `total` is a possible outcome for this group
    pub fn accepts(&self, total: i64) -> bool {
        let count = i64::from(self.count);
        total >= count && total <= count * i64::from(self.sides)
    }
}

/// Which resolution phase a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollPhase {
    Attack,
    Damage,
}

/// A batch of dice groups rolled together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollRequest {
    pub id: Uuid,
    pub phase: RollPhase,
    /// Seed for deterministic/shared simulations
    pub seed: u64,
    pub groups: Vec<DiceGroup>,
}

impl RollRequest {
    pub fn new(phase: RollPhase, seed: u64, groups: Vec<DiceGroup>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
            seed,
            groups,
        }
    }
}

/// Total reported for one group. `None` means the roller produced no usable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResult {
    pub id: GroupId,
    pub total: Option<i64>,
}

impl GroupResult {
    pub fn new(id: GroupId, total: i64) -> Self {
        Self {
            id,
            total: Some(total),
        }
    }

    pub fn invalid(id: GroupId) -> Self {
        Self { id, total: None }
    }
}

/// Capability that produces dice totals
#[async_trait]
pub trait DiceSource: Send {
    /// Roll every group in the request and report one result per group
    async fn roll(&mut self, request: &RollRequest) -> Result<Vec<GroupResult>, DiceError>;

    /// Whether results come from a physical/shared simulation
    fn is_physical(&self) -> bool {
        false
    }
}

/// Local pseudo-random dice
#[derive(Debug)]
pub struct RngDice {
    rng: StdRng,
}

impl RngDice {
    /// Dice seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible dice
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn roll_group(&mut self, group: &DiceGroup) -> GroupResult {
        // Crits may double a group past MAX_DICE_PER_GROUP
        let too_many = u64::from(group.count) > MAX_DICE_PER_COMMAND;
        if group.count < 1 || too_many || !(2..=MAX_SIDES).contains(&group.sides) {
            debug!(count = group.count, sides = group.sides, "Unrollable dice group");
            return GroupResult::invalid(group.id);
        }

        let total: i64 = (0..group.count)
            .map(|_| i64::from(self.rng.random_range(1..=group.sides)))
            .sum();
        GroupResult::new(group.id, total)
    }
}

impl Default for RngDice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiceSource for RngDice {
    async fn roll(&mut self, request: &RollRequest) -> Result<Vec<GroupResult>, DiceError> {
        Ok(request.groups.iter().map(|g| self.roll_group(g)).collect())
    }
}

/// Dice with predetermined totals, one value per group in request order.
///
/// Used for dice rolled by hand at the table and for deterministic tests.
#[derive(Debug, Default)]
pub struct FixedDice {
    values: VecDeque<i64>,
    fallback: Option<i64>,
    served: Vec<RollRequest>,
}

impl FixedDice {
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            values: values.into_iter().collect(),
            fallback: None,
            served: Vec::new(),
        }
    }

    /// Every group totals `value`
    pub fn always(value: i64) -> Self {
        Self::new([]).with_fallback(value)
    }

    /// Value used once the scripted values run out
    pub fn with_fallback(mut self, value: i64) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Requests served so far, oldest first
    pub fn requests(&self) -> &[RollRequest] {
        &self.served
    }

    /// Scripted values not yet consumed
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

#[async_trait]
impl DiceSource for FixedDice {
    async fn roll(&mut self, request: &RollRequest) -> Result<Vec<GroupResult>, DiceError> {
        let mut results = Vec::with_capacity(request.groups.len());
        for group in &request.groups {
            let total = self
                .values
                .pop_front()
                .or(self.fallback)
                .ok_or_else(|| DiceError::Malformed("scripted dice exhausted".to_string()))?;
            results.push(GroupResult::new(group.id, total));
        }
        self.served.push(request.clone());
        Ok(results)
    }
}

/// A roll waiting for the external roller to answer
#[derive(Debug)]
pub struct RemoteRoll {
    request: RollRequest,
    reply: oneshot::Sender<Vec<GroupResult>>,
}

impl RemoteRoll {
    pub fn request(&self) -> &RollRequest {
        &self.request
    }

    /// Deliver results. Returns false when the requester already gave up.
    pub fn respond(self, results: Vec<GroupResult>) -> bool {
        self.reply.send(results).is_ok()
    }
}

/// Dice delegated to an external simulation over a channel
#[derive(Debug, Clone)]
pub struct RemoteDice {
    requests: mpsc::Sender<RemoteRoll>,
}

impl RemoteDice {
    /// Create a remote source and the receiving end the roller consumes
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RemoteRoll>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { requests: tx }, rx)
    }
}

#[async_trait]
impl DiceSource for RemoteDice {
    async fn roll(&mut self, request: &RollRequest) -> Result<Vec<GroupResult>, DiceError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(RemoteRoll {
                request: request.clone(),
                reply,
            })
            .await
            .map_err(|_| DiceError::Disconnected)?;

        debug!(request = %request.id, groups = request.groups.len(), "Waiting for remote dice");
        response.await.map_err(|_| DiceError::Disconnected)
    }

    fn is_physical(&self) -> bool {
        true
    }
}
