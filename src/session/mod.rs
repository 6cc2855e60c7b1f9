//! Roll sessions
//!
//! A session owns everything that outlives a single command: the dice
//! source, the saved-command store, the broadcaster, the history and the
//! cancellation signal. Commands run one at a time through
//! [`RollSession::execute`].

mod history;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::broadcast::{RollBroadcaster, RollEvent};
use crate::combat::{resolve, DiceSource, Resolution, ResolveError, RollControl, DEFAULT_ROLL_TIMEOUT};
use crate::command::{parse_command, Command, ParseError};
use crate::store::{CommandStore, SavedCommand, StoreError};

pub use history::{HistoryEntry, RollHistory, DEFAULT_HISTORY_LIMIT};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no saved command named '{0}'")]
    UnknownSavedCommand(String),

    #[error("nothing to save as '{0}'")]
    NothingToSave(String),
}

/// Handle that abandons the session's pending dice roll.
/// Can be used from another task while a command is running.
#[derive(Debug, Clone)]
pub struct RollCanceller {
    signal: Arc<watch::Sender<u64>>,
}

impl RollCanceller {
    pub fn cancel(&self) {
        self.signal.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

/// What an executed command did
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// The command that ran, after expanding any `load`
    pub command: Command,
    /// `None` when the input was only save/load/delete bookkeeping
    pub resolution: Option<Resolution>,
    pub saved: Option<String>,
    pub deleted: Option<String>,
    pub loaded: Option<String>,
}

pub struct RollSession {
    player_id: String,
    dice: Box<dyn DiceSource>,
    store: Arc<dyn CommandStore>,
    broadcaster: Option<RollBroadcaster>,
    history: RollHistory,
    timeout: Duration,
    seed: Option<u64>,
    rolls: u64,
    hidden: bool,
    cancel_tx: Arc<watch::Sender<u64>>,
    cancel_rx: watch::Receiver<u64>,
}

impl RollSession {
    pub fn new(player_id: &str, dice: Box<dyn DiceSource>, store: Arc<dyn CommandStore>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(0);
        Self {
            player_id: player_id.to_string(),
            dice,
            store,
            broadcaster: None,
            history: RollHistory::default(),
            timeout: DEFAULT_ROLL_TIMEOUT,
            seed: None,
            rolls: 0,
            hidden: false,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: RollBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base seed for dice requests; each command gets its own derived seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = RollHistory::new(limit);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn history(&self) -> &RollHistory {
        &self.history
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hidden sessions keep their results out of the broadcast
    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn canceller(&self) -> RollCanceller {
        RollCanceller {
            signal: self.cancel_tx.clone(),
        }
    }

    pub async fn saved_commands(&self) -> Result<Vec<SavedCommand>, SessionError> {
        Ok(self.store.list().await?)
    }

    fn next_control(&mut self) -> RollControl {
        // Damage phases use seed + 1, so commands step by two
        let seed = self.seed.map(|base| base.wrapping_add(self.rolls.wrapping_mul(2)));
        self.rolls = self.rolls.wrapping_add(1);

        RollControl {
            timeout: self.timeout,
            seed,
            cancel: Some(self.cancel_rx.clone()),
        }
    }

    /// Expand `load <name>`: the stored command followed by the rest of this input
    async fn expand_load(&self, command: Command) -> Result<Command, SessionError> {
        let Some(name) = command.params.load_content.clone() else {
            return Ok(command);
        };

        let stored = self
            .store
            .load(&name)
            .await?
            .ok_or_else(|| SessionError::UnknownSavedCommand(name.clone()))?;

        let mut expanded = parse_command(&format!("{} {}", stored, command.cleaned))?;
        expanded.params.save_content = command.params.save_content;
        expanded.params.delete_content = command.params.delete_content;
        expanded.params.load_content = Some(name);
        Ok(expanded)
    }

    /// Parse and run one command.
    ///
    /// Nothing is stored, deleted, recorded or published unless parsing
    /// and resolution both succeed.
    pub async fn execute(&mut self, input: &str) -> Result<CommandOutcome, SessionError> {
        let command = parse_command(input)?;
        let command = self.expand_load(command).await?;
        let params = &command.params;

        if let Some(name) = &params.save_content {
            if !command.has_roll() {
                return Err(SessionError::NothingToSave(name.clone()));
            }
        }

        let resolution = if command.has_roll() {
            let mut control = self.next_control();
            Some(resolve(params, &mut *self.dice, &mut control).await?)
        } else {
            None
        };

        let mut deleted = None;
        if let Some(name) = &params.delete_content {
            if self.store.delete(name).await? {
                info!(name = %name, "Deleted saved command");
                deleted = Some(name.clone());
            } else {
                info!(name = %name, "No saved command to delete");
            }
        }

        let mut saved = None;
        if let Some(name) = &params.save_content {
            self.store.save(name, &command.cleaned).await?;
            info!(name = %name, command = %command.cleaned, "Saved command");
            saved = Some(name.clone());
        }

        if let Some(resolution) = &resolution {
            let event = RollEvent::new(
                &self.player_id,
                &command.cleaned,
                resolution,
                self.dice.is_physical(),
            );
            self.history.push(HistoryEntry {
                event: event.clone(),
                local: true,
            });

            match &self.broadcaster {
                Some(broadcaster) if !self.hidden => {
                    broadcaster.publish(event);
                }
                _ => {}
            }
        }

        let loaded = params.load_content.clone();
        Ok(CommandOutcome {
            command,
            resolution,
            saved,
            deleted,
            loaded,
        })
    }

    /// Record a result received from another participant.
    /// Returns false for events already in the history.
    pub fn ingest(&mut self, event: RollEvent) -> bool {
        if self.history.contains(event.id) {
            return false;
        }
        if event.player_id == self.player_id {
            warn!(event = %event.id, "Received roll event under our own player id");
        }
        self.history.push(HistoryEntry { event, local: false });
        true
    }
}
