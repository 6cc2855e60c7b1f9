//! quickdice - attack and damage roller for d20 tabletop combat
//!
//! Parses compact attack commands, resolves them against a dice source and
//! shares the results with other participants.

pub mod broadcast;
pub mod combat;
pub mod command;
pub mod config;
pub mod report;
pub mod session;
pub mod store;

use std::sync::Arc;

use tracing::info;

use broadcast::RollBroadcaster;
use combat::RngDice;
use config::RollerConfig;
use session::RollSession;
use store::{CommandStore, MemoryStore, SqliteStore, StoreError};

pub use command::{parse_command, Command, ParseError};
pub use session::{CommandOutcome, SessionError};

/// Build a session with local dice from configuration
pub async fn open_session(
    config: &RollerConfig,
    broadcaster: RollBroadcaster,
) -> Result<RollSession, StoreError> {
    let store: Arc<dyn CommandStore> = match config.db_path.as_deref() {
        Some(path) => Arc::new(SqliteStore::open(Some(path)).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let dice = match config.seed {
        Some(seed) => RngDice::seeded(seed),
        None => RngDice::new(),
    };

    let mut session = RollSession::new(&config.player_id, Box::new(dice), store)
        .with_broadcaster(broadcaster)
        .with_timeout(config.roll_timeout())
        .with_history_limit(config.history_limit)
        .with_hidden(config.hidden);
    if let Some(seed) = config.seed {
        session = session.with_seed(seed);
    }

    info!(player = %config.player_id, persistent = config.db_path.is_some(), "Session ready");
    Ok(session)
}
