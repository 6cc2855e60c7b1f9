//! Common test utilities - RollTest harness for end-to-end command tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quickdice::broadcast::{RollBroadcaster, RollEvent};
use quickdice::combat::{DiceSource, FixedDice, GroupResult, RemoteDice, RemoteRoll};
use quickdice::session::RollSession;
use quickdice::store::{CommandStore, MemoryStore};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// A session wired to a broadcaster with one listener attached
pub struct RollTest {
    pub session: RollSession,
    pub events: broadcast::Receiver<RollEvent>,
    pub store: Arc<dyn CommandStore>,
}

impl RollTest {
    pub fn with_dice(dice: impl DiceSource + 'static) -> Self {
        Self::with_store(dice, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(dice: impl DiceSource + 'static, store: Arc<dyn CommandStore>) -> Self {
        let broadcaster = RollBroadcaster::new(16);
        let events = broadcaster.subscribe();
        let session = RollSession::new("tester", Box::new(dice), store.clone())
            .with_broadcaster(broadcaster)
            .with_seed(1234);
        Self {
            session,
            events,
            store,
        }
    }

    /// Scripted dice: one total per group, in request order
    pub fn scripted(values: impl IntoIterator<Item = i64>) -> Self {
        Self::with_dice(FixedDice::new(values))
    }

    /// Adjust the session's builder options
    pub fn map_session(mut self, f: impl FnOnce(RollSession) -> RollSession) -> Self {
        self.session = f(self.session);
        self
    }

    /// Next broadcast event, if one arrives promptly
    pub async fn next_event(&mut self) -> Option<RollEvent> {
        tokio::time::timeout(Duration::from_millis(200), self.events.recv())
            .await
            .ok()?
            .ok()
    }
}

/// Spawn a remote roller that answers each request with `total(count, sides)` per group
pub fn spawn_roller(
    mut requests: mpsc::Receiver<RemoteRoll>,
    total: fn(u32, u32) -> i64,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut answered = 0;
        while let Some(pending) = requests.recv().await {
            let results = pending
                .request()
                .groups
                .iter()
                .map(|g| GroupResult::new(g.id, total(g.count, g.sides)))
                .collect();
            if pending.respond(results) {
                answered += 1;
            }
        }
        answered
    })
}

/// Remote dice backed by a roller that always rolls the maximum
pub fn max_roller() -> (RemoteDice, JoinHandle<usize>) {
    let (dice, requests) = RemoteDice::channel(4);
    let handle = spawn_roller(requests, |count, sides| i64::from(count) * i64::from(sides));
    (dice, handle)
}
