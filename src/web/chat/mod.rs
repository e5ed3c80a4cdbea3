// Chat turn engine: wire transport, state machine, and in-flight registry.

pub mod controller;
pub mod transport;

pub use controller::{run_turn, ChatRequestSpec, ChatTurn, TurnOutcome, TurnState};
pub use transport::NormalizedFrame;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-flight turns by id, so `/api/chat/stop` can find the one to cancel.
#[derive(Default)]
pub struct TurnRegistry {
    turns: Mutex<HashMap<String, Arc<ChatTurn>>>,
}

impl TurnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, turn: Arc<ChatTurn>) {
        let mut turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        turns.insert(turn.id().to_string(), turn);
    }

    pub fn remove(&self, id: &str) {
        let mut turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        turns.remove(id);
    }

    /// Request cancellation of one turn. Returns false for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        let turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        match turns.get(id) {
            Some(turn) => {
                turn.cancel();
                true
            }
            None => false,
        }
    }
}
