// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Type Definitions

use serde::{Deserialize, Serialize};

use crate::time_series::TimestepSnapshot;

/// Message identifier. Issued from 1 upwards, never reused.
pub type MessageId = u64;

/// Position of an agent in the graph arena.
pub type AgentIdx = u32;

// ─── Message ─────────────────────────────────────────────────────────────────

/// Immutable message record. Bot-authored messages always have quality 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub is_by_bot: bool,
    pub quality: f64,
    pub appeal: f64,
}

// ─── MessageTable ────────────────────────────────────────────────────────────

/// Every message ever created, indexed by `id - 1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageTable {
    messages: Vec<Message>,
}

impl MessageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        let slot = usize::try_from(id.checked_sub(1)?).ok()?;
        self.messages.get(slot)
    }

    /// Next id the table expects to receive.
    pub fn next_id(&self) -> MessageId {
        self.messages.len() as MessageId + 1
    }

    /// Append a message. Ids must arrive densely and in order.
    pub fn push(&mut self, message: Message) -> Result<(), crate::SimError> {
        let expected = self.next_id();
        if message.id != expected {
            return Err(crate::SimError::NonDenseMessageIds {
                expected,
                got: message.id,
            });
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

// ─── SystemState ─────────────────────────────────────────────────────────────

/// Convergence triple, updated once per timestep after aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    /// Exponential moving average of mean human-feed quality.
    pub quality: f64,
    /// Relative change of `quality` over the last timestep.
    pub quality_diff: f64,
    pub time_step: u64,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            quality: 1.0,
            quality_diff: 1.0,
            time_step: 0,
        }
    }
}

// ─── EnginePhase ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnginePhase {
    Running = 0,
    Converged = 1,        // TERMINAL: quality_diff <= epsilon
    StepLimitReached = 2, // TERMINAL: step cap hit
    Aborted = 3,          // TERMINAL: an agent action failed
}

impl EnginePhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

// ─── Feed requests ───────────────────────────────────────────────────────────

/// One agent's request to push a message into a follower's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRequest {
    pub target: AgentIdx,
    pub source: AgentIdx,
    pub message: MessageId,
    /// `theta` for bots, 1 otherwise.
    pub copies: u32,
}

// ─── ReshareEvent ────────────────────────────────────────────────────────────

/// Cascade edge: `source` pushed `message_id` into `target`'s feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshareEvent {
    pub message_id: MessageId,
    pub time_step: u64,
    pub source: String,
    pub target: String,
}

// ─── StepResult ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub state: SystemState,
    pub phase: EnginePhase,
    pub snapshot: TimestepSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: MessageId) -> Message {
        Message {
            id,
            is_by_bot: false,
            quality: 0.5,
            appeal: 0.5,
        }
    }

    #[test]
    fn test_table_lookup_is_one_based() {
        let mut table = MessageTable::new();
        table.push(msg(1)).unwrap();
        table.push(msg(2)).unwrap();
        assert_eq!(table.get(1).unwrap().id, 1);
        assert_eq!(table.get(2).unwrap().id, 2);
        assert!(table.get(0).is_none());
        assert!(table.get(3).is_none());
        assert_eq!(table.next_id(), 3);
    }

    #[test]
    fn test_table_rejects_gaps() {
        let mut table = MessageTable::new();
        table.push(msg(1)).unwrap();
        let err = table.push(msg(3)).unwrap_err();
        assert!(matches!(
            err,
            crate::SimError::NonDenseMessageIds { expected: 2, got: 3 }
        ));
    }

    #[test]
    fn test_initial_state_matches_reference() {
        let state = SystemState::default();
        assert_eq!(state.quality, 1.0);
        assert_eq!(state.quality_diff, 1.0);
        assert_eq!(state.time_step, 0);
    }

    #[test]
    fn test_phase_terminality() {
        assert!(!EnginePhase::Running.is_terminal());
        assert!(EnginePhase::Converged.is_terminal());
        assert!(EnginePhase::StepLimitReached.is_terminal());
        assert!(EnginePhase::Aborted.is_terminal());
    }
}
