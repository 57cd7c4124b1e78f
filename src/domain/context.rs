// ============================================================================
// Block Context
// Explicit per-call execution context (height, time, round, mode)
// ============================================================================

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether state changes are authoritative or speculative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecMode {
    /// Block execution; mutations are kept and off-chain updates are published
    Commit,
    /// Proposal validation on a scratch copy; nothing is published
    Replay,
}

/// Context threaded through every state-machine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockContext {
    pub height: u32,
    pub block_time: DateTime<Utc>,
    /// Attempt number within `height`
    pub round: u32,
    pub mode: ExecMode,
}

impl BlockContext {
    pub fn commit(height: u32, block_time: DateTime<Utc>) -> Self {
        Self {
            height,
            block_time,
            round: 0,
            mode: ExecMode::Commit,
        }
    }

    pub fn replay(height: u32, block_time: DateTime<Utc>, round: u32) -> Self {
        Self {
            height,
            block_time,
            round,
            mode: ExecMode::Replay,
        }
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }

    /// Same block position, replay mode.
    pub fn as_replay(mut self) -> Self {
        self.mode = ExecMode::Replay;
        self
    }

    pub fn is_replay(&self) -> bool {
        self.mode == ExecMode::Replay
    }
}
