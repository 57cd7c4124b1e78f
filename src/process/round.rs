// ============================================================================
// Consensus Round Tracking
// ============================================================================

/// Counts proposal attempts within a block height.
///
/// Owned by the proposal handler and threaded into [`crate::domain::BlockContext`]
/// instead of living in process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundTracker {
    height: Option<u32>,
    round: u32,
}

impl RoundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proposal at `height` and return its round: zero for a new
    /// height, one more than the previous round for a repeated height.
    pub fn advance(&mut self, height: u32) -> u32 {
        if self.height == Some(height) {
            self.round = self.round.saturating_add(1);
        } else {
            self.height = Some(height);
            self.round = 0;
        }
        self.round
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn round(&self) -> u32 {
        self.round
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_increments_within_height() {
        let mut rounds = RoundTracker::new();
        assert_eq!(rounds.advance(7), 0);
        assert_eq!(rounds.advance(7), 1);
        assert_eq!(rounds.advance(7), 2);
        assert_eq!(rounds.advance(8), 0);
        assert_eq!(rounds.height(), Some(8));
    }

    #[test]
    fn test_first_height_zero_starts_at_round_zero() {
        let mut rounds = RoundTracker::new();
        assert_eq!(rounds.advance(0), 0);
    }
}
