//! Vote tallying
//!
//! The quorum and majority rules live here and nowhere else, so the state
//! query and the execute guard always agree on whether a proposal passed.
//!
//! Quorum: `(yes + no) * 100 >= quorum_percentage * total_supply`, with
//! both sides computed in `u128` so large supplies cannot overflow.
//! Majority: strictly more yes weight than no weight.

use serde::{Deserialize, Serialize};

/// Accumulated vote weights of a proposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Weight voting in favour
    pub yes_votes: u64,
    /// Weight voting against
    pub no_votes: u64,
}

impl Tally {
    pub fn new(yes_votes: u64, no_votes: u64) -> Self {
        Self { yes_votes, no_votes }
    }

    /// Total weight that took part
    pub fn participation(&self) -> u128 {
        u128::from(self.yes_votes) + u128::from(self.no_votes)
    }

    /// Whether enough of `total_supply` took part
    pub fn quorum_met(&self, quorum_percentage: u8, total_supply: u64) -> bool {
        self.participation() * 100 >= u128::from(quorum_percentage) * u128::from(total_supply)
    }

    /// Whether yes strictly outweighs no
    pub fn has_majority(&self) -> bool {
        self.yes_votes > self.no_votes
    }

    /// Evaluate the tally once voting has closed
    pub fn evaluate(&self, quorum_percentage: u8, total_supply: u64) -> VotingResult {
        VotingResult {
            tally: *self,
            total_supply,
            quorum_percentage,
            has_quorum: self.quorum_met(quorum_percentage, total_supply),
            has_majority: self.has_majority(),
        }
    }
}

/// Result of evaluating a closed vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingResult {
    pub tally: Tally,
    /// Supply the quorum was measured against
    pub total_supply: u64,
    pub quorum_percentage: u8,
    pub has_quorum: bool,
    pub has_majority: bool,
}

impl VotingResult {
    /// Quorum is checked before majority
    pub fn outcome(&self) -> Outcome {
        if !self.has_quorum {
            Outcome::QuorumNotMet
        } else if !self.has_majority {
            Outcome::Rejected
        } else {
            Outcome::Passed
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome() == Outcome::Passed
    }
}

/// Verdict of a closed vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    QuorumNotMet,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_boundary() {
        // 30% of 10 units is exactly 3
        assert!(Tally::new(2, 1).quorum_met(30, 10));
        assert!(!Tally::new(2, 0).quorum_met(30, 10));
        // 30% of 7 units is 2.1, so 2 is short and 3 is enough
        assert!(!Tally::new(2, 0).quorum_met(30, 7));
        assert!(Tally::new(3, 0).quorum_met(30, 7));
    }

    #[test]
    fn test_zero_supply_and_zero_quorum() {
        assert!(Tally::new(0, 0).quorum_met(30, 0));
        assert!(Tally::new(0, 0).quorum_met(0, 1_000));
        assert_eq!(Tally::new(0, 0).evaluate(30, 0).outcome(), Outcome::Rejected);
    }

    #[test]
    fn test_no_overflow_for_large_values() {
        let tally = Tally::new(u64::MAX, u64::MAX);
        assert!(tally.quorum_met(100, u64::MAX));
        assert!(!Tally::new(u64::MAX / 2, 0).quorum_met(100, u64::MAX));
    }

    #[test]
    fn test_outcome_order() {
        assert_eq!(Tally::new(1, 1).evaluate(30, 100).outcome(), Outcome::QuorumNotMet);
        assert_eq!(Tally::new(20, 20).evaluate(30, 100).outcome(), Outcome::Rejected);
        assert_eq!(Tally::new(21, 20).evaluate(30, 100).outcome(), Outcome::Passed);
        assert!(Tally::new(3, 0).evaluate(30, 10).passed());
    }
}
