//! Proposal execution hook
//!
//! What executing a proposal means is left to the embedder. The engine
//! calls the configured [`ProposalExecutor`] exactly once per proposal,
//! after all execution preconditions hold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::{GovernanceError, GovernanceResult, Proposal, ProposalId};

/// A trait for proposal execution
#[async_trait]
pub trait ProposalExecutor: Send + Sync {
    /// Carry out an approved proposal
    async fn execute_proposal(&self, proposal: &Proposal) -> GovernanceResult<()>;
}

/// An executor that only logs the proposal
#[derive(Debug, Default)]
pub struct LoggingProposalExecutor;

impl LoggingProposalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProposalExecutor for LoggingProposalExecutor {
    async fn execute_proposal(&self, proposal: &Proposal) -> GovernanceResult<()> {
        info!(
            proposal_id = proposal.id,
            title = %proposal.title,
            yes_votes = proposal.yes_votes,
            no_votes = proposal.no_votes,
            "Executing proposal"
        );
        Ok(())
    }
}

/// Records the ids it executes and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingProposalExecutor {
    executed: Mutex<Vec<ProposalId>>,
    fail: AtomicBool,
}

impl RecordingProposalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent executions fail (or succeed again)
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Ids executed so far, in order
    pub fn executed(&self) -> Vec<ProposalId> {
        match self.executed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ProposalExecutor for RecordingProposalExecutor {
    async fn execute_proposal(&self, proposal: &Proposal) -> GovernanceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GovernanceError::Execution(format!(
                "executor refused proposal {}",
                proposal.id
            )));
        }
        let mut executed = match self.executed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        executed.push(proposal.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokengate_common::Address;

    #[tokio::test]
    async fn test_recording_executor() {
        let executor = RecordingProposalExecutor::new();
        let proposal = Proposal::new(4, Address::from("alice"), "t".into(), "d".into(), 0, 1);

        executor.set_fail(true);
        assert!(matches!(
            executor.execute_proposal(&proposal).await,
            Err(GovernanceError::Execution(_))
        ));
        assert!(executor.executed().is_empty());

        executor.set_fail(false);
        executor.execute_proposal(&proposal).await.unwrap();
        assert_eq!(executor.executed(), vec![4]);

        LoggingProposalExecutor::new().execute_proposal(&proposal).await.unwrap();
    }
}
