//! Governance engine
//!
//! Mutating operations run one at a time behind a write gate. Each one
//! checks its preconditions against a snapshot, applies the change to a
//! copy of the proposal, persists the copy together with its event record,
//! and only then commits both to memory and broadcasts the event. A failure
//! at any step leaves memory untouched and rolls back whatever was already
//! written to storage.
//!
//! Reads take the state lock only long enough to copy a proposal out, so
//! they never wait on a collaborator call made by a writer.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use tokengate_common::Address;
use tokengate_config::GovernanceConfig;
use tokengate_storage::{JsonStorage, MemoryStorage, Storage};

use crate::{
    capability::{CapabilityOracle, Role},
    clock::{Clock, SystemClock},
    events::{EventRecord, GovernanceEvent},
    execution::{LoggingProposalExecutor, ProposalExecutor},
    membership::MembershipRegistry,
    store::ProposalStore,
    voting::{Outcome, VotingResult},
    ErrorKind, Governance, GovernanceError, GovernanceResult, Proposal, ProposalId, ProposalState,
};

/// Path constants for storage
const PROPOSALS_PATH: &str = "governance/proposals";
const EVENTS_PATH: &str = "governance/events";

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

fn proposal_key(id: ProposalId) -> String {
    format!("{}/{}", PROPOSALS_PATH, id)
}

fn event_key(sequence: u64) -> String {
    format!("{}/{}", EVENTS_PATH, sequence)
}

/// Report about one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub address: Address,
    /// Membership tokens held
    pub balance: u64,
    /// Weight a vote cast now would carry
    pub voting_weight: u64,
    /// Roles currently held
    pub roles: BTreeSet<Role>,
}

#[derive(Debug, Default)]
struct EngineState {
    proposals: ProposalStore,
    receipts: Vec<EventRecord>,
}

/// The token-gated governance engine
pub struct GovernanceEngine {
    config: GovernanceConfig,
    roles: Arc<dyn CapabilityOracle>,
    membership: Arc<dyn MembershipRegistry>,
    storage: Arc<dyn Storage>,
    executor: Arc<dyn ProposalExecutor>,
    clock: Arc<dyn Clock>,
    state: RwLock<EngineState>,
    write_gate: Mutex<()>,
    events_tx: broadcast::Sender<GovernanceEvent>,
}

impl GovernanceEngine {
    /// Create an engine with in-memory storage, the logging executor and
    /// the system clock
    pub fn new(
        config: GovernanceConfig,
        roles: Arc<dyn CapabilityOracle>,
        membership: Arc<dyn MembershipRegistry>,
    ) -> GovernanceResult<Self> {
        config.validate()?;
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            roles,
            membership,
            storage: Arc::new(MemoryStorage::new()),
            executor: Arc::new(LoggingProposalExecutor::new()),
            clock: Arc::new(SystemClock),
            state: RwLock::new(EngineState::default()),
            write_gate: Mutex::new(()),
            events_tx,
        })
    }

    /// Use `clock` as the source of time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist proposals and events to `storage`
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    /// Run `executor` when a proposal is executed
    pub fn with_executor(mut self, executor: Arc<dyn ProposalExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the in-memory state with what is persisted in storage
    pub async fn load(&self) -> GovernanceResult<()> {
        let _gate = self.write_gate.lock().await;

        let mut proposals = Vec::new();
        for key in self.storage.list(PROPOSALS_PATH).await? {
            let proposal: Proposal = self.storage.get_json(&key).await?;
            proposals.push(proposal);
        }
        let proposals = ProposalStore::from_proposals(proposals)?;

        let mut receipts = Vec::new();
        for key in self.storage.list(EVENTS_PATH).await? {
            let record: EventRecord = self.storage.get_json(&key).await?;
            receipts.push(record);
        }
        receipts.sort_by_key(|record| record.sequence);
        for (index, record) in receipts.iter().enumerate() {
            if record.sequence != index as u64 {
                return Err(GovernanceError::Serialization(format!(
                    "event log is not dense: expected {}, found {}",
                    index, record.sequence
                )));
            }
        }

        info!(
            proposals = proposals.len(),
            events = receipts.len(),
            "Loaded governance state from storage"
        );
        let mut state = self.state.write().await;
        *state = EngineState { proposals, receipts };
        Ok(())
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.events_tx.subscribe()
    }

    /// The receipt log in sequence order
    pub async fn events(&self) -> Vec<EventRecord> {
        self.state.read().await.receipts.clone()
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn voting_period(&self) -> u64 {
        self.config.voting_period_secs
    }

    pub fn quorum_percentage(&self) -> u8 {
        self.config.quorum_percentage
    }

    pub fn role_oracle(&self) -> &Arc<dyn CapabilityOracle> {
        &self.roles
    }

    pub fn membership(&self) -> &Arc<dyn MembershipRegistry> {
        &self.membership
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Ask the oracle whether `principal` holds `role`
    pub async fn has_valid_role(&self, role: Role, principal: &Address) -> GovernanceResult<bool> {
        Ok(self.roles.has_valid_role(role, principal).await?)
    }

    /// Number of proposals created so far
    pub async fn proposal_count(&self) -> u64 {
        self.state.read().await.proposals.next_id()
    }

    /// All proposals in id order
    pub async fn list_proposals(&self) -> Vec<Proposal> {
        self.state.read().await.proposals.iter().cloned().collect()
    }

    /// Balance, weight and roles of `principal`
    pub async fn member_info(&self, principal: &Address) -> GovernanceResult<MemberInfo> {
        let balance = self.membership.balance_of(principal).await?;
        let mut roles = BTreeSet::new();
        for role in Role::ALL {
            if self.roles.has_valid_role(role, principal).await? {
                roles.insert(role);
            }
        }

        Ok(MemberInfo {
            address: principal.clone(),
            balance,
            voting_weight: balance,
            roles,
        })
    }

    async fn require_role(&self, role: Role, principal: &Address) -> GovernanceResult<()> {
        if self.roles.has_valid_role(role, principal).await? {
            Ok(())
        } else {
            Err(GovernanceError::InsufficientRolePermissions {
                principal: principal.clone(),
                role,
            })
        }
    }

    async fn snapshot(&self, proposal_id: ProposalId) -> Option<Proposal> {
        self.state.read().await.proposals.get(proposal_id).cloned()
    }

    async fn evaluate(&self, proposal: &Proposal) -> GovernanceResult<VotingResult> {
        let total_supply = self.membership.total_supply().await?;
        Ok(proposal
            .tally()
            .evaluate(self.config.quorum_percentage, total_supply))
    }

    async fn next_record(&self, event: GovernanceEvent) -> EventRecord {
        let sequence = self.state.read().await.receipts.len() as u64;
        EventRecord {
            sequence,
            timestamp: self.clock.now(),
            event,
        }
    }

    /// Write a proposal and its event record, undoing the proposal write
    /// if the record cannot be stored
    async fn persist(
        &self,
        proposal: &Proposal,
        previous: Option<&Proposal>,
        record: &EventRecord,
    ) -> GovernanceResult<()> {
        self.storage.put_json(&proposal_key(proposal.id), proposal).await?;
        if let Err(e) = self.storage.put_json(&event_key(record.sequence), record).await {
            self.restore(proposal.id, previous).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Best-effort return of a proposal key to its earlier content
    async fn restore(&self, proposal_id: ProposalId, previous: Option<&Proposal>) {
        let key = proposal_key(proposal_id);
        let result = match previous {
            Some(proposal) => self.storage.put_json(&key, proposal).await,
            None => self.storage.delete(&key).await,
        };
        if let Err(e) = result {
            error!(proposal_id, "Failed to roll back proposal in storage: {}", e);
        }
    }

    async fn discard_record(&self, sequence: u64) {
        if let Err(e) = self.storage.delete(&event_key(sequence)).await {
            error!(sequence, "Failed to roll back event record in storage: {}", e);
        }
    }

    async fn commit(&self, proposal: Proposal, record: EventRecord) -> GovernanceResult<()> {
        let mut state = self.state.write().await;
        if proposal.id == state.proposals.next_id() {
            state.proposals.insert(proposal)?;
        } else {
            state.proposals.replace(proposal)?;
        }
        state.receipts.push(record);
        Ok(())
    }

    fn publish(&self, event: GovernanceEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn log_failure(operation: &str, principal: &Address, err: &GovernanceError) {
        match err.kind() {
            ErrorKind::Internal => {
                error!(operation, %principal, condition = err.condition(), "{}", err)
            }
            _ => debug!(operation, %principal, condition = err.condition(), "{}", err),
        }
    }

    async fn create_proposal_inner(
        &self,
        principal: &Address,
        title: String,
        description: String,
    ) -> GovernanceResult<ProposalId> {
        let _gate = self.write_gate.lock().await;
        self.require_role(Role::Proposer, principal).await?;

        let now = self.clock.now();
        let id = self.state.read().await.proposals.next_id();
        let proposal = Proposal::new(
            id,
            principal.clone(),
            title,
            description,
            now,
            self.config.voting_period_secs,
        );
        let record = self
            .next_record(GovernanceEvent::ProposalCreated {
                id,
                proposer: principal.clone(),
                title: proposal.title.clone(),
            })
            .await;

        self.persist(&proposal, None, &record).await?;
        let event = record.event.clone();
        self.commit(proposal, record).await?;
        self.publish(event);

        info!(proposal_id = id, proposer = %principal, "Created proposal");
        Ok(id)
    }

    async fn vote_inner(
        &self,
        principal: &Address,
        proposal_id: ProposalId,
        support: bool,
    ) -> GovernanceResult<u64> {
        let _gate = self.write_gate.lock().await;
        let proposal = self
            .snapshot(proposal_id)
            .await
            .ok_or(GovernanceError::ProposalDoesNotExist(proposal_id))?;
        self.require_role(Role::Voter, principal).await?;

        if !proposal.is_open_for_voting(self.clock.now()) {
            return Err(GovernanceError::VotingEnded(proposal_id));
        }
        if proposal.has_voted(principal) {
            return Err(GovernanceError::AlreadyVoted {
                proposal_id,
                voter: principal.clone(),
            });
        }

        let weight = self.membership.balance_of(principal).await?;
        let mut updated = proposal.clone();
        updated.record_vote(principal.clone(), support, weight)?;
        let record = self
            .next_record(GovernanceEvent::VoteCast {
                proposal_id,
                voter: principal.clone(),
                support,
                weight,
            })
            .await;

        self.persist(&updated, Some(&proposal), &record).await?;
        let event = record.event.clone();
        self.commit(updated, record).await?;
        self.publish(event);

        info!(proposal_id, voter = %principal, support, weight, "Vote cast");
        Ok(weight)
    }

    async fn execute_proposal_inner(
        &self,
        principal: &Address,
        proposal_id: ProposalId,
    ) -> GovernanceResult<()> {
        let _gate = self.write_gate.lock().await;
        let proposal = self
            .snapshot(proposal_id)
            .await
            .ok_or(GovernanceError::ProposalDoesNotExist(proposal_id))?;
        self.require_role(Role::Executor, principal).await?;

        if proposal.executed {
            return Err(GovernanceError::ProposalNotActive(proposal_id));
        }
        if !proposal.is_voting_closed(self.clock.now()) {
            return Err(GovernanceError::VotingNotEnded(proposal_id));
        }

        let result = self.evaluate(&proposal).await?;
        match result.outcome() {
            Outcome::Passed => {}
            Outcome::QuorumNotMet => {
                return Err(GovernanceError::QuorumNotMet {
                    proposal_id,
                    participation: proposal.yes_votes.saturating_add(proposal.no_votes),
                    total_supply: result.total_supply,
                    quorum_percentage: result.quorum_percentage,
                })
            }
            Outcome::Rejected => {
                return Err(GovernanceError::ProposalRejected {
                    proposal_id,
                    yes_votes: proposal.yes_votes,
                    no_votes: proposal.no_votes,
                })
            }
        }

        let mut updated = proposal.clone();
        updated.executed = true;
        let record = self
            .next_record(GovernanceEvent::ProposalExecuted { proposal_id })
            .await;

        self.persist(&updated, Some(&proposal), &record).await?;
        if let Err(e) = self.executor.execute_proposal(&updated).await {
            warn!(proposal_id, "Executor failed, rolling back: {}", e);
            self.discard_record(record.sequence).await;
            self.restore(proposal_id, Some(&proposal)).await;
            return Err(match e {
                e @ GovernanceError::Execution(_) => e,
                other => GovernanceError::Execution(other.to_string()),
            });
        }

        let event = record.event.clone();
        self.commit(updated, record).await?;
        self.publish(event);

        info!(proposal_id, executor = %principal, "Executed proposal");
        Ok(())
    }
}

#[async_trait]
impl Governance for GovernanceEngine {
    async fn create_proposal(
        &self,
        principal: &Address,
        title: String,
        description: String,
    ) -> GovernanceResult<ProposalId> {
        self.create_proposal_inner(principal, title, description)
            .await
            .map_err(|e| {
                Self::log_failure("create_proposal", principal, &e);
                e
            })
    }

    async fn vote(
        &self,
        principal: &Address,
        proposal_id: ProposalId,
        support: bool,
    ) -> GovernanceResult<u64> {
        self.vote_inner(principal, proposal_id, support)
            .await
            .map_err(|e| {
                Self::log_failure("vote", principal, &e);
                e
            })
    }

    async fn execute_proposal(
        &self,
        principal: &Address,
        proposal_id: ProposalId,
    ) -> GovernanceResult<()> {
        self.execute_proposal_inner(principal, proposal_id)
            .await
            .map_err(|e| {
                Self::log_failure("execute_proposal", principal, &e);
                e
            })
    }

    async fn get_proposal(&self, proposal_id: ProposalId) -> GovernanceResult<Proposal> {
        self.snapshot(proposal_id)
            .await
            .ok_or(GovernanceError::ProposalDoesNotExist(proposal_id))
    }

    async fn get_proposal_state(&self, proposal_id: ProposalId) -> GovernanceResult<ProposalState> {
        let proposal = match self.snapshot(proposal_id).await {
            Some(proposal) => proposal,
            None => return Ok(ProposalState::Pending),
        };

        if proposal.executed {
            return Ok(ProposalState::Executed);
        }
        if !proposal.is_voting_closed(self.clock.now()) {
            return Ok(ProposalState::Active);
        }

        let result = self.evaluate(&proposal).await?;
        Ok(if result.passed() {
            ProposalState::Succeeded
        } else {
            ProposalState::Defeated
        })
    }

    async fn get_voting_weight(&self, principal: &Address) -> GovernanceResult<u64> {
        Ok(self.membership.balance_of(principal).await?)
    }
}
