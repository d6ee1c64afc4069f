//! Scripted automation scenarios
//!
//! Each scenario runs against in-memory membership tokens and role grants
//! with a manual clock, so a full voting cycle completes instantly.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use tokengate_common::utils::{days_to_secs, timestamp_secs};
use tokengate_common::Address;
use tokengate_config::Settings;
use tokengate_governance::{
    Clock, Governance, GovernanceEngine, ManualClock, MemberInfo, MembershipNft, Proposal,
    ProposalId, ProposalState, Role, RoleRegistry, TokenId,
};
use tokengate_storage::FileStorage;

/// Most membership tokens the scenario DAO will mint
pub const MAX_SUPPLY: u64 = 1000;

/// A member to enroll: one membership token plus the listed roles
#[derive(Debug, Clone)]
pub struct MemberData {
    pub address: Address,
    pub roles: Vec<Role>,
    pub role_expiration_days: u64,
}

/// The engine together with the collaborators it was built on
pub struct Dao {
    pub engine: GovernanceEngine,
    pub nft: Arc<MembershipNft>,
    pub roles: Arc<RoleRegistry>,
    pub clock: Arc<ManualClock>,
}

impl Dao {
    /// Build an engine from `settings`, restoring proposals from
    /// `data_dir` when one is configured
    pub async fn new(settings: &Settings) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(timestamp_secs()));
        let nft = Arc::new(MembershipNft::new().with_max_supply(MAX_SUPPLY));
        let roles = Arc::new(RoleRegistry::new(nft.clone(), clock.clone()));

        let mut engine = GovernanceEngine::new(settings.governance, roles.clone(), nft.clone())?
            .with_clock(clock.clone());

        if let Some(data_dir) = &settings.data_dir {
            let storage = FileStorage::new(data_dir)
                .await
                .with_context(|| format!("Failed to open data directory {}", data_dir))?;
            engine = engine.with_storage(Arc::new(storage));
            engine.load().await?;
        }

        Ok(Self {
            engine,
            nft,
            roles,
            clock,
        })
    }

    /// Mint the next free membership token to `to`
    pub async fn mint_membership(&self, to: &Address) -> Result<TokenId> {
        let token_id = self.nft.next_token_id().await;
        self.nft.mint(to, token_id).await?;
        println!("Minted membership token {} to {}", token_id, to);
        Ok(token_id)
    }

    /// Grant `role` on `token_id` to `member` for `expiration_days`
    pub async fn grant_role(
        &self,
        role: Role,
        member: &Address,
        token_id: TokenId,
        expiration_days: u64,
    ) -> Result<()> {
        let expiration_date = self.clock.now() + days_to_secs(expiration_days);
        self.roles
            .grant_role(role, token_id, member, expiration_date, true)
            .await?;
        println!("Granted {} to {} for token {}", role, member, token_id);
        Ok(())
    }

    /// Mint one token per member and grant its roles on that token
    pub async fn setup_members(&self, members: &[MemberData]) -> Result<()> {
        println!("Setting up {} members...", members.len());
        for member in members {
            let token_id = self.mint_membership(&member.address).await?;
            for role in &member.roles {
                self.grant_role(*role, &member.address, token_id, member.role_expiration_days)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn member_info(&self, address: &Address) -> Result<MemberInfo> {
        Ok(self.engine.member_info(address).await?)
    }

    /// The proposal and its evaluated state
    pub async fn proposal_report(&self, id: ProposalId) -> Result<(Proposal, ProposalState)> {
        let proposal = self.engine.get_proposal(id).await?;
        let state = self.engine.get_proposal_state(id).await?;
        Ok((proposal, state))
    }
}

fn initial_members() -> Vec<MemberData> {
    vec![
        MemberData {
            address: Address::from("0x63e5a246937549b3eccbb410af42da54f999d172"),
            roles: vec![Role::Admin, Role::Proposer, Role::Executor, Role::Voter],
            role_expiration_days: 365,
        },
        MemberData {
            address: Address::from("0x3f01e90459c9931b2ff9a40bf81933273e7ea209"),
            roles: vec![Role::Proposer, Role::Voter],
            role_expiration_days: 365,
        },
        MemberData {
            address: Address::from("0x8b3ecf29f52c6c4943dbad4f34d8b79077c238dd"),
            roles: vec![Role::Voter],
            role_expiration_days: 365,
        },
    ]
}

fn print_json<T: Serialize + ?Sized>(label: &str, value: &T) -> Result<()> {
    println!("{}: {}", label, serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The automation scenarios
pub struct DaoScenarios<'a> {
    dao: &'a Dao,
}

impl<'a> DaoScenarios<'a> {
    pub fn new(dao: &'a Dao) -> Self {
        Self { dao }
    }

    /// Enroll the initial members and report on each
    pub async fn setup_complete_dao(&self) -> Result<Vec<MemberInfo>> {
        info!("Setting up DAO");
        let members = initial_members();
        self.dao.setup_members(&members).await?;

        let mut reports = Vec::with_capacity(members.len());
        for member in &members {
            let report = self.dao.member_info(&member.address).await?;
            print_json("Member", &report)?;
            reports.push(report);
        }
        println!("DAO setup complete");
        Ok(reports)
    }

    /// Propose, vote, let the window lapse, and execute if the vote passed
    pub async fn run_governance_cycle(&self) -> Result<(ProposalId, ProposalState)> {
        self.setup_complete_dao().await?;
        info!("Running governance cycle");

        let members = initial_members();
        let proposer = &members[0].address;
        let id = self
            .dao
            .engine
            .create_proposal(
                proposer,
                "Increase Membership Limit".to_string(),
                "Raise the maximum number of members from 100 to 200".to_string(),
            )
            .await?;
        println!("Created proposal {}", id);

        for member in &members {
            let weight = self.dao.engine.vote(&member.address, id, true).await?;
            println!("{} voted YES with weight {}", member.address, weight);
        }

        let period = self.dao.engine.voting_period();
        self.dao.clock.advance(period + 1);
        println!("Advanced clock {} seconds past the voting window", period + 1);

        let (proposal, state) = self.dao.proposal_report(id).await?;
        print_json("Proposal", &proposal)?;
        println!("State: {}", state);

        if state == ProposalState::Succeeded {
            self.dao.engine.execute_proposal(proposer, id).await?;
            println!("Executed proposal {}", id);
        }

        let (_, state) = self.dao.proposal_report(id).await?;
        println!("Governance cycle complete, final state: {}", state);
        Ok((id, state))
    }

    /// Enroll a new member with the Voter role and report on them
    pub async fn manage_membership(&self) -> Result<MemberInfo> {
        self.setup_complete_dao().await?;
        info!("Managing membership");

        let new_member = Address::from("0x1234567890123456789012345678901234567890");
        let token_id = self.dao.mint_membership(&new_member).await?;
        self.dao.grant_role(Role::Voter, &new_member, token_id, 365).await?;

        let report = self.dao.member_info(&new_member).await?;
        print_json("New member", &report)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_scenario() {
        let dao = Dao::new(&Settings::default()).await.unwrap();
        let reports = DaoScenarios::new(&dao).setup_complete_dao().await.unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].roles.len(), 4);
        assert_eq!(reports[2].roles.iter().copied().collect::<Vec<_>>(), vec![Role::Voter]);
        assert!(reports.iter().all(|r| r.voting_weight == 1));
        assert_eq!(dao.nft.max_supply(), Some(MAX_SUPPLY));
    }

    #[tokio::test]
    async fn test_governance_scenario_executes() {
        let dao = Dao::new(&Settings::default()).await.unwrap();
        let (id, state) = DaoScenarios::new(&dao).run_governance_cycle().await.unwrap();

        assert_eq!(id, 0);
        assert_eq!(state, ProposalState::Executed);
        assert_eq!(dao.engine.events().await.len(), 5);
    }

    #[tokio::test]
    async fn test_members_scenario() {
        let dao = Dao::new(&Settings::default()).await.unwrap();
        let report = DaoScenarios::new(&dao).manage_membership().await.unwrap();

        assert_eq!(report.balance, 1);
        assert_eq!(report.roles.into_iter().collect::<Vec<_>>(), vec![Role::Voter]);
    }

    #[tokio::test]
    async fn test_governance_scenario_persists() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_dir: Some(dir.path().to_string_lossy().to_string()),
            ..Settings::default()
        };

        {
            let dao = Dao::new(&settings).await.unwrap();
            DaoScenarios::new(&dao).run_governance_cycle().await.unwrap();
        }

        let dao = Dao::new(&settings).await.unwrap();
        assert_eq!(dao.engine.proposal_count().await, 1);
        let (proposal, _) = dao.proposal_report(0).await.unwrap();
        assert!(proposal.executed);
    }
}
