use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use tokengate_governance::{
    Address, CapabilityOracle, CollaboratorResult, Governance, GovernanceConfig, GovernanceEngine,
    GovernanceError, ManualClock, MembershipNft, ProposalState, Role, Tally,
};

const START: u64 = 1_000_000;
const PERIOD: u64 = 1_000;

struct OpenDoor;

#[async_trait]
impl CapabilityOracle for OpenDoor {
    async fn has_valid_role(&self, _role: Role, _principal: &Address) -> CollaboratorResult<bool> {
        Ok(true)
    }
}

fn voter(index: usize) -> Address {
    Address::from(format!("0xvoter{}", index))
}

/// Mint `weights[i]` tokens to voter i and `idle` tokens to a non-voter
async fn engine(
    weights: &[u64],
    idle: u64,
    quorum_percentage: u8,
) -> (GovernanceEngine, Arc<ManualClock>) {
    let nft = Arc::new(MembershipNft::new());
    let mut token_id = 0;
    for (index, weight) in weights.iter().enumerate() {
        for _ in 0..*weight {
            nft.mint(&voter(index), token_id).await.unwrap();
            token_id += 1;
        }
    }
    for _ in 0..idle {
        nft.mint(&Address::from("0xidle"), token_id).await.unwrap();
        token_id += 1;
    }

    let clock = Arc::new(ManualClock::new(START));
    let config = GovernanceConfig::new(PERIOD, quorum_percentage).unwrap();
    let engine = GovernanceEngine::new(config, Arc::new(OpenDoor), nft)
        .unwrap()
        .with_clock(clock.clone());
    (engine, clock)
}

proptest! {
    #[test]
    fn state_and_execute_agree(
        ballots in prop::collection::vec((0u64..5, any::<bool>()), 0..6),
        idle in 0u64..10,
        quorum in 0u8..=100,
    ) {
        tokio_test::block_on(async {
            let weights: Vec<u64> = ballots.iter().map(|(w, _)| *w).collect();
            let (engine, clock) = engine(&weights, idle, quorum).await;
            let proposer = Address::from("0xproposer");
            let id = engine.create_proposal(&proposer, "P".into(), String::new()).await.unwrap();

            for (index, (_, support)) in ballots.iter().enumerate() {
                engine.vote(&voter(index), id, *support).await.unwrap();
            }
            clock.advance(PERIOD + 1);

            let state = engine.get_proposal_state(id).await.unwrap();
            let executed = engine.execute_proposal(&proposer, id).await;

            match state {
                ProposalState::Succeeded => prop_assert!(executed.is_ok()),
                ProposalState::Defeated => {
                    let refused = matches!(
                        executed,
                        Err(GovernanceError::QuorumNotMet { .. })
                            | Err(GovernanceError::ProposalRejected { .. })
                    );
                    prop_assert!(refused, "defeated proposal executed or failed oddly: {:?}", executed);
                }
                other => prop_assert!(false, "unexpected state {}", other),
            }

            let yes: u64 = ballots.iter().filter(|(_, s)| *s).map(|(w, _)| w).sum();
            let no: u64 = ballots.iter().filter(|(_, s)| !*s).map(|(w, _)| w).sum();
            let supply = weights.iter().sum::<u64>() + idle;
            let expected = Tally::new(yes, no).evaluate(quorum, supply).passed();
            prop_assert_eq!(state == ProposalState::Succeeded, expected);
            Ok(())
        })?;
    }

    #[test]
    fn each_voter_counts_once(
        attempts in prop::collection::vec((0usize..4, any::<bool>()), 1..20),
        weights in prop::collection::vec(1u64..4, 4),
    ) {
        tokio_test::block_on(async {
            let (engine, _clock) = engine(&weights, 0, 30).await;
            let proposer = Address::from("0xproposer");
            let id = engine.create_proposal(&proposer, "P".into(), String::new()).await.unwrap();

            let mut first_vote: HashMap<usize, bool> = HashMap::new();
            for (index, support) in &attempts {
                let result = engine.vote(&voter(*index), id, *support).await;
                if first_vote.contains_key(index) {
                    let rejected = matches!(result, Err(GovernanceError::AlreadyVoted { .. }));
                    prop_assert!(rejected, "second vote by voter {} was not rejected", index);
                } else {
                    prop_assert_eq!(result.unwrap(), weights[*index]);
                    first_vote.insert(*index, *support);
                }
            }

            let proposal = engine.get_proposal(id).await.unwrap();
            let yes: u64 = first_vote.iter().filter(|(_, s)| **s).map(|(i, _)| weights[*i]).sum();
            let no: u64 = first_vote.iter().filter(|(_, s)| !**s).map(|(i, _)| weights[*i]).sum();
            prop_assert_eq!(proposal.yes_votes, yes);
            prop_assert_eq!(proposal.no_votes, no);
            prop_assert_eq!(proposal.voter_count(), first_vote.len());
            Ok(())
        })?;
    }
}
