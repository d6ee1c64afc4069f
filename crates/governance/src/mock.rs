//! In-memory membership token and role registry
//!
//! [`MembershipNft`] tracks which principal owns which membership token.
//! [`RoleRegistry`] holds time-bound role grants attached to those tokens.
//! A principal holds a role while it owns a token carrying an unexpired
//! grant of that role made out to it; selling the token ends the role.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use tokengate_common::Address;

use crate::capability::{CapabilityOracle, CollaboratorError, CollaboratorResult, Role};
use crate::clock::Clock;
use crate::membership::MembershipRegistry;

/// Identifier of a membership token
pub type TokenId = u64;

/// Non-fungible membership tokens; one token is one unit of voting weight
#[derive(Debug, Clone, Default)]
pub struct MembershipNft {
    owners: Arc<RwLock<BTreeMap<TokenId, Address>>>,
    max_supply: Option<u64>,
}

impl MembershipNft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of tokens in existence at `max_supply`
    pub fn with_max_supply(mut self, max_supply: u64) -> Self {
        self.max_supply = Some(max_supply);
        self
    }

    pub fn max_supply(&self) -> Option<u64> {
        self.max_supply
    }

    /// Mint `token_id` to `to`; fails if the token already exists or the
    /// supply cap is reached
    pub async fn mint(&self, to: &Address, token_id: TokenId) -> CollaboratorResult<()> {
        let mut owners = self.owners.write().await;
        if owners.contains_key(&token_id) {
            return Err(CollaboratorError::Rejected(format!(
                "token {} already minted",
                token_id
            )));
        }
        if let Some(max) = self.max_supply {
            if owners.len() as u64 >= max {
                return Err(CollaboratorError::Rejected(format!(
                    "max supply of {} tokens reached",
                    max
                )));
            }
        }
        owners.insert(token_id, to.clone());
        info!(token_id, owner = %to, "Minted membership token");
        Ok(())
    }

    /// Move `token_id` from `from` to `to`; only the current owner may transfer
    pub async fn transfer(
        &self,
        from: &Address,
        to: &Address,
        token_id: TokenId,
    ) -> CollaboratorResult<()> {
        let mut owners = self.owners.write().await;
        match owners.get_mut(&token_id) {
            Some(owner) if owner == from => {
                *owner = to.clone();
                debug!(token_id, %from, %to, "Transferred membership token");
                Ok(())
            }
            Some(_) => Err(CollaboratorError::Rejected(format!(
                "{} does not own token {}",
                from, token_id
            ))),
            None => Err(CollaboratorError::Rejected(format!("token {} does not exist", token_id))),
        }
    }

    /// Destroy `token_id`
    pub async fn burn(&self, token_id: TokenId) -> CollaboratorResult<()> {
        let mut owners = self.owners.write().await;
        owners
            .remove(&token_id)
            .map(|_| ())
            .ok_or_else(|| CollaboratorError::Rejected(format!("token {} does not exist", token_id)))
    }

    pub async fn owner_of(&self, token_id: TokenId) -> Option<Address> {
        self.owners.read().await.get(&token_id).cloned()
    }

    /// Tokens currently owned by `owner`, in id order
    pub async fn tokens_of(&self, owner: &Address) -> Vec<TokenId> {
        self.owners
            .read()
            .await
            .iter()
            .filter(|(_, holder)| *holder == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Smallest token id not yet minted
    pub async fn next_token_id(&self) -> TokenId {
        self.owners
            .read()
            .await
            .keys()
            .next_back()
            .map_or(0, |last| last.saturating_add(1))
    }
}

#[async_trait]
impl MembershipRegistry for MembershipNft {
    async fn balance_of(&self, principal: &Address) -> CollaboratorResult<u64> {
        let owners = self.owners.read().await;
        Ok(owners.values().filter(|owner| *owner == principal).count() as u64)
    }

    async fn total_supply(&self) -> CollaboratorResult<u64> {
        Ok(self.owners.read().await.len() as u64)
    }
}

/// A role attached to a membership token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub token_id: TokenId,
    pub recipient: Address,
    /// The grant is valid strictly before this time
    pub expiration_date: u64,
    pub revocable: bool,
}

/// Time-bound, optionally revocable role grants keyed by `(role, token)`
///
/// Stricter than a plain "grant on a token the principal owns" check: the
/// grant must also be made out to the principal. A token bought from
/// another member carries no roles for its new owner until they are
/// granted again.
pub struct RoleRegistry {
    nft: Arc<MembershipNft>,
    clock: Arc<dyn Clock>,
    grants: RwLock<HashMap<(Role, TokenId), RoleGrant>>,
}

impl RoleRegistry {
    /// Create a registry whose grants attach to tokens of `nft`
    pub fn new(nft: Arc<MembershipNft>, clock: Arc<dyn Clock>) -> Self {
        Self {
            nft,
            clock,
            grants: RwLock::new(HashMap::new()),
        }
    }

    /// Grant `role` on `token_id` to `recipient` until `expiration_date`.
    ///
    /// Replaces any earlier grant of the same role on the same token.
    pub async fn grant_role(
        &self,
        role: Role,
        token_id: TokenId,
        recipient: &Address,
        expiration_date: u64,
        revocable: bool,
    ) -> CollaboratorResult<()> {
        let now = self.clock.now();
        if expiration_date <= now {
            return Err(CollaboratorError::Rejected(format!(
                "expiration date {} is not after {}",
                expiration_date, now
            )));
        }
        if self.nft.owner_of(token_id).await.is_none() {
            return Err(CollaboratorError::Rejected(format!("token {} does not exist", token_id)));
        }

        let grant = RoleGrant {
            role,
            token_id,
            recipient: recipient.clone(),
            expiration_date,
            revocable,
        };
        self.grants.write().await.insert((role, token_id), grant);
        info!(%role, token_id, %recipient, expiration_date, "Granted role");
        Ok(())
    }

    /// Remove the grant of `role` on `token_id`; non-revocable grants stay
    pub async fn revoke_role(&self, role: Role, token_id: TokenId) -> CollaboratorResult<()> {
        let mut grants = self.grants.write().await;
        match grants.get(&(role, token_id)) {
            Some(grant) if !grant.revocable => Err(CollaboratorError::Rejected(format!(
                "{} on token {} is not revocable",
                role, token_id
            ))),
            Some(_) => {
                grants.remove(&(role, token_id));
                info!(%role, token_id, "Revoked role");
                Ok(())
            }
            None => Err(CollaboratorError::Rejected(format!(
                "no {} grant on token {}",
                role, token_id
            ))),
        }
    }

    pub async fn role_expiration_date(&self, role: Role, token_id: TokenId) -> Option<u64> {
        self.grants
            .read()
            .await
            .get(&(role, token_id))
            .map(|grant| grant.expiration_date)
    }

    pub async fn recipient_of(&self, role: Role, token_id: TokenId) -> Option<Address> {
        self.grants
            .read()
            .await
            .get(&(role, token_id))
            .map(|grant| grant.recipient.clone())
    }

    /// Roles `principal` currently holds through any of its tokens
    pub async fn roles_of(&self, principal: &Address) -> BTreeSet<Role> {
        let tokens = self.nft.tokens_of(principal).await;
        let now = self.clock.now();
        let grants = self.grants.read().await;
        grants
            .values()
            .filter(|grant| Self::is_valid(grant, principal, &tokens, now))
            .map(|grant| grant.role)
            .collect()
    }

    fn is_valid(grant: &RoleGrant, principal: &Address, tokens: &[TokenId], now: u64) -> bool {
        grant.recipient == *principal
            && grant.expiration_date > now
            && tokens.contains(&grant.token_id)
    }
}

#[async_trait]
impl CapabilityOracle for RoleRegistry {
    async fn has_valid_role(&self, role: Role, principal: &Address) -> CollaboratorResult<bool> {
        let tokens = self.nft.tokens_of(principal).await;
        let now = self.clock.now();
        let grants = self.grants.read().await;
        Ok(tokens.iter().any(|token_id| {
            grants
                .get(&(role, *token_id))
                .map_or(false, |grant| Self::is_valid(grant, principal, &tokens, now))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const DAY: u64 = 24 * 60 * 60;

    async fn fixture() -> (Arc<MembershipNft>, Arc<ManualClock>, RoleRegistry) {
        let nft = Arc::new(MembershipNft::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = RoleRegistry::new(nft.clone(), clock.clone());
        (nft, clock, registry)
    }

    #[tokio::test]
    async fn test_mint_transfer_burn() {
        let nft = MembershipNft::new();
        let alice = Address::from("alice");
        let bob = Address::from("bob");

        nft.mint(&alice, 0).await.unwrap();
        nft.mint(&alice, 1).await.unwrap();
        assert!(nft.mint(&bob, 1).await.is_err());
        assert_eq!(nft.balance_of(&alice).await.unwrap(), 2);
        assert_eq!(nft.next_token_id().await, 2);

        assert!(nft.transfer(&bob, &alice, 0).await.is_err());
        nft.transfer(&alice, &bob, 0).await.unwrap();
        assert_eq!(nft.owner_of(0).await, Some(bob.clone()));
        assert_eq!(nft.tokens_of(&alice).await, vec![1]);

        nft.burn(1).await.unwrap();
        assert_eq!(nft.total_supply().await.unwrap(), 1);
        assert_eq!(nft.balance_of(&alice).await.unwrap(), 0);
        assert!(nft.burn(1).await.is_err());
    }

    #[tokio::test]
    async fn test_max_supply() {
        let nft = MembershipNft::new().with_max_supply(2);
        let alice = Address::from("alice");
        assert_eq!(nft.max_supply(), Some(2));

        nft.mint(&alice, 0).await.unwrap();
        nft.mint(&alice, 1).await.unwrap();
        assert!(matches!(nft.mint(&alice, 2).await, Err(CollaboratorError::Rejected(_))));
        assert_eq!(nft.total_supply().await.unwrap(), 2);

        nft.burn(0).await.unwrap();
        nft.mint(&alice, 2).await.unwrap();
        assert_eq!(nft.tokens_of(&alice).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_role_validity() {
        let (nft, clock, registry) = fixture().await;
        let alice = Address::from("alice");
        nft.mint(&alice, 0).await.unwrap();

        assert!(registry.grant_role(Role::Voter, 0, &alice, 1_000, true).await.is_err());
        assert!(registry.grant_role(Role::Voter, 9, &alice, 5_000, true).await.is_err());

        registry.grant_role(Role::Voter, 0, &alice, 1_000 + DAY, true).await.unwrap();
        assert!(registry.has_valid_role(Role::Voter, &alice).await.unwrap());
        assert!(!registry.has_valid_role(Role::Proposer, &alice).await.unwrap());
        assert_eq!(registry.role_expiration_date(Role::Voter, 0).await, Some(1_000 + DAY));

        clock.set(1_000 + DAY);
        assert!(!registry.has_valid_role(Role::Voter, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_role_follows_token_ownership() {
        let (nft, _clock, registry) = fixture().await;
        let alice = Address::from("alice");
        let bob = Address::from("bob");
        nft.mint(&alice, 0).await.unwrap();
        registry.grant_role(Role::Executor, 0, &alice, 10_000, true).await.unwrap();

        nft.transfer(&alice, &bob, 0).await.unwrap();
        assert!(!registry.has_valid_role(Role::Executor, &alice).await.unwrap());
        // The grant names alice, so bob does not inherit it either
        assert!(!registry.has_valid_role(Role::Executor, &bob).await.unwrap());
        assert_eq!(registry.recipient_of(Role::Executor, 0).await, Some(alice));
    }

    #[tokio::test]
    async fn test_revocation() {
        let (nft, _clock, registry) = fixture().await;
        let alice = Address::from("alice");
        nft.mint(&alice, 0).await.unwrap();
        registry.grant_role(Role::Voter, 0, &alice, 10_000, true).await.unwrap();
        registry.grant_role(Role::Proposer, 0, &alice, 10_000, false).await.unwrap();

        assert_eq!(
            registry.roles_of(&alice).await.into_iter().collect::<Vec<_>>(),
            vec![Role::Voter, Role::Proposer]
        );

        registry.revoke_role(Role::Voter, 0).await.unwrap();
        assert!(registry.revoke_role(Role::Proposer, 0).await.is_err());
        assert!(registry.revoke_role(Role::Admin, 0).await.is_err());
        assert!(!registry.has_valid_role(Role::Voter, &alice).await.unwrap());
        assert!(registry.has_valid_role(Role::Proposer, &alice).await.unwrap());
    }
}
