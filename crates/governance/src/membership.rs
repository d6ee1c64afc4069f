//! Membership registry seam
//!
//! Vote weight is the principal's membership balance at the moment the
//! vote is cast. The quorum denominator is the registry's total supply at
//! the moment the proposal is evaluated.

use async_trait::async_trait;

use tokengate_common::Address;

use crate::capability::CollaboratorResult;

/// Source of membership balances
#[async_trait]
pub trait MembershipRegistry: Send + Sync {
    /// Number of membership units held by `principal`; 0 for non-members
    async fn balance_of(&self, principal: &Address) -> CollaboratorResult<u64>;

    /// Total outstanding membership units
    async fn total_supply(&self) -> CollaboratorResult<u64>;
}
