//! Tokengate
//!
//! Token-gated governance: proposals, weighted votes and one-shot
//! execution, each gated by time-bound roles attached to membership tokens.

/// Module version information
pub mod version {
    /// The current version of the tokengate library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Shared types, logging and configuration
pub mod core {
    pub use tokengate_common as common;
    pub use tokengate_config as config;
    pub use tokengate_storage as storage;
}

/// The governance engine and its collaborators
pub use tokengate_governance as governance;

pub use tokengate_common::Address;
pub use tokengate_config::{GovernanceConfig, Settings};
pub use tokengate_governance::{
    Governance, GovernanceEngine, GovernanceError, GovernanceEvent, GovernanceResult, Proposal,
    ProposalId, ProposalState, Role,
};

#[cfg(test)]
mod tests {
    #[test]
    fn version_is_available() {
        assert!(!super::version::VERSION.is_empty());
    }
}
