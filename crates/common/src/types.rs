//! Common types used throughout tokengate

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Identifier of a principal (an account able to hold tokens and roles).
///
/// Addresses are compared case-insensitively for hex-style account strings,
/// so they are normalised to lowercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a new address, rejecting empty or whitespace-only input
    pub fn new<S: Into<String>>(address: S) -> Result<Self, Error> {
        let address = address.into();
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("address must not be empty"));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Get the address as a string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.trim().to_lowercase())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}
