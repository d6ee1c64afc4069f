//! Result type for tokengate

use crate::error::Error;

/// Result type for tokengate
pub type Result<T> = std::result::Result<T, Error>;
