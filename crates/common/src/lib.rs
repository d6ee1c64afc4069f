//! Common utilities and types for tokengate

pub mod error;
pub mod logging;
pub mod result;
pub mod types;
pub mod utils;

pub use error::Error;
pub use result::Result;
pub use types::Address;
