//! Datastore error types.
//!
//! Only configuration problems are recoverable. Misuse of the store
//! (holding an element of a buffer that is not active, running out of
//! buffer ids, oversized single requests) is a contract violation and
//! panics.

use std::error::Error;
use std::fmt;

/// Errors that can occur while setting up a datastore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A buffer type configuration that no store can honour.
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => {
                write!(f, "invalid buffer type config: {reason}")
            }
        }
    }
}

impl Error for StoreError {}
