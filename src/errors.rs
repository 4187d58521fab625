//! Unified error types for the launcher core.
//!
//! `Error` covers configuration, storage and validation failures. `PurchaseError`
//! is the narrower taxonomy surfaced by the billing flows; user cancellation and
//! pending transactions are not errors and never show up here.

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Database error from the `SQLite` backed key-value store
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A stored blob could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A passcode that is not exactly four digits was offered for saving
    #[error("Passcode must be exactly 4 digits, got {digits} digit(s)")]
    InvalidPasscode {
        /// Number of digits left after filtering
        digits: usize,
    },

    /// Generic key-value store failure (used by in-process stores)
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable description of the problem
        message: String,
    },

    /// Purchase or restore failure
    #[error(transparent)]
    Purchase(#[from] PurchaseError),
}

/// Failures of the purchase and restore flows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// The billing collaborator could not verify the transaction
    #[error("The purchase could not be verified. Please try again later.")]
    VerificationFailed,

    /// The plan's product id is missing from the billing catalog
    #[error("Product '{product_id}' was not found. Please restart the app and try again.")]
    ProductNotFound {
        /// External product identifier that was looked up
        product_id: String,
    },

    /// The billing collaborator itself failed (network, store unavailable, ...)
    #[error("Billing service error: {message}")]
    Billing {
        /// Message reported by the collaborator
        message: String,
    },
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
