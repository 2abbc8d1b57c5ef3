//! Error taxonomy for the ledger core.
//!
//! The parsing layers (money, dates) deliberately never error — they degrade
//! to `0` / empty string, see `money.rs` and `dates.rs`. Everything that can
//! legitimately refuse a write surfaces here as a typed variant so UI
//! collaborators can branch on it instead of string-matching messages.

use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Gift card redemption asked for more than the card holds.
    /// The card is left untouched — no balance change, no history entry.
    #[error("insufficient balance on {code}: balance {balance:.2}, requested {requested:.2}")]
    InsufficientBalance {
        code: String,
        balance: f64,
        requested: f64,
    },

    /// Manual or reassigned gift-card code collides with an existing card.
    #[error("gift card code already in use: {0}")]
    DuplicateCode(String),

    #[error("gift card not found: {0}")]
    CardNotFound(String),

    #[error("staff member not found: {0}")]
    StaffNotFound(String),

    #[error("client not found: {0}")]
    ClientNotFound(String),

    /// Royalty redemption asked for more points than the client has.
    #[error("insufficient points for {phone}: have {points}, requested {requested}")]
    InsufficientPoints {
        phone: String,
        points: i64,
        requested: i64,
    },

    /// Caller handed the core something it cannot act on (empty batch,
    /// unknown transaction type for a balance mutation, ...).
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A previous panic poisoned the connection mutex.
    #[error("database lock poisoned")]
    LockPoisoned,
}
