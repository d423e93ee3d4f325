//! Error types shared by the booking core, the store and the account directory.

use thiserror::Error;

/// Errors raised by `SessionStore` implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock was poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("key {0} is locked by another writer")]
    Busy(String),

    #[error("invalid store key name: {0}")]
    InvalidKeyName(String),

    #[error("corrupted data: {0}")]
    Corrupted(String),
}

/// Outcome of a rejected booking or reset. All variants are recoverable.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("please choose both a court and a time slot")]
    MissingSelection,

    #[error("{court} at {time} is already booked")]
    SlotTaken { time: String, court: String },

    #[error("you have already booked {sport} today")]
    AlreadyBookedToday { sport: String },

    /// Sport, court or time outside the canonical shape. Never caused by end-user state.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("manual reset requires explicit confirmation")]
    ConfirmationRequired,

    #[error("invalid reset time {0:?}, expected HH:MM")]
    InvalidResetTime(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(String),

    #[error("username {0} is already taken")]
    UsernameTaken(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type BookingResult<T> = std::result::Result<T, BookingError>;
