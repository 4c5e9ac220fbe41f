//! Error types for catalog operations

use crate::{ThemeId, Timestamp};
use chrono::Utc;
use thiserror::Error;

/// Failure of a call to the backend collaborator.
///
/// `Clone + Eq` because fetch failures are retained in cache slots as error
/// markers, distinct from "no data yet".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request failed with status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A cached fetch failure: the error plus when it happened.
///
/// Stored in place of data in entity slots and level entries. An ordinary
/// read returns the marker without retrying; only an explicit reload
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMark {
    pub error: FetchError,
    pub failed_at: Timestamp,
}

impl ErrorMark {
    pub fn new(error: FetchError) -> Self {
        Self {
            error,
            failed_at: Utc::now(),
        }
    }
}

/// Tree assembly errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Theme {id} is not present in the catalog cache")]
    UnknownTheme { id: ThemeId },
}

/// Master error type for all syllabus operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyllabusError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

/// Result type alias for syllabus operations.
pub type SyllabusResult<T> = Result<T, SyllabusError>;

// =============================================================================
// TESTS
// =============================================================================
