//! Enum types for the catalog cache

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kind discriminator, used in logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Subject,
    Theme,
    Task,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject => write!(f, "subject"),
            Self::Theme => write!(f, "theme"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// Read permission for the catalog subsystem.
///
/// Permission data itself loads asynchronously, so callers must handle the
/// `Unknown` state explicitly instead of treating it as denied or granted.
/// While `Unknown`, no catalog fetch is issued; `Denied` short-circuits every
/// read to a forbidden outcome without network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadAccess {
    /// Permission data has not resolved yet.
    #[default]
    Unknown,
    /// The caller may not read the catalog.
    Denied,
    /// The caller may read the catalog.
    Granted,
}

impl ReadAccess {
    /// Returns true once permission data has resolved either way.
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    pub fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }
}
