//! Identity types for catalog entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw backend-assigned identifier. The backend hands out plain numeric ids,
/// and ids of different kinds may collide numerically; the typed wrappers
/// below keep them apart at compile time.
pub type RawId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub RawId);

        impl $name {
            /// Wrap a raw backend id.
            pub const fn new(id: RawId) -> Self {
                Self(id)
            }

            /// The underlying numeric id.
            pub const fn value(self) -> RawId {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<RawId> for $name {
            fn from(id: RawId) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id! {
    /// Identifier of a subject (a catalog root).
    SubjectId
}

numeric_id! {
    /// Identifier of a theme.
    ThemeId
}

numeric_id! {
    /// Identifier of a task.
    TaskId
}

/// Key of a level within one subject: either the subject root or a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKey {
    /// The subject's own top level.
    Root,
    /// The level holding the immediate children of a theme.
    Theme(ThemeId),
}

impl LevelKey {
    /// Build the key for the level a child with the given parent theme
    /// belongs to. `None` means the child hangs off the subject root.
    pub fn of(parent: Option<ThemeId>) -> Self {
        match parent {
            Some(id) => Self::Theme(id),
            None => Self::Root,
        }
    }

    /// The theme id this key points at, if any.
    pub fn theme_id(self) -> Option<ThemeId> {
        match self {
            Self::Theme(id) => Some(id),
            Self::Root => None,
        }
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Theme(id) => write!(f, "theme:{id}"),
        }
    }
}

/// Full identity of a level: a level key scoped to a subject.
///
/// Every level loads, fails, and is patched independently under this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelRef {
    pub subject: SubjectId,
    pub key: LevelKey,
}

impl LevelRef {
    pub const fn new(subject: SubjectId, key: LevelKey) -> Self {
        Self { subject, key }
    }

    /// The root level of a subject.
    pub const fn root(subject: SubjectId) -> Self {
        Self::new(subject, LevelKey::Root)
    }

    /// The level under a theme.
    pub const fn theme(subject: SubjectId, theme: ThemeId) -> Self {
        Self::new(subject, LevelKey::Theme(theme))
    }
}

impl fmt::Display for LevelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.key)
    }
}

/// Kind-tagged child id, used by level child-list operations so a theme id
/// and a task id with the same numeric value never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildRef {
    Theme(ThemeId),
    Task(TaskId),
}

impl fmt::Display for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Theme(id) => write!(f, "theme {id}"),
            Self::Task(id) => write!(f, "task {id}"),
        }
    }
}
