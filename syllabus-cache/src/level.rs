//! Per-level child-id cache.
//!
//! A level is the set of immediate child themes and tasks under one subject
//! root or one theme. Each level is cached independently: a failed fetch for
//! one level never touches its siblings or ancestors.

use chrono::Utc;
use indexmap::IndexSet;
use syllabus_core::{ChildRef, ErrorMark, LevelPayload, LevelRef, TaskId, ThemeId, Timestamp};
use std::collections::HashMap;

/// Ordered child-id lists of one loaded level.
///
/// Insertion order is the backend's response order; mutation patches append
/// at the end and never re-sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChildren {
    pub theme_ids: IndexSet<ThemeId>,
    pub task_ids: IndexSet<TaskId>,
    /// When the cache last wrote this level (fetch commit or mutation patch).
    pub cached_at: Timestamp,
}

impl LevelChildren {
    /// An empty level, stamped now.
    pub fn empty() -> Self {
        Self {
            theme_ids: IndexSet::new(),
            task_ids: IndexSet::new(),
            cached_at: Utc::now(),
        }
    }

    /// Extract ordered id lists from a backend response.
    pub fn from_payload(payload: &LevelPayload) -> Self {
        Self {
            theme_ids: payload.themes.iter().map(|t| t.id).collect(),
            task_ids: payload.tasks.iter().map(|t| t.id).collect(),
            cached_at: Utc::now(),
        }
    }

    pub fn contains(&self, child: ChildRef) -> bool {
        match child {
            ChildRef::Theme(id) => self.theme_ids.contains(&id),
            ChildRef::Task(id) => self.task_ids.contains(&id),
        }
    }

    /// Append a child id; returns false if it was already present.
    pub fn insert(&mut self, child: ChildRef) -> bool {
        match child {
            ChildRef::Theme(id) => self.theme_ids.insert(id),
            ChildRef::Task(id) => self.task_ids.insert(id),
        }
    }

    /// Prune a child id, preserving the order of the remaining ids.
    pub fn remove(&mut self, child: ChildRef) -> bool {
        match child {
            ChildRef::Theme(id) => self.theme_ids.shift_remove(&id),
            ChildRef::Task(id) => self.task_ids.shift_remove(&id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.theme_ids.is_empty() && self.task_ids.is_empty()
    }
}

/// State of one level slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelState {
    /// Never fetched (and never optimistically materialized).
    Unloaded,
    /// Child lists as last committed.
    Loaded(LevelChildren),
    /// The whole-level fetch failed; retained until an explicit reload.
    Errored(ErrorMark),
}

impl LevelState {
    pub fn is_unloaded(&self) -> bool {
        matches!(self, Self::Unloaded)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    pub fn loaded(&self) -> Option<&LevelChildren> {
        match self {
            Self::Loaded(children) => Some(children),
            _ => None,
        }
    }

    pub fn into_loaded(self) -> Option<LevelChildren> {
        match self {
            Self::Loaded(children) => Some(children),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorMark> {
        match self {
            Self::Errored(mark) => Some(mark),
            _ => None,
        }
    }
}

/// Level slots keyed by `(subject, level key)`.
///
/// `Unloaded` is represented by a missing entry and materialized on read;
/// the map never stores it.
#[derive(Debug, Default)]
pub struct LevelCache {
    entries: HashMap<LevelRef, LevelState>,
}

impl LevelCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Snapshot of a level slot.
    pub fn get(&self, level: LevelRef) -> LevelState {
        self.entries
            .get(&level)
            .cloned()
            .unwrap_or(LevelState::Unloaded)
    }

    /// Borrow the child lists of a loaded level.
    pub fn loaded_children(&self, level: LevelRef) -> Option<&LevelChildren> {
        self.entries.get(&level).and_then(LevelState::loaded)
    }

    /// Overwrite a level with freshly fetched children. Fetch results are
    /// authoritative: no merging with whatever was there before.
    pub fn put_loaded(&mut self, level: LevelRef, children: LevelChildren) {
        self.entries.insert(level, LevelState::Loaded(children));
    }

    /// Overwrite a level with a retained fetch failure.
    pub fn put_error(&mut self, level: LevelRef, mark: ErrorMark) {
        self.entries.insert(level, LevelState::Errored(mark));
    }

    /// Idempotent append of a child id.
    ///
    /// An unloaded level is lazily materialized holding just the new id, so
    /// a mutation under a never-fetched parent still lands; the eventual
    /// real fetch overwrites the level wholesale and naturally includes the
    /// id again. An errored level is left alone: there is no trustworthy
    /// list to extend, and the next reload resolves it.
    pub fn append_child(&mut self, level: LevelRef, child: ChildRef) -> bool {
        match self.entries.get_mut(&level) {
            None => {
                let mut children = LevelChildren::empty();
                children.insert(child);
                self.entries.insert(level, LevelState::Loaded(children));
                true
            }
            Some(LevelState::Loaded(children)) => {
                let inserted = children.insert(child);
                if inserted {
                    children.cached_at = Utc::now();
                }
                inserted
            }
            Some(LevelState::Errored(_)) => false,
            // get_mut never yields Unloaded: it is materialized on read only.
            Some(LevelState::Unloaded) => false,
        }
    }

    /// Prune a child id. No-op when the level is unloaded or errored, or the
    /// id is not in the list.
    pub fn remove_child(&mut self, level: LevelRef, child: ChildRef) -> bool {
        match self.entries.get_mut(&level) {
            Some(LevelState::Loaded(children)) => {
                let removed = children.remove(child);
                if removed {
                    children.cached_at = Utc::now();
                }
                removed
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
