//! Core entity structures
//!
//! These mirror the backend's wire format: the REST layer deserializes its
//! camelCase JSON straight into them.

use crate::{LevelKey, LevelRef, SubjectId, TaskId, ThemeId};
use serde::{Deserialize, Serialize};

/// Subject - a catalog root.
///
/// Subjects are supplied by the surrounding application (the subject list has
/// its own endpoint) and are not cached by this subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_link: Option<String>,
}

/// Theme - an inner catalog node, either directly under its subject root or
/// nested under a parent theme.
///
/// `has_sub_themes` / `has_sub_tasks` are eventually-consistent hints: they
/// may run ahead of the actual fetched children (a mutation patch sets them
/// optimistically before the level is ever loaded), but a loaded non-empty
/// child list is never contradicted by a `false` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: ThemeId,
    pub subject_id: SubjectId,
    /// Absent for themes attached directly to the subject root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_theme_id: Option<ThemeId>,
    pub title: String,
    #[serde(default)]
    pub has_sub_themes: bool,
    #[serde(default)]
    pub has_sub_tasks: bool,
}

impl Theme {
    /// The level this theme is a child of.
    pub fn parent_level(&self) -> LevelRef {
        LevelRef::new(self.subject_id, LevelKey::of(self.parent_theme_id))
    }

    /// The level holding this theme's own children.
    pub fn own_level(&self) -> LevelRef {
        LevelRef::theme(self.subject_id, self.id)
    }
}

/// Task - a leaf catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub subject_id: SubjectId,
    /// Absent for tasks attached directly to the subject root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<ThemeId>,
    pub text: String,
    pub complexity: i32,
    pub weight: i32,
    pub answer: String,
}

impl Task {
    /// The level this task is a child of.
    pub fn parent_level(&self) -> LevelRef {
        LevelRef::new(self.subject_id, LevelKey::of(self.theme_id))
    }
}

/// One level's worth of content as returned by the backend.
///
/// Child ordering on the wire is authoritative; the cache preserves it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelPayload {
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl LevelPayload {
    pub fn is_empty(&self) -> bool {
        self.themes.is_empty() && self.tasks.is_empty()
    }
}
