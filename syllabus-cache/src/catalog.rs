//! The catalog cache: entity store + level cache behind one lock.
//!
//! All writes (fetch commits, mutation patches, deletions) take the write
//! lock once and update both structures together, so no reader can observe a
//! level marked loaded while its referenced entities are still missing.
//!
//! The cache is explicitly constructed and handed to its consumers; its
//! lifetime is the owning session's, and there is no global instance.

use crate::level::{LevelCache, LevelChildren, LevelState};
use crate::store::{EntitySlot, EntityStore};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use syllabus_core::{
    ChildRef, ErrorMark, FetchError, LevelKey, LevelPayload, LevelRef, SubjectId, Task, TaskId,
    Theme, ThemeId,
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct CatalogState {
    themes: EntityStore<ThemeId, Theme>,
    tasks: EntityStore<TaskId, Task>,
    levels: LevelCache,
}

/// Process-wide mutable catalog state. Any number of readers may hold
/// snapshots; all mutation goes through the methods below.
#[derive(Debug, Default)]
pub struct CatalogCache {
    state: RwLock<CatalogState>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a writer panicked mid-update; the cached
    // catalog is still the best data available, so reads continue.
    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Snapshot of a theme slot.
    pub fn theme(&self, id: ThemeId) -> EntitySlot<Theme> {
        self.read().themes.get(id)
    }

    /// Snapshot of a task slot.
    pub fn task(&self, id: TaskId) -> EntitySlot<Task> {
        self.read().tasks.get(id)
    }

    /// Snapshot of a level slot.
    pub fn level(&self, level: LevelRef) -> LevelState {
        self.read().levels.get(level)
    }

    // ========================================================================
    // FETCH COMMITS
    // ========================================================================

    /// Commit a successful level fetch: every entity in the payload lands in
    /// the entity store and the level's child lists are overwritten, all
    /// under one write lock. Returns the committed child lists.
    pub fn commit_level(&self, level: LevelRef, payload: LevelPayload) -> LevelChildren {
        let children = LevelChildren::from_payload(&payload);
        let mut state = self.write();
        for theme in payload.themes {
            state.themes.put(theme.id, theme);
        }
        for task in payload.tasks {
            state.tasks.put(task.id, task);
        }
        state.levels.put_loaded(level, children.clone());
        // The fetched lists are the ground truth for this level now; bring a
        // cached parent theme's hint flags in line with them. A loaded
        // non-empty child list must never sit under a false flag.
        if let LevelKey::Theme(parent_id) = level.key {
            let has_sub_themes = !children.theme_ids.is_empty();
            let has_sub_tasks = !children.task_ids.is_empty();
            if let Some(existing) = state.themes.value(parent_id) {
                if existing.has_sub_themes != has_sub_themes
                    || existing.has_sub_tasks != has_sub_tasks
                {
                    let mut patched = existing.clone();
                    patched.has_sub_themes = has_sub_themes;
                    patched.has_sub_tasks = has_sub_tasks;
                    state.themes.put(parent_id, patched);
                }
            }
        }
        debug!(
            %level,
            themes = children.theme_ids.len(),
            tasks = children.task_ids.len(),
            "level committed"
        );
        children
    }

    /// Commit a failed level fetch. The failure is scoped to this one level;
    /// the entity store and every other level stay untouched.
    pub fn commit_level_error(&self, level: LevelRef, error: FetchError) -> ErrorMark {
        let mark = ErrorMark::new(error);
        self.write().levels.put_error(level, mark.clone());
        warn!(%level, error = %mark.error, "level fetch failed");
        mark
    }

    /// Store a single fetched theme.
    pub fn commit_theme(&self, theme: Theme) {
        self.write().themes.put(theme.id, theme);
    }

    /// Retain a failed theme fetch in that theme's slot.
    pub fn commit_theme_error(&self, id: ThemeId, error: FetchError) -> ErrorMark {
        let mark = ErrorMark::new(error);
        self.write().themes.put_error(id, mark.clone());
        warn!(theme = %id, error = %mark.error, "theme fetch failed");
        mark
    }

    /// Store a single fetched task.
    pub fn commit_task(&self, task: Task) {
        self.write().tasks.put(task.id, task);
    }

    /// Retain a failed task fetch in that task's slot.
    pub fn commit_task_error(&self, id: TaskId, error: FetchError) -> ErrorMark {
        let mark = ErrorMark::new(error);
        self.write().tasks.put_error(id, mark.clone());
        warn!(task = %id, error = %mark.error, "task fetch failed");
        mark
    }

    // ========================================================================
    // MUTATION PATCHES
    // ========================================================================

    /// Patch the cache with the server's response to a successful theme
    /// create or edit, without re-fetching siblings.
    ///
    /// The theme lands in the entity store, its id is appended to its parent
    /// level (materializing the level if it was never fetched), and a cached
    /// parent theme is flagged as having sub-themes.
    pub fn revoke_theme(&self, theme: Theme) {
        let level = theme.parent_level();
        let parent = theme.parent_theme_id;
        let id = theme.id;

        let mut state = self.write();
        state.themes.put(id, theme);
        state.levels.append_child(level, ChildRef::Theme(id));
        if let Some(parent_id) = parent {
            // Replace the stored parent with an updated copy; stored
            // entities are never mutated in place.
            if let Some(existing) = state.themes.value(parent_id) {
                if !existing.has_sub_themes {
                    let mut patched = existing.clone();
                    patched.has_sub_themes = true;
                    state.themes.put(parent_id, patched);
                }
            }
        }
        debug!(theme = %id, %level, "theme revoked into cache");
    }

    /// Task counterpart of [`revoke_theme`](Self::revoke_theme).
    pub fn revoke_task(&self, task: Task) {
        let level = task.parent_level();
        let parent = task.theme_id;
        let id = task.id;

        let mut state = self.write();
        state.tasks.put(id, task);
        state.levels.append_child(level, ChildRef::Task(id));
        if let Some(parent_id) = parent {
            if let Some(existing) = state.themes.value(parent_id) {
                if !existing.has_sub_tasks {
                    let mut patched = existing.clone();
                    patched.has_sub_tasks = true;
                    state.themes.put(parent_id, patched);
                }
            }
        }
        debug!(task = %id, %level, "task revoked into cache");
    }

    /// Apply a confirmed theme deletion: prune the id from its parent level,
    /// drop the entity slot, and recompute the parent theme's sub-theme flag
    /// from the list that remains.
    ///
    /// A parent level in the error state has nothing to prune (the entity
    /// slot is still dropped), and gives no trustworthy list to recompute
    /// the flag from, so the flag is left as it is.
    pub fn delete_theme(&self, subject: SubjectId, id: ThemeId, parent: Option<ThemeId>) {
        let level = LevelRef::new(subject, LevelKey::of(parent));

        let mut state = self.write();
        state.levels.remove_child(level, ChildRef::Theme(id));
        state.themes.remove(id);
        if let Some(parent_id) = parent {
            let remaining = state
                .levels
                .loaded_children(level)
                .map(|children| !children.theme_ids.is_empty());
            if let Some(has_sub_themes) = remaining {
                if let Some(existing) = state.themes.value(parent_id) {
                    if existing.has_sub_themes != has_sub_themes {
                        let mut patched = existing.clone();
                        patched.has_sub_themes = has_sub_themes;
                        state.themes.put(parent_id, patched);
                    }
                }
            }
        }
        debug!(theme = %id, %level, "theme deleted from cache");
    }

    /// Task counterpart of [`delete_theme`](Self::delete_theme).
    pub fn delete_task(&self, subject: SubjectId, id: TaskId, theme: Option<ThemeId>) {
        let level = LevelRef::new(subject, LevelKey::of(theme));

        let mut state = self.write();
        state.levels.remove_child(level, ChildRef::Task(id));
        state.tasks.remove(id);
        if let Some(parent_id) = theme {
            let remaining = state
                .levels
                .loaded_children(level)
                .map(|children| !children.task_ids.is_empty());
            if let Some(has_sub_tasks) = remaining {
                if let Some(existing) = state.themes.value(parent_id) {
                    if existing.has_sub_tasks != has_sub_tasks {
                        let mut patched = existing.clone();
                        patched.has_sub_tasks = has_sub_tasks;
                        state.themes.put(parent_id, patched);
                    }
                }
            }
        }
        debug!(task = %id, %level, "task deleted from cache");
    }

    // ========================================================================
    // RAW LEVEL OPERATIONS
    // ========================================================================

    /// Idempotent child append, see [`LevelCache::append_child`].
    pub fn append_child(&self, level: LevelRef, child: ChildRef) -> bool {
        self.write().levels.append_child(level, child)
    }

    /// Child prune, see [`LevelCache::remove_child`].
    pub fn remove_child(&self, level: LevelRef, child: ChildRef) -> bool {
        self.write().levels.remove_child(level, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syllabus_test_utils::{task_under, theme, theme_under};

    fn subject() -> SubjectId {
        SubjectId::new(1)
    }

    #[test]
    fn test_commit_level_writes_entities_and_level_together() {
        let cache = CatalogCache::new();
        let payload = LevelPayload {
            themes: vec![theme(10, 1)],
            tasks: vec![],
        };
        cache.commit_level(LevelRef::root(subject()), payload);

        let state = cache.level(LevelRef::root(subject()));
        let children = state.loaded().expect("level should be loaded");
        assert_eq!(
            children.theme_ids.iter().map(|id| id.value()).collect::<Vec<_>>(),
            vec![10]
        );
        assert!(children.task_ids.is_empty());
        assert!(cache.theme(ThemeId::new(10)).is_value());
    }

    #[test]
    fn test_commit_level_error_leaves_entities_untouched() {
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        cache.commit_level_error(LevelRef::root(subject()), FetchError::Timeout);

        assert!(cache.level(LevelRef::root(subject())).is_errored());
        assert!(cache.theme(ThemeId::new(10)).is_value());
    }

    #[test]
    fn test_commit_level_reconciles_parent_flags() {
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        cache.commit_level(
            LevelRef::theme(subject(), ThemeId::new(10)),
            LevelPayload {
                themes: vec![theme_under(11, 1, 10)],
                tasks: vec![],
            },
        );

        // The loaded non-empty child list pulls the parent's flag up.
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(parent.has_sub_themes);
        assert!(!parent.has_sub_tasks);
    }

    #[test]
    fn test_commit_empty_level_withdraws_speculative_flags() {
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        // A revoke flagged the parent before its level was ever fetched.
        cache.revoke_theme(theme_under(11, 1, 10));
        assert!(cache.theme(ThemeId::new(10)).into_value().unwrap().has_sub_themes);

        // The backend's answer for that level has no children at all.
        cache.commit_level(
            LevelRef::theme(subject(), ThemeId::new(10)),
            LevelPayload::default(),
        );
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(!parent.has_sub_themes);
        assert!(!parent.has_sub_tasks);
    }

    #[test]
    fn test_revoke_theme_into_loaded_level_appends_at_end() {
        let cache = CatalogCache::new();
        cache.commit_level(
            LevelRef::root(subject()),
            LevelPayload {
                themes: vec![theme(10, 1)],
                tasks: vec![],
            },
        );
        cache.revoke_theme(theme(11, 1));

        let state = cache.level(LevelRef::root(subject()));
        let order: Vec<_> = state
            .loaded()
            .unwrap()
            .theme_ids
            .iter()
            .map(|id| id.value())
            .collect();
        assert_eq!(order, vec![10, 11]);
    }

    #[test]
    fn test_revoke_theme_materializes_unfetched_parent_level() {
        // The parent level (1, 10) has never been fetched.
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        cache.revoke_theme(theme_under(11, 1, 10));

        let level = LevelRef::theme(subject(), ThemeId::new(10));
        let state = cache.level(level);
        let children = state.loaded().expect("level lazily materialized");
        assert_eq!(
            children.theme_ids.iter().map(|id| id.value()).collect::<Vec<_>>(),
            vec![11]
        );
        // Parent picked up the optimistic flag.
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(parent.has_sub_themes);
    }

    #[test]
    fn test_revoke_task_flags_parent_has_sub_tasks() {
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        cache.revoke_task(task_under(5, 1, 10));

        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(parent.has_sub_tasks);
        assert!(!parent.has_sub_themes);

        let level = LevelRef::theme(subject(), ThemeId::new(10));
        let state = cache.level(level);
        assert!(state.loaded().unwrap().contains(ChildRef::Task(TaskId::new(5))));
    }

    #[test]
    fn test_revoke_twice_is_idempotent() {
        let cache = CatalogCache::new();
        cache.revoke_theme(theme(11, 1));
        cache.revoke_theme(theme(11, 1));

        let state = cache.level(LevelRef::root(subject()));
        assert_eq!(state.loaded().unwrap().theme_ids.len(), 1);
    }

    #[test]
    fn test_revoke_edit_replaces_entity_value() {
        let cache = CatalogCache::new();
        cache.revoke_theme(theme(11, 1));
        let mut renamed = theme(11, 1);
        renamed.title = "Renamed".to_string();
        cache.revoke_theme(renamed);

        let stored = cache.theme(ThemeId::new(11)).into_value().unwrap();
        assert_eq!(stored.title, "Renamed");
        let state = cache.level(LevelRef::root(subject()));
        assert_eq!(state.loaded().unwrap().theme_ids.len(), 1);
    }

    #[test]
    fn test_delete_theme_prunes_level_and_store() {
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        cache.revoke_theme(theme_under(11, 1, 10));
        cache.delete_theme(subject(), ThemeId::new(11), Some(ThemeId::new(10)));

        assert!(cache.theme(ThemeId::new(11)).is_absent());
        let level = LevelRef::theme(subject(), ThemeId::new(10));
        let state = cache.level(level);
        assert!(state.loaded().unwrap().theme_ids.is_empty());
        // Last child removed: the optimistic flag is withdrawn.
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(!parent.has_sub_themes);
    }

    #[test]
    fn test_delete_task_recomputes_flag_from_remaining() {
        let cache = CatalogCache::new();
        cache.commit_theme(theme(10, 1));
        cache.revoke_task(task_under(5, 1, 10));
        cache.revoke_task(task_under(6, 1, 10));

        cache.delete_task(subject(), TaskId::new(5), Some(ThemeId::new(10)));
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(parent.has_sub_tasks, "one task still present");

        cache.delete_task(subject(), TaskId::new(6), Some(ThemeId::new(10)));
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(!parent.has_sub_tasks);
    }

    #[test]
    fn test_delete_with_errored_parent_level_still_drops_entity() {
        let cache = CatalogCache::new();
        let level = LevelRef::theme(subject(), ThemeId::new(10));
        let mut parent = theme(10, 1);
        parent.has_sub_themes = true;
        cache.commit_theme(parent);
        cache.commit_theme(theme_under(11, 1, 10));
        cache.commit_level_error(level, FetchError::Timeout);

        cache.delete_theme(subject(), ThemeId::new(11), Some(ThemeId::new(10)));

        assert!(cache.theme(ThemeId::new(11)).is_absent());
        // Nothing to prune and no list to recompute from: the level keeps
        // its error marker and the parent keeps its flag.
        assert!(cache.level(level).is_errored());
        let parent = cache.theme(ThemeId::new(10)).into_value().unwrap();
        assert!(parent.has_sub_themes);
    }

    #[test]
    fn test_delete_under_root_has_no_flag_to_patch() {
        let cache = CatalogCache::new();
        cache.revoke_theme(theme(11, 1));
        cache.delete_theme(subject(), ThemeId::new(11), None);
        assert!(cache.theme(ThemeId::new(11)).is_absent());
        let state = cache.level(LevelRef::root(subject()));
        assert!(state.loaded().unwrap().theme_ids.is_empty());
    }

    #[test]
    fn test_levels_fail_independently() {
        // An error on one level leaves other subjects' and sibling levels'
        // cached data unchanged.
        let cache = CatalogCache::new();
        let s1_root = LevelRef::root(SubjectId::new(1));
        let s2_root = LevelRef::root(SubjectId::new(2));
        cache.commit_level(
            s2_root,
            LevelPayload {
                themes: vec![theme(20, 2)],
                tasks: vec![],
            },
        );
        cache.commit_level_error(s1_root, FetchError::Timeout);

        assert!(cache.level(s1_root).is_errored());
        let state = cache.level(s2_root);
        assert!(state.is_loaded());
        assert!(cache.theme(ThemeId::new(20)).is_value());
    }
}
