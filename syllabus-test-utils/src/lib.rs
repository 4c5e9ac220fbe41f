//! Syllabus Test Utilities
//!
//! Centralized test infrastructure for the syllabus workspace:
//! - A scriptable mock of the backend collaborator
//! - Entity fixtures for common shapes
//!
//! Lives in its own crate so the cache and tree crates can share one mock
//! instead of each test module growing its own.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedRwLockWriteGuard;

use syllabus_cache::ContentFetcher;
use syllabus_core::{
    FetchError, LevelKey, LevelPayload, RawId, Subject, SubjectId, Task, TaskId, Theme, ThemeId,
};

// Re-export the types tests touch constantly.
pub use syllabus_cache::{
    AccessGate, CatalogCache, EntitySlot, LevelChildren, LevelLoader, LevelState, LoadOutcome,
    LoaderConfig, SharedAccess,
};
pub use syllabus_core::{ChildRef, ErrorMark, LevelRef, ReadAccess};

// ============================================================================
// MOCK FETCHER
// ============================================================================

type LevelKeyTuple = (SubjectId, Option<ThemeId>);

/// Scriptable in-memory stand-in for the backend collaborator.
///
/// Script responses (success or failure) per level and per entity, then hand
/// it to a loader. Call counters expose how often each endpoint was hit, and
/// [`hold`](Self::hold) keeps every fetch suspended mid-flight until the
/// guard drops, which is how coalescing and abandonment get exercised.
#[derive(Debug, Default)]
pub struct MockFetcher {
    levels: Mutex<HashMap<LevelKeyTuple, Result<LevelPayload, FetchError>>>,
    themes: Mutex<HashMap<ThemeId, Result<Theme, FetchError>>>,
    tasks: Mutex<HashMap<TaskId, Result<Task, FetchError>>>,
    level_counts: Mutex<HashMap<LevelKeyTuple, usize>>,
    total: AtomicUsize,
    pause: Arc<tokio::sync::RwLock<()>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful level response. Overwrites any earlier script for
    /// the same level, so a test can fail a level first and heal it later.
    pub fn level_ok(&self, subject: SubjectId, theme: Option<ThemeId>, payload: LevelPayload) {
        self.levels
            .lock()
            .unwrap()
            .insert((subject, theme), Ok(payload));
    }

    /// Script a failing level response.
    pub fn level_err(&self, subject: SubjectId, theme: Option<ThemeId>, error: FetchError) {
        self.levels
            .lock()
            .unwrap()
            .insert((subject, theme), Err(error));
    }

    pub fn theme_ok(&self, theme: Theme) {
        self.themes.lock().unwrap().insert(theme.id, Ok(theme));
    }

    pub fn theme_err(&self, id: ThemeId, error: FetchError) {
        self.themes.lock().unwrap().insert(id, Err(error));
    }

    pub fn task_ok(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id, Ok(task));
    }

    pub fn task_err(&self, id: TaskId, error: FetchError) {
        self.tasks.lock().unwrap().insert(id, Err(error));
    }

    /// How many times one level endpoint was called.
    pub fn level_calls(&self, subject: SubjectId, theme: Option<ThemeId>) -> usize {
        self.level_counts
            .lock()
            .unwrap()
            .get(&(subject, theme))
            .copied()
            .unwrap_or(0)
    }

    /// Total fetch calls across every endpoint.
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Suspend every fetch mid-flight until the returned guard is dropped.
    /// Calls are counted as started before they suspend.
    pub async fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.pause).write_owned().await
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch_level(
        &self,
        subject: SubjectId,
        theme: Option<ThemeId>,
    ) -> Result<LevelPayload, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .level_counts
            .lock()
            .unwrap()
            .entry((subject, theme))
            .or_insert(0) += 1;
        let _release = self.pause.read().await;
        self.levels
            .lock()
            .unwrap()
            .get(&(subject, theme))
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    code: 404,
                    message: format!(
                        "no scripted level {}/{}",
                        subject,
                        LevelKey::of(theme)
                    ),
                })
            })
    }

    async fn fetch_theme(&self, id: ThemeId) -> Result<Theme, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let _release = self.pause.read().await;
        self.themes
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    code: 404,
                    message: format!("no scripted theme {id}"),
                })
            })
    }

    async fn fetch_task(&self, id: TaskId) -> Result<Task, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let _release = self.pause.read().await;
        self.tasks
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    code: 404,
                    message: format!("no scripted task {id}"),
                })
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A subject with the given id and name.
pub fn subject(id: RawId, name: &str) -> Subject {
    Subject {
        id: SubjectId::new(id),
        name: name.to_string(),
        image_link: None,
    }
}

/// A root-level theme with both child flags off.
pub fn theme(id: RawId, subject: RawId) -> Theme {
    Theme {
        id: ThemeId::new(id),
        subject_id: SubjectId::new(subject),
        parent_theme_id: None,
        title: format!("Theme {id}"),
        has_sub_themes: false,
        has_sub_tasks: false,
    }
}

/// A theme nested under a parent theme.
pub fn theme_under(id: RawId, subject: RawId, parent: RawId) -> Theme {
    Theme {
        parent_theme_id: Some(ThemeId::new(parent)),
        ..theme(id, subject)
    }
}

/// A root-level task.
pub fn task(id: RawId, subject: RawId) -> Task {
    Task {
        id: TaskId::new(id),
        subject_id: SubjectId::new(subject),
        theme_id: None,
        text: format!("Task {id}"),
        complexity: 1,
        weight: 1,
        answer: "42".to_string(),
    }
}

/// A task nested under a theme.
pub fn task_under(id: RawId, subject: RawId, theme: RawId) -> Task {
    Task {
        theme_id: Some(ThemeId::new(theme)),
        ..task(id, subject)
    }
}

/// A level payload from theme and task lists.
pub fn payload(themes: Vec<Theme>, tasks: Vec<Task>) -> LevelPayload {
    LevelPayload { themes, tasks }
}
