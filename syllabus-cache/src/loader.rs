//! Level loader: gate -> cache -> fetch.
//!
//! Reads check the permission gate, then the cache, and only then go to the
//! backend. Failures never propagate out of a load; they are committed as
//! error markers and handed back as state. Concurrent loads of the same
//! uncached level share one in-flight fetch when coalescing is enabled.

use crate::catalog::CatalogCache;
use crate::config::LoaderConfig;
use crate::gate::AccessGate;
use crate::level::{LevelChildren, LevelState};
use crate::store::EntitySlot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use syllabus_core::{
    ErrorMark, FetchError, LevelKey, LevelPayload, LevelRef, ReadAccess, SubjectId, Task, TaskId,
    Theme, ThemeId,
};
use tokio::sync::watch;
use tracing::{debug, trace};

/// The backend collaborator.
///
/// Implementations translate these calls into whatever transport the
/// application uses; this crate never sees the transport. Failures of any
/// kind (HTTP status, timeout, cancellation) surface as [`FetchError`].
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch one level of catalog content: the immediate child themes and
    /// tasks of a subject root (`theme == None`) or of a theme.
    async fn fetch_level(
        &self,
        subject: SubjectId,
        theme: Option<ThemeId>,
    ) -> Result<LevelPayload, FetchError>;

    /// Fetch a single theme by id.
    async fn fetch_theme(&self, id: ThemeId) -> Result<Theme, FetchError>;

    /// Fetch a single task by id.
    async fn fetch_task(&self, id: TaskId) -> Result<Task, FetchError>;
}

/// Outcome of a gated, cached read.
///
/// `Pending` and `Forbidden` are first-class states, not errors: they mean
/// the permission gate (not the network) decided the outcome, and no fetch
/// was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome<T> {
    /// Permission data has not resolved yet; nothing was fetched.
    Pending,
    /// Reading the catalog is not allowed; nothing was fetched.
    Forbidden,
    /// The requested data, from cache or a fresh fetch.
    Ready(T),
    /// The fetch failed earlier (or just now); the failure is cached and
    /// only an explicit reload retries it.
    Failed(ErrorMark),
}

impl<T> LoadOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn failed(&self) -> Option<&ErrorMark> {
        match self {
            Self::Failed(mark) => Some(mark),
            _ => None,
        }
    }
}

/// One outstanding level fetch. A reload may replace a level's entry while
/// an older fetch task is still running; the token keeps that older task
/// from evicting the newer flight's completion signal on its way out.
#[derive(Debug)]
struct Flight {
    token: u64,
    rx: watch::Receiver<()>,
}

/// Read-through loader over the catalog cache.
pub struct LevelLoader<F, G>
where
    F: ContentFetcher,
    G: AccessGate,
{
    cache: Arc<CatalogCache>,
    fetcher: Arc<F>,
    gate: Arc<G>,
    config: LoaderConfig,
    /// Completion signals of outstanding level fetches. A live sender means
    /// a fetch task owns this level; the receiver side wakes joiners when
    /// the task commits (or is torn down).
    inflight: Arc<Mutex<HashMap<LevelRef, Flight>>>,
    next_flight: AtomicU64,
}

impl<F, G> LevelLoader<F, G>
where
    F: ContentFetcher + 'static,
    G: AccessGate + 'static,
{
    pub fn new(cache: Arc<CatalogCache>, fetcher: Arc<F>, gate: Arc<G>, config: LoaderConfig) -> Self {
        Self {
            cache,
            fetcher,
            gate,
            config,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_flight: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(cache: Arc<CatalogCache>, fetcher: Arc<F>, gate: Arc<G>) -> Self {
        Self::new(cache, fetcher, gate, LoaderConfig::default())
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Whether a fetch for this level is currently outstanding.
    pub fn is_inflight(&self, level: LevelRef) -> bool {
        self.lock_inflight()
            .get(&level)
            .map(|flight| flight.rx.has_changed().is_ok())
            .unwrap_or(false)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<LevelRef, Flight>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register_flight(
        &self,
        inflight: &mut HashMap<LevelRef, Flight>,
        level: LevelRef,
    ) -> watch::Receiver<()> {
        let (tx, rx) = watch::channel(());
        let token = self.next_flight.fetch_add(1, Ordering::Relaxed);
        inflight.insert(
            level,
            Flight {
                token,
                rx: rx.clone(),
            },
        );
        self.spawn_level_fetch(level, token, tx);
        rx
    }

    fn gate_outcome<T>(&self) -> Option<LoadOutcome<T>> {
        match self.gate.read_access() {
            ReadAccess::Unknown => Some(LoadOutcome::Pending),
            ReadAccess::Denied => Some(LoadOutcome::Forbidden),
            ReadAccess::Granted => None,
        }
    }

    // ========================================================================
    // LEVEL LOADS
    // ========================================================================

    /// Load one level, from cache when possible.
    ///
    /// Cached error markers are returned as [`LoadOutcome::Failed`] without a
    /// retry; only [`reload`](Self::reload) re-attempts a failed level.
    pub async fn load(
        &self,
        subject: SubjectId,
        theme: Option<ThemeId>,
    ) -> LoadOutcome<LevelChildren> {
        let level = LevelRef::new(subject, LevelKey::of(theme));
        loop {
            if let Some(outcome) = self.gate_outcome() {
                return outcome;
            }
            match self.cache.level(level) {
                LevelState::Loaded(children) => {
                    trace!(%level, "level cache hit");
                    return LoadOutcome::Ready(children);
                }
                LevelState::Errored(mark) => return LoadOutcome::Failed(mark),
                LevelState::Unloaded => {}
            }
            if !self.config.coalesce_inflight {
                return self.fetch_level_detached(level).await;
            }
            // Join the in-flight fetch for this level, or claim it. The
            // check-and-claim is atomic under the table lock; a dead sender
            // (torn-down fetch task) counts as vacant.
            let mut done = {
                let mut inflight = self.lock_inflight();
                match inflight.get(&level) {
                    Some(flight) if flight.rx.has_changed().is_ok() => flight.rx.clone(),
                    _ => self.register_flight(&mut inflight, level),
                }
            };
            // Wakes once the owning fetch has committed; the loop then
            // re-reads the cache (and the gate).
            let _ = done.changed().await;
        }
    }

    /// Force a fetch for one level regardless of its cached state.
    ///
    /// This is the recovery path for error markers and the resync path after
    /// an external change. The result overwrites the level wholesale.
    pub async fn reload(
        &self,
        subject: SubjectId,
        theme: Option<ThemeId>,
    ) -> LoadOutcome<LevelChildren> {
        let level = LevelRef::new(subject, LevelKey::of(theme));
        if let Some(outcome) = self.gate_outcome() {
            return outcome;
        }
        debug!(%level, "forced level reload");
        self.fetch_level_detached(level).await
    }

    /// Start a fetch for this level unconditionally and wait for it to
    /// commit. The in-flight table entry is replaced, so ordinary loads
    /// arriving meanwhile join the new fetch.
    async fn fetch_level_detached(&self, level: LevelRef) -> LoadOutcome<LevelChildren> {
        let mut rx = {
            let mut inflight = self.lock_inflight();
            self.register_flight(&mut inflight, level)
        };
        let _ = rx.changed().await;
        match self.cache.level(level) {
            LevelState::Loaded(children) => LoadOutcome::Ready(children),
            LevelState::Errored(mark) => LoadOutcome::Failed(mark),
            // The fetch task commits before signalling, so this is only
            // reachable when the runtime tore the task down mid-flight.
            LevelState::Unloaded => LoadOutcome::Failed(ErrorMark::new(FetchError::Cancelled)),
        }
    }

    /// Run one level fetch to completion on its own task.
    ///
    /// A caller abandoning its future must not be able to cancel a commit
    /// that other callers (or a later render) will observe, so the await on
    /// the collaborator never lives in the caller's future.
    fn spawn_level_fetch(&self, level: LevelRef, token: u64, done: watch::Sender<()>) {
        let cache = Arc::clone(&self.cache);
        let fetcher = Arc::clone(&self.fetcher);
        let inflight = Arc::clone(&self.inflight);
        debug!(%level, "fetching level");
        tokio::spawn(async move {
            match fetcher.fetch_level(level.subject, level.key.theme_id()).await {
                Ok(payload) => {
                    cache.commit_level(level, payload);
                }
                Err(error) => {
                    cache.commit_level_error(level, error);
                }
            }
            // Clear the table entry only if it is still this task's flight;
            // a reload may have registered a newer one meanwhile.
            let mut table = inflight.lock().unwrap_or_else(|e| e.into_inner());
            if table.get(&level).map(|flight| flight.token) == Some(token) {
                table.remove(&level);
            }
            drop(table);
            // Dropping the sender wakes every joiner; they re-read the cache.
            drop(done);
        });
    }

    // ========================================================================
    // ENTITY LOADS
    // ========================================================================

    /// Load a single theme, from its cache slot when possible. A failed
    /// fetch is retained in the slot (negative caching) and returned as
    /// `Failed` on subsequent loads until [`reload_theme`](Self::reload_theme).
    pub async fn load_theme(&self, id: ThemeId) -> LoadOutcome<Theme> {
        if let Some(outcome) = self.gate_outcome() {
            return outcome;
        }
        match self.cache.theme(id) {
            EntitySlot::Value(theme) => {
                trace!(theme = %id, "theme cache hit");
                LoadOutcome::Ready(theme)
            }
            EntitySlot::Errored(mark) => LoadOutcome::Failed(mark),
            EntitySlot::Absent => self.fetch_theme_detached(id).await,
        }
    }

    /// Force a fetch for a single theme regardless of its slot state.
    pub async fn reload_theme(&self, id: ThemeId) -> LoadOutcome<Theme> {
        if let Some(outcome) = self.gate_outcome() {
            return outcome;
        }
        debug!(theme = %id, "forced theme reload");
        self.fetch_theme_detached(id).await
    }

    /// Load a single task; see [`load_theme`](Self::load_theme).
    pub async fn load_task(&self, id: TaskId) -> LoadOutcome<Task> {
        if let Some(outcome) = self.gate_outcome() {
            return outcome;
        }
        match self.cache.task(id) {
            EntitySlot::Value(task) => {
                trace!(task = %id, "task cache hit");
                LoadOutcome::Ready(task)
            }
            EntitySlot::Errored(mark) => LoadOutcome::Failed(mark),
            EntitySlot::Absent => self.fetch_task_detached(id).await,
        }
    }

    /// Force a fetch for a single task regardless of its slot state.
    pub async fn reload_task(&self, id: TaskId) -> LoadOutcome<Task> {
        if let Some(outcome) = self.gate_outcome() {
            return outcome;
        }
        debug!(task = %id, "forced task reload");
        self.fetch_task_detached(id).await
    }

    // Entity fetches are rare (edit forms fetch one entity at a time), so
    // they are not coalesced; the commit still runs on its own task for the
    // same abandonment-safety as level fetches.

    async fn fetch_theme_detached(&self, id: ThemeId) -> LoadOutcome<Theme> {
        let cache = Arc::clone(&self.cache);
        let fetcher = Arc::clone(&self.fetcher);
        let handle = tokio::spawn(async move {
            match fetcher.fetch_theme(id).await {
                Ok(theme) => {
                    cache.commit_theme(theme.clone());
                    LoadOutcome::Ready(theme)
                }
                Err(error) => LoadOutcome::Failed(cache.commit_theme_error(id, error)),
            }
        });
        match handle.await {
            Ok(outcome) => outcome,
            Err(_) => LoadOutcome::Failed(ErrorMark::new(FetchError::Cancelled)),
        }
    }

    async fn fetch_task_detached(&self, id: TaskId) -> LoadOutcome<Task> {
        let cache = Arc::clone(&self.cache);
        let fetcher = Arc::clone(&self.fetcher);
        let handle = tokio::spawn(async move {
            match fetcher.fetch_task(id).await {
                Ok(task) => {
                    cache.commit_task(task.clone());
                    LoadOutcome::Ready(task)
                }
                Err(error) => LoadOutcome::Failed(cache.commit_task_error(id, error)),
            }
        });
        match handle.await {
            Ok(outcome) => outcome,
            Err(_) => LoadOutcome::Failed(ErrorMark::new(FetchError::Cancelled)),
        }
    }
}
