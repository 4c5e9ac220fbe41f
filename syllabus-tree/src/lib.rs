//! Syllabus Tree - Catalog Forest Assembly
//!
//! Combines the entity store and level cache into a multi-root forest of
//! renderable nodes, and drives incremental expansion: opening a branch
//! loads that branch's level on demand, nothing more.
//!
//! Assembly itself is pure - it reads whatever the cache holds right now and
//! never triggers I/O. Only [`TreeAssembler::expand`] and
//! [`TreeAssembler::retry`] go through the loader.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use syllabus_cache::{
    AccessGate, CatalogCache, ContentFetcher, EntitySlot, LevelChildren, LevelLoader, LevelState,
    LoadOutcome,
};
use syllabus_core::{
    EntityKind, ErrorMark, LevelRef, Subject, SubjectId, SyllabusResult, Task, TaskId, Theme,
    ThemeId, TreeError,
};
use tracing::warn;

// ============================================================================
// NODE TYPES
// ============================================================================

/// Identity of a forest node.
///
/// Subject, theme and task ids come from different backend sequences and may
/// collide numerically, so node identity carries the kind; two nodes are
/// equal only if both kind and id match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Subject(SubjectId),
    Theme(ThemeId),
    Task(TaskId),
}

impl NodeId {
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Subject(_) => EntityKind::Subject,
            Self::Theme(_) => EntityKind::Theme,
            Self::Task(_) => EntityKind::Task,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject(id) => write!(f, "subject:{id}"),
            Self::Theme(id) => write!(f, "theme:{id}"),
            Self::Task(id) => write!(f, "task:{id}"),
        }
    }
}

/// Load state of a node's own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Nothing cached and no fetch outstanding.
    Unloaded,
    /// A fetch for this node's level is outstanding and nothing is cached
    /// yet.
    Loading,
    /// The node's level is cached.
    Ready,
    /// The node's level holds an error marker; the UI offers a retry that
    /// goes through [`TreeAssembler::retry`].
    Errored,
}

/// One renderable node of the catalog forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    /// `None` for subject roots.
    pub parent: Option<NodeId>,
    /// The subject root this node belongs to (itself, for roots).
    pub root: NodeId,
    pub title: String,
    /// Whether the node is rendered without an expansion affordance. Driven
    /// purely by the optimistic child flags, so a node can be expandable
    /// before its level was ever fetched.
    pub is_leaf: bool,
    pub selectable: bool,
    pub state: NodeState,
}

/// Result of expanding (or retrying) a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandOutcome {
    /// Permission data has not resolved yet; nothing was fetched.
    Pending,
    /// Reading the catalog is not allowed.
    Forbidden,
    /// The node's immediate children, freshly assembled.
    Children(Vec<TreeNode>),
    /// The level fetch failed; the failure is cached on that level alone.
    Failed(ErrorMark),
}

impl ExpandOutcome {
    pub fn children(&self) -> Option<&[TreeNode]> {
        match self {
            Self::Children(nodes) => Some(nodes),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

/// Assembly options.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Include task nodes in the forest. Off for pickers that only choose
    /// attachment points.
    pub include_tasks: bool,
    /// Whether subject roots are selectable (picking a root means "attach at
    /// the top level").
    pub subjects_selectable: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            include_tasks: true,
            subjects_selectable: true,
        }
    }
}

impl TreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(mut self, include: bool) -> Self {
        self.include_tasks = include;
        self
    }

    pub fn with_selectable_subjects(mut self, selectable: bool) -> Self {
        self.subjects_selectable = selectable;
        self
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Assembles the catalog forest and drives incremental expansion.
pub struct TreeAssembler<F, G>
where
    F: ContentFetcher,
    G: AccessGate,
{
    loader: Arc<LevelLoader<F, G>>,
    options: TreeOptions,
}

impl<F, G> TreeAssembler<F, G>
where
    F: ContentFetcher + 'static,
    G: AccessGate + 'static,
{
    pub fn new(loader: Arc<LevelLoader<F, G>>, options: TreeOptions) -> Self {
        Self { loader, options }
    }

    pub fn with_defaults(loader: Arc<LevelLoader<F, G>>) -> Self {
        Self::new(loader, TreeOptions::default())
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    fn cache(&self) -> &CatalogCache {
        self.loader.cache()
    }

    /// Build the forest for the given subjects from current cache contents.
    ///
    /// Pure read: levels that are not loaded simply contribute no children
    /// yet. Nodes come out in depth-first order, each level's children in
    /// cached (backend) order, themes before tasks.
    pub fn assemble(&self, subjects: &[Subject]) -> Vec<TreeNode> {
        let mut nodes = Vec::new();
        for subject in subjects {
            let root = NodeId::Subject(subject.id);
            nodes.push(TreeNode {
                id: root,
                parent: None,
                root,
                title: subject.name.clone(),
                is_leaf: false,
                selectable: self.options.subjects_selectable,
                state: self.level_state_of(LevelRef::root(subject.id)),
            });
            self.walk(&mut nodes, subject.id, LevelRef::root(subject.id), root);
        }
        nodes
    }

    fn walk(&self, nodes: &mut Vec<TreeNode>, subject: SubjectId, level: LevelRef, parent: NodeId) {
        let state = self.cache().level(level);
        let Some(children) = state.loaded() else {
            return;
        };
        let root = NodeId::Subject(subject);
        for theme_id in &children.theme_ids {
            match self.cache().theme(*theme_id) {
                EntitySlot::Value(theme) => {
                    let own_level = theme.own_level();
                    nodes.push(self.theme_node(&theme, parent, root));
                    self.walk(nodes, subject, own_level, NodeId::Theme(*theme_id));
                }
                // A child id without a stored entity is an invariant breach;
                // skip it rather than poison the whole render.
                _ => warn!(theme = %theme_id, %level, "skipping child theme missing from store"),
            }
        }
        if self.options.include_tasks {
            for task_id in &children.task_ids {
                match self.cache().task(*task_id) {
                    EntitySlot::Value(task) => nodes.push(self.task_node(&task, parent, root)),
                    _ => warn!(task = %task_id, %level, "skipping child task missing from store"),
                }
            }
        }
    }

    /// Expand a node: load its level if needed and return its immediate
    /// children as nodes.
    ///
    /// Idempotent - re-expanding an already-loaded node assembles from cache
    /// without another fetch, so UI re-renders are free. Task nodes have no
    /// level and expand to nothing.
    ///
    /// Fails only when a theme node cannot be resolved through the entity
    /// store (needed to locate its subject); cache and fetch failures come
    /// back as [`ExpandOutcome`] states instead.
    pub async fn expand(&self, node: NodeId) -> SyllabusResult<ExpandOutcome> {
        match node {
            NodeId::Subject(subject) => Ok(self.expand_level(subject, None, node).await),
            NodeId::Theme(id) => {
                let theme = self.resolve_theme(id)?;
                Ok(self.expand_level(theme.subject_id, Some(id), node).await)
            }
            NodeId::Task(_) => Ok(ExpandOutcome::Children(Vec::new())),
        }
    }

    /// Retry a node whose level is in the error state: force a reload and
    /// return the freshly assembled children.
    pub async fn retry(&self, node: NodeId) -> SyllabusResult<ExpandOutcome> {
        match node {
            NodeId::Subject(subject) => Ok(self.reload_level(subject, None, node).await),
            NodeId::Theme(id) => {
                let theme = self.resolve_theme(id)?;
                Ok(self.reload_level(theme.subject_id, Some(id), node).await)
            }
            NodeId::Task(_) => Ok(ExpandOutcome::Children(Vec::new())),
        }
    }

    fn resolve_theme(&self, id: ThemeId) -> Result<Theme, TreeError> {
        match self.cache().theme(id) {
            EntitySlot::Value(theme) => Ok(theme),
            _ => Err(TreeError::UnknownTheme { id }),
        }
    }

    async fn expand_level(
        &self,
        subject: SubjectId,
        theme: Option<ThemeId>,
        parent: NodeId,
    ) -> ExpandOutcome {
        self.level_outcome(subject, parent, self.loader.load(subject, theme).await)
    }

    async fn reload_level(
        &self,
        subject: SubjectId,
        theme: Option<ThemeId>,
        parent: NodeId,
    ) -> ExpandOutcome {
        self.level_outcome(subject, parent, self.loader.reload(subject, theme).await)
    }

    fn level_outcome(
        &self,
        subject: SubjectId,
        parent: NodeId,
        outcome: LoadOutcome<LevelChildren>,
    ) -> ExpandOutcome {
        match outcome {
            LoadOutcome::Pending => ExpandOutcome::Pending,
            LoadOutcome::Forbidden => ExpandOutcome::Forbidden,
            LoadOutcome::Failed(mark) => ExpandOutcome::Failed(mark),
            LoadOutcome::Ready(children) => {
                ExpandOutcome::Children(self.level_nodes(subject, parent, &children))
            }
        }
    }

    fn level_nodes(
        &self,
        subject: SubjectId,
        parent: NodeId,
        children: &LevelChildren,
    ) -> Vec<TreeNode> {
        let root = NodeId::Subject(subject);
        let mut nodes = Vec::new();
        for theme_id in &children.theme_ids {
            match self.cache().theme(*theme_id) {
                EntitySlot::Value(theme) => nodes.push(self.theme_node(&theme, parent, root)),
                _ => warn!(theme = %theme_id, "skipping child theme missing from store"),
            }
        }
        if self.options.include_tasks {
            for task_id in &children.task_ids {
                match self.cache().task(*task_id) {
                    EntitySlot::Value(task) => nodes.push(self.task_node(&task, parent, root)),
                    _ => warn!(task = %task_id, "skipping child task missing from store"),
                }
            }
        }
        nodes
    }

    fn theme_node(&self, theme: &Theme, parent: NodeId, root: NodeId) -> TreeNode {
        // Expandability comes from the optimistic flags alone, so a branch
        // renders as openable before its level was ever fetched.
        let expandable = if self.options.include_tasks {
            theme.has_sub_themes || theme.has_sub_tasks
        } else {
            theme.has_sub_themes
        };
        TreeNode {
            id: NodeId::Theme(theme.id),
            parent: Some(parent),
            root,
            title: theme.title.clone(),
            is_leaf: !expandable,
            selectable: true,
            state: self.level_state_of(theme.own_level()),
        }
    }

    fn task_node(&self, task: &Task, parent: NodeId, root: NodeId) -> TreeNode {
        TreeNode {
            id: NodeId::Task(task.id),
            parent: Some(parent),
            root,
            title: task.text.clone(),
            is_leaf: true,
            selectable: false,
            state: NodeState::Ready,
        }
    }

    fn level_state_of(&self, level: LevelRef) -> NodeState {
        match self.cache().level(level) {
            LevelState::Loaded(_) => NodeState::Ready,
            LevelState::Errored(_) => NodeState::Errored,
            LevelState::Unloaded if self.loader.is_inflight(level) => NodeState::Loading,
            LevelState::Unloaded => NodeState::Unloaded,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use syllabus_core::{ChildRef, FetchError, ReadAccess, SyllabusError};
    use syllabus_test_utils::{
        payload, subject, task, task_under, theme, theme_under, MockFetcher,
    };

    fn assembler(
        fetcher: Arc<MockFetcher>,
    ) -> TreeAssembler<MockFetcher, ReadAccess> {
        assembler_with(fetcher, ReadAccess::Granted, TreeOptions::default())
    }

    fn assembler_with(
        fetcher: Arc<MockFetcher>,
        gate: ReadAccess,
        options: TreeOptions,
    ) -> TreeAssembler<MockFetcher, ReadAccess> {
        let loader = Arc::new(LevelLoader::with_defaults(
            Arc::new(CatalogCache::new()),
            fetcher,
            Arc::new(gate),
        ));
        TreeAssembler::new(loader, options)
    }

    fn s1() -> SubjectId {
        SubjectId::new(1)
    }

    #[test]
    fn test_node_ids_namespace_by_kind() {
        assert_ne!(NodeId::Theme(ThemeId::new(7)), NodeId::Task(TaskId::new(7)));
        assert_eq!(NodeId::Subject(SubjectId::new(7)).to_string(), "subject:7");
        assert_eq!(NodeId::Theme(ThemeId::new(7)).kind(), EntityKind::Theme);
    }

    #[tokio::test]
    async fn test_assemble_empty_cache_yields_bare_roots() {
        let tree = assembler(Arc::new(MockFetcher::new()));
        let nodes = tree.assemble(&[subject(1, "Maths"), subject(2, "Physics")]);
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.parent.is_none() && n.root == n.id));
        assert!(nodes.iter().all(|n| n.state == NodeState::Unloaded));
        assert!(nodes.iter().all(|n| !n.is_leaf));
    }

    #[tokio::test]
    async fn test_expand_subject_materializes_children() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut algebra = theme(10, 1);
        algebra.has_sub_themes = true;
        fetcher.level_ok(s1(), None, payload(vec![algebra], vec![]));
        let tree = assembler(Arc::clone(&fetcher));

        let outcome = tree.expand(NodeId::Subject(s1())).await.unwrap();
        let children = outcome.children().expect("expand should yield children");
        assert_eq!(children.len(), 1);
        let node = &children[0];
        assert_eq!(node.id, NodeId::Theme(ThemeId::new(10)));
        assert_eq!(node.parent, Some(NodeId::Subject(s1())));
        assert_eq!(node.root, NodeId::Subject(s1()));
        assert!(!node.is_leaf, "optimistic flag makes it expandable");
        assert!(node.selectable);
    }

    #[tokio::test]
    async fn test_re_expand_uses_cache() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.level_ok(s1(), None, payload(vec![theme(10, 1)], vec![]));
        let tree = assembler(Arc::clone(&fetcher));

        let first = tree.expand(NodeId::Subject(s1())).await.unwrap();
        let second = tree.expand(NodeId::Subject(s1())).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.level_calls(s1(), None), 1);
    }

    #[tokio::test]
    async fn test_expand_theme_resolves_subject_through_store() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut algebra = theme(10, 1);
        algebra.has_sub_themes = true;
        fetcher.level_ok(s1(), None, payload(vec![algebra], vec![]));
        fetcher.level_ok(
            s1(),
            Some(ThemeId::new(10)),
            payload(vec![theme_under(11, 1, 10)], vec![]),
        );
        let tree = assembler(Arc::clone(&fetcher));

        tree.expand(NodeId::Subject(s1())).await.unwrap();
        let outcome = tree.expand(NodeId::Theme(ThemeId::new(10))).await.unwrap();
        let children = outcome.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, NodeId::Theme(ThemeId::new(11)));
        assert_eq!(children[0].parent, Some(NodeId::Theme(ThemeId::new(10))));
        assert_eq!(children[0].root, NodeId::Subject(s1()));
    }

    #[tokio::test]
    async fn test_expand_unknown_theme_is_an_error() {
        let tree = assembler(Arc::new(MockFetcher::new()));
        let result = tree.expand(NodeId::Theme(ThemeId::new(99))).await;
        assert_eq!(
            result,
            Err(SyllabusError::Tree(TreeError::UnknownTheme {
                id: ThemeId::new(99)
            }))
        );
    }

    #[tokio::test]
    async fn test_expand_task_yields_no_children_without_io() {
        let fetcher = Arc::new(MockFetcher::new());
        let tree = assembler(Arc::clone(&fetcher));
        let outcome = tree.expand(NodeId::Task(TaskId::new(3))).await.unwrap();
        assert_eq!(outcome.children().map(<[TreeNode]>::len), Some(0));
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_expand_surfaces_error_state_and_retry_recovers() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.level_err(s1(), None, FetchError::Timeout);
        let tree = assembler(Arc::clone(&fetcher));

        let outcome = tree.expand(NodeId::Subject(s1())).await.unwrap();
        assert!(outcome.is_failed());

        let nodes = tree.assemble(&[subject(1, "Maths")]);
        assert_eq!(nodes[0].state, NodeState::Errored);

        // The retry affordance forces a reload and replaces the marker.
        fetcher.level_ok(s1(), None, payload(vec![theme(10, 1)], vec![]));
        let retried = tree.retry(NodeId::Subject(s1())).await.unwrap();
        assert_eq!(retried.children().map(<[TreeNode]>::len), Some(1));
        let nodes = tree.assemble(&[subject(1, "Maths")]);
        assert_eq!(nodes[0].state, NodeState::Ready);
    }

    #[tokio::test]
    async fn test_gate_states_pass_through_expand() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.level_ok(s1(), None, payload(vec![theme(10, 1)], vec![]));

        let pending = assembler_with(
            Arc::clone(&fetcher),
            ReadAccess::Unknown,
            TreeOptions::default(),
        );
        assert_eq!(
            pending.expand(NodeId::Subject(s1())).await.unwrap(),
            ExpandOutcome::Pending
        );

        let forbidden = assembler_with(
            Arc::clone(&fetcher),
            ReadAccess::Denied,
            TreeOptions::default(),
        );
        assert_eq!(
            forbidden.expand(NodeId::Subject(s1())).await.unwrap(),
            ExpandOutcome::Forbidden
        );
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_assemble_walks_nested_levels_in_order() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut algebra = theme(10, 1);
        algebra.has_sub_themes = true;
        algebra.has_sub_tasks = true;
        fetcher.level_ok(s1(), None, payload(vec![algebra, theme(12, 1)], vec![]));
        fetcher.level_ok(
            s1(),
            Some(ThemeId::new(10)),
            payload(vec![theme_under(11, 1, 10)], vec![task_under(3, 1, 10)]),
        );
        let tree = assembler(Arc::clone(&fetcher));
        tree.expand(NodeId::Subject(s1())).await.unwrap();
        tree.expand(NodeId::Theme(ThemeId::new(10))).await.unwrap();

        let nodes = tree.assemble(&[subject(1, "Maths")]);
        let ids: Vec<String> = nodes.iter().map(|n| n.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "subject:1",
                "theme:10",
                "theme:11",
                "task:3",
                "theme:12",
            ]
        );
    }

    #[tokio::test]
    async fn test_tasks_mode_off_hides_tasks_and_uses_theme_flag_only() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut tasks_only = theme(10, 1);
        tasks_only.has_sub_tasks = true;
        fetcher.level_ok(s1(), None, payload(vec![tasks_only], vec![task(3, 1)]));
        let tree = assembler_with(
            Arc::clone(&fetcher),
            ReadAccess::Granted,
            TreeOptions::new().with_tasks(false),
        );

        let outcome = tree.expand(NodeId::Subject(s1())).await.unwrap();
        let children = outcome.children().unwrap();
        assert_eq!(children.len(), 1);
        // Without task nodes in the picker, a theme holding only tasks is a
        // leaf even though its has_sub_tasks flag is set.
        assert!(children[0].is_leaf);
    }

    #[tokio::test]
    async fn test_dangling_child_id_is_skipped() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.level_ok(s1(), None, payload(vec![theme(10, 1)], vec![]));
        let tree = assembler(Arc::clone(&fetcher));
        tree.expand(NodeId::Subject(s1())).await.unwrap();

        // Inject a child id with no backing entity.
        tree.loader
            .cache()
            .append_child(LevelRef::root(s1()), ChildRef::Theme(ThemeId::new(99)));

        let nodes = tree.assemble(&[subject(1, "Maths")]);
        assert!(nodes.iter().all(|n| n.id != NodeId::Theme(ThemeId::new(99))));
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_node_reports_loading_while_fetch_outstanding() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.level_ok(s1(), None, payload(vec![theme(10, 1)], vec![]));
        let loader = Arc::new(LevelLoader::with_defaults(
            Arc::new(CatalogCache::new()),
            Arc::clone(&fetcher),
            Arc::new(ReadAccess::Granted),
        ));
        let tree = Arc::new(TreeAssembler::with_defaults(Arc::clone(&loader)));

        let hold = fetcher.hold().await;
        let expanding = tokio::spawn({
            let tree = Arc::clone(&tree);
            async move { tree.expand(NodeId::Subject(SubjectId::new(1))).await }
        });
        while fetcher.level_calls(s1(), None) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let nodes = tree.assemble(&[subject(1, "Maths")]);
        assert_eq!(nodes[0].state, NodeState::Loading);

        drop(hold);
        let outcome = expanding.await.unwrap().unwrap();
        assert_eq!(outcome.children().map(<[TreeNode]>::len), Some(1));
        let nodes = tree.assemble(&[subject(1, "Maths")]);
        assert_eq!(nodes[0].state, NodeState::Ready);
    }
}
