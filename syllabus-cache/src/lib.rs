//! Syllabus Cache - Normalized Catalog Cache
//!
//! Client-side cache for the Subjects -> Themes -> Tasks catalog. Content is
//! fetched level-by-level on demand, normalized into per-entity slots, and
//! kept consistent across create/edit/delete mutations by patching instead
//! of blind invalidation.
//!
//! The moving parts:
//! - [`CatalogCache`] - entity store + level cache behind one lock; all
//!   reads and synchronous mutation patches go through it.
//! - [`LevelLoader`] - gated read-through loading over a [`ContentFetcher`]
//!   collaborator, with error-as-state results and in-flight coalescing.
//! - [`AccessGate`] - the read-permission seam; while permission data is
//!   unresolved or denied, no fetch is ever issued.

mod catalog;
mod config;
mod gate;
mod level;
mod loader;
mod store;

pub use catalog::CatalogCache;
pub use config::LoaderConfig;
pub use gate::{AccessGate, SharedAccess};
pub use level::{LevelCache, LevelChildren, LevelState};
pub use loader::{ContentFetcher, LevelLoader, LoadOutcome};
pub use store::{EntitySlot, EntityStore};
