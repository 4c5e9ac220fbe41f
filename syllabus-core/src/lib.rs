//! Syllabus Core - Catalog Data Types
//!
//! Pure data structures with no behavior beyond key derivation. All other
//! crates depend on this. The catalog is a hierarchy of Subjects -> Themes ->
//! Tasks fetched level-by-level; this crate defines the entities, the typed
//! ids and level keys the cache is addressed by, and the error types.

mod entities;
mod enums;
mod error;
mod identity;

pub use entities::{LevelPayload, Subject, Task, Theme};
pub use enums::{EntityKind, ReadAccess};
pub use error::{ErrorMark, FetchError, SyllabusError, SyllabusResult, TreeError};
pub use identity::{ChildRef, LevelKey, LevelRef, RawId, SubjectId, TaskId, ThemeId, Timestamp};
