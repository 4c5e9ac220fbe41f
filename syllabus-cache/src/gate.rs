//! Read-permission gate.
//!
//! Whether the caller may read the catalog at all is decided elsewhere (the
//! permission subsystem); this module only defines the seam the loader
//! consults before any network activity. Write permission is a separate
//! check owned by the mutating caller: revocation and deletion never consult
//! the gate.

use std::sync::RwLock;
use syllabus_core::ReadAccess;

/// Source of the catalog read permission.
pub trait AccessGate: Send + Sync {
    fn read_access(&self) -> ReadAccess;
}

/// A fixed gate. Handy for tests and for callers whose permission is known
/// statically.
impl AccessGate for ReadAccess {
    fn read_access(&self) -> ReadAccess {
        *self
    }
}

/// A gate the owning session resolves once permission data arrives.
///
/// Starts `Unknown`; the session calls [`set`](Self::set) when the
/// permission response lands (and may flip it again on role changes).
#[derive(Debug, Default)]
pub struct SharedAccess {
    access: RwLock<ReadAccess>,
}

impl SharedAccess {
    /// An unresolved gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate resolved from the start.
    pub fn with_access(access: ReadAccess) -> Self {
        Self {
            access: RwLock::new(access),
        }
    }

    /// Resolve (or update) the permission.
    pub fn set(&self, access: ReadAccess) {
        *self.access.write().unwrap_or_else(|e| e.into_inner()) = access;
    }
}

impl AccessGate for SharedAccess {
    fn read_access(&self) -> ReadAccess {
        *self.access.read().unwrap_or_else(|e| e.into_inner())
    }
}
