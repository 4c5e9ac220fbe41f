//! Loader configuration.

/// Configuration for the level loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Share one in-flight fetch between concurrent loads of the same
    /// uncached level. With coalescing off, racing loads each fetch; commits
    /// are idempotent whole-level overwrites, so the cache still converges.
    pub coalesce_inflight: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            coalesce_inflight: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable in-flight request coalescing.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_inflight = enabled;
        self
    }
}
