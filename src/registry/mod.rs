//! # Pattern Registry
//!
//! Holds the active set of [`PatternDefinition`]s as an immutable, versioned
//! [`RegistrySnapshot`].
//!
//! ## Snapshots
//!
//! Readers call [`PatternRegistry::current`] and keep the returned
//! `Arc<RegistrySnapshot>` for as long as they need it. A reload builds a new
//! snapshot off to the side ([`PatternRegistry::load_snapshot`]) and then
//! publishes it with a single atomic pointer swap
//! ([`PatternRegistry::publish`]). In-flight generations therefore finish
//! against the snapshot they started with, and no reader ever observes a
//! half-updated registry. Reads take no locks.
//!
//! ## Versioning
//!
//! Each snapshot carries a [`RegistryVersion`]: a monotonic counter plus the
//! first 16 hex characters of the SHA-256 of the source content.
//!
//! ## Compatibility
//!
//! Compatibility is a denylist. A pattern accepts every module type unless it
//! lists the type in `incompatible_types`, so adding a module type never
//! silently breaks existing patterns.

mod pattern;
mod snapshot;

pub use pattern::*;
pub use snapshot::*;

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::RegistryError;
use crate::spec::ModuleType;

/// Process-wide holder of the active registry snapshot.
pub struct PatternRegistry {
    active: ArcSwap<RegistrySnapshot>,
    next_version: AtomicU64,
}

impl PatternRegistry {
    /// Registry over the built-in pattern file.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_source(&PatternSource::Builtin)
    }

    pub fn from_source(source: &PatternSource) -> Result<Self, RegistryError> {
        Ok(Self::new(RegistrySnapshot::load(source, 1)?))
    }

    pub fn new(snapshot: RegistrySnapshot) -> Self {
        let next = snapshot.version().version + 1;
        Self {
            active: ArcSwap::from_pointee(snapshot),
            next_version: AtomicU64::new(next),
        }
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<RegistrySnapshot> {
        self.active.load_full()
    }

    pub fn version(&self) -> RegistryVersion {
        self.active.load().version().clone()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<PatternDefinition>, RegistryError> {
        self.active.load().lookup(name)
    }

    pub fn compatibility_check(
        &self,
        pattern: &str,
        module_type: ModuleType,
    ) -> Result<Compatibility, RegistryError> {
        self.active.load().compatibility_check(pattern, module_type)
    }

    /// Build a new snapshot from `source` without touching the active one.
    pub fn load_snapshot(&self, source: &PatternSource) -> Result<RegistrySnapshot, RegistryError> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        RegistrySnapshot::load(source, version)
    }

    /// Atomically make `snapshot` the active one.
    pub fn publish(&self, snapshot: RegistrySnapshot) -> RegistryVersion {
        let version = snapshot.version().clone();
        let previous = self.active.swap(Arc::new(snapshot));
        info!(
            old_version = %previous.version(),
            new_version = %version,
            "Pattern registry snapshot published"
        );
        version
    }

    /// Load `source` and publish it. On error the active snapshot is kept.
    pub fn reload(&self, source: &PatternSource) -> Result<RegistryVersion, RegistryError> {
        let snapshot = self.load_snapshot(source)?;
        Ok(self.publish(snapshot))
    }
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("version", &self.version())
            .finish()
    }
}
