//! Dependency tracking
//!
//! A [`Dependency`] names a script-bearing owner, such as a card field or a
//! style, that must be re-run when something it reads changes. The
//! dependency pass ([`Context::dependencies`](crate::Context::dependencies))
//! walks a script without real data and registers the dependency with
//! every owner the script might read, in that owner's
//! [`DependentScripts`].

mod pass;
mod registry;
mod union;

pub use registry::{canonical_name, DependencyRegistry, RegistryNode};
pub use union::{unify, DependencyUnion};

use std::cell::Cell;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// What kind of owner depends on a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// A field of the current card
    CardField,

    /// A field of every card
    CardsField,

    /// A field of the whole set
    SetField,

    /// A style property
    Style,

    /// Copies the dependencies of another owner
    CopyDependencies,

    /// Analysis only, never registered
    Dummy,
}

/// A reference to an owner that needs updating when its inputs change.
///
/// During a pass with a `Dummy` dependency, reading a `content ...` value
/// marks the dependency as content-dependent; the caller reads the flag
/// back afterwards.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Kind of owner
    pub kind: DependencyKind,

    /// Index of the owner within its kind
    pub index: usize,

    content: Cell<bool>,
}

impl Dependency {
    /// Create a dependency on owner `index` of `kind`.
    pub fn new(kind: DependencyKind, index: usize) -> Self {
        Self {
            kind,
            index,
            content: Cell::new(false),
        }
    }

    /// A dependency used only to analyse a script.
    pub fn dummy() -> Self {
        Self::new(DependencyKind::Dummy, 0)
    }

    /// True for analysis-only dependencies.
    pub fn is_dummy(&self) -> bool {
        self.kind == DependencyKind::Dummy
    }

    /// Record that the analysed script reads measured content.
    pub fn mark_content(&self) {
        self.content.set(true);
    }

    /// Whether the analysed script reads measured content.
    pub fn is_content_dependent(&self) -> bool {
        self.content.get()
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.index == other.index
    }
}

impl Eq for Dependency {}

/// Owners that must be updated when the holder changes.
///
/// Filled by dependency passes, read when the holder's value changes.
#[derive(Debug, Default)]
pub struct DependentScripts {
    dependencies: Mutex<Vec<Dependency>>,
}

impl DependentScripts {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency. Dummy dependencies and duplicates are ignored.
    ///
    /// Returns whether the list changed.
    pub fn add(&self, dependency: &Dependency) -> bool {
        if dependency.is_dummy() {
            return false;
        }
        let mut list = self
            .dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if list.contains(dependency) {
            return false;
        }
        debug!(kind = ?dependency.kind, index = dependency.index, "registered dependency");
        list.push(Dependency::new(dependency.kind, dependency.index));
        true
    }

    /// Registered dependencies in registration order.
    pub fn list(&self) -> Vec<Dependency> {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of registered dependencies.
    pub fn len(&self) -> usize {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing depends on the holder.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all dependencies.
    pub fn clear(&self) {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates() {
        let scripts = DependentScripts::new();
        let dep = Dependency::new(DependencyKind::Style, 2);
        assert!(scripts.add(&dep));
        assert!(!scripts.add(&Dependency::new(DependencyKind::Style, 2)));
        assert!(scripts.add(&Dependency::new(DependencyKind::CardField, 2)));
        assert_eq!(scripts.len(), 2);
    }

    #[test]
    fn test_dummy_is_never_registered() {
        let scripts = DependentScripts::new();
        assert!(!scripts.add(&Dependency::dummy()));
        assert!(scripts.is_empty());
    }

    #[test]
    fn test_content_flag() {
        let dep = Dependency::dummy();
        assert!(!dep.is_content_dependent());
        dep.mark_content();
        assert!(dep.is_content_dependent());
        // Equality ignores the flag
        assert_eq!(dep, Dependency::dummy());
    }
}
