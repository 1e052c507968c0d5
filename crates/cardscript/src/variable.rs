//! Interned variable names
//!
//! Scripts refer to variables by dense numeric ids so the evaluator can
//! keep its bindings in a plain vector. The mapping from names to ids is
//! process wide: a script compiled on one thread uses the same ids as a
//! [`Context`](crate::Context) on another.

use indexmap::IndexSet;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Identifier of an interned variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(u32);

fn names() -> &'static RwLock<IndexSet<String>> {
    static NAMES: OnceLock<RwLock<IndexSet<String>>> = OnceLock::new();
    NAMES.get_or_init(|| RwLock::new(IndexSet::new()))
}

impl Variable {
    /// Intern a name, returning the id all callers share for it.
    pub fn intern(name: &str) -> Variable {
        {
            let table = names().read().unwrap_or_else(PoisonError::into_inner);
            if let Some(index) = table.get_index_of(name) {
                return Variable(index as u32);
            }
        }
        let mut table = names().write().unwrap_or_else(PoisonError::into_inner);
        let (index, _) = table.insert_full(name.to_string());
        Variable(index as u32)
    }

    /// Rebuild a variable from an instruction operand.
    pub fn from_id(id: u32) -> Variable {
        Variable(id)
    }

    /// The dense id, used as instruction operand and table index.
    pub fn id(self) -> u32 {
        self.0
    }

    /// The interned name, or a placeholder for ids that were never interned.
    pub fn name(self) -> String {
        let table = names().read().unwrap_or_else(PoisonError::into_inner);
        table
            .get_index(self.0 as usize)
            .cloned()
            .unwrap_or_else(|| format!("#{}", self.0))
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Variable::intern(name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let a = Variable::intern("interned_a");
        let b = Variable::intern("interned_b");
        assert_ne!(a, b);
        assert_eq!(Variable::intern("interned_a"), a);
        assert_eq!(a.name(), "interned_a");
    }

    #[test]
    fn test_intern_across_threads() {
        let here = Variable::intern("shared_between_threads");
        let there = std::thread::spawn(|| Variable::intern("shared_between_threads"))
            .join()
            .unwrap();
        assert_eq!(here, there);
    }

    #[test]
    fn test_unknown_id_name() {
        assert_eq!(Variable::from_id(u32::MAX).name(), format!("#{}", u32::MAX));
    }
}
