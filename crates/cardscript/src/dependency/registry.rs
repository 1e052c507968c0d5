//! Owners visible to dependency passes
//!
//! During a pass, reading a registered variable yields a placeholder instead of
//! real data. Member reads on the placeholder find the owner behind the member
//! and register the running dependency with it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::{Dependency, DependentScripts};
use crate::value::{ScriptIterator, ScriptObject, ScriptValue};
use crate::variable::Variable;

/// Prefix of measured values such as `content width`.
const CONTENT_PREFIX: &str = "content ";

/// Normalise a member name: `card_style` and `card style` are the same.
pub fn canonical_name(name: &str) -> String {
    name.replace('_', " ")
}

/// Something a script can read during a dependency pass.
#[derive(Debug, Clone)]
pub enum RegistryNode {
    /// A value with its own list of dependents
    Owner {
        /// Canonical name of the value
        name: String,

        /// Who to update when the value changes
        scripts: Arc<DependentScripts>,
    },

    /// A named group of nodes, such as the fields of a card
    Group {
        /// Canonical name of the group
        name: String,

        /// Members by canonical name
        members: IndexMap<String, Arc<RegistryNode>>,
    },
}

impl RegistryNode {
    /// A leaf owner.
    pub fn owner(name: &str, scripts: Arc<DependentScripts>) -> Self {
        RegistryNode::Owner {
            name: canonical_name(name),
            scripts,
        }
    }

    /// An empty group.
    pub fn group(name: &str) -> Self {
        RegistryNode::Group {
            name: canonical_name(name),
            members: IndexMap::new(),
        }
    }

    /// Add a member to a group. Has no effect on an owner.
    pub fn with_member(mut self, member: RegistryNode) -> Self {
        if let RegistryNode::Group { members, .. } = &mut self {
            members.insert(member.name().to_string(), Arc::new(member));
        }
        self
    }

    /// Canonical name of the node.
    pub fn name(&self) -> &str {
        match self {
            RegistryNode::Owner { name, .. } | RegistryNode::Group { name, .. } => name,
        }
    }

    /// Find a direct member of a group.
    pub fn get(&self, name: &str) -> Option<&Arc<RegistryNode>> {
        match self {
            RegistryNode::Group { members, .. } => members.get(&canonical_name(name)),
            RegistryNode::Owner { .. } => None,
        }
    }

    /// Record that the dependency reads this node.
    ///
    /// Reading a group reads nothing by itself; its members are signalled
    /// when they are accessed or iterated.
    pub fn signal(&self, dep: &Dependency) {
        if let RegistryNode::Owner { name, scripts } = self {
            if dep.is_dummy() && name.starts_with(CONTENT_PREFIX) {
                dep.mark_content();
            }
            trace!(owner = %name, kind = ?dep.kind, "dependency read");
            scripts.add(dep);
        }
    }

    /// Signal every owner below this node.
    pub fn signal_all(&self, dep: &Dependency) {
        match self {
            RegistryNode::Owner { .. } => self.signal(dep),
            RegistryNode::Group { members, .. } => {
                for member in members.values() {
                    member.signal_all(dep);
                }
            }
        }
    }
}

/// The placeholder value standing in for a node during a pass.
pub(crate) fn placeholder(node: &Arc<RegistryNode>) -> ScriptValue {
    ScriptValue::Object(Arc::new(Placeholder(node.clone())))
}

struct Placeholder(Arc<RegistryNode>);

impl ScriptObject for Placeholder {
    fn type_name(&self) -> String {
        self.0.name().to_string()
    }

    fn member(&self, _name: &str) -> Option<ScriptValue> {
        None
    }

    fn dependency_member(&self, name: &str, dep: &Dependency) -> ScriptValue {
        match self.0.get(name) {
            Some(member) => {
                member.signal(dep);
                placeholder(member)
            }
            None => ScriptValue::Nil,
        }
    }

    fn dependency_iterator(&self, dep: &Dependency) -> ScriptValue {
        self.0.signal_all(dep);
        let items: Vec<_> = match self.0.as_ref() {
            RegistryNode::Group { members, .. } => members
                .iter()
                .map(|(key, member)| (ScriptValue::string(key.as_str()), placeholder(member)))
                .collect(),
            RegistryNode::Owner { .. } => vec![(ScriptValue::Int(0), ScriptValue::Nil)],
        };
        ScriptValue::Iterator(ScriptIterator::custom(items.into_iter()))
    }
}

/// Variables backed by owners, consulted by `GET_VAR` during a pass.
#[derive(Debug, Clone, Default)]
pub struct DependencyRegistry {
    variables: HashMap<Variable, Arc<RegistryNode>>,
}

impl DependencyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` visible to passes as the variable with the node's name.
    pub fn register(&mut self, node: RegistryNode) {
        let variable = Variable::intern(node.name());
        self.variables.insert(variable, Arc::new(node));
    }

    /// Remove a registered variable.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.variables
            .remove(&Variable::intern(&canonical_name(name)))
            .is_some()
    }

    /// The node registered for a variable.
    pub fn lookup(&self, variable: Variable) -> Option<&Arc<RegistryNode>> {
        self.variables.get(&variable)
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.variables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyKind;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("card_style"), "card style");
        assert_eq!(canonical_name("content width"), "content width");
    }

    #[test]
    fn test_member_read_signals_owner() {
        let title = Arc::new(DependentScripts::new());
        let card = Arc::new(
            RegistryNode::group("card").with_member(RegistryNode::owner("title", title.clone())),
        );
        let dep = Dependency::new(DependencyKind::CardField, 3);
        let value = placeholder(&card);
        let ScriptValue::Object(obj) = value else {
            panic!("placeholder is an object");
        };
        let member = obj.dependency_member("title", &dep);
        assert!(matches!(member, ScriptValue::Object(_)));
        assert_eq!(title.list(), vec![dep.clone()]);
        assert_eq!(obj.dependency_member("missing", &dep), ScriptValue::Nil);
    }

    #[test]
    fn test_content_prefix_marks_dummy() {
        let width = Arc::new(DependentScripts::new());
        let style = RegistryNode::group("card style")
            .with_member(RegistryNode::owner("content_width", width.clone()));
        let dep = Dependency::dummy();
        style
            .get("content width")
            .expect("member registered")
            .signal(&dep);
        assert!(dep.is_content_dependent());
        assert!(width.is_empty());
    }

    #[test]
    fn test_register_by_canonical_name() {
        let mut registry = DependencyRegistry::new();
        registry.register(RegistryNode::group("card_style"));
        assert!(registry.lookup(Variable::intern("card style")).is_some());
        assert!(registry.unregister("card_style"));
        assert!(registry.is_empty());
    }
}
