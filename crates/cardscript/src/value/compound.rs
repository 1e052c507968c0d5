//! Compound value types: colors, collections and host objects

use indexmap::IndexMap;

use super::{ScriptIterator, ScriptValue};
use crate::context::Context;
use crate::dependency::Dependency;
use crate::error::Result;

/// An RGBA color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel, 255 is opaque
    pub a: u8,
}

impl Color {
    /// An opaque color.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// A color with explicit alpha.
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Ordered mapping from string keys to values.
///
/// Entries built without a key get their position as key, which makes a
/// list a collection whose keys are `"0"`, `"1"`, ...
#[derive(Debug, Clone, Default)]
pub struct Collection {
    entries: IndexMap<String, ScriptValue>,
    positional: bool,
}

impl Collection {
    /// An empty list.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            positional: true,
        }
    }

    /// A list of values with positional keys.
    pub fn list(values: impl IntoIterator<Item = ScriptValue>) -> Self {
        let mut collection = Self::new();
        for value in values {
            collection.push(None, value);
        }
        collection
    }

    /// Build from optional keys and values in order.
    pub fn from_entries(entries: impl IntoIterator<Item = (Option<String>, ScriptValue)>) -> Self {
        let mut collection = Self::new();
        for (key, value) in entries {
            collection.push(key, value);
        }
        collection
    }

    /// Append an entry; a missing key becomes the entry's position.
    pub fn push(&mut self, key: Option<String>, value: ScriptValue) {
        match key {
            Some(key) => {
                self.positional = false;
                self.entries.insert(key, value);
            }
            None => {
                let key = self.entries.len().to_string();
                self.entries.insert(key, value);
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every entry was added without a key.
    pub fn is_list(&self) -> bool {
        self.positional
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&ScriptValue> {
        self.entries.get(key)
    }

    /// Look up an entry by position.
    pub fn get_index(&self, index: usize) -> Option<&ScriptValue> {
        self.entries.get_index(index).map(|(_, v)| v)
    }

    /// The key of the entry at `index` as a script value.
    ///
    /// Lists report integer positions, other collections their string keys.
    pub fn key_at(&self, index: usize) -> ScriptValue {
        if self.positional {
            return ScriptValue::Int(index as i64);
        }
        match self.entries.get_index(index) {
            Some((key, _)) => ScriptValue::string(key),
            None => ScriptValue::Nil,
        }
    }

    /// Iterate over keys and values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScriptValue)> {
        self.entries.iter()
    }

    /// Values in order.
    pub fn values(&self) -> impl Iterator<Item = &ScriptValue> {
        self.entries.values()
    }

    /// Concatenate two collections; list entries of `other` are renumbered.
    pub fn concat(&self, other: &Collection) -> Collection {
        let mut result = self.clone();
        for (key, value) in other.iter() {
            let key = if other.positional {
                None
            } else {
                Some(key.clone())
            };
            result.push(key, value.clone());
        }
        result
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

/// A host object that scripts can read members from.
///
/// Objects give templates a way to expose live data to scripts, and to
/// say during a dependency pass which owners a member read touches.
pub trait ScriptObject: Send + Sync {
    /// Type name used in messages.
    fn type_name(&self) -> String;

    /// Read a member during normal evaluation.
    fn member(&self, name: &str) -> Option<ScriptValue>;

    /// Read a member during a dependency pass.
    ///
    /// Objects backed by owners register `dep` with them here. The returned
    /// value stands in for the member in the rest of the pass.
    fn dependency_member(&self, name: &str, _dep: &Dependency) -> ScriptValue {
        self.member(name).unwrap_or(ScriptValue::Nil)
    }

    /// Iterate over the object, if it is iterable.
    fn make_iterator(&self) -> Option<ScriptIterator> {
        None
    }

    /// Iterate during a dependency pass.
    ///
    /// The default iterates normally, or yields a single nil so loop
    /// bodies are still analysed.
    fn dependency_iterator(&self, _dep: &Dependency) -> ScriptValue {
        match self.make_iterator() {
            Some(it) => ScriptValue::Iterator(it),
            None => ScriptValue::Iterator(ScriptIterator::custom(
                std::iter::once((ScriptValue::Int(0), ScriptValue::Nil)),
            )),
        }
    }

    /// Dependencies of calling the object, if it is callable.
    fn dependencies(&self, _ctx: &mut Context, _dep: &Dependency) -> Result<ScriptValue> {
        Ok(ScriptValue::Nil)
    }
}
