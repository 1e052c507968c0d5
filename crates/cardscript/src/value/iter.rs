//! Iterators consumed by `LOOP` and `LOOP_WITH_KEY`

use std::sync::{Arc, Mutex, PoisonError};

use super::{Collection, ScriptValue};

/// Position of an iteration.
///
/// Every state yields `(key, value)` pairs.
pub enum IterState {
    /// Entries of a collection, in order
    Collection {
        /// The collection being walked
        items: Arc<Collection>,
        /// Index of the next entry
        pos: usize,
    },

    /// Integers from `next` up to and including `end`
    Range {
        /// Next value to yield, `None` once past `i64::MAX`
        next: Option<i64>,
        /// Last value to yield
        end: i64,
        /// Key of the next value
        index: i64,
    },

    /// Host supplied sequence
    Custom(Box<dyn Iterator<Item = (ScriptValue, ScriptValue)> + Send>),

    /// Yields nothing
    Empty,
}

impl Iterator for IterState {
    type Item = (ScriptValue, ScriptValue);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            IterState::Collection { items, pos } => {
                let value = items.get_index(*pos)?.clone();
                let key = items.key_at(*pos);
                *pos += 1;
                Some((key, value))
            }
            IterState::Range { next, end, index } => {
                let last = *end;
                let value = (*next).filter(|value| *value <= last)?;
                *next = value.checked_add(1);
                let key = *index;
                *index = index.saturating_add(1);
                Some((ScriptValue::Int(key), ScriptValue::Int(value)))
            }
            IterState::Custom(inner) => inner.next(),
            IterState::Empty => None,
        }
    }
}

/// Shared handle to an iteration in progress.
#[derive(Clone)]
pub struct ScriptIterator(Arc<Mutex<IterState>>);

impl ScriptIterator {
    /// Wrap an iteration state.
    pub fn new(state: IterState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Iterate over a collection.
    pub fn over(items: Arc<Collection>) -> Self {
        Self::new(IterState::Collection { items, pos: 0 })
    }

    /// Iterate over `start..=end`.
    pub fn range(start: i64, end: i64) -> Self {
        Self::new(IterState::Range {
            next: Some(start),
            end,
            index: 0,
        })
    }

    /// Iterate over a host sequence.
    pub fn custom<I>(items: I) -> Self
    where
        I: Iterator<Item = (ScriptValue, ScriptValue)> + Send + 'static,
    {
        Self::new(IterState::Custom(Box::new(items)))
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        Self::new(IterState::Empty)
    }

    /// Advance, returning the next key and value.
    pub fn next_entry(&self) -> Option<(ScriptValue, ScriptValue)> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        state.next()
    }

    /// True if both handles share one iteration.
    pub fn ptr_eq(&self, other: &ScriptIterator) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_inclusive() {
        let it = ScriptIterator::range(3, 5);
        let values: Vec<_> = std::iter::from_fn(|| it.next_entry()).collect();
        assert_eq!(
            values,
            vec![
                (ScriptValue::Int(0), ScriptValue::Int(3)),
                (ScriptValue::Int(1), ScriptValue::Int(4)),
                (ScriptValue::Int(2), ScriptValue::Int(5)),
            ]
        );
    }

    #[test]
    fn test_range_ending_at_max_stops() {
        let it = ScriptIterator::range(i64::MAX - 1, i64::MAX);
        let values: Vec<_> = std::iter::from_fn(|| it.next_entry()).collect();
        assert_eq!(
            values,
            vec![
                (ScriptValue::Int(0), ScriptValue::Int(i64::MAX - 1)),
                (ScriptValue::Int(1), ScriptValue::Int(i64::MAX)),
            ]
        );
        assert!(it.next_entry().is_none());
    }

    #[test]
    fn test_range_from_min_keys_from_zero() {
        let it = ScriptIterator::range(i64::MIN, i64::MIN + 1);
        assert_eq!(
            it.next_entry(),
            Some((ScriptValue::Int(0), ScriptValue::Int(i64::MIN)))
        );
        assert_eq!(
            it.next_entry(),
            Some((ScriptValue::Int(1), ScriptValue::Int(i64::MIN + 1)))
        );
        assert!(it.next_entry().is_none());
    }

    #[test]
    fn test_empty_range() {
        let it = ScriptIterator::range(2, 1);
        assert!(it.next_entry().is_none());
    }

    #[test]
    fn test_copies_share_position() {
        let it = ScriptIterator::over(Arc::new(Collection::list(vec![
            ScriptValue::Int(1),
            ScriptValue::Int(2),
        ])));
        let copy = it.clone();
        assert_eq!(it.next_entry().map(|e| e.1), Some(ScriptValue::Int(1)));
        assert_eq!(copy.next_entry().map(|e| e.1), Some(ScriptValue::Int(2)));
        assert!(it.next_entry().is_none());
    }
}
