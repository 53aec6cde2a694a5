//! Generic three-step set diff.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
};

/// A cacheable record with a stable identity.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync;

    /// Identity within its scope.
    fn key(&self) -> Self::Key;

    /// Structural equality used to detect updates.
    fn same_as(&self, other: &Self) -> bool;
}

/// Pre- and post-image of an updated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

/// Result of one diff pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<T> {
    /// In input order.
    pub added: Vec<T>,
    /// In input order.
    pub updated: Vec<Change<T>>,
    pub removed: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> Diff<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Compare `old` against the authoritative `new` collection.
///
/// Works on a copy of `old`: every member of `new` found in the copy is
/// taken out of it, and whatever is left at the end was removed. Members
/// repeating an earlier key are ignored.
pub fn diff<T, I>(old: &HashMap<T::Key, T>, new: I) -> Diff<T>
where
    T: Entity,
    I: IntoIterator<Item = T>,
{
    let mut remaining = old.clone();
    let mut seen = HashSet::new();
    let mut result = Diff::default();

    for member in new {
        let key = member.key();
        if !seen.insert(key.clone()) {
            tracing::warn!(?key, "Duplicate member in collection, ignoring");
            continue;
        }
        match remaining.remove(&key) {
            Some(previous) if previous.same_as(&member) => {}
            Some(previous) => result.updated.push(Change {
                old: previous,
                new: member,
            }),
            None => result.added.push(member),
        }
    }

    result.removed = remaining.into_values().collect();
    result
}

/// Write a diff into `table`.
pub fn apply<T: Entity>(table: &mut HashMap<T::Key, T>, diff: &Diff<T>) {
    for member in &diff.added {
        table.insert(member.key(), member.clone());
    }
    for change in &diff.updated {
        table.insert(change.new.key(), change.new.clone());
    }
    for member in &diff.removed {
        table.remove(&member.key());
    }
}

/// Index a collection by key. Later duplicates win.
pub fn index<T: Entity>(members: impl IntoIterator<Item = T>) -> HashMap<T::Key, T> {
    members.into_iter().map(|m| (m.key(), m)).collect()
}
