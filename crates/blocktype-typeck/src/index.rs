//! Call graph index: procedure name to its definition and call sites.
//!
//! One index exists per graph instance. Entries are keyed by the current
//! procedure name; a rename moves the whole entry, call sites included, so
//! lookups never go through a cached definition pointer.

use rustc_hash::{FxHashMap, FxHashSet};

use blocktype_common::BlockId;

/// Everything registered under one procedure name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexEntry {
    pub definition: Option<BlockId>,
    pub call_sites: FxHashSet<BlockId>,
}

impl IndexEntry {
    fn is_empty(&self) -> bool {
        self.definition.is_none() && self.call_sites.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CallGraphIndex {
    entries: FxHashMap<String, IndexEntry>,
}

impl CallGraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live definition registered under `name`.
    pub fn definition(&self, name: &str) -> Option<BlockId> {
        self.entries.get(name).and_then(|e| e.definition)
    }

    /// Call sites registered under `name`, as a sorted copy that is safe to
    /// hold while the nodes are mutated.
    pub fn call_sites(&self, name: &str) -> Vec<BlockId> {
        let mut calls: Vec<BlockId> = self
            .entries
            .get(name)
            .map(|e| e.call_sites.iter().copied().collect())
            .unwrap_or_default();
        calls.sort();
        calls
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All names with an entry, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Register `block` as the definition of `name`.
    ///
    /// Returns `false` if a different definition already owns the name.
    pub fn register_definition(&mut self, name: &str, block: BlockId) -> bool {
        let entry = self.entries.entry(name.to_string()).or_default();
        match entry.definition {
            Some(existing) if existing != block => false,
            _ => {
                entry.definition = Some(block);
                true
            }
        }
    }

    pub fn unregister_definition(&mut self, name: &str, block: BlockId) {
        if let Some(entry) = self.entries.get_mut(name) {
            if entry.definition == Some(block) {
                entry.definition = None;
            }
        }
        self.purge(name);
    }

    pub fn register_call_site(&mut self, name: &str, block: BlockId) {
        self.entries
            .entry(name.to_string())
            .or_default()
            .call_sites
            .insert(block);
    }

    pub fn unregister_call_site(&mut self, name: &str, block: BlockId) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.call_sites.remove(&block);
        }
        self.purge(name);
    }

    /// Move the entry for `old` to `new`, merging with call sites already
    /// waiting under `new`.
    ///
    /// Returns `false` without changing anything if `new` already has a
    /// definition of its own.
    pub fn rekey(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return true;
        }
        if self.definition(new).is_some() && self.definition(old).is_some() {
            return false;
        }
        let Some(moved) = self.entries.remove(old) else {
            return true;
        };
        let entry = self.entries.entry(new.to_string()).or_default();
        if moved.definition.is_some() {
            entry.definition = moved.definition;
        }
        entry.call_sites.extend(moved.call_sites);
        true
    }

    fn purge(&mut self, name: &str) {
        if self.entries.get(name).is_some_and(IndexEntry::is_empty) {
            self.entries.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut index = CallGraphIndex::new();
        assert!(index.register_definition("foo", BlockId(1)));
        index.register_call_site("foo", BlockId(3));
        index.register_call_site("foo", BlockId(2));

        assert_eq!(index.definition("foo"), Some(BlockId(1)));
        assert_eq!(index.call_sites("foo"), vec![BlockId(2), BlockId(3)]);
        assert_eq!(index.definition("bar"), None);
        assert!(index.call_sites("bar").is_empty());
    }

    #[test]
    fn one_definition_per_name() {
        let mut index = CallGraphIndex::new();
        assert!(index.register_definition("foo", BlockId(1)));
        assert!(!index.register_definition("foo", BlockId(2)));
        assert!(index.register_definition("foo", BlockId(1)));
        assert_eq!(index.definition("foo"), Some(BlockId(1)));
    }

    #[test]
    fn empty_entries_are_purged() {
        let mut index = CallGraphIndex::new();
        index.register_definition("foo", BlockId(1));
        index.register_call_site("foo", BlockId(2));

        index.unregister_definition("foo", BlockId(1));
        assert!(index.contains("foo"), "call site keeps the entry alive");
        index.unregister_call_site("foo", BlockId(2));
        assert!(!index.contains("foo"));
    }

    #[test]
    fn unregister_ignores_other_definition() {
        let mut index = CallGraphIndex::new();
        index.register_definition("foo", BlockId(1));
        index.unregister_definition("foo", BlockId(9));
        assert_eq!(index.definition("foo"), Some(BlockId(1)));
    }

    #[test]
    fn rekey_moves_entry() {
        let mut index = CallGraphIndex::new();
        index.register_definition("foo", BlockId(1));
        index.register_call_site("foo", BlockId(2));

        assert!(index.rekey("foo", "bar"));
        assert!(!index.contains("foo"));
        assert_eq!(index.definition("bar"), Some(BlockId(1)));
        assert_eq!(index.call_sites("bar"), vec![BlockId(2)]);
    }

    #[test]
    fn rekey_merges_waiting_call_sites() {
        let mut index = CallGraphIndex::new();
        index.register_definition("foo", BlockId(1));
        index.register_call_site("foo", BlockId(2));
        index.register_call_site("bar", BlockId(5));

        assert!(index.rekey("foo", "bar"));
        assert_eq!(index.call_sites("bar"), vec![BlockId(2), BlockId(5)]);
        assert_eq!(index.names(), vec!["bar"]);
    }

    #[test]
    fn rekey_refuses_to_clobber_definition() {
        let mut index = CallGraphIndex::new();
        index.register_definition("foo", BlockId(1));
        index.register_definition("bar", BlockId(2));

        assert!(!index.rekey("foo", "bar"));
        assert_eq!(index.definition("foo"), Some(BlockId(1)));
        assert_eq!(index.definition("bar"), Some(BlockId(2)));
    }
}
