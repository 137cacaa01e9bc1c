//! Generic string-keyed registry with exact and fuzzy lookup.
//!
//! A [`Registry`] is the store behind every named collection in the world:
//! entities, templates. Keys are unique -- [`Registry::register`] rejects a
//! key that is already present instead of overwriting it. Iteration follows
//! insertion order so that filters and fuzzy matches are deterministic.
//!
//! Keys may carry an *instancing suffix* (`rock#3`): everything from the first
//! instance separator onwards. [`Registry::base_id`] strips it, which lets
//! template instances be related back to the key they were stamped from.

use std::collections::HashMap;

use crate::FableError;

/// Separator between a base identity and its instance ordinal.
pub const DEFAULT_INSTANCE_SEPARATOR: &str = "#";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Id-keyed store that refuses duplicate keys.
pub struct Registry<V> {
    /// What this registry holds, used in logs and conflict errors.
    kind: &'static str,
    /// Instancing suffix separator used by [`base_id`](Self::base_id).
    separator: String,
    entries: HashMap<String, V>,
    /// Keys in insertion order.
    order: Vec<String>,
}

impl<V> Registry<V> {
    /// Create an empty registry using [`DEFAULT_INSTANCE_SEPARATOR`].
    pub fn new(kind: &'static str) -> Self {
        Self::with_separator(kind, DEFAULT_INSTANCE_SEPARATOR)
    }

    /// Create an empty registry with a custom instancing separator.
    pub fn with_separator(kind: &'static str, separator: impl Into<String>) -> Self {
        Self {
            kind,
            separator: separator.into(),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The label given to this registry at construction.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Store `value` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`FableError::Conflict`] if `id` is already present. The
    /// existing value is left untouched.
    pub fn register(&mut self, id: impl Into<String>, value: V) -> Result<&mut V, FableError> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(FableError::Conflict {
                registry: self.kind,
                key: id,
            });
        }
        self.order.push(id.clone());
        Ok(self.entries.entry(id).or_insert(value))
    }

    /// Look up a value by its exact id, logging a warning on a miss.
    pub fn get_by_id(&self, id: &str) -> Option<&V> {
        let found = self.entries.get(id);
        if found.is_none() {
            tracing::warn!(registry = self.kind, id = %id, "no entry registered under this id");
        }
        found
    }

    /// Mutable variant of [`get_by_id`](Self::get_by_id).
    pub fn get_by_id_mut(&mut self, id: &str) -> Option<&mut V> {
        let found = self.entries.get_mut(id);
        if found.is_none() {
            tracing::warn!(registry = self.kind, id = %id, "no entry registered under this id");
        }
        found
    }

    /// Look up a value without logging. For probes where a miss is expected.
    pub fn get(&self, id: &str) -> Option<&V> {
        self.entries.get(id)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, id: &str) -> Option<&mut V> {
        self.entries.get_mut(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return the value stored under `id`.
    pub fn remove(&mut self, id: &str) -> Option<V> {
        let value = self.entries.remove(id)?;
        self.order.retain(|key| key != id);
        Some(value)
    }

    /// Remove every entry, returning them in insertion order.
    pub fn drain(&mut self) -> Vec<(String, V)> {
        let order = std::mem::take(&mut self.order);
        let mut drained = Vec::with_capacity(order.len());
        for key in order {
            if let Some(value) = self.entries.remove(&key) {
                drained.push((key, value));
            }
        }
        drained
    }

    /// Strip the instancing suffix from `id`.
    ///
    /// `rock#2` becomes `rock`; an id without a separator is returned as is.
    pub fn base_id<'a>(&self, id: &'a str) -> &'a str {
        base_id(id, &self.separator)
    }

    /// Every value whose key, with its instancing suffix stripped, equals `base`.
    pub fn get_all_by_base_id(&self, base: &str) -> Vec<&V> {
        self.iter()
            .filter(|(key, _)| self.base_id(key) == base)
            .map(|(_, value)| value)
            .collect()
    }

    /// Every value whose key matches `pattern`.
    ///
    /// `*` matches any run of characters, `^` anchors the pattern at the start
    /// of the key and `$` at the end. Without anchors the pattern may match
    /// anywhere inside the key.
    pub fn find_fuzzy(&self, pattern: &str) -> Vec<&V> {
        self.iter()
            .filter(|(key, _)| fuzzy_match(pattern, key))
            .map(|(_, value)| value)
            .collect()
    }

    /// Every `(key, value)` pair for which `predicate` holds.
    pub fn filter<F>(&self, mut predicate: F) -> Vec<(&str, &V)>
    where
        F: FnMut(&str, &V) -> bool,
    {
        self.iter().filter(|(key, value)| predicate(key, value)).collect()
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|value| (key.as_str(), value)))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> std::fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("len", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Matching helpers
// ---------------------------------------------------------------------------

/// Strip everything from the first `separator` onwards.
pub fn base_id<'a>(id: &'a str, separator: &str) -> &'a str {
    if separator.is_empty() {
        return id;
    }
    match id.find(separator) {
        Some(at) => &id[..at],
        None => id,
    }
}

/// Match `key` against a fuzzy pattern (`*` wildcard, `^`/`$` anchors).
pub fn fuzzy_match(pattern: &str, key: &str) -> bool {
    let (anchored_start, rest) = match pattern.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };
    let (anchored_end, body) = match rest.strip_suffix('$') {
        Some(body) => (true, body),
        None => (false, rest),
    };

    let parts: Vec<&str> = body.split('*').collect();
    if parts.len() == 1 {
        return match (anchored_start, anchored_end) {
            (true, true) => key == body,
            (true, false) => key.starts_with(body),
            (false, true) => key.ends_with(body),
            (false, false) => key.contains(body),
        };
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    let mut lo = 0;
    let mut hi = key.len();

    if anchored_start {
        if !key.starts_with(first) {
            return false;
        }
        lo = first.len();
    }
    if anchored_end {
        if key.len() < lo + last.len() || !key.ends_with(last) {
            return false;
        }
        hi = key.len() - last.len();
    }

    let middle = &parts[usize::from(anchored_start)..parts.len() - usize::from(anchored_end)];
    let mut pos = lo;
    for part in middle {
        if part.is_empty() {
            continue;
        }
        match key[pos..hi].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Registry<u32> {
        let mut reg = Registry::new("test");
        reg.register("rock", 1).unwrap();
        reg.register("rock#0", 2).unwrap();
        reg.register("rock#1", 3).unwrap();
        reg.register("bedrock", 4).unwrap();
        reg.register("lamp", 5).unwrap();
        reg
    }

    #[test]
    fn duplicate_key_conflicts_and_keeps_original() {
        let mut reg = sample();
        let err = reg.register("rock", 99).unwrap_err();
        assert_eq!(err.code(), "E_CONFLICT");
        assert_eq!(reg.get("rock"), Some(&1));
        assert_eq!(reg.len(), 5);
    }

    #[test]
    fn get_by_id_miss_is_none() {
        let reg = sample();
        assert_eq!(reg.get_by_id("nothing"), None);
        assert_eq!(reg.get_by_id("lamp"), Some(&5));
    }

    #[test]
    fn base_id_strips_suffix() {
        let reg = sample();
        assert_eq!(reg.base_id("rock#12"), "rock");
        assert_eq!(reg.base_id("rock"), "rock");
        assert_eq!(base_id("a::b", "::"), "a");
        assert_eq!(base_id("a#b", ""), "a#b");
    }

    #[test]
    fn all_by_base_id_in_insertion_order() {
        let reg = sample();
        assert_eq!(reg.get_all_by_base_id("rock"), vec![&1, &2, &3]);
        assert!(reg.get_all_by_base_id("pebble").is_empty());
    }

    #[test]
    fn fuzzy_unanchored_matches_anywhere() {
        let reg = sample();
        assert_eq!(reg.find_fuzzy("rock"), vec![&1, &2, &3, &4]);
        assert_eq!(reg.find_fuzzy("am"), vec![&5]);
    }

    #[test]
    fn fuzzy_anchors() {
        let reg = sample();
        assert_eq!(reg.find_fuzzy("^rock$"), vec![&1]);
        assert_eq!(reg.find_fuzzy("^rock"), vec![&1, &2, &3]);
        assert_eq!(reg.find_fuzzy("rock$"), vec![&1, &4]);
        assert!(reg.find_fuzzy("^zzz").is_empty());
    }

    #[test]
    fn fuzzy_wildcards() {
        let reg = sample();
        assert_eq!(reg.find_fuzzy("^rock#*$"), vec![&2, &3]);
        assert_eq!(reg.find_fuzzy("^*rock$"), vec![&1, &4]);
        assert_eq!(reg.find_fuzzy("r*#"), vec![&2, &3]);
        assert_eq!(reg.find_fuzzy("*").len(), 5);
    }

    #[test]
    fn fuzzy_match_edge_cases() {
        assert!(fuzzy_match("^$", ""));
        assert!(!fuzzy_match("^$", "a"));
        assert!(fuzzy_match("^a*a$", "aa"));
        assert!(!fuzzy_match("^a*a$", "a"));
        assert!(fuzzy_match("^a**b$", "ab"));
        assert!(fuzzy_match("^h*l*o$", "hello"));
        assert!(!fuzzy_match("^h*z*o$", "hello"));
    }

    #[test]
    fn filter_returns_pairs() {
        let reg = sample();
        let odd: Vec<(&str, &u32)> = reg.filter(|_, v| v % 2 == 1);
        assert_eq!(odd, vec![("rock", &1), ("rock#1", &3), ("lamp", &5)]);
    }

    #[test]
    fn remove_and_reinsert_moves_to_end() {
        let mut reg = sample();
        assert_eq!(reg.remove("rock"), Some(1));
        assert!(!reg.contains("rock"));
        assert_eq!(reg.remove("rock"), None);
        reg.register("rock", 7).unwrap();
        assert_eq!(reg.keys().last(), Some("rock"));
    }

    #[test]
    fn drain_empties_in_order() {
        let mut reg = sample();
        let drained: Vec<String> = reg.drain().into_iter().map(|(k, _)| k).collect();
        assert_eq!(drained, vec!["rock", "rock#0", "rock#1", "bedrock", "lamp"]);
        assert!(reg.is_empty());
    }
}
