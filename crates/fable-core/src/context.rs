//! Ambient operation context.
//!
//! The [`ContextStack`] keeps one LIFO stack of JSON values per label
//! (`"agent"`, `"location"`, `"instrument"`). Code that performs an operation
//! pushes the values it knows about; code deeper in the call chain reads the
//! top of each stack instead of threading parameters through.
//!
//! Gatherers derive a whole frame from a single seed value: given the acting
//! entity's snapshot, a gatherer might push its location and its inventory.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::FableError;

/// A set of `label -> value` assignments pushed together.
pub type ContextFrame = BTreeMap<String, Value>;

/// Derives a context frame from a seed value.
#[derive(Clone)]
pub struct Gatherer {
    applies_to: Rc<dyn Fn(&Value) -> bool>,
    derive: Rc<dyn Fn(&Value) -> ContextFrame>,
}

impl Gatherer {
    pub fn new<A, D>(applies_to: A, derive: D) -> Self
    where
        A: Fn(&Value) -> bool + 'static,
        D: Fn(&Value) -> ContextFrame + 'static,
    {
        Self {
            applies_to: Rc::new(applies_to),
            derive: Rc::new(derive),
        }
    }

    pub fn applies_to(&self, seed: &Value) -> bool {
        (self.applies_to)(seed)
    }

    pub fn derive(&self, seed: &Value) -> ContextFrame {
        (self.derive)(seed)
    }
}

impl fmt::Debug for Gatherer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Gatherer(..)")
    }
}

/// Per-label LIFO stacks plus the registered gatherers.
#[derive(Debug, Default)]
pub struct ContextStack {
    stacks: HashMap<String, Vec<Value>>,
    /// Registration order is preserved; it decides who wins on label clashes.
    gatherers: Vec<(String, Gatherer)>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push every `label -> value` pair on top of its label's stack.
    pub fn push<I, K>(&mut self, frame: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (label, value) in frame {
            self.stacks.entry(label.into()).or_default().push(value);
        }
    }

    /// Pop the top value of each label.
    ///
    /// A label whose stack becomes empty is removed. Returns how many labels
    /// had nothing to pop.
    pub fn pop<I, S>(&mut self, labels: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut failures = 0;
        for label in labels {
            let label = label.as_ref();
            let Some(stack) = self.stacks.get_mut(label) else {
                tracing::warn!(label = %label, "pop: no context pushed under this label");
                failures += 1;
                continue;
            };
            stack.pop();
            if stack.is_empty() {
                self.stacks.remove(label);
            }
        }
        failures
    }

    /// Top value for `label`.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.stacks.get(label)?.last()
    }

    /// Top value for `label`, or [`FableError::MissingRequiredContext`].
    pub fn require(&self, label: &str) -> Result<&Value, FableError> {
        self.get(label).ok_or_else(|| FableError::MissingRequiredContext {
            label: label.to_owned(),
        })
    }

    /// Number of values stacked under `label`.
    pub fn depth(&self, label: &str) -> usize {
        self.stacks.get(label).map_or(0, Vec::len)
    }

    /// Labels with at least one value, sorted.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.stacks.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    /// Register a gatherer under `name`. Re-registering a name replaces the
    /// earlier gatherer in place.
    pub fn register_gatherer(&mut self, name: impl Into<String>, gatherer: Gatherer) {
        let name = name.into();
        if let Some(slot) = self.gatherers.iter_mut().find(|(n, _)| *n == name) {
            tracing::warn!(gatherer = %name, "gatherer registered twice -- replacing the earlier one");
            slot.1 = gatherer;
            return;
        }
        self.gatherers.push((name, gatherer));
    }

    /// Names of registered gatherers, in registration order.
    pub fn gatherer_names(&self) -> impl Iterator<Item = &str> {
        self.gatherers.iter().map(|(name, _)| name.as_str())
    }

    /// Run every applicable gatherer not named in `skip`, merge their frames
    /// and push the result.
    ///
    /// Returns the labels that were pushed, sorted; pass them to
    /// [`pop`](Self::pop) to undo.
    pub fn gather_from(&mut self, seed: &Value, skip: &[&str]) -> Vec<String> {
        let mut merged = ContextFrame::new();
        for (name, gatherer) in &self.gatherers {
            if skip.contains(&name.as_str()) || !gatherer.applies_to(seed) {
                continue;
            }
            merged.extend(gatherer.derive(seed));
        }
        let labels: Vec<String> = merged.keys().cloned().collect();
        self.push(merged);
        labels
    }

    /// Push `frame`, run `f`, then pop the same labels.
    pub fn with_frame<R>(&mut self, frame: ContextFrame, f: impl FnOnce(&mut Self) -> R) -> R {
        let labels: Vec<String> = frame.keys().cloned().collect();
        self.push(frame);
        let result = f(self);
        self.pop(&labels);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
