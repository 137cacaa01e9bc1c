//! Hierarchical publish/subscribe with wildcard event names.
//!
//! Event names are dot-separated segments (`stats.health.changed`). Listener
//! patterns use the same grammar plus two wildcard segments:
//!
//! - `*` matches exactly one non-empty segment;
//! - `**` matches zero or more segments.
//!
//! Patterns are stored literally and matched at emit time. Dispatch order is:
//! listeners registered under the exact event name first, then listeners under
//! every matching wildcard pattern (patterns in sorted order). Within a
//! pattern, listeners run in registration order.
//!
//! The bus itself only stores listeners; dispatch goes through
//! [`World::emit`](crate::world::World::emit) so callbacks can receive
//! `&mut World`. Matching listeners are copied out before the first callback
//! runs, so callbacks may add or remove listeners freely.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityId;
use crate::world::World;

/// An event listener callback.
pub type EventCallback = Rc<dyn Fn(&mut World, &Event)>;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A named occurrence and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub data: Value,
}

/// Payload for derived property events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Event name prefix, e.g. `stats.health`.
    pub property: String,
    pub previous: Value,
    pub current: Value,
}

impl PropertyChange {
    pub fn new(property: impl Into<String>, previous: Value, current: Value) -> Self {
        Self {
            property: property.into(),
            previous,
            current,
        }
    }

    /// Names of the events derived from this change, in emission order.
    ///
    /// Always `<property>.set`, then `.changed` or `.changed.not`. Two numbers
    /// add `.increased` or `.decreased` when they differ; two booleans add
    /// `.toggled` or `.toggled.not`.
    pub fn event_names(&self) -> Vec<String> {
        let property = &self.property;
        let changed = self.previous != self.current;
        let mut names = vec![
            format!("{property}.set"),
            if changed {
                format!("{property}.changed")
            } else {
                format!("{property}.changed.not")
            },
        ];

        match (&self.previous, &self.current) {
            (Value::Number(previous), Value::Number(current)) => {
                if let (Some(previous), Some(current)) = (previous.as_f64(), current.as_f64()) {
                    if current > previous {
                        names.push(format!("{property}.increased"));
                    } else if current < previous {
                        names.push(format!("{property}.decreased"));
                    }
                }
            }
            (Value::Bool(_), Value::Bool(_)) => {
                if changed {
                    names.push(format!("{property}.toggled"));
                } else {
                    names.push(format!("{property}.toggled.not"));
                }
            }
            _ => {}
        }
        names
    }

    /// The change as an event payload.
    pub fn to_data(&self) -> Value {
        serde_json::json!({
            "property": self.property,
            "previous": self.previous,
            "current": self.current,
        })
    }
}

// ---------------------------------------------------------------------------
// Listener options
// ---------------------------------------------------------------------------

/// Options for [`EventBus::on`].
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    /// Entity the listener belongs to, for bulk removal on teardown.
    pub owner: Option<EntityId>,
    /// Remove the listener the first time it fires.
    pub once: bool,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, owner: impl Into<EntityId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// Extra conditions for [`EventBus::off`]. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ListenerFilter {
    pub owner: Option<EntityId>,
    pub once: Option<bool>,
}

impl ListenerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, owner: impl Into<EntityId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = Some(once);
        self
    }
}

#[derive(Clone)]
pub(crate) struct Listener {
    /// Bus-unique id, used to find one-shot listeners again after a snapshot.
    pub(crate) id: u64,
    pub(crate) callback: EventCallback,
    pub(crate) owner: Option<EntityId>,
    pub(crate) once: bool,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Listener storage keyed by literal pattern.
#[derive(Default)]
pub struct EventBus {
    listeners: BTreeMap<String, Vec<Listener>>,
    next_id: u64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `pattern`.
    pub fn on(&mut self, pattern: impl Into<String>, callback: EventCallback, options: ListenerOptions) {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.entry(pattern.into()).or_default().push(Listener {
            id,
            callback,
            owner: options.owner,
            once: options.once,
        });
    }

    /// Register a closure and return the shared handle used with [`off`](Self::off).
    pub fn on_fn<F>(&mut self, pattern: impl Into<String>, options: ListenerOptions, f: F) -> EventCallback
    where
        F: Fn(&mut World, &Event) + 'static,
    {
        let callback: EventCallback = Rc::new(f);
        self.on(pattern, callback.clone(), options);
        callback
    }

    /// Remove listeners registered under exactly `pattern` whose callback is
    /// `callback` and which pass `filter`. Wildcards are not expanded.
    ///
    /// Returns the number of listeners removed.
    pub fn off(&mut self, pattern: &str, callback: &EventCallback, filter: ListenerFilter) -> usize {
        let Some(listeners) = self.listeners.get_mut(pattern) else {
            tracing::warn!(pattern = %pattern, "off: no listeners registered under this pattern");
            return 0;
        };
        let before = listeners.len();
        listeners.retain(|listener| {
            let matches = Rc::ptr_eq(&listener.callback, callback)
                && filter
                    .owner
                    .as_ref()
                    .map_or(true, |owner| listener.owner.as_ref() == Some(owner))
                && filter.once.map_or(true, |once| listener.once == once);
            !matches
        });
        let removed = before - listeners.len();
        if listeners.is_empty() {
            self.listeners.remove(pattern);
        }
        removed
    }

    /// Remove every listener owned by `owner`, across all patterns.
    pub fn remove_all_by(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        self.listeners.retain(|_, listeners| {
            let before = listeners.len();
            listeners.retain(|listener| listener.owner.as_deref() != Some(owner));
            removed += before - listeners.len();
            !listeners.is_empty()
        });
        removed
    }

    /// Number of listeners registered under exactly `pattern`.
    pub fn listener_count(&self, pattern: &str) -> usize {
        self.listeners.get(pattern).map_or(0, Vec::len)
    }

    /// Total number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Registered patterns, sorted.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }

    /// Copy of every listener that should receive `name`, in dispatch order.
    pub(crate) fn matching(&self, name: &str) -> Vec<Listener> {
        let mut matched: Vec<Listener> = self.listeners.get(name).cloned().unwrap_or_default();
        for (pattern, listeners) in &self.listeners {
            if pattern != name && is_wildcard(pattern) && pattern_matches(pattern, name) {
                matched.extend(listeners.iter().cloned());
            }
        }
        matched
    }

    /// Remove one listener by id. Returns whether it was still registered.
    pub(crate) fn remove_listener(&mut self, id: u64) -> bool {
        let mut found = false;
        self.listeners.retain(|_, listeners| {
            if !found {
                if let Some(position) = listeners.iter().position(|l| l.id == id) {
                    listeners.remove(position);
                    found = true;
                }
            }
            !listeners.is_empty()
        });
        found
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(pattern, listeners)| (pattern.as_str(), listeners.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

// ---------------------------------------------------------------------------
// Pattern matching
// ---------------------------------------------------------------------------

/// Whether `pattern` contains a wildcard segment.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('.').any(|segment| segment == "*" || segment == "**")
}

/// Match an event name against a listener pattern.
///
/// ```
/// use fable_core::events::pattern_matches;
///
/// assert!(pattern_matches("stats.*.changed", "stats.health.changed"));
/// assert!(!pattern_matches("stats.*.changed", "stats.health.max.changed"));
/// assert!(pattern_matches("stats.**.changed", "stats.health.max.changed"));
/// ```
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let name: Vec<&str> = name.split('.').collect();
    match_segments(&pattern, &name)
}

fn match_segments(pattern: &[&str], name: &[&str]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((&"**", rest)) => (0..=name.len()).any(|skip| match_segments(rest, &name[skip..])),
        Some((&"*", rest)) => match name.split_first() {
            Some((segment, tail)) => !segment.is_empty() && match_segments(rest, tail),
            None => false,
        },
        Some((literal, rest)) => match name.split_first() {
            Some((segment, tail)) => segment == literal && match_segments(rest, tail),
            None => false,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn single_wildcard_matches_one_segment() {
        assert!(pattern_matches("stats.*.changed", "stats.health.changed"));
        assert!(!pattern_matches("stats.*.changed", "stats.health.max.changed"));
        assert!(!pattern_matches("stats.*.changed", "stats.changed"));
        assert!(!pattern_matches("stats.*", "stats."));
    }

    #[test]
    fn double_wildcard_matches_zero_or_more() {
        assert!(pattern_matches("stats.**.changed", "stats.health.changed"));
        assert!(pattern_matches("stats.**.changed", "stats.health.max.changed"));
        assert!(pattern_matches("stats.**.changed", "stats.changed"));
        assert!(pattern_matches("**", "anything.at.all"));
        assert!(!pattern_matches("stats.**.changed", "stats.health.set"));
    }

    #[test]
    fn literal_segments_must_match_exactly() {
        assert!(pattern_matches("door.opened", "door.opened"));
        assert!(!pattern_matches("door.opened", "door.opened.wide"));
        assert!(!pattern_matches("door", "door.opened"));
    }

    #[test]
    fn wildcard_detection() {
        assert!(is_wildcard("a.*"));
        assert!(is_wildcard("**"));
        assert!(!is_wildcard("a.b"));
        assert!(!is_wildcard("a*b"));
    }

    #[test]
    fn numeric_property_events() {
        let names = PropertyChange::new("stats.health", 10.into(), 7.into()).event_names();
        assert_eq!(
            names,
            vec!["stats.health.set", "stats.health.changed", "stats.health.decreased"]
        );
        let names = PropertyChange::new("gold", 1.into(), 2.5.into()).event_names();
        assert_eq!(names, vec!["gold.set", "gold.changed", "gold.increased"]);
        let names = PropertyChange::new("gold", 3.into(), 3.into()).event_names();
        assert_eq!(names, vec!["gold.set", "gold.changed.not"]);
    }

    #[test]
    fn boolean_property_events() {
        let names = PropertyChange::new("lit", false.into(), true.into()).event_names();
        assert_eq!(names, vec!["lit.set", "lit.changed", "lit.toggled"]);
        let names = PropertyChange::new("lit", true.into(), true.into()).event_names();
        assert_eq!(names, vec!["lit.set", "lit.changed.not", "lit.toggled.not"]);
    }

    #[test]
    fn mixed_types_only_set_and_changed() {
        let names = PropertyChange::new("name", Value::Null, "Lamp".into()).event_names();
        assert_eq!(names, vec!["name.set", "name.changed"]);
    }

    #[test]
    fn per_pattern_collection_is_created_once_and_reused() {
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.on_fn("tick", ListenerOptions::new(), move |_w, _e| order.borrow_mut().push(i));
        }
        assert_eq!(bus.listener_count("tick"), 3);
        assert_eq!(bus.patterns().collect::<Vec<_>>(), vec!["tick"]);

        let ids: Vec<u64> = bus.matching("tick").iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn off_is_literal_and_identity_based() {
        let mut bus = EventBus::new();
        let a = bus.on_fn("stats.*", ListenerOptions::new(), |_w, _e| {});
        let b = bus.on_fn("stats.*", ListenerOptions::new(), |_w, _e| {});

        // No wildcard expansion on removal.
        assert_eq!(bus.off("stats.health", &a, ListenerFilter::new()), 0);
        assert_eq!(bus.listener_count("stats.*"), 2);

        assert_eq!(bus.off("stats.*", &a, ListenerFilter::new()), 1);
        assert_eq!(bus.listener_count("stats.*"), 1);
        assert_eq!(bus.off("stats.*", &a, ListenerFilter::new()), 0);
        assert_eq!(bus.off("stats.*", &b, ListenerFilter::new()), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn off_respects_owner_and_once_filters() {
        let mut bus = EventBus::new();
        let cb: EventCallback = Rc::new(|_w, _e| {});
        bus.on("x", cb.clone(), ListenerOptions::new().owned_by("lamp"));
        bus.on("x", cb.clone(), ListenerOptions::new().owned_by("rock").once());
        bus.on("x", cb.clone(), ListenerOptions::new());

        assert_eq!(bus.off("x", &cb, ListenerFilter::new().owned_by("rock").once(false)), 0);
        assert_eq!(bus.off("x", &cb, ListenerFilter::new().owned_by("rock")), 1);
        assert_eq!(bus.off("x", &cb, ListenerFilter::new().once(false)), 2);
        assert_eq!(bus.len(), 0);
    }

    #[test]
    fn remove_all_by_owner() {
        let mut bus = EventBus::new();
        let cb: EventCallback = Rc::new(|_w, _e| {});
        bus.on("a", cb.clone(), ListenerOptions::new().owned_by("lamp"));
        bus.on("b.**", cb.clone(), ListenerOptions::new().owned_by("lamp"));
        bus.on("b.**", cb.clone(), ListenerOptions::new().owned_by("rock"));
        bus.on("c", cb.clone(), ListenerOptions::new());

        assert_eq!(bus.remove_all_by("lamp"), 2);
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b.**"), 1);
        assert_eq!(bus.listener_count("c"), 1);
        assert_eq!(bus.remove_all_by("lamp"), 0);
    }

    #[test]
    fn matching_lists_exact_then_wildcards() {
        let mut bus = EventBus::new();
        let cb: EventCallback = Rc::new(|_w, _e| {});
        bus.on("stats.**", cb.clone(), ListenerOptions::new());
        bus.on("stats.health.changed", cb.clone(), ListenerOptions::new());
        bus.on("stats.*.changed", cb.clone(), ListenerOptions::new());
        bus.on("other", cb.clone(), ListenerOptions::new());

        let ids: Vec<u64> = bus.matching("stats.health.changed").iter().map(|l| l.id).collect();
        // exact (1), then "stats.**" (0) and "stats.*.changed" (2) in sorted pattern order
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn remove_listener_by_id() {
        let mut bus = EventBus::new();
        let cb: EventCallback = Rc::new(|_w, _e| {});
        bus.on("a", cb.clone(), ListenerOptions::new().once());
        assert!(bus.remove_listener(0));
        assert!(!bus.remove_listener(0));
        assert!(bus.is_empty());
    }
}
