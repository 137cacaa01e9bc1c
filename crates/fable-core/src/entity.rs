//! Entity identifiers and the entity aggregate.
//!
//! An [`EntityId`] is a human-meaningful string (`"brass_lamp"`,
//! `"rock_master#3"`). The world guarantees it is unique among live entities.
//!
//! An [`Entity`] owns its components. Each attached component is stored in an
//! [`AttachedComponent`] that records its owner as an [`EntityId`] handle rather
//! than a reference; resolve it through the world when needed.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A unique, string-valued entity identifier.
///
/// Derefs to `str`, so `&EntityId` can be passed wherever an id is looked up.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a string as an entity id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for EntityId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&EntityId> for EntityId {
    fn from(id: &EntityId) -> Self {
        id.clone()
    }
}

impl PartialEq<str> for EntityId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AttachedComponent
// ---------------------------------------------------------------------------

/// A component instance together with a handle to its owning entity.
pub struct AttachedComponent {
    owner: EntityId,
    value: Box<dyn Any>,
}

impl AttachedComponent {
    pub(crate) fn new(owner: EntityId, value: Box<dyn Any>) -> Self {
        Self { owner, value }
    }

    /// The entity this component is attached to.
    pub fn owner(&self) -> &EntityId {
        &self.owner
    }

    /// The instance as `&dyn Any`.
    pub fn as_any(&self) -> &dyn Any {
        self.value.as_ref()
    }

    /// Downcast to the concrete component type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutable downcast to the concrete component type.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }
}

impl fmt::Debug for AttachedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedComponent")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A uniquely identified aggregate of tags and components.
///
/// Entities are created and mutated through the [`World`](crate::world::World)
/// so that hooks run around every change; the methods here are read-only.
pub struct Entity {
    id: EntityId,
    tags: BTreeSet<String>,
    /// Component type name -> instance. At most one instance per type.
    components: BTreeMap<String, AttachedComponent>,
    /// Binding name -> claiming component type names in attach order. The
    /// last claimant is the one the binding resolves to.
    bindings: BTreeMap<String, Vec<String>>,
}

impl Entity {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            tags: BTreeSet::new(),
            components: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// This entity's id.
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    // -- tags ---------------------------------------------------------------

    /// Tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Whether `tag` is set.
    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub(crate) fn tag_set(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub(crate) fn insert_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag.to_owned())
    }

    pub(crate) fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    // -- components ---------------------------------------------------------

    /// Whether a component of type `name` is attached.
    pub fn has(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// The attached component of type `name`.
    pub fn get(&self, name: &str) -> Option<&AttachedComponent> {
        self.components.get(name)
    }

    /// The attached component of type `name`, downcast to `T`.
    pub fn get_as<T: Any>(&self, name: &str) -> Option<&T> {
        self.components.get(name)?.downcast_ref::<T>()
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut AttachedComponent> {
        self.components.get_mut(name)
    }

    /// Attached component type names, sorted.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// `(type name, component)` pairs, sorted by name.
    pub fn components(&self) -> impl Iterator<Item = (&str, &AttachedComponent)> {
        self.components.iter().map(|(name, c)| (name.as_str(), c))
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn insert_component(&mut self, name: String, component: AttachedComponent) {
        self.components.insert(name, component);
    }

    /// Remove a component and its binding claims. A binding it had won
    /// falls back to the previous claimant that is still attached.
    pub(crate) fn remove_component(&mut self, name: &str) -> Option<AttachedComponent> {
        let removed = self.components.remove(name)?;
        self.bindings.retain(|_, claimants| {
            claimants.retain(|claimant| claimant != name);
            !claimants.is_empty()
        });
        Some(removed)
    }

    // -- bindings -----------------------------------------------------------

    /// The component exposed under `binding`.
    pub fn bound(&self, binding: &str) -> Option<&AttachedComponent> {
        self.components.get(self.binding_target(binding)?)
    }

    /// The component exposed under `binding`, downcast to `T`.
    pub fn bound_as<T: Any>(&self, binding: &str) -> Option<&T> {
        self.bound(binding)?.downcast_ref::<T>()
    }

    /// The component type name a binding resolves to.
    pub fn binding_target(&self, binding: &str) -> Option<&str> {
        self.bindings.get(binding)?.last().map(String::as_str)
    }

    /// `(binding, component type name)` pairs, sorted by binding.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .filter_map(|(b, claimants)| Some((b.as_str(), claimants.last()?.as_str())))
    }

    /// Expose `component` under `binding`.
    ///
    /// A binding already claimed by a different component type is a soft
    /// conflict: it is logged and the newer component wins.
    pub(crate) fn bind(&mut self, binding: &str, component: &str) {
        let claimants = self.bindings.entry(binding.to_owned()).or_default();
        claimants.retain(|claimant| claimant != component);
        if let Some(previous) = claimants.last() {
            tracing::warn!(
                entity = %self.id,
                binding = %binding,
                previous = %previous,
                component = %component,
                "binding name already claimed by another component -- rebinding to the newer one"
            );
        }
        claimants.push(component.to_owned());
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
