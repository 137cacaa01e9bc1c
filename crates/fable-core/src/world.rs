//! The [`World`] is the top-level container. It owns the entity registry, the
//! component registry, the template registry and the three buses.
//!
//! Every mutating operation goes through the world so that hooks run around
//! it. Callbacks receive `&mut World`; the world copies the callback list out
//! of the bus before invoking it, so a callback can attach or remove
//! listeners and hooks, create entities or emit further events.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{ComponentDescriptor, ComponentRef, ComponentRegistry, ComponentType};
use crate::context::ContextStack;
use crate::entity::{AttachedComponent, Entity, EntityId};
use crate::events::{Event, EventBus, PropertyChange};
use crate::hooks::{names, HookArgs, HookBus, HookCall, Receiver};
use crate::registry::{Registry, DEFAULT_INSTANCE_SEPARATOR};
use crate::template::TemplateRecord;
use crate::FableError;

/// Default prefix of the tag stamped on template instances.
pub const DEFAULT_PROVENANCE_PREFIX: &str = "template:";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// World-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Separator between a template's base id and an instance ordinal.
    pub instance_separator: String,
    /// Prefix of the provenance tag, followed by the template name.
    pub provenance_prefix: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            instance_separator: DEFAULT_INSTANCE_SEPARATOR.to_owned(),
            provenance_prefix: DEFAULT_PROVENANCE_PREFIX.to_owned(),
        }
    }
}

impl WorldConfig {
    /// The provenance tag for instances of `template`.
    pub fn provenance_tag(&self, template: &str) -> String {
        format!("{}{}", self.provenance_prefix, template)
    }
}

// ---------------------------------------------------------------------------
// EntityOptions
// ---------------------------------------------------------------------------

/// Tags and components for [`World::create_entity`].
#[derive(Debug, Default)]
pub struct EntityOptions {
    pub tags: Vec<String>,
    /// Attached in order, after the tags are set.
    pub components: Vec<ComponentRef>,
}

impl EntityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn component(mut self, component: impl Into<ComponentRef>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Attach a live instance, resolved by its Rust type.
    pub fn instance<T: Any>(mut self, value: T) -> Self {
        self.components.push(ComponentRef::instance(value));
        self
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Owner of all entities, component types, templates and buses.
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) entities: Registry<Entity>,
    pub(crate) components: ComponentRegistry,
    pub(crate) templates: Registry<TemplateRecord>,
    /// Base id -> next instance ordinal. Shared by every template stamping
    /// that base, and never lowered by destroying an instance.
    pub(crate) issued_ordinals: BTreeMap<String, u64>,
    pub(crate) events: EventBus,
    pub(crate) hooks: HookBus,
    pub(crate) context: ContextStack,
}

impl World {
    /// Create an empty world with default settings.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world with the given settings.
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: Registry::with_separator("entity", config.instance_separator.clone()),
            templates: Registry::with_separator("template", config.instance_separator.clone()),
            components: ComponentRegistry::new(),
            issued_ordinals: BTreeMap::new(),
            events: EventBus::new(),
            hooks: HookBus::new(),
            context: ContextStack::new(),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Subsystem access
    // -----------------------------------------------------------------------

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    /// Register a serializable [`ComponentType`].
    pub fn register_component<T>(&mut self) -> &ComponentDescriptor
    where
        T: ComponentType + Serialize + DeserializeOwned,
    {
        self.components.register_serializable::<T>()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn hooks(&self) -> &HookBus {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookBus {
        &mut self.hooks
    }

    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextStack {
        &mut self.context
    }

    // -----------------------------------------------------------------------
    // Entity lifecycle
    // -----------------------------------------------------------------------

    /// Create an entity, set its tags, then attach its components in order.
    ///
    /// # Errors
    ///
    /// - [`FableError::MalformedParameter`] if `id` is empty.
    /// - [`FableError::IdentityConflict`] if `id` is already live.
    /// - Any error from attaching a component; the half-built entity is
    ///   removed again.
    pub fn create_entity(
        &mut self,
        id: impl Into<EntityId>,
        options: EntityOptions,
    ) -> Result<EntityId, FableError> {
        let id = id.into();
        if id.is_empty() {
            return Err(FableError::MalformedParameter {
                parameter: "entity id",
                details: "must not be empty".to_owned(),
            });
        }
        self.ensure_identity_free(&id)?;

        self.run_hook(HookCall::new(
            names::BEFORE_CREATE,
            Receiver::World,
            HookArgs::CreateEntity {
                id: id.clone(),
                tags: options.tags.clone(),
            },
        ));
        // A before-hook may have claimed the id.
        self.ensure_identity_free(&id)?;

        let mut entity = Entity::new(id.clone());
        for tag in &options.tags {
            entity.insert_tag(tag);
        }
        self.entities
            .register(id.as_str(), entity)
            .map_err(|_| FableError::IdentityConflict { id: id.to_string() })?;

        for component in options.components {
            if let Err(err) = self.attach_component(&id, component) {
                self.discard_entity(&id);
                return Err(err);
            }
        }

        tracing::debug!(entity = %id, "entity created");
        self.run_hook(HookCall::new(
            names::AFTER_CREATE,
            Receiver::World,
            HookArgs::CreateEntity {
                id: id.clone(),
                tags: options.tags,
            },
        ));
        Ok(id)
    }

    /// Drop a half-built entity and any listeners hooks gave it.
    fn discard_entity(&mut self, id: &EntityId) {
        self.entities.remove(id);
        let listeners = self.events.remove_all_by(id);
        tracing::debug!(entity = %id, listeners, "half-built entity discarded");
    }

    fn ensure_identity_free(&self, id: &EntityId) -> Result<(), FableError> {
        if self.entities.contains(id) {
            return Err(FableError::IdentityConflict { id: id.to_string() });
        }
        Ok(())
    }

    /// Remove an entity and every listener it owns.
    ///
    /// Returns `false` (and logs) if no such entity exists.
    pub fn destroy_entity(&mut self, id: &str) -> bool {
        let Some(entity) = self.entities.get_by_id(id) else {
            return false;
        };
        let id = entity.id().clone();

        self.run_hook(HookCall::new(
            names::BEFORE_DESTROY,
            Receiver::Entity(id.clone()),
            HookArgs::DestroyEntity { id: id.clone() },
        ));
        if self.entities.remove(&id).is_none() {
            // Destroyed by a before-hook.
            return false;
        }
        let listeners = self.events.remove_all_by(&id);

        tracing::debug!(entity = %id, listeners, "entity destroyed");
        self.run_hook(HookCall::new(
            names::AFTER_DESTROY,
            Receiver::Entity(id.clone()),
            HookArgs::DestroyEntity { id },
        ));
        true
    }

    // -----------------------------------------------------------------------
    // Entity lookup
    // -----------------------------------------------------------------------

    /// Look up a live entity, logging a warning on a miss.
    pub fn resolve(&self, id: &str) -> Option<&Entity> {
        self.entities.get_by_id(id)
    }

    /// Look up a live entity without logging.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.entities.contains(id)
    }

    /// Live entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().map(|(_, entity)| entity)
    }

    /// Live entities whose id matches a fuzzy pattern (`*`, `^`, `$`).
    pub fn find_entities(&self, pattern: &str) -> Vec<&Entity> {
        self.entities.find_fuzzy(pattern)
    }

    /// Live entities whose id, minus its instance suffix, equals `base`.
    pub fn entities_by_base_id(&self, base: &str) -> Vec<&Entity> {
        self.entities.get_all_by_base_id(base)
    }

    /// Live entities for which `predicate` holds.
    pub fn filter_entities<F>(&self, mut predicate: F) -> Vec<&Entity>
    where
        F: FnMut(&Entity) -> bool,
    {
        self.entities
            .filter(|_, entity| predicate(entity))
            .into_iter()
            .map(|(_, entity)| entity)
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// The id with its instance suffix removed.
    pub fn base_id<'a>(&self, id: &'a str) -> &'a str {
        self.entities.base_id(id)
    }

    fn live_entity(&self, id: &str) -> Result<&Entity, FableError> {
        self.entities
            .get(id)
            .ok_or_else(|| FableError::UnknownEntity { id: id.to_owned() })
    }

    fn live_entity_mut(&mut self, id: &str) -> Result<&mut Entity, FableError> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| FableError::UnknownEntity { id: id.to_owned() })
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Attach a component, auto-attaching its dependencies first.
    ///
    /// Returns `Ok(false)` without running hooks if a component of the same
    /// type is already attached.
    ///
    /// # Errors
    ///
    /// - [`FableError::UnknownEntity`] if `id` is not live.
    /// - [`FableError::NotAComponent`] if the component (or a dependency) is
    ///   not registered.
    /// - [`FableError::ComponentTypeMismatch`] if a named instance has the
    ///   wrong Rust type.
    /// - [`FableError::MalformedParameter`] if the dependencies form a cycle.
    pub fn attach_component(
        &mut self,
        id: &str,
        component: impl Into<ComponentRef>,
    ) -> Result<bool, FableError> {
        let (name, instance) = self.resolve_ref(component.into())?;
        self.attach_resolved(id, &name, instance, &mut BTreeMap::new(), &mut Vec::new())
    }

    /// Attach a default `T`.
    pub fn attach<T: Any>(&mut self, id: &str) -> Result<bool, FableError> {
        let name = self.components.resolve_type::<T>()?.name().to_owned();
        self.attach_component(id, ComponentRef::Name(name))
    }

    fn resolve_ref(
        &self,
        component: ComponentRef,
    ) -> Result<(String, Option<Box<dyn Any>>), FableError> {
        match component {
            ComponentRef::Name(name) => {
                self.components.resolve(&name)?;
                Ok((name, None))
            }
            ComponentRef::Instance(value) => {
                let descriptor = self
                    .components
                    .lookup_type_id((*value).type_id())
                    .ok_or_else(|| FableError::NotAComponent {
                        name: "<unregistered Rust type>".to_owned(),
                        registered: self.components.registered_names().join(", "),
                    })?;
                Ok((descriptor.name().to_owned(), Some(value)))
            }
            ComponentRef::NamedInstance(name, value) => {
                let descriptor = self.components.resolve(&name)?;
                if (*value).type_id() != descriptor.type_id() {
                    return Err(FableError::ComponentTypeMismatch {
                        component: name,
                        expected: descriptor.rust_type(),
                    });
                }
                Ok((name, Some(value)))
            }
        }
    }

    /// Attach `name` to `id`, dependencies first.
    ///
    /// `pending` holds instances supplied for components that may be reached
    /// as dependencies; they are used instead of a default. `chain` is the
    /// dependency path being attached, for cycle detection.
    pub(crate) fn attach_resolved(
        &mut self,
        id: &str,
        name: &str,
        instance: Option<Box<dyn Any>>,
        pending: &mut BTreeMap<String, Box<dyn Any>>,
        chain: &mut Vec<String>,
    ) -> Result<bool, FableError> {
        let entity = self.live_entity(id)?;
        if entity.has(name) {
            return Ok(false);
        }
        if chain.is_empty() {
            // Nothing is attached and no hook runs unless the whole
            // dependency closure resolves.
            self.check_requires(entity, name, &mut Vec::new())?;
        }
        let owner = entity.id().clone();
        if chain.iter().any(|link| link == name) {
            return Err(dependency_cycle(chain, name));
        }
        let descriptor = self.components.resolve(name)?.clone();

        self.run_hook(HookCall::new(
            names::BEFORE_ATTACH,
            Receiver::Entity(owner.clone()),
            HookArgs::AttachComponent {
                entity: owner.clone(),
                component: name.to_owned(),
            },
        ));

        chain.push(name.to_owned());
        for dependency in descriptor.requires() {
            let supplied = pending.remove(dependency.as_str());
            self.attach_resolved(id, dependency, supplied, pending, chain)?;
        }
        chain.pop();

        let value = instance.unwrap_or_else(|| descriptor.build_default());
        let entity = self.live_entity_mut(id)?;
        if entity.has(name) {
            // Attached by a hook while dependencies were resolved.
            return Ok(false);
        }
        entity.insert_component(name.to_owned(), AttachedComponent::new(owner.clone(), value));
        if let Some(binding) = descriptor.binding() {
            entity.bind(binding, name);
        }

        self.run_hook(HookCall::new(
            names::AFTER_ATTACH,
            Receiver::Entity(owner.clone()),
            HookArgs::AttachComponent {
                entity: owner,
                component: name.to_owned(),
            },
        ));
        Ok(true)
    }

    /// Resolve every component `name` pulls in, without attaching anything.
    ///
    /// Components already on `entity` end the walk, as they do when
    /// attaching.
    fn check_requires(
        &self,
        entity: &Entity,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<(), FableError> {
        if entity.has(name) {
            return Ok(());
        }
        if chain.iter().any(|link| link == name) {
            return Err(dependency_cycle(chain, name));
        }
        let descriptor = self.components.resolve(name)?;
        chain.push(name.to_owned());
        for dependency in descriptor.requires() {
            self.check_requires(entity, dependency, chain)?;
        }
        chain.pop();
        Ok(())
    }

    /// Detach a component.
    ///
    /// Returns `Ok(false)` if it is not attached, or (with a warning) if
    /// another attached component requires it.
    pub fn detach_component(&mut self, id: &str, name: &str) -> Result<bool, FableError> {
        self.components.resolve(name)?;
        let entity = self.live_entity(id)?;
        if !entity.has(name) {
            return Ok(false);
        }
        let dependents: Vec<&str> = entity
            .component_names()
            .filter(|other| {
                self.components
                    .lookup(other)
                    .is_some_and(|d| d.requires().iter().any(|r| r == name))
            })
            .collect();
        if !dependents.is_empty() {
            tracing::warn!(
                entity = %id,
                component = %name,
                dependents = ?dependents,
                "cannot detach a component other attached components require"
            );
            return Ok(false);
        }
        let owner = entity.id().clone();

        self.run_hook(HookCall::new(
            names::BEFORE_DETACH,
            Receiver::Entity(owner.clone()),
            HookArgs::DetachComponent {
                entity: owner.clone(),
                component: name.to_owned(),
            },
        ));
        if self.live_entity_mut(id)?.remove_component(name).is_none() {
            return Ok(false);
        }
        self.run_hook(HookCall::new(
            names::AFTER_DETACH,
            Receiver::Entity(owner.clone()),
            HookArgs::DetachComponent {
                entity: owner,
                component: name.to_owned(),
            },
        ));
        Ok(true)
    }

    /// Whether `id` has a component of type `name`.
    ///
    /// # Errors
    ///
    /// [`FableError::NotAComponent`] if `name` is not registered,
    /// [`FableError::UnknownEntity`] if `id` is not live.
    pub fn has_component(&self, id: &str, name: &str) -> Result<bool, FableError> {
        self.components.resolve(name)?;
        Ok(self.live_entity(id)?.has(name))
    }

    /// The attached component of type `name`.
    pub fn component_by_name(
        &self,
        id: &str,
        name: &str,
    ) -> Result<Option<&AttachedComponent>, FableError> {
        self.components.resolve(name)?;
        Ok(self.live_entity(id)?.get(name))
    }

    /// The attached `T`.
    pub fn component<T: Any>(&self, id: &str) -> Result<Option<&T>, FableError> {
        let name = self.components.resolve_type::<T>()?.name();
        Ok(self.live_entity(id)?.get_as::<T>(name))
    }

    /// The attached `T`, mutably. Mutation through this reference runs no hooks.
    pub fn component_mut<T: Any>(&mut self, id: &str) -> Result<Option<&mut T>, FableError> {
        let name = self.components.resolve_type::<T>()?.name().to_owned();
        Ok(self
            .live_entity_mut(id)?
            .get_mut(&name)
            .and_then(AttachedComponent::downcast_mut::<T>))
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Add a tag. Returns whether the tag was newly added.
    pub fn tag(&mut self, id: &str, tag: &str) -> Result<bool, FableError> {
        let entity = self.live_entity(id)?;
        if entity.is_tagged(tag) {
            return Ok(false);
        }
        let owner = entity.id().clone();
        let args = HookArgs::Tag {
            entity: owner.clone(),
            tag: tag.to_owned(),
        };

        self.run_hook(HookCall::new(
            names::BEFORE_TAG,
            Receiver::Entity(owner.clone()),
            args.clone(),
        ));
        if !self.live_entity_mut(id)?.insert_tag(tag) {
            return Ok(false);
        }
        self.run_hook(HookCall::new(names::AFTER_TAG, Receiver::Entity(owner), args));
        Ok(true)
    }

    /// Remove a tag. Returns whether the tag was present.
    pub fn untag(&mut self, id: &str, tag: &str) -> Result<bool, FableError> {
        let entity = self.live_entity(id)?;
        if !entity.is_tagged(tag) {
            return Ok(false);
        }
        let owner = entity.id().clone();
        let args = HookArgs::Untag {
            entity: owner.clone(),
            tag: tag.to_owned(),
        };

        self.run_hook(HookCall::new(
            names::BEFORE_UNTAG,
            Receiver::Entity(owner.clone()),
            args.clone(),
        ));
        if !self.live_entity_mut(id)?.remove_tag(tag) {
            return Ok(false);
        }
        self.run_hook(HookCall::new(names::AFTER_UNTAG, Receiver::Entity(owner), args));
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Emit an event to every matching listener.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&mut self, name: &str, data: Value) -> usize {
        let event = Event {
            name: name.to_owned(),
            data,
        };
        let mut fired = 0;
        for listener in self.events.matching(name) {
            // One-shot listeners leave the bus before they run, so a
            // re-entrant emit cannot fire them again.
            if listener.once && !self.events.remove_listener(listener.id) {
                continue;
            }
            (listener.callback)(self, &event);
            fired += 1;
        }
        fired
    }

    /// Emit the derived events for a property change.
    ///
    /// Returns the total number of listener invocations.
    pub fn emit_property_events(&mut self, change: &PropertyChange) -> usize {
        let data = change.to_data();
        change
            .event_names()
            .iter()
            .map(|name| self.emit(name, data.clone()))
            .sum()
    }

    /// Run every callback registered under `call.hook`, in registration order.
    ///
    /// Returns the number of callbacks run.
    pub fn run_hook(&mut self, call: HookCall) -> usize {
        let callbacks = self.hooks.snapshot(&call.hook);
        for callback in &callbacks {
            callback(self, &call);
        }
        callbacks.len()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn dependency_cycle(chain: &[String], name: &str) -> FableError {
    FableError::MalformedParameter {
        parameter: "component requires",
        details: format!("dependency cycle: {} -> {name}", chain.join(" -> ")),
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("entities", &self.entities.len())
            .field("components", &self.components.registered_names())
            .field("templates", &self.templates.len())
            .field("events", &self.events)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
