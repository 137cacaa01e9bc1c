//! Component type registration and metadata.
//!
//! Components are resolved by name at runtime, so every component type must be
//! registered in a [`ComponentRegistry`] before an entity can use it. The
//! registry maps each name to a [`ComponentDescriptor`]: the Rust type behind
//! it, an optional binding name, the list of components it requires, a factory
//! for default instances, and (optionally) a JSON codec.
//!
//! Static component types implement [`ComponentType`]. Components that are
//! plain JSON data supplied by an extension use
//! [`ComponentDescriptor::dynamic`] and are stored as [`serde_json::Value`].

use std::any::{Any, TypeId};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::FableError;

/// Builds a default instance for auto-attachment.
pub type FactoryFn = Rc<dyn Fn() -> Box<dyn Any>>;

/// Converts a live instance to JSON.
pub type SerializeFn = Rc<dyn Fn(&dyn Any) -> Result<Value, String>>;

/// Rebuilds a live instance from JSON.
pub type DeserializeFn = Rc<dyn Fn(&Value) -> Result<Box<dyn Any>, String>>;

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// A statically typed component.
///
/// `Default` is required because dependencies are auto-attached: when a
/// component requires `T` and the entity lacks it, a default `T` is built.
pub trait ComponentType: Any + Default {
    /// Registered type name. Serialized entities key their data by it.
    const NAME: &'static str;
    /// Name under which the attached instance is exposed on its entity.
    const BINDING: Option<&'static str> = None;
    /// Component type names that must be attached first.
    const REQUIRES: &'static [&'static str] = &[];
}

// ---------------------------------------------------------------------------
// ComponentDescriptor
// ---------------------------------------------------------------------------

/// Everything the world needs to know about one component type.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: String,
    binding: Option<String>,
    requires: Vec<String>,
    type_id: TypeId,
    rust_type: &'static str,
    /// Dynamic descriptors share `serde_json::Value` as their Rust type and
    /// are never indexed by `TypeId`.
    dynamic: bool,
    factory: FactoryFn,
    /// Serializer and deserializer are set together or not at all.
    codec: Option<(SerializeFn, DeserializeFn)>,
}

impl ComponentDescriptor {
    /// Descriptor for Rust type `T` under `name`, without a codec.
    pub fn new<T: Any + Default>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
            requires: Vec::new(),
            type_id: TypeId::of::<T>(),
            rust_type: std::any::type_name::<T>(),
            dynamic: false,
            factory: Rc::new(|| Box::new(T::default()) as Box<dyn Any>),
            codec: None,
        }
    }

    /// Descriptor built from a [`ComponentType`]'s constants, without a codec.
    pub fn of<T: ComponentType>() -> Self {
        let mut descriptor = Self::new::<T>(T::NAME).with_requires(T::REQUIRES.iter().copied());
        if let Some(binding) = T::BINDING {
            descriptor = descriptor.with_binding(binding);
        }
        descriptor
    }

    /// Descriptor built from a [`ComponentType`] with a serde-backed codec.
    pub fn serializable<T>() -> Self
    where
        T: ComponentType + Serialize + DeserializeOwned,
    {
        Self::of::<T>().with_codec::<T, _, _>(
            |value| serde_json::to_value(value).map_err(|e| e.to_string()),
            |json| serde_json::from_value(json.clone()).map_err(|e| e.to_string()),
        )
    }

    /// Descriptor for a JSON-valued component supplied by an extension.
    ///
    /// Instances are stored as [`serde_json::Value`] (default `null`) and
    /// serialize as themselves.
    pub fn dynamic(name: impl Into<String>) -> Self {
        let mut descriptor = Self::new::<Value>(name).with_codec::<Value, _, _>(
            |value| Ok(value.clone()),
            |json| Ok(json.clone()),
        );
        descriptor.dynamic = true;
        descriptor
    }

    /// Set the binding name.
    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    /// Append required component names, preserving order.
    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(requires.into_iter().map(Into::into));
        self
    }

    /// Install a serializer/deserializer pair for instances of `T`.
    ///
    /// `T` must be the Rust type this descriptor was created for; a mismatched
    /// pair is rejected with an error log and the descriptor keeps its
    /// previous codec.
    pub fn with_codec<T, S, D>(mut self, serialize: S, deserialize: D) -> Self
    where
        T: Any,
        S: Fn(&T) -> Result<Value, String> + 'static,
        D: Fn(&Value) -> Result<T, String> + 'static,
    {
        if TypeId::of::<T>() != self.type_id {
            tracing::error!(
                component = %self.name,
                expected = self.rust_type,
                supplied = std::any::type_name::<T>(),
                "codec type does not match component type -- codec ignored"
            );
            return self;
        }
        let rust_type = self.rust_type;
        let serialize_fn: SerializeFn = Rc::new(move |any: &dyn Any| match any.downcast_ref::<T>() {
            Some(value) => serialize(value),
            None => Err(format!("instance is not a {rust_type}")),
        });
        let deserialize_fn: DeserializeFn =
            Rc::new(move |json: &Value| deserialize(json).map(|v| Box::new(v) as Box<dyn Any>));
        self.codec = Some((serialize_fn, deserialize_fn));
        self
    }

    /// Registered type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binding name, if the component exposes one.
    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    /// Required component names, in declaration order.
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// The Rust type backing instances of this component.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name, for diagnostics.
    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }

    /// Whether instances are JSON values supplied by an extension.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether both a serializer and a deserializer are installed.
    pub fn is_serializable(&self) -> bool {
        self.codec.is_some()
    }

    /// Build a default instance.
    pub fn build_default(&self) -> Box<dyn Any> {
        (self.factory)()
    }

    /// Serialize a live instance. `None` when no codec is installed.
    pub fn serialize(&self, instance: &dyn Any) -> Option<Result<Value, String>> {
        self.codec.as_ref().map(|(serialize, _)| serialize(instance))
    }

    /// Rebuild an instance from JSON. `None` when no codec is installed.
    pub fn deserialize(&self, json: &Value) -> Option<Result<Box<dyn Any>, String>> {
        self.codec.as_ref().map(|(_, deserialize)| deserialize(json))
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .field("requires", &self.requires)
            .field("rust_type", &self.rust_type)
            .field("dynamic", &self.dynamic)
            .field("serializable", &self.codec.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentRef
// ---------------------------------------------------------------------------

/// The ways a caller can name a component to attach.
pub enum ComponentRef {
    /// A registered type name; a default instance is built by its factory.
    Name(String),
    /// A live instance, resolved to its registered name through its Rust type.
    Instance(Box<dyn Any>),
    /// A live instance under an explicit registered name. Required for
    /// dynamic components, which all share the same Rust type.
    NamedInstance(String, Box<dyn Any>),
}

impl ComponentRef {
    /// Reference a component by registered name.
    pub fn name(name: impl Into<String>) -> Self {
        ComponentRef::Name(name.into())
    }

    /// Wrap a live instance.
    pub fn instance<T: Any>(value: T) -> Self {
        ComponentRef::Instance(Box::new(value))
    }

    /// Wrap a live instance under an explicit name.
    pub fn named_instance<T: Any>(name: impl Into<String>, value: T) -> Self {
        ComponentRef::NamedInstance(name.into(), Box::new(value))
    }
}

impl From<&str> for ComponentRef {
    fn from(name: &str) -> Self {
        ComponentRef::Name(name.to_owned())
    }
}

impl From<String> for ComponentRef {
    fn from(name: String) -> Self {
        ComponentRef::Name(name)
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRef::Name(name) => f.debug_tuple("Name").field(name).finish(),
            ComponentRef::Instance(_) => f.write_str("Instance(..)"),
            ComponentRef::NamedInstance(name, _) => {
                f.debug_tuple("NamedInstance").field(name).finish()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping component names (and Rust types) to descriptors.
///
/// Registering a name twice is a soft conflict: a warning is logged and the
/// newer descriptor replaces the older one.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// Name -> descriptor. Sorted, so listings are deterministic.
    by_name: BTreeMap<String, ComponentDescriptor>,
    /// TypeId -> name, for resolving live instances and typed access.
    by_type: HashMap<TypeId, String>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`ComponentType`] without a codec.
    pub fn register<T: ComponentType>(&mut self) -> &ComponentDescriptor {
        self.register_descriptor(ComponentDescriptor::of::<T>())
    }

    /// Register a [`ComponentType`] with a serde-backed codec.
    pub fn register_serializable<T>(&mut self) -> &ComponentDescriptor
    where
        T: ComponentType + Serialize + DeserializeOwned,
    {
        self.register_descriptor(ComponentDescriptor::serializable::<T>())
    }

    /// Register a JSON-valued component under `name`.
    pub fn register_dynamic(&mut self, name: impl Into<String>) -> &ComponentDescriptor {
        self.register_descriptor(ComponentDescriptor::dynamic(name))
    }

    /// Register a fully specified descriptor.
    pub fn register_descriptor(&mut self, descriptor: ComponentDescriptor) -> &ComponentDescriptor {
        let name = descriptor.name().to_owned();

        if let Some(previous) = self.by_name.get(&name) {
            tracing::warn!(
                component = %name,
                previous_type = previous.rust_type(),
                new_type = descriptor.rust_type(),
                "component name registered twice -- replacing the earlier descriptor"
            );
            if !previous.is_dynamic() {
                let previous_type = previous.type_id();
                if self.by_type.get(&previous_type) == Some(&name) {
                    self.by_type.remove(&previous_type);
                }
            }
        }

        if !descriptor.is_dynamic() {
            if let Some(other) = self.by_type.get(&descriptor.type_id()) {
                if *other != name {
                    tracing::warn!(
                        component = %name,
                        previous_name = %other,
                        rust_type = descriptor.rust_type(),
                        "Rust type already registered under another name -- typed lookups now use the new name"
                    );
                }
            }
            self.by_type.insert(descriptor.type_id(), name.clone());
        }

        match self.by_name.entry(name) {
            Entry::Occupied(mut slot) => {
                slot.insert(descriptor);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(descriptor),
        }
    }

    /// Look up a descriptor by registered name.
    pub fn lookup(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.by_name.get(name)
    }

    /// Look up the descriptor registered for Rust type `T`.
    pub fn lookup_type<T: Any>(&self) -> Option<&ComponentDescriptor> {
        self.lookup_type_id(TypeId::of::<T>())
    }

    /// Look up the descriptor registered for a Rust `TypeId`.
    pub fn lookup_type_id(&self, type_id: TypeId) -> Option<&ComponentDescriptor> {
        self.by_type.get(&type_id).and_then(|name| self.by_name.get(name))
    }

    /// Resolve a name, failing with [`FableError::NotAComponent`].
    pub fn resolve(&self, name: &str) -> Result<&ComponentDescriptor, FableError> {
        self.lookup(name).ok_or_else(|| FableError::NotAComponent {
            name: name.to_owned(),
            registered: self.registered_names().join(", "),
        })
    }

    /// Resolve Rust type `T`, failing with [`FableError::NotAComponent`].
    pub fn resolve_type<T: Any>(&self) -> Result<&ComponentDescriptor, FableError> {
        self.lookup_type::<T>().ok_or_else(|| FableError::NotAComponent {
            name: std::any::type_name::<T>().to_owned(),
            registered: self.registered_names().join(", "),
        })
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
