//! Fable Core -- entity composition and reactivity substrate for text-game worlds.
//!
//! This crate provides the runtime core every other Fable subsystem builds on:
//! string-identified entities assembled from dynamically registered components,
//! JSON serialization with snapshot-and-instantiate templates, and three
//! cross-cutting buses (events, hooks, context).
//!
//! Everything lives in a single [`World`](world::World). Listener and hook
//! callbacks receive `&mut World`, so they may freely re-enter the world
//! (emit further events, instantiate templates, attach components).
//!
//! # Quick Start
//!
//! ```
//! use fable_core::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Weight { grams: u32 }
//!
//! impl ComponentType for Weight {
//!     const NAME: &'static str = "weight";
//!     const BINDING: Option<&'static str> = Some("weight");
//! }
//!
//! #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Portable { carried: bool }
//!
//! impl ComponentType for Portable {
//!     const NAME: &'static str = "portable";
//!     const REQUIRES: &'static [&'static str] = &["weight"];
//! }
//!
//! let mut world = World::new();
//! world.register_component::<Weight>();
//! world.register_component::<Portable>();
//!
//! let rock = world
//!     .create_entity("rock_master", EntityOptions::new().tag("mineral").component("portable"))
//!     .unwrap();
//!
//! // `portable` requires `weight`, which was attached first.
//! assert!(world.has_component(&rock, "weight").unwrap());
//!
//! world.register_template("rock", &rock).unwrap();
//! let a = world.instantiate("rock").unwrap().unwrap();
//! let b = world.instantiate("rock").unwrap().unwrap();
//! assert_ne!(a, b);
//! assert!(world.resolve(&a).unwrap().is_tagged("template:rock"));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod context;
pub mod entity;
pub mod events;
pub mod hooks;
pub mod registry;
pub mod snapshot;
pub mod template;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by core operations.
///
/// These are the fatal tier: caller errors that abort the call. Recoverable
/// misses (unknown ids, unknown templates, no-op removals) are logged through
/// `tracing` and surface as `None`/`false` instead.
///
/// Every variant carries a greppable code (see [`FableError::code`]) and a
/// hint about the likely cause, both of which appear in its `Display` output.
#[derive(Debug, thiserror::Error)]
pub enum FableError {
    /// An entity with this id is already registered.
    #[error(
        "[E_IDENTITY_CONFLICT] entity id '{id}' is already registered \
         (hint: ids are unique across the world; check for a typo or a repeated create call)"
    )]
    IdentityConflict { id: String },

    /// A key is already taken in a registry that rejects duplicates.
    #[error(
        "[E_CONFLICT] {registry} key '{key}' is already registered \
         (hint: registration happens exactly once per key; pick another name)"
    )]
    Conflict { registry: &'static str, key: String },

    /// A component type name was referenced that has not been registered.
    #[error(
        "[E_NOT_A_COMPONENT] '{name}' is not a registered component type. \
         Registered components: [{registered}] \
         (hint: register the component before use, or check the spelling)"
    )]
    NotAComponent { name: String, registered: String },

    /// A serialized entity references a component type the world does not know.
    #[error(
        "[E_DESERIALIZER_MISSING_COMPONENT] cannot rebuild entity '{entity}': component \
         '{component}' is not registered. Registered components: [{registered}] \
         (hint: the extension providing this component was probably not loaded)"
    )]
    DeserializerMissingComponent {
        entity: String,
        component: String,
        registered: String,
    },

    /// A component serializer or deserializer failed.
    #[error(
        "[E_COMPONENT_CODEC] component '{component}' failed to (de)serialize: {details} \
         (hint: the stored data does not match the component's shape)"
    )]
    ComponentCodec { component: String, details: String },

    /// A live instance was supplied under a name registered for another Rust type.
    #[error(
        "[E_COMPONENT_TYPE_MISMATCH] instance supplied for component '{component}' is not a \
         {expected} (hint: pass the instance under the name it was registered with)"
    )]
    ComponentTypeMismatch {
        component: String,
        expected: &'static str,
    },

    /// An operation targeted an entity that does not exist.
    #[error(
        "[E_UNKNOWN_ENTITY] entity '{id}' does not exist \
         (hint: it may have been destroyed, or never created in this world)"
    )]
    UnknownEntity { id: String },

    /// A context label marked as required has an empty stack.
    #[error(
        "[E_MISSING_REQUIRED_CONTEXT] no value on the context stack for '{label}' \
         (hint: push the label before running the operation that needs it)"
    )]
    MissingRequiredContext { label: String },

    /// A required parameter was malformed.
    #[error(
        "[E_MALFORMED_PARAMETER] invalid {parameter}: {details} \
         (hint: check the arguments passed to the call)"
    )]
    MalformedParameter {
        parameter: &'static str,
        details: String,
    },
}

impl FableError {
    /// Stable, greppable error code.
    pub fn code(&self) -> &'static str {
        match self {
            FableError::IdentityConflict { .. } => "E_IDENTITY_CONFLICT",
            FableError::Conflict { .. } => "E_CONFLICT",
            FableError::NotAComponent { .. } => "E_NOT_A_COMPONENT",
            FableError::DeserializerMissingComponent { .. } => "E_DESERIALIZER_MISSING_COMPONENT",
            FableError::ComponentCodec { .. } => "E_COMPONENT_CODEC",
            FableError::ComponentTypeMismatch { .. } => "E_COMPONENT_TYPE_MISMATCH",
            FableError::UnknownEntity { .. } => "E_UNKNOWN_ENTITY",
            FableError::MissingRequiredContext { .. } => "E_MISSING_REQUIRED_CONTEXT",
            FableError::MalformedParameter { .. } => "E_MALFORMED_PARAMETER",
        }
    }

    /// Human-readable hint about the likely cause.
    pub fn hint(&self) -> &'static str {
        match self {
            FableError::IdentityConflict { .. } => {
                "ids are unique across the world; check for a typo or a repeated create call"
            }
            FableError::Conflict { .. } => {
                "registration happens exactly once per key; pick another name"
            }
            FableError::NotAComponent { .. } => {
                "register the component before use, or check the spelling"
            }
            FableError::DeserializerMissingComponent { .. } => {
                "the extension providing this component was probably not loaded"
            }
            FableError::ComponentCodec { .. } => {
                "the stored data does not match the component's shape"
            }
            FableError::ComponentTypeMismatch { .. } => {
                "pass the instance under the name it was registered with"
            }
            FableError::UnknownEntity { .. } => {
                "it may have been destroyed, or never created in this world"
            }
            FableError::MissingRequiredContext { .. } => {
                "push the label before running the operation that needs it"
            }
            FableError::MalformedParameter { .. } => "check the arguments passed to the call",
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{ComponentDescriptor, ComponentRef, ComponentRegistry, ComponentType};
    pub use crate::context::{ContextFrame, ContextStack, Gatherer};
    pub use crate::entity::{AttachedComponent, Entity, EntityId};
    pub use crate::events::{
        pattern_matches, Event, EventBus, EventCallback, ListenerFilter, ListenerOptions,
        PropertyChange,
    };
    pub use crate::hooks::{HookArgs, HookBus, HookCall, HookCallback, Receiver};
    pub use crate::registry::Registry;
    pub use crate::snapshot::EntitySnapshot;
    pub use crate::template::TemplateRecord;
    pub use crate::world::{EntityOptions, World, WorldConfig};
    pub use crate::FableError;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_hint() {
        let err = FableError::IdentityConflict {
            id: "rock".to_owned(),
        };
        let text = err.to_string();
        assert!(text.contains(err.code()));
        assert!(text.contains(err.hint()));
        assert!(text.contains("'rock'"));
    }

    #[test]
    fn every_code_is_prefixed() {
        let errors = [
            FableError::Conflict {
                registry: "template",
                key: "rock".to_owned(),
            },
            FableError::NotAComponent {
                name: "x".to_owned(),
                registered: String::new(),
            },
            FableError::MissingRequiredContext {
                label: "agent".to_owned(),
            },
            FableError::MalformedParameter {
                parameter: "entity id",
                details: "empty".to_owned(),
            },
        ];
        for err in &errors {
            assert!(err.code().starts_with("E_"));
            assert!(err.to_string().contains(err.hint()));
        }
    }
}
