//! Before/after interception around core operations.
//!
//! Every mutating world operation runs a `before:<op>` hook before it commits
//! and an `after:<op>` hook once it has, skipping both when the call turns out
//! to be a no-op (attaching a component that is already present, re-adding a
//! tag). Callbacks receive `&mut World` and a structured [`HookCall`]; they
//! may mutate the world, including attaching further hooks.
//!
//! Hook names follow `before:<Type>.<method>` / `after:<Type>.instance.<method>`;
//! the ones the core runs are listed in [`names`]. Collaborators can run their
//! own hooks through [`World::run_hook`](crate::world::World::run_hook).
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use fable_core::prelude::*;
//! use fable_core::hooks::names;
//!
//! let mut world = World::new();
//! let created = Rc::new(Cell::new(0));
//! let seen = created.clone();
//! world.hooks_mut().attach_fn(names::AFTER_CREATE, move |_world, call| {
//!     if let HookArgs::CreateEntity { .. } = call.args {
//!         seen.set(seen.get() + 1);
//!     }
//! });
//!
//! world.create_entity("lamp", EntityOptions::new()).unwrap();
//! assert_eq!(created.get(), 1);
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::entity::EntityId;
use crate::world::World;

/// A hook callback.
pub type HookCallback = Rc<dyn Fn(&mut World, &HookCall)>;

/// Names of the hooks run by the core.
pub mod names {
    pub const BEFORE_CREATE: &str = "before:Entity.create";
    pub const AFTER_CREATE: &str = "after:Entity.create";
    pub const BEFORE_DESTROY: &str = "before:Entity.instance.destroy";
    pub const AFTER_DESTROY: &str = "after:Entity.instance.destroy";
    pub const BEFORE_ATTACH: &str = "before:Entity.instance.attachComponent";
    pub const AFTER_ATTACH: &str = "after:Entity.instance.attachComponent";
    pub const BEFORE_DETACH: &str = "before:Entity.instance.detachComponent";
    pub const AFTER_DETACH: &str = "after:Entity.instance.detachComponent";
    pub const BEFORE_TAG: &str = "before:Entity.instance.tag";
    pub const AFTER_TAG: &str = "after:Entity.instance.tag";
    pub const BEFORE_UNTAG: &str = "before:Entity.instance.untag";
    pub const AFTER_UNTAG: &str = "after:Entity.instance.untag";
    pub const BEFORE_DESERIALIZE: &str = "before:Entity.deserialize";
    pub const AFTER_DESERIALIZE: &str = "after:Entity.deserialize";
    pub const BEFORE_REGISTER_TEMPLATE: &str = "before:Templates.register";
    pub const AFTER_REGISTER_TEMPLATE: &str = "after:Templates.register";
    pub const BEFORE_INSTANTIATE: &str = "before:Templates.instantiate";
    pub const AFTER_INSTANTIATE: &str = "after:Templates.instantiate";

    /// `before:<operation>`
    pub fn before(operation: &str) -> String {
        format!("before:{operation}")
    }

    /// `after:<operation>`
    pub fn after(operation: &str) -> String {
        format!("after:{operation}")
    }
}

// ---------------------------------------------------------------------------
// HookCall
// ---------------------------------------------------------------------------

/// The object an intercepted operation was called on.
#[derive(Debug, Clone, PartialEq)]
pub enum Receiver {
    /// A world-level operation (entity creation, deserialization).
    World,
    /// An operation on one entity.
    Entity(EntityId),
    /// A template-registry operation.
    Templates,
    /// A collaborator-defined receiver.
    Named(String),
}

/// Parameters of the intercepted operation.
#[derive(Debug, Clone, PartialEq)]
pub enum HookArgs {
    CreateEntity { id: EntityId, tags: Vec<String> },
    DestroyEntity { id: EntityId },
    AttachComponent { entity: EntityId, component: String },
    DetachComponent { entity: EntityId, component: String },
    Tag { entity: EntityId, tag: String },
    Untag { entity: EntityId, tag: String },
    DeserializeEntity { id: EntityId },
    RegisterTemplate { name: String, source: EntityId },
    /// `id` is the identity the new instance will receive.
    Instantiate {
        template: String,
        ordinal: u64,
        id: EntityId,
    },
    /// Parameters of a collaborator-defined operation.
    Custom(Value),
}

/// One invocation of a hook.
#[derive(Debug, Clone, PartialEq)]
pub struct HookCall {
    pub hook: String,
    pub receiver: Receiver,
    pub args: HookArgs,
}

impl HookCall {
    pub fn new(hook: impl Into<String>, receiver: Receiver, args: HookArgs) -> Self {
        Self {
            hook: hook.into(),
            receiver,
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// HookBus
// ---------------------------------------------------------------------------

/// Callbacks keyed by exact hook name.
#[derive(Default)]
pub struct HookBus {
    hooks: HashMap<String, Vec<HookCallback>>,
}

impl HookBus {
    /// Create an empty hook bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `hook`. Callbacks run in registration order.
    pub fn attach(&mut self, hook: impl Into<String>, callback: HookCallback) {
        self.hooks.entry(hook.into()).or_default().push(callback);
    }

    /// Register a closure and return the shared handle used to detach it.
    pub fn attach_fn<F>(&mut self, hook: impl Into<String>, f: F) -> HookCallback
    where
        F: Fn(&mut World, &HookCall) + 'static,
    {
        let callback: HookCallback = Rc::new(f);
        self.attach(hook, callback.clone());
        callback
    }

    /// Remove the first registration of `callback` under `hook`.
    pub fn detach(&mut self, hook: &str, callback: &HookCallback) -> bool {
        let Some(callbacks) = self.hooks.get_mut(hook) else {
            tracing::warn!(hook = %hook, "detach: no callbacks registered under this hook");
            return false;
        };
        let Some(position) = callbacks.iter().position(|c| Rc::ptr_eq(c, callback)) else {
            return false;
        };
        callbacks.remove(position);
        if callbacks.is_empty() {
            self.hooks.remove(hook);
        }
        true
    }

    /// Number of callbacks registered under `hook`.
    pub fn hook_count(&self, hook: &str) -> usize {
        self.hooks.get(hook).map_or(0, Vec::len)
    }

    /// Whether anything is registered under `hook`.
    pub fn is_hooked(&self, hook: &str) -> bool {
        self.hook_count(hook) > 0
    }

    /// Copy of the callbacks registered under `hook`, taken before a run so
    /// callbacks can attach or detach hooks without disturbing it.
    pub(crate) fn snapshot(&self, hook: &str) -> Vec<HookCallback> {
        self.hooks.get(hook).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hooks: Vec<&String> = self.hooks.keys().collect();
        hooks.sort();
        f.debug_struct("HookBus").field("hooks", &hooks).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
