//! Entity serialization.
//!
//! An [`EntitySnapshot`] is the JSON-friendly form of one entity: its id, its
//! tags and the serialized data of every component that has a codec. Tags and
//! components are kept in sorted collections, so equal entities always produce
//! byte-identical JSON.
//!
//! ```json
//! { "id": "rock_master", "tags": ["mineral"], "components": { "weight": { "grams": 40 } } }
//! ```

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityId;
use crate::hooks::{names, HookArgs, HookCall, Receiver};
use crate::world::{EntityOptions, World};
use crate::FableError;

/// Serialized form of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Component type name -> serialized instance.
    #[serde(default)]
    pub components: BTreeMap<String, Value>,
}

impl EntitySnapshot {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            tags: BTreeSet::new(),
            components: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, data: Value) -> Self {
        self.components.insert(name.into(), data);
        self
    }
}

impl World {
    /// Serialize a live entity.
    ///
    /// Components without a codec are logged and left out.
    ///
    /// # Errors
    ///
    /// [`FableError::UnknownEntity`] if `id` is not live,
    /// [`FableError::ComponentCodec`] if a serializer fails.
    pub fn serialize_entity(&self, id: &str) -> Result<EntitySnapshot, FableError> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| FableError::UnknownEntity { id: id.to_owned() })?;

        let mut snapshot = EntitySnapshot::new(entity.id());
        snapshot.tags = entity.tag_set().clone();

        for (name, component) in entity.components() {
            let encoded = self
                .components
                .lookup(name)
                .and_then(|descriptor| descriptor.serialize(component.as_any()));
            match encoded {
                Some(Ok(data)) => {
                    snapshot.components.insert(name.to_owned(), data);
                }
                Some(Err(details)) => {
                    return Err(FableError::ComponentCodec {
                        component: name.to_owned(),
                        details,
                    });
                }
                None => {
                    tracing::warn!(
                        entity = %id,
                        component = %name,
                        "component has no serializer -- omitted from snapshot"
                    );
                }
            }
        }
        Ok(snapshot)
    }

    /// Rebuild an entity from a snapshot, under the snapshot's id.
    ///
    /// Every component name is checked and every component decoded before the
    /// entity is created, so a bad snapshot leaves the world untouched.
    /// Decoded instances are attached in name order; when one is reached
    /// earlier as another component's dependency, the decoded instance is
    /// used instead of a default.
    ///
    /// # Errors
    ///
    /// - [`FableError::DeserializerMissingComponent`] for an unregistered
    ///   component name.
    /// - [`FableError::ComponentCodec`] if a component has no deserializer or
    ///   its data does not decode.
    /// - Anything [`World::create_entity`] returns.
    pub fn deserialize_entity(&mut self, snapshot: &EntitySnapshot) -> Result<EntityId, FableError> {
        self.check_snapshot(snapshot)?;
        let mut pending = self.decode_components(snapshot)?;

        self.run_hook(HookCall::new(
            names::BEFORE_DESERIALIZE,
            Receiver::World,
            HookArgs::DeserializeEntity {
                id: snapshot.id.clone(),
            },
        ));

        let id = self.create_entity(
            snapshot.id.clone(),
            EntityOptions::new().tags(snapshot.tags.iter().cloned()),
        )?;
        while let Some((name, instance)) = pending.pop_first() {
            if let Err(err) = self.attach_resolved(&id, &name, Some(instance), &mut pending, &mut Vec::new()) {
                // Creation hooks have already run, so tear down the same way.
                self.destroy_entity(&id);
                return Err(err);
            }
        }

        self.run_hook(HookCall::new(
            names::AFTER_DESERIALIZE,
            Receiver::World,
            HookArgs::DeserializeEntity { id: id.clone() },
        ));
        Ok(id)
    }

    /// Check that every component in `snapshot` is registered.
    pub fn check_snapshot(&self, snapshot: &EntitySnapshot) -> Result<(), FableError> {
        for name in snapshot.components.keys() {
            if self.components.lookup(name).is_none() {
                return Err(FableError::DeserializerMissingComponent {
                    entity: snapshot.id.to_string(),
                    component: name.clone(),
                    registered: self.components.registered_names().join(", "),
                });
            }
        }
        Ok(())
    }

    fn decode_components(
        &self,
        snapshot: &EntitySnapshot,
    ) -> Result<BTreeMap<String, Box<dyn Any>>, FableError> {
        let mut decoded = BTreeMap::new();
        for (name, data) in &snapshot.components {
            let descriptor = self.components.resolve(name)?;
            let instance = match descriptor.deserialize(data) {
                Some(Ok(instance)) => instance,
                Some(Err(details)) => {
                    return Err(FableError::ComponentCodec {
                        component: name.clone(),
                        details,
                    })
                }
                None => {
                    return Err(FableError::ComponentCodec {
                        component: name.clone(),
                        details: "no deserializer installed".to_owned(),
                    })
                }
            };
            decoded.insert(name.clone(), instance);
        }
        Ok(decoded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
