//! Snapshot-and-instantiate templates.
//!
//! Registering a template serializes its source entity once. Every
//! instantiation rebuilds a fresh entity from that stored snapshot under the
//! id `<base><separator><ordinal>` and stamps it with a provenance tag
//! (`template:<name>` by default). The snapshot itself is never touched
//! again; only the instantiation counter moves.
//!
//! Ordinals are drawn per base id, not per template: two templates taken
//! from the same entity never hand out the same id, even after an instance
//! has been destroyed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId};
use crate::hooks::{names, HookArgs, HookCall, Receiver};
use crate::registry::base_id;
use crate::snapshot::EntitySnapshot;
use crate::world::World;
use crate::FableError;

/// A registered template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    name: String,
    snapshot: EntitySnapshot,
    instantiations: u64,
}

impl TemplateRecord {
    pub fn new(name: impl Into<String>, snapshot: EntitySnapshot) -> Self {
        Self::restore(name, snapshot, 0)
    }

    /// Rebuild a record with a known instantiation count.
    pub fn restore(name: impl Into<String>, snapshot: EntitySnapshot, instantiations: u64) -> Self {
        Self {
            name: name.into(),
            snapshot,
            instantiations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The snapshot taken at registration.
    pub fn snapshot(&self) -> &EntitySnapshot {
        &self.snapshot
    }

    /// Number of instantiations so far.
    pub fn instance_count(&self) -> u64 {
        self.instantiations
    }

    pub(crate) fn count_instance(&mut self) {
        self.instantiations += 1;
    }
}

/// Id of instance `ordinal` of an entity whose id is `base`.
pub fn instance_id(base: &str, separator: &str, ordinal: u64) -> EntityId {
    EntityId::new(format!("{base}{separator}{ordinal}"))
}

impl World {
    /// Register the current state of `entity_id` as template `name`.
    ///
    /// # Errors
    ///
    /// [`FableError::Conflict`] if `name` is taken, [`FableError::UnknownEntity`]
    /// if the source entity is not live, or any serialization error.
    pub fn register_template(&mut self, name: &str, entity_id: &str) -> Result<(), FableError> {
        if self.templates.contains(name) {
            return Err(FableError::Conflict {
                registry: self.templates.kind(),
                key: name.to_owned(),
            });
        }
        let snapshot = self.serialize_entity(entity_id)?;
        let args = HookArgs::RegisterTemplate {
            name: name.to_owned(),
            source: snapshot.id.clone(),
        };

        self.run_hook(HookCall::new(
            names::BEFORE_REGISTER_TEMPLATE,
            Receiver::Templates,
            args.clone(),
        ));
        self.templates.register(name, TemplateRecord::new(name, snapshot))?;
        tracing::debug!(template = %name, source = %entity_id, "template registered");
        self.run_hook(HookCall::new(
            names::AFTER_REGISTER_TEMPLATE,
            Receiver::Templates,
            args,
        ));
        Ok(())
    }

    /// Create a new instance of template `name`.
    ///
    /// Returns `Ok(None)` (and logs) if no such template exists. Ordinals
    /// are never reused for a base id; one whose id is held by a live entity
    /// created by other means is skipped.
    pub fn instantiate(&mut self, name: &str) -> Result<Option<EntityId>, FableError> {
        let separator = self.config.instance_separator.clone();
        let Some(record) = self.templates.get_by_id_mut(name) else {
            return Ok(None);
        };
        record.count_instance();
        let mut snapshot = record.snapshot.clone();

        let base = base_id(&snapshot.id, &separator).to_owned();
        let (ordinal, id) = loop {
            let ordinal = self.reserve_ordinal(&base);
            let id = instance_id(&base, &separator, ordinal);
            if !self.entities.contains(&id) {
                break (ordinal, id);
            }
            tracing::warn!(template = %name, id = %id, "instance id already taken -- skipping ordinal");
        };
        snapshot.id = id.clone();

        let args = HookArgs::Instantiate {
            template: name.to_owned(),
            ordinal,
            id: id.clone(),
        };
        self.run_hook(HookCall::new(
            names::BEFORE_INSTANTIATE,
            Receiver::Templates,
            args.clone(),
        ));

        let id = self.deserialize_entity(&snapshot)?;
        let provenance = self.config.provenance_tag(name);
        self.tag(&id, &provenance)?;

        tracing::debug!(template = %name, entity = %id, ordinal, "template instantiated");
        self.run_hook(HookCall::new(names::AFTER_INSTANTIATE, Receiver::Templates, args));
        Ok(Some(id))
    }

    fn reserve_ordinal(&mut self, base: &str) -> u64 {
        let next = self.issued_ordinals.entry(base.to_owned()).or_insert(0);
        let ordinal = *next;
        *next += 1;
        ordinal
    }

    /// Next instance ordinal per base id, for every base stamped so far.
    pub fn issued_ordinals(&self) -> &BTreeMap<String, u64> {
        &self.issued_ordinals
    }

    /// Replace the per-base ordinal counters, e.g. when restoring a save.
    pub fn restore_issued_ordinals(&mut self, ordinals: BTreeMap<String, u64>) {
        self.issued_ordinals = ordinals;
    }

    /// Look up a template without logging.
    pub fn template(&self, name: &str) -> Option<&TemplateRecord> {
        self.templates.get(name)
    }

    /// Template names in registration order.
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys()
    }

    /// Registered templates in registration order.
    pub fn templates(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.templates.iter().map(|(_, record)| record)
    }

    /// Live entities carrying the provenance tag of template `name`.
    pub fn instances_of(&self, name: &str) -> Vec<&Entity> {
        let tag = self.config.provenance_tag(name);
        self.filter_entities(|entity| entity.is_tagged(&tag))
    }

    /// Insert a previously captured template record.
    pub fn insert_template_record(&mut self, record: TemplateRecord) -> Result<(), FableError> {
        let name = record.name().to_owned();
        self.check_snapshot(record.snapshot())?;
        self.templates.register(name, record)?;
        Ok(())
    }

    /// Remove every template.
    pub fn clear_templates(&mut self) -> Vec<TemplateRecord> {
        self.templates
            .drain()
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
