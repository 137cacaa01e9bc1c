//! Whole-world snapshot and restore with BLAKE3 hashing.
//!
//! Provides [`SessionSnapshot`] -- every live entity and every template record
//! of a session, plus a BLAKE3 content hash for integrity checks and
//! determinism tests.
//!
//! # Usage
//!
//! ```
//! use fable_engine::prelude::*;
//!
//! let mut session = Session::default();
//! session.world_mut().create_entity("lamp", EntityOptions::new().tag("light")).unwrap();
//!
//! let snapshot = session.capture_snapshot().unwrap();
//! assert_eq!(snapshot.hash.len(), 64); // BLAKE3 hex digest
//!
//! session.world_mut().destroy_entity("lamp");
//! session.restore_from_snapshot(&snapshot).unwrap();
//! assert!(session.world().resolve("lamp").unwrap().is_tagged("light"));
//! ```
//!
//! # What Is NOT Serialized
//!
//! - **Listeners and hooks** (closures) -- retained on the same session,
//!   re-attached by the caller on a fresh one.
//! - **Component descriptors and gatherers** -- registered by code, not data.
//!   Restoring into a session that lacks a component type fails before any
//!   state is touched.
//! - **Context stacks** -- transient per operation.

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use fable_core::snapshot::EntitySnapshot;
use fable_core::template::TemplateRecord;
use serde::{Deserialize, Serialize};

use crate::session::Session;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Serialized form of one template record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub name: String,
    pub snapshot: EntitySnapshot,
    /// Instantiations so far.
    pub instantiations: u64,
}

impl From<&TemplateRecord> for TemplateSnapshot {
    fn from(record: &TemplateRecord) -> Self {
        Self {
            name: record.name().to_owned(),
            snapshot: record.snapshot().clone(),
            instantiations: record.instance_count(),
        }
    }
}

/// A serializable snapshot of everything data-driven in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Live entities, sorted by id.
    pub entities: Vec<EntitySnapshot>,
    /// Template records in registration order.
    pub templates: Vec<TemplateSnapshot>,
    /// Next instance ordinal per base id; restored so no instance id is
    /// handed out twice.
    #[serde(default)]
    pub issued_ordinals: BTreeMap<String, u64>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of the fields above.
    pub hash: String,
}

impl SessionSnapshot {
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize session snapshot")
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("failed to parse session snapshot")
    }
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 hex digest of the hashable session state.
///
/// The hash field itself is not included (it is derived).
pub fn compute_hash(
    entities: &[EntitySnapshot],
    templates: &[TemplateSnapshot],
    issued_ordinals: &BTreeMap<String, u64>,
) -> anyhow::Result<String> {
    #[derive(Serialize)]
    struct HashableState<'a> {
        entities: &'a [EntitySnapshot],
        templates: &'a [TemplateSnapshot],
        issued_ordinals: &'a BTreeMap<String, u64>,
    }

    let json_bytes = serde_json::to_vec(&HashableState {
        entities,
        templates,
        issued_ordinals,
    })
    .context("session state is not JSON-serializable")?;

    Ok(blake3::hash(&json_bytes).to_hex().to_string())
}

// ---------------------------------------------------------------------------
// Session snapshot/restore methods
// ---------------------------------------------------------------------------

impl Session {
    /// Capture every live entity and template record.
    ///
    /// # Errors
    ///
    /// Fails if a component serializer fails.
    pub fn capture_snapshot(&self) -> anyhow::Result<SessionSnapshot> {
        let (entities, templates) = self.capture_state()?;
        let issued_ordinals = self.world().issued_ordinals().clone();
        let hash = compute_hash(&entities, &templates, &issued_ordinals)?;
        Ok(SessionSnapshot {
            entities,
            templates,
            issued_ordinals,
            hash,
        })
    }

    /// The BLAKE3 digest of the current state, as in
    /// [`capture_snapshot`](Self::capture_snapshot).
    pub fn state_hash(&self) -> anyhow::Result<String> {
        let (entities, templates) = self.capture_state()?;
        compute_hash(&entities, &templates, self.world().issued_ordinals())
    }

    fn capture_state(&self) -> anyhow::Result<(Vec<EntitySnapshot>, Vec<TemplateSnapshot>)> {
        let world = self.world();
        let mut ids: Vec<&str> = world.entities().map(|entity| entity.id().as_str()).collect();
        ids.sort_unstable();

        let entities = ids
            .into_iter()
            .map(|id| {
                world
                    .serialize_entity(id)
                    .with_context(|| format!("failed to serialize entity '{id}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let templates = world.templates().map(TemplateSnapshot::from).collect();
        Ok((entities, templates))
    }

    /// Replace all entities and templates with the snapshot's.
    ///
    /// The hash is verified and every component name is checked against the
    /// registry first; if either check fails the session is left unchanged.
    /// Live entities are then destroyed (running their destroy hooks and
    /// dropping the listeners they own) and the snapshot is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error on a hash mismatch (corruption or tampering), an
    /// unregistered component, or a component that fails to decode. A decode
    /// failure is only found while rebuilding, after the old state is gone.
    pub fn restore_from_snapshot(&mut self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let expected_hash = compute_hash(
            &snapshot.entities,
            &snapshot.templates,
            &snapshot.issued_ordinals,
        )?;
        if expected_hash != snapshot.hash {
            bail!(
                "snapshot hash mismatch: recorded {} but recomputed {}. \
                 The snapshot may be corrupted or tampered with.",
                snapshot.hash,
                expected_hash
            );
        }

        let world = self.world_mut();
        for entity in &snapshot.entities {
            world.check_snapshot(entity)?;
        }
        for template in &snapshot.templates {
            world
                .check_snapshot(&template.snapshot)
                .with_context(|| format!("template '{}' cannot be restored", template.name))?;
        }

        let live: Vec<String> = world.entities().map(|entity| entity.id().to_string()).collect();
        for id in &live {
            world.destroy_entity(id);
        }
        world.clear_templates();

        for entity in &snapshot.entities {
            world
                .deserialize_entity(entity)
                .with_context(|| format!("failed to restore entity '{}'", entity.id))?;
        }
        for template in &snapshot.templates {
            world.insert_template_record(TemplateRecord::restore(
                template.name.clone(),
                template.snapshot.clone(),
                template.instantiations,
            ))?;
        }
        world.restore_issued_ordinals(snapshot.issued_ordinals.clone());

        tracing::debug!(
            entities = snapshot.entities.len(),
            templates = snapshot.templates.len(),
            "session restored from snapshot"
        );
        Ok(())
    }
}
