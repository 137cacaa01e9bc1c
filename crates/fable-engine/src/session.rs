//! A running game session.
//!
//! A [`Session`] owns the [`World`] and the configuration it was built from.
//! Whole-world capture and restore live in [`snapshot`](crate::snapshot).
//!
//! ```
//! use fable_engine::prelude::*;
//!
//! let mut session = Session::new(EngineConfig::default()).unwrap();
//! session.world_mut().create_entity("lamp", EntityOptions::new().tag("light")).unwrap();
//! assert_eq!(session.world().entity_count(), 1);
//! ```

use fable_core::world::World;

use crate::config::{ConfigError, EngineConfig};

/// Owner of a [`World`] built from an [`EngineConfig`].
#[derive(Debug)]
pub struct Session {
    world: World,
    config: EngineConfig,
}

impl Session {
    /// Validate `config` and create a session with an empty world.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let world = World::with_config(config.world.clone());
        tracing::debug!(separator = %config.world.instance_separator, "session created");
        Ok(Self { world, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Give up the session and keep its world.
    pub fn into_world(self) -> World {
        self.world
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            world: World::new(),
            config: EngineConfig::default(),
        }
    }
}
