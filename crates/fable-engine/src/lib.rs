//! Fable Engine -- session layer over the Fable core.
//!
//! This crate builds on [`fable_core`] to provide what a running game needs
//! around the world itself: validated configuration, logging setup, and a
//! [`Session`](session::Session) whose whole state can be captured into a
//! hashed [`SessionSnapshot`](snapshot::SessionSnapshot) and restored.
//!
//! # Quick Start
//!
//! ```
//! use fable_engine::prelude::*;
//!
//! let mut session = Session::new(EngineConfig::default()).unwrap();
//! let world = session.world_mut();
//! world.create_entity("rock", EntityOptions::new().tag("mineral")).unwrap();
//! world.register_template("rock", "rock").unwrap();
//! let pebble = world.instantiate("rock").unwrap().unwrap();
//! assert_eq!(pebble, "rock#0");
//!
//! let hash = session.state_hash().unwrap();
//! assert_eq!(hash.len(), 64);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod session;
pub mod snapshot;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use fable_core;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the core prelude.
    pub use fable_core::prelude::*;

    // Engine-specific exports.
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::logging::init_logging;
    pub use crate::session::Session;
    pub use crate::snapshot::{SessionSnapshot, TemplateSnapshot};
}
