//! Rock garden demo -- a template stamped out into a small garden of rocks.
//!
//! Run with:
//!   cargo run --example rock_garden -p fable-engine
//!
//! Set `FABLE_LOG=debug` to watch entity and template lifecycle logs.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Context;
use fable_engine::fable_core::hooks::names;
use fable_engine::prelude::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
struct Weight {
    grams: u32,
}

impl ComponentType for Weight {
    const NAME: &'static str = "weight";
    const BINDING: Option<&'static str> = Some("weight");
}

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
struct Portable {
    carried: bool,
}

impl ComponentType for Portable {
    const NAME: &'static str = "portable";
    const REQUIRES: &'static [&'static str] = &["weight"];
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    let config = EngineConfig::default();
    init_logging(&config.log_filter);

    let mut session = Session::new(config).context("invalid engine config")?;
    let world = session.world_mut();
    world.register_component::<Weight>();
    world.register_component::<Portable>();

    world.create_entity(
        "rock_master",
        EntityOptions::new()
            .tag("mineral")
            .instance(Weight { grams: 250 })
            .component("portable"),
    )?;
    world.register_template("rock", "rock_master")?;

    // Count every rock that gets stamped out.
    let stamped = Rc::new(Cell::new(0u32));
    let counter = stamped.clone();
    world.hooks_mut().attach_fn(names::AFTER_INSTANTIATE, move |_world, _call| {
        counter.set(counter.get() + 1);
    });

    // Report every change to any rock's weight.
    world
        .events_mut()
        .on_fn("rock.**.weight.*", ListenerOptions::new(), |_world, event| {
            println!("  {} {}", event.name, event.data);
        });

    let mut rocks = Vec::new();
    for _ in 0..3 {
        let id = world
            .instantiate("rock")?
            .context("rock template disappeared")?;
        rocks.push(id);
    }

    // Erode the second rock.
    let eroded = &rocks[1];
    let before = world
        .component::<Weight>(eroded)?
        .map_or(0, |weight| weight.grams);
    if let Some(weight) = world.component_mut::<Weight>(eroded)? {
        weight.grams -= 40;
    }
    println!("eroding {eroded}:");
    let property = format!("rock.{}.weight", world.base_id(eroded));
    world.emit_property_events(&PropertyChange::new(property, json!(before), json!(before - 40)));

    println!("garden:");
    for rock in world.instances_of("rock") {
        let grams = rock.get_as::<Weight>("weight").map_or(0, |w| w.grams);
        println!("  {} ({grams} g) tags={:?}", rock.id(), rock.tags().collect::<Vec<_>>());
    }
    println!("stamped {} rocks", stamped.get());

    let snapshot = session.capture_snapshot()?;
    println!("snapshot hash: {}", snapshot.hash);
    Ok(())
}
