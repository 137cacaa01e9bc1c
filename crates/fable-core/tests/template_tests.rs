//! Integration tests for template registration and instantiation.

use std::cell::RefCell;
use std::rc::Rc;

use fable_core::hooks::names;
use fable_core::prelude::*;

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Weight {
    grams: u32,
}

impl ComponentType for Weight {
    const NAME: &'static str = "weight";
    const BINDING: Option<&'static str> = Some("weight");
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Portable {
    carried: bool,
}

impl ComponentType for Portable {
    const NAME: &'static str = "portable";
    const REQUIRES: &'static [&'static str] = &["weight"];
}

fn rock_world() -> World {
    let mut world = World::new();
    world.register_component::<Weight>();
    world.register_component::<Portable>();
    world
        .create_entity(
            "rock_master",
            EntityOptions::new()
                .tag("mineral")
                .instance(Weight { grams: 250 })
                .component("portable"),
        )
        .unwrap();
    world.register_template("rock", "rock_master").unwrap();
    world
}

#[test]
fn instances_are_distinct_tagged_and_independent() {
    let mut world = rock_world();

    let a = world.instantiate("rock").unwrap().unwrap();
    let b = world.instantiate("rock").unwrap().unwrap();
    assert_ne!(a, b);
    assert_eq!(a, "rock_master#0");
    assert_eq!(b, "rock_master#1");

    for id in [&a, &b] {
        let entity = world.resolve(id).unwrap();
        assert!(entity.is_tagged("template:rock"));
        assert!(entity.is_tagged("mineral"));
        assert_eq!(entity.get_as::<Weight>("weight"), Some(&Weight { grams: 250 }));
        assert!(entity.has("portable"));
    }

    world.component_mut::<Weight>(&a).unwrap().unwrap().grams = 1;
    world.tag(&a, "chipped").unwrap();

    assert_eq!(world.component::<Weight>(&b).unwrap().unwrap().grams, 250);
    assert!(!world.resolve(&b).unwrap().is_tagged("chipped"));
    assert_eq!(world.component::<Weight>("rock_master").unwrap().unwrap().grams, 250);
    assert!(!world.resolve("rock_master").unwrap().is_tagged("template:rock"));
}

#[test]
fn stored_snapshot_is_never_mutated() {
    let mut world = rock_world();
    let before = world.template("rock").unwrap().snapshot().clone();

    world.instantiate("rock").unwrap();
    world.component_mut::<Weight>("rock_master").unwrap().unwrap().grams = 7;
    world.instantiate("rock").unwrap();

    let record = world.template("rock").unwrap();
    assert_eq!(record.snapshot(), &before);
    assert_eq!(record.instance_count(), 2);
}

#[test]
fn later_changes_to_the_source_do_not_leak_into_instances() {
    let mut world = rock_world();
    world.component_mut::<Weight>("rock_master").unwrap().unwrap().grams = 9000;
    let id = world.instantiate("rock").unwrap().unwrap();
    assert_eq!(world.component::<Weight>(&id).unwrap().unwrap().grams, 250);
}

#[test]
fn instances_of_lists_live_instances() {
    let mut world = rock_world();
    let a = world.instantiate("rock").unwrap().unwrap();
    let b = world.instantiate("rock").unwrap().unwrap();
    world.destroy_entity(&a);

    let live: Vec<&str> = world.instances_of("rock").into_iter().map(|e| e.id().as_str()).collect();
    assert_eq!(live, vec![b.as_str()]);

    // Destroying an instance does not recycle its ordinal.
    let c = world.instantiate("rock").unwrap().unwrap();
    assert_eq!(c, "rock_master#2");
}

#[test]
fn instantiation_hooks_see_reserved_ordinal() {
    let mut world = rock_world();
    let seen = Rc::new(RefCell::new(Vec::new()));
    for hook in [names::BEFORE_INSTANTIATE, names::AFTER_INSTANTIATE] {
        let sink = seen.clone();
        world.hooks_mut().attach_fn(hook, move |world, call| {
            if let HookArgs::Instantiate { ordinal, id, .. } = &call.args {
                sink.borrow_mut().push((call.hook.clone(), *ordinal, world.contains_entity(id)));
            }
        });
    }

    world.instantiate("rock").unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            (names::BEFORE_INSTANTIATE.to_owned(), 0, false),
            (names::AFTER_INSTANTIATE.to_owned(), 0, true),
        ]
    );
}

#[test]
fn hook_may_instantiate_reentrantly() {
    let mut world = rock_world();
    let fired = Rc::new(RefCell::new(false));
    let once = fired.clone();
    world.hooks_mut().attach_fn(names::AFTER_INSTANTIATE, move |world, _call| {
        if !once.replace(true) {
            world.instantiate("rock").unwrap();
        }
    });

    let first = world.instantiate("rock").unwrap().unwrap();
    assert_eq!(first, "rock_master#0");
    assert_eq!(world.instances_of("rock").len(), 2);
    assert_eq!(world.template("rock").unwrap().instance_count(), 2);
}

#[test]
fn custom_separator_and_prefix() {
    let mut world = World::with_config(WorldConfig {
        instance_separator: "~".to_owned(),
        provenance_prefix: "from:".to_owned(),
    });
    world.register_component::<Weight>();
    world
        .create_entity("coin", EntityOptions::new().component("weight"))
        .unwrap();
    world.register_template("coin", "coin").unwrap();

    let id = world.instantiate("coin").unwrap().unwrap();
    assert_eq!(id, "coin~0");
    assert!(world.resolve(&id).unwrap().is_tagged("from:coin"));
    assert_eq!(world.base_id(&id), "coin");
}

#[test]
fn template_names_in_registration_order() {
    let mut world = rock_world();
    world.create_entity("lamp", EntityOptions::new()).unwrap();
    world.register_template("lamp", "lamp").unwrap();
    assert_eq!(world.template_names().collect::<Vec<_>>(), vec!["rock", "lamp"]);
}
