//! Property tests for session snapshots.
//!
//! Random sequences of world operations are applied to a session; a snapshot
//! restored into a fresh session must reproduce the same hash, and keep
//! handing out fresh instance ids.

use fable_engine::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Weight {
    grams: u32,
}

impl ComponentType for Weight {
    const NAME: &'static str = "weight";
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Portable {
    carried: bool,
}

impl ComponentType for Portable {
    const NAME: &'static str = "portable";
    const REQUIRES: &'static [&'static str] = &["weight"];
}

/// Operations we can perform on the session's world.
#[derive(Debug, Clone)]
enum WorldOp {
    Create(u8, u32),
    Destroy(u8),
    Tag(u8, u8),
    AttachPortable(u8),
    Instantiate,
}

fn world_op_strategy() -> impl Strategy<Value = WorldOp> {
    prop_oneof![
        (0..8u8, any::<u32>()).prop_map(|(i, g)| WorldOp::Create(i, g)),
        (0..8u8).prop_map(WorldOp::Destroy),
        (0..8u8, 0..4u8).prop_map(|(i, t)| WorldOp::Tag(i, t)),
        (0..8u8).prop_map(WorldOp::AttachPortable),
        Just(WorldOp::Instantiate),
    ]
}

fn new_session() -> Session {
    let mut session = Session::default();
    session.world_mut().register_component::<Weight>();
    session.world_mut().register_component::<Portable>();
    session
}

fn apply(world: &mut World, op: &WorldOp) {
    match op {
        WorldOp::Create(i, grams) => {
            let id = format!("thing{i}");
            if !world.contains_entity(&id) {
                world
                    .create_entity(id, EntityOptions::new().instance(Weight { grams: *grams }))
                    .unwrap();
            }
        }
        WorldOp::Destroy(i) => {
            world.destroy_entity(&format!("thing{i}"));
        }
        WorldOp::Tag(i, t) => {
            let id = format!("thing{i}");
            if world.contains_entity(&id) {
                world.tag(&id, &format!("tag{t}")).unwrap();
            }
        }
        WorldOp::AttachPortable(i) => {
            let id = format!("thing{i}");
            if world.contains_entity(&id) {
                world.attach_component(&id, "portable").unwrap();
            }
        }
        WorldOp::Instantiate => {
            world.instantiate("stone").unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn restore_reproduces_hash(ops in prop::collection::vec(world_op_strategy(), 1..40)) {
        let mut session = new_session();
        session.world_mut().create_entity("stone", EntityOptions::new().component("portable")).unwrap();
        session.world_mut().register_template("stone", "stone").unwrap();
        for op in &ops {
            apply(session.world_mut(), op);
        }

        let snapshot = session.capture_snapshot().unwrap();
        prop_assert_eq!(&snapshot.hash, &session.state_hash().unwrap());

        let mut restored = new_session();
        restored.restore_from_snapshot(&snapshot).unwrap();
        prop_assert_eq!(restored.state_hash().unwrap(), snapshot.hash.clone());

        // Both sessions hand out the same next instance id, and it is fresh.
        let a = session.world_mut().instantiate("stone").unwrap().unwrap();
        let b = restored.world_mut().instantiate("stone").unwrap().unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(
            session.world().instances_of("stone").len(),
            restored.world().instances_of("stone").len()
        );
    }
}
