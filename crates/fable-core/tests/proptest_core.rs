//! Property tests for the core invariants.
//!
//! Each property is checked against a simple model: a `HashMap` for the
//! registry and context stack, a dynamic-programming matcher for event
//! patterns, and a second world for serialization.

use std::collections::{BTreeSet, HashMap};

use fable_core::events::pattern_matches;
use fable_core::prelude::*;
use fable_core::registry::fuzzy_match;
use proptest::prelude::*;
use serde_json::json;

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

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Label {
    text: String,
    lines: Vec<String>,
}

impl ComponentType for Label {
    const NAME: &'static str = "label";
}

// ---------------------------------------------------------------------------
// Reference model for event patterns
// ---------------------------------------------------------------------------

/// `matched[i][j]`: the first `i` pattern segments match the first `j` name
/// segments.
fn reference_match(pattern: &[&str], name: &[&str]) -> bool {
    let mut matched = vec![vec![false; name.len() + 1]; pattern.len() + 1];
    matched[0][0] = true;
    for i in 1..=pattern.len() {
        for j in 0..=name.len() {
            matched[i][j] = match pattern[i - 1] {
                "**" => matched[i - 1][j] || (j > 0 && matched[i][j - 1]),
                "*" => j > 0 && !name[j - 1].is_empty() && matched[i - 1][j - 1],
                literal => j > 0 && name[j - 1] == literal && matched[i - 1][j - 1],
            };
        }
    }
    matched[pattern.len()][name.len()]
}

fn name_segment() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("a"), Just("b"), Just("c")]
}

fn pattern_segment() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("a"), Just("b"), Just("*"), Just("**")]
}

// ---------------------------------------------------------------------------
// Context stack operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ContextOp {
    Push(usize, i64),
    Pop(usize),
}

const LABELS: [&str; 3] = ["agent", "location", "instrument"];

fn context_op() -> impl Strategy<Value = ContextOp> {
    prop_oneof![
        (0..LABELS.len(), any::<i64>()).prop_map(|(l, v)| ContextOp::Push(l, v)),
        (0..LABELS.len()).prop_map(ContextOp::Pop),
    ]
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct EntityShape {
    tags: BTreeSet<String>,
    weight: Option<u32>,
    portable: Option<bool>,
    label: Option<(String, Vec<String>)>,
}

fn entity_shape() -> impl Strategy<Value = EntityShape> {
    (
        prop::collection::btree_set("[a-z]{1,6}", 0..4),
        prop::option::of(any::<u32>()),
        prop::option::of(any::<bool>()),
        prop::option::of(("\\PC{0,12}", prop::collection::vec("[a-z ]{0,8}", 0..3))),
    )
        .prop_map(|(tags, weight, portable, label)| EntityShape {
            tags,
            weight,
            portable,
            label,
        })
}

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Weight>();
    world.register_component::<Portable>();
    world.register_component::<Label>();
    world
}

fn build(world: &mut World, shape: &EntityShape) -> EntityId {
    let mut options = EntityOptions::new().tags(shape.tags.iter().cloned());
    if let Some(grams) = shape.weight {
        options = options.instance(Weight { grams });
    }
    if let Some(carried) = shape.portable {
        options = options.instance(Portable { carried });
    }
    if let Some((text, lines)) = &shape.label {
        options = options.instance(Label {
            text: text.clone(),
            lines: lines.clone(),
        });
    }
    world.create_entity("subject", options).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn registry_rejects_every_duplicate(keys in prop::collection::vec("[a-c]{1,2}(#[0-3])?", 1..40)) {
        let mut registry = Registry::new("test");
        let mut model: HashMap<String, usize> = HashMap::new();

        for (value, key) in keys.iter().enumerate() {
            let result = registry.register(key.clone(), value);
            if model.contains_key(key) {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.is_ok());
                model.insert(key.clone(), value);
            }
        }

        prop_assert_eq!(registry.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(registry.get(key), Some(value));
            // An exact anchored pattern finds exactly the stored value.
            let found = registry.find_fuzzy(&format!("^{key}$"));
            prop_assert_eq!(found, vec![value]);
            prop_assert!(fuzzy_match(key, key));
        }
    }

    #[test]
    fn wildcard_matching_agrees_with_reference(
        pattern in prop::collection::vec(pattern_segment(), 1..5),
        name in prop::collection::vec(name_segment(), 1..6),
    ) {
        let expected = reference_match(&pattern, &name);
        prop_assert_eq!(pattern_matches(&pattern.join("."), &name.join(".")), expected);
    }

    #[test]
    fn context_stack_is_lifo_per_label(ops in prop::collection::vec(context_op(), 1..60)) {
        let mut ctx = ContextStack::new();
        let mut model: HashMap<&str, Vec<i64>> = HashMap::new();

        for op in ops {
            match op {
                ContextOp::Push(label, value) => {
                    ctx.push([(LABELS[label], json!(value))]);
                    model.entry(LABELS[label]).or_default().push(value);
                }
                ContextOp::Pop(label) => {
                    let failures = ctx.pop([LABELS[label]]);
                    let popped = model.get_mut(LABELS[label]).and_then(Vec::pop);
                    prop_assert_eq!(failures, usize::from(popped.is_none()));
                    model.retain(|_, stack| !stack.is_empty());
                }
            }

            for label in LABELS {
                let top = model.get(label).and_then(|stack| stack.last()).map(|v| json!(v));
                prop_assert_eq!(ctx.get(label).cloned(), top);
                prop_assert_eq!(ctx.depth(label), model.get(label).map_or(0, Vec::len));
            }
        }
    }

    #[test]
    fn serialize_deserialize_serialize_is_stable(shape in entity_shape()) {
        let mut world = setup_world();
        let id = build(&mut world, &shape);
        let first = world.serialize_entity(&id).unwrap();

        let mut other = setup_world();
        let rebuilt = other.deserialize_entity(&first).unwrap();
        let second = other.serialize_entity(&rebuilt).unwrap();
        prop_assert_eq!(&second, &first);

        let text = serde_json::to_string(&first).unwrap();
        let parsed: EntitySnapshot = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(&parsed, &first);

        // `portable` always brings `weight` with it.
        if shape.portable.is_some() {
            prop_assert!(second.components.contains_key("weight"));
        }
    }

    #[test]
    fn instances_never_share_ids(count in 1usize..20, preexisting in prop::collection::btree_set(0u64..20, 0..5)) {
        let mut world = setup_world();
        world.create_entity("rock", EntityOptions::new().component("portable")).unwrap();
        for ordinal in &preexisting {
            world.create_entity(format!("rock#{ordinal}"), EntityOptions::new()).unwrap();
        }
        world.register_template("rock", "rock").unwrap();

        let mut seen = BTreeSet::new();
        for _ in 0..count {
            let id = world.instantiate("rock").unwrap().unwrap();
            prop_assert!(seen.insert(id.clone()));
            prop_assert!(world.resolve(&id).unwrap().is_tagged("template:rock"));
        }
        prop_assert_eq!(world.instances_of("rock").len(), count);
    }
}
