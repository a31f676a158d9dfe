use std::sync::Arc;

use strata_ecs::{Identity, ReferenceStore, World};

struct Likes;
struct Origin;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Strength(u32);

fn liking_count(world: &mut World, target: Identity) -> usize {
    world
        .query::<(Origin,)>()
        .has_relation::<Likes>(target)
        .build()
        .count()
}

#[test]
fn relations_to_different_targets_are_distinct_components() {
    let mut world = World::new();
    let alice = world.spawn();
    let bob = world.spawn();
    let eve = world.spawn();

    world.add_relation(eve, Strength(3), alice).unwrap();
    world.add_relation(eve, Strength(9), bob).unwrap();

    assert_eq!(world.get_relation::<Strength>(eve, alice).unwrap().0, 3);
    assert_eq!(world.get_relation::<Strength>(eve, bob).unwrap().0, 9);

    let mut targets = world.targets_of::<Strength>(eve).unwrap();
    targets.sort();
    assert_eq!(targets, vec![alice, bob]);
}

#[test]
fn despawning_one_target_spares_the_other() {
    let mut world = World::new();
    let target1 = world.spawn();
    let target2 = world.spawn();

    for target in [target1, target2] {
        for _ in 0..1000 {
            let e = world.spawn();
            world.add(e, Origin).unwrap();
            world.add_relation(e, Likes, target).unwrap();
        }
    }
    assert_eq!(liking_count(&mut world, target1), 1000);
    assert_eq!(liking_count(&mut world, target2), 1000);
    assert_eq!(liking_count(&mut world, Identity::ANY), 2000);

    world.despawn(target1).unwrap();
    assert_eq!(liking_count(&mut world, target1), 0);
    assert_eq!(liking_count(&mut world, target2), 1000);
    assert_eq!(liking_count(&mut world, Identity::ANY), 1000);
    assert_eq!(world.collect_targets::<Likes>(), vec![target2]);
    // The origins themselves survive, only the relation is stripped.
    assert_eq!(world.query::<(Origin,)>().build().count(), 2000);
}

#[test]
fn collect_targets_skips_despawned_ones() {
    let mut world = World::new();
    let t1 = world.spawn();
    let t2 = world.spawn();
    let origin = world.spawn();
    world.add_relation(origin, Likes, t1).unwrap();
    world.add_relation(origin, Likes, t2).unwrap();

    let mut targets = world.collect_targets::<Likes>();
    targets.sort();
    let mut expected = vec![t1, t2];
    expected.sort();
    assert_eq!(targets, expected);

    world.despawn(t2).unwrap();
    assert_eq!(world.collect_targets::<Likes>(), vec![t1]);
}

#[test]
fn relation_target_cannot_be_a_dead_entity() {
    let mut world = World::new();
    let origin = world.spawn();
    let target = world.spawn();
    world.despawn(target).unwrap();
    assert!(world.add_relation(origin, Likes, target).is_err());
}

#[test]
fn reference_store_keys_work_as_targets() {
    let mut world = World::new();
    let mut store: ReferenceStore<String> = ReferenceStore::new();

    let object = Arc::new("artifact".to_string());
    let key = store.spawn(&object);
    assert!(key.id() < 0);

    let holder = world.spawn();
    world.add_relation(holder, Strength(5), key).unwrap();
    assert!(world.has_relation::<Strength>(holder, key));
    assert!(world.has_relation::<Strength>(holder, Identity::ANY));
    assert_eq!(world.get_relation::<Strength>(holder, key).unwrap().0, 5);
    assert_eq!(*store.get(key).unwrap(), "artifact");
    assert_eq!(world.collect_targets::<Strength>(), vec![key]);

    world.remove_relation::<Strength>(holder, key).unwrap();
    assert!(!world.has_relation::<Strength>(holder, Identity::ANY));
}

#[test]
fn despawn_all_with_is_deferred_while_locked() {
    let mut world = World::new();
    for _ in 0..10 {
        let e = world.spawn();
        world.add(e, Strength(1)).unwrap();
    }
    world.lock();
    world.despawn_all_with::<Strength>().unwrap();
    assert_eq!(world.entity_count(), 10);
    world.unlock().unwrap();
    assert_eq!(world.entity_count(), 0);
}
