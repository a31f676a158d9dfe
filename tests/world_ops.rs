use strata_ecs::{EcsError, Identity, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

struct Name(String);

#[test]
fn spawn_despawn_lifecycle() {
    let mut world = World::new();
    let entities: Vec<_> = (0..100).map(|_| world.spawn()).collect();
    assert_eq!(world.entity_count(), 100);

    for &e in entities.iter().step_by(2) {
        world.despawn(e).unwrap();
    }
    assert_eq!(world.entity_count(), 50);
    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.is_alive(e), i % 2 == 1);
    }
}

#[test]
fn recycled_ids_reject_stale_handles() {
    let mut world = World::new();
    let old = world.spawn();
    world.add(old, 1i32).unwrap();
    world.despawn(old).unwrap();

    let new = world.spawn();
    assert_eq!(new.id(), old.id());
    assert_ne!(new.generation(), old.generation());

    assert!(!world.has::<i32>(old));
    assert_eq!(world.get::<i32>(old), Err(EcsError::EntityNotAlive(old)));
    assert_eq!(world.add(old, 2i32), Err(EcsError::EntityNotAlive(old)));
    assert_eq!(world.despawn(old), Err(EcsError::EntityNotAlive(old)));
    assert!(!world.has::<i32>(new));
}

#[test]
fn components_move_intact_between_tables() {
    let mut world = World::new();
    let e = world.spawn();
    world.add(e, Position { x: 1.0, y: 2.0 }).unwrap();
    world.add(e, Velocity { x: 3.0, y: 4.0 }).unwrap();
    world.add(e, Name("strider".into())).unwrap();

    assert_eq!(*world.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
    assert_eq!(world.get::<Name>(e).unwrap().0, "strider");

    world.remove::<Velocity>(e).unwrap();
    assert_eq!(*world.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
    assert_eq!(world.get::<Name>(e).unwrap().0, "strider");
    assert!(!world.has::<Velocity>(e));
}

#[test]
fn swap_remove_keeps_other_entities_addressable() {
    let mut world = World::new();
    let entities: Vec<_> = (0..10)
        .map(|i| {
            let e = world.spawn();
            world.add(e, i as i32).unwrap();
            e
        })
        .collect();

    // Remove from the middle; survivors must still resolve correctly.
    world.despawn(entities[3]).unwrap();
    world.despawn(entities[0]).unwrap();
    for (i, &e) in entities.iter().enumerate() {
        if i == 0 || i == 3 {
            continue;
        }
        assert_eq!(*world.get::<i32>(e).unwrap(), i as i32);
    }
}

#[test]
fn add_remove_errors_are_precise() {
    let mut world = World::new();
    let e = world.spawn();
    world.add(e, 1i32).unwrap();

    match world.add(e, 2i32) {
        Err(EcsError::ComponentAlreadyPresent(identity, _)) => assert_eq!(identity, e),
        other => panic!("expected ComponentAlreadyPresent, got {:?}", other),
    }
    match world.remove::<Position>(e) {
        Err(EcsError::ComponentNotPresent(identity, _)) => assert_eq!(identity, e),
        other => panic!("expected ComponentNotPresent, got {:?}", other),
    }
    // The failed operations left the entity untouched.
    assert_eq!(*world.get::<i32>(e).unwrap(), 1);
}

#[test]
fn zero_sized_markers_work_like_any_component() {
    struct Frozen;
    let mut world = World::new();
    let e = world.spawn();
    world.add(e, Frozen).unwrap();
    assert!(world.has::<Frozen>(e));
    world.remove::<Frozen>(e).unwrap();
    assert!(!world.has::<Frozen>(e));
}

#[test]
fn heap_components_drop_exactly_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked(#[allow(dead_code)] Arc<()>, &'static AtomicUsize);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    let mut world = World::new();
    let keep = world.spawn();
    let kill = world.spawn();
    let strip = world.spawn();
    let payload = Arc::new(());
    world.add(keep, Tracked(payload.clone(), &DROPS)).unwrap();
    world.add(kill, Tracked(payload.clone(), &DROPS)).unwrap();
    world.add(strip, Tracked(payload.clone(), &DROPS)).unwrap();
    // Move `keep` to another table; the value must survive the copy.
    world.add(keep, 1i32).unwrap();

    world.despawn(kill).unwrap();
    world.remove::<Tracked>(strip).unwrap();
    assert_eq!(DROPS.load(Ordering::SeqCst), 2);
    assert!(world.has::<Tracked>(keep));
    assert_eq!(Arc::strong_count(&payload), 2);
}

#[test]
fn diagnostics_name_component_types() {
    let mut world = World::new();
    let e = world.spawn();
    let t = world.spawn();
    world.add(e, Position { x: 0.0, y: 0.0 }).unwrap();
    world.add_relation(e, 1u8, t).unwrap();

    let listed = world.components_of(e).unwrap();
    let rendered: Vec<String> = listed.iter().map(|x| x.to_string()).collect();
    assert!(rendered.iter().any(|s| s.contains("Position")));
    assert!(rendered.iter().any(|s| s.contains("u8") && s.contains(&t.to_string())));
}

#[test]
fn sentinels_are_never_alive() {
    let world = World::new();
    assert!(!world.is_alive(Identity::NONE));
    assert!(!world.is_alive(Identity::ANY));
}
