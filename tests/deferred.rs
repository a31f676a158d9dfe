use strata_ecs::{EcsError, Identity, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(i32);

struct Likes;

#[test]
fn locked_world_defers_until_unlock() {
    let mut world = World::new();
    let e = world.spawn();

    world.lock();
    world.add(e, 5i32).unwrap();
    assert!(!world.has::<i32>(e));
    world.unlock().unwrap();
    assert!(world.has::<i32>(e));
    assert_eq!(*world.get::<i32>(e).unwrap(), 5);
}

#[test]
fn deferred_operations_apply_in_enqueue_order() {
    let mut world = World::new();
    let e = world.spawn();
    world.add(e, Health(1)).unwrap();

    world.lock();
    world.remove::<Health>(e).unwrap();
    world.add(e, Health(2)).unwrap();
    world.unlock().unwrap();
    assert_eq!(*world.get::<Health>(e).unwrap(), Health(2));
}

#[test]
fn deferred_add_then_remove_round_trips_while_locked() {
    let mut world = World::new();
    let e = world.spawn();

    world.lock();
    world.add(e, Health(1)).unwrap();
    world.remove::<Health>(e).unwrap();
    world.unlock().unwrap();
    assert!(world.is_alive(e));
    assert!(!world.has::<Health>(e));
}

#[test]
fn wildcard_relation_requests_are_rejected_at_replay() {
    let mut world = World::new();
    let e = world.spawn();
    world.add(e, Health(1)).unwrap();

    let mut query = world.query::<(Health,)>().build();
    let result = query.run_with(|ops, health| {
        ops.add_relation(Identity::new(health.0, 1), Likes, Identity::ANY);
    });
    assert!(matches!(result, Err(EcsError::WildcardTarget(_))));
    assert!(!world.has_relation::<Likes>(e, Identity::ANY));
}

#[test]
fn relations_to_targets_despawned_in_the_same_run_are_rejected() {
    let mut world = World::new();
    let target = world.spawn();
    let e = world.spawn();
    world.add(e, Health(2)).unwrap();

    let mut query = world.query::<(Health,)>().build();
    let result = query.run_with(|ops, health| {
        ops.despawn(target);
        ops.add_relation(Identity::new(health.0, 1), Likes, target);
    });
    assert_eq!(result, Err(EcsError::EntityNotAlive(target)));
    assert!(!world.is_alive(target));
    assert!(!world.has_relation::<Likes>(e, Identity::ANY));
}

#[test]
fn deferred_despawn_then_add_reports_at_replay() {
    let mut world = World::new();
    let e = world.spawn();

    world.lock();
    world.despawn(e).unwrap();
    world.add(e, 5i32).unwrap();
    let result = world.unlock();
    assert_eq!(result, Err(EcsError::EntityNotAlive(e)));
    assert!(!world.is_alive(e));
}

#[test]
fn replay_failure_does_not_lose_later_operations() {
    let mut world = World::new();
    let doomed = world.spawn();
    let survivor = world.spawn();

    world.lock();
    world.despawn(doomed).unwrap();
    world.add(doomed, 1i32).unwrap(); // will fail at replay
    world.add(survivor, 2i32).unwrap();
    assert!(world.unlock().is_err());
    assert_eq!(*world.get::<i32>(survivor).unwrap(), 2);
}

#[test]
fn nested_locks_are_reentrant() {
    let mut world = World::new();
    let e = world.spawn();

    world.lock();
    world.lock();
    world.lock();
    world.add(e, 1i32).unwrap();
    world.unlock().unwrap();
    world.unlock().unwrap();
    assert!(!world.has::<i32>(e));
    assert!(world.is_locked());
    world.unlock().unwrap();
    assert!(!world.is_locked());
    assert!(world.has::<i32>(e));
}

#[test]
fn unlock_without_lock_is_an_error() {
    let mut world = World::new();
    assert_eq!(world.unlock(), Err(EcsError::NotLocked));
}

#[test]
fn callbacks_defer_through_ops() {
    let mut world = World::new();
    let entities: Vec<_> = (0..10)
        .map(|i| {
            let e = world.spawn();
            world.add(e, Health(i)).unwrap();
            e
        })
        .collect();

    let mut query = world.query::<(Health,)>().build();
    query
        .run_with(|ops, health| {
            if health.0 < 5 {
                ops.remove::<Health>(Identity::new(health.0 + 1, 1));
            }
        })
        .unwrap();
    // Entity ids were minted in spawn order starting at 1.
    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.has::<Health>(e), i >= 5);
        assert!(world.is_alive(e));
    }
}

#[test]
fn despawn_during_run_takes_effect_after() {
    let mut world = World::new();
    for i in 0..100 {
        let e = world.spawn();
        world.add(e, Health(i)).unwrap();
    }

    let mut query = world.query::<(Health,)>().build();
    query
        .run_with(|ops, health| {
            if health.0 % 2 == 0 {
                ops.despawn(Identity::new(health.0 + 1, 1));
            }
        })
        .unwrap();
    assert_eq!(world.entity_count(), 50);
    assert_eq!(world.query::<(Health,)>().build().count(), 50);
}

#[test]
fn panicking_callback_leaves_the_world_unlocked() {
    let mut world = World::new();
    for i in 0..10 {
        let e = world.spawn();
        world.add(e, Health(i)).unwrap();
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut query = world.query::<(Health,)>().build();
        let _ = query.run(|health| {
            if health.0 == 7 {
                panic!("boom");
            }
        });
    }));
    assert!(outcome.is_err());
    assert!(!world.is_locked());
    // The world remains fully usable.
    let e = world.spawn();
    world.add(e, Health(99)).unwrap();
    assert_eq!(*world.get::<Health>(e).unwrap(), Health(99));
}
