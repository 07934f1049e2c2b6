mod support;

use daokit_core::{EntityManagerError, EntityRecord, EngineError};
use support::{stub_manager, user, user_engine, Call};

#[test]
fn persist_forwards_each_item_once_in_order() {
    let (manager, engine) = stub_manager(user_engine());
    let a = user("a@example.com");
    let b = user("b@example.com");
    let c = user("c@example.com");

    manager.persist([&a, &b, &c]).expect("batch persist");

    assert_eq!(
        engine.operations(),
        vec![Call::Persist(a.uuid), Call::Persist(b.uuid), Call::Persist(c.uuid)]
    );
}

#[test]
fn single_items_and_collections_are_accepted() {
    let (manager, engine) = stub_manager(user_engine());
    let single = user("single@example.com");
    let owned = vec![user("x@example.com"), user("y@example.com")];

    manager
        .persist(&single)
        .and_then(|manager| manager.persist(&owned))
        .and_then(|manager| manager.remove(owned.as_slice()))
        .expect("chained batch calls");

    assert_eq!(
        engine.operations(),
        vec![
            Call::Persist(single.uuid),
            Call::Persist(owned[0].uuid),
            Call::Persist(owned[1].uuid),
            Call::Remove(owned[0].uuid),
            Call::Remove(owned[1].uuid),
        ]
    );
}

#[test]
fn empty_batch_reaches_nothing() {
    let (manager, engine) = stub_manager(user_engine());
    let none: Vec<EntityRecord> = Vec::new();

    manager.persist(&none).expect("empty persist");
    manager.remove(&none).expect("empty remove");
    manager.clear(Vec::<String>::new()).expect("empty clear list");

    assert!(engine.operations().is_empty());
}

#[test]
fn clear_all_calls_engine_once_with_all_sentinel() {
    let (manager, engine) = stub_manager(user_engine());

    manager.clear_all().expect("clear all");
    manager.clear(None::<&str>).expect("clear none");

    assert_eq!(engine.operations(), vec![Call::Clear(None), Call::Clear(None)]);
}

#[test]
fn clear_with_types_calls_engine_per_type() {
    let (manager, engine) = stub_manager(user_engine());

    manager
        .clear(["app::User", "shop::Order"])
        .expect("clear listed types");

    assert_eq!(
        engine.operations(),
        vec![
            Call::Clear(Some("app::User".to_string())),
            Call::Clear(Some("shop::Order".to_string())),
        ]
    );
}

#[test]
fn first_failing_item_stops_the_batch() {
    let (manager, engine) = stub_manager(user_engine());
    let first = user("first@example.com");
    let unmapped = EntityRecord::new("app::Ghost");
    let never = user("never@example.com");

    let err = manager
        .persist([&first, &unmapped, &never])
        .expect_err("unmapped item must fail");

    assert!(matches!(
        err,
        EntityManagerError::Engine(EngineError::UnknownEntityType(name)) if name == "app::Ghost"
    ));
    assert_eq!(engine.operations(), vec![Call::Persist(first.uuid)]);
}

#[test]
fn flush_forwards_target_entity() {
    let (manager, engine) = stub_manager(user_engine());
    let entity = user("flush@example.com");

    manager
        .persist(&entity)
        .and_then(|manager| manager.flush(Some(&entity)))
        .and_then(|manager| manager.flush(None))
        .expect("flushes");

    assert_eq!(
        engine.operations(),
        vec![
            Call::Persist(entity.uuid),
            Call::Flush(Some(entity.uuid)),
            Call::Flush(None),
        ]
    );
}
