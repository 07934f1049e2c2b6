mod support;

use daokit_core::{
    Configuration, Connection, ConnectionParams, EntityManager, EntityManagerError,
    EventDispatcher, LifecycleEvent, Repository,
};
use std::sync::{Arc, Mutex};
use support::{sqlite_configuration, user};

#[test]
fn missing_mapping_driver_fails_before_opening_a_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.db");

    let err = EntityManager::create(ConnectionParams::file(&path), Configuration::new(), None)
        .unwrap_err();

    assert!(matches!(err, EntityManagerError::InvalidConfiguration(_)));
    assert!(!path.exists());
}

#[test]
fn explicit_dispatcher_must_match_existing_connection() {
    let connection = Arc::new(
        Connection::open(ConnectionParams::default(), Arc::new(EventDispatcher::new())).unwrap(),
    );
    let foreign = Arc::new(EventDispatcher::new());

    let err = EntityManager::create(
        Arc::clone(&connection),
        sqlite_configuration(),
        Some(foreign),
    )
    .unwrap_err();
    assert!(matches!(err, EntityManagerError::MismatchedEventDispatcher));

    let own = Arc::clone(connection.event_dispatcher());
    let manager =
        EntityManager::create(Arc::clone(&connection), sqlite_configuration(), Some(own)).unwrap();
    assert!(Arc::ptr_eq(
        manager.event_dispatcher().unwrap(),
        connection.event_dispatcher()
    ));
}

#[test]
fn params_source_binds_the_given_dispatcher() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let manager = EntityManager::create(
        ConnectionParams::default(),
        sqlite_configuration(),
        Some(Arc::clone(&dispatcher)),
    )
    .unwrap();

    assert!(Arc::ptr_eq(manager.event_dispatcher().unwrap(), &dispatcher));
    assert_eq!(manager.connection().unwrap().params().mode(), "memory");
}

#[test]
fn file_backed_manager_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let params = ConnectionParams::from_json_str(&format!(
        r#"{{"path": {}, "busy_timeout_ms": 1000}}"#,
        serde_json::to_string(&dir.path().join("daokit.db")).unwrap()
    ))
    .unwrap();

    let ada = user("ada@example.com");
    {
        let manager =
            EntityManager::create(params.clone(), sqlite_configuration(), None).unwrap();
        manager.persist(&ada).unwrap().flush(None).unwrap();
    }

    let reopened = EntityManager::create(params, sqlite_configuration(), None).unwrap();
    let found = reopened
        .get_repository("app::User")
        .unwrap()
        .find(ada.uuid)
        .unwrap()
        .unwrap();
    assert_eq!(found, ada);
}

#[test]
fn lifecycle_listeners_observe_engine_operations() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in [
        LifecycleEvent::PrePersist,
        LifecycleEvent::PostPersist,
        LifecycleEvent::PreRemove,
        LifecycleEvent::PostRemove,
        LifecycleEvent::PostFlush,
        LifecycleEvent::OnClear,
    ] {
        let seen = Arc::clone(&seen);
        dispatcher.add_listener(event, move |args| {
            seen.lock().unwrap().push((args.event, args.entity_type.map(str::to_string)));
        });
    }
    let manager = EntityManager::create(
        ConnectionParams::default(),
        sqlite_configuration(),
        Some(dispatcher),
    )
    .unwrap();

    let ada = user("ada@example.com");
    manager.persist(&ada).unwrap().flush(None).unwrap();
    manager.remove(&ada).unwrap().flush(None).unwrap();
    manager.clear("app::Admin").unwrap();

    let user_type = Some("app::User".to_string());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (LifecycleEvent::PrePersist, user_type.clone()),
            (LifecycleEvent::PostPersist, user_type.clone()),
            (LifecycleEvent::PostFlush, None),
            (LifecycleEvent::PreRemove, user_type.clone()),
            (LifecycleEvent::PostRemove, user_type.clone()),
            (LifecycleEvent::PostFlush, None),
            (LifecycleEvent::OnClear, user_type),
        ]
    );
}
