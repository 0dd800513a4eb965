use gearbox::config::StoreSettings;
use gearbox::prelude::*;
use gearbox::store::store_key;
use std::collections::BTreeMap;
use std::sync::Arc;

fn idle() -> GearboxConfig {
    GearboxConfig::default().with_autostart(false)
}

#[tokio::test(start_paused = true)]
async fn names_are_unique() {
    let registry = Registry::in_memory();
    registry.create("poller", idle()).await.unwrap();
    let err = registry.create("poller", idle()).await.unwrap_err();
    assert!(matches!(err, GearboxError::NameTaken(name) if name == "poller"));
    assert_eq!(registry.names().await, vec!["poller".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn get_returns_a_handle_to_the_same_controller() {
    let registry = Registry::in_memory();
    let created = registry.create("shared", idle()).await.unwrap();
    let fetched = registry.get("shared").await.unwrap();
    assert!(created.shift_up().await);
    assert_eq!(fetched.current_gear().await, 2);
    assert!(registry.get("missing").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn saved_gear_becomes_the_initial_gear() {
    let store = Arc::new(MemoryStore::new());
    store
        .save(&store_key("poller"), 4, chrono::Duration::days(1))
        .unwrap();
    let registry = Registry::new(store);

    let controller = registry.create("poller", idle()).await.unwrap();
    assert_eq!(controller.current_gear().await, 4);

    let fresh = registry.create("other", idle()).await.unwrap();
    assert_eq!(fresh.current_gear().await, 1);
}

#[tokio::test(start_paused = true)]
async fn saved_gear_above_top_is_clamped() {
    let store = Arc::new(MemoryStore::new());
    store
        .save(&store_key("small"), 9, chrono::Duration::days(1))
        .unwrap();
    let registry = Registry::new(store);

    let controller = registry.create("small", idle().with_top(5)).await.unwrap();
    assert_eq!(controller.current_gear().await, 5);
}

#[tokio::test(start_paused = true)]
async fn destroy_stops_and_forgets() {
    let registry = Registry::in_memory();
    let controller = registry
        .create("doomed", GearboxConfig::default())
        .await
        .unwrap();
    assert_eq!(controller.status().await, Status::Started);

    assert!(registry.destroy("doomed").await);
    assert_eq!(controller.status().await, Status::Stopped);
    assert!(registry.get("doomed").await.is_none());
    assert!(!registry.destroy("doomed").await);
    assert!(registry.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn all_applies_an_operation_to_every_instance() {
    let registry = Registry::in_memory();
    registry.create("a", idle()).await.unwrap();
    registry.create("b", idle().with_top(1)).await.unwrap();

    let shifted = registry.all(RegistryOp::ShiftUp).await;
    assert_eq!(shifted["a"], OpOutcome::Flag(true));
    assert_eq!(shifted["b"], OpOutcome::Flag(false));

    let gears = registry.all(RegistryOp::CurrentGear).await;
    assert_eq!(
        gears,
        BTreeMap::from([
            ("a".to_string(), OpOutcome::Gear(2)),
            ("b".to_string(), OpOutcome::Gear(1)),
        ])
    );

    let started = registry.all(RegistryOp::Start).await;
    assert!(started.values().all(|outcome| *outcome == OpOutcome::Flag(true)));
    registry.all(RegistryOp::Stop).await;
    let restarted = registry.all(RegistryOp::Start).await;
    assert_eq!(restarted.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn save_writes_namespaced_keys() {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(store.clone());
    let a = registry.create("a", idle()).await.unwrap();
    registry.create("b", idle()).await.unwrap();
    a.shift_up().await;

    assert_eq!(registry.save(Some("a")).await.unwrap(), 1);
    assert_eq!(store.load("gearbox_a").unwrap(), Some(2));
    assert_eq!(store.load("gearbox_b").unwrap(), None);

    assert!(matches!(
        registry.save(Some("missing")).await,
        Err(GearboxError::NotFound(_))
    ));

    assert_eq!(registry.save(None).await.unwrap(), 2);
    assert_eq!(store.load("gearbox_b").unwrap(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn file_backed_gears_survive_a_new_registry() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        store: StoreSettings::File {
            path: dir.path().join("gears.json"),
        },
        instances: BTreeMap::from([("poller".to_string(), idle())]),
        ..Settings::default()
    };

    let first = Registry::from_settings(&settings).await.unwrap();
    let poller = first.get("poller").await.unwrap();
    poller.shift_up().await;
    poller.shift_up().await;
    first.save(None).await.unwrap();
    first.destroy("poller").await;

    let second = Registry::from_settings(&settings).await.unwrap();
    let restored = second.get("poller").await.unwrap();
    assert_eq!(restored.current_gear().await, 3);
}
