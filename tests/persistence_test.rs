mod common;

use common::{FakeTransport, COFFEE_UID, TEA_UID};
use pretty_assertions::assert_eq;
use splashcup_link::registry::DRINKS_KEY;
use splashcup_link::{default_drinks, DrinkRegistry, FileStore, LoadSource, Store};
use std::sync::Arc;

async fn registry_in(dir: &std::path::Path) -> DrinkRegistry {
    let registry = DrinkRegistry::new(Arc::new(FileStore::new(dir)));
    registry.load().await;
    registry
}

#[tokio::test]
async fn test_edits_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let registry = registry_in(dir.path()).await;
    assert_eq!(registry.load_source(), Some(LoadSource::FirstRun));
    registry.update(TEA_UID, 71.5).await.unwrap();
    drop(registry);

    let registry = registry_in(dir.path()).await;
    assert_eq!(registry.load_source(), Some(LoadSource::Stored));
    assert_eq!(registry.get(TEA_UID).unwrap().target_temperature, 71.5);
    assert_eq!(registry.get(COFFEE_UID).unwrap().target_temperature, 60.0);

    let names: Vec<_> = registry.all().into_iter().map(|d| d.name).collect();
    let default_names: Vec<_> = default_drinks().into_iter().map(|d| d.name).collect();
    assert_eq!(names, default_names);
}

#[tokio::test]
async fn test_corrupt_file_is_repaired_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.set(DRINKS_KEY, "{ definitely not a list").await.unwrap();

    let registry = registry_in(dir.path()).await;
    assert_eq!(registry.load_source(), Some(LoadSource::Repaired));
    assert_eq!(registry.all(), default_drinks());

    let raw = store.get(DRINKS_KEY).await.unwrap().unwrap();
    let on_disk: Vec<splashcup_link::DrinkProfile> = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk, default_drinks());
}

#[tokio::test]
async fn test_client_loads_persisted_drinks() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = registry_in(dir.path()).await;
        registry.update(COFFEE_UID, 66.0).await.unwrap();
    }

    let (transport, _devices) = FakeTransport::new();
    transport.set_refuse(true);
    let client = splashcup_link::CupClient::start_with(
        splashcup_link::ClientConfig::new("cup.test"),
        transport,
        Arc::new(FileStore::new(dir.path())),
        Arc::new(splashcup_link::LogNotifier),
    )
    .await
    .unwrap();

    assert_eq!(client.drinks()[0].target_temperature, 66.0);
    client.shutdown().await.unwrap();
}
