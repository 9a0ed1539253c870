use domain::WeightReading;
use scale_config::DatabaseKind;
use scale_storage::{InMemoryScaleStore, ReadingStore, open_store};

fn reading(weight: f64) -> WeightReading {
    WeightReading {
        device_id: "ADAM-4571-Scale".to_string(),
        weight: Some(weight),
        unit: Some("kg".to_string()),
        stable: Some(true),
        timestamp: domain::now_utc(),
        raw_data: format!("ST,GS,{weight:>8.2}kg"),
    }
}

async fn assert_newest_first(store: &dyn ReadingStore) {
    for weight in [1.0, 2.5, 5.0] {
        store.save_reading(&reading(weight)).await.expect("save");
    }
    let recent = store.recent_readings(2).await.expect("query");
    let weights: Vec<_> = recent.iter().map(|r| r.weight).collect();
    assert_eq!(weights, vec![Some(5.0), Some(2.5)]);
    assert_eq!(recent[0].unit.as_deref(), Some("kg"));
    assert_eq!(recent[0].stable, Some(true));
    assert!(store.recent_readings(0).await.expect("query").is_empty());
}

#[tokio::test]
async fn in_memory_readings() {
    let store = InMemoryScaleStore::new();
    assert_newest_first(&store).await;
    assert_eq!(store.reading_count(), 3);
}

#[tokio::test]
async fn sqlite_readings() {
    let store = open_store(DatabaseKind::Sqlite, "sqlite::memory:")
        .await
        .expect("sqlite");
    assert_newest_first(store.as_ref()).await;

    let empty = WeightReading {
        weight: None,
        unit: None,
        stable: None,
        ..reading(0.0)
    };
    store.save_reading(&empty).await.expect("save nulls");
    let latest = store.recent_readings(1).await.expect("query");
    assert_eq!(latest[0].weight, None);
    assert_eq!(latest[0].stable, None);
    store.close().await;
}

#[tokio::test]
async fn memory_backend_from_factory() {
    let store = open_store(DatabaseKind::Memory, "").await.expect("memory");
    assert_eq!(store.backend(), "memory");
    store.save_reading(&reading(1.0)).await.expect("save");
    assert_eq!(store.recent_readings(10).await.expect("query").len(), 1);
}
