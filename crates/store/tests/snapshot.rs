use geo::{LineString, Point};
use geonet_protocol::{JsonMap, NewEdge, NewNetwork, NewNode, TaskType};
use geonet_store::{
    MemoryRepository, NetworkStore, StoreError, TaskResultStore, REPOSITORY_SCHEMA_VERSION,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn seeded() -> MemoryRepository {
    let repo = MemoryRepository::new();
    let network = repo
        .create_network(NewNetwork {
            project_id: 3,
            name: "power".into(),
            category: "energy".into(),
            vector_data_id: Some(17),
            metadata: JsonMap::new(),
        })
        .unwrap();
    let nodes = repo
        .bulk_create_nodes(
            network.id,
            vec![
                NewNode {
                    name: "substation".into(),
                    location: Point::new(-71.0, 42.0),
                    metadata: JsonMap::new(),
                },
                NewNode {
                    name: String::new(),
                    location: Point::new(-71.001, 42.0),
                    metadata: JsonMap::new(),
                },
            ],
        )
        .unwrap();
    repo.bulk_create_edges(
        network.id,
        vec![NewEdge {
            name: "feeder".into(),
            line: LineString::from(vec![(-71.0, 42.0), (-71.001, 42.0)]),
            metadata: JsonMap::new(),
            from_node: nodes[0].id,
            to_node: nodes[1].id,
        }],
    )
    .unwrap();
    repo.create_task_result(3, "Flood", TaskType::FloodSimulation, JsonMap::new())
        .unwrap();
    repo
}

#[tokio::test]
async fn snapshot_round_trips_records() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state").join("repository.json");
    let repo = seeded();
    repo.save(&path).await.unwrap();

    let loaded = MemoryRepository::load(&path).await.unwrap();
    let network = loaded.list_networks(3).unwrap().remove(0);
    assert_eq!(network.vector_data_id, Some(17));
    assert_eq!(
        loaded.network_nodes(network.id).unwrap(),
        repo.network_nodes(network.id).unwrap()
    );
    assert_eq!(
        loaded.network_edges(network.id).unwrap(),
        repo.network_edges(network.id).unwrap()
    );
    assert_eq!(loaded.list_task_results(3, None).unwrap().len(), 1);

    // Ids keep growing after a reload.
    let next = loaded
        .create_task_result(3, "Next", TaskType::NetworkRecovery, JsonMap::new())
        .unwrap();
    assert!(next.id > network.id);
}

#[tokio::test]
async fn missing_snapshot_starts_empty() {
    let temp = TempDir::new().unwrap();
    let repo = MemoryRepository::load_or_default(temp.path().join("absent.json"))
        .await
        .unwrap();
    assert!(repo.list_networks(1).unwrap().is_empty());
}

#[tokio::test]
async fn rejects_foreign_schema_version() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("repository.json");
    let bogus = serde_json::json!({
        "schema_version": REPOSITORY_SCHEMA_VERSION + 1,
        "saved_unix_ms": 0,
        "state": {
            "next_id": 0,
            "networks": {}, "nodes": {}, "edges": {}, "datasets": {}, "rasters": {},
            "vectors": {}, "features": {}, "task_results": {}, "charts": {}
        }
    });
    tokio::fs::write(&path, serde_json::to_vec(&bogus).unwrap())
        .await
        .unwrap();

    let err = MemoryRepository::load(&path).await.unwrap_err();
    assert!(matches!(err, StoreError::SchemaVersion { .. }));
}
