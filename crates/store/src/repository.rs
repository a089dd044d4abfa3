use crate::error::{Result, StoreError};
use geonet_protocol::{
    current_unix_ms, Chart, ChartId, Dataset, DatasetId, GeometryFeature, JsonMap, Network,
    NetworkEdge, NetworkId, NetworkNode, NewChart, NewDataset, NewEdge, NewNetwork, NewNode,
    NewRasterData, NewVectorData, NodeId, ProjectId, RasterData, RasterId, TaskResult,
    TaskResultId, TaskType, VectorData, VectorFeature, VectorId, INITIAL_STATUS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const REPOSITORY_SCHEMA_VERSION: u32 = 1;

pub trait NetworkStore: Send + Sync {
    fn create_network(&self, network: NewNetwork) -> Result<Network>;

    fn get_network(&self, id: NetworkId) -> Result<Network>;

    fn list_networks(&self, project_id: ProjectId) -> Result<Vec<Network>>;

    /// Removes the network together with all its nodes and edges.
    fn delete_network(&self, id: NetworkId) -> Result<()>;

    fn bulk_create_nodes(&self, network_id: NetworkId, nodes: Vec<NewNode>)
        -> Result<Vec<NetworkNode>>;

    /// Fails with `InvalidReference` if any endpoint is not a node of `network_id`;
    /// nothing is written in that case.
    fn bulk_create_edges(&self, network_id: NetworkId, edges: Vec<NewEdge>)
        -> Result<Vec<NetworkEdge>>;

    /// Nodes ordered by id.
    fn network_nodes(&self, network_id: NetworkId) -> Result<Vec<NetworkNode>>;

    /// Edges ordered by id.
    fn network_edges(&self, network_id: NetworkId) -> Result<Vec<NetworkEdge>>;

    /// Drop every node and edge but keep the network record.
    fn clear_network(&self, network_id: NetworkId) -> Result<()>;
}

pub trait DatasetStore: Send + Sync {
    fn create_dataset(&self, dataset: NewDataset) -> Result<Dataset>;

    fn get_dataset(&self, id: DatasetId) -> Result<Dataset>;

    fn list_datasets(&self, project_id: ProjectId) -> Result<Vec<Dataset>>;

    fn create_raster(&self, raster: NewRasterData) -> Result<RasterData>;

    fn rasters_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<RasterData>>;

    fn create_vector(&self, vector: NewVectorData) -> Result<VectorData>;

    fn get_vector(&self, id: VectorId) -> Result<VectorData>;

    fn vectors_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<VectorData>>;

    fn bulk_create_vector_features(
        &self,
        vector_data_id: VectorId,
        features: Vec<GeometryFeature>,
    ) -> Result<usize>;

    fn vector_features(&self, vector_data_id: VectorId) -> Result<Vec<VectorFeature>>;
}

pub trait TaskResultStore: Send + Sync {
    /// Insert a fresh row in the initial state.
    fn create_task_result(
        &self,
        project_id: ProjectId,
        name: &str,
        task_type: TaskType,
        inputs: JsonMap,
    ) -> Result<TaskResult>;

    /// Overwrite the stored row with `result`.
    fn save_task_result(&self, result: &TaskResult) -> Result<()>;

    fn get_task_result(&self, id: TaskResultId) -> Result<TaskResult>;

    fn list_task_results(
        &self,
        project_id: ProjectId,
        task_type: Option<TaskType>,
    ) -> Result<Vec<TaskResult>>;
}

pub trait ChartStore: Send + Sync {
    fn create_chart(&self, chart: NewChart) -> Result<Chart>;

    fn get_chart(&self, id: ChartId) -> Result<Chart>;
}

/// Everything the pipeline persists.
pub trait Repository: NetworkStore + DatasetStore + TaskResultStore + ChartStore {}

impl<T> Repository for T where T: NetworkStore + DatasetStore + TaskResultStore + ChartStore {}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RepositoryState {
    next_id: u64,
    networks: BTreeMap<NetworkId, Network>,
    nodes: BTreeMap<NodeId, NetworkNode>,
    edges: BTreeMap<u64, NetworkEdge>,
    datasets: BTreeMap<DatasetId, Dataset>,
    rasters: BTreeMap<RasterId, RasterData>,
    vectors: BTreeMap<VectorId, VectorData>,
    features: BTreeMap<u64, VectorFeature>,
    task_results: BTreeMap<TaskResultId, TaskResult>,
    charts: BTreeMap<ChartId, Chart>,
}

impl RepositoryState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_network(&self, id: NetworkId) -> Result<()> {
        if self.networks.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("network {id}")))
        }
    }

    fn remove_network_contents(&mut self, id: NetworkId) {
        self.nodes.retain(|_, node| node.network_id != id);
        self.edges.retain(|_, edge| edge.network_id != id);
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRepository {
    schema_version: u32,
    saved_unix_ms: u64,
    state: RepositoryState,
}

/// In-process repository; one id sequence shared by every record kind.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<RepositoryState>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, RepositoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Other("repository lock poisoned".to_string()))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let persisted: PersistedRepository = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != REPOSITORY_SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                found: persisted.schema_version,
                expected: REPOSITORY_SCHEMA_VERSION,
            });
        }
        log::debug!(
            "Loaded repository snapshot saved at {} ({} networks, {} task results)",
            persisted.saved_unix_ms,
            persisted.state.networks.len(),
            persisted.state.task_results.len()
        );
        Ok(Self {
            state: Mutex::new(persisted.state),
        })
    }

    /// Load the snapshot at `path`, or start empty when it does not exist yet.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            log::debug!("No repository snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        Self::load(path).await
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedRepository {
            schema_version: REPOSITORY_SCHEMA_VERSION,
            saved_unix_ms: current_unix_ms(),
            state: self.state()?.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

impl NetworkStore for MemoryRepository {
    fn create_network(&self, network: NewNetwork) -> Result<Network> {
        let mut state = self.state()?;
        let id = state.allocate();
        let record = Network {
            id,
            project_id: network.project_id,
            name: network.name,
            category: network.category,
            vector_data_id: network.vector_data_id,
            metadata: network.metadata,
        };
        state.networks.insert(id, record.clone());
        Ok(record)
    }

    fn get_network(&self, id: NetworkId) -> Result<Network> {
        self.state()?
            .networks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("network {id}")))
    }

    fn list_networks(&self, project_id: ProjectId) -> Result<Vec<Network>> {
        Ok(self
            .state()?
            .networks
            .values()
            .filter(|network| network.project_id == project_id)
            .cloned()
            .collect())
    }

    fn delete_network(&self, id: NetworkId) -> Result<()> {
        let mut state = self.state()?;
        if state.networks.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("network {id}")));
        }
        state.remove_network_contents(id);
        Ok(())
    }

    fn bulk_create_nodes(
        &self,
        network_id: NetworkId,
        nodes: Vec<NewNode>,
    ) -> Result<Vec<NetworkNode>> {
        let mut state = self.state()?;
        state.require_network(network_id)?;
        let mut created = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = state.allocate();
            let record = NetworkNode {
                id,
                network_id,
                name: node.name,
                location: node.location,
                metadata: node.metadata,
            };
            state.nodes.insert(id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    fn bulk_create_edges(
        &self,
        network_id: NetworkId,
        edges: Vec<NewEdge>,
    ) -> Result<Vec<NetworkEdge>> {
        let mut state = self.state()?;
        state.require_network(network_id)?;
        let belongs = |id: NodeId| {
            state
                .nodes
                .get(&id)
                .is_some_and(|node| node.network_id == network_id)
        };
        if let Some(edge) = edges
            .iter()
            .find(|edge| !belongs(edge.from_node) || !belongs(edge.to_node))
        {
            return Err(StoreError::InvalidReference(format!(
                "edge {:?} references nodes {} -> {} outside network {network_id}",
                edge.name, edge.from_node, edge.to_node
            )));
        }

        let mut created = Vec::with_capacity(edges.len());
        for edge in edges {
            let id = state.allocate();
            let record = NetworkEdge {
                id,
                network_id,
                name: edge.name,
                line: edge.line,
                metadata: edge.metadata,
                from_node: edge.from_node,
                to_node: edge.to_node,
            };
            state.edges.insert(id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    fn network_nodes(&self, network_id: NetworkId) -> Result<Vec<NetworkNode>> {
        let state = self.state()?;
        state.require_network(network_id)?;
        Ok(state
            .nodes
            .values()
            .filter(|node| node.network_id == network_id)
            .cloned()
            .collect())
    }

    fn network_edges(&self, network_id: NetworkId) -> Result<Vec<NetworkEdge>> {
        let state = self.state()?;
        state.require_network(network_id)?;
        Ok(state
            .edges
            .values()
            .filter(|edge| edge.network_id == network_id)
            .cloned()
            .collect())
    }

    fn clear_network(&self, network_id: NetworkId) -> Result<()> {
        let mut state = self.state()?;
        state.require_network(network_id)?;
        state.remove_network_contents(network_id);
        Ok(())
    }
}

impl DatasetStore for MemoryRepository {
    fn create_dataset(&self, dataset: NewDataset) -> Result<Dataset> {
        let mut state = self.state()?;
        let id = state.allocate();
        let record = Dataset {
            id,
            project_id: dataset.project_id,
            name: dataset.name,
            category: dataset.category,
            description: dataset.description,
            metadata: dataset.metadata,
        };
        state.datasets.insert(id, record.clone());
        Ok(record)
    }

    fn get_dataset(&self, id: DatasetId) -> Result<Dataset> {
        self.state()?
            .datasets
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("dataset {id}")))
    }

    fn list_datasets(&self, project_id: ProjectId) -> Result<Vec<Dataset>> {
        Ok(self
            .state()?
            .datasets
            .values()
            .filter(|dataset| dataset.project_id == project_id)
            .cloned()
            .collect())
    }

    fn create_raster(&self, raster: NewRasterData) -> Result<RasterData> {
        let mut state = self.state()?;
        if !state.datasets.contains_key(&raster.dataset_id) {
            return Err(StoreError::InvalidReference(format!(
                "dataset {}",
                raster.dataset_id
            )));
        }
        let id = state.allocate();
        let record = RasterData {
            id,
            dataset_id: raster.dataset_id,
            name: raster.name,
            blob_prefix: raster.blob_prefix,
            header: raster.header,
            metadata: raster.metadata,
        };
        state.rasters.insert(id, record.clone());
        Ok(record)
    }

    fn rasters_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<RasterData>> {
        Ok(self
            .state()?
            .rasters
            .values()
            .filter(|raster| raster.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    fn create_vector(&self, vector: NewVectorData) -> Result<VectorData> {
        let mut state = self.state()?;
        if !state.datasets.contains_key(&vector.dataset_id) {
            return Err(StoreError::InvalidReference(format!(
                "dataset {}",
                vector.dataset_id
            )));
        }
        let id = state.allocate();
        let record = VectorData {
            id,
            dataset_id: vector.dataset_id,
            name: vector.name,
            blob_key: vector.blob_key,
            metadata: vector.metadata,
        };
        state.vectors.insert(id, record.clone());
        Ok(record)
    }

    fn get_vector(&self, id: VectorId) -> Result<VectorData> {
        self.state()?
            .vectors
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("vector data {id}")))
    }

    fn vectors_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<VectorData>> {
        Ok(self
            .state()?
            .vectors
            .values()
            .filter(|vector| vector.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    fn bulk_create_vector_features(
        &self,
        vector_data_id: VectorId,
        features: Vec<GeometryFeature>,
    ) -> Result<usize> {
        let mut state = self.state()?;
        if !state.vectors.contains_key(&vector_data_id) {
            return Err(StoreError::InvalidReference(format!(
                "vector data {vector_data_id}"
            )));
        }
        let count = features.len();
        for feature in features {
            let id = state.allocate();
            state.features.insert(
                id,
                VectorFeature {
                    id,
                    vector_data_id,
                    geometry: feature.geometry,
                    properties: feature.properties,
                },
            );
        }
        Ok(count)
    }

    fn vector_features(&self, vector_data_id: VectorId) -> Result<Vec<VectorFeature>> {
        Ok(self
            .state()?
            .features
            .values()
            .filter(|feature| feature.vector_data_id == vector_data_id)
            .cloned()
            .collect())
    }
}

impl TaskResultStore for MemoryRepository {
    fn create_task_result(
        &self,
        project_id: ProjectId,
        name: &str,
        task_type: TaskType,
        inputs: JsonMap,
    ) -> Result<TaskResult> {
        let mut state = self.state()?;
        let id = state.allocate();
        let record = TaskResult {
            id,
            project_id,
            name: name.to_string(),
            task_type,
            inputs,
            outputs: None,
            status: INITIAL_STATUS.to_string(),
            error: None,
            created_unix_ms: current_unix_ms(),
            completed_unix_ms: None,
        };
        state.task_results.insert(id, record.clone());
        Ok(record)
    }

    fn save_task_result(&self, result: &TaskResult) -> Result<()> {
        let mut state = self.state()?;
        match state.task_results.get_mut(&result.id) {
            Some(stored) => {
                *stored = result.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("task result {}", result.id))),
        }
    }

    fn get_task_result(&self, id: TaskResultId) -> Result<TaskResult> {
        self.state()?
            .task_results
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("task result {id}")))
    }

    fn list_task_results(
        &self,
        project_id: ProjectId,
        task_type: Option<TaskType>,
    ) -> Result<Vec<TaskResult>> {
        Ok(self
            .state()?
            .task_results
            .values()
            .filter(|result| result.project_id == project_id)
            .filter(|result| task_type.map_or(true, |t| result.task_type == t))
            .cloned()
            .collect())
    }
}

impl ChartStore for MemoryRepository {
    fn create_chart(&self, chart: NewChart) -> Result<Chart> {
        let mut state = self.state()?;
        let id = state.allocate();
        let record = Chart {
            id,
            project_id: chart.project_id,
            name: chart.name,
            description: chart.description,
            chart_data: chart.chart_data,
            metadata: chart.metadata,
        };
        state.charts.insert(id, record.clone());
        Ok(record)
    }

    fn get_chart(&self, id: ChartId) -> Result<Chart> {
        self.state()?
            .charts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("chart {id}")))
    }
}
