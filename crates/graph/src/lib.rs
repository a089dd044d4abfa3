//! # Geonet Graph
//!
//! Connectivity and centrality over a network's nodes and edges.
//!
//! ## Architecture
//!
//! ```text
//! NetworkNode[] + NetworkEdge[]
//!     │
//!     ├──> NetworkGraph::from_records (petgraph UnGraph, ascending node ids)
//!     │
//!     ├──> build_adjacency / greatest_connected_component(excluded)
//!     │
//!     └──> centrality_scores / centrality_ranking(measure)
//!            ├─ path based: betweenness, load, closeness
//!            ├─ spectral: eigenvector (power iteration)
//!            └─ per component linear systems (nalgebra): information, second_order
//! ```

mod builder;
mod centrality;
mod error;
mod graph;
mod types;

pub use error::{GraphError, Result};
pub use types::{CentralityMeasure, NetworkGraph};
