//! Sysgraph Core - Hardware and logical topology model
//!
//! This crate provides:
//! - A component tree (nodes, chips, caches, NUMA regions, cores, qubits, ...)
//!   stored in an arena and addressed by [`ComponentId`] handles
//! - Typed relations between components (data paths, quantum gates,
//!   coupling maps) with bidirectional indexing
//! - Per-object attribute stores with pluggable XML handlers
//! - XML export and import of whole topologies

pub mod attrib;
pub mod component;
pub mod config;
mod edges;
pub mod error;
pub mod relation;
pub mod report;
pub mod topology;
pub mod xml;

pub use attrib::{AttribStore, AttribValue, OpaqueAttrib};
pub use component::{
    AtomSiteInfo, CacheInfo, ChipInfo, ChipType, Component, ComponentKind, ComponentType, MemoryInfo,
    QuantumBackendInfo, QubitInfo, SiteProperties, SubdivisionType,
};
pub use config::{EngineConfig, ExportConfig, ImportConfig};
pub use error::{ConfigError, RelationError, SpliceError, XmlError};
pub use relation::{
    DataPathDirection, DataPathInfo, DataPathOrientation, DataPathType, QuantumGateInfo,
    QuantumGateType, Relation, RelationKind, RelationType,
};
pub use report::TopologyStats;
pub use topology::{ComponentId, GraphEdge, GraphNode, RelationId, Topology, TopologyGraph};
pub use xml::{ExportHooks, ImportHooks, XmlElement};
