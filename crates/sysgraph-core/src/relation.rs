//! Relation edges layered over the component tree
//!
//! A [`Relation`] links 1..N components without owning them. The edge type
//! is fixed by its payload ([`RelationKind`]); participant lists are edited
//! through [`Topology`](crate::Topology) so that every participant's
//! [`RelationBuckets`] stays in sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::attrib::AttribStore;
use crate::topology::{ComponentId, RelationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Relation,
    DataPath,
    QuantumGate,
    CouplingMap,
}

impl RelationType {
    pub const COUNT: usize = 4;

    pub const ALL: [RelationType; Self::COUNT] = [
        RelationType::Relation,
        RelationType::DataPath,
        RelationType::QuantumGate,
        RelationType::CouplingMap,
    ];

    pub fn index(self) -> usize {
        match self {
            RelationType::Relation => 0,
            RelationType::DataPath => 1,
            RelationType::QuantumGate => 2,
            RelationType::CouplingMap => 3,
        }
    }

    /// Element name in XML documents.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Relation => "Relation",
            RelationType::DataPath => "DataPath",
            RelationType::QuantumGate => "QuantumGate",
            RelationType::CouplingMap => "CouplingMap",
        }
    }

    pub fn from_element(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// True when `filter` is `None` (any type) or equal to `self`.
    pub(crate) fn matches(self, filter: Option<RelationType>) -> bool {
        filter.map_or(true, |f| f == self)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-component lists of the relations it participates in, one per type.
///
/// A list is only allocated the first time an edge of that type touches the
/// component. Each relation appears at most once per list, also when the
/// component occupies several positions of the same edge.
#[derive(Debug, Default)]
pub struct RelationBuckets {
    buckets: [Option<Vec<RelationId>>; RelationType::COUNT],
}

impl RelationBuckets {
    pub fn get(&self, relation_type: RelationType) -> &[RelationId] {
        self.buckets[relation_type.index()]
            .as_deref()
            .unwrap_or_default()
    }

    pub fn is_allocated(&self, relation_type: RelationType) -> bool {
        self.buckets[relation_type.index()].is_some()
    }

    pub(crate) fn register(&mut self, relation_type: RelationType, id: RelationId) -> bool {
        let bucket = self.buckets[relation_type.index()].get_or_insert_with(Vec::new);
        if bucket.contains(&id) {
            return false;
        }
        bucket.push(id);
        true
    }

    pub(crate) fn deregister(&mut self, relation_type: RelationType, id: RelationId) {
        if let Some(bucket) = self.buckets[relation_type.index()].as_mut() {
            bucket.retain(|r| *r != id);
        }
    }

    /// Every relation of every type, in type order.
    pub fn iter(&self) -> impl Iterator<Item = (RelationType, RelationId)> + '_ {
        RelationType::ALL
            .into_iter()
            .flat_map(move |rt| self.get(rt).iter().map(move |id| (rt, *id)))
    }
}

/// Sub-type tag of a data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataPathType {
    #[default]
    None,
    Logical,
    Physical,
    Datatransfer,
    L3Cat,
    Mig,
    C2C,
    Custom(i32),
}

impl DataPathType {
    pub fn code(self) -> i32 {
        match self {
            DataPathType::None => 0,
            DataPathType::Logical => 1,
            DataPathType::Physical => 2,
            DataPathType::Datatransfer => 3,
            DataPathType::L3Cat => 4,
            DataPathType::Mig => 5,
            DataPathType::C2C => 6,
            DataPathType::Custom(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DataPathType::None,
            1 => DataPathType::Logical,
            2 => DataPathType::Physical,
            3 => DataPathType::Datatransfer,
            4 => DataPathType::L3Cat,
            5 => DataPathType::Mig,
            6 => DataPathType::C2C,
            other => DataPathType::Custom(other),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataPathType::None => "None",
            DataPathType::Logical => "Logical",
            DataPathType::Physical => "Physical",
            DataPathType::Datatransfer => "Datatransfer",
            DataPathType::L3Cat => "L3CAT",
            DataPathType::Mig => "MIG",
            DataPathType::C2C => "C2C",
            DataPathType::Custom(_) => "Custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataPathDirection {
    Any,
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataPathOrientation {
    Oriented,
    Bidirectional,
}

impl DataPathOrientation {
    pub fn is_ordered(self) -> bool {
        matches!(self, DataPathOrientation::Oriented)
    }

    pub fn from_ordered(ordered: bool) -> Self {
        if ordered {
            DataPathOrientation::Oriented
        } else {
            DataPathOrientation::Bidirectional
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuantumGateType {
    #[default]
    Unknown,
    Id,
    X,
    Rz,
    Cnot,
    Sx,
    Toffoli,
}

impl QuantumGateType {
    /// Derive the gate class from its declared name and qubit count.
    pub fn classify(name: &str, gate_size: usize) -> Self {
        match (gate_size, name) {
            (1, "id") => QuantumGateType::Id,
            (1, "rz") => QuantumGateType::Rz,
            (1, "sx") => QuantumGateType::Sx,
            (1, "x") => QuantumGateType::X,
            (2, "cx") => QuantumGateType::Cnot,
            (n, "toffoli") if n > 2 => QuantumGateType::Toffoli,
            _ => QuantumGateType::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            QuantumGateType::Unknown => 0,
            QuantumGateType::Id => 1,
            QuantumGateType::X => 2,
            QuantumGateType::Rz => 3,
            QuantumGateType::Cnot => 4,
            QuantumGateType::Sx => 5,
            QuantumGateType::Toffoli => 6,
        }
    }
}

/// Bandwidth/latency payload. `-1.0` means "not measured".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPathInfo {
    /// What the path represents (physical link, CAT partition, MIG slice, ...)
    pub dp_type: DataPathType,
    /// Bandwidth, in the unit of the source that measured it
    pub bandwidth: f64,
    /// Latency, in the unit of the source that measured it
    pub latency: f64,
}

impl Default for DataPathInfo {
    fn default() -> Self {
        Self {
            dp_type: DataPathType::None,
            bandwidth: -1.0,
            latency: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumGateInfo {
    /// Number of qubits the gate acts on
    pub gate_size: usize,
    /// Backend gate name ("x", "cx", "rz", ...)
    name: String,
    /// Derived from `name` and `gate_size`
    gate_type: QuantumGateType,
    /// Average gate fidelity, 0..=1
    pub fidelity: f64,
    /// Unitary matrix in the backend's textual form; may be empty
    pub unitary: String,
    /// Gate duration, in nanoseconds
    pub gate_length: f64,
}

impl QuantumGateInfo {
    pub fn new(gate_size: usize, name: impl Into<String>, fidelity: f64, unitary: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            gate_type: QuantumGateType::classify(&name, gate_size),
            gate_size,
            name,
            fidelity,
            unitary: unitary.into(),
            gate_length: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gate_type(&self) -> QuantumGateType {
        self.gate_type
    }

    /// Replace name, fidelity and unitary; the gate class is recomputed.
    pub fn set_gate_properties(&mut self, name: impl Into<String>, fidelity: f64, unitary: impl Into<String>) {
        self.name = name.into();
        self.fidelity = fidelity;
        self.unitary = unitary.into();
        self.gate_type = QuantumGateType::classify(&self.name, self.gate_size);
    }
}

/// Edge type tag plus type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelationKind {
    Generic,
    DataPath(DataPathInfo),
    QuantumGate(QuantumGateInfo),
    CouplingMap { fidelity: f64 },
}

impl RelationKind {
    pub fn relation_type(&self) -> RelationType {
        match self {
            RelationKind::Generic => RelationType::Relation,
            RelationKind::DataPath(_) => RelationType::DataPath,
            RelationKind::QuantumGate(_) => RelationType::QuantumGate,
            RelationKind::CouplingMap { .. } => RelationType::CouplingMap,
        }
    }
}

/// An n-ary edge between components.
#[derive(Debug)]
pub struct Relation {
    id: i32,
    ordered: bool,
    kind: RelationKind,
    pub(crate) components: Vec<ComponentId>,
    pub attrib: AttribStore,
}

impl Relation {
    pub(crate) fn new(kind: RelationKind, id: i32, ordered: bool) -> Self {
        Self {
            id,
            ordered,
            kind,
            components: Vec::new(),
            attrib: AttribStore::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn relation_type(&self) -> RelationType {
        self.kind.relation_type()
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Participant at `index`; out-of-range access is logged and yields `None`.
    pub fn component(&self, index: usize) -> Option<ComponentId> {
        let found = self.components.get(index).copied();
        if found.is_none() {
            warn!(
                relation = self.id,
                index,
                len = self.components.len(),
                "Relation participant index out of range"
            );
        }
        found
    }

    pub fn contains_component(&self, c: ComponentId) -> bool {
        self.components.contains(&c)
    }

    /// Position-0 participant of a data path.
    pub fn source(&self) -> Option<ComponentId> {
        self.component(0)
    }

    /// Position-1 participant of a data path.
    pub fn target(&self) -> Option<ComponentId> {
        self.component(1)
    }

    pub fn orientation(&self) -> DataPathOrientation {
        DataPathOrientation::from_ordered(self.ordered)
    }

    pub fn as_data_path(&self) -> Option<&DataPathInfo> {
        match &self.kind {
            RelationKind::DataPath(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_data_path_mut(&mut self) -> Option<&mut DataPathInfo> {
        match &mut self.kind {
            RelationKind::DataPath(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_quantum_gate(&self) -> Option<&QuantumGateInfo> {
        match &self.kind {
            RelationKind::QuantumGate(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_quantum_gate_mut(&mut self) -> Option<&mut QuantumGateInfo> {
        match &mut self.kind {
            RelationKind::QuantumGate(info) => Some(info),
            _ => None,
        }
    }

    pub fn coupling_fidelity(&self) -> Option<f64> {
        match self.kind {
            RelationKind::CouplingMap { fidelity } => Some(fidelity),
            _ => None,
        }
    }

    pub fn set_coupling_fidelity(&mut self, value: f64) -> bool {
        match &mut self.kind {
            RelationKind::CouplingMap { fidelity } => {
                *fidelity = value;
                true
            }
            _ => false,
        }
    }

    /// Data-path sub-type, or `None` for other edge types.
    pub fn data_path_type(&self) -> Option<DataPathType> {
        self.as_data_path().map(|dp| dp.dp_type)
    }
}
