//! Component types and per-type payloads
//!
//! A [`Component`] is one node of the ownership tree. Its type is fixed at
//! construction: the payload enum [`ComponentKind`] is private to the
//! component and only its variant-specific fields can be edited afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::attrib::AttribStore;
use crate::relation::RelationBuckets;
use crate::topology::ComponentId;

/// Type tag of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Generic,
    Thread,
    Core,
    Cache,
    Subdivision,
    Numa,
    Chip,
    Memory,
    Storage,
    Node,
    QuantumBackend,
    AtomSite,
    Qubit,
    Topology,
}

impl ComponentType {
    pub const ALL: [ComponentType; 14] = [
        ComponentType::Generic,
        ComponentType::Thread,
        ComponentType::Core,
        ComponentType::Cache,
        ComponentType::Subdivision,
        ComponentType::Numa,
        ComponentType::Chip,
        ComponentType::Memory,
        ComponentType::Storage,
        ComponentType::Node,
        ComponentType::QuantumBackend,
        ComponentType::AtomSite,
        ComponentType::Qubit,
        ComponentType::Topology,
    ];

    /// Stable numeric code of the type.
    pub fn code(self) -> i32 {
        match self {
            ComponentType::Generic => 1,
            ComponentType::Thread => 2,
            ComponentType::Core => 3,
            ComponentType::Cache => 4,
            ComponentType::Subdivision => 5,
            ComponentType::Numa => 6,
            ComponentType::Chip => 7,
            ComponentType::Memory => 8,
            ComponentType::Storage => 9,
            ComponentType::Node => 10,
            ComponentType::QuantumBackend => 11,
            ComponentType::AtomSite => 12,
            ComponentType::Qubit => 13,
            ComponentType::Topology => 14,
        }
    }

    /// Element name used in XML documents.
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Generic => "GenericComponent",
            ComponentType::Thread => "HW_Thread",
            ComponentType::Core => "Core",
            ComponentType::Cache => "Cache",
            ComponentType::Subdivision => "Subdivision",
            ComponentType::Numa => "NUMA",
            ComponentType::Chip => "Chip",
            ComponentType::Memory => "Memory",
            ComponentType::Storage => "Storage",
            ComponentType::Node => "Node",
            ComponentType::QuantumBackend => "QuantumBackend",
            ComponentType::AtomSite => "AtomSite",
            ComponentType::Qubit => "Qubit",
            ComponentType::Topology => "Topology",
        }
    }

    /// Resolve an XML element name; `None` is accepted as an alias of the
    /// generic element.
    pub fn from_element(name: &str) -> Option<Self> {
        if name == "None" {
            return Some(ComponentType::Generic);
        }
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Display name given to components built without an explicit one.
    pub fn default_name(self) -> &'static str {
        match self {
            ComponentType::Generic => "Component",
            ComponentType::Thread => "Thread",
            ComponentType::Numa => "Numa",
            ComponentType::Topology => "Topology",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChipType {
    #[default]
    None,
    Cpu,
    CpuSocket,
    Gpu,
    Other(i32),
}

impl ChipType {
    pub fn code(self) -> i32 {
        match self {
            ChipType::None => 1,
            ChipType::Cpu => 2,
            ChipType::CpuSocket => 3,
            ChipType::Gpu => 4,
            ChipType::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ChipType::None,
            2 => ChipType::Cpu,
            3 => ChipType::CpuSocket,
            4 => ChipType::Gpu,
            other => ChipType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubdivisionType {
    #[default]
    None,
    GpuSm,
    Other(i32),
}

impl SubdivisionType {
    pub fn code(self) -> i32 {
        match self {
            SubdivisionType::None => 1,
            SubdivisionType::GpuSm => 2,
            SubdivisionType::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SubdivisionType::None,
            2 => SubdivisionType::GpuSm,
            other => SubdivisionType::Other(other),
        }
    }
}

/// Cache geometry. Negative numbers mean "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Level ("1", "2", "3") or a named cache type ("L1", "texture").
    pub cache_type: String,
    /// Capacity in bytes
    pub size: i64,
    pub associativity_ways: i32,
    /// Line size in bytes
    pub line_size: i32,
}

impl CacheInfo {
    pub fn new(level: i32) -> Self {
        Self::named(level.to_string())
    }

    pub fn named(cache_type: impl Into<String>) -> Self {
        Self {
            cache_type: cache_type.into(),
            size: -1,
            associativity_ways: -1,
            line_size: -1,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_associativity_ways(mut self, ways: i32) -> Self {
        self.associativity_ways = ways;
        self
    }

    pub fn with_line_size(mut self, line_size: i32) -> Self {
        self.line_size = line_size;
        self
    }

    /// First digit of the cache type, or 0 when there is none.
    pub fn level(&self) -> i32 {
        self.cache_type
            .chars()
            .find_map(|c| c.to_digit(10))
            .map_or(0, |d| d as i32)
    }

    pub fn set_level(&mut self, level: i32) {
        self.cache_type = level.to_string();
    }
}

impl Default for CacheInfo {
    fn default() -> Self {
        Self::new(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipInfo {
    /// Vendor string as reported by the platform, e.g. "GenuineIntel"
    pub vendor: String,
    /// Model name; empty when unknown
    pub model: String,
    pub chip_type: ChipType,
}

impl ChipInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_chip_type(mut self, chip_type: ChipType) -> Self {
        self.chip_type = chip_type;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Capacity in bytes; -1 when unknown
    pub size: i64,
    /// False for persistent memory
    pub is_volatile: bool,
}

impl Default for MemoryInfo {
    fn default() -> Self {
        Self {
            size: -1,
            is_volatile: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantumBackendInfo {
    /// Qubits the backend exposes
    pub num_qubits: i32,
    /// Native gates the backend supports
    pub num_gates: i32,
}

/// Geometry of a neutral-atom trap array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteProperties {
    /// Trap rows
    pub n_rows: i32,
    /// Trap columns
    pub n_columns: i32,
    /// Acousto-optic deflectors available for shuttling
    pub n_aods: i32,
    pub n_aod_intermediate_levels: i32,
    pub n_aod_coordinates: i32,
    /// Spacing between neighbouring traps, in micrometres
    pub inter_qubit_distance: f64,
    /// Rydberg interaction radius, in units of `inter_qubit_distance`
    pub interaction_radius: f64,
    /// Restriction radius around an interacting pair, relative to `interaction_radius`
    pub blocking_factor: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomSiteInfo {
    pub backend: QuantumBackendInfo,
    pub properties: SiteProperties,
    /// Duration of each shuttling operation ("load", "move", "store"), in microseconds
    pub shuttling_times: BTreeMap<String, f64>,
    /// Average fidelity of each shuttling operation
    pub shuttling_average_fidelities: BTreeMap<String, f64>,
}

/// Calibration data of a single qubit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QubitInfo {
    /// Average single-qubit gate fidelity, 0..=1
    pub q1_fidelity: f64,
    /// T1 relaxation time, in microseconds as reported by the calibration
    pub t1: f64,
    /// T2 dephasing time, in microseconds
    pub t2: f64,
    /// Readout assignment fidelity, 0..=1
    pub readout_fidelity: f64,
    /// Readout pulse duration, in nanoseconds
    pub readout_length: f64,
    /// Qubit transition frequency, in GHz
    pub frequency: f64,
    /// Timestamp of the calibration run, kept verbatim
    pub calibration_time: String,
}

impl QubitInfo {
    pub fn set_properties(
        &mut self,
        t1: f64,
        t2: f64,
        readout_fidelity: f64,
        q1_fidelity: f64,
        readout_length: f64,
    ) {
        self.t1 = t1;
        self.t2 = t2;
        self.readout_fidelity = readout_fidelity;
        self.q1_fidelity = q1_fidelity;
        self.readout_length = readout_length;
    }
}

/// Type tag plus the fields specific to that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ComponentKind {
    Generic,
    Thread,
    Core,
    Cache(CacheInfo),
    Subdivision { subdivision_type: SubdivisionType },
    Numa { size: i64 },
    Chip(ChipInfo),
    Memory(MemoryInfo),
    Storage { size: i64 },
    Node,
    QuantumBackend(QuantumBackendInfo),
    AtomSite(AtomSiteInfo),
    Qubit(QubitInfo),
    Topology,
}

impl ComponentKind {
    /// Payload with default field values for the given type.
    pub fn default_for(component_type: ComponentType) -> Self {
        match component_type {
            ComponentType::Generic => ComponentKind::Generic,
            ComponentType::Thread => ComponentKind::Thread,
            ComponentType::Core => ComponentKind::Core,
            ComponentType::Cache => ComponentKind::Cache(CacheInfo::default()),
            ComponentType::Subdivision => ComponentKind::Subdivision {
                subdivision_type: SubdivisionType::None,
            },
            ComponentType::Numa => ComponentKind::Numa { size: -1 },
            ComponentType::Chip => ComponentKind::Chip(ChipInfo::default()),
            ComponentType::Memory => ComponentKind::Memory(MemoryInfo::default()),
            ComponentType::Storage => ComponentKind::Storage { size: -1 },
            ComponentType::Node => ComponentKind::Node,
            ComponentType::QuantumBackend => {
                ComponentKind::QuantumBackend(QuantumBackendInfo::default())
            }
            ComponentType::AtomSite => ComponentKind::AtomSite(AtomSiteInfo::default()),
            ComponentType::Qubit => ComponentKind::Qubit(QubitInfo::default()),
            ComponentType::Topology => ComponentKind::Topology,
        }
    }

    pub fn component_type(&self) -> ComponentType {
        match self {
            ComponentKind::Generic => ComponentType::Generic,
            ComponentKind::Thread => ComponentType::Thread,
            ComponentKind::Core => ComponentType::Core,
            ComponentKind::Cache(_) => ComponentType::Cache,
            ComponentKind::Subdivision { .. } => ComponentType::Subdivision,
            ComponentKind::Numa { .. } => ComponentType::Numa,
            ComponentKind::Chip(_) => ComponentType::Chip,
            ComponentKind::Memory(_) => ComponentType::Memory,
            ComponentKind::Storage { .. } => ComponentType::Storage,
            ComponentKind::Node => ComponentType::Node,
            ComponentKind::QuantumBackend(_) => ComponentType::QuantumBackend,
            ComponentKind::AtomSite(_) => ComponentType::AtomSite,
            ComponentKind::Qubit(_) => ComponentType::Qubit,
            ComponentKind::Topology => ComponentType::Topology,
        }
    }
}

/// A node of the component tree.
///
/// Tree links and relation buckets are maintained by
/// [`Topology`](crate::Topology); a detached `Component` is only a value
/// waiting to be inserted.
#[derive(Debug)]
pub struct Component {
    id: i32,
    name: String,
    /// Number of identical components this one stands for; -1 means one.
    count: i32,
    kind: ComponentKind,
    pub(crate) parent: Option<ComponentId>,
    pub(crate) children: Vec<ComponentId>,
    pub(crate) depth: usize,
    pub(crate) relations: RelationBuckets,
    /// Extensible per-component metadata.
    pub attrib: AttribStore,
}

impl Component {
    pub fn new(kind: ComponentKind, id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            count: -1,
            kind,
            parent: None,
            children: Vec::new(),
            depth: 0,
            relations: RelationBuckets::default(),
            attrib: AttribStore::new(),
        }
    }

    /// Component of the given type with default payload and name.
    pub fn of_type(component_type: ComponentType, id: i32) -> Self {
        Self::new(
            ComponentKind::default_for(component_type),
            id,
            component_type.default_name(),
        )
    }

    pub fn generic(id: i32) -> Self {
        Self::of_type(ComponentType::Generic, id)
    }

    pub fn thread(id: i32) -> Self {
        Self::of_type(ComponentType::Thread, id)
    }

    pub fn core(id: i32) -> Self {
        Self::of_type(ComponentType::Core, id)
    }

    pub fn cache(id: i32, info: CacheInfo) -> Self {
        Self::new(ComponentKind::Cache(info), id, "Cache")
    }

    pub fn subdivision(id: i32, subdivision_type: SubdivisionType) -> Self {
        Self::new(
            ComponentKind::Subdivision { subdivision_type },
            id,
            "Subdivision",
        )
    }

    pub fn numa(id: i32, size: i64) -> Self {
        Self::new(ComponentKind::Numa { size }, id, "Numa")
    }

    pub fn chip(id: i32, info: ChipInfo) -> Self {
        Self::new(ComponentKind::Chip(info), id, "Chip")
    }

    pub fn memory(id: i32, info: MemoryInfo) -> Self {
        Self::new(ComponentKind::Memory(info), id, "Memory")
    }

    pub fn storage(id: i32, size: i64) -> Self {
        Self::new(ComponentKind::Storage { size }, id, "Storage")
    }

    pub fn node(id: i32) -> Self {
        Self::of_type(ComponentType::Node, id)
    }

    pub fn quantum_backend(id: i32, num_qubits: i32) -> Self {
        Self::new(
            ComponentKind::QuantumBackend(QuantumBackendInfo {
                num_qubits,
                num_gates: 0,
            }),
            id,
            "QuantumBackend",
        )
    }

    pub fn atom_site(id: i32, info: AtomSiteInfo) -> Self {
        Self::new(ComponentKind::AtomSite(info), id, "AtomSite")
    }

    pub fn qubit(id: i32) -> Self {
        Self::of_type(ComponentType::Qubit, id)
    }

    pub fn topology() -> Self {
        Self::of_type(ComponentType::Topology, 0)
    }

    /// Replace the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn set_count(&mut self, count: i32) {
        self.count = count;
    }

    pub fn component_type(&self) -> ComponentType {
        self.kind.component_type()
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    /// Depth as of the last refresh through [`Topology::depth`](crate::Topology::depth).
    pub fn cached_depth(&self) -> usize {
        self.depth
    }

    pub fn as_cache(&self) -> Option<&CacheInfo> {
        match &self.kind {
            ComponentKind::Cache(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_cache_mut(&mut self) -> Option<&mut CacheInfo> {
        match &mut self.kind {
            ComponentKind::Cache(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_chip(&self) -> Option<&ChipInfo> {
        match &self.kind {
            ComponentKind::Chip(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_chip_mut(&mut self) -> Option<&mut ChipInfo> {
        match &mut self.kind {
            ComponentKind::Chip(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryInfo> {
        match &self.kind {
            ComponentKind::Memory(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_memory_mut(&mut self) -> Option<&mut MemoryInfo> {
        match &mut self.kind {
            ComponentKind::Memory(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_qubit(&self) -> Option<&QubitInfo> {
        match &self.kind {
            ComponentKind::Qubit(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_qubit_mut(&mut self) -> Option<&mut QubitInfo> {
        match &mut self.kind {
            ComponentKind::Qubit(info) => Some(info),
            _ => None,
        }
    }

    /// Backend counters of a quantum backend or atom site.
    pub fn as_quantum_backend(&self) -> Option<&QuantumBackendInfo> {
        match &self.kind {
            ComponentKind::QuantumBackend(info) => Some(info),
            ComponentKind::AtomSite(site) => Some(&site.backend),
            _ => None,
        }
    }

    pub fn as_quantum_backend_mut(&mut self) -> Option<&mut QuantumBackendInfo> {
        match &mut self.kind {
            ComponentKind::QuantumBackend(info) => Some(info),
            ComponentKind::AtomSite(site) => Some(&mut site.backend),
            _ => None,
        }
    }

    pub fn as_atom_site(&self) -> Option<&AtomSiteInfo> {
        match &self.kind {
            ComponentKind::AtomSite(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_atom_site_mut(&mut self) -> Option<&mut AtomSiteInfo> {
        match &mut self.kind {
            ComponentKind::AtomSite(info) => Some(info),
            _ => None,
        }
    }

    /// Size of a Numa, Memory or Storage component.
    pub fn size(&self) -> Option<i64> {
        match &self.kind {
            ComponentKind::Numa { size } | ComponentKind::Storage { size } => Some(*size),
            ComponentKind::Memory(info) => Some(info.size),
            _ => None,
        }
    }

    pub fn set_size(&mut self, new_size: i64) -> bool {
        match &mut self.kind {
            ComponentKind::Numa { size } | ComponentKind::Storage { size } => {
                *size = new_size;
                true
            }
            ComponentKind::Memory(info) => {
                info.size = new_size;
                true
            }
            _ => false,
        }
    }

    pub fn subdivision_type(&self) -> Option<SubdivisionType> {
        match &self.kind {
            ComponentKind::Subdivision { subdivision_type } => Some(*subdivision_type),
            _ => None,
        }
    }

    pub fn set_subdivision_type(&mut self, new_type: SubdivisionType) -> bool {
        match &mut self.kind {
            ComponentKind::Subdivision { subdivision_type } => {
                *subdivision_type = new_type;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_names_round_trip() {
        for t in ComponentType::ALL {
            assert_eq!(ComponentType::from_element(t.as_str()), Some(t));
        }
        assert_eq!(ComponentType::from_element("None"), Some(ComponentType::Generic));
        assert_eq!(ComponentType::from_element("Socket"), None);
    }

    #[test]
    fn test_cache_level_from_type_string() {
        assert_eq!(CacheInfo::new(3).level(), 3);
        assert_eq!(CacheInfo::named("L2").level(), 2);
        assert_eq!(CacheInfo::named("texture").level(), 0);

        let mut info = CacheInfo::named("L1d");
        info.set_level(2);
        assert_eq!(info.cache_type, "2");
    }

    #[test]
    fn test_type_is_fixed_by_payload() {
        let mut c = Component::numa(2, 1 << 30);
        assert_eq!(c.component_type(), ComponentType::Numa);
        assert_eq!(c.name(), "Numa");
        assert!(c.set_size(42));
        assert_eq!(c.size(), Some(42));
        assert!(c.as_cache_mut().is_none());
        assert!(!c.set_subdivision_type(SubdivisionType::GpuSm));
        assert_eq!(c.component_type(), ComponentType::Numa);
    }

    #[test]
    fn test_chip_builder_and_codes() {
        let c = Component::chip(
            0,
            ChipInfo::new()
                .with_vendor("GenuineIntel")
                .with_chip_type(ChipType::CpuSocket),
        )
        .named("socket0");
        let chip = c.as_chip().unwrap();
        assert_eq!(chip.vendor, "GenuineIntel");
        assert_eq!(chip.chip_type.code(), 3);
        assert_eq!(ChipType::from_code(2048), ChipType::Other(2048));
        assert_eq!(c.name(), "socket0");
    }

    #[test]
    fn test_atom_site_exposes_backend_counters() {
        let mut c = Component::atom_site(1, AtomSiteInfo::default());
        c.as_quantum_backend_mut().unwrap().num_qubits = 64;
        assert_eq!(c.as_quantum_backend().unwrap().num_qubits, 64);
        assert_eq!(c.component_type(), ComponentType::AtomSite);
    }
}
