//! Topology to XML
//!
//! Components are written as one nested tree under `<Components>`. Every
//! relation is written once under `<Relations>`, by the component in its
//! first position, and refers to participants through identity tokens.
//!
//! Compatibility: qubit frequency is written under both `frequency` and the
//! historical `fequency` key, so readers of either spelling find the value.
//! The importer prefers `frequency`.

use std::path::Path;
use tracing::{debug, info};

use crate::component::{Component, ComponentKind};
use crate::config::EngineConfig;
use crate::error::XmlError;
use crate::relation::{Relation, RelationKind, RelationType};
use crate::topology::{ComponentId, Topology};
use crate::xml::attrib::{export_attributes, ExportHooks};
use crate::xml::element::XmlElement;
use crate::xml::{COMPONENTS_ELEMENT, RELATIONS_ELEMENT, ROOT_ELEMENT};

/// Misspelled qubit frequency key kept for older readers.
pub(crate) const LEGACY_FREQUENCY: &str = "fequency";

/// Identity token of a component within one exported document.
pub fn identity_token(id: ComponentId) -> String {
    format!("{:#x}", id.0)
}

fn bool_flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn push_type_fields(element: &mut XmlElement, component: &Component) {
    match component.kind() {
        ComponentKind::Cache(cache) => {
            element.set_attr("cache_type", &cache.cache_type);
            if cache.size >= 0 {
                element.set_attr("cache_size", cache.size);
            }
            if cache.associativity_ways >= 0 {
                element.set_attr("cache_associativity_ways", cache.associativity_ways);
            }
            if cache.line_size >= 0 {
                element.set_attr("cache_line_size", cache.line_size);
            }
        }
        ComponentKind::Subdivision { subdivision_type } => {
            element.set_attr("subdivision_type", subdivision_type.code());
        }
        ComponentKind::Numa { size } | ComponentKind::Storage { size } => {
            if *size > 0 {
                element.set_attr("size", size);
            }
        }
        ComponentKind::Chip(chip) => {
            if !chip.vendor.is_empty() {
                element.set_attr("vendor", &chip.vendor);
            }
            if !chip.model.is_empty() {
                element.set_attr("model", &chip.model);
            }
            element.set_attr("ChipType", chip.chip_type.code());
        }
        ComponentKind::Memory(memory) => {
            if memory.size > 0 {
                element.set_attr("size", memory.size);
            }
            element.set_attr("is_volatile", bool_flag(memory.is_volatile));
        }
        ComponentKind::Qubit(qubit) => {
            element.set_attr("q1_fidelity", qubit.q1_fidelity);
            element.set_attr("t1", qubit.t1);
            element.set_attr("t2", qubit.t2);
            element.set_attr("readout_fidelity", qubit.readout_fidelity);
            element.set_attr("readout_length", qubit.readout_length);
            element.set_attr("frequency", qubit.frequency);
            element.set_attr(LEGACY_FREQUENCY, qubit.frequency);
            element.set_attr("calibration_time", &qubit.calibration_time);
        }
        ComponentKind::QuantumBackend(backend) => {
            element.set_attr("num_qubits", backend.num_qubits);
            element.set_attr("num_gates", backend.num_gates);
        }
        ComponentKind::AtomSite(site) => {
            element.set_attr("num_qubits", site.backend.num_qubits);
            element.set_attr("num_gates", site.backend.num_gates);

            let p = &site.properties;
            element.children.push(
                XmlElement::new("SiteProperties")
                    .with_attr("nRows", p.n_rows)
                    .with_attr("nColumns", p.n_columns)
                    .with_attr("nAods", p.n_aods)
                    .with_attr("nAodIntermediateLevels", p.n_aod_intermediate_levels)
                    .with_attr("nAodCoordinates", p.n_aod_coordinates)
                    .with_attr("interQubitDistance", p.inter_qubit_distance)
                    .with_attr("interactionRadius", p.interaction_radius)
                    .with_attr("blockingFactor", p.blocking_factor),
            );
            for (name, value) in &site.shuttling_times {
                element.children.push(
                    XmlElement::new("ShuttlingTime")
                        .with_attr("name", name)
                        .with_attr("value", value),
                );
            }
            for (name, value) in &site.shuttling_average_fidelities {
                element.children.push(
                    XmlElement::new("ShuttlingAverageFidelity")
                        .with_attr("name", name)
                        .with_attr("value", value),
                );
            }
        }
        ComponentKind::Generic
        | ComponentKind::Thread
        | ComponentKind::Core
        | ComponentKind::Node
        | ComponentKind::Topology => {}
    }
}

fn relation_element(relation: &Relation, hooks: &ExportHooks<'_>) -> XmlElement {
    let mut element = XmlElement::new(relation.relation_type().as_str());
    for (i, c) in relation.components().iter().enumerate() {
        element.set_attr(format!("component{i}"), identity_token(*c));
    }
    element.set_attr("ordered", bool_flag(relation.is_ordered()));
    element.set_attr("id", relation.id());

    match relation.kind() {
        RelationKind::Generic => {}
        RelationKind::DataPath(dp) => {
            element.set_attr("DataPathType", dp.dp_type.code());
            element.set_attr("bw", dp.bandwidth);
            element.set_attr("latency", dp.latency);
        }
        RelationKind::QuantumGate(gate) => {
            element.set_attr("gate_size", gate.gate_size);
            element.set_attr("name", gate.name());
            element.set_attr("gate_length", gate.gate_length);
            element.set_attr("gate_type", gate.gate_type().code());
            element.set_attr("fidelity", gate.fidelity);
            element.set_attr("unitary", &gate.unitary);
        }
        RelationKind::CouplingMap { fidelity } => {
            element.set_attr("fidelity", fidelity);
        }
    }

    element.children = export_attributes(&relation.attrib, hooks);
    element
}

impl Topology {
    fn component_element(&self, id: ComponentId, hooks: &ExportHooks<'_>) -> Option<XmlElement> {
        let component = self.get(id)?;
        let mut element = XmlElement::new(component.component_type().as_str())
            .with_attr("id", component.id())
            .with_attr("name", component.name());
        if component.count() > 0 {
            element.set_attr("count", component.count());
        }
        element.set_attr("addr", identity_token(id));

        let mut extra = XmlElement::default();
        push_type_fields(&mut extra, component);
        element.attributes.append(&mut extra.attributes);
        element.children = export_attributes(&component.attrib, hooks);
        element.children.append(&mut extra.children);

        for child in component.children() {
            match self.component_element(*child, hooks) {
                Some(e) => element.children.push(e),
                None => debug!(parent = %id, child = %child, "Skipping stale child handle"),
            }
        }
        Some(element)
    }

    /// Build the document tree for the subtree at `root`.
    pub fn to_xml_document(&self, root: ComponentId, hooks: &ExportHooks<'_>) -> Result<XmlElement, XmlError> {
        let components = self
            .component_element(root, hooks)
            .ok_or(XmlError::StaleRoot(root))?;

        let mut relations = XmlElement::new(RELATIONS_ELEMENT);
        let subtree = self.components_in_subtree(root);
        for id in &subtree {
            for rt in RelationType::ALL {
                for rid in self.relations(*id, rt) {
                    let Some(relation) = self.relation(*rid) else { continue };
                    if relation.components().first() == Some(id) {
                        relations.children.push(relation_element(relation, hooks));
                    }
                }
            }
        }

        debug!(
            components = subtree.len(),
            relations = relations.children.len(),
            "Built topology document"
        );
        Ok(XmlElement::new(ROOT_ELEMENT)
            .with_child(XmlElement::new(COMPONENTS_ELEMENT).with_child(components))
            .with_child(relations))
    }

    pub fn to_xml_string(&self, root: ComponentId) -> Result<String, XmlError> {
        self.to_xml_string_with(root, &EngineConfig::default(), &ExportHooks::default())
    }

    pub fn to_xml_string_with(
        &self,
        root: ComponentId,
        config: &EngineConfig,
        hooks: &ExportHooks<'_>,
    ) -> Result<String, XmlError> {
        self.to_xml_document(root, hooks)?
            .to_document(config.export.indent, config.export.include_declaration)
    }

    pub fn export_to_file(&self, root: ComponentId, path: &Path) -> Result<(), XmlError> {
        self.export_to_file_with(root, path, &EngineConfig::default(), &ExportHooks::default())
    }

    pub fn export_to_file_with(
        &self,
        root: ComponentId,
        path: &Path,
        config: &EngineConfig,
        hooks: &ExportHooks<'_>,
    ) -> Result<(), XmlError> {
        let xml = self.to_xml_string_with(root, config, hooks)?;
        std::fs::write(path, xml)?;
        info!(
            path = %path.display(),
            components = self.components_in_subtree(root).len(),
            "Exported topology"
        );
        Ok(())
    }
}
