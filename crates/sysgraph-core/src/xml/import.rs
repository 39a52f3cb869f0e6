//! XML to topology
//!
//! The component tree is rebuilt first, recording each component under the
//! identity token it was exported with. Relations are rebuilt afterwards by
//! resolving their participant tokens.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::component::{
    AtomSiteInfo, CacheInfo, ChipInfo, ChipType, Component, ComponentKind, ComponentType,
    MemoryInfo, QuantumBackendInfo, QubitInfo, SiteProperties, SubdivisionType,
};
use crate::config::EngineConfig;
use crate::error::XmlError;
use crate::relation::{DataPathInfo, DataPathType, QuantumGateInfo, RelationKind, RelationType};
use crate::topology::{ComponentId, Topology};
use crate::xml::attrib::{import_attribute, ImportHooks, ATTRIBUTE_ELEMENT};
use crate::xml::export::LEGACY_FREQUENCY;
use crate::xml::element::XmlElement;
use crate::xml::{COMPONENTS_ELEMENT, RELATIONS_ELEMENT};

const SITE_PROPERTIES: &str = "SiteProperties";
const SHUTTLING_TIME: &str = "ShuttlingTime";
const SHUTTLING_FIDELITY: &str = "ShuttlingAverageFidelity";

fn parse_opt<T: FromStr>(element: &XmlElement, keys: &[&str]) -> Result<Option<T>, XmlError> {
    let Some(key) = keys.iter().find(|k| element.attr(k).is_some()) else {
        return Ok(None);
    };
    let raw = element.attr(key).unwrap_or_default();
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| XmlError::InvalidValue {
            element: element.name.clone(),
            attribute: key.to_string(),
            value: raw.to_string(),
        })
}

fn parse_or<T: FromStr>(element: &XmlElement, key: &str, default: T) -> Result<T, XmlError> {
    Ok(parse_opt(element, &[key])?.unwrap_or(default))
}

fn parse_required<T: FromStr>(element: &XmlElement, key: &str) -> Result<T, XmlError> {
    parse_opt(element, &[key])?.ok_or_else(|| XmlError::MissingAttribute {
        element: element.name.clone(),
        attribute: key.to_string(),
    })
}

fn parse_flag(element: &XmlElement, key: &str) -> bool {
    matches!(element.attr(key).map(str::trim), Some("1") | Some("true"))
}

fn text(element: &XmlElement, key: &str) -> String {
    element.attr(key).unwrap_or_default().to_string()
}

fn named_values(element: &XmlElement, child: &str) -> Result<Vec<(String, f64)>, XmlError> {
    element
        .children_named(child)
        .map(|e| -> Result<(String, f64), XmlError> { Ok((text(e, "name"), parse_or(e, "value", 0.0)?)) })
        .collect()
}

/// Indices of every `componentN` attribute on a relation element.
fn participant_indices(element: &XmlElement) -> impl Iterator<Item = usize> + '_ {
    element.attributes.iter().filter_map(|(key, _)| {
        let digits = key.strip_prefix("component")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    })
}

fn parse_kind(component_type: ComponentType, e: &XmlElement) -> Result<ComponentKind, XmlError> {
    let kind = match component_type {
        ComponentType::Cache => ComponentKind::Cache(CacheInfo {
            cache_type: e
                .attr_any(&["cache_type", "cache_level"])
                .unwrap_or("0")
                .to_string(),
            size: parse_or(e, "cache_size", -1)?,
            associativity_ways: parse_or(e, "cache_associativity_ways", -1)?,
            line_size: parse_or(e, "cache_line_size", -1)?,
        }),
        ComponentType::Subdivision => ComponentKind::Subdivision {
            subdivision_type: parse_opt(e, &["subdivision_type", "type"])?
                .map_or(SubdivisionType::None, SubdivisionType::from_code),
        },
        ComponentType::Numa => ComponentKind::Numa {
            size: parse_or(e, "size", -1)?,
        },
        ComponentType::Storage => ComponentKind::Storage {
            size: parse_or(e, "size", -1)?,
        },
        ComponentType::Chip => ComponentKind::Chip(ChipInfo {
            vendor: text(e, "vendor"),
            model: text(e, "model"),
            chip_type: parse_opt(e, &["ChipType"])?.map_or(ChipType::None, ChipType::from_code),
        }),
        ComponentType::Memory => ComponentKind::Memory(MemoryInfo {
            size: parse_or(e, "size", -1)?,
            is_volatile: parse_flag(e, "is_volatile"),
        }),
        ComponentType::Qubit => ComponentKind::Qubit(QubitInfo {
            q1_fidelity: parse_or(e, "q1_fidelity", 0.0)?,
            t1: parse_or(e, "t1", 0.0)?,
            t2: parse_or(e, "t2", 0.0)?,
            readout_fidelity: parse_or(e, "readout_fidelity", 0.0)?,
            readout_length: parse_or(e, "readout_length", 0.0)?,
            frequency: parse_opt(e, &["frequency", LEGACY_FREQUENCY])?.unwrap_or(0.0),
            calibration_time: text(e, "calibration_time"),
        }),
        ComponentType::QuantumBackend => ComponentKind::QuantumBackend(QuantumBackendInfo {
            num_qubits: parse_or(e, "num_qubits", 0)?,
            num_gates: parse_or(e, "num_gates", 0)?,
        }),
        ComponentType::AtomSite => {
            let properties = match e.child(SITE_PROPERTIES) {
                Some(p) => SiteProperties {
                    n_rows: parse_or(p, "nRows", 0)?,
                    n_columns: parse_or(p, "nColumns", 0)?,
                    n_aods: parse_or(p, "nAods", 0)?,
                    n_aod_intermediate_levels: parse_or(p, "nAodIntermediateLevels", 0)?,
                    n_aod_coordinates: parse_or(p, "nAodCoordinates", 0)?,
                    inter_qubit_distance: parse_or(p, "interQubitDistance", 0.0)?,
                    interaction_radius: parse_or(p, "interactionRadius", 0.0)?,
                    blocking_factor: parse_or(p, "blockingFactor", 0.0)?,
                },
                None => SiteProperties::default(),
            };
            ComponentKind::AtomSite(AtomSiteInfo {
                backend: QuantumBackendInfo {
                    num_qubits: parse_or(e, "num_qubits", 0)?,
                    num_gates: parse_or(e, "num_gates", 0)?,
                },
                properties,
                shuttling_times: named_values(e, SHUTTLING_TIME)?.into_iter().collect(),
                shuttling_average_fidelities: named_values(e, SHUTTLING_FIDELITY)?
                    .into_iter()
                    .collect(),
            })
        }
        other => ComponentKind::default_for(other),
    };
    Ok(kind)
}

struct Importer<'h> {
    topology: Topology,
    tokens: HashMap<String, ComponentId>,
    hooks: ImportHooks<'h>,
    strict_tokens: bool,
}

impl Importer<'_> {
    fn build_component(&mut self, e: &XmlElement, parent: Option<ComponentId>) -> Result<ComponentId, XmlError> {
        let component_type =
            ComponentType::from_element(&e.name).ok_or_else(|| XmlError::UnknownComponent(e.name.clone()))?;
        let id: i32 = parse_required(e, "id")?;
        let name = e.attr("name").unwrap_or(component_type.default_name());
        let kind = parse_kind(component_type, e)?;

        let mut component = Component::new(kind, id, name);
        component.set_count(parse_or(e, "count", -1)?);
        let cid = self.topology.create(component);
        if let Some(p) = parent {
            self.topology
                .insert_child(p, cid)
                .map_err(|err| XmlError::Parse(err.to_string()))?;
        }
        if let Some(token) = e.attr("addr") {
            if self.tokens.insert(token.to_string(), cid).is_some() {
                warn!(token, "Identity token used by more than one component");
            }
        }

        for child in &e.children {
            match child.name.as_str() {
                ATTRIBUTE_ELEMENT => {
                    if let Some(component) = self.topology.get_mut(cid) {
                        import_attribute(child, &mut component.attrib, &self.hooks);
                    }
                }
                SITE_PROPERTIES | SHUTTLING_TIME | SHUTTLING_FIDELITY
                    if component_type == ComponentType::AtomSite => {}
                _ => {
                    self.build_component(child, Some(cid))?;
                }
            }
        }
        Ok(cid)
    }

    fn build_relation(&mut self, e: &XmlElement) -> Result<(), XmlError> {
        let invalid = |reason: String| XmlError::InvalidRelation {
            element: e.name.clone(),
            reason,
        };
        let relation_type =
            RelationType::from_element(&e.name).ok_or_else(|| invalid("unknown relation type".to_string()))?;

        let tokens: Vec<&str> = (0..)
            .map_while(|index| e.attr(&format!("component{index}")))
            .collect();
        if tokens.is_empty() {
            return Err(invalid("no participants".to_string()));
        }
        if let Some(index) = participant_indices(e).find(|i| *i >= tokens.len()) {
            return Err(invalid(format!(
                "component{index} follows a gap after component{}",
                tokens.len() - 1
            )));
        }

        let mut participants = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.tokens.get(token) {
                Some(cid) => participants.push(*cid),
                None if self.strict_tokens => return Err(XmlError::UnresolvedToken(token.to_string())),
                None => {
                    warn!(token, relation = %relation_type, "Dropping relation with unresolved participant");
                    return Ok(());
                }
            }
        }

        let ordered = parse_flag(e, "ordered");
        let id = parse_or(e, "id", 0)?;
        let kind = match relation_type {
            RelationType::Relation => RelationKind::Generic,
            RelationType::DataPath => {
                if participants.len() != 2 {
                    return Err(invalid(format!("expected 2 participants, found {}", participants.len())));
                }
                RelationKind::DataPath(DataPathInfo {
                    dp_type: DataPathType::from_code(parse_or(e, "DataPathType", 0)?),
                    bandwidth: parse_or(e, "bw", -1.0)?,
                    latency: parse_or(e, "latency", -1.0)?,
                })
            }
            RelationType::QuantumGate => {
                let mut gate = QuantumGateInfo::new(
                    parse_or(e, "gate_size", participants.len())?,
                    text(e, "name"),
                    parse_or(e, "fidelity", 0.0)?,
                    text(e, "unitary"),
                );
                gate.gate_length = parse_or(e, "gate_length", 0.0)?;
                RelationKind::QuantumGate(gate)
            }
            RelationType::CouplingMap => {
                if participants.len() != 2 {
                    return Err(invalid(format!("expected 2 participants, found {}", participants.len())));
                }
                RelationKind::CouplingMap {
                    fidelity: parse_or(e, "fidelity", 0.0)?,
                }
            }
        };

        let rid = self
            .topology
            .insert_relation(kind, id, ordered, &participants)
            .map_err(|err| invalid(err.to_string()))?;
        if let Some(relation) = self.topology.relation_mut(rid) {
            for child in e.children_named(ATTRIBUTE_ELEMENT) {
                import_attribute(child, &mut relation.attrib, &self.hooks);
            }
        }
        Ok(())
    }
}

fn section<'a>(doc: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
    doc.children
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
}

impl Topology {
    /// Rebuild a topology from a parsed document. Returns the new arena and
    /// the root component; nothing is returned on error.
    pub fn from_xml_document(
        doc: &XmlElement,
        config: &EngineConfig,
        hooks: &ImportHooks<'_>,
    ) -> Result<(Topology, ComponentId), XmlError> {
        let components = section(doc, COMPONENTS_ELEMENT).ok_or(XmlError::MissingSection(COMPONENTS_ELEMENT))?;
        let mut roots = components.children.iter();
        let root_element = roots
            .next()
            .ok_or_else(|| XmlError::Parse("<Components> holds no component".to_string()))?;
        if roots.next().is_some() {
            warn!("Only the first component tree of the document is imported");
        }

        let mut importer = Importer {
            topology: Topology::new(),
            tokens: HashMap::new(),
            hooks: *hooks,
            strict_tokens: config.import.strict_tokens,
        };
        let root = importer.build_component(root_element, None)?;

        match section(doc, RELATIONS_ELEMENT) {
            Some(relations) => {
                for e in &relations.children {
                    importer.build_relation(e)?;
                }
            }
            None => debug!("Document has no relation section"),
        }

        let topology = importer.topology;
        debug!(
            components = topology.component_count(),
            relations = topology.relation_count(),
            "Rebuilt topology"
        );
        Ok((topology, root))
    }

    pub fn from_xml_str(xml: &str) -> Result<(Topology, ComponentId), XmlError> {
        Self::from_xml_str_with(xml, &EngineConfig::default(), &ImportHooks::default())
    }

    pub fn from_xml_str_with(
        xml: &str,
        config: &EngineConfig,
        hooks: &ImportHooks<'_>,
    ) -> Result<(Topology, ComponentId), XmlError> {
        let doc = XmlElement::parse(xml)?;
        Self::from_xml_document(&doc, config, hooks)
    }

    pub fn import_from_file(path: &Path) -> Result<(Topology, ComponentId), XmlError> {
        Self::import_from_file_with(path, &EngineConfig::default(), &ImportHooks::default())
    }

    pub fn import_from_file_with(
        path: &Path,
        config: &EngineConfig,
        hooks: &ImportHooks<'_>,
    ) -> Result<(Topology, ComponentId), XmlError> {
        let content = std::fs::read_to_string(path)?;
        let (topology, root) = Self::from_xml_str_with(&content, config, hooks)?;
        info!(
            path = %path.display(),
            components = topology.component_count(),
            relations = topology.relation_count(),
            "Imported topology"
        );
        Ok((topology, root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"<?xml version="1.0"?>
<sys-sage>
  <Components>
    <Topology id="0" name="sys-sage Topology" addr="0x1">
      <Chip id="0" name="Chip" addr="0x2" vendor="AMD">
        <Cache id="0" name="L3" addr="0x3" cache_level="3" cache_size="33554432"/>
        <Subdivision id="1" name="sm" addr="0x4" type="2"/>
        <Memory id="0" name="dram" addr="0x5" size="1024" is_volatile="true"/>
        <Qubit id="7" name="q7" addr="0x6" fequency="5.1" t1="80.5"/>
      </Chip>
    </Topology>
  </Components>
  <Relations>
    <DataPath component0="0x3" component1="0x5" ordered="1" id="0" DataPathType="1" bw="5.000000" latency="2.000000"/>
  </Relations>
</sys-sage>"#;

    #[test]
    fn test_legacy_spellings_are_accepted() {
        let (t, root) = Topology::from_xml_str(LEGACY).unwrap();
        let chip = t.child_by_type(root, ComponentType::Chip).unwrap();
        assert_eq!(t.get(chip).unwrap().as_chip().unwrap().vendor, "AMD");

        let cache = t.child_by_type(chip, ComponentType::Cache).unwrap();
        let info = t.get(cache).unwrap().as_cache().unwrap();
        assert_eq!(info.level(), 3);
        assert_eq!(info.size, 33554432);
        assert_eq!(info.line_size, -1);

        let sub = t.child_by_type(chip, ComponentType::Subdivision).unwrap();
        assert_eq!(t.get(sub).unwrap().subdivision_type(), Some(SubdivisionType::GpuSm));

        let mem = t.child_by_type(chip, ComponentType::Memory).unwrap();
        assert!(t.get(mem).unwrap().as_memory().unwrap().is_volatile);

        let qubit = t.child_by_type(chip, ComponentType::Qubit).unwrap();
        assert_eq!(t.get(qubit).unwrap().as_qubit().unwrap().frequency, 5.1);

        let dp = t.relations(cache, RelationType::DataPath)[0];
        let r = t.relation(dp).unwrap();
        assert_eq!(r.components(), &[cache, mem]);
        assert_eq!(r.as_data_path().unwrap().bandwidth, 5.0);
        assert_eq!(r.data_path_type(), Some(DataPathType::Logical));
    }

    #[test]
    fn test_lowercase_sections() {
        let xml = r#"<sys-sage><components><NUMA id="3" name="n" addr="a"/></components><relations/></sys-sage>"#;
        let (t, root) = Topology::from_xml_str(xml).unwrap();
        assert_eq!(t.get(root).unwrap().id(), 3);
        assert_eq!(t.component_count(), 1);
    }

    #[test]
    fn test_format_errors_fail_the_import() {
        let missing = r#"<sys-sage><Relations/></sys-sage>"#;
        assert!(matches!(
            Topology::from_xml_str(missing),
            Err(XmlError::MissingSection("Components"))
        ));

        let unknown = r#"<sys-sage><Components><Socket id="0"/></Components></sys-sage>"#;
        assert!(matches!(
            Topology::from_xml_str(unknown),
            Err(XmlError::UnknownComponent(name)) if name == "Socket"
        ));

        let no_id = r#"<sys-sage><Components><Core name="c"/></Components></sys-sage>"#;
        assert!(matches!(
            Topology::from_xml_str(no_id),
            Err(XmlError::MissingAttribute { attribute, .. }) if attribute == "id"
        ));

        let bad_size = r#"<sys-sage><Components><NUMA id="0" size="big"/></Components></sys-sage>"#;
        assert!(matches!(
            Topology::from_xml_str(bad_size),
            Err(XmlError::InvalidValue { value, .. }) if value == "big"
        ));

        let one_ended = r#"<sys-sage><Components><Core id="0" addr="x"/></Components>
            <Relations><DataPath component0="x" ordered="1" id="0"/></Relations></sys-sage>"#;
        assert!(matches!(
            Topology::from_xml_str(one_ended),
            Err(XmlError::InvalidRelation { .. })
        ));
    }

    #[test]
    fn test_gap_in_participants_is_rejected() {
        let xml = r#"<sys-sage><Components>
            <Node id="0" addr="a"><Core id="1" addr="b"/></Node>
          </Components><Relations>
            <Relation component0="a" component2="b" ordered="1" id="3"/>
          </Relations></sys-sage>"#;
        let err = Topology::from_xml_str(xml).unwrap_err();
        assert!(matches!(
            err,
            XmlError::InvalidRelation { element, reason } if element == "Relation" && reason.contains("component2")
        ));

        // Unrelated attributes sharing the prefix are not participants.
        let xml = r#"<sys-sage><Components>
            <Node id="0" addr="a"><Core id="1" addr="b"/></Node>
          </Components><Relations>
            <Relation component0="a" component1="b" componentKind="x" ordered="1" id="3"/>
          </Relations></sys-sage>"#;
        let (t, _) = Topology::from_xml_str(xml).unwrap();
        assert_eq!(t.relation_count(), 1);
    }

    #[test]
    fn test_count_and_frequency_spellings() {
        let xml = r#"<sys-sage><Components>
            <Node id="0" addr="n">
              <Core id="1" count="4" addr="c"/>
              <Qubit id="2" addr="q" fequency="5.25"/>
            </Node>
          </Components></sys-sage>"#;
        let (t, root) = Topology::from_xml_str(xml).unwrap();
        assert_eq!(t.get(root).unwrap().count(), -1);
        let core = t.child_by_id(root, 1).unwrap();
        assert_eq!(t.get(core).unwrap().count(), 4);

        let qubit = t.child_by_id(root, 2).unwrap();
        assert_eq!(t.get(qubit).unwrap().as_qubit().unwrap().frequency, 5.25);

        let doc = t.to_xml_document(root, &crate::xml::ExportHooks::default()).unwrap();
        let node = &doc.child("Components").unwrap().children[0];
        assert_eq!(node.attr("count"), None);
        assert_eq!(node.children[0].attr("count"), Some("4"));
        assert_eq!(node.children[1].attr("frequency"), Some("5.25"));
        assert_eq!(node.children[1].attr("fequency"), Some("5.25"));
    }

    #[test]
    fn test_unresolved_tokens() {
        let xml = r#"<sys-sage><Components><Core id="0" addr="x"/></Components>
            <Relations><Relation component0="x" component1="y" ordered="0" id="1"/></Relations></sys-sage>"#;

        let (t, _) = Topology::from_xml_str(xml).unwrap();
        assert_eq!(t.relation_count(), 0);

        let mut strict = EngineConfig::default();
        strict.import.strict_tokens = true;
        let err = Topology::from_xml_str_with(xml, &strict, &ImportHooks::default()).unwrap_err();
        assert!(matches!(err, XmlError::UnresolvedToken(token) if token == "y"));
    }

    #[test]
    fn test_attributes_on_relations_are_read() {
        let xml = r#"<sys-sage><Components>
            <Node id="0" addr="n"><NUMA id="0" addr="a"/><NUMA id="1" addr="b"/></Node>
          </Components><Relations>
            <DataPath component0="a" component1="b" ordered="0" id="4" DataPathType="3" bw="10" latency="1">
              <Attribute name="latency_min" value="0.5"/>
              <Attribute name="unknown_key" value="1"/>
            </DataPath>
          </Relations></sys-sage>"#;
        let (t, root) = Topology::from_xml_str(xml).unwrap();
        let a = t.child_by_id(root, 0).unwrap();
        let rid = t.relations(a, RelationType::DataPath)[0];
        let r = t.relation(rid).unwrap();
        assert_eq!(r.id(), 4);
        assert!(!r.is_ordered());
        assert_eq!(r.attrib.get_f64("latency_min"), Some(0.5));
        assert!(!r.attrib.contains("unknown_key"));
    }
}
