//! Human-readable listings and size statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

use crate::relation::{RelationKind, RelationType};
use crate::topology::{ComponentId, RelationId, Topology};

/// Number of components and distinct relations reachable from a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopologyStats {
    pub components: usize,
    pub relations: usize,
}

impl Topology {
    /// Indented listing of the subtree, one line per component.
    pub fn subtree_report(&self, root: ComponentId) -> String {
        let mut out = String::new();
        let mut stack = vec![(root, 0usize)];
        while let Some((id, level)) = stack.pop() {
            let Some(c) = self.get(id) else { continue };
            let _ = writeln!(
                out,
                "{}{} (name {}) id {} - children: {} level: {}",
                "  ".repeat(level),
                c.component_type(),
                c.name(),
                c.id(),
                c.children().len(),
                level
            );
            stack.extend(c.children().iter().rev().map(|child| (*child, level + 1)));
        }
        out
    }

    /// One-line description of a relation.
    pub fn describe_relation(&self, rid: RelationId) -> Option<String> {
        let r = self.relation(rid)?;
        let mut line = format!(
            "{} ({})",
            r.relation_type(),
            if r.is_ordered() { "ordered" } else { "unordered" }
        );
        line.push_str(" -- Components: ");
        for c in r.components() {
            match self.get(*c) {
                Some(comp) => {
                    let _ = write!(line, "({}) id {}, ", comp.component_type(), comp.id());
                }
                None => line.push_str("(deleted), "),
            }
        }
        match r.kind() {
            RelationKind::Generic => {}
            RelationKind::DataPath(dp) => {
                let _ = write!(
                    line,
                    "-- type: {}, bw: {}, latency: {}",
                    dp.dp_type.as_str(),
                    dp.bandwidth,
                    dp.latency
                );
            }
            RelationKind::QuantumGate(g) => {
                let _ = write!(
                    line,
                    "-- name: {} ({:?}), gate size: {}, gate length: {}, fidelity: {}",
                    g.name(),
                    g.gate_type(),
                    g.gate_size,
                    g.gate_length,
                    g.fidelity
                );
            }
            RelationKind::CouplingMap { fidelity } => {
                let _ = write!(line, "-- fidelity: {}", fidelity);
            }
        }
        if !r.attrib.is_empty() {
            line.push_str(" -- attrib: ");
            for (key, value) in r.attrib.iter() {
                let _ = write!(line, "{} = {}; ", key, value);
            }
        }
        Some(line)
    }

    /// Relations of every component in the subtree, grouped per component
    /// and relation type (`None` = all types).
    pub fn relations_report(&self, root: ComponentId, relation_type: Option<RelationType>) -> String {
        let mut out = String::new();
        for id in self.components_in_subtree(root) {
            let Some(c) = self.get(id) else { continue };
            for rt in RelationType::ALL {
                if !rt.matches(relation_type) {
                    continue;
                }
                let relations = self.relations(id, rt);
                if relations.is_empty() {
                    continue;
                }
                let _ = writeln!(
                    out,
                    "{}s regarding Component ({}) id {}",
                    rt,
                    c.component_type(),
                    c.id()
                );
                for rid in relations {
                    if let Some(line) = self.describe_relation(*rid) {
                        let _ = writeln!(out, "    {}", line);
                    }
                }
            }
        }
        out
    }

    pub fn stats(&self, root: ComponentId) -> TopologyStats {
        let subtree = self.components_in_subtree(root);
        let relations: BTreeSet<RelationId> = subtree
            .iter()
            .filter_map(|id| self.get(*id))
            .flat_map(|c| c.relations.iter().map(|(_, r)| r))
            .collect();
        TopologyStats {
            components: subtree.len(),
            relations: relations.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::component::{CacheInfo, Component};
    use crate::relation::{DataPathOrientation, DataPathType, RelationType};
    use crate::topology::Topology;

    #[test]
    fn test_subtree_report_indents_by_level() {
        let mut t = Topology::new();
        let chip = t.create(Component::chip(0, Default::default()).named("socket0"));
        let l3 = t.create_under(chip, Component::cache(0, CacheInfo::new(3))).unwrap();
        t.create_under(l3, Component::core(4)).unwrap();

        let report = t.subtree_report(chip);
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Chip (name socket0) id 0 - children: 1 level: 0");
        assert_eq!(lines[1], "  Cache (name Cache) id 0 - children: 1 level: 1");
        assert_eq!(lines[2], "    Core (name Core) id 4 - children: 0 level: 2");
    }

    #[test]
    fn test_relations_report_and_stats() {
        let mut t = Topology::new();
        let root = t.create(Component::node(0));
        let a = t.create_under(root, Component::numa(0, -1)).unwrap();
        let b = t.create_under(root, Component::numa(1, -1)).unwrap();
        let r = t
            .add_data_path_with_metrics(a, b, DataPathOrientation::Oriented, 8621.0, 244.0)
            .unwrap();
        t.relation_mut(r).unwrap().attrib.insert("latency_min", 200.0);
        t.add_data_path(b, b, DataPathOrientation::Oriented, DataPathType::Datatransfer)
            .unwrap();

        let report = t.relations_report(root, Some(RelationType::DataPath));
        assert!(report.contains("DataPaths regarding Component (NUMA) id 0"));
        assert!(report.contains("bw: 8621, latency: 244"));
        assert!(report.contains("latency_min = 200"));
        assert!(t.relations_report(root, Some(RelationType::QuantumGate)).is_empty());

        let stats = t.stats(root);
        assert_eq!(stats.components, 3);
        assert_eq!(stats.relations, 2);
        assert_eq!(t.stats(a).relations, 1);
    }
}
