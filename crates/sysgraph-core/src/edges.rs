//! Relation construction, participant editing and relation queries
//!
//! Every edit keeps the participant list of a relation and the relation
//! buckets of its participants in step: a relation is listed once in the
//! bucket of each distinct participant, and nowhere else.

use tracing::{debug, warn};

use crate::component::ComponentType;
use crate::error::RelationError;
use crate::relation::{
    DataPathDirection, DataPathInfo, DataPathOrientation, DataPathType, QuantumGateInfo,
    QuantumGateType, Relation, RelationKind, RelationType,
};
use crate::topology::{ComponentId, RelationId, Topology};

impl Topology {
    pub(crate) fn insert_relation(
        &mut self,
        kind: RelationKind,
        id: i32,
        ordered: bool,
        components: &[ComponentId],
    ) -> Result<RelationId, RelationError> {
        if components.is_empty() {
            return Err(RelationError::InvalidArity {
                kind: kind.relation_type().as_str(),
                expected: 1,
                actual: 0,
            });
        }
        if let Some(stale) = components.iter().find(|c| !self.contains(**c)) {
            return Err(RelationError::StaleComponent(*stale));
        }
        let rid = RelationId(self.relations.len() as u32);
        let mut relation = Relation::new(kind, id, ordered);
        let relation_type = relation.relation_type();
        relation.components = components.to_vec();
        self.relations.push(Some(relation));
        for c in components {
            if let Some(component) = self.get_mut(*c) {
                component.relations.register(relation_type, rid);
            }
        }
        Ok(rid)
    }

    /// Generic n-ary relation.
    pub fn add_relation(
        &mut self,
        components: &[ComponentId],
        id: i32,
        ordered: bool,
    ) -> Result<RelationId, RelationError> {
        self.insert_relation(RelationKind::Generic, id, ordered, components)
    }

    /// Data path of the given sub-type; bandwidth and latency are left at -1.
    pub fn add_data_path(
        &mut self,
        source: ComponentId,
        target: ComponentId,
        orientation: DataPathOrientation,
        dp_type: DataPathType,
    ) -> Result<RelationId, RelationError> {
        self.add_data_path_full(source, target, orientation, dp_type, -1.0, -1.0)
    }

    /// Data path with measured bandwidth and latency and no sub-type.
    pub fn add_data_path_with_metrics(
        &mut self,
        source: ComponentId,
        target: ComponentId,
        orientation: DataPathOrientation,
        bandwidth: f64,
        latency: f64,
    ) -> Result<RelationId, RelationError> {
        self.add_data_path_full(
            source,
            target,
            orientation,
            DataPathType::None,
            bandwidth,
            latency,
        )
    }

    /// Data path with every field given. `source == target` is allowed.
    pub fn add_data_path_full(
        &mut self,
        source: ComponentId,
        target: ComponentId,
        orientation: DataPathOrientation,
        dp_type: DataPathType,
        bandwidth: f64,
        latency: f64,
    ) -> Result<RelationId, RelationError> {
        let info = DataPathInfo {
            dp_type,
            bandwidth,
            latency,
        };
        self.insert_relation(
            RelationKind::DataPath(info),
            0,
            orientation.is_ordered(),
            &[source, target],
        )
    }

    /// Gate acting on `qubits`, in operand order.
    pub fn add_quantum_gate(
        &mut self,
        qubits: &[ComponentId],
        gate: QuantumGateInfo,
    ) -> Result<RelationId, RelationError> {
        if gate.gate_size != qubits.len() {
            debug!(
                gate = gate.name(),
                gate_size = gate.gate_size,
                operands = qubits.len(),
                "Gate size differs from operand count"
            );
        }
        self.insert_relation(RelationKind::QuantumGate(gate), 0, true, qubits)
    }

    /// Ordered coupling between two qubits.
    pub fn add_coupling_map(
        &mut self,
        q0: ComponentId,
        q1: ComponentId,
        fidelity: f64,
    ) -> Result<RelationId, RelationError> {
        for q in [q0, q1] {
            match self.get(q) {
                None => return Err(RelationError::StaleComponent(q)),
                Some(c) if c.component_type() != ComponentType::Qubit => {
                    return Err(RelationError::NotQubitLike(q))
                }
                Some(_) => {}
            }
        }
        self.insert_relation(RelationKind::CouplingMap { fidelity }, 0, true, &[q0, q1])
    }

    /// Append a participant, growing the relation's arity.
    pub fn add_component(&mut self, rid: RelationId, c: ComponentId) -> Result<(), RelationError> {
        if !self.contains(c) {
            return Err(RelationError::StaleComponent(c));
        }
        let relation = self
            .relation_mut(rid)
            .ok_or(RelationError::StaleRelation(rid))?;
        relation.components.push(c);
        let relation_type = relation.relation_type();
        if let Some(component) = self.get_mut(c) {
            component.relations.register(relation_type, rid);
        }
        Ok(())
    }

    /// Replace the participant at `index` with `new`.
    ///
    /// Nothing changes when the index is out of range.
    pub fn update_component(
        &mut self,
        rid: RelationId,
        index: usize,
        new: ComponentId,
    ) -> Result<(), RelationError> {
        if !self.contains(new) {
            return Err(RelationError::StaleComponent(new));
        }
        let relation = self
            .relation_mut(rid)
            .ok_or(RelationError::StaleRelation(rid))?;
        let len = relation.components.len();
        let Some(slot) = relation.components.get_mut(index) else {
            warn!(relation = %rid, index, len, "Cannot update participant: index out of range");
            return Err(RelationError::IndexOutOfRange { index, len });
        };
        let old = std::mem::replace(slot, new);
        let still_present = relation.components.contains(&old);
        let relation_type = relation.relation_type();

        if !still_present {
            if let Some(component) = self.get_mut(old) {
                component.relations.deregister(relation_type, rid);
            }
        }
        if let Some(component) = self.get_mut(new) {
            component.relations.register(relation_type, rid);
        }
        Ok(())
    }

    /// Replace the first occurrence of `old` with `new`.
    pub fn update_component_by(
        &mut self,
        rid: RelationId,
        old: ComponentId,
        new: ComponentId,
    ) -> Result<(), RelationError> {
        let relation = self.relation(rid).ok_or(RelationError::StaleRelation(rid))?;
        let Some(index) = relation.components.iter().position(|c| *c == old) else {
            warn!(relation = %rid, component = %old, "Cannot update participant: not found");
            return Err(RelationError::ParticipantNotFound(old));
        };
        self.update_component(rid, index, new)
    }

    pub fn update_source(&mut self, rid: RelationId, new: ComponentId) -> Result<(), RelationError> {
        self.update_component(rid, 0, new)
    }

    pub fn update_target(&mut self, rid: RelationId, new: ComponentId) -> Result<(), RelationError> {
        self.update_component(rid, 1, new)
    }

    /// Detach a relation from all participants and free it.
    pub fn delete_relation(&mut self, rid: RelationId) -> Result<(), RelationError> {
        let relation = self
            .relations
            .get_mut(rid.index())
            .and_then(Option::take)
            .ok_or(RelationError::StaleRelation(rid))?;
        let relation_type = relation.relation_type();
        for c in &relation.components {
            if let Some(component) = self.get_mut(*c) {
                component.relations.deregister(relation_type, rid);
            }
        }
        Ok(())
    }

    /// Delete every relation of the given type (`None` = any) touching `c`.
    pub fn delete_all_relations(&mut self, c: ComponentId, relation_type: Option<RelationType>) -> usize {
        let doomed: Vec<RelationId> = match self.get(c) {
            Some(component) => component
                .relations
                .iter()
                .filter(|(rt, _)| rt.matches(relation_type))
                .map(|(_, r)| r)
                .collect(),
            None => return 0,
        };
        doomed
            .into_iter()
            .filter(|r| self.delete_relation(*r).is_ok())
            .count()
    }

    pub fn delete_all_data_paths(&mut self, c: ComponentId) -> usize {
        self.delete_all_relations(c, Some(RelationType::DataPath))
    }

    /// Relations of one type that `c` participates in.
    pub fn relations(&self, c: ComponentId, relation_type: RelationType) -> &[RelationId] {
        self.get(c)
            .map(|component| component.relations.get(relation_type))
            .unwrap_or_default()
    }

    /// Relations touching `c`, filtered by type and by the position `c`
    /// occupies. Unordered relations match any position.
    pub fn all_relations_by(
        &self,
        c: ComponentId,
        relation_type: Option<RelationType>,
        position: Option<usize>,
    ) -> Vec<RelationId> {
        let Some(component) = self.get(c) else {
            return Vec::new();
        };
        component
            .relations
            .iter()
            .filter(|(rt, _)| rt.matches(relation_type))
            .filter_map(|(_, rid)| {
                let r = self.relation(rid)?;
                let matched = match position {
                    _ if !r.is_ordered() => true,
                    None => true,
                    Some(p) => r.components().get(p) == Some(&c),
                };
                matched.then_some(rid)
            })
            .collect()
    }

    fn data_path_matches(
        &self,
        c: ComponentId,
        rid: RelationId,
        dp_type: Option<DataPathType>,
        direction: DataPathDirection,
    ) -> bool {
        let Some(r) = self.relation(rid) else {
            return false;
        };
        let Some(info) = r.as_data_path() else {
            return false;
        };
        let direction_ok = !r.is_ordered()
            || match direction {
                DataPathDirection::Any => true,
                DataPathDirection::Outgoing => r.components().first() == Some(&c),
                DataPathDirection::Incoming => r.components().get(1) == Some(&c),
            };
        direction_ok && dp_type.map_or(true, |t| t == info.dp_type)
    }

    /// Data paths of `c` filtered by sub-type (`None` = any) and direction.
    pub fn all_data_paths(
        &self,
        c: ComponentId,
        dp_type: Option<DataPathType>,
        direction: DataPathDirection,
    ) -> Vec<RelationId> {
        self.relations(c, RelationType::DataPath)
            .iter()
            .copied()
            .filter(|rid| self.data_path_matches(c, *rid, dp_type, direction))
            .collect()
    }

    /// First data path of `c` with the given sub-type and direction.
    pub fn data_path_by_type(
        &self,
        c: ComponentId,
        dp_type: DataPathType,
        direction: DataPathDirection,
    ) -> Option<RelationId> {
        self.relations(c, RelationType::DataPath)
            .iter()
            .copied()
            .find(|rid| self.data_path_matches(c, *rid, Some(dp_type), direction))
    }

    /// Qubit children of a quantum backend.
    pub fn all_qubits(&self, backend: ComponentId) -> Vec<ComponentId> {
        self.all_children_by_type(backend, ComponentType::Qubit)
    }

    /// Distinct gates acting on the backend's qubits, in first-seen order.
    pub fn backend_gates(&self, backend: ComponentId) -> Vec<RelationId> {
        let mut gates = Vec::new();
        for q in self.all_qubits(backend) {
            for rid in self.relations(q, RelationType::QuantumGate) {
                if !gates.contains(rid) {
                    gates.push(*rid);
                }
            }
        }
        gates
    }

    pub fn gates_by_size(&self, backend: ComponentId, gate_size: usize) -> Vec<RelationId> {
        self.backend_gates(backend)
            .into_iter()
            .filter(|rid| {
                self.relation(*rid)
                    .and_then(Relation::as_quantum_gate)
                    .is_some_and(|g| g.gate_size == gate_size)
            })
            .collect()
    }

    pub fn gates_by_type(&self, backend: ComponentId, gate_type: QuantumGateType) -> Vec<RelationId> {
        self.backend_gates(backend)
            .into_iter()
            .filter(|rid| {
                self.relation(*rid)
                    .and_then(Relation::as_quantum_gate)
                    .is_some_and(|g| g.gate_type() == gate_type)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    fn bucket_count(t: &Topology, c: ComponentId, rt: RelationType, r: RelationId) -> usize {
        t.relations(c, rt).iter().filter(|x| **x == r).count()
    }

    fn assert_symmetric(t: &Topology) {
        for rid in t.relation_ids() {
            let r = t.relation(rid).unwrap();
            for c in r.components() {
                assert_eq!(bucket_count(t, *c, r.relation_type(), rid), 1);
            }
        }
        for cid in t.component_ids() {
            for rt in RelationType::ALL {
                for rid in t.relations(cid, rt) {
                    assert!(t.relation(*rid).unwrap().contains_component(cid));
                }
            }
        }
    }

    fn two_numas(t: &mut Topology) -> (ComponentId, ComponentId, ComponentId) {
        let root = t.create(Component::chip(0, Default::default()));
        let a = t.create_under(root, Component::numa(0, -1)).unwrap();
        let b = t.create_under(root, Component::numa(1, -1)).unwrap();
        (root, a, b)
    }

    #[test]
    fn test_oriented_data_path_directions() {
        let mut t = Topology::new();
        let (_, a, b) = two_numas(&mut t);
        let r = t
            .add_data_path(a, b, DataPathOrientation::Oriented, DataPathType::Physical)
            .unwrap();

        let out = DataPathDirection::Outgoing;
        let inc = DataPathDirection::Incoming;
        assert_eq!(t.data_path_by_type(a, DataPathType::Physical, out), Some(r));
        assert_eq!(t.data_path_by_type(b, DataPathType::Physical, inc), Some(r));
        assert_eq!(t.data_path_by_type(a, DataPathType::Physical, inc), None);
        assert_eq!(t.data_path_by_type(b, DataPathType::Physical, out), None);
        assert_eq!(t.data_path_by_type(a, DataPathType::Logical, out), None);

        let dp = t.relation(r).unwrap().as_data_path().unwrap();
        assert_eq!(dp.bandwidth, -1.0);
        assert_eq!(dp.latency, -1.0);
    }

    #[test]
    fn test_bidirectional_data_path_matches_both_ways() {
        let mut t = Topology::new();
        let (_, a, b) = two_numas(&mut t);
        let r = t
            .add_data_path(a, b, DataPathOrientation::Bidirectional, DataPathType::Physical)
            .unwrap();
        for c in [a, b] {
            for d in [DataPathDirection::Incoming, DataPathDirection::Outgoing] {
                assert_eq!(t.data_path_by_type(c, DataPathType::Physical, d), Some(r));
            }
        }
    }

    #[test]
    fn test_reflexive_data_path_registers_once() {
        let mut t = Topology::new();
        let (_, a, _) = two_numas(&mut t);
        let r = t
            .add_data_path_with_metrics(a, a, DataPathOrientation::Oriented, 100.0, 5.0)
            .unwrap();
        assert_eq!(t.relations(a, RelationType::DataPath), &[r]);
        assert_eq!(t.all_data_paths(a, None, DataPathDirection::Incoming), vec![r]);
        assert_eq!(t.all_data_paths(a, None, DataPathDirection::Outgoing), vec![r]);

        t.delete_relation(r).unwrap();
        assert!(t.relations(a, RelationType::DataPath).is_empty());
    }

    #[test]
    fn test_full_numa_mesh_has_four_each_way() {
        let mut t = Topology::new();
        let root = t.create(Component::node(0));
        let numas: Vec<_> = (0..4)
            .map(|i| t.create_under(root, Component::numa(i, -1)).unwrap())
            .collect();
        for &src in &numas {
            for &dst in &numas {
                t.add_data_path(src, dst, DataPathOrientation::Oriented, DataPathType::Datatransfer)
                    .unwrap();
            }
        }
        assert_eq!(t.relation_count(), 16);
        for &n in &numas {
            let ty = Some(DataPathType::Datatransfer);
            assert_eq!(t.all_data_paths(n, ty, DataPathDirection::Incoming).len(), 4);
            assert_eq!(t.all_data_paths(n, ty, DataPathDirection::Outgoing).len(), 4);
            assert_eq!(t.all_data_paths(n, ty, DataPathDirection::Any).len(), 7);
        }
        assert_symmetric(&t);
    }

    #[test]
    fn test_update_component_moves_bucket_entry() {
        let mut t = Topology::new();
        let (root, a, b) = two_numas(&mut t);
        let c = t.create_under(root, Component::numa(2, -1)).unwrap();
        let r = t
            .add_data_path(a, b, DataPathOrientation::Oriented, DataPathType::None)
            .unwrap();

        t.update_target(r, c).unwrap();
        assert!(t.relations(b, RelationType::DataPath).is_empty());
        assert_eq!(t.relations(c, RelationType::DataPath), &[r]);
        assert_eq!(t.relation(r).unwrap().target(), Some(c));

        t.update_component_by(r, a, b).unwrap();
        assert_eq!(t.relation(r).unwrap().source(), Some(b));
        assert_symmetric(&t);

        assert_eq!(
            t.update_component(r, 5, a),
            Err(RelationError::IndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(
            t.update_component_by(r, a, c),
            Err(RelationError::ParticipantNotFound(a))
        );
        assert_eq!(t.relation(r).unwrap().components(), &[b, c]);
    }

    #[test]
    fn test_update_keeps_entry_for_remaining_position() {
        let mut t = Topology::new();
        let (_, a, b) = two_numas(&mut t);
        let r = t
            .add_data_path(a, a, DataPathOrientation::Oriented, DataPathType::None)
            .unwrap();
        t.update_target(r, b).unwrap();
        assert_eq!(t.relations(a, RelationType::DataPath), &[r]);
        assert_eq!(t.relations(b, RelationType::DataPath), &[r]);
    }

    #[test]
    fn test_generic_relation_grows_and_filters_by_position() {
        let mut t = Topology::new();
        let (root, a, b) = two_numas(&mut t);
        let r = t.add_relation(&[a, b], 42, true).unwrap();
        t.add_component(r, root).unwrap();

        assert_eq!(t.relation(r).unwrap().components(), &[a, b, root]);
        assert_eq!(t.relations(root, RelationType::Relation), &[r]);
        assert_eq!(t.all_relations_by(b, None, Some(1)), vec![r]);
        assert!(t.all_relations_by(b, None, Some(0)).is_empty());
        assert_eq!(t.all_relations_by(b, Some(RelationType::Relation), None), vec![r]);
        assert!(t.all_relations_by(b, Some(RelationType::DataPath), None).is_empty());

        let unordered = t.add_relation(&[a, b], 43, false).unwrap();
        assert_eq!(t.all_relations_by(b, None, Some(0)), vec![unordered]);
        assert_symmetric(&t);
    }

    #[test]
    fn test_deleting_component_removes_its_relations() {
        let mut t = Topology::new();
        let (root, a, b) = two_numas(&mut t);
        let r1 = t
            .add_data_path(a, b, DataPathOrientation::Oriented, DataPathType::None)
            .unwrap();
        let r2 = t.add_relation(&[root, a, b], 0, false).unwrap();

        t.delete(a, false).unwrap();
        assert!(t.relation(r1).is_none());
        assert!(t.relation(r2).is_none());
        assert!(t.relations(b, RelationType::DataPath).is_empty());
        assert!(t.relations(root, RelationType::Relation).is_empty());
        assert_eq!(t.delete_relation(r1), Err(RelationError::StaleRelation(r1)));
    }

    #[test]
    fn test_delete_all_relations_by_type() {
        let mut t = Topology::new();
        let (_, a, b) = two_numas(&mut t);
        t.add_data_path(a, b, DataPathOrientation::Oriented, DataPathType::None)
            .unwrap();
        t.add_data_path(b, a, DataPathOrientation::Oriented, DataPathType::None)
            .unwrap();
        let keep = t.add_relation(&[a, b], 0, false).unwrap();

        assert_eq!(t.delete_all_data_paths(a), 2);
        assert!(t.relations(b, RelationType::DataPath).is_empty());
        assert_eq!(t.relations(b, RelationType::Relation), &[keep]);
        assert_eq!(t.delete_all_relations(b, None), 1);
        assert_eq!(t.relation_count(), 0);
    }

    #[test]
    fn test_relation_without_participants_is_rejected() {
        let mut t = Topology::new();
        let expected = |kind| RelationError::InvalidArity {
            kind,
            expected: 1,
            actual: 0,
        };
        assert_eq!(t.add_relation(&[], 7, false), Err(expected("Relation")));
        assert_eq!(
            t.add_quantum_gate(&[], QuantumGateInfo::new(1, "x", 0.9, "")),
            Err(expected("QuantumGate"))
        );
        assert_eq!(t.relation_count(), 0);
    }

    #[test]
    fn test_backend_gate_helpers() {
        let mut t = Topology::new();
        let backend = t.create(Component::quantum_backend(0, 3));
        let qubits: Vec<_> = (0..3)
            .map(|i| t.create_under(backend, Component::qubit(i)).unwrap())
            .collect();

        let x = t
            .add_quantum_gate(&qubits[..1], QuantumGateInfo::new(1, "x", 0.999, ""))
            .unwrap();
        let cx = t
            .add_quantum_gate(&qubits[..2], QuantumGateInfo::new(2, "cx", 0.98, ""))
            .unwrap();
        let cm = t.add_coupling_map(qubits[0], qubits[1], 0.97).unwrap();

        assert_eq!(t.all_qubits(backend), qubits);
        assert_eq!(t.backend_gates(backend), vec![x, cx]);
        assert_eq!(t.gates_by_size(backend, 2), vec![cx]);
        assert_eq!(t.gates_by_type(backend, QuantumGateType::X), vec![x]);
        assert!(t.gates_by_type(backend, QuantumGateType::Toffoli).is_empty());
        assert_eq!(t.relation(cm).unwrap().coupling_fidelity(), Some(0.97));
        assert!(t.relation(cm).unwrap().is_ordered());

        assert_eq!(
            t.add_coupling_map(backend, qubits[2], 0.5),
            Err(RelationError::NotQubitLike(backend))
        );
    }
}
