//! Component arena and tree operations
//!
//! [`Topology`] owns every component and every relation. Components are
//! addressed by [`ComponentId`] handles; a deleted slot is never reused, so a
//! handle outliving its component resolves to `None` instead of to a
//! different node.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::component::{Component, ComponentKind, ComponentType};
use crate::error::SpliceError;
use crate::relation::{Relation, RelationKind};

/// Handle to a component inside a [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Handle to a relation inside a [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(pub(crate) u32);

impl RelationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Arena holding a forest of components and the relations between them.
#[derive(Debug, Default)]
pub struct Topology {
    pub(crate) components: Vec<Option<Component>>,
    pub(crate) relations: Vec<Option<Relation>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a detached component into the arena as a new root.
    pub fn create(&mut self, component: Component) -> ComponentId {
        let id = ComponentId(self.components.len() as u32);
        self.components.push(Some(component));
        id
    }

    /// Move a component into the arena and append it to `parent`'s children.
    pub fn create_under(
        &mut self,
        parent: ComponentId,
        component: Component,
    ) -> Result<ComponentId, SpliceError> {
        if !self.contains(parent) {
            return Err(SpliceError::StaleHandle(parent));
        }
        let id = self.create(component);
        self.insert_child(parent, id)?;
        Ok(id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.index()).and_then(Option::as_ref)
    }

    pub fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        self.relations.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Handles of all live components, in creation order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| ComponentId(i as u32))
    }

    /// Handles of all live relations, in creation order.
    pub fn relation_ids(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.relations
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| RelationId(i as u32))
    }

    /// Live components without a parent.
    pub fn roots(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.component_ids()
            .filter(|id| self.get(*id).is_some_and(|c| c.parent.is_none()))
    }

    pub fn component_count(&self) -> usize {
        self.components.iter().filter(|c| c.is_some()).count()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.iter().filter(|r| r.is_some()).count()
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.get(id)?.parent
    }

    /// Children of `id`; empty for a stale handle.
    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        self.get(id).map(|c| c.children.as_slice()).unwrap_or_default()
    }

    fn component_type_of(&self, id: ComponentId) -> Option<ComponentType> {
        self.get(id).map(Component::component_type)
    }

    fn require(&self, id: ComponentId) -> Result<(), SpliceError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(SpliceError::StaleHandle(id))
        }
    }

    // ------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------

    /// Set `child`'s parent link and append it to `parent`'s children.
    ///
    /// Duplicate insertion is not checked.
    pub fn insert_child(&mut self, parent: ComponentId, child: ComponentId) -> Result<(), SpliceError> {
        self.require(parent)?;
        self.require(child)?;
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
        Ok(())
    }

    fn check_parents_child(&self, parent: ComponentId, child: ComponentId) -> Result<(), SpliceError> {
        self.require(child)?;
        let linked = self.parent(child) == Some(parent);
        let listed = self.children(parent).contains(&child);
        match (linked, listed) {
            (true, true) => Ok(()),
            (false, true) => Err(SpliceError::NotParentsChild { parent, child }),
            (false, false) => Err(SpliceError::Unrelated { parent, child }),
            (true, false) => Err(SpliceError::MissingFromChildren { parent, child }),
        }
    }

    fn move_under(&mut self, new_node: ComponentId, parent: ComponentId, child: ComponentId) {
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(new_node);
        }
        if let Some(n) = self.get_mut(new_node) {
            n.children.push(child);
        }
    }

    /// Splice `new_node` into the edge `parent -> child`.
    ///
    /// The parent/child pair is checked in both directions before anything
    /// is changed. When `already_parents_child` is set, `new_node` is assumed
    /// to be attached to `parent` already and is not appended again.
    pub fn insert_between_parent_and_child(
        &mut self,
        new_node: ComponentId,
        parent: ComponentId,
        child: ComponentId,
        already_parents_child: bool,
    ) -> Result<(), SpliceError> {
        self.insert_between_parent_and_children(new_node, parent, &[child], already_parents_child)
    }

    /// Batch form of [`insert_between_parent_and_child`](Self::insert_between_parent_and_child).
    ///
    /// Every child is validated before any of them is moved.
    pub fn insert_between_parent_and_children(
        &mut self,
        new_node: ComponentId,
        parent: ComponentId,
        children: &[ComponentId],
        already_parents_child: bool,
    ) -> Result<(), SpliceError> {
        self.require(new_node)?;
        self.require(parent)?;
        for &child in children {
            if let Err(err) = self.check_parents_child(parent, child) {
                warn!(parent = %parent, child = %child, code = err.code(), "Refusing tree splice");
                return Err(err);
            }
        }

        for &child in children {
            self.move_under(new_node, parent, child);
        }

        if !already_parents_child {
            if let Some(n) = self.get_mut(new_node) {
                n.parent = Some(parent);
            }
            if let Some(p) = self.get_mut(parent) {
                p.children.push(new_node);
            }
        }
        Ok(())
    }

    /// Remove `child` from `parent`'s children without deleting it.
    ///
    /// The child's parent link is cleared when it pointed at `parent`.
    /// Returns the number of entries removed.
    pub fn remove_child(&mut self, parent: ComponentId, child: ComponentId) -> usize {
        let removed = match self.get_mut(parent) {
            Some(p) => {
                let before = p.children.len();
                p.children.retain(|c| *c != child);
                before - p.children.len()
            }
            None => 0,
        };
        if let Some(c) = self.get_mut(child) {
            if c.parent == Some(parent) {
                c.parent = None;
            }
        }
        removed
    }

    /// Delete a component and every relation touching it.
    ///
    /// With `with_subtree` all descendants are deleted first. Otherwise the
    /// children are appended to the former parent's children, or become roots
    /// when the component had no parent.
    pub fn delete(&mut self, id: ComponentId, with_subtree: bool) -> Result<(), SpliceError> {
        self.require(id)?;
        if with_subtree {
            self.delete_subtree(id);
        }
        self.delete_all_relations(id, None);

        let Some(component) = self.components.get_mut(id.index()).and_then(Option::take) else {
            return Err(SpliceError::StaleHandle(id));
        };
        debug!(component = %id, name = component.name(), with_subtree, "Deleting component");

        let new_parent = component.parent.filter(|p| self.contains(*p));
        if let Some(p) = new_parent {
            if let Some(parent) = self.get_mut(p) {
                parent.children.retain(|c| *c != id);
            }
        }
        for child in component.children {
            if let Some(c) = self.get_mut(child) {
                c.parent = new_parent;
            }
            if let Some(p) = new_parent {
                if let Some(parent) = self.get_mut(p) {
                    parent.children.push(child);
                }
            }
        }
        Ok(())
    }

    /// Delete every descendant of `id`, keeping `id` itself.
    pub fn delete_subtree(&mut self, id: ComponentId) {
        let children = match self.get_mut(id) {
            Some(c) => std::mem::take(&mut c.children),
            None => return,
        };
        for child in children {
            if let Some(c) = self.get_mut(child) {
                c.parent = None;
            }
            let _ = self.delete(child, true);
        }
    }

    // ------------------------------------------------------------------
    // Tree queries
    // ------------------------------------------------------------------

    pub fn child_by_id(&self, parent: ComponentId, id: i32) -> Option<ComponentId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.get(*c).is_some_and(|c| c.id() == id))
    }

    /// First child of the given type, in children order.
    pub fn child_by_type(&self, parent: ComponentId, component_type: ComponentType) -> Option<ComponentId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.component_type_of(*c) == Some(component_type))
    }

    pub fn all_children_by_type(&self, parent: ComponentId, component_type: ComponentType) -> Vec<ComponentId> {
        self.children(parent)
            .iter()
            .copied()
            .filter(|c| self.component_type_of(*c) == Some(component_type))
            .collect()
    }

    pub fn count_all_children_by_type(&self, parent: ComponentId, component_type: ComponentType) -> usize {
        self.all_children_by_type(parent, component_type).len()
    }

    /// Depth-first pre-order listing of the subtree, `root` included.
    pub fn components_in_subtree(&self, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        if !self.contains(root) {
            return out;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// First component in pre-order with the given id and type, `root` included.
    pub fn subcomponent_by_id(
        &self,
        root: ComponentId,
        id: i32,
        component_type: ComponentType,
    ) -> Option<ComponentId> {
        self.components_in_subtree(root).into_iter().find(|c| {
            self.get(*c)
                .is_some_and(|c| c.id() == id && c.component_type() == component_type)
        })
    }

    /// All components of the given type in pre-order, `root` included.
    pub fn all_subcomponents_by_type(&self, root: ComponentId, component_type: ComponentType) -> Vec<ComponentId> {
        self.components_in_subtree(root)
            .into_iter()
            .filter(|c| self.component_type_of(*c) == Some(component_type))
            .collect()
    }

    /// Descendants of the given type, `root` excluded.
    pub fn count_all_subcomponents_by_type(&self, root: ComponentId, component_type: ComponentType) -> usize {
        self.components_in_subtree(root)
            .into_iter()
            .skip(1)
            .filter(|c| self.component_type_of(*c) == Some(component_type))
            .count()
    }

    /// Number of descendants, `root` excluded.
    pub fn count_all_subcomponents(&self, root: ComponentId) -> usize {
        self.components_in_subtree(root).len().saturating_sub(1)
    }

    /// Nearest component of the given type on the path to the root, `id` included.
    pub fn ancestor_by_type(&self, id: ComponentId, component_type: ComponentType) -> Option<ComponentId> {
        let mut current = Some(id);
        while let Some(c) = current {
            let component = self.get(c)?;
            if component.component_type() == component_type {
                return Some(c);
            }
            current = component.parent;
        }
        None
    }

    /// `n` levels up; `n == 0` is the component itself.
    pub fn nth_ancestor(&self, id: ComponentId, n: usize) -> Option<ComponentId> {
        let mut current = id;
        self.get(current)?;
        for _ in 0..n {
            current = self.parent(current)?;
        }
        Some(current)
    }

    /// Descendants exactly `depth` levels below `id`, in pre-order.
    pub fn nth_descendants(&self, id: ComponentId, depth: usize) -> Vec<ComponentId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut level = vec![id];
        for _ in 0..depth {
            level = level
                .iter()
                .flat_map(|c| self.children(*c).iter().copied())
                .collect();
        }
        level
    }

    /// Height of the subtree below `id`; 0 for a leaf.
    pub fn subtree_depth(&self, id: ComponentId) -> usize {
        self.children(id)
            .iter()
            .map(|c| self.subtree_depth(*c) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Distance to the root. Without `refresh` the cached value is returned.
    pub fn depth(&mut self, id: ComponentId, refresh: bool) -> Option<usize> {
        if refresh {
            let mut depth = 0;
            let mut current = self.parent(id);
            while let Some(p) = current {
                depth += 1;
                current = self.parent(p);
            }
            self.get_mut(id)?.depth = depth;
        }
        self.get(id).map(|c| c.depth)
    }

    /// Count children in the subtree whose parent link does not point back.
    ///
    /// Children referring to deleted slots are counted as well. Nothing is
    /// repaired.
    pub fn check_consistency(&self, root: ComponentId) -> usize {
        let mut errors = 0;
        for id in self.components_in_subtree(root) {
            for child in self.children(id) {
                match self.get(*child) {
                    Some(c) if c.parent == Some(id) => {}
                    _ => {
                        debug!(parent = %id, child = %child, "Inconsistent parent link");
                        errors += 1;
                    }
                }
            }
        }
        errors
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Serializable snapshot of the subtree at `root` and every relation
    /// touching it.
    pub fn to_graph(&self, root: ComponentId) -> TopologyGraph {
        let subtree = self.components_in_subtree(root);
        let nodes = subtree
            .iter()
            .filter_map(|id| {
                let c = self.get(*id)?;
                Some(GraphNode {
                    handle: *id,
                    id: c.id(),
                    name: c.name().to_string(),
                    count: c.count(),
                    kind: c.kind().clone(),
                    parent: c.parent,
                    children: c.children.clone(),
                })
            })
            .collect();

        let mut seen = Vec::new();
        for id in &subtree {
            if let Some(c) = self.get(*id) {
                for (_, r) in c.relations.iter() {
                    if !seen.contains(&r) {
                        seen.push(r);
                    }
                }
            }
        }
        seen.sort();
        let edges = seen
            .into_iter()
            .filter_map(|rid| {
                let r = self.relation(rid)?;
                Some(GraphEdge {
                    handle: rid,
                    id: r.id(),
                    ordered: r.is_ordered(),
                    kind: r.kind().clone(),
                    components: r.components().to_vec(),
                })
            })
            .collect();

        TopologyGraph {
            root,
            nodes,
            edges,
        }
    }

    pub fn to_json_pretty(&self, root: ComponentId) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_graph(root))
    }
}

/// One component in a [`TopologyGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub handle: ComponentId,
    pub id: i32,
    pub name: String,
    pub count: i32,
    pub kind: ComponentKind,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,
}

/// One relation in a [`TopologyGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub handle: RelationId,
    pub id: i32,
    pub ordered: bool,
    pub kind: RelationKind,
    pub components: Vec<ComponentId>,
}

/// Serializable view of a subtree, nodes in pre-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub root: ComponentId,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
