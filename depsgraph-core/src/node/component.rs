//! Component Nodes
//!
//! A component groups the operations of one evaluation domain of an ID. Its
//! designated entry and exit operations let other components depend on it
//! with a single relation instead of one per inner operation.

use indexmap::IndexMap;

use crate::id::IdRecalc;

use super::factory::{type_get_factory, NodeFactory};
use super::{IdNodeIndex, Node, NodeType, OperationCode, OperationIndex, OperationKey};

/// Flush-pass state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentState {
    #[default]
    None,
    /// Entry operation queued by a special rule, not yet processed.
    Scheduled,
    /// All operations tagged.
    Done,
}

/// Lookup key of a component within its ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    pub node_type: NodeType,
    pub name: String,
}

impl ComponentKey {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
        }
    }
}

#[derive(Debug)]
pub struct ComponentNode {
    node_type: NodeType,
    name: String,
    owner: IdNodeIndex,

    /// Owned operations in insertion order.
    operations: IndexMap<OperationKey, OperationIndex>,

    entry_operation: Option<OperationIndex>,
    exit_operation: Option<OperationIndex>,

    pub(crate) custom_flags: ComponentState,

    /// Conservative: set at build time if anything visible might read this.
    pub(crate) possibly_affects_visible_id: bool,
    /// Refined with runtime visibility.
    pub(crate) affects_visible_id: bool,
}

impl ComponentNode {
    pub(crate) fn new(node_type: NodeType, name: &str, owner: IdNodeIndex) -> Self {
        debug_assert!(node_type.is_component(), "{node_type} is not a component type");
        Self {
            node_type,
            name: name.to_owned(),
            owner,
            operations: IndexMap::new(),
            entry_operation: None,
            exit_operation: None,
            custom_flags: ComponentState::None,
            possibly_affects_visible_id: false,
            affects_visible_id: false,
        }
    }

    fn factory(&self) -> &'static NodeFactory {
        type_get_factory(self.node_type)
            .unwrap_or_else(|| panic!("no factory registered for {}", self.node_type))
    }

    /// ID node owning this component.
    pub fn owner(&self) -> IdNodeIndex {
        self.owner
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.node_type, self.name.clone())
    }

    pub fn state(&self) -> ComponentState {
        self.custom_flags
    }

    pub fn depends_on_cow(&self) -> bool {
        self.factory().depends_on_cow()
    }

    pub fn need_tag_cow_before_update(&self) -> bool {
        self.factory().need_tag_cow_before_update()
    }

    pub fn id_recalc_tag(&self) -> IdRecalc {
        self.factory().id_recalc_tag()
    }

    pub fn possibly_affects_visible_id(&self) -> bool {
        self.possibly_affects_visible_id
    }

    pub fn affects_visible_id(&self) -> bool {
        self.affects_visible_id
    }

    pub fn find_operation(&self, key: &OperationKey) -> Option<OperationIndex> {
        self.operations.get(key).copied()
    }

    /// Shorthand for an unnamed, untagged operation.
    pub fn find_opcode(&self, opcode: OperationCode) -> Option<OperationIndex> {
        self.find_operation(&OperationKey::from(opcode))
    }

    /// Like [`find_operation`](Self::find_operation), for keys the caller
    /// knows were registered.
    ///
    /// # Panics
    ///
    /// If no operation has this key.
    pub fn get_operation(&self, key: &OperationKey) -> OperationIndex {
        match self.find_operation(key) {
            Some(index) => index,
            None => panic!("{} has no operation {key}", self.identifier()),
        }
    }

    pub fn has_operation(&self, key: &OperationKey) -> bool {
        self.operations.contains_key(key)
    }

    /// Operations in insertion order.
    pub fn operations(&self) -> impl ExactSizeIterator<Item = OperationIndex> + '_ {
        self.operations.values().copied()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub(crate) fn insert_operation(&mut self, key: OperationKey, index: OperationIndex) {
        self.operations.insert(key, index);
    }

    pub(crate) fn set_entry_operation(&mut self, index: OperationIndex) {
        debug_assert!(self.operations.values().any(|op| *op == index));
        self.entry_operation = Some(index);
    }

    pub(crate) fn set_exit_operation(&mut self, index: OperationIndex) {
        debug_assert!(self.operations.values().any(|op| *op == index));
        self.exit_operation = Some(index);
    }

    /// Designated entry, or the only operation of a single-operation
    /// component.
    pub fn entry_operation(&self) -> Option<OperationIndex> {
        self.entry_operation.or_else(|| self.sole_operation())
    }

    /// Designated exit, or the only operation of a single-operation
    /// component.
    pub fn exit_operation(&self) -> Option<OperationIndex> {
        self.exit_operation.or_else(|| self.sole_operation())
    }

    fn sole_operation(&self) -> Option<OperationIndex> {
        if self.operations.len() == 1 {
            self.operations.values().next().copied()
        } else {
            None
        }
    }
}

impl Node for ComponentNode {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> String {
        format!("{}({})", self.factory().type_name(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(node_type: NodeType) -> ComponentNode {
        ComponentNode::new(node_type, "", IdNodeIndex::new(0))
    }

    #[test]
    fn single_operation_is_entry_and_exit() {
        let mut comp = component(NodeType::Transform);
        assert_eq!(comp.entry_operation(), None);

        let op = OperationIndex::new(3);
        comp.insert_operation(OperationCode::TransformLocal.into(), op);
        assert_eq!(comp.entry_operation(), Some(op));
        assert_eq!(comp.exit_operation(), Some(op));
    }

    #[test]
    fn explicit_boundaries_win() {
        let mut comp = component(NodeType::Transform);
        let init = OperationIndex::new(0);
        let local = OperationIndex::new(1);
        let done = OperationIndex::new(2);
        comp.insert_operation(OperationCode::TransformInit.into(), init);
        comp.insert_operation(OperationCode::TransformLocal.into(), local);
        assert_eq!(comp.entry_operation(), None);

        comp.insert_operation(OperationCode::TransformFinal.into(), done);
        comp.set_entry_operation(init);
        comp.set_exit_operation(done);
        assert_eq!(comp.entry_operation(), Some(init));
        assert_eq!(comp.exit_operation(), Some(done));
    }

    #[test]
    fn keyed_lookup_distinguishes_names_and_tags() {
        let mut comp = component(NodeType::Parameters);
        let a = OperationKey::new(OperationCode::IdProperty, "a", -1);
        let a0 = OperationKey::new(OperationCode::IdProperty, "a", 0);
        comp.insert_operation(a.clone(), OperationIndex::new(0));
        comp.insert_operation(a0.clone(), OperationIndex::new(1));

        assert_eq!(comp.find_operation(&a), Some(OperationIndex::new(0)));
        assert_eq!(comp.get_operation(&a0), OperationIndex::new(1));
        assert!(!comp.has_operation(&OperationKey::new(OperationCode::IdProperty, "b", -1)));
        assert_eq!(comp.operations().collect::<Vec<_>>(), vec![OperationIndex::new(0), OperationIndex::new(1)]);
    }

    #[test]
    #[should_panic(expected = "has no operation")]
    fn get_operation_panics_on_unknown_key() {
        component(NodeType::Geometry).get_operation(&OperationCode::GeometryEval.into());
    }

    #[test]
    fn identifier_uses_type_name() {
        let comp = ComponentNode::new(NodeType::Bone, "forearm", IdNodeIndex::new(0));
        assert_eq!(comp.identifier(), "Bone(forearm)");
    }
}
