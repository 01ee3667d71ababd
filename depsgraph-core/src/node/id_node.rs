//! ID Nodes
//!
//! One ID node exists per original data-block. It owns the components of
//! that block and its evaluated copy.

use indexmap::IndexMap;

use crate::cow::EvaluatedCopy;
use crate::id::{IdType, OriginalId};

use super::{ComponentIndex, ComponentKey, Node, NodeType};

/// Bit set of component types, indexed by [`NodeType`] discriminant.
pub type IdComponentsMask = u64;

/// How an ID ended up in the graph. Ordered: a stronger link wins when the
/// same ID is reached several ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LinkedState {
    /// Only pulled in as a dependency of something else.
    #[default]
    Indirectly,
    /// Part of a background set scene.
    ViaSet,
    /// Part of the evaluated view layer.
    Directly,
}

/// Flush-pass state of an ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdState {
    #[default]
    None,
    Modified,
}

#[derive(Debug)]
pub struct IdNode {
    id_orig: OriginalId,
    pub(crate) id_cow: EvaluatedCopy,

    components: IndexMap<ComponentKey, ComponentIndex>,

    linked_state: LinkedState,

    /// Visibility known while building relations.
    pub(crate) is_visible_on_build: bool,
    /// Visibility after evaluating animated and driven flags.
    pub(crate) is_enabled_on_eval: bool,

    visible_components_mask: IdComponentsMask,
    previously_visible_components_mask: IdComponentsMask,

    pub(crate) custom_flags: IdState,

    /// Caller requested a full refresh of the evaluated copy.
    pub(crate) is_cow_explicitly_tagged: bool,
}

impl IdNode {
    pub(crate) fn new(id: OriginalId) -> Self {
        let id_cow = EvaluatedCopy::for_type(id.id_type());
        Self {
            id_orig: id,
            id_cow,
            components: IndexMap::new(),
            linked_state: LinkedState::Indirectly,
            is_visible_on_build: true,
            is_enabled_on_eval: true,
            visible_components_mask: 0,
            previously_visible_components_mask: 0,
            custom_flags: IdState::None,
            is_cow_explicitly_tagged: false,
        }
    }

    pub fn id_orig(&self) -> &OriginalId {
        &self.id_orig
    }

    pub fn id_type(&self) -> IdType {
        self.id_orig.id_type()
    }

    pub fn id_cow(&self) -> &EvaluatedCopy {
        &self.id_cow
    }

    pub fn id_cow_mut(&mut self) -> &mut EvaluatedCopy {
        &mut self.id_cow
    }

    pub fn find_component(&self, node_type: NodeType, name: &str) -> Option<ComponentIndex> {
        self.components.get(&ComponentKey::new(node_type, name)).copied()
    }

    /// Components in creation order.
    pub fn components(&self) -> impl ExactSizeIterator<Item = ComponentIndex> + '_ {
        self.components.values().copied()
    }

    pub(crate) fn insert_component(&mut self, key: ComponentKey, index: ComponentIndex) {
        self.components.insert(key, index);
    }

    pub fn linked_state(&self) -> LinkedState {
        self.linked_state
    }

    /// Raise the linked state; never lowers it.
    pub fn promote_linked_state(&mut self, state: LinkedState) {
        self.linked_state = self.linked_state.max(state);
    }

    pub fn is_visible_on_build(&self) -> bool {
        self.is_visible_on_build
    }

    pub fn set_visible_on_build(&mut self, visible: bool) {
        self.is_visible_on_build = visible;
    }

    pub fn is_enabled_on_eval(&self) -> bool {
        self.is_enabled_on_eval
    }

    pub fn set_enabled_on_eval(&mut self, enabled: bool) {
        self.is_enabled_on_eval = enabled;
    }

    pub fn visible_components_mask(&self) -> IdComponentsMask {
        self.visible_components_mask
    }

    pub fn previously_visible_components_mask(&self) -> IdComponentsMask {
        self.previously_visible_components_mask
    }

    /// Store a freshly computed mask, keeping the old one for comparison.
    pub(crate) fn update_visible_components_mask(&mut self, mask: IdComponentsMask) {
        self.previously_visible_components_mask = self.visible_components_mask;
        self.visible_components_mask = mask;
    }

    pub fn state(&self) -> IdState {
        self.custom_flags
    }

    pub fn is_cow_explicitly_tagged(&self) -> bool {
        self.is_cow_explicitly_tagged
    }

    /// Force a full refresh of the evaluated copy, for changes that cannot be
    /// expressed through operations and relations.
    pub fn tag_cow_explicitly(&mut self) {
        self.is_cow_explicitly_tagged = true;
    }

    pub fn clear_cow_explicit_tag(&mut self) {
        self.is_cow_explicitly_tagged = false;
    }
}

impl Node for IdNode {
    fn node_type(&self) -> NodeType {
        NodeType::IdRef
    }

    fn name(&self) -> &str {
        self.id_orig.name()
    }

    fn identifier(&self) -> String {
        format!("{}({})", NodeType::IdRef, self.id_orig)
    }
}
