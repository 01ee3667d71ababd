//! Queries
//!
//! Read-only iteration over the IDs of a graph, as used by editors and
//! render engines after an evaluation.

use bitflags::bitflags;

use crate::id::IdType;
use crate::node::{IdNode, LinkedState};

use super::Graph;

bitflags! {
    /// Filter for [`Graph::objects`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectIterFlags: u8 {
        const LINKED_DIRECTLY = 1 << 0;
        const LINKED_VIA_SET = 1 << 1;
        const LINKED_INDIRECTLY = 1 << 2;
        /// Skip objects disabled at evaluation time.
        const VISIBLE = 1 << 3;

        const LINKED_ALL = Self::LINKED_DIRECTLY.bits()
            | Self::LINKED_VIA_SET.bits()
            | Self::LINKED_INDIRECTLY.bits();
    }
}

impl ObjectIterFlags {
    fn accepts(&self, state: LinkedState) -> bool {
        let required = match state {
            LinkedState::Directly => Self::LINKED_DIRECTLY,
            LinkedState::ViaSet => Self::LINKED_VIA_SET,
            LinkedState::Indirectly => Self::LINKED_INDIRECTLY,
        };
        self.contains(required)
    }
}

impl Graph {
    /// ID nodes in creation order. With `only_updated`, only those whose
    /// evaluated copy carries recalc flags from the last flush.
    pub fn ids(&self, only_updated: bool) -> impl Iterator<Item = &IdNode> + '_ {
        self.id_nodes
            .iter()
            .filter(move |id_node| !only_updated || !id_node.id_cow().recalc().is_empty())
    }

    /// Object IDs matching the given linked states and visibility.
    pub fn objects(&self, flags: ObjectIterFlags) -> impl Iterator<Item = &IdNode> + '_ {
        self.id_nodes.iter().filter(move |id_node| {
            id_node.id_type() == IdType::Object
                && flags.accepts(id_node.linked_state())
                && (!flags.contains(ObjectIterFlags::VISIBLE) || id_node.is_enabled_on_eval())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphContext, UpdateSource};
    use crate::id::OriginalId;
    use crate::node::{NodeType, OperationCode};

    fn names<'a>(ids: impl Iterator<Item = &'a IdNode>) -> Vec<String> {
        ids.map(|id| id.id_orig().to_string()).collect()
    }

    #[test]
    fn objects_filter_by_linked_state_and_visibility() {
        let mut graph = Graph::new(GraphContext::default());
        let direct = graph.add_id_node(&OriginalId::new(1, IdType::Object, "Direct"));
        let set = graph.add_id_node(&OriginalId::new(2, IdType::Object, "Set"));
        graph.add_id_node(&OriginalId::new(3, IdType::Object, "Indirect"));
        let hidden = graph.add_id_node(&OriginalId::new(4, IdType::Object, "Hidden"));
        graph.add_id_node(&OriginalId::new(5, IdType::Mesh, "Mesh"));

        graph.id_node_mut(direct).promote_linked_state(LinkedState::Directly);
        graph.id_node_mut(set).promote_linked_state(LinkedState::ViaSet);
        graph.id_node_mut(hidden).promote_linked_state(LinkedState::Directly);
        graph.id_node_mut(hidden).set_enabled_on_eval(false);

        assert_eq!(
            names(graph.objects(ObjectIterFlags::LINKED_ALL)),
            vec!["OBDirect", "OBSet", "OBIndirect", "OBHidden"]
        );
        assert_eq!(
            names(graph.objects(ObjectIterFlags::LINKED_DIRECTLY | ObjectIterFlags::VISIBLE)),
            vec!["OBDirect"]
        );
        assert_eq!(
            names(graph.objects(ObjectIterFlags::LINKED_VIA_SET | ObjectIterFlags::LINKED_INDIRECTLY)),
            vec!["OBSet", "OBIndirect"]
        );
        assert_eq!(graph.objects(ObjectIterFlags::VISIBLE).count(), 0);
    }

    #[test]
    fn ids_only_updated_follows_recalc() {
        let mut graph = Graph::new(GraphContext::default());
        let cube = graph.add_id_node(&OriginalId::new(1, IdType::Object, "Cube"));
        graph.add_id_node(&OriginalId::new(2, IdType::Object, "Plane"));
        graph.id_node_mut(cube).id_cow_mut().expand(Box::new(()));
        let comp = graph.add_component(cube, NodeType::Transform, "");
        let op = graph.add_operation(comp, None, OperationCode::TransformLocal);

        assert_eq!(graph.ids(false).count(), 2);
        assert_eq!(graph.ids(true).count(), 0);

        graph.tag_operation(op, UpdateSource::UserEdit);
        graph.flush_updates();
        assert_eq!(names(graph.ids(true)), vec!["OBCube"]);

        graph.clear_id_recalc();
        assert_eq!(graph.ids(true).count(), 0);
    }

    #[test]
    fn clear_id_recalc_covers_unexpanded_copies() {
        let mut graph = Graph::new(GraphContext::default());
        let hidden = graph.add_id_node(&OriginalId::new(1, IdType::Object, "Hidden"));
        let comp = graph.add_component(hidden, NodeType::Transform, "");
        let op = graph.add_operation(comp, None, OperationCode::TransformLocal);

        graph.tag_operation(op, UpdateSource::UserEdit);
        graph.flush_updates();
        graph.mark_operation_evaluated(op);
        assert!(!graph.id_node(hidden).id_cow().is_expanded());
        assert_eq!(names(graph.ids(true)), vec!["OBHidden"]);

        graph.clear_id_recalc();
        graph.flush_updates();
        assert_eq!(graph.ids(true).count(), 0);
        assert!(graph.id_recalc(hidden).is_empty());
    }
}
