//! Tagging
//!
//! Mutators report changes by tagging operations, components or whole IDs.
//! Tags only record entry points; nothing propagates until the next
//! [`Graph::flush_updates`].

use smallvec::SmallVec;
use tracing::trace;

use crate::id::{IdRecalc, IdType, IdUid};
use crate::node::{ComponentIndex, IdNodeIndex, Node, NodeType, OperationFlag, OperationIndex};

use super::Graph;

/// What caused a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateSource {
    /// Current frame changed.
    Time,
    /// Direct user edit. Propagates across user-edit-only relations.
    UserEdit,
    /// Relations were rebuilt.
    Relations,
    /// Visibility of an ID changed.
    Visibility,
}

impl Graph {
    /// Mark an operation as directly modified and seed the next flush with it.
    pub fn tag_operation(&mut self, operation: OperationIndex, source: UpdateSource) {
        self.add_entry_tag(operation);
        let node = &mut self.operations[operation.index()];
        node.flag |= OperationFlag::NEEDS_UPDATE | OperationFlag::DIRECTLY_MODIFIED;
        if source == UpdateSource::UserEdit {
            node.flag |= OperationFlag::USER_MODIFIED;
        }
    }

    /// Tag every operation of a component.
    pub fn tag_component(&mut self, component: ComponentIndex, source: UpdateSource) {
        let comp = &self.components[component.index()];
        if let Some(entry) = comp.entry_operation() {
            if self.operations[entry.index()].needs_update() {
                return;
            }
        }
        let operations: SmallVec<[OperationIndex; 8]> = comp.operations().collect();
        for op in operations {
            self.tag_operation(op, source);
        }
    }

    /// Tag the components of an ID selected by `recalc`. An empty `recalc`
    /// means "everything changed".
    ///
    /// IDs that are not in the graph are ignored, apart from
    /// [`IdRecalc::TIME`] which always reaches the time source.
    pub fn id_tag_update(&mut self, id: IdUid, recalc: IdRecalc, source: UpdateSource) {
        if recalc.contains(IdRecalc::TIME) {
            self.tag_time_source();
        }
        let Some(id_node) = self.find_id_node(id) else {
            trace!(uid = id.raw(), ?recalc, "tagged ID is not in the graph");
            return;
        };
        trace!(id = %self.id_nodes[id_node.index()].id_orig(), ?recalc, ?source, "tagging ID");

        if recalc.is_empty() {
            self.id_tag_update_all(id_node, source);
        }
        for bit in 0..u32::BITS {
            let flag = IdRecalc::from_bits_truncate(1 << bit);
            if !flag.is_empty() && recalc.contains(flag) {
                self.id_tag_update_single_flag(id_node, flag, source);
            }
        }
        // Cached simulation results are stale after any user edit.
        if source == UpdateSource::UserEdit {
            self.id_tag_update_single_flag(id_node, IdRecalc::POINT_CACHE, source);
        }
        let id_type = self.id_nodes[id_node.index()].id_type();
        self.tag_id_type_updated(id_type);
    }

    fn id_tag_update_all(&mut self, id_node: IdNodeIndex, source: UpdateSource) {
        let components: SmallVec<[ComponentIndex; 16]> = self.id_nodes[id_node.index()].components().collect();
        for component in components {
            match self.components[component.index()].node_type() {
                // Animation is driven by the time source.
                NodeType::Animation => continue,
                NodeType::CopyOnWrite => self.id_nodes[id_node.index()].is_cow_explicitly_tagged = true,
                _ => {}
            }
            self.tag_component(component, source);
        }
    }

    fn id_tag_update_single_flag(&mut self, id_node: IdNodeIndex, flag: IdRecalc, source: UpdateSource) {
        let id_type = self.id_nodes[id_node.index()].id_type();
        let Some(component_type) = recalc_component_type(id_type, flag) else {
            return;
        };
        self.tag_component_type(id_node, component_type, source);
    }

    fn tag_component_type(&mut self, id_node: IdNodeIndex, component_type: NodeType, source: UpdateSource) {
        let Some(component) = self.id_nodes[id_node.index()].find_component(component_type, "") else {
            trace!(?component_type, "tagged component is not in the graph");
            if component_type == NodeType::Animation {
                // No animation data to re-evaluate; refresh the copy instead.
                self.id_nodes[id_node.index()].is_cow_explicitly_tagged = true;
                self.tag_component_type(id_node, NodeType::CopyOnWrite, source);
            }
            return;
        };
        self.tag_component(component, source);
        if component_type == NodeType::CopyOnWrite {
            self.id_nodes[id_node.index()].is_cow_explicitly_tagged = true;
        } else if self.components[component.index()].need_tag_cow_before_update() {
            self.tag_component_type(id_node, NodeType::CopyOnWrite, source);
        }
    }
}

/// Component tagged by each recalc bit. Bits missing here only notify
/// editors or are handled before the lookup.
const RECALC_COMPONENTS: [(IdRecalc, NodeType); 12] = [
    (IdRecalc::TRANSFORM, NodeType::Transform),
    (IdRecalc::GEOMETRY, NodeType::Geometry),
    (IdRecalc::ANIMATION, NodeType::Animation),
    (IdRecalc::COPY_ON_WRITE, NodeType::CopyOnWrite),
    (IdRecalc::SHADING, NodeType::Shading),
    (IdRecalc::SELECT, NodeType::BatchCache),
    (IdRecalc::BASE_FLAGS, NodeType::ObjectFromLayer),
    (IdRecalc::POINT_CACHE, NodeType::PointCache),
    (IdRecalc::SEQUENCER_STRIPS, NodeType::Sequencer),
    (IdRecalc::PARAMETERS, NodeType::Parameters),
    (IdRecalc::SOURCE, NodeType::Parameters),
    (IdRecalc::AUDIO, NodeType::Audio),
];

/// Component tagged for a single recalc bit.
fn recalc_component_type(id_type: IdType, flag: IdRecalc) -> Option<NodeType> {
    if IdRecalc::PSYS_ALL.contains(flag) && !flag.is_empty() {
        return Some(if id_type == IdType::ParticleSettings {
            NodeType::ParticleSettings
        } else {
            NodeType::ParticleSystem
        });
    }
    RECALC_COMPONENTS
        .iter()
        .find(|(bit, _)| *bit == flag)
        .map(|&(_, component)| component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphContext;
    use crate::id::OriginalId;
    use crate::node::{OperationCode, OperationKey};

    struct Object {
        graph: Graph,
        uid: IdUid,
        id: IdNodeIndex,
    }

    impl Object {
        fn new() -> Self {
            let mut graph = Graph::new(GraphContext::default());
            let orig = OriginalId::new(7, IdType::Object, "Cube");
            let id = graph.add_id_node(&orig);
            Self {
                graph,
                uid: orig.uid(),
                id,
            }
        }

        fn with(&mut self, node_type: NodeType, opcode: OperationCode) -> OperationIndex {
            let comp = self.graph.add_component(self.id, node_type, "");
            self.graph.add_operation(comp, None, opcode)
        }
    }

    #[test]
    fn tag_operation_sets_flags_per_source() {
        let mut obj = Object::new();
        let op = obj.with(NodeType::Transform, OperationCode::TransformLocal);

        obj.graph.tag_operation(op, UpdateSource::Relations);
        let flag = obj.graph.operation(op).flag();
        assert!(flag.contains(OperationFlag::NEEDS_UPDATE | OperationFlag::DIRECTLY_MODIFIED));
        assert!(!flag.contains(OperationFlag::USER_MODIFIED));

        obj.graph.tag_operation(op, UpdateSource::UserEdit);
        assert!(obj.graph.operation(op).flag().contains(OperationFlag::USER_MODIFIED));
        assert_eq!(obj.graph.entry_tags().collect::<Vec<_>>(), vec![op]);
    }

    #[test]
    fn tag_component_skips_already_tagged_entry() {
        let mut obj = Object::new();
        let comp = obj.graph.add_component(obj.id, NodeType::Geometry, "");
        let init = obj.graph.add_operation(comp, None, OperationCode::GeometryEvalInit);
        let eval = obj.graph.add_operation(comp, None, OperationCode::GeometryEval);
        obj.graph.set_entry_operation(comp, init);

        obj.graph.tag_operation(init, UpdateSource::Relations);
        obj.graph.tag_component(comp, UpdateSource::Relations);
        assert!(!obj.graph.operation(eval).needs_update());

        obj.graph.clear_tags();
        obj.graph.mark_operation_evaluated(init);
        obj.graph.tag_component(comp, UpdateSource::Relations);
        assert!(obj.graph.operation(eval).needs_update());
        assert_eq!(obj.graph.entry_tags().count(), 2);
    }

    #[test]
    fn recalc_bits_select_components() {
        let mut obj = Object::new();
        let transform = obj.with(NodeType::Transform, OperationCode::TransformLocal);
        let geometry = obj.with(NodeType::Geometry, OperationCode::GeometryEval);
        let shading = obj.with(NodeType::Shading, OperationCode::Shading);
        let batch = obj.with(NodeType::BatchCache, OperationCode::BatchCacheUpdate);

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::GEOMETRY | IdRecalc::SELECT, UpdateSource::Relations);

        assert!(!obj.graph.operation(transform).needs_update());
        assert!(obj.graph.operation(geometry).needs_update());
        assert!(!obj.graph.operation(shading).needs_update());
        assert!(obj.graph.operation(batch).needs_update());
        assert!(obj.graph.id_type_updated(IdType::Object));
    }

    #[test]
    fn empty_recalc_tags_everything_but_animation() {
        let mut obj = Object::new();
        let anim = obj.with(NodeType::Animation, OperationCode::AnimationEval);
        let transform = obj.with(NodeType::Transform, OperationCode::TransformLocal);
        let cow = obj.with(NodeType::CopyOnWrite, OperationCode::CopyOnWrite);

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::empty(), UpdateSource::Relations);

        assert!(!obj.graph.operation(anim).needs_update());
        assert!(obj.graph.operation(transform).needs_update());
        assert!(obj.graph.operation(cow).needs_update());
        assert!(obj.graph.id_node(obj.id).is_cow_explicitly_tagged());
    }

    #[test]
    fn cow_dependent_component_tags_copy_on_write() {
        let mut obj = Object::new();
        let transform = obj.with(NodeType::Transform, OperationCode::TransformLocal);
        let shading = obj.with(NodeType::Shading, OperationCode::Shading);
        let cow = obj.with(NodeType::CopyOnWrite, OperationCode::CopyOnWrite);

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::SHADING, UpdateSource::Relations);
        assert!(obj.graph.operation(shading).needs_update());
        assert!(!obj.graph.operation(cow).needs_update());

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::TRANSFORM, UpdateSource::Relations);
        assert!(obj.graph.operation(transform).needs_update());
        assert!(obj.graph.operation(cow).needs_update());
        assert!(obj.graph.id_node(obj.id).is_cow_explicitly_tagged());
    }

    #[test]
    fn missing_animation_falls_back_to_copy_on_write() {
        let mut obj = Object::new();
        let cow = obj.with(NodeType::CopyOnWrite, OperationCode::CopyOnWrite);

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::ANIMATION, UpdateSource::Relations);
        assert!(obj.graph.operation(cow).needs_update());
        assert!(obj.graph.id_node(obj.id).is_cow_explicitly_tagged());
    }

    #[test]
    fn user_edit_resets_point_cache() {
        let mut obj = Object::new();
        let cache = obj.with(NodeType::PointCache, OperationCode::PointCacheReset);
        let params = obj.graph.add_component(obj.id, NodeType::Parameters, "");
        let prop = obj.graph.add_operation(
            params,
            None,
            OperationKey::new(OperationCode::IdProperty, "size", -1),
        );

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::PARAMETERS, UpdateSource::Relations);
        assert!(obj.graph.operation(prop).needs_update());
        assert!(!obj.graph.operation(cache).needs_update());

        obj.graph
            .id_tag_update(obj.uid, IdRecalc::PARAMETERS, UpdateSource::UserEdit);
        assert!(obj.graph.operation(cache).flag().contains(OperationFlag::USER_MODIFIED));
    }

    #[test]
    fn particle_bits_follow_id_type() {
        assert_eq!(
            recalc_component_type(IdType::ParticleSettings, IdRecalc::PSYS_RESET),
            Some(NodeType::ParticleSettings)
        );
        assert_eq!(
            recalc_component_type(IdType::Object, IdRecalc::PSYS_RESET),
            Some(NodeType::ParticleSystem)
        );
        assert_eq!(recalc_component_type(IdType::Object, IdRecalc::EDITORS), None);
        assert_eq!(recalc_component_type(IdType::Object, IdRecalc::TIME), None);
    }

    #[test]
    fn time_recalc_tags_time_source_even_for_unknown_ids() {
        let mut obj = Object::new();
        obj.graph
            .id_tag_update(IdUid::new(999), IdRecalc::TIME, UpdateSource::Time);
        assert!(obj.graph.time_source().is_tagged_for_update());
        assert_eq!(obj.graph.entry_tags().count(), 0);
    }
}
