//! Per-type component table.
//!
//! Component behavior differs only in a handful of static properties, so
//! instead of one type per component kind there is one [`NodeFactory`] entry
//! per [`NodeType`], built once and shared by the whole process.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::id::IdRecalc;

use super::{ComponentNode, IdNodeIndex, NodeType};

/// Static description of a component type, and its constructor.
#[derive(Debug)]
pub struct NodeFactory {
    node_type: NodeType,
    type_name: &'static str,
    id_recalc_tag: IdRecalc,
    depends_on_cow: bool,
    need_tag_cow_before_update: bool,
}

impl NodeFactory {
    const fn generic(node_type: NodeType, type_name: &'static str, id_recalc_tag: IdRecalc) -> Self {
        Self {
            node_type,
            type_name,
            id_recalc_tag,
            depends_on_cow: true,
            need_tag_cow_before_update: true,
        }
    }

    /// Components whose tagging does not require the copy-on-write
    /// component to re-run first.
    const fn no_cow_tag_on_update(node_type: NodeType, type_name: &'static str, id_recalc_tag: IdRecalc) -> Self {
        Self {
            need_tag_cow_before_update: false,
            ..Self::generic(node_type, type_name, id_recalc_tag)
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Display name used in identifiers.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recalc flags stored on the evaluated copy when this component was
    /// flushed.
    pub fn id_recalc_tag(&self) -> IdRecalc {
        self.id_recalc_tag
    }

    /// Whether evaluating the component needs the owner's evaluated copy.
    pub fn depends_on_cow(&self) -> bool {
        self.depends_on_cow
    }

    /// Whether tagging the component also tags the owner's copy-on-write
    /// component.
    pub fn need_tag_cow_before_update(&self) -> bool {
        self.need_tag_cow_before_update
    }

    pub(crate) fn create_component(&self, owner: IdNodeIndex, name: &str) -> ComponentNode {
        ComponentNode::new(self.node_type, name, owner)
    }
}

static FACTORIES: OnceLock<HashMap<NodeType, NodeFactory>> = OnceLock::new();

fn build_factories() -> HashMap<NodeType, NodeFactory> {
    let entries = [
        NodeFactory::generic(NodeType::Parameters, "Parameters", IdRecalc::PARAMETERS),
        NodeFactory::generic(NodeType::Animation, "Animation", IdRecalc::ANIMATION),
        NodeFactory::generic(NodeType::Transform, "Transform", IdRecalc::TRANSFORM),
        NodeFactory::generic(NodeType::Geometry, "Geometry", IdRecalc::GEOMETRY),
        NodeFactory::generic(NodeType::Sequencer, "Sequencer", IdRecalc::SEQUENCER_STRIPS),
        NodeFactory::generic(NodeType::LayerCollections, "Layer Collections", IdRecalc::empty()),
        NodeFactory {
            depends_on_cow: false,
            need_tag_cow_before_update: false,
            ..NodeFactory::generic(NodeType::CopyOnWrite, "Copy-on-Write", IdRecalc::COPY_ON_WRITE)
        },
        NodeFactory::no_cow_tag_on_update(NodeType::ObjectFromLayer, "Object from Layer", IdRecalc::empty()),
        NodeFactory::generic(NodeType::Audio, "Audio", IdRecalc::AUDIO),
        NodeFactory::generic(NodeType::Armature, "Armature", IdRecalc::GEOMETRY),
        NodeFactory::generic(NodeType::GenericDatablock, "Generic Datablock", IdRecalc::empty()),
        NodeFactory::no_cow_tag_on_update(NodeType::Visibility, "Visibility", IdRecalc::empty()),
        NodeFactory::generic(NodeType::Simulation, "Simulation", IdRecalc::empty()),
        NodeFactory::generic(NodeType::NTreeOutput, "NTree Output", IdRecalc::empty()),
        NodeFactory::generic(NodeType::EvalPose, "Eval Pose", IdRecalc::GEOMETRY),
        NodeFactory::generic(NodeType::Bone, "Bone", IdRecalc::GEOMETRY),
        NodeFactory::generic(NodeType::ParticleSystem, "Particle System", IdRecalc::PSYS_ALL),
        NodeFactory::generic(NodeType::ParticleSettings, "Particle Settings", IdRecalc::PSYS_ALL),
        NodeFactory::no_cow_tag_on_update(NodeType::Shading, "Shading", IdRecalc::SHADING),
        NodeFactory::generic(NodeType::ShadingParameters, "Shading Parameters", IdRecalc::SHADING),
        NodeFactory::generic(NodeType::Cache, "Cache", IdRecalc::empty()),
        NodeFactory::generic(NodeType::PointCache, "Point Cache", IdRecalc::POINT_CACHE),
        NodeFactory::generic(NodeType::ImageAnimation, "Image Animation", IdRecalc::empty()),
        NodeFactory::no_cow_tag_on_update(NodeType::BatchCache, "Batch Cache", IdRecalc::SHADING),
        NodeFactory::no_cow_tag_on_update(NodeType::Dupli, "Dupli", IdRecalc::empty()),
        NodeFactory::no_cow_tag_on_update(NodeType::Synchronization, "Synchronization", IdRecalc::empty()),
    ];

    entries
        .into_iter()
        .map(|factory| (factory.node_type, factory))
        .collect()
}

/// Factory for a component type. `None` for generic and operation types.
pub fn type_get_factory(node_type: NodeType) -> Option<&'static NodeFactory> {
    FACTORIES.get_or_init(build_factories).get(&node_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_component_type_has_a_factory() {
        for component in NodeType::COMPONENTS {
            let factory = type_get_factory(component).expect("missing factory");
            assert_eq!(factory.node_type(), component);
        }
        assert!(type_get_factory(NodeType::Operation).is_none());
        assert!(type_get_factory(NodeType::IdRef).is_none());
    }

    #[test]
    fn copy_on_write_component_is_self_contained() {
        let cow = type_get_factory(NodeType::CopyOnWrite).unwrap();
        assert!(!cow.depends_on_cow());
        assert!(!cow.need_tag_cow_before_update());

        let transform = type_get_factory(NodeType::Transform).unwrap();
        assert!(transform.depends_on_cow());
        assert!(transform.need_tag_cow_before_update());

        let shading = type_get_factory(NodeType::Shading).unwrap();
        assert!(shading.depends_on_cow());
        assert!(!shading.need_tag_cow_before_update());
    }

    #[test]
    fn recalc_tags_per_type() {
        assert_eq!(type_get_factory(NodeType::Bone).unwrap().id_recalc_tag(), IdRecalc::GEOMETRY);
        assert_eq!(
            type_get_factory(NodeType::ParticleSettings).unwrap().id_recalc_tag(),
            IdRecalc::PSYS_ALL
        );
        assert!(type_get_factory(NodeType::Cache).unwrap().id_recalc_tag().is_empty());
    }
}
