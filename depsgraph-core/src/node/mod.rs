//! Graph Nodes
//!
//! This module defines the node hierarchy that lives in the dependency graph:
//!
//! - [`IdNode`]: one per original data-block, owns components
//! - [`ComponentNode`]: one evaluation domain of an ID (transform, geometry,
//!   ...), owns operations
//! - [`OperationNode`]: the smallest schedulable unit of recomputation
//! - [`TimeSourceNode`]: the per-graph source of time changes
//!
//! Nodes live in arenas owned by the [`Graph`](crate::graph::Graph) and
//! refer to each other through the index handles defined here. A handle is
//! only meaningful for the graph that produced it.
//!
//! # Classification
//!
//! A node's [`NodeClass`] is a pure function of its [`NodeType`]; nothing
//! else is stored.

mod component;
mod factory;
mod id_node;
mod operation;
mod time_source;

pub use component::{ComponentKey, ComponentNode, ComponentState};
pub use factory::{type_get_factory, NodeFactory};
pub use id_node::{IdComponentsMask, IdNode, IdState, LinkedState};
pub use operation::{OperationCallback, OperationCode, OperationFlag, OperationKey, OperationNode};
pub use time_source::TimeSourceNode;

use std::fmt;

macro_rules! define_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect("graph arena exceeds u32 range"))
            }

            /// Position in the owning graph's arena.
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_index!(
    /// Handle to an [`IdNode`].
    IdNodeIndex
);
define_index!(
    /// Handle to a [`ComponentNode`].
    ComponentIndex
);
define_index!(
    /// Handle to an [`OperationNode`].
    OperationIndex
);
define_index!(
    /// Handle to a [`Relation`](crate::relation::Relation).
    RelationIndex
);

/// Endpoint of a relation.
///
/// Relations only connect operations, except for the time source which can
/// feed operations that depend on the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeHandle {
    TimeSource,
    Operation(OperationIndex),
}

impl From<OperationIndex> for NodeHandle {
    fn from(index: OperationIndex) -> Self {
        NodeHandle::Operation(index)
    }
}

/// Broad class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Generic,
    Component,
    Operation,
}

/// Every kind of node in the graph.
///
/// The order matters: everything before [`NodeType::Parameters`] is a
/// generic node, and the discriminant of a component type is its bit in
/// [`IdComponentsMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Undefined,
    Operation,
    TimeSource,
    IdRef,

    Parameters,
    Animation,
    Transform,
    Geometry,
    Sequencer,
    LayerCollections,
    CopyOnWrite,
    ObjectFromLayer,
    Audio,
    Armature,
    GenericDatablock,
    Visibility,
    Simulation,
    NTreeOutput,
    EvalPose,
    Bone,
    ParticleSystem,
    ParticleSettings,
    Shading,
    ShadingParameters,
    Cache,
    PointCache,
    ImageAnimation,
    BatchCache,
    Dupli,
    Synchronization,
}

impl NodeType {
    /// All component types, in declaration order.
    pub const COMPONENTS: [NodeType; 26] = [
        NodeType::Parameters,
        NodeType::Animation,
        NodeType::Transform,
        NodeType::Geometry,
        NodeType::Sequencer,
        NodeType::LayerCollections,
        NodeType::CopyOnWrite,
        NodeType::ObjectFromLayer,
        NodeType::Audio,
        NodeType::Armature,
        NodeType::GenericDatablock,
        NodeType::Visibility,
        NodeType::Simulation,
        NodeType::NTreeOutput,
        NodeType::EvalPose,
        NodeType::Bone,
        NodeType::ParticleSystem,
        NodeType::ParticleSettings,
        NodeType::Shading,
        NodeType::ShadingParameters,
        NodeType::Cache,
        NodeType::PointCache,
        NodeType::ImageAnimation,
        NodeType::BatchCache,
        NodeType::Dupli,
        NodeType::Synchronization,
    ];

    pub fn class(&self) -> NodeClass {
        if *self == NodeType::Operation {
            NodeClass::Operation
        } else if *self < NodeType::Parameters {
            NodeClass::Generic
        } else {
            NodeClass::Component
        }
    }

    pub fn is_component(&self) -> bool {
        self.class() == NodeClass::Component
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Undefined => "UNDEFINED",
            NodeType::Operation => "OPERATION",
            NodeType::TimeSource => "TIMESOURCE",
            NodeType::IdRef => "ID_REF",
            NodeType::Parameters => "PARAMETERS",
            NodeType::Animation => "ANIMATION",
            NodeType::Transform => "TRANSFORM",
            NodeType::Geometry => "GEOMETRY",
            NodeType::Sequencer => "SEQUENCER",
            NodeType::LayerCollections => "LAYER_COLLECTIONS",
            NodeType::CopyOnWrite => "COPY_ON_WRITE",
            NodeType::ObjectFromLayer => "OBJECT_FROM_LAYER",
            NodeType::Audio => "AUDIO",
            NodeType::Armature => "ARMATURE",
            NodeType::GenericDatablock => "GENERIC_DATABLOCK",
            NodeType::Visibility => "VISIBILITY",
            NodeType::Simulation => "SIMULATION",
            NodeType::NTreeOutput => "NTREE_OUTPUT",
            NodeType::EvalPose => "EVAL_POSE",
            NodeType::Bone => "BONE",
            NodeType::ParticleSystem => "PARTICLE_SYSTEM",
            NodeType::ParticleSettings => "PARTICLE_SETTINGS",
            NodeType::Shading => "SHADING",
            NodeType::ShadingParameters => "SHADING_PARAMETERS",
            NodeType::Cache => "CACHE",
            NodeType::PointCache => "POINT_CACHE",
            NodeType::ImageAnimation => "IMAGE_ANIMATION",
            NodeType::BatchCache => "BATCH_CACHE",
            NodeType::Dupli => "DUPLI",
            NodeType::Synchronization => "SYNCHRONIZATION",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common interface of every node kind.
pub trait Node {
    fn node_type(&self) -> NodeType;

    fn name(&self) -> &str;

    /// Human readable identifier, used in logs and debug output.
    fn identifier(&self) -> String;

    fn node_class(&self) -> NodeClass {
        self.node_type().class()
    }
}

/// Object components addressable by code outside the graph builder, for
/// example modifiers declaring what they read from another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectComponent {
    Parameters,
    Proxy,
    Animation,
    Transform,
    Geometry,
    EvalPose,
    Bone,
    Shading,
    Cache,
}

impl From<ObjectComponent> for NodeType {
    fn from(component: ObjectComponent) -> Self {
        match component {
            ObjectComponent::Parameters => NodeType::Parameters,
            ObjectComponent::Proxy => NodeType::Parameters,
            ObjectComponent::Animation => NodeType::Animation,
            ObjectComponent::Transform => NodeType::Transform,
            ObjectComponent::Geometry => NodeType::Geometry,
            ObjectComponent::EvalPose => NodeType::EvalPose,
            ObjectComponent::Bone => NodeType::Bone,
            ObjectComponent::Shading => NodeType::Shading,
            ObjectComponent::Cache => NodeType::Cache,
        }
    }
}

impl From<NodeType> for ObjectComponent {
    /// Node types without an object-level counterpart land in `Parameters`.
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Animation => ObjectComponent::Animation,
            NodeType::Transform => ObjectComponent::Transform,
            NodeType::Geometry => ObjectComponent::Geometry,
            NodeType::EvalPose => ObjectComponent::EvalPose,
            NodeType::Bone => ObjectComponent::Bone,
            NodeType::Shading => ObjectComponent::Shading,
            NodeType::Cache => ObjectComponent::Cache,
            _ => ObjectComponent::Parameters,
        }
    }
}
