//! Operation Nodes
//!
//! An operation is the smallest unit the executor schedules. It belongs to
//! exactly one component and is connected to other operations through
//! relations.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use super::{ComponentIndex, Node, NodeType, RelationIndex};

/// Evaluation callback run by the executor.
pub type OperationCallback = Arc<dyn Fn() + Send + Sync>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OperationFlag: u8 {
        /// Needs to be re-evaluated by the executor.
        const NEEDS_UPDATE = 1 << 0;
        /// Tagged explicitly, as opposed to reached by the flush.
        const DIRECTLY_MODIFIED = 1 << 1;
        /// Modified by a user edit somewhere upstream.
        const USER_MODIFIED = 1 << 2;
        /// Evaluation result must be kept.
        const PINNED = 1 << 3;

        /// Flags copied across every flushed relation.
        const FLUSH = Self::USER_MODIFIED.bits();
        /// Flags cleared once the executor has evaluated the operation.
        const CLEAR_ON_EVAL = Self::NEEDS_UPDATE.bits()
            | Self::DIRECTLY_MODIFIED.bits()
            | Self::USER_MODIFIED.bits();
    }
}

/// What an operation computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationCode {
    /// Placeholder for components with a single anonymous operation.
    Operation,

    IdProperty,
    ParametersEntry,
    ParametersEval,
    ParametersExit,
    Visibility,

    AnimationEntry,
    AnimationEval,
    AnimationExit,
    Driver,

    TransformInit,
    TransformLocal,
    TransformParent,
    TransformConstraints,
    TransformFinal,
    TransformEval,
    TransformSimulationInit,

    RigidbodyRebuild,
    RigidbodySim,
    RigidbodyTransformCopy,

    GeometryEvalInit,
    GeometryEval,
    GeometryEvalDone,
    GeometryShapekey,

    LightProbeEval,
    SpeakerEval,
    SoundEval,
    ArmatureEval,

    PoseInit,
    PoseInitIk,
    PoseCleanup,
    PoseDone,
    PoseIkSolver,
    PoseSplineIkSolver,

    BoneLocal,
    BonePoseParent,
    BoneConstraints,
    BoneReady,
    BoneDone,
    BoneSegments,

    ParticleSystemInit,
    ParticleSystemEval,
    ParticleSystemDone,
    ParticleSettingsInit,
    ParticleSettingsEval,
    ParticleSettingsReset,

    PointCacheReset,
    FileCacheUpdate,

    Shading,
    MaterialUpdate,
    LightUpdate,
    WorldUpdate,

    BatchCacheUpdate,
    CopyOnWrite,

    ObjectFromLayerEntry,
    ObjectBaseFlags,
    ObjectFromLayerExit,
    Dimensions,

    SequencesEval,
    ImageAnimation,
    Dupli,
    SimulationEval,
    SynchronizeToOriginal,
    ViewLayerEval,
}

impl OperationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCode::Operation => "OPERATION",
            OperationCode::IdProperty => "ID_PROPERTY",
            OperationCode::ParametersEntry => "PARAMETERS_ENTRY",
            OperationCode::ParametersEval => "PARAMETERS_EVAL",
            OperationCode::ParametersExit => "PARAMETERS_EXIT",
            OperationCode::Visibility => "VISIBILITY",
            OperationCode::AnimationEntry => "ANIMATION_ENTRY",
            OperationCode::AnimationEval => "ANIMATION_EVAL",
            OperationCode::AnimationExit => "ANIMATION_EXIT",
            OperationCode::Driver => "DRIVER",
            OperationCode::TransformInit => "TRANSFORM_INIT",
            OperationCode::TransformLocal => "TRANSFORM_LOCAL",
            OperationCode::TransformParent => "TRANSFORM_PARENT",
            OperationCode::TransformConstraints => "TRANSFORM_CONSTRAINTS",
            OperationCode::TransformFinal => "TRANSFORM_FINAL",
            OperationCode::TransformEval => "TRANSFORM_EVAL",
            OperationCode::TransformSimulationInit => "TRANSFORM_SIMULATION_INIT",
            OperationCode::RigidbodyRebuild => "RIGIDBODY_REBUILD",
            OperationCode::RigidbodySim => "RIGIDBODY_SIM",
            OperationCode::RigidbodyTransformCopy => "RIGIDBODY_TRANSFORM_COPY",
            OperationCode::GeometryEvalInit => "GEOMETRY_EVAL_INIT",
            OperationCode::GeometryEval => "GEOMETRY_EVAL",
            OperationCode::GeometryEvalDone => "GEOMETRY_EVAL_DONE",
            OperationCode::GeometryShapekey => "GEOMETRY_SHAPEKEY",
            OperationCode::LightProbeEval => "LIGHT_PROBE_EVAL",
            OperationCode::SpeakerEval => "SPEAKER_EVAL",
            OperationCode::SoundEval => "SOUND_EVAL",
            OperationCode::ArmatureEval => "ARMATURE_EVAL",
            OperationCode::PoseInit => "POSE_INIT",
            OperationCode::PoseInitIk => "POSE_INIT_IK",
            OperationCode::PoseCleanup => "POSE_CLEANUP",
            OperationCode::PoseDone => "POSE_DONE",
            OperationCode::PoseIkSolver => "POSE_IK_SOLVER",
            OperationCode::PoseSplineIkSolver => "POSE_SPLINE_IK_SOLVER",
            OperationCode::BoneLocal => "BONE_LOCAL",
            OperationCode::BonePoseParent => "BONE_POSE_PARENT",
            OperationCode::BoneConstraints => "BONE_CONSTRAINTS",
            OperationCode::BoneReady => "BONE_READY",
            OperationCode::BoneDone => "BONE_DONE",
            OperationCode::BoneSegments => "BONE_SEGMENTS",
            OperationCode::ParticleSystemInit => "PARTICLE_SYSTEM_INIT",
            OperationCode::ParticleSystemEval => "PARTICLE_SYSTEM_EVAL",
            OperationCode::ParticleSystemDone => "PARTICLE_SYSTEM_DONE",
            OperationCode::ParticleSettingsInit => "PARTICLE_SETTINGS_INIT",
            OperationCode::ParticleSettingsEval => "PARTICLE_SETTINGS_EVAL",
            OperationCode::ParticleSettingsReset => "PARTICLE_SETTINGS_RESET",
            OperationCode::PointCacheReset => "POINT_CACHE_RESET",
            OperationCode::FileCacheUpdate => "FILE_CACHE_UPDATE",
            OperationCode::Shading => "SHADING",
            OperationCode::MaterialUpdate => "MATERIAL_UPDATE",
            OperationCode::LightUpdate => "LIGHT_UPDATE",
            OperationCode::WorldUpdate => "WORLD_UPDATE",
            OperationCode::BatchCacheUpdate => "BATCH_CACHE_UPDATE",
            OperationCode::CopyOnWrite => "COPY_ON_WRITE",
            OperationCode::ObjectFromLayerEntry => "OBJECT_FROM_LAYER_ENTRY",
            OperationCode::ObjectBaseFlags => "OBJECT_BASE_FLAGS",
            OperationCode::ObjectFromLayerExit => "OBJECT_FROM_LAYER_EXIT",
            OperationCode::Dimensions => "DIMENSIONS",
            OperationCode::SequencesEval => "SEQUENCES_EVAL",
            OperationCode::ImageAnimation => "IMAGE_ANIMATION",
            OperationCode::Dupli => "DUPLI",
            OperationCode::SimulationEval => "SIMULATION_EVAL",
            OperationCode::SynchronizeToOriginal => "SYNCHRONIZE_TO_ORIGINAL",
            OperationCode::ViewLayerEval => "VIEW_LAYER_EVAL",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup key of an operation within its component.
///
/// The name and tag distinguish operations sharing an opcode, e.g. one
/// `IdProperty` operation per custom property, or one per array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub opcode: OperationCode,
    pub name: String,
    pub name_tag: i32,
}

impl OperationKey {
    pub fn new(opcode: OperationCode, name: impl Into<String>, name_tag: i32) -> Self {
        Self {
            opcode,
            name: name.into(),
            name_tag,
        }
    }
}

impl From<OperationCode> for OperationKey {
    fn from(opcode: OperationCode) -> Self {
        Self::new(opcode, "", -1)
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationKey({}, {:?}", self.opcode, self.name)?;
        if self.name_tag != -1 {
            write!(f, ", {}", self.name_tag)?;
        }
        f.write_str(")")
    }
}

/// A schedulable unit of work.
pub struct OperationNode {
    opcode: OperationCode,
    name: String,
    name_tag: i32,
    owner: ComponentIndex,
    callback: Option<OperationCallback>,

    pub(crate) flag: OperationFlag,

    /// Relations where this operation is the `to` end.
    pub(crate) inlinks: SmallVec<[RelationIndex; 4]>,

    /// Relations where this operation is the `from` end.
    pub(crate) outlinks: SmallVec<[RelationIndex; 4]>,

    /// Queued during the current flush pass.
    pub(crate) scheduled: bool,
}

impl OperationNode {
    pub(crate) fn new(owner: ComponentIndex, key: OperationKey, callback: Option<OperationCallback>) -> Self {
        Self {
            opcode: key.opcode,
            name: key.name,
            name_tag: key.name_tag,
            owner,
            callback,
            flag: OperationFlag::empty(),
            inlinks: SmallVec::new(),
            outlinks: SmallVec::new(),
            scheduled: false,
        }
    }

    pub fn opcode(&self) -> OperationCode {
        self.opcode
    }

    pub fn name_tag(&self) -> i32 {
        self.name_tag
    }

    pub fn key(&self) -> OperationKey {
        OperationKey::new(self.opcode, self.name.clone(), self.name_tag)
    }

    /// Component owning this operation.
    pub fn owner(&self) -> ComponentIndex {
        self.owner
    }

    pub fn flag(&self) -> OperationFlag {
        self.flag
    }

    pub fn needs_update(&self) -> bool {
        self.flag.contains(OperationFlag::NEEDS_UPDATE)
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn inlinks(&self) -> &[RelationIndex] {
        &self.inlinks
    }

    pub fn outlinks(&self) -> &[RelationIndex] {
        &self.outlinks
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.flag.set(OperationFlag::PINNED, pinned);
    }

    pub(crate) fn set_callback(&mut self, callback: Option<OperationCallback>) {
        self.callback = callback;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Run the evaluation callback, if any.
    pub fn evaluate(&self) {
        if let Some(callback) = &self.callback {
            callback();
        }
    }
}

impl Node for OperationNode {
    fn node_type(&self) -> NodeType {
        NodeType::Operation
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> String {
        if self.name_tag == -1 {
            format!("{}({})", self.opcode, self.name)
        } else {
            format!("{}({}[{}])", self.opcode, self.name, self.name_tag)
        }
    }
}

impl fmt::Debug for OperationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationNode")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("name_tag", &self.name_tag)
            .field("owner", &self.owner)
            .field("flag", &self.flag)
            .field("inlinks", &self.inlinks)
            .field("outlinks", &self.outlinks)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
