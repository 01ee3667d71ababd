//! Data-block identity.
//!
//! The graph never owns authoring data. Callers describe each data-block with
//! an [`OriginalId`]: a stable unique key, the block's type and its name. The
//! unique key is what the graph indexes on, so two `OriginalId`s with the same
//! [`IdUid`] always resolve to the same ID node.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

/// Stable identity of an original data-block (the analogue of its address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdUid(u64);

impl IdUid {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for IdUid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Type of a data-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdType {
    Scene,
    Library,
    Object,
    Mesh,
    Curve,
    MetaBall,
    Material,
    Texture,
    Image,
    Lattice,
    Light,
    Camera,
    Ipo,
    ShapeKey,
    World,
    Screen,
    VectorFont,
    Text,
    Speaker,
    Sound,
    Collection,
    Armature,
    Action,
    NodeTree,
    Brush,
    ParticleSettings,
    GreasePencil,
    WindowManager,
    MovieClip,
    Mask,
    LineStyle,
    Palette,
    PaintCurve,
    CacheFile,
    Workspace,
    LightProbe,
    Simulation,
}

impl IdType {
    /// Every type, in declaration order.
    pub const ALL: [IdType; 37] = [
        IdType::Scene,
        IdType::Library,
        IdType::Object,
        IdType::Mesh,
        IdType::Curve,
        IdType::MetaBall,
        IdType::Material,
        IdType::Texture,
        IdType::Image,
        IdType::Lattice,
        IdType::Light,
        IdType::Camera,
        IdType::Ipo,
        IdType::ShapeKey,
        IdType::World,
        IdType::Screen,
        IdType::VectorFont,
        IdType::Text,
        IdType::Speaker,
        IdType::Sound,
        IdType::Collection,
        IdType::Armature,
        IdType::Action,
        IdType::NodeTree,
        IdType::Brush,
        IdType::ParticleSettings,
        IdType::GreasePencil,
        IdType::WindowManager,
        IdType::MovieClip,
        IdType::Mask,
        IdType::LineStyle,
        IdType::Palette,
        IdType::PaintCurve,
        IdType::CacheFile,
        IdType::Workspace,
        IdType::LightProbe,
        IdType::Simulation,
    ];

    /// Two-letter code used as a name prefix, e.g. `OB` for objects.
    pub fn code(&self) -> &'static str {
        match self {
            IdType::Scene => "SC",
            IdType::Library => "LI",
            IdType::Object => "OB",
            IdType::Mesh => "ME",
            IdType::Curve => "CU",
            IdType::MetaBall => "MB",
            IdType::Material => "MA",
            IdType::Texture => "TE",
            IdType::Image => "IM",
            IdType::Lattice => "LT",
            IdType::Light => "LA",
            IdType::Camera => "CA",
            IdType::Ipo => "IP",
            IdType::ShapeKey => "KE",
            IdType::World => "WO",
            IdType::Screen => "SR",
            IdType::VectorFont => "VF",
            IdType::Text => "TX",
            IdType::Speaker => "SK",
            IdType::Sound => "SO",
            IdType::Collection => "GR",
            IdType::Armature => "AR",
            IdType::Action => "AC",
            IdType::NodeTree => "NT",
            IdType::Brush => "BR",
            IdType::ParticleSettings => "PA",
            IdType::GreasePencil => "GD",
            IdType::WindowManager => "WM",
            IdType::MovieClip => "MC",
            IdType::Mask => "MS",
            IdType::LineStyle => "LS",
            IdType::Palette => "PL",
            IdType::PaintCurve => "PC",
            IdType::CacheFile => "CF",
            IdType::Workspace => "WS",
            IdType::LightProbe => "LP",
            IdType::Simulation => "SI",
        }
    }

    fn bit(&self) -> u64 {
        1u64 << (*self as u32)
    }
}

/// Description of an original (authoring) data-block.
///
/// Cheap to clone; the name is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginalId {
    uid: IdUid,
    id_type: IdType,
    name: Arc<str>,
}

impl OriginalId {
    pub fn new(uid: impl Into<IdUid>, id_type: IdType, name: impl Into<Arc<str>>) -> Self {
        Self {
            uid: uid.into(),
            id_type,
            name: name.into(),
        }
    }

    pub fn uid(&self) -> IdUid {
        self.uid
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    /// Name without the type prefix.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for OriginalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id_type.code(), self.name)
    }
}

bitflags! {
    /// Which aspects of a data-block changed.
    ///
    /// Stored on evaluated copies after a flush, and accepted by
    /// [`Graph::id_tag_update`](crate::graph::Graph::id_tag_update) to
    /// select which components to tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IdRecalc: u32 {
        const TRANSFORM = 1 << 0;
        const GEOMETRY = 1 << 1;
        const ANIMATION = 1 << 2;
        const PSYS_REDO = 1 << 3;
        const PSYS_RESET = 1 << 4;
        const PSYS_CHILD = 1 << 5;
        const PSYS_PHYS = 1 << 6;
        const SHADING = 1 << 7;
        const SELECT = 1 << 8;
        const BASE_FLAGS = 1 << 9;
        const POINT_CACHE = 1 << 10;
        /// Only notify editors, nothing is re-evaluated.
        const EDITORS = 1 << 11;
        const COPY_ON_WRITE = 1 << 12;
        const SEQUENCER_STRIPS = 1 << 13;
        const AUDIO = 1 << 14;
        const PARAMETERS = 1 << 15;
        const SOURCE = 1 << 16;
        /// Current frame changed.
        const TIME = 1 << 17;

        const PSYS_ALL = Self::PSYS_REDO.bits()
            | Self::PSYS_RESET.bits()
            | Self::PSYS_CHILD.bits()
            | Self::PSYS_PHYS.bits();
    }
}

/// Bit set over [`IdType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdTypeSet(u64);

impl IdTypeSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, id_type: IdType) {
        self.0 |= id_type.bit();
    }

    pub fn contains(&self, id_type: IdType) -> bool {
        self.0 & id_type.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = IdType> + '_ {
        IdType::ALL.iter().copied().filter(|t| self.contains(*t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_type_code() {
        let id = OriginalId::new(7, IdType::Object, "Cube");
        assert_eq!(id.to_string(), "OBCube");
        assert_eq!(id.name(), "Cube");
        assert_eq!(id.uid(), IdUid::new(7));
    }

    #[test]
    fn all_types_fit_in_type_set() {
        assert!(IdType::ALL.len() <= 64);
        for (index, id_type) in IdType::ALL.iter().enumerate() {
            assert_eq!(*id_type as usize, index);
        }
    }

    #[test]
    fn type_set_tracks_membership() {
        let mut set = IdTypeSet::new();
        assert!(set.is_empty());

        set.insert(IdType::Mesh);
        set.insert(IdType::Scene);
        assert!(set.contains(IdType::Mesh));
        assert!(!set.contains(IdType::Object));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![IdType::Scene, IdType::Mesh]);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn psys_all_covers_particle_bits() {
        assert!(IdRecalc::PSYS_ALL.contains(IdRecalc::PSYS_RESET));
        assert!(!IdRecalc::PSYS_ALL.contains(IdRecalc::GEOMETRY));
    }
}
