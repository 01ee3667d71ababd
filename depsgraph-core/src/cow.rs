//! Copy-on-write bookkeeping for evaluated data-blocks.
//!
//! Every ID node carries an [`EvaluatedCopy`]. For types that never change
//! during evaluation the copy aliases the original and nothing is allocated.
//! For everything else the graph allocates an empty shell when the ID node is
//! created; an evaluation-time routine outside this crate fills it in through
//! [`EvaluatedCopy::expand`]. The graph only tracks the lifecycle, the
//! accumulated recalc flags, and whether the shell has been populated.

use std::any::Any;
use std::fmt;

use crate::id::{IdRecalc, IdType};

/// Whether data-blocks of this type need a separate evaluated copy.
///
/// Libraries, UI data and reference data such as images are used as-is.
pub fn copy_on_write_is_needed(id_type: IdType) -> bool {
    !matches!(
        id_type,
        IdType::Library
            | IdType::Ipo
            | IdType::Screen
            | IdType::VectorFont
            | IdType::Brush
            | IdType::WindowManager
            | IdType::Palette
            | IdType::PaintCurve
            | IdType::Workspace
            | IdType::Image
    )
}

/// Payload produced by the expansion routine.
pub type EvaluatedPayload = Box<dyn Any + Send + Sync>;

enum CowStorage {
    /// The evaluated copy is the original.
    Aliased,
    /// Allocated, not yet populated.
    Shell,
    Expanded(EvaluatedPayload),
    /// Freed during graph teardown.
    Released,
}

/// Evaluated snapshot of one data-block.
pub struct EvaluatedCopy {
    storage: CowStorage,
    recalc: IdRecalc,
}

impl EvaluatedCopy {
    /// Allocate the evaluated copy for a data-block of the given type.
    pub fn for_type(id_type: IdType) -> Self {
        let storage = if copy_on_write_is_needed(id_type) {
            CowStorage::Shell
        } else {
            CowStorage::Aliased
        };
        Self {
            storage,
            recalc: IdRecalc::empty(),
        }
    }

    /// True when the evaluated copy is the original data-block itself.
    pub fn is_aliased(&self) -> bool {
        matches!(self.storage, CowStorage::Aliased)
    }

    /// True once the copy holds evaluated data. Aliased copies always do.
    pub fn is_expanded(&self) -> bool {
        matches!(self.storage, CowStorage::Aliased | CowStorage::Expanded(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.storage, CowStorage::Released)
    }

    /// Populate the shell. Replaces a previous payload; ignored for aliased
    /// copies since there is nothing to populate.
    pub fn expand(&mut self, payload: EvaluatedPayload) {
        if self.is_aliased() {
            return;
        }
        self.storage = CowStorage::Expanded(payload);
    }

    /// Drop the evaluated data but keep the shell, forcing a full re-expansion.
    pub fn discard(&mut self) {
        if matches!(self.storage, CowStorage::Expanded(_)) {
            self.storage = CowStorage::Shell;
        }
    }

    pub fn payload(&self) -> Option<&(dyn Any + Send + Sync)> {
        match &self.storage {
            CowStorage::Expanded(payload) => Some(payload.as_ref()),
            _ => None,
        }
    }

    pub fn payload_mut(&mut self) -> Option<&mut (dyn Any + Send + Sync)> {
        match &mut self.storage {
            CowStorage::Expanded(payload) => Some(payload.as_mut()),
            _ => None,
        }
    }

    /// Free the owned snapshot. Returns true if owned data was actually freed.
    pub(crate) fn release(&mut self) -> bool {
        match self.storage {
            CowStorage::Aliased | CowStorage::Released => false,
            CowStorage::Shell | CowStorage::Expanded(_) => {
                self.storage = CowStorage::Released;
                true
            }
        }
    }

    /// Recalc flags accumulated by the last flush.
    pub fn recalc(&self) -> IdRecalc {
        self.recalc
    }

    pub(crate) fn add_recalc(&mut self, recalc: IdRecalc) {
        self.recalc |= recalc;
    }

    pub(crate) fn clear_recalc(&mut self) {
        self.recalc = IdRecalc::empty();
    }
}

impl fmt::Debug for EvaluatedCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = match self.storage {
            CowStorage::Aliased => "aliased",
            CowStorage::Shell => "shell",
            CowStorage::Expanded(_) => "expanded",
            CowStorage::Released => "released",
        };
        f.debug_struct("EvaluatedCopy")
            .field("storage", &storage)
            .field("recalc", &self.recalc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_data_is_aliased() {
        let image = EvaluatedCopy::for_type(IdType::Image);
        assert!(image.is_aliased());
        assert!(image.is_expanded());

        let mesh = EvaluatedCopy::for_type(IdType::Mesh);
        assert!(!mesh.is_aliased());
        assert!(!mesh.is_expanded());
    }

    #[test]
    fn shell_expands_and_discards() {
        let mut copy = EvaluatedCopy::for_type(IdType::Object);
        copy.expand(Box::new(42_u32));
        assert!(copy.is_expanded());
        assert_eq!(copy.payload().and_then(|p| p.downcast_ref::<u32>()), Some(&42));

        copy.discard();
        assert!(!copy.is_expanded());
        assert!(copy.payload().is_none());
    }

    #[test]
    fn release_only_frees_owned_data() {
        let mut aliased = EvaluatedCopy::for_type(IdType::Library);
        assert!(!aliased.release());
        assert!(!aliased.is_released());

        let mut owned = EvaluatedCopy::for_type(IdType::Scene);
        assert!(owned.release());
        assert!(owned.is_released());
        assert!(!owned.release());
    }

    #[test]
    fn aliased_copy_ignores_expand() {
        let mut copy = EvaluatedCopy::for_type(IdType::Brush);
        copy.expand(Box::new("ignored"));
        assert!(copy.payload().is_none());
        assert!(copy.is_expanded());
    }
}
