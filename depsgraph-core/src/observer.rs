//! Editor notifications.
//!
//! Editors want to know which data-blocks changed after a flush so they can
//! redraw. The graph reports through an [`UpdateObserver`] supplied in its
//! [`GraphContext`](crate::graph::GraphContext).

use crate::id::{IdRecalc, OriginalId};

/// Receiver of graph change notifications.
pub trait UpdateObserver: Send + Sync {
    /// An ID whose evaluated copy had already been expanded was modified by a
    /// flush. Called at most once per ID per flush.
    fn id_updated(&self, id: &OriginalId, recalc: IdRecalc);

    /// The evaluated copy of an ID was freed during graph teardown.
    fn evaluated_copy_released(&self, _id: &OriginalId) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Observer recording every notification, for tests.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) updated: Mutex<Vec<(OriginalId, IdRecalc)>>,
        pub(crate) released: Mutex<Vec<OriginalId>>,
    }

    impl UpdateObserver for RecordingObserver {
        fn id_updated(&self, id: &OriginalId, recalc: IdRecalc) {
            self.updated.lock().push((id.clone(), recalc));
        }

        fn evaluated_copy_released(&self, id: &OriginalId) {
            self.released.lock().push(id.clone());
        }
    }
}
