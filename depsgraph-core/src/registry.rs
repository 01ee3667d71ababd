//! Graph Registry
//!
//! An application can evaluate the same main database through several graphs
//! at once (one per window and view layer, plus render). Edits made to the
//! database must reach all of them, so graphs are registered per main
//! database and tags are fanned out from here.
//!
//! # Thread Safety
//!
//! The registry is a concurrent map; registered graphs are shared behind a
//! read-write lock. Fan-out clones the graph list before locking any graph,
//! so no map shard is held while a graph lock is taken.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{DepsgraphError, Result};
use crate::graph::{Graph, MainId, UpdateSource};
use crate::id::{IdRecalc, IdUid};

/// A graph shared between the registry and its users.
pub type SharedGraph = Arc<RwLock<Graph>>;

/// Owned by the application context and passed by reference.
#[derive(Default)]
pub struct GraphRegistry {
    graphs: DashMap<MainId, Vec<SharedGraph>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a graph and register it under its main database.
    pub fn register(&self, graph: Graph) -> SharedGraph {
        let main = graph.context().main();
        let shared = Arc::new(RwLock::new(graph));
        self.graphs.entry(main).or_default().push(Arc::clone(&shared));
        debug!(main = main.0, "registered graph");
        shared
    }

    pub fn unregister(&self, graph: &SharedGraph) -> Result<()> {
        let main = graph.read().context().main();
        let removed = match self.graphs.get_mut(&main) {
            Some(mut graphs) => {
                let before = graphs.len();
                graphs.retain(|other| !Arc::ptr_eq(other, graph));
                graphs.len() != before
            }
            None => false,
        };
        if !removed {
            return Err(DepsgraphError::NotRegistered);
        }
        self.graphs.remove_if(&main, |_, graphs| graphs.is_empty());
        debug!(main = main.0, "unregistered graph");
        Ok(())
    }

    /// Graphs evaluating the given main database.
    pub fn graphs(&self, main: MainId) -> Vec<SharedGraph> {
        self.graphs
            .get(&main)
            .map(|graphs| graphs.clone())
            .unwrap_or_default()
    }

    /// Move every graph of `old` over to `new`, e.g. after a file reload.
    /// Returns the number of graphs moved.
    pub fn replace_main(&self, old: MainId, new: MainId) -> usize {
        let Some((_, graphs)) = self.graphs.remove(&old) else {
            return 0;
        };
        for graph in &graphs {
            graph.write().set_main(new);
        }
        let moved = graphs.len();
        self.graphs.entry(new).or_default().extend(graphs);
        debug!(old = old.0, new = new.0, moved, "rebound graphs to new main");
        moved
    }

    /// Tag an ID in every graph of a main database.
    pub fn id_tag_update(&self, main: MainId, id: IdUid, recalc: IdRecalc, source: UpdateSource) {
        for graph in self.graphs(main) {
            graph.write().id_tag_update(id, recalc, source);
        }
    }

    /// Frame change for every graph of a main database.
    pub fn time_tag_update(&self, main: MainId) {
        for graph in self.graphs(main) {
            graph.write().tag_time_source();
        }
    }

    /// Number of registered graphs across all main databases.
    pub fn len(&self) -> usize {
        self.graphs.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
