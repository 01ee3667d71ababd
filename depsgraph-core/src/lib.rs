//! Depsgraph Core
//!
//! This crate provides the dependency graph used to keep evaluated scene data
//! in sync with the data-blocks users edit. It implements:
//!
//! - A three-level node model (ID, component, operation) with typed relations
//! - Entry tagging of modified operations, IDs and the current frame
//! - The update flush that propagates tags to every dependent operation
//! - Cycle detection and build-time visibility propagation
//! - Copy-on-write bookkeeping for evaluated copies of data-blocks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `node`: ID, component, operation and time source nodes
//! - `relation`: dependency edges and their flush flags
//! - `graph`: the graph container, tagging and the flush scheduler
//! - `registry`: graphs per main database, for fanning out tags
//! - `cow`: evaluated copies of data-blocks
//! - `debug`: Graphviz export and statistics
//!
//! # Example
//!
//! ```rust
//! use depsgraph_core::graph::{Graph, GraphContext, UpdateSource};
//! use depsgraph_core::id::{IdRecalc, IdType, OriginalId};
//! use depsgraph_core::node::{NodeType, OperationCode};
//! use depsgraph_core::relation::RelationFlag;
//!
//! let mut graph = Graph::new(GraphContext::default());
//!
//! // Build: one object with a transform feeding its geometry
//! let cube = OriginalId::new(1, IdType::Object, "Cube");
//! let id = graph.add_id_node(&cube);
//! let transform = graph.add_component(id, NodeType::Transform, "");
//! let local = graph.add_operation(transform, None, OperationCode::TransformLocal);
//! let geometry = graph.add_component(id, NodeType::Geometry, "");
//! let eval = graph.add_operation(geometry, None, OperationCode::GeometryEval);
//! graph.add_operation_relation(local, eval, "Transform -> Geometry", RelationFlag::empty());
//! graph.finalize_build();
//!
//! // The user moved the object
//! graph.id_tag_update(cube.uid(), IdRecalc::TRANSFORM, UpdateSource::UserEdit);
//! graph.flush_updates();
//!
//! assert!(graph.operation(eval).needs_update());
//! ```

pub mod cow;
pub mod debug;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod observer;
pub mod registry;
pub mod relation;

pub use error::{DepsgraphError, Result};
pub use graph::{EvaluationMode, FlushSummary, Graph, GraphContext, MainId, ObjectIterFlags, UpdateSource};
pub use id::{IdRecalc, IdType, IdUid, OriginalId};
pub use observer::UpdateObserver;
pub use registry::{GraphRegistry, SharedGraph};
pub use relation::{Relation, RelationFlag};
