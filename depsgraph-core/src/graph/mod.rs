//! Dependency Graph
//!
//! This module implements the graph container: the ID index, the node and
//! relation arenas, the entry-tag set and the time source.
//!
//! # Overview
//!
//! The graph is built by an external builder which registers ID nodes,
//! their components and operations, and the relations between operations.
//! At runtime, mutators tag the operations they modified. Before evaluation
//! [`Graph::flush_updates`] propagates those tags along relations so the
//! executor knows every operation that needs to run.
//!
//! # Design Decisions
//!
//! 1. Nodes and relations live in arenas owned by the graph and refer to each
//!    other through index handles. Owner links (`operation -> component ->
//!    ID`) are stored as handles too, so there are no reference cycles and
//!    teardown is a plain `clear` of every arena.
//!
//! 2. All `add_*` builder calls are upserts. Building again on the same graph
//!    reuses the existing nodes instead of duplicating them.
//!
//! 3. Cycles are tolerated. Nothing is checked at insertion time;
//!    [`Graph::detect_cycles`] flags the offending relations afterwards and
//!    the flush stays finite regardless.

mod cycle;
mod flush;
mod query;
mod tag;
mod visibility;

pub use flush::FlushSummary;
pub use query::ObjectIterFlags;
pub use tag::UpdateSource;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{DepsgraphError, Result};
use crate::id::{IdRecalc, IdType, IdTypeSet, IdUid, OriginalId};
use crate::node::{
    type_get_factory, ComponentIndex, ComponentKey, ComponentNode, IdNode, IdNodeIndex, Node, NodeHandle, NodeType,
    OperationCallback, OperationFlag, OperationIndex, OperationKey, OperationNode, RelationIndex, TimeSourceNode,
};
use crate::observer::UpdateObserver;
use crate::relation::{Relation, RelationFlag};

/// Identity of the main database a graph evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MainId(pub u64);

/// What the evaluated data is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvaluationMode {
    #[default]
    Viewport,
    Render,
}

/// Configuration a graph is created with.
#[derive(Clone)]
pub struct GraphContext {
    main: MainId,
    scene: Option<OriginalId>,
    view_layer: String,
    mode: EvaluationMode,
    is_active: bool,
    parallel_reset_grain: usize,
    observer: Option<Arc<dyn UpdateObserver>>,
}

impl GraphContext {
    /// Create a context for a graph evaluating `main`.
    pub fn new(main: MainId) -> Self {
        Self {
            main,
            ..Self::default()
        }
    }

    /// Set the scene this graph evaluates.
    pub fn with_scene(mut self, scene: OriginalId) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Set the view layer name.
    pub fn with_view_layer(mut self, view_layer: impl Into<String>) -> Self {
        self.view_layer = view_layer.into();
        self
    }

    /// Set the evaluation mode.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Only active graphs notify editors.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Minimum number of nodes per task in the parallel reset of a flush.
    pub fn with_parallel_reset_grain(mut self, grain: usize) -> Self {
        self.parallel_reset_grain = grain.max(1);
        self
    }

    /// Notify `observer` about updated and released evaluated copies.
    pub fn with_observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Main database the graph evaluates.
    pub fn main(&self) -> MainId {
        self.main
    }

    /// Scene being evaluated, if any.
    pub fn scene(&self) -> Option<&OriginalId> {
        self.scene.as_ref()
    }

    /// View layer name.
    pub fn view_layer(&self) -> &str {
        &self.view_layer
    }

    /// Viewport or render evaluation.
    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Whether the graph belongs to an active view.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Minimum number of nodes per task in the parallel flush reset.
    pub fn parallel_reset_grain(&self) -> usize {
        self.parallel_reset_grain
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self {
            main: MainId(0),
            scene: None,
            view_layer: "ViewLayer".to_owned(),
            mode: EvaluationMode::Viewport,
            is_active: true,
            parallel_reset_grain: 256,
            observer: None,
        }
    }
}

impl fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphContext")
            .field("main", &self.main)
            .field("scene", &self.scene)
            .field("view_layer", &self.view_layer)
            .field("mode", &self.mode)
            .field("is_active", &self.is_active)
            .field("parallel_reset_grain", &self.parallel_reset_grain)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

/// The dependency graph.
///
/// Not designed for concurrent mutation: build, tagging and flushing follow
/// a single-writer discipline enforced by `&mut self`.
pub struct Graph {
    context: GraphContext,

    /// Original ID to its node. Guarantees one node per ID.
    id_hash: HashMap<IdUid, IdNodeIndex>,

    id_nodes: Vec<IdNode>,
    components: Vec<ComponentNode>,
    operations: Vec<OperationNode>,

    /// Relation arena. Relations are only freed all at once.
    relations: Vec<Relation>,

    /// Operations tagged since the last flush.
    entry_tags: IndexSet<OperationIndex>,

    time_source: TimeSourceNode,

    id_type_exist: IdTypeSet,
    id_type_updated: IdTypeSet,

    /// Administrative lock, guarding state reachable through `&Graph`.
    debug_name: Mutex<String>,
}

impl Graph {
    /// Create an empty graph for the given context.
    pub fn new(context: GraphContext) -> Self {
        debug!(main = context.main.0, view_layer = %context.view_layer, "creating dependency graph");
        Self {
            context,
            id_hash: HashMap::new(),
            id_nodes: Vec::new(),
            components: Vec::new(),
            operations: Vec::new(),
            relations: Vec::new(),
            entry_tags: IndexSet::new(),
            time_source: TimeSourceNode::new(),
            id_type_exist: IdTypeSet::new(),
            id_type_updated: IdTypeSet::new(),
            debug_name: Mutex::new(String::new()),
        }
    }

    /// Context the graph was created with.
    pub fn context(&self) -> &GraphContext {
        &self.context
    }

    /// Whether editors are notified about flushed updates.
    pub fn is_active(&self) -> bool {
        self.context.is_active
    }

    /// Mark the graph active or inactive.
    pub fn set_active(&mut self, is_active: bool) {
        self.context.is_active = is_active;
    }

    pub(crate) fn set_main(&mut self, main: MainId) {
        self.context.main = main;
    }

    /// Name shown in diagnostics.
    pub fn debug_name(&self) -> String {
        self.debug_name.lock().clone()
    }

    /// Rename the graph for diagnostics.
    pub fn set_debug_name(&self, name: impl Into<String>) {
        *self.debug_name.lock() = name.into();
    }

    // ---- ID nodes ----

    /// Node of the given data-block, created on first reference.
    pub fn add_id_node(&mut self, id: &OriginalId) -> IdNodeIndex {
        if let Some(&index) = self.id_hash.get(&id.uid()) {
            debug_assert_eq!(
                self.id_nodes[index.index()].id_type(),
                id.id_type(),
                "data-block {id} re-registered with a different type"
            );
            return index;
        }
        let index = IdNodeIndex::new(self.id_nodes.len());
        trace!(id = %id, "adding ID node");
        self.id_nodes.push(IdNode::new(id.clone()));
        self.id_hash.insert(id.uid(), index);
        self.id_type_exist.insert(id.id_type());
        index
    }

    /// Find the ID node of an original data-block.
    pub fn find_id_node(&self, uid: IdUid) -> Option<IdNodeIndex> {
        self.id_hash.get(&uid).copied()
    }

    /// Like [`find_id_node`](Self::find_id_node), failing with
    /// [`DepsgraphError::UnknownId`].
    pub fn require_id_node(&self, id: &OriginalId) -> Result<IdNodeIndex> {
        self.find_id_node(id.uid())
            .ok_or_else(|| DepsgraphError::unknown_id(id.to_string()))
    }

    /// Get an ID node by handle.
    pub fn id_node(&self, index: IdNodeIndex) -> &IdNode {
        &self.id_nodes[index.index()]
    }

    /// Get an ID node by handle, mutably.
    pub fn id_node_mut(&mut self, index: IdNodeIndex) -> &mut IdNode {
        &mut self.id_nodes[index.index()]
    }

    /// ID nodes in creation order.
    pub fn id_nodes(&self) -> impl ExactSizeIterator<Item = (IdNodeIndex, &IdNode)> + '_ {
        self.id_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (IdNodeIndex::new(i), node))
    }

    /// Number of ID nodes.
    pub fn id_node_count(&self) -> usize {
        self.id_nodes.len()
    }

    // ---- Components ----

    /// Component of an ID, created on first reference.
    pub fn add_component(&mut self, id: IdNodeIndex, node_type: NodeType, name: &str) -> ComponentIndex {
        if let Some(index) = self.id_nodes[id.index()].find_component(node_type, name) {
            return index;
        }
        let factory = type_get_factory(node_type)
            .unwrap_or_else(|| panic!("{node_type} is not a component type"));
        let index = ComponentIndex::new(self.components.len());
        self.components.push(factory.create_component(id, name));
        self.id_nodes[id.index()].insert_component(ComponentKey::new(node_type, name), index);
        index
    }

    /// Find a component of an ID by type and name.
    pub fn find_component(&self, id: IdNodeIndex, node_type: NodeType, name: &str) -> Option<ComponentIndex> {
        self.id_nodes[id.index()].find_component(node_type, name)
    }

    /// Get a component by handle.
    pub fn component(&self, index: ComponentIndex) -> &ComponentNode {
        &self.components[index.index()]
    }

    /// Get a component by handle, mutably.
    pub fn component_mut(&mut self, index: ComponentIndex) -> &mut ComponentNode {
        &mut self.components[index.index()]
    }

    /// Number of components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // ---- Operations ----

    /// Operation of a component, created on first reference. Adding an
    /// existing key replaces its callback.
    pub fn add_operation(
        &mut self,
        component: ComponentIndex,
        callback: Option<OperationCallback>,
        key: impl Into<OperationKey>,
    ) -> OperationIndex {
        let key = key.into();
        if let Some(index) = self.components[component.index()].find_operation(&key) {
            self.operations[index.index()].set_callback(callback);
            return index;
        }
        let index = OperationIndex::new(self.operations.len());
        self.operations
            .push(OperationNode::new(component, key.clone(), callback));
        self.components[component.index()].insert_operation(key, index);
        index
    }

    /// Designate the operation other components' relations enter through.
    pub fn set_entry_operation(&mut self, component: ComponentIndex, operation: OperationIndex) {
        debug_assert_eq!(self.operations[operation.index()].owner(), component);
        self.components[component.index()].set_entry_operation(operation);
    }

    /// Designate the operation other components' relations leave from.
    pub fn set_exit_operation(&mut self, component: ComponentIndex, operation: OperationIndex) {
        debug_assert_eq!(self.operations[operation.index()].owner(), component);
        self.components[component.index()].set_exit_operation(operation);
    }

    /// Find an operation of a component by key.
    pub fn find_operation(&self, component: ComponentIndex, key: &OperationKey) -> Option<OperationIndex> {
        self.components[component.index()].find_operation(key)
    }

    /// # Panics
    ///
    /// If the component has no operation with this key.
    pub fn get_operation(&self, component: ComponentIndex, key: &OperationKey) -> OperationIndex {
        self.components[component.index()].get_operation(key)
    }

    /// Whether a component has an operation with this key.
    pub fn has_operation(&self, component: ComponentIndex, key: &OperationKey) -> bool {
        self.components[component.index()].has_operation(key)
    }

    /// Resolve an operation from the original ID down, for relation builders.
    pub fn operation_by_key(
        &self,
        id: &OriginalId,
        component_type: NodeType,
        component_name: &str,
        key: &OperationKey,
    ) -> Result<OperationIndex> {
        let id_index = self.require_id_node(id)?;
        let component = self
            .find_component(id_index, component_type, component_name)
            .ok_or_else(|| {
                DepsgraphError::missing_component(id.to_string(), format!("{component_type}({component_name})"))
            })?;
        self.find_operation(component, key).ok_or_else(|| {
            DepsgraphError::missing_operation(self.component(component).identifier(), key.to_string())
        })
    }

    /// Get an operation by handle.
    pub fn operation(&self, index: OperationIndex) -> &OperationNode {
        &self.operations[index.index()]
    }

    /// Get an operation by handle, mutably.
    pub fn operation_mut(&mut self, index: OperationIndex) -> &mut OperationNode {
        &mut self.operations[index.index()]
    }

    /// All operations in arena order.
    pub fn operations(&self) -> impl ExactSizeIterator<Item = (OperationIndex, &OperationNode)> + '_ {
        self.operations
            .iter()
            .enumerate()
            .map(|(i, node)| (OperationIndex::new(i), node))
    }

    /// Number of operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// ID node owning an operation.
    pub fn owner_id(&self, operation: OperationIndex) -> IdNodeIndex {
        self.component(self.operation(operation).owner()).owner()
    }

    /// `"<id>/<component>/<operation>"`, unique within the graph.
    pub fn full_identifier(&self, operation: OperationIndex) -> String {
        let op = self.operation(operation);
        let component = self.component(op.owner());
        let id_node = self.id_node(component.owner());
        let component_part = if component.name().is_empty() {
            component.node_type().as_str()
        } else {
            component.name()
        };
        format!("{}/{}/{}", id_node.id_orig(), component_part, op.identifier())
    }

    /// Identifier of a relation endpoint.
    pub fn node_identifier(&self, handle: NodeHandle) -> String {
        match handle {
            NodeHandle::TimeSource => self.time_source.identifier(),
            NodeHandle::Operation(op) => self.full_identifier(op),
        }
    }

    // ---- Relations ----

    /// Existing relation from `from` to `to` with the given description.
    pub fn check_nodes_connected(&self, from: NodeHandle, to: NodeHandle, description: &str) -> Option<RelationIndex> {
        self.outlinks(from).iter().copied().find(|rel| {
            let relation = &self.relations[rel.index()];
            debug_assert_eq!(relation.from(), from);
            relation.to() == to && relation.name() == description
        })
    }

    /// Connect two nodes.
    ///
    /// With [`RelationFlag::CHECK_BEFORE_ADD`] an existing relation with the
    /// same endpoints and description is reused and the new flags are merged
    /// into it. Self-loops and cycles are accepted.
    ///
    /// # Panics
    ///
    /// If `to` is the time source.
    pub fn add_new_relation(
        &mut self,
        from: NodeHandle,
        to: NodeHandle,
        description: &str,
        flags: RelationFlag,
    ) -> RelationIndex {
        if flags.contains(RelationFlag::CHECK_BEFORE_ADD) {
            if let Some(existing) = self.check_nodes_connected(from, to, description) {
                self.relations[existing.index()].flag |= flags;
                return existing;
            }
        }
        let NodeHandle::Operation(to_op) = to else {
            panic!("relation '{description}' cannot point to the time source");
        };
        if cfg!(debug_assertions) {
            if let NodeHandle::Operation(from_op) = from {
                let to_type = self.component(self.operation(to_op).owner()).node_type();
                let from_type = self.component(self.operation(from_op).owner()).node_type();
                debug_assert!(
                    to_type != NodeType::CopyOnWrite || from_type == NodeType::CopyOnWrite,
                    "only copy-on-write operations may feed copy-on-write operations ('{description}')"
                );
            }
        }

        let index = RelationIndex::new(self.relations.len());
        self.relations.push(Relation::new(from, to, description, flags));
        match from {
            NodeHandle::TimeSource => self.time_source.outlinks.push(index),
            NodeHandle::Operation(op) => self.operations[op.index()].outlinks.push(index),
        }
        self.operations[to_op.index()].inlinks.push(index);
        index
    }

    /// Add a relation between two operations.
    pub fn add_operation_relation(
        &mut self,
        from: OperationIndex,
        to: OperationIndex,
        description: &str,
        flags: RelationFlag,
    ) -> RelationIndex {
        self.add_new_relation(from.into(), to.into(), description, flags)
    }

    /// Make an operation depend on the current frame.
    pub fn add_time_relation(&mut self, to: OperationIndex, description: &str) -> RelationIndex {
        self.add_new_relation(
            NodeHandle::TimeSource,
            to.into(),
            description,
            RelationFlag::CHECK_BEFORE_ADD,
        )
    }

    /// Make `to` depend on `from` as a whole: one relation from the exit of
    /// `from` to the entry of `to`.
    pub fn add_component_relation(
        &mut self,
        from: ComponentIndex,
        to: ComponentIndex,
        description: &str,
        flags: RelationFlag,
    ) -> Result<RelationIndex> {
        let from_op = self.boundary(from, "exit", ComponentNode::exit_operation)?;
        let to_op = self.boundary(to, "entry", ComponentNode::entry_operation)?;
        Ok(self.add_operation_relation(from_op, to_op, description, flags))
    }

    fn boundary(
        &self,
        component: ComponentIndex,
        boundary: &'static str,
        resolve: fn(&ComponentNode) -> Option<OperationIndex>,
    ) -> Result<OperationIndex> {
        let node = self.component(component);
        resolve(node).ok_or_else(|| DepsgraphError::MissingBoundary {
            component: node.identifier(),
            boundary,
        })
    }

    /// Get a relation by handle.
    pub fn relation(&self, index: RelationIndex) -> &Relation {
        &self.relations[index.index()]
    }

    /// All relations in creation order.
    pub fn relations(&self) -> impl ExactSizeIterator<Item = (RelationIndex, &Relation)> + '_ {
        self.relations
            .iter()
            .enumerate()
            .map(|(i, rel)| (RelationIndex::new(i), rel))
    }

    /// Number of relations.
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Relations leaving a node.
    pub fn outlinks(&self, node: NodeHandle) -> &[RelationIndex] {
        match node {
            NodeHandle::TimeSource => self.time_source.outlinks(),
            NodeHandle::Operation(op) => self.operations[op.index()].outlinks(),
        }
    }

    // ---- Time source ----

    /// The graph's time source.
    pub fn time_source(&self) -> &TimeSourceNode {
        &self.time_source
    }

    /// The current frame changed. Applied by the next flush.
    pub fn tag_time_source(&mut self) {
        self.time_source.tag_update();
    }

    // ---- Entry tags ----

    /// Seed the next flush with a directly modified operation.
    pub fn add_entry_tag(&mut self, operation: OperationIndex) {
        self.entry_tags.insert(operation);
    }

    /// Operations tagged since the last flush, in tagging order.
    pub fn entry_tags(&self) -> impl ExactSizeIterator<Item = OperationIndex> + '_ {
        self.entry_tags.iter().copied()
    }

    /// Drop pending tags without flushing them.
    pub fn clear_tags(&mut self) {
        self.entry_tags.clear();
        self.time_source.tagged_for_update = false;
    }

    // ---- ID type bookkeeping ----

    /// Whether an ID of this type was added to the graph.
    pub fn id_type_exists(&self, id_type: IdType) -> bool {
        self.id_type_exist.contains(id_type)
    }

    /// Whether an ID of this type was updated since the last `clear_id_recalc`.
    pub fn id_type_updated(&self, id_type: IdType) -> bool {
        self.id_type_updated.contains(id_type)
    }

    pub(crate) fn tag_id_type_updated(&mut self, id_type: IdType) {
        mark_id_type_updated(&mut self.id_type_updated, id_type);
    }

    // ---- Executor support ----

    /// Operations the executor has to run, in arena order.
    pub fn operations_needing_update(&self) -> Vec<OperationIndex> {
        self.operations()
            .filter(|(_, op)| op.needs_update())
            .map(|(index, _)| index)
            .collect()
    }

    /// Clear the transient update flags of an evaluated operation.
    pub fn mark_operation_evaluated(&mut self, operation: OperationIndex) {
        self.operations[operation.index()]
            .flag
            .remove(OperationFlag::CLEAR_ON_EVAL);
    }

    /// Forget the recalc flags of the last flush, once every consumer has
    /// seen them.
    pub fn clear_id_recalc(&mut self) {
        for id_node in &mut self.id_nodes {
            id_node.id_cow.clear_recalc();
        }
        self.id_type_updated.clear();
    }

    /// Recalc flags of an ID's evaluated copy.
    pub fn id_recalc(&self, id: IdNodeIndex) -> IdRecalc {
        self.id_nodes[id.index()].id_cow().recalc()
    }

    // ---- Teardown ----

    /// Free every evaluated copy and drop all nodes and relations.
    ///
    /// Evaluated copies may reference each other, so they are released in
    /// passes: scenes first, particle settings last.
    pub fn clear_id_nodes(&mut self) {
        self.release_evaluated_copies(|id_type| id_type == IdType::Scene);
        self.release_evaluated_copies(|id_type| id_type != IdType::ParticleSettings);
        self.release_evaluated_copies(|_| true);

        self.id_hash.clear();
        self.id_nodes.clear();
        self.components.clear();
        self.operations.clear();
        self.relations.clear();
        self.entry_tags.clear();
        self.time_source.outlinks.clear();
        self.id_type_exist.clear();
        self.id_type_updated.clear();
    }

    /// Reset the graph to its freshly created state.
    pub fn clear_all_nodes(&mut self) {
        self.clear_id_nodes();
        self.time_source = TimeSourceNode::new();
    }

    /// Release owned, expanded copies of the matching types. Shells that were
    /// never expanded are dropped with their node.
    fn release_evaluated_copies(&mut self, filter: impl Fn(IdType) -> bool) {
        let observer = self.context.observer.clone();
        for id_node in &mut self.id_nodes {
            if id_node.id_cow.is_aliased() || !id_node.id_cow.is_expanded() {
                continue;
            }
            if !filter(id_node.id_type()) {
                continue;
            }
            if id_node.id_cow.release() {
                if let Some(observer) = &observer {
                    observer.evaluated_copy_released(id_node.id_orig());
                }
            }
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.clear_id_nodes();
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("context", &self.context)
            .field("id_nodes", &self.id_nodes.len())
            .field("components", &self.components.len())
            .field("operations", &self.operations.len())
            .field("relations", &self.relations.len())
            .field("entry_tags", &self.entry_tags.len())
            .finish()
    }
}

/// Record an updated ID type. Node trees are embedded in other data-blocks,
/// so their owners' types are marked too.
fn mark_id_type_updated(set: &mut IdTypeSet, id_type: IdType) {
    if id_type == IdType::NodeTree {
        for owner in [
            IdType::Material,
            IdType::Texture,
            IdType::Light,
            IdType::World,
            IdType::Scene,
        ] {
            set.insert(owner);
        }
    }
    set.insert(id_type);
}
