//! Module tree the structural undo actions operate on.
//!
//! The effect graph is a tree of modules under a fixed root. Each module owns
//! its [`Parameter`]s. Edits move whole subtrees: a removed subtree is handed
//! back to the caller intact (parameters, bindings, and children included) so
//! that inserting it again restores the previous state exactly.
//!
//! Positions are addressed as `(parent, index)`. For [`move_module`], the
//! destination index is the final position after the module has been taken
//! out of its old place, so `move(a, i, b, j)` is undone by `move(b, j, a, i)`.
//!
//! [`move_module`]: ModuleGraph::move_module

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::details::ParameterDetails;
use crate::parameter::Parameter;

/// Stable module identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// The root of every graph.
    pub const ROOT: Self = Self(0);
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

/// Errors from graph edits. Every edit validates first and leaves the graph
/// untouched on error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// No module with this id.
    #[error("{0} not found")]
    ModuleNotFound(ModuleId),
    /// Child index outside the parent's child list.
    #[error("index {index} out of range for {parent} with {len} children")]
    IndexOutOfRange {
        /// Parent module.
        parent: ModuleId,
        /// Requested index.
        index: usize,
        /// Valid upper bound.
        len: usize,
    },
    /// Inserted subtree reuses an id already in the graph or in itself.
    #[error("{0} already present")]
    DuplicateModule(ModuleId),
    /// Destination lies inside the moved subtree.
    #[error("cannot move {0} into its own subtree")]
    MoveIntoOwnSubtree(ModuleId),
    /// The root has no position and cannot be moved or removed.
    #[error("the root module cannot be moved or removed")]
    RootImmovable,
}

/// A processing module and the parameters it exposes.
#[derive(Debug)]
pub struct Module {
    /// Identifier.
    pub id: ModuleId,
    /// Module type name (e.g. `"filter"`).
    pub kind: String,
    /// Parameters owned by this module.
    pub parameters: Vec<Arc<Parameter>>,
}

impl Module {
    /// Creates a module with one parameter per description.
    pub fn new(id: ModuleId, kind: &str, details: Vec<ParameterDetails>) -> Self {
        Self {
            id,
            kind: kind.to_owned(),
            parameters: details.into_iter().map(Parameter::shared).collect(),
        }
    }

    /// Finds a parameter by display name (case-insensitive).
    pub fn parameter_by_name(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.parameters
            .iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(name))
    }
}

/// A module with its descendants, detached from any graph.
#[derive(Debug)]
pub struct ModuleSubtree {
    /// Subtree root.
    pub module: Module,
    /// Child subtrees in order.
    pub children: Vec<ModuleSubtree>,
}

impl ModuleSubtree {
    /// Subtree with no children.
    pub fn leaf(module: Module) -> Self {
        Self {
            module,
            children: Vec::new(),
        }
    }

    /// Ids in pre-order.
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<ModuleId>) {
        ids.push(self.module.id);
        for child in &self.children {
            child.collect_ids(ids);
        }
    }
}

struct Node {
    module: Module,
    parent: Option<ModuleId>,
    children: Vec<ModuleId>,
}

/// Tree of modules rooted at [`ModuleId::ROOT`].
pub struct ModuleGraph {
    nodes: HashMap<ModuleId, Node>,
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleGraph {
    /// Creates a graph holding only the root.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ModuleId::ROOT,
            Node {
                module: Module::new(ModuleId::ROOT, "root", Vec::new()),
                parent: None,
                children: Vec::new(),
            },
        );
        Self { nodes }
    }

    /// Number of modules, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root is present.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Whether `id` is in the graph.
    pub fn contains(&self, id: ModuleId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Module by id.
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.nodes.get(&id).map(|n| &n.module)
    }

    /// Ordered children of `id`.
    pub fn children(&self, id: ModuleId) -> Option<&[ModuleId]> {
        self.nodes.get(&id).map(|n| n.children.as_slice())
    }

    /// Parent of `id`; `None` for the root or unknown ids.
    pub fn parent(&self, id: ModuleId) -> Option<ModuleId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// `(parent, index)` of a non-root module.
    pub fn position_of(&self, id: ModuleId) -> Result<(ModuleId, usize), GraphError> {
        if id == ModuleId::ROOT {
            return Err(GraphError::RootImmovable);
        }
        let parent = self.parent(id).ok_or(GraphError::ModuleNotFound(id))?;
        let index = self
            .children(parent)
            .and_then(|c| c.iter().position(|&child| child == id))
            .ok_or(GraphError::ModuleNotFound(id))?;
        Ok((parent, index))
    }

    /// Ids in pre-order from the root.
    pub fn preorder(&self) -> Vec<ModuleId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![ModuleId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Every parameter of every module.
    pub fn parameters(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.nodes.values().flat_map(|n| n.module.parameters.iter())
    }

    /// Checks that [`insert`](Self::insert) would succeed without consuming
    /// the subtree.
    pub fn validate_insert(
        &self,
        parent: ModuleId,
        index: usize,
        subtree: &ModuleSubtree,
    ) -> Result<(), GraphError> {
        let siblings = self
            .nodes
            .get(&parent)
            .ok_or(GraphError::ModuleNotFound(parent))?
            .children
            .len();
        if index > siblings {
            return Err(GraphError::IndexOutOfRange {
                parent,
                index,
                len: siblings,
            });
        }
        let mut seen = HashSet::new();
        for id in subtree.ids() {
            if self.nodes.contains_key(&id) || !seen.insert(id) {
                return Err(GraphError::DuplicateModule(id));
            }
        }
        Ok(())
    }

    /// Inserts `subtree` as child `index` of `parent`.
    pub fn insert(
        &mut self,
        parent: ModuleId,
        index: usize,
        subtree: ModuleSubtree,
    ) -> Result<ModuleId, GraphError> {
        self.validate_insert(parent, index, &subtree)?;

        let id = subtree.module.id;
        self.attach(parent, subtree);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(index, id);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_insert: {id} under {parent} at {index}");
        Ok(id)
    }

    fn attach(&mut self, parent: ModuleId, subtree: ModuleSubtree) {
        let ModuleSubtree { module, children } = subtree;
        let id = module.id;
        let child_ids = children.iter().map(|c| c.module.id).collect();
        self.nodes.insert(
            id,
            Node {
                module,
                parent: Some(parent),
                children: child_ids,
            },
        );
        for child in children {
            self.attach(id, child);
        }
    }

    /// Detaches child `index` of `parent` and returns it with its descendants.
    pub fn remove(&mut self, parent: ModuleId, index: usize) -> Result<ModuleSubtree, GraphError> {
        let node = self
            .nodes
            .get_mut(&parent)
            .ok_or(GraphError::ModuleNotFound(parent))?;
        if index >= node.children.len() {
            return Err(GraphError::IndexOutOfRange {
                parent,
                index,
                len: node.children.len(),
            });
        }
        let id = node.children.remove(index);
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove: {id} from {parent} at {index}");
        Ok(self.detach(id))
    }

    fn detach(&mut self, id: ModuleId) -> ModuleSubtree {
        let Some(node) = self.nodes.remove(&id) else {
            return ModuleSubtree::leaf(Module::new(id, "missing", Vec::new()));
        };
        let children = node.children.into_iter().map(|c| self.detach(c)).collect();
        ModuleSubtree {
            module: node.module,
            children,
        }
    }

    /// Moves child `from_index` of `from_parent` so that it ends up as child
    /// `to_index` of `to_parent`.
    pub fn move_module(
        &mut self,
        from_parent: ModuleId,
        from_index: usize,
        to_parent: ModuleId,
        to_index: usize,
    ) -> Result<ModuleId, GraphError> {
        let source = self
            .nodes
            .get(&from_parent)
            .ok_or(GraphError::ModuleNotFound(from_parent))?;
        let id = *source
            .children
            .get(from_index)
            .ok_or(GraphError::IndexOutOfRange {
                parent: from_parent,
                index: from_index,
                len: source.children.len(),
            })?;
        let destination = self
            .nodes
            .get(&to_parent)
            .ok_or(GraphError::ModuleNotFound(to_parent))?;
        if self.is_within(to_parent, id) {
            return Err(GraphError::MoveIntoOwnSubtree(id));
        }
        let mut len = destination.children.len();
        if to_parent == from_parent {
            len -= 1;
        }
        if to_index > len {
            return Err(GraphError::IndexOutOfRange {
                parent: to_parent,
                index: to_index,
                len,
            });
        }

        if let Some(node) = self.nodes.get_mut(&from_parent) {
            node.children.remove(from_index);
        }
        if let Some(node) = self.nodes.get_mut(&to_parent) {
            node.children.insert(to_index, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(to_parent);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_move: {id} {from_parent}[{from_index}] -> {to_parent}[{to_index}]");
        Ok(id)
    }

    /// Whether `id` is `ancestor` or one of its descendants.
    fn is_within(&self, mut id: ModuleId, ancestor: ModuleId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// Runs the update cycle for every parameter. Returns how many recomputed.
    pub fn update_parameters(&self, sample_rate: f32) -> usize {
        self.parameters()
            .filter(|p| p.update_value(sample_rate))
            .count()
    }
}

impl std::fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("modules", &self.nodes.len())
            .finish_non_exhaustive()
    }
}
