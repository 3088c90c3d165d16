use crate::error::{PerceptionError, PerceptionResult};
use crate::network::Network;
use crate::NodeId;
use rustc_hash::FxHashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An ordered sequence of nodes an agent intends to pass, ending at its destination.
///
/// Cloning a route is cheap. Two routes are equal when they visit the same nodes in the same order.
#[derive(Clone, Debug)]
pub struct Route {
    nodes: Arc<[NodeId]>,
    /// The first index of each node in `nodes`.
    index: Arc<FxHashMap<NodeId, usize>>,
}

impl Route {
    /// Creates a route from a sequence of nodes.
    pub fn new(nodes: Vec<NodeId>) -> PerceptionResult<Self> {
        if nodes.is_empty() {
            return Err(PerceptionError::EmptyRoute);
        }
        let mut index = FxHashMap::default();
        for (idx, node) in nodes.iter().enumerate() {
            index.entry(*node).or_insert(idx);
        }
        Ok(Self {
            nodes: nodes.into(),
            index: Arc::new(index),
        })
    }

    /// Checks that every node on the route exists in the network.
    pub fn validate(&self, network: &Network) -> PerceptionResult<()> {
        match self.nodes.iter().find(|node| !network.contains_node(**node)) {
            Some(node) => Err(PerceptionError::UnknownNode(*node)),
            None => Ok(()),
        }
    }

    /// The nodes of the route, in order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The number of nodes on the route.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false, as a route has at least a destination.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first node of the route.
    pub fn origin(&self) -> NodeId {
        self.nodes[0]
    }

    /// The final node of the route.
    pub fn destination(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    /// The node at the given index.
    pub fn node(&self, idx: usize) -> Option<NodeId> {
        self.nodes.get(idx).copied()
    }

    /// The index of the first occurence of `node` on the route.
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.index.get(&node).copied()
    }

    /// Whether the node is on the route.
    pub fn contains(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    /// If travelling from `from` to `to` follows a step of the route,
    /// returns the route index of `to`.
    pub(crate) fn step_index(&self, from: NodeId, to: NodeId) -> Option<usize> {
        let idx = self.index_of(from)? + 1;
        (self.node(idx)? == to).then_some(idx)
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes) || self.nodes == other.nodes
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodes.hash(state);
    }
}
