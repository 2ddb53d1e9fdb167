//! Computation graph on which the quantization passes operate.
//!
//! Nodes are stored by a stable [`NodeId`] and listed in a canonical order. A node can
//! only take as arguments nodes which are already part of the graph, hence the
//! canonical order is always a topological order (producers before consumers).
mod error;
mod target;

use std::collections::HashMap;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

pub use error::GraphError;
pub use target::{FunctionKind, Target};

/// Identifier of a node, never reused within a graph.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[display("#{_0}")]
pub struct NodeId(usize);

/// The kind of operation performed by a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOp {
    Placeholder,
    GetAttr,
    CallModule,
    CallFunction,
    CallMethod,
    Output,
}

/// Structural tag of a node. Nodes spliced in by the quantizer are tagged when they are
/// created, so later passes never need to recover their role from the node name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Regular,
    /// Fake-quantizer applied on the output activation of its single input node.
    ActFakeQuantizer,
}

/// Argument of a node: either the output of another node or a constant literal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    Node(NodeId),
    Constant(String),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) op: NodeOp,
    pub(crate) target: Target,
    pub(crate) args: Vec<Argument>,
    // consumers of the output of this node, in the order they were connected
    pub(crate) users: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> NodeOp {
        self.op
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_act_fake_quantizer(&self) -> bool {
        self.kind == NodeKind::ActFakeQuantizer
    }

    /// Registry path of the called module, if this node is a module call.
    pub fn module_target(&self) -> Option<&str> {
        match (&self.op, &self.target) {
            (NodeOp::CallModule, Target::Module(path)) => Some(path),
            _ => None,
        }
    }

    /// Called function or method, if this node is a function or method call.
    pub fn callable(&self) -> Option<&FunctionKind> {
        match (&self.op, &self.target) {
            (NodeOp::CallFunction | NodeOp::CallMethod, Target::Callable(kind)) => Some(kind),
            _ => None,
        }
    }

    /// Called function, only if this node is a function call (methods excluded).
    pub fn function(&self) -> Option<&FunctionKind> {
        match (&self.op, &self.target) {
            (NodeOp::CallFunction, Target::Callable(kind)) => Some(kind),
            _ => None,
        }
    }

    /// Ids of the nodes feeding this node, in argument order.
    pub fn input_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            Argument::Node(id) => Some(*id),
            Argument::Constant(_) => None,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    // canonical listing order
    order: Vec<NodeId>,
    names: HashMap<String, NodeId>,
    next_id: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends a regular node at the end of the canonical order.
    pub fn add_node<S: Into<String>>(
        &mut self,
        name: S,
        op: NodeOp,
        target: Target,
        args: Vec<Argument>,
    ) -> Result<NodeId, GraphError> {
        self.add_tagged_node(name, op, target, args, NodeKind::Regular)
    }

    /// Appends a node with an explicit [`NodeKind`] at the end of the canonical order.
    pub fn add_tagged_node<S: Into<String>>(
        &mut self,
        name: S,
        op: NodeOp,
        target: Target,
        args: Vec<Argument>,
        kind: NodeKind,
    ) -> Result<NodeId, GraphError> {
        let position = self.order.len();
        self.push_node(name.into(), op, target, args, kind, position)
    }

    /// Splices a new node right after `producer`: the new node consumes the output of
    /// `producer` and every previous user of `producer` is rewired to consume the new
    /// node instead.
    pub fn insert_after<S: Into<String>>(
        &mut self,
        producer: NodeId,
        name: S,
        op: NodeOp,
        target: Target,
        kind: NodeKind,
    ) -> Result<NodeId, GraphError> {
        let previous_users = self.node(producer)?.users.clone();
        let position = self.position(producer)? + 1;
        let new_id = self.push_node(
            name.into(),
            op,
            target,
            vec![Argument::Node(producer)],
            kind,
            position,
        )?;
        for user_id in &previous_users {
            let user = self
                .nodes
                .get_mut(user_id)
                .ok_or(GraphError::UnknownNode(*user_id))?;
            for arg in user.args.iter_mut() {
                if *arg == Argument::Node(producer) {
                    *arg = Argument::Node(new_id);
                }
            }
        }
        if let Some(new_node) = self.nodes.get_mut(&new_id) {
            new_node.users = previous_users;
        }
        if let Some(producer_node) = self.nodes.get_mut(&producer) {
            producer_node.users = vec![new_id];
        }
        Ok(new_id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.names.get(name).and_then(|id| self.nodes.get(id))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// All nodes, in canonical order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Consumers of the output of `id`.
    pub fn users(&self, id: NodeId) -> Result<impl Iterator<Item = &Node> + '_, GraphError> {
        let node = self.node(id)?;
        Ok(node.users.iter().filter_map(|user| self.nodes.get(user)))
    }

    /// Returns `base` if no node is named like that yet, otherwise the first free
    /// `base_<n>` for n = 1, 2, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.contains_name(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|candidate| !self.contains_name(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn position(&self, id: NodeId) -> Result<usize, GraphError> {
        self.order
            .iter()
            .position(|n| *n == id)
            .ok_or(GraphError::UnknownNode(id))
    }

    fn push_node(
        &mut self,
        name: String,
        op: NodeOp,
        target: Target,
        args: Vec<Argument>,
        kind: NodeKind,
        position: usize,
    ) -> Result<NodeId, GraphError> {
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateNodeName(name));
        }
        for arg in &args {
            if let Argument::Node(input) = arg {
                if !self.nodes.contains_key(input) {
                    return Err(GraphError::UnknownArgument {
                        node: name,
                        argument: input.to_string(),
                    });
                }
            }
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let node = Node {
            id,
            name: name.clone(),
            op,
            target,
            args,
            users: vec![],
            kind,
        };
        for input in node.input_nodes() {
            if let Some(input_node) = self.nodes.get_mut(&input) {
                if !input_node.users.contains(&id) {
                    input_node.users.push(id);
                }
            }
        }
        self.nodes.insert(id, node);
        self.names.insert(name, id);
        self.order.insert(position, id);
        Ok(id)
    }
}
