//! Module containing code defining the [`GraphError`] type.

use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

use super::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors relating to [`super::Graph`] construction and to resolving graph nodes
/// against a [`crate::module::ModuleRegistry`].
pub enum GraphError {
    /// A node with the same name already exists in the graph.
    DuplicateNodeName(String),
    /// The id does not belong to any node of the graph.
    UnknownNode(NodeId),
    /// A node argument refers to a node that is not (yet) part of the graph.
    UnknownArgument { node: String, argument: String },
    /// The target of a module-call node is not registered. This means graph and
    /// registry are out of sync and must be fixed by the caller.
    UnresolvedModule { node: String, target: String },
    /// A node tagged as activation fake-quantizer resolves to a module which
    /// is not a fake-quantizer.
    NotAFakeQuantizer { node: String, target: String },
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            GraphError::DuplicateNodeName(name) => {
                write!(f, "A node named {} already exists in the graph", name)
            }
            GraphError::UnknownNode(id) => write!(f, "Node {} not found in graph", id),
            GraphError::UnknownArgument { node, argument } => write!(
                f,
                "Node {} uses {} as argument, but no such node exists",
                node, argument
            ),
            GraphError::UnresolvedModule { node, target } => write!(
                f,
                "Module {} targeted by node {} is missing from the module registry",
                target, node
            ),
            GraphError::NotAFakeQuantizer { node, target } => write!(
                f,
                "Node {} is tagged as activation fake-quantizer but module {} is not one",
                node, target
            ),
        }
    }
}

impl Error for GraphError {}
