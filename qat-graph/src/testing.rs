//! Helpers to build small models in tests.
use crate::{
    graph::{Argument, FunctionKind, NodeId, NodeOp, Target},
    model::GraphModel,
    module::ModuleKind,
};

/// Builds a [`GraphModel`] node by node. Every module call gets its own module,
/// registered under the node name.
#[derive(Default)]
pub(crate) struct ModelBuilder {
    model: GraphModel,
}

impl ModelBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn input(&mut self, name: &str) -> NodeId {
        self.add(name, NodeOp::Placeholder, Target::Name(name.to_string()), &[])
    }

    pub(crate) fn module(&mut self, name: &str, kind: ModuleKind, inputs: &[NodeId]) -> NodeId {
        self.model.modules.insert(name, kind);
        self.add(name, NodeOp::CallModule, Target::Module(name.to_string()), inputs)
    }

    /// Module call whose module is not registered.
    pub(crate) fn unregistered_module(&mut self, name: &str, inputs: &[NodeId]) -> NodeId {
        self.add(name, NodeOp::CallModule, Target::Module(name.to_string()), inputs)
    }

    pub(crate) fn function(&mut self, name: &str, kind: FunctionKind, inputs: &[NodeId]) -> NodeId {
        self.add(name, NodeOp::CallFunction, Target::Callable(kind), inputs)
    }

    pub(crate) fn method(&mut self, name: &str, kind: FunctionKind, inputs: &[NodeId]) -> NodeId {
        self.add(name, NodeOp::CallMethod, Target::Callable(kind), inputs)
    }

    pub(crate) fn output(&mut self, inputs: &[NodeId]) -> NodeId {
        self.add("output", NodeOp::Output, Target::Name("output".into()), inputs)
    }

    pub(crate) fn build(self) -> GraphModel {
        self.model
    }

    fn add(&mut self, name: &str, op: NodeOp, target: Target, inputs: &[NodeId]) -> NodeId {
        let args = inputs.iter().map(|id| Argument::Node(*id)).collect();
        self.model
            .graph
            .add_node(name, op, target, args)
            .expect("invalid test graph")
    }
}
