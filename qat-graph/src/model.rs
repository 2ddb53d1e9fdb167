//! A graph together with the modules its module-call nodes refer to, and its JSON
//! description.
use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    config::ConfigError,
    graph::{Argument, FunctionKind, Graph, GraphError, NodeKind, NodeOp, Target},
    insertion::ACT_FAKE_QUANTIZER_SUFFIX,
    module::{Module, ModuleKind, ModuleRegistry},
};

#[derive(Clone, Debug, Default)]
pub struct GraphModel {
    pub graph: Graph,
    pub modules: ModuleRegistry,
}

impl GraphModel {
    pub fn new(graph: Graph, modules: ModuleRegistry) -> Self {
        Self { graph, modules }
    }

    /// Builds the graph and registry from a description. Nodes must be listed in a
    /// topological order. Module calls whose name carries the activation fake-quantizer
    /// suffix are tagged as such, which lets already prepared graphs be reloaded.
    pub fn from_description(description: &ModelDescription) -> Result<Self, GraphError> {
        let mut modules = ModuleRegistry::new();
        for (path, kind) in &description.modules {
            modules.insert(path.clone(), *kind);
        }
        let mut graph = Graph::new();
        for node in &description.nodes {
            let target = match node.op {
                NodeOp::CallModule => Target::Module(node.target.clone()),
                NodeOp::CallFunction | NodeOp::CallMethod => {
                    Target::Callable(FunctionKind::from(node.target.as_str()))
                }
                NodeOp::Placeholder | NodeOp::GetAttr | NodeOp::Output => {
                    Target::Name(node.target.clone())
                }
            };
            let args = node
                .args
                .iter()
                .map(|arg| match arg {
                    ArgDescription::Node(name) => graph
                        .node_by_name(name)
                        .map(|input| Argument::Node(input.id()))
                        .ok_or_else(|| GraphError::UnknownArgument {
                            node: node.name.clone(),
                            argument: name.clone(),
                        }),
                    ArgDescription::Constant(value) => Ok(Argument::Constant(value.clone())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let kind = if node.op == NodeOp::CallModule
                && node.name.contains(ACT_FAKE_QUANTIZER_SUFFIX)
            {
                NodeKind::ActFakeQuantizer
            } else {
                NodeKind::Regular
            };
            graph.add_tagged_node(node.name.clone(), node.op, target, args, kind)?;
        }
        Ok(Self { graph, modules })
    }

    pub fn to_description(&self) -> ModelDescription {
        let nodes = self
            .graph
            .nodes()
            .map(|node| NodeDescription {
                name: node.name().to_string(),
                op: node.op(),
                target: node.target().to_string(),
                args: node
                    .args()
                    .iter()
                    .map(|arg| match arg {
                        Argument::Node(id) => ArgDescription::Node(
                            self.graph
                                .node(*id)
                                .map(|input| input.name().to_string())
                                .unwrap_or_else(|_| id.to_string()),
                        ),
                        Argument::Constant(value) => ArgDescription::Constant(value.clone()),
                    })
                    .collect(),
            })
            .collect();
        let modules = self
            .modules
            .iter()
            .map(|(path, module)| (path.clone(), Module::kind(module)))
            .collect();
        ModelDescription { modules, nodes }
    }
}

/// Serializable form of a [`GraphModel`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleKind>,
    pub nodes: Vec<NodeDescription>,
}

impl ModelDescription {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    pub op: NodeOp,
    /// Module path, callable name or plain name depending on `op`
    pub target: String,
    #[serde(default)]
    pub args: Vec<ArgDescription>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgDescription {
    /// Name of the node producing this argument
    Node(String),
    Constant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"{
        "modules": { "conv": "Conv2d", "conv_post_act_fake_quantizer": "FakeQuantize" },
        "nodes": [
            { "name": "x", "op": "placeholder", "target": "x" },
            { "name": "conv", "op": "call_module", "target": "conv", "args": [{ "node": "x" }] },
            { "name": "conv_post_act_fake_quantizer", "op": "call_module",
              "target": "conv_post_act_fake_quantizer", "args": [{ "node": "conv" }] },
            { "name": "flatten", "op": "call_function", "target": "flatten",
              "args": [{ "node": "conv_post_act_fake_quantizer" }, { "constant": "1" }] },
            { "name": "output", "op": "output", "target": "output", "args": [{ "node": "flatten" }] }
        ]
    }"#;

    #[test]
    fn test_load_description() -> anyhow::Result<()> {
        let description: ModelDescription = serde_json::from_str(DESCRIPTION)?;
        let model = GraphModel::from_description(&description)?;

        assert_eq!(model.graph.len(), 5);
        let fq = model
            .graph
            .node_by_name("conv_post_act_fake_quantizer")
            .unwrap();
        assert!(fq.is_act_fake_quantizer());
        assert!(!model.graph.node_by_name("conv").unwrap().is_act_fake_quantizer());
        let flatten = model.graph.node_by_name("flatten").unwrap();
        assert_eq!(flatten.function(), Some(&FunctionKind::Flatten));
        assert_eq!(flatten.args()[1], Argument::Constant("1".into()));
        assert!(model.modules.get("conv_post_act_fake_quantizer").unwrap().as_fake_quantizer().is_some());

        assert_eq!(model.to_description(), description);
        Ok(())
    }

    #[test]
    fn test_unknown_argument() -> anyhow::Result<()> {
        let description: ModelDescription = serde_json::from_str(
            r#"{ "nodes": [ { "name": "relu", "op": "call_function", "target": "relu",
                 "args": [{ "node": "x" }] } ] }"#,
        )?;
        let err = GraphModel::from_description(&description).unwrap_err();
        assert_eq!(err, GraphError::UnknownArgument {
            node: "relu".into(),
            argument: "x".into()
        });
        Ok(())
    }
}
