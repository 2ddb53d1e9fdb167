//! Default activation-quantization candidates, computed before any backend specific
//! rule is applied.
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    graph::{Argument, Graph, GraphError, NodeId},
    module::ModuleRegistry,
    rules::QuantizationRules,
};

/// Produces the initial list of nodes whose output must be fake-quantized.
pub trait CandidateSource {
    fn candidates(
        &self,
        graph: &Graph,
        modules: &ModuleRegistry,
        rules: &QuantizationRules,
    ) -> Result<Vec<NodeId>, GraphError>;
}

/// Quantizes the inputs of every node whose input needs quantization. Nodes taking a
/// constant argument are skipped, only tensor-to-tensor operations are considered.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputQuantCandidates;

impl CandidateSource for InputQuantCandidates {
    fn candidates(
        &self,
        graph: &Graph,
        modules: &ModuleRegistry,
        rules: &QuantizationRules,
    ) -> Result<Vec<NodeId>, GraphError> {
        let mut candidates = vec![];
        for node in graph.nodes() {
            if rules.is_excluded(node) {
                debug!("exclude skip: {}", node.name());
                continue;
            }
            if !rules.needs_input_quant(node, modules)? {
                continue;
            }
            if node
                .args()
                .iter()
                .any(|arg| matches!(arg, Argument::Constant(_)))
            {
                trace!("{} has constant arguments, inputs left unquantized", node.name());
                continue;
            }
            candidates.extend(node.input_nodes());
        }
        Ok(candidates.into_iter().unique().collect())
    }
}
