//! Model quantizers: per backend rule tables and the `prepare` pipeline which turns a
//! float graph into a graph ready for quantization-aware training.
mod tpu;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    candidates::{CandidateSource, InputQuantCandidates},
    config::ExtraQuantizerConfig,
    graph::{GraphError, NodeId},
    insertion::insert_act_fake_quantizers,
    model::GraphModel,
    module::{FakeQuantizeState, ModuleKind},
    propagator::Attachment,
    rules::QuantizationRules,
};

pub use tpu::TpuQuantizer;

/// Hardware backends with a dedicated quantizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// INT8-only tensor processing unit
    Tpu,
}

/// Returns the quantizer registered for `backend`.
pub fn model_quantizer(
    backend: BackendType,
    extra: &ExtraQuantizerConfig,
) -> Box<dyn ModelQuantizer> {
    match backend {
        BackendType::Tpu => Box::new(TpuQuantizer::new(extra)),
    }
}

/// Outcome of [`ModelQuantizer::prepare`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PrepareReport {
    /// Modules replaced by their quantization-aware training variant
    pub swapped_modules: Vec<String>,
    /// Nodes whose output is fake-quantized
    pub quantized_outputs: Vec<String>,
    /// Fake-quantizer nodes added to the graph
    pub inserted_fake_quantizers: Vec<String>,
    pub attachments: Vec<Attachment>,
}

pub trait ModelQuantizer {
    fn rules(&self) -> &QuantizationRules;

    /// Module kinds to replace by their quantization-aware training variant.
    fn qat_module_mapping(&self) -> &HashMap<ModuleKind, ModuleKind>;

    /// Initial state of every inserted fake-quantizer.
    fn fake_quantize_state(&self) -> FakeQuantizeState {
        FakeQuantizeState::default()
    }

    /// Nodes whose output must be fake-quantized.
    fn find_act_quants(&self, model: &GraphModel) -> Result<Vec<NodeId>, GraphError> {
        InputQuantCandidates.candidates(&model.graph, &model.modules, self.rules())
    }

    /// Runs once the fake-quantizers are part of the graph.
    fn after_insertion(&self, _model: &mut GraphModel) -> Result<Vec<Attachment>, GraphError> {
        Ok(vec![])
    }

    /// Swaps modules for their training variant, then inserts the activation
    /// fake-quantizers. The graph must be consistent with its registry.
    fn prepare(&self, model: &mut GraphModel) -> Result<PrepareReport, GraphError> {
        let swapped_modules = model.modules.swap_qat_modules(self.qat_module_mapping());
        let points = self.find_act_quants(model)?;
        let quantized_outputs = points
            .iter()
            .map(|id| model.graph.node(*id).map(|node| node.name().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let inserted = insert_act_fake_quantizers(model, &points, &self.fake_quantize_state())?;
        let inserted_fake_quantizers = inserted
            .iter()
            .map(|id| model.graph.node(*id).map(|node| node.name().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "prepare: {} modules swapped, {} fake-quantizers inserted",
            swapped_modules.len(),
            inserted_fake_quantizers.len()
        );
        let attachments = self.after_insertion(model)?;
        Ok(PrepareReport {
            swapped_modules,
            quantized_outputs,
            inserted_fake_quantizers,
            attachments,
        })
    }
}
