//! Quantizer for INT8-only tensor processing units.
//!
//! Every layer computes in INT8, so the inputs and outputs of all layers are
//! quantized, except around pass-through operations: an `add` followed by a `relu`
//! for instance does not need a fake-quantizer in between.
use std::collections::HashMap;

use super::ModelQuantizer;
use crate::{
    candidates::{CandidateSource, InputQuantCandidates},
    config::ExtraQuantizerConfig,
    graph::{FunctionKind, GraphError, NodeId},
    model::GraphModel,
    module::ModuleKind,
    propagator::{propagate_input_fake_quantizers, Attachment},
    rules::QuantizationRules,
    selector::ActQuantSelector,
};

pub const PASS_THROUGH_FUNCTION_TYPES: [FunctionKind; 3] =
    [FunctionKind::Relu, FunctionKind::Relu6, FunctionKind::Flatten];

pub const PASS_THROUGH_MODULE_TYPES: [ModuleKind; 2] = [ModuleKind::ReLU, ModuleKind::ReLU6];

/// Weight layers computing their input scale from the preceding fake-quantizer.
// TODO: transposed convolutions once their QAT variants read the input scale
pub const WEIGHT_LAYERS_NEEDING_INPUT_SCALE: [ModuleKind; 6] = [
    ModuleKind::QatConvBnReLU2d,
    ModuleKind::QatConvBn2d,
    ModuleKind::QatConvReLU2d,
    ModuleKind::QatConv2d,
    ModuleKind::QatLinearReLU,
    ModuleKind::QatLinear,
];

const QAT_MODULE_MAPPING: [(ModuleKind, ModuleKind); 11] = [
    (ModuleKind::ConvTranspose2d, ModuleKind::QatConvTranspose2d),
    (ModuleKind::ConvBn2d, ModuleKind::QatConvBn2d),
    (ModuleKind::ConvBnReLU2d, ModuleKind::QatConvBnReLU2d),
    (ModuleKind::Conv2d, ModuleKind::QatConv2d),
    (ModuleKind::ConvReLU2d, ModuleKind::QatConvReLU2d),
    (ModuleKind::LinearReLU, ModuleKind::QatLinearReLU),
    (ModuleKind::Linear, ModuleKind::QatLinear),
    (ModuleKind::LinearBn1d, ModuleKind::QatLinearBn1d),
    (ModuleKind::ConvTransposeBnReLU2d, ModuleKind::QatConvTransposeBnReLU2d),
    (ModuleKind::ConvTransposeReLU2d, ModuleKind::QatConvTransposeReLU2d),
    (ModuleKind::ConvTransposeBn2d, ModuleKind::QatConvTransposeBn2d),
];

#[derive(Clone, Debug)]
pub struct TpuQuantizer {
    rules: QuantizationRules,
    qat_module_mapping: HashMap<ModuleKind, ModuleKind>,
}

impl TpuQuantizer {
    pub fn new(extra: &ExtraQuantizerConfig) -> Self {
        let rules = QuantizationRules::base()
            .with_weight_layers_needing_input_scale(WEIGHT_LAYERS_NEEDING_INPUT_SCALE)
            .with_function_types_to_quant_input([FunctionKind::Cat])
            .with_pass_through_functions(PASS_THROUGH_FUNCTION_TYPES)
            .with_pass_through_modules(PASS_THROUGH_MODULE_TYPES)
            .with_extra(extra);
        Self {
            rules,
            qat_module_mapping: HashMap::from(QAT_MODULE_MAPPING),
        }
    }
}

impl Default for TpuQuantizer {
    fn default() -> Self {
        Self::new(&ExtraQuantizerConfig::default())
    }
}

impl ModelQuantizer for TpuQuantizer {
    fn rules(&self) -> &QuantizationRules {
        &self.rules
    }

    fn qat_module_mapping(&self) -> &HashMap<ModuleKind, ModuleKind> {
        &self.qat_module_mapping
    }

    fn find_act_quants(&self, model: &GraphModel) -> Result<Vec<NodeId>, GraphError> {
        let base = InputQuantCandidates.candidates(&model.graph, &model.modules, &self.rules)?;
        ActQuantSelector::new(&self.rules).select(&model.graph, &model.modules, base)
    }

    fn after_insertion(&self, model: &mut GraphModel) -> Result<Vec<Attachment>, GraphError> {
        propagate_input_fake_quantizers(model, &self.rules)
    }
}
