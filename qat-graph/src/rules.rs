//! Rule tables deciding where activation fake-quantizers go.
//!
//! The tables are plain data built once per quantizer and shared, read-only, by
//! every pass.
use std::collections::HashSet;

use crate::{
    config::ExtraQuantizerConfig,
    graph::{FunctionKind, GraphError, Node},
    module::{ModuleKind, ModuleRegistry},
};

/// Modules whose input is quantized by every backend.
pub const BASE_MODULE_TYPES_TO_QUANT_INPUT: [ModuleKind; 17] = [
    ModuleKind::QatConvBnReLU2d,
    ModuleKind::QatConvBn2d,
    ModuleKind::QatConv2d,
    ModuleKind::QatConvReLU2d,
    ModuleKind::QatLinear,
    ModuleKind::QatLinearReLU,
    ModuleKind::QatLinearBn1d,
    ModuleKind::QatConvTranspose2d,
    ModuleKind::QatConvTransposeBn2d,
    ModuleKind::QatConvTransposeBnReLU2d,
    ModuleKind::QatConvTransposeReLU2d,
    ModuleKind::MaxPool2d,
    ModuleKind::AvgPool2d,
    ModuleKind::AdaptiveAvgPool2d,
    ModuleKind::BatchNorm2d,
    // PReLU is mostly left unfused
    ModuleKind::PReLU,
    ModuleKind::Upsample,
];

/// Functions whose inputs are quantized by every backend.
pub const BASE_FUNCTION_TYPES_TO_QUANT_INPUT: [FunctionKind; 5] = [
    FunctionKind::Add,
    FunctionKind::Mul,
    FunctionKind::Cat,
    FunctionKind::AdaptiveAvgPool2d,
    FunctionKind::Interpolate,
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantizationRules {
    pub(crate) module_types_needing_input_quant: HashSet<ModuleKind>,
    pub(crate) function_types_needing_input_quant: HashSet<FunctionKind>,
    pub(crate) pass_through_function_types: HashSet<FunctionKind>,
    pub(crate) pass_through_module_types: HashSet<ModuleKind>,
    pub(crate) weight_layer_types_needing_input_scale: HashSet<ModuleKind>,
    pub(crate) excluded_module_names: HashSet<String>,
    pub(crate) excluded_function_types: HashSet<FunctionKind>,
    pub(crate) excluded_node_names: HashSet<String>,
}

impl QuantizationRules {
    /// Rules with empty tables: nothing is quantized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules shared by every backend.
    pub fn base() -> Self {
        Self::new()
            .with_module_types_to_quant_input(BASE_MODULE_TYPES_TO_QUANT_INPUT)
            .with_function_types_to_quant_input(BASE_FUNCTION_TYPES_TO_QUANT_INPUT)
    }

    pub fn with_module_types_to_quant_input<I: IntoIterator<Item = ModuleKind>>(
        mut self,
        kinds: I,
    ) -> Self {
        self.module_types_needing_input_quant.extend(kinds);
        self
    }

    pub fn with_function_types_to_quant_input<I: IntoIterator<Item = FunctionKind>>(
        mut self,
        functions: I,
    ) -> Self {
        self.function_types_needing_input_quant.extend(functions);
        self
    }

    pub fn with_pass_through_functions<I: IntoIterator<Item = FunctionKind>>(
        mut self,
        functions: I,
    ) -> Self {
        self.pass_through_function_types.extend(functions);
        self
    }

    pub fn with_pass_through_modules<I: IntoIterator<Item = ModuleKind>>(mut self, kinds: I) -> Self {
        self.pass_through_module_types.extend(kinds);
        self
    }

    /// Registers weight layers which reuse the scale of the fake-quantizer preceding
    /// them. Their inputs are quantized as well.
    pub fn with_weight_layers_needing_input_scale<I: IntoIterator<Item = ModuleKind>>(
        mut self,
        kinds: I,
    ) -> Self {
        for kind in kinds {
            self.weight_layer_types_needing_input_scale.insert(kind);
            self.module_types_needing_input_quant.insert(kind);
        }
        self
    }

    /// Layers the user configuration on top of these rules.
    pub fn with_extra(mut self, extra: &ExtraQuantizerConfig) -> Self {
        self.excluded_module_names
            .extend(extra.exclude_module_name.iter().cloned());
        self.excluded_function_types
            .extend(extra.exclude_function_type.iter().cloned());
        self.excluded_node_names
            .extend(extra.exclude_node_name.iter().cloned());
        self.module_types_needing_input_quant
            .extend(extra.additional_module_type.iter().copied());
        self.function_types_needing_input_quant
            .extend(extra.additional_function_type.iter().cloned());
        self
    }

    /// A node is excluded when its module path, its callable or its name is deny-listed.
    pub fn is_excluded(&self, node: &Node) -> bool {
        node.module_target()
            .is_some_and(|path| self.excluded_module_names.contains(path))
            || node
                .callable()
                .is_some_and(|f| self.excluded_function_types.contains(f))
            || self.excluded_node_names.contains(node.name())
    }

    /// Whether the input of `node` must be quantized.
    pub fn needs_input_quant(&self, node: &Node, modules: &ModuleRegistry) -> Result<bool, GraphError> {
        if let Some(kind) = modules.kind_of(node)? {
            return Ok(self.module_types_needing_input_quant.contains(&kind));
        }
        Ok(node
            .callable()
            .is_some_and(|f| self.function_types_needing_input_quant.contains(f)))
    }

    /// Whether `node` can sit between a quantized producer and the real consumer
    /// without a quantizer of its own. Method calls never pass through.
    pub fn is_pass_through(&self, node: &Node, modules: &ModuleRegistry) -> Result<bool, GraphError> {
        if let Some(kind) = modules.kind_of(node)? {
            return Ok(self.pass_through_module_types.contains(&kind));
        }
        Ok(node
            .function()
            .is_some_and(|f| self.pass_through_function_types.contains(f)))
    }

    pub fn needs_input_scale(&self, kind: ModuleKind) -> bool {
        self.weight_layer_types_needing_input_scale.contains(&kind)
    }
}
