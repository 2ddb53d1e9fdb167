//! Selection of the nodes whose output activation gets a fake-quantizer.
//!
//! On top of the base candidates, every node whose input must be quantized also gets
//! its *output* quantized, right before each consumer. When the consumer is a
//! pass-through operation (clipping, flattening) the quantizer is moved after it
//! instead, as re-quantizing before a no-rescale operation is redundant.
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    graph::{Graph, GraphError, NodeId},
    module::ModuleRegistry,
    rules::QuantizationRules,
};

#[derive(Clone, Copy, Debug)]
pub struct ActQuantSelector<'a> {
    rules: &'a QuantizationRules,
}

impl<'a> ActQuantSelector<'a> {
    pub fn new(rules: &'a QuantizationRules) -> Self {
        Self { rules }
    }

    /// Returns `base` followed by the output quantization points, without duplicates
    /// and in first-seen order.
    pub fn select(
        &self,
        graph: &Graph,
        modules: &ModuleRegistry,
        base: Vec<NodeId>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let points = self.output_quant_points(graph, modules)?;
        Ok(base.into_iter().chain(points).unique().collect())
    }

    /// Raw output quantization points, one per (qualifying node, consumer) pair, in
    /// canonical order. The same node can appear several times.
    pub fn output_quant_points(
        &self,
        graph: &Graph,
        modules: &ModuleRegistry,
    ) -> Result<Vec<NodeId>, GraphError> {
        let mut points = vec![];
        for node in graph.nodes() {
            if self.rules.is_excluded(node) {
                debug!("exclude skip: {}", node.name());
                continue;
            }
            if !self.rules.needs_input_quant(node, modules)? {
                continue;
            }
            for user in graph.users(node.id())? {
                if self.rules.is_pass_through(user, modules)? {
                    trace!("{} passes through {}, quantizing its output", node.name(), user.name());
                    points.push(user.id());
                } else {
                    points.push(node.id());
                }
            }
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        candidates::{CandidateSource, InputQuantCandidates},
        config::ExtraQuantizerConfig,
        graph::FunctionKind,
        module::ModuleKind,
        quantizer::{ModelQuantizer, TpuQuantizer},
        testing::ModelBuilder,
    };

    fn tpu_rules() -> QuantizationRules {
        TpuQuantizer::new(&ExtraQuantizerConfig::default()).rules().clone()
    }

    fn tpu_rules_with(extra: ExtraQuantizerConfig) -> QuantizationRules {
        TpuQuantizer::new(&extra).rules().clone()
    }

    #[test]
    fn test_pass_through_module_defers_quantization() -> anyhow::Result<()> {
        // conv(A) -> relu(B) -> conv(C)
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConv2d, &[x]);
        let b = builder.module("b", ModuleKind::ReLU, &[a]);
        let c = builder.module("c", ModuleKind::QatConv2d, &[b]);
        builder.output(&[c]);
        let model = builder.build();
        let rules = tpu_rules();
        let selector = ActQuantSelector::new(&rules);

        let points = selector.output_quant_points(&model.graph, &model.modules)?;
        assert!(points.contains(&b));
        assert!(!points.contains(&a));

        let base = InputQuantCandidates.candidates(&model.graph, &model.modules, &rules)?;
        assert_eq!(base, vec![x, b]);
        let selected = selector.select(&model.graph, &model.modules, base)?;
        // c feeds the output node, which is not a pass-through
        assert_eq!(selected, vec![x, b, c]);
        Ok(())
    }

    #[test]
    fn test_linear_chain_quantizes_producer() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatLinear, &[x]);
        let b = builder.module("b", ModuleKind::QatLinear, &[a]);
        let model = builder.build();
        let rules = tpu_rules();

        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        // b has no consumer, it contributes nothing
        assert_eq!(points, vec![a]);
        assert!(!points.contains(&b));
        Ok(())
    }

    #[test]
    fn test_cat_is_quantized() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let y = builder.input("y");
        let cat = builder.function("cat", FunctionKind::Cat, &[x, y]);
        builder.module("z", ModuleKind::QatConv2d, &[cat]);
        let model = builder.build();
        let rules = tpu_rules();

        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        assert_eq!(points, vec![cat]);
        Ok(())
    }

    #[rstest]
    #[case::by_node_name(ExtraQuantizerConfig { exclude_node_name: vec!["a".into()], ..Default::default() })]
    #[case::by_module_name(ExtraQuantizerConfig { exclude_module_name: vec!["a".into()], ..Default::default() })]
    fn test_exclusion_precedes_inclusion(#[case] extra: ExtraQuantizerConfig) -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConv2d, &[x]);
        let b = builder.module("b", ModuleKind::ReLU, &[a]);
        let c = builder.module("c", ModuleKind::QatLinear, &[a]);
        let model = builder.build();
        let rules = tpu_rules_with(extra);

        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        assert!(!points.contains(&a));
        // no consumer side effect either: the pass-through b is not picked through a
        assert!(!points.contains(&b));
        assert!(!points.contains(&c));
        Ok(())
    }

    #[test]
    fn test_excluded_function_type() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let y = builder.input("y");
        let add = builder.function("add", FunctionKind::Add, &[x, y]);
        let sum = builder.method("sum", FunctionKind::Add, &[add, y]);
        builder.output(&[sum]);
        let model = builder.build();

        let rules = tpu_rules();
        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        assert_eq!(points, vec![add, sum]);

        let rules = tpu_rules_with(ExtraQuantizerConfig {
            exclude_function_type: vec![FunctionKind::Add],
            ..Default::default()
        });
        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        assert!(points.is_empty());
        Ok(())
    }

    #[test]
    fn test_producer_listed_once_per_result() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConv2d, &[x]);
        for i in 0..3 {
            builder.module(&format!("fc{}", i), ModuleKind::QatLinear, &[a]);
        }
        let model = builder.build();
        let rules = tpu_rules();
        let selector = ActQuantSelector::new(&rules);

        let raw = selector.output_quant_points(&model.graph, &model.modules)?;
        assert_eq!(raw.iter().filter(|id| **id == a).count(), 3);
        let selected = selector.select(&model.graph, &model.modules, vec![a])?;
        assert_eq!(selected, vec![a]);
        Ok(())
    }

    #[test]
    fn test_all_pass_through_consumers_are_quantized() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConvBn2d, &[x]);
        let relu = builder.function("relu", FunctionKind::Relu, &[a]);
        let relu6 = builder.module("relu6", ModuleKind::ReLU6, &[a]);
        let flatten = builder.function("flatten", FunctionKind::Flatten, &[a]);
        let model = builder.build();
        let rules = tpu_rules();

        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        assert_eq!(points, vec![relu, relu6, flatten]);
        Ok(())
    }

    #[test]
    fn test_method_consumer_is_not_pass_through() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConv2d, &[x]);
        builder.method("flatten", FunctionKind::Flatten, &[a]);
        let model = builder.build();
        let rules = tpu_rules();

        let points = ActQuantSelector::new(&rules).output_quant_points(&model.graph, &model.modules)?;
        assert_eq!(points, vec![a]);
        Ok(())
    }

    #[test]
    fn test_unregistered_module_is_fatal() {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConv2d, &[x]);
        builder.unregistered_module("ghost", &[a]);
        let model = builder.build();
        let rules = tpu_rules();

        let err = ActQuantSelector::new(&rules)
            .output_quant_points(&model.graph, &model.modules)
            .unwrap_err();
        assert_eq!(err, GraphError::UnresolvedModule {
            node: "ghost".into(),
            target: "ghost".into()
        });
    }
}
