//! Splices activation fake-quantizers into the graph.
use itertools::Itertools;
use tracing::debug;

use crate::{
    graph::{GraphError, NodeId, NodeKind, NodeOp, Target},
    model::GraphModel,
    module::{FakeQuantizeState, FakeQuantizerHandle, Module},
};

/// Suffix of the names given to activation fake-quantizer nodes and modules.
pub const ACT_FAKE_QUANTIZER_SUFFIX: &str = "_post_act_fake_quantizer";

/// Inserts one fake-quantizer after each node of `points` and registers its module
/// under the node name. Duplicated points are handled once, and points already
/// followed by activation fake-quantizers only are left untouched, so calling this
/// again on a prepared graph inserts nothing. Returns the ids of the new nodes.
pub fn insert_act_fake_quantizers(
    model: &mut GraphModel,
    points: &[NodeId],
    fake_quantize: &FakeQuantizeState,
) -> Result<Vec<NodeId>, GraphError> {
    let mut inserted = vec![];
    for point in points.iter().unique() {
        let node = model.graph.node(*point)?;
        if node.is_act_fake_quantizer() || is_already_quantized(model, *point)? {
            debug!("{} already fake-quantized, skipping", node.name());
            continue;
        }
        let name = fresh_name(model, &format!("{}{}", node.name(), ACT_FAKE_QUANTIZER_SUFFIX));
        model.modules.insert(
            name.clone(),
            Module::FakeQuantizer(FakeQuantizerHandle::new(fake_quantize.clone())),
        );
        let id = model.graph.insert_after(
            *point,
            name.clone(),
            NodeOp::CallModule,
            Target::Module(name.clone()),
            NodeKind::ActFakeQuantizer,
        )?;
        debug!("inserted {}", name);
        inserted.push(id);
    }
    Ok(inserted)
}

fn is_already_quantized(model: &GraphModel, id: NodeId) -> Result<bool, GraphError> {
    let mut users = model.graph.users(id)?.peekable();
    Ok(users.peek().is_some() && users.all(|user| user.is_act_fake_quantizer()))
}

// name free both in the graph and in the registry
fn fresh_name(model: &GraphModel, base: &str) -> String {
    let name = model.graph.unique_name(base);
    if !model.modules.contains(&name) {
        return name;
    }
    (1..)
        .map(|i| format!("{}_{}", base, i))
        .find(|candidate| !model.graph.contains_name(candidate) && !model.modules.contains(candidate))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{module::ModuleKind, testing::ModelBuilder};

    #[test]
    fn test_insert_once_per_point() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        let a = builder.module("a", ModuleKind::QatConv2d, &[x]);
        let b = builder.module("b", ModuleKind::QatLinear, &[a]);
        let mut model = builder.build();

        let inserted =
            insert_act_fake_quantizers(&mut model, &[a, a, x], &FakeQuantizeState::default())?;
        assert_eq!(inserted.len(), 2);

        let fq = model.graph.node(inserted[0])?;
        assert_eq!(fq.name(), "a_post_act_fake_quantizer");
        assert!(fq.is_act_fake_quantizer());
        assert_eq!(fq.users(), &[b]);
        assert!(
            model
                .modules
                .get("a_post_act_fake_quantizer")
                .and_then(Module::as_fake_quantizer)
                .is_some()
        );
        assert_eq!(model.graph.node(inserted[1])?.name(), "x_post_act_fake_quantizer");

        // second run is a no-op
        let again = insert_act_fake_quantizers(&mut model, &[a, x, inserted[0]], &FakeQuantizeState::default())?;
        assert!(again.is_empty());
        assert_eq!(model.graph.len(), 5);
        Ok(())
    }

    #[test]
    fn test_name_collision() -> anyhow::Result<()> {
        let mut builder = ModelBuilder::new();
        let x = builder.input("x");
        builder.module("x_post_act_fake_quantizer", ModuleKind::Identity, &[x]);
        let mut model = builder.build();
        model.modules.insert("x_post_act_fake_quantizer_1", ModuleKind::Identity);

        let inserted = insert_act_fake_quantizers(&mut model, &[x], &FakeQuantizeState::default())?;
        assert_eq!(model.graph.node(inserted[0])?.name(), "x_post_act_fake_quantizer_2");
        Ok(())
    }
}
