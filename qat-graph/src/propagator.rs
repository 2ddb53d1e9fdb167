//! Wires activation fake-quantizers to the weight layers consuming their output, so
//! that these layers reuse the activation scale as their input scale.
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    graph::GraphError,
    model::GraphModel,
    module::ModuleKind,
    rules::QuantizationRules,
};

/// Record of a weight layer taking its input scale from a fake-quantizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// Module path of the fake-quantizer
    pub fake_quantizer: String,
    /// Module path of the weight layer
    pub layer: String,
    pub kind: ModuleKind,
}

/// For every activation fake-quantizer node, sets the input fake-quantizer of each
/// directly consuming weight layer that needs an input scale. Only direct consumers
/// are considered. When several fake-quantizers feed the same layer, the last one in
/// canonical order wins.
///
/// Must run after the fake-quantizers have been inserted, otherwise there is nothing
/// to attach.
pub fn propagate_input_fake_quantizers(
    model: &mut GraphModel,
    rules: &QuantizationRules,
) -> Result<Vec<Attachment>, GraphError> {
    let GraphModel { graph, modules } = model;
    let mut attachments = vec![];
    for node in graph.nodes().filter(|node| node.is_act_fake_quantizer()) {
        let Ok(module) = modules.resolve(node) else {
            warn!("fake-quantizer node {} has no module, skipping", node.name());
            continue;
        };
        let fake_quantizer = module.as_fake_quantizer().cloned().ok_or_else(|| {
            GraphError::NotAFakeQuantizer {
                node: node.name().to_string(),
                target: node.target().to_string(),
            }
        })?;
        for user in graph.users(node.id())? {
            let Some(path) = user.module_target() else {
                continue;
            };
            let kind = modules.resolve(user)?.kind();
            if !rules.needs_input_scale(kind) {
                continue;
            }
            if let Some(layer) = modules.resolve_mut(user)?.as_layer_mut() {
                layer.set_input_fake_quantizer(fake_quantizer.clone());
                info!("{} of type {} takes its input scale from {}", path, kind, node.target());
                attachments.push(Attachment {
                    fake_quantizer: node.target().to_string(),
                    layer: path.to_string(),
                    kind,
                });
            }
        }
    }
    Ok(attachments)
}
