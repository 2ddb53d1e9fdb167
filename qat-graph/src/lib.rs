//! Placement of activation fake-quantizers in a computation graph for
//! quantization-aware training, and wiring of these quantizers to the weight layers
//! reusing their scale.
//!
//! A [`quantizer::ModelQuantizer`] prepares a [`GraphModel`] in four steps:
//! 1. swap float modules for their quantization-aware training variant,
//! 2. select the nodes whose output must be fake-quantized ([`ActQuantSelector`]),
//! 3. insert the fake-quantizers ([`insertion::insert_act_fake_quantizers`]),
//! 4. attach each fake-quantizer to the weight layers consuming it
//!    ([`propagate_input_fake_quantizers`]).
pub mod candidates;
pub mod config;
pub mod graph;
pub mod insertion;
pub mod model;
pub mod module;
pub mod propagator;
pub mod quantizer;
pub mod rules;
pub mod selector;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, ExtraQuantizerConfig};
pub use graph::{Graph, GraphError, Node, NodeId};
pub use model::{GraphModel, ModelDescription};
pub use module::{FakeQuantizerHandle, ModuleKind, ModuleRegistry};
pub use propagator::{propagate_input_fake_quantizers, Attachment};
pub use quantizer::{model_quantizer, BackendType, ModelQuantizer, PrepareReport, TpuQuantizer};
pub use rules::QuantizationRules;
pub use selector::ActQuantSelector;
