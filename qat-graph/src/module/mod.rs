//! Module instances referenced by module-call nodes.
//!
//! Module kinds form a closed set: the quantization rule tables are plain sets of
//! [`ModuleKind`] values rather than type hierarchies.
mod registry;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

pub use registry::ModuleRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKind {
    // float layers
    Conv2d,
    ConvTranspose2d,
    Linear,
    BatchNorm2d,
    // fused float layers
    ConvBn2d,
    ConvBnReLU2d,
    ConvReLU2d,
    LinearReLU,
    LinearBn1d,
    ConvTransposeBn2d,
    ConvTransposeBnReLU2d,
    ConvTransposeReLU2d,
    // quantization-aware training layers
    QatConv2d,
    QatConvBn2d,
    QatConvBnReLU2d,
    QatConvReLU2d,
    QatLinear,
    QatLinearReLU,
    QatLinearBn1d,
    QatConvTranspose2d,
    QatConvTransposeBn2d,
    QatConvTransposeBnReLU2d,
    QatConvTransposeReLU2d,
    // activations
    ReLU,
    ReLU6,
    PReLU,
    // pooling and resampling
    MaxPool2d,
    AvgPool2d,
    AdaptiveAvgPool2d,
    Upsample,
    // shape and no-op modules
    Flatten,
    Dropout,
    Identity,
    FakeQuantize,
}

impl Display for ModuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?}", self)
    }
}

/// Mutable quantization parameters of a fake-quantizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FakeQuantizeState {
    pub scale: f32,
    pub zero_point: i32,
    pub quant_min: i32,
    pub quant_max: i32,
    pub observer_enabled: bool,
    pub fake_quant_enabled: bool,
}

impl Default for FakeQuantizeState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            zero_point: 0,
            quant_min: -128,
            quant_max: 127,
            observer_enabled: true,
            fake_quant_enabled: true,
        }
    }
}

/// Shared reference to the state of a fake-quantizer. Cloning the handle shares the
/// underlying state, so every weight layer wired to the same quantizer observes its
/// updates.
#[derive(Clone, Debug, Default)]
pub struct FakeQuantizerHandle(Arc<RwLock<FakeQuantizeState>>);

impl FakeQuantizerHandle {
    pub fn new(state: FakeQuantizeState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Returns true if both handles point to the same fake-quantizer instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn state(&self) -> FakeQuantizeState {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn scale(&self) -> f32 {
        self.0.read().unwrap_or_else(PoisonError::into_inner).scale
    }

    pub fn set_qparams(&self, scale: f32, zero_point: i32) {
        let mut state = self.0.write().unwrap_or_else(PoisonError::into_inner);
        state.scale = scale;
        state.zero_point = zero_point;
    }
}

/// Any module which is not a fake-quantizer.
#[derive(Clone, Debug)]
pub struct Layer {
    kind: ModuleKind,
    // fake-quantizer whose scale this layer reuses for its input
    input_fake_quantizer: Option<FakeQuantizerHandle>,
}

impl Layer {
    pub fn new(kind: ModuleKind) -> Self {
        Self {
            kind,
            input_fake_quantizer: None,
        }
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn input_fake_quantizer(&self) -> Option<&FakeQuantizerHandle> {
        self.input_fake_quantizer.as_ref()
    }

    /// Sets the input scale source of this layer, replacing any previous one.
    pub fn set_input_fake_quantizer(&mut self, fake_quantizer: FakeQuantizerHandle) {
        self.input_fake_quantizer = Some(fake_quantizer);
    }

    /// Scale of the input activation, taken from the input fake-quantizer if any.
    pub fn input_scale(&self) -> Option<f32> {
        self.input_fake_quantizer.as_ref().map(|fq| fq.scale())
    }

    pub(crate) fn set_kind(&mut self, kind: ModuleKind) {
        self.kind = kind;
    }
}

#[derive(Clone, Debug)]
pub enum Module {
    Layer(Layer),
    FakeQuantizer(FakeQuantizerHandle),
}

impl Module {
    pub fn kind(&self) -> ModuleKind {
        match self {
            Module::Layer(layer) => layer.kind(),
            Module::FakeQuantizer(_) => ModuleKind::FakeQuantize,
        }
    }

    pub fn as_layer(&self) -> Option<&Layer> {
        match self {
            Module::Layer(layer) => Some(layer),
            Module::FakeQuantizer(_) => None,
        }
    }

    pub fn as_layer_mut(&mut self) -> Option<&mut Layer> {
        match self {
            Module::Layer(layer) => Some(layer),
            Module::FakeQuantizer(_) => None,
        }
    }

    pub fn as_fake_quantizer(&self) -> Option<&FakeQuantizerHandle> {
        match self {
            Module::FakeQuantizer(fq) => Some(fq),
            Module::Layer(_) => None,
        }
    }
}

impl From<ModuleKind> for Module {
    fn from(kind: ModuleKind) -> Self {
        match kind {
            ModuleKind::FakeQuantize => Module::FakeQuantizer(FakeQuantizerHandle::default()),
            kind => Module::Layer(Layer::new(kind)),
        }
    }
}
