use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Callables that the quantization rule tables know about. Anything else is kept
/// by name in [`FunctionKind::Other`] so that exclusion lists can still refer to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FunctionKind {
    Add,
    Mul,
    Cat,
    AdaptiveAvgPool2d,
    Interpolate,
    Relu,
    Relu6,
    Flatten,
    Reshape,
    View,
    Other(String),
}

impl FunctionKind {
    pub fn as_str(&self) -> &str {
        match self {
            FunctionKind::Add => "add",
            FunctionKind::Mul => "mul",
            FunctionKind::Cat => "cat",
            FunctionKind::AdaptiveAvgPool2d => "adaptive_avg_pool2d",
            FunctionKind::Interpolate => "interpolate",
            FunctionKind::Relu => "relu",
            FunctionKind::Relu6 => "relu6",
            FunctionKind::Flatten => "flatten",
            FunctionKind::Reshape => "reshape",
            FunctionKind::View => "view",
            FunctionKind::Other(name) => name,
        }
    }
}

impl From<&str> for FunctionKind {
    fn from(name: &str) -> Self {
        match name {
            "add" => FunctionKind::Add,
            "mul" => FunctionKind::Mul,
            "cat" => FunctionKind::Cat,
            "adaptive_avg_pool2d" => FunctionKind::AdaptiveAvgPool2d,
            "interpolate" => FunctionKind::Interpolate,
            "relu" => FunctionKind::Relu,
            "relu6" => FunctionKind::Relu6,
            "flatten" => FunctionKind::Flatten,
            "reshape" => FunctionKind::Reshape,
            "view" => FunctionKind::View,
            other => FunctionKind::Other(other.to_string()),
        }
    }
}

impl From<String> for FunctionKind {
    fn from(name: String) -> Self {
        FunctionKind::from(name.as_str())
    }
}

impl From<FunctionKind> for String {
    fn from(kind: FunctionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl Display for FunctionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// What a node calls or refers to. The meaning depends on the node's
/// [`super::NodeOp`]: module calls carry the registry path of the module,
/// function and method calls carry the callable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// Path of a module in the [`crate::module::ModuleRegistry`].
    Module(String),
    /// A free function or a tensor method.
    Callable(FunctionKind),
    /// Plain name, used by placeholders, attributes and outputs.
    Name(String),
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Target::Module(path) => write!(f, "{}", path),
            Target::Callable(kind) => write!(f, "{}", kind),
            Target::Name(name) => write!(f, "{}", name),
        }
    }
}
