use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{Module, ModuleKind};
use crate::graph::{GraphError, Node};

/// Mapping from module path to module instance. Module-call nodes are resolved
/// through it.
#[derive(Clone, Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` under `path`, returning the module previously registered there.
    pub fn insert<S: Into<String>, M: Into<Module>>(&mut self, path: S, module: M) -> Option<Module> {
        self.modules.insert(path.into(), module.into())
    }

    pub fn get(&self, path: &str) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Module> {
        self.modules.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Module)> + '_ {
        self.modules.iter()
    }

    /// Resolves the module called by a module-call node. A missing module means the
    /// graph and the registry are inconsistent.
    pub fn resolve(&self, node: &Node) -> Result<&Module, GraphError> {
        node.module_target()
            .and_then(|path| self.modules.get(path))
            .ok_or_else(|| unresolved(node))
    }

    pub fn resolve_mut(&mut self, node: &Node) -> Result<&mut Module, GraphError> {
        node.module_target()
            .and_then(|path| self.modules.get_mut(path))
            .ok_or_else(|| unresolved(node))
    }

    /// Kind of the module called by `node`, or `None` if `node` is not a module call.
    pub fn kind_of(&self, node: &Node) -> Result<Option<ModuleKind>, GraphError> {
        match node.module_target() {
            Some(_) => self.resolve(node).map(|module| Some(module.kind())),
            None => Ok(None),
        }
    }

    /// Replaces the kind of every layer found in `mapping` by its mapped kind.
    /// Returns the paths of the swapped modules, in path order.
    pub fn swap_qat_modules(&mut self, mapping: &HashMap<ModuleKind, ModuleKind>) -> Vec<String> {
        let mut swapped = vec![];
        for (path, module) in self.modules.iter_mut() {
            let Some(layer) = module.as_layer_mut() else {
                continue;
            };
            if let Some(qat_kind) = mapping.get(&layer.kind()) {
                debug!("swapping module {}: {} -> {}", path, layer.kind(), qat_kind);
                layer.set_kind(*qat_kind);
                swapped.push(path.clone());
            }
        }
        swapped
    }
}

fn unresolved(node: &Node) -> GraphError {
    GraphError::UnresolvedModule {
        node: node.name().to_string(),
        target: node.target().to_string(),
    }
}
