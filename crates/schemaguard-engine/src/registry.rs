//! Layers addressable by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use schemaguard_core::errors::ValidationError;

use crate::layers::{ConsistencyLayer, FixLayer, Layer, RlsLayer, SchemaLayer};

/// Id → layer. Registering an id that already exists replaces the old layer.
#[derive(Default)]
pub struct LayerRegistry {
    layers: BTreeMap<String, Arc<dyn Layer>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `schema`, `rls`, `consistency` and `fix`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SchemaLayer));
        registry.register(Arc::new(RlsLayer));
        registry.register(Arc::new(ConsistencyLayer));
        registry.register(Arc::new(FixLayer));
        registry
    }

    pub fn register(&mut self, layer: Arc<dyn Layer>) {
        let id = layer.id().to_string();
        if self.layers.insert(id.clone(), layer).is_some() {
            tracing::debug!(layer = %id, "layer replaced");
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Layer>> {
        self.layers.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Look up every id in order. Any unknown id rejects the whole list.
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<Arc<dyn Layer>>, ValidationError> {
        ids.iter()
            .map(|id| {
                self.get(id).ok_or_else(|| {
                    let known: Vec<&str> = self.ids().collect();
                    ValidationError::new(
                        "layers",
                        format!("unknown layer `{id}` (known: {})", known.join(", ")),
                    )
                })
            })
            .collect()
    }
}
