//! Parameter Catalog
//!
//! Flattens an effect's parameter tree into an ordered list for display and
//! routes edits back into the live effect.

use super::parameter::{ParameterAddress, ParameterSource, ParameterTree};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Snapshot of one parameter at refresh time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub address: ParameterAddress,
    pub display_name: String,
    pub identifier: String,
    pub current_value: f32,
    pub min_value: f32,
    pub max_value: f32,
    /// Empty when the effect gives no unit
    pub unit: String,
}

/// Catalog bound to at most one effect's parameter source
#[derive(Default)]
pub struct ParameterCatalog {
    source: Option<Arc<dyn ParameterSource>>,
    entries: Vec<ParameterInfo>,
}

impl ParameterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the list from `source`, replacing any previous binding
    ///
    /// An absent source or an effect that has not published a tree yields an
    /// empty list.
    pub fn refresh(&mut self, source: Option<Arc<dyn ParameterSource>>) -> &[ParameterInfo] {
        let tree = source.as_ref().and_then(|s| s.parameter_tree());
        self.source = source;
        self.entries = tree.map(|t| snapshot(&t)).unwrap_or_default();

        debug!(count = self.entries.len(), "parameter catalog refreshed");
        &self.entries
    }

    /// Write `value` to the live parameter at `address`
    ///
    /// Returns the value the effect kept after clamping, or `None` when the
    /// address is unknown to the live effect; unknown addresses are ignored.
    pub fn write(&mut self, address: ParameterAddress, value: f32) -> Option<f32> {
        let applied = self.source.as_ref()?.write(address, value)?;
        if let Some(info) = self.entries.iter_mut().find(|info| info.address == address) {
            info.current_value = applied;
        }
        Some(applied)
    }

    /// Read the current value straight from the live effect
    pub fn read(&self, address: ParameterAddress) -> Option<f32> {
        self.source.as_ref()?.read(address)
    }

    /// Last value seen for `address` through refresh or write
    pub fn value(&self, address: ParameterAddress) -> Option<f32> {
        self.entries
            .iter()
            .find(|info| info.address == address)
            .map(|info| info.current_value)
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.entries
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    /// Unbind and forget everything
    pub fn clear(&mut self) {
        self.source = None;
        self.entries.clear();
    }
}

fn snapshot(tree: &ParameterTree) -> Vec<ParameterInfo> {
    tree.all_parameters()
        .iter()
        .map(|p| ParameterInfo {
            address: p.address(),
            display_name: p.display_name().to_string(),
            identifier: p.identifier().to_string(),
            current_value: p.value(),
            min_value: p.min_value(),
            max_value: p.max_value(),
            unit: p.unit().to_string(),
        })
        .collect()
}
