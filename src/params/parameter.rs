//! Parameter tree exposed by an effect

use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Stable identity of a parameter within one effect instance
pub type ParameterAddress = u64;

/// A single runtime-adjustable control
///
/// The value is stored as raw `f32` bits so the render context can read it
/// without locking. `dirty` is raised on every write for hosts that have to
/// push values into an external processing unit.
#[derive(Debug)]
pub struct Parameter {
    address: ParameterAddress,
    identifier: String,
    display_name: String,
    min_value: f32,
    max_value: f32,
    unit: String,
    value: AtomicU32,
    dirty: AtomicBool,
}

impl Parameter {
    pub fn new(
        address: ParameterAddress,
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        min_value: f32,
        max_value: f32,
        initial: f32,
    ) -> Self {
        let (min_value, max_value) = if min_value <= max_value {
            (min_value, max_value)
        } else {
            (max_value, min_value)
        };
        let initial = if initial.is_finite() { initial } else { min_value };
        Self {
            address,
            identifier: identifier.into(),
            display_name: display_name.into(),
            min_value,
            max_value,
            unit: String::new(),
            value: AtomicU32::new(initial.clamp(min_value, max_value).to_bits()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn address(&self) -> ParameterAddress {
        self.address
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    /// Unit label, empty when the effect gives none
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Store `value` clamped to `[min, max]` and return what was stored
    ///
    /// Non-finite input leaves the parameter unchanged.
    pub fn set_value(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.value();
        }
        let clamped = value.clamp(self.min_value, self.max_value);
        self.value.store(clamped.to_bits(), Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
        clamped
    }

    /// Update the stored value from the effect side without raising `dirty`
    pub fn sync_value(&self, value: f32) {
        if value.is_finite() {
            self.value.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Clear and return the dirty flag
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Acquire)
    }
}

/// Named group of parameters and subgroups
#[derive(Debug)]
pub struct ParameterGroup {
    pub identifier: String,
    pub display_name: String,
    pub children: Vec<ParameterNode>,
}

impl ParameterGroup {
    pub fn new(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        children: Vec<ParameterNode>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            children,
        }
    }
}

#[derive(Debug)]
pub enum ParameterNode {
    Group(ParameterGroup),
    Parameter(Arc<Parameter>),
}

impl From<Parameter> for ParameterNode {
    fn from(parameter: Parameter) -> Self {
        ParameterNode::Parameter(Arc::new(parameter))
    }
}

impl From<ParameterGroup> for ParameterNode {
    fn from(group: ParameterGroup) -> Self {
        ParameterNode::Group(group)
    }
}

/// Parameters gathered from a group hierarchy, indexed by address
#[derive(Debug)]
pub struct ParameterTree {
    flat: Vec<Arc<Parameter>>,
    index: HashMap<ParameterAddress, Arc<Parameter>>,
}

impl ParameterTree {
    /// Build a tree; when an address repeats, the first occurrence wins
    pub fn new(children: Vec<ParameterNode>) -> Self {
        let mut flat = Vec::new();
        collect(&children, &mut flat);

        let mut index = HashMap::with_capacity(flat.len());
        flat.retain(|p| {
            if index.contains_key(&p.address()) {
                warn!(address = p.address(), "duplicate parameter address ignored");
                false
            } else {
                index.insert(p.address(), p.clone());
                true
            }
        });

        Self { flat, index }
    }

    /// Every parameter, depth first in declaration order
    pub fn all_parameters(&self) -> &[Arc<Parameter>] {
        &self.flat
    }

    pub fn parameter(&self, address: ParameterAddress) -> Option<&Arc<Parameter>> {
        self.index.get(&address)
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }
}

fn collect(nodes: &[ParameterNode], out: &mut Vec<Arc<Parameter>>) {
    for node in nodes {
        match node {
            ParameterNode::Group(group) => collect(&group.children, out),
            ParameterNode::Parameter(parameter) => out.push(parameter.clone()),
        }
    }
}

/// Control-plane view of an effect's parameters
///
/// `None` means the effect has not published a tree (yet).
pub trait ParameterSource: Send + Sync {
    fn parameter_tree(&self) -> Option<Arc<ParameterTree>>;

    /// Apply `value` to the live effect, returning the clamped value kept
    fn write(&self, address: ParameterAddress, value: f32) -> Option<f32> {
        let tree = self.parameter_tree()?;
        Some(tree.parameter(address)?.set_value(value))
    }

    /// Read the value the live effect currently holds
    fn read(&self, address: ParameterAddress) -> Option<f32> {
        let tree = self.parameter_tree()?;
        tree.parameter(address).map(|p| p.value())
    }
}

/// Publication point for a tree that may appear after instantiation
#[derive(Clone, Default)]
pub struct ParameterSlot {
    tree: Arc<ArcSwapOption<ParameterTree>>,
}

impl ParameterSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, tree: ParameterTree) -> Arc<ParameterTree> {
        let tree = Arc::new(tree);
        self.tree.store(Some(tree.clone()));
        tree
    }

    pub fn load(&self) -> Option<Arc<ParameterTree>> {
        self.tree.load_full()
    }
}

impl ParameterSource for ParameterSlot {
    fn parameter_tree(&self) -> Option<Arc<ParameterTree>> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ParameterTree {
        ParameterTree::new(vec![
            ParameterGroup::new(
                "main",
                "Main",
                vec![
                    Parameter::new(10, "mix", "Mix", 0.0, 1.0, 1.0).into(),
                    Parameter::new(11, "depth", "Depth", 0.0, 1.0, 0.5).into(),
                ],
            )
            .into(),
            Parameter::new(20, "cutoff", "Cutoff", 20.0, 20000.0, 80.0)
                .with_unit("Hz")
                .into(),
        ])
    }

    #[test]
    fn test_flatten_keeps_declaration_order() {
        let tree = sample_tree();
        let addresses: Vec<_> = tree.all_parameters().iter().map(|p| p.address()).collect();
        assert_eq!(addresses, vec![10, 11, 20]);
        assert_eq!(tree.parameter(20).unwrap().unit(), "Hz");
        assert!(tree.parameter(99).is_none());
    }

    #[test]
    fn test_set_value_clamps() {
        let p = Parameter::new(0, "x", "X", 0.0, 1.0, 0.2);
        assert_eq!(p.set_value(0.5), 0.5);
        assert_eq!(p.set_value(4.0), 1.0);
        assert_eq!(p.set_value(-1.0), 0.0);
        assert_eq!(p.value(), 0.0);
    }

    #[test]
    fn test_non_finite_write_is_ignored() {
        let p = Parameter::new(0, "x", "X", 0.0, 1.0, 0.2);
        assert_eq!(p.set_value(f32::NAN), 0.2);
        assert!(!p.take_dirty());
    }

    #[test]
    fn test_dirty_flag() {
        let p = Parameter::new(0, "x", "X", 0.0, 1.0, 0.2);
        assert!(!p.take_dirty());
        p.set_value(0.3);
        assert!(p.take_dirty());
        assert!(!p.take_dirty());
    }

    #[test]
    fn test_duplicate_address_first_wins() {
        let tree = ParameterTree::new(vec![
            Parameter::new(1, "a", "A", 0.0, 1.0, 0.0).into(),
            Parameter::new(1, "b", "B", 0.0, 1.0, 0.0).into(),
        ]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.parameter(1).unwrap().identifier(), "a");
    }

    #[test]
    fn test_source_write_and_read_go_through_tree() {
        let slot = ParameterSlot::new();
        assert_eq!(slot.write(10, 0.5), None);
        slot.publish(sample_tree());

        assert_eq!(slot.write(20, 1.0), Some(20.0));
        assert_eq!(slot.read(20), Some(20.0));
        assert_eq!(slot.write(99, 1.0), None);
        assert_eq!(slot.read(99), None);
    }

    #[test]
    fn test_sync_value_does_not_mark_dirty() {
        let p = Parameter::new(0, "x", "X", 0.0, 1.0, 0.2);
        p.sync_value(0.7);
        assert_eq!(p.value(), 0.7);
        assert!(!p.take_dirty());
    }

    #[test]
    fn test_slot_publish_replaces_tree() {
        let slot = ParameterSlot::new();
        assert!(slot.parameter_tree().is_none());
        slot.publish(sample_tree());
        assert_eq!(slot.parameter_tree().unwrap().len(), 3);
        slot.publish(ParameterTree::new(Vec::new()));
        assert!(slot.load().unwrap().is_empty());
    }
}
