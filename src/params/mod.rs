//! Effect parameters: tree, catalog and discovery timing

mod catalog;
mod parameter;
mod sync;

pub use catalog::{ParameterCatalog, ParameterInfo};
pub use parameter::{
    Parameter, ParameterAddress, ParameterGroup, ParameterNode, ParameterSlot, ParameterSource,
    ParameterTree,
};
pub use sync::{RefreshScheduler, SettlePolicy};
