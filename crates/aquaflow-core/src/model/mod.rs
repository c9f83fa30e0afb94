// Domain model: canonical types built from the wire types in
// `aquaflow-api`.

pub mod device;
pub mod snapshot;

pub use device::{Device, Project};
pub use snapshot::Snapshot;

/// Ordered vendor attribute map, re-exported from the wire layer.
pub use aquaflow_api::AttributeMap;
