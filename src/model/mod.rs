mod bundle;
mod edge;
mod node;

pub(crate) use bundle::entry_point_of;
pub use bundle::{BundleManifest, BundleParameters, NodeBundle};
pub use edge::EdgeModel;
pub use node::{ConfigItem, ConfigType, NodeKind, NodeModel, PortModel};
