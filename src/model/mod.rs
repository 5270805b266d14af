pub mod model;
pub mod registry;
pub mod relation;
pub mod spec;

pub use model::Model;
pub use registry::{ModelDefinition, ModelRegistry};
pub use spec::{ModelSpec, Relation};
