pub mod registry;
pub mod types;

pub use registry::{SchemaRegistry, CLAIM_KEY};
pub use types::{CanonicalField, FieldMapping, SheetRole};
