pub mod runs;
pub mod table_history;

pub use runs::{RunArtifact, RunHistory};
pub use table_history::{HistoryRow, TableHistory};
