pub mod config;
pub mod error;
pub mod history;
pub mod intake;
pub mod persist;
pub mod process;
pub mod schema;

pub use config::Settings;
pub use error::EtlError;
pub use process::{default_run_id, BatchReport, FileOutcome, Pipeline};
