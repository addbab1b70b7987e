use thiserror::Error;

use crate::schema::SheetRole;

/// Failures with a meaning of their own. Plain I/O and codec errors travel as
/// `anyhow::Error` with context instead.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Missing required sheets: {}", join_roles(.0))]
    MissingSheets(Vec<SheetRole>),

    #[error("{role} sheet has no '{column}' column to join on")]
    MissingJoinKey { role: SheetRole, column: String },

    #[error("invalid run id '{0}': only letters, digits, '_' and '-' are allowed")]
    InvalidRunId(String),

    #[error("unknown report table '{0}'")]
    UnknownTable(String),

    #[error("invalid intake file name '{0}'")]
    InvalidFileName(String),

    #[error("intake file not found: {0}")]
    FileNotFound(String),

    #[error("config error: {0}")]
    Config(String),
}

fn join_roles(roles: &[SheetRole]) -> String {
    roles
        .iter()
        .map(SheetRole::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl EtlError {
    /// True for errors that reject the workbook's shape rather than its I/O.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, EtlError::MissingSheets(_) | EtlError::MissingJoinKey { .. })
    }
}
