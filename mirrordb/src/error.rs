use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No record found for {model}: {cause}")]
    NotFound { model: String, cause: NotFoundCause },

    #[error("Unique constraint failed on {model}: ({})", fields.join(", "))]
    UniqueConstraint { model: String, fields: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorDbError {
    /// The ORM error code callers match on, when one applies.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            MirrorDbError::NotFound { .. } => Some("P2025"),
            MirrorDbError::UniqueConstraint { .. } => Some("P2002"),
            _ => None,
        }
    }

    pub(crate) fn not_found(model: &str, cause: NotFoundCause) -> Self {
        MirrorDbError::NotFound {
            model: model.to_string(),
            cause,
        }
    }
}

/// Why a singular operation found nothing to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundCause {
    DeleteTargetMissing,
    UpdateTargetMissing,
    FindTargetMissing,
    ConnectTargetMissing,
}

impl fmt::Display for NotFoundCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            NotFoundCause::DeleteTargetMissing => "Record to delete does not exist.",
            NotFoundCause::UpdateTargetMissing => "Record to update not found.",
            NotFoundCause::FindTargetMissing => "No record was found for a query.",
            NotFoundCause::ConnectTargetMissing => "Record to connect not found.",
        };
        f.write_str(message)
    }
}

pub type Result<T> = std::result::Result<T, MirrorDbError>;
