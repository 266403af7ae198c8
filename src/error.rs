use crate::import::ImportError;
use crate::sheet::SheetError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgriError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidParams(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("record {0} not found")]
    NotFound(i64),
    #[error("no record is selected for deletion")]
    NoDeleteTarget,
    #[error("{0:#}")]
    Workspace(anyhow::Error),
}

impl From<anyhow::Error> for AgriError {
    fn from(e: anyhow::Error) -> Self {
        AgriError::Workspace(e)
    }
}

impl AgriError {
    /// Stable error code reported over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            AgriError::Validation(_) => "validation_failed",
            AgriError::InvalidParams(_) => "bad_params",
            AgriError::Import(ImportError::Empty) => "import_empty",
            AgriError::Import(ImportError::NoValidRows { .. }) => "import_no_valid_rows",
            AgriError::Import(ImportError::TooManyRows { .. }) => "validation_failed",
            AgriError::Sheet(SheetError::Unsupported(_)) => "import_unsupported_file",
            AgriError::Sheet(_) => "import_read_failed",
            AgriError::Store(_) => "store_failed",
            AgriError::NotFound(_) => "not_found",
            AgriError::NoDeleteTarget => "no_delete_target",
            AgriError::Workspace(_) => "workspace_failed",
        }
    }
}
