use histx_core::{IngestError, ValidationError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Ingest(IngestError::InvalidConfig(_)) => 2,
            Self::Warehouse(WarehouseError::InvalidTableName(_)) => 2,
            Self::Ingest(IngestError::SymbolSource(_)) => 3,
            Self::Ingest(IngestError::Persistence(_)) | Self::Warehouse(_) => 4,
            Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}
