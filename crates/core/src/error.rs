use crate::domain::schema::Field;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The raw dataset failed structural or type preconditions. Carries every violation.
    #[error("dataset failed validation: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    /// A component's hard precondition was not met.
    #[error("analysis failed (stage={stage}): {detail}")]
    Analysis { stage: &'static str, detail: String },

    /// The incoming table could not be shaped into a dataset.
    #[error("processing failed: {detail}")]
    Processing { detail: String },

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl EngineError {
    pub fn missing_columns(stage: &'static str, missing: &[Field]) -> Self {
        let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
        EngineError::Analysis {
            stage,
            detail: format!("missing required columns: {}", names.join(", ")),
        }
    }

    pub fn processing(detail: impl Into<String>) -> Self {
        EngineError::Processing {
            detail: detail.into(),
        }
    }

    /// Stable machine-readable kind, used by the HTTP surface.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation_error",
            EngineError::Analysis { .. } => "analysis_error",
            EngineError::Processing { .. } => "processing_error",
            EngineError::Export(_) => "export_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format: {0} (supported: json, csv, excel)")]
    UnsupportedFormat(String),

    #[error("export io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xlsx export failed: {0}")]
    Zip(#[from] zip::result::ZipError),
}
