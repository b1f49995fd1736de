use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Unit '{unit}' requires input slot '{slot}' but no handle was published for it")]
    DependencyResolutionError { unit: String, slot: String },

    #[error("Unit '{unit}' expected a {expected} handle on slot '{slot}', found {found}")]
    HandleTypeMismatch {
        unit: String,
        slot: String,
        expected: String,
        found: String,
    },

    #[error("Topology graph error: {message}")]
    GraphError { message: String },

    #[error("Unit '{unit}' failed to construct: {source}")]
    UnitConstructionError {
        unit: String,
        completed: Vec<String>,
        #[source]
        source: Box<StackError>,
    },

    #[error("Asset '{asset}' at '{path}' cannot be packaged: {message}")]
    AssetError {
        asset: String,
        path: String,
        message: String,
    },

    #[error("Request rejected: {}", violations.join("; "))]
    RequestRejected { violations: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Dependency,
    Validation,
    System,
}

impl StackError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StackError::MissingConfigError { .. }
            | StackError::InvalidConfigValueError { .. }
            | StackError::ConfigValidationError { .. }
            | StackError::AssetError { .. } => ErrorCategory::Configuration,
            StackError::DependencyResolutionError { .. }
            | StackError::HandleTypeMismatch { .. }
            | StackError::GraphError { .. } => ErrorCategory::Dependency,
            StackError::RequestRejected { .. } => ErrorCategory::Validation,
            StackError::UnitConstructionError { source, .. } => source.category(),
            StackError::ZipError(_)
            | StackError::IoError(_)
            | StackError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Innermost error, unwrapping unit construction failures.
    pub fn root_cause(&self) -> &StackError {
        match self {
            StackError::UnitConstructionError { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 取得錯誤的修復建議
    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Set the missing environment variable, fix the deployment file or asset path and retry"
            }
            ErrorCategory::Dependency => {
                "Check that every unit's required inputs are produced by a registered unit"
            }
            ErrorCategory::Validation => "Correct the listed fields and resubmit",
            ErrorCategory::System => "Check file permissions and available disk space",
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
