use thiserror::Error;

/// Error types for configuring and driving the corruption engine
#[derive(Error, Debug)]
pub enum FuzzError {
    /// Fuzzing mode string is not one of xor, set, unset
    #[error("Unknown fuzzing mode: {0}")]
    UnknownMode(String),

    /// A numeric setting could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidSetting { name: String, value: String },

    /// The configuration is frozen once a resource has been registered
    #[error("Configuration is read-only after the first resource is registered")]
    ConfigurationLocked,

    /// Error while parsing a JSON option file
    #[error("Failed to parse options: {0}")]
    Json(#[from] serde_json::Error),

    /// Error while reading or writing data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FuzzError {
    pub(crate) fn invalid(name: &str, value: &str) -> Self {
        Self::InvalidSetting {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FuzzError>;
