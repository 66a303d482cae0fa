use thiserror::Error;

/// Errors that abort a manifest load. No partial manifest is ever returned.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The text is not valid YAML.
    #[error("Manifest parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document root is not a name → job mapping.
    #[error("Manifest must be a mapping of job name to job definition")]
    NotAMapping,

    /// One job entry is malformed or fails validation.
    #[error("Invalid job {name:?}: {reason}")]
    InvalidJob { name: String, reason: String },

    /// No job carries any of the requested schedule tags.
    #[error("No jobs match schedule tags {tags:?}")]
    NoJobsSelected { tags: Vec<String> },

    /// The manifest file could not be read.
    #[error("I/O error reading manifest: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
