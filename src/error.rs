use std::fmt;

/// Error type for every storage operation in this crate.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum Error {
    /// One or more caller supplied arguments were rejected.
    ///
    /// Always carries every violated precondition, never just the first one.
    #[error("Invalid argument:\n{0}")]
    InvalidArgument(Violations),

    /// The requested object does not exist in the bucket.
    #[error("Object not found: gs://{bucket}/{key}")]
    NotFound {
        /// Bucket that was searched.
        bucket: String,
        /// Key that was requested.
        key: String,
    },

    /// The remote service failed or answered with something unusable.
    #[error("Remote storage failure{}: {message}", status.map(|s| format!(" (status: {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        /// Error message, from the service when it sent one.
        message: String,
    },

    /// Local I/O failed (key resources, spool files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential material is invalid or was refused.
    #[error("Security failure: {0}")]
    Security(String),

    /// The image could not be encoded or decoded.
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Returns whether this error is a precondition violation.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Returns whether this error indicates a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns whether this error is an I/O failure, local or remote.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Io(_))
    }

    /// Returns whether this error came from unusable credentials.
    pub fn is_security_failure(&self) -> bool {
        matches!(self, Error::Security(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Specialized [`Result`] type for storage operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every precondition a call violated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` when `violated` holds.
    pub fn check(&mut self, violated: bool, message: impl Into<String>) -> &mut Self {
        if violated {
            self.0.push(message.into());
        }
        self
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if any recorded message mentions `parameter`.
    pub fn mentions(&self, parameter: &str) -> bool {
        self.0.iter().any(|m| m.contains(parameter))
    }

    /// Fails with [`Error::InvalidArgument`] if anything was recorded.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(self))
        }
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, message) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(message)?;
        }
        Ok(())
    }
}
