/// Convenience result type used across volserve.
pub type VolserveResult<T> = Result<T, VolserveError>;

/// Top-level error taxonomy.
///
/// Errors split into two classes. Recoverable errors ([`VolserveError::is_recoverable`]) abandon
/// only the current command; the session logs them and keeps reading. Everything else is fatal
/// and terminates the process.
#[derive(thiserror::Error, Debug)]
pub enum VolserveError {
    /// A dataset, color map or opacity map name did not resolve in the registry.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// An unknown command keyword or a malformed argument token.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The input stream ended in the middle of a command.
    #[error("truncated command stream: {0}")]
    Truncated(String),

    /// Invalid registry or configuration data.
    #[error("validation error: {0}")]
    Validation(String),

    /// The rendering engine rejected an operation.
    #[error("engine error: {0}")]
    Engine(String),

    /// The image codec failed to produce a frame.
    #[error("encode error: {0}")]
    Encode(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VolserveError {
    /// Build a [`VolserveError::Lookup`] value.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Build a [`VolserveError::Protocol`] value.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Build a [`VolserveError::Truncated`] value.
    pub fn truncated(msg: impl Into<String>) -> Self {
        Self::Truncated(msg.into())
    }

    /// Build a [`VolserveError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VolserveError::Engine`] value.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Build a [`VolserveError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Whether the error only invalidates the current command.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Lookup(_) | Self::Protocol(_))
    }
}

impl From<std::io::Error> for VolserveError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(anyhow::Error::new(e))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
