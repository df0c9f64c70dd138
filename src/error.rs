use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// missing or malformed configuration, caught before any provider call
    #[error("configuration error: {message}")]
    Config { message: String },

    /// a declaration broke one of its own rules (bad logical id, bad domain, etc.)
    #[error("Validation failed on resource '{resource}'\n{message}")]
    Validation { resource: String, message: String },

    #[error("resource graph error: {message}")]
    Graph { message: String },

    /// a pre-existing external resource (hosted zone, stack) was not found
    #[error("lookup of {what} '{name}' failed: {message}")]
    Lookup {
        what: &'static str,
        name: String,
        message: String,
    },

    /// the provider rejected an API call. message is surfaced verbatim.
    #[error("provisioning of stack '{stack}' failed\n{message}")]
    Provisioning { stack: String, message: String },

    /// the stack reached a terminal failure status (rollback, create failed, ...)
    #[error("stack '{stack}' ended in status {status}: {reason}")]
    StackFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("asset sync {operation} failed for '{target}'\n{message}")]
    Sync {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("file system {operation} operation failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config { message: message.into() }
    }

    pub fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation { resource: resource.into(), message: message.into() }
    }

    pub fn graph(message: impl Into<String>) -> Self {
        Error::Graph { message: message.into() }
    }

    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), operation, source }
    }

    pub fn json(message: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Json { message: message.into(), source }
    }

    pub fn sync(operation: &'static str, target: impl Into<String>, err: impl std::fmt::Debug) -> Self {
        Error::Sync { operation, target: target.into(), message: format!("{:#?}", err) }
    }
}
