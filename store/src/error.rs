//! The error type shared by the store and the controller built on top of it

use deadpool_postgres::PoolError;

/// An error from the store or anything built on top of it
#[derive(Debug)]
pub enum Error {
    /// A generic error with a message
    Generic(String),
    /// An error talking to the relational store
    Postgres(tokio_postgres::Error),
    /// An error checking a connection out of the pool
    Pool(PoolError),
    /// An error loading the config
    Config(config::ConfigError),
    /// An error serializing or deserializing a value with serde
    Json(serde_json::Error),
    /// An error from the k8s client, flattened to its message since the
    /// store crate does not depend on `kube` directly
    K8s(String),
    /// A row was requested that does not exist
    NotFound(String),
    /// An orchestrator resource already exists (safe to treat as success)
    Conflict(String),
    /// A TaskTemplate's container_config failed validation
    InvalidConfig(String),
}

impl Error {
    /// Build a new generic error
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Error::Generic(msg.into())
    }

    /// Get a human readable message for this error if one exists
    pub fn msg(&self) -> Option<String> {
        match self {
            Error::Generic(msg) => Some(msg.clone()),
            Error::Postgres(err) => Some(err.to_string()),
            Error::Pool(err) => Some(err.to_string()),
            Error::Config(err) => Some(err.to_string()),
            Error::Json(err) => Some(err.to_string()),
            Error::K8s(msg) => Some(msg.clone()),
            Error::NotFound(msg) => Some(msg.clone()),
            Error::Conflict(msg) => Some(msg.clone()),
            Error::InvalidConfig(msg) => Some(msg.clone()),
        }
    }

    /// True if this error is a not-found condition (404 style)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True if this error is a conflict (409 style), safe to treat as success
    /// for idempotent create operations
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.msg() {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "unknown error"),
        }
    }
}

impl std::error::Error for Error {}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Error::Postgres(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
