// src/error.rs

use thiserror::Error;

use crate::pk_enum::Role;

#[derive(Error, Debug)]
pub enum Error {
    /// The request never reached the package backend.
    #[error("Package backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend received the request and answered with a failure.
    #[error("{reason}: {details}")]
    BackendRejected { reason: String, details: String },

    #[error("No entry with id '{0}'")]
    NotFound(String),

    #[error("Backend does not support {0}")]
    Unsupported(Role),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GLib error: {0}")]
    Glib(#[from] glib::Error),

    #[error("Input/Output error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn rejected(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Error::BackendRejected {
            reason: reason.into(),
            details: details.into(),
        }
    }
}

impl From<zbus::Error> for Error {
    fn from(err: zbus::Error) -> Self {
        match err {
            // The daemon answered: polkit refusals, invalid arguments, ...
            zbus::Error::MethodError(name, details, _) => Error::BackendRejected {
                reason: name.as_str().to_owned(),
                details: details.unwrap_or_default(),
            },
            zbus::Error::FDO(fdo) => Error::BackendUnavailable(fdo.to_string()),
            other => Error::BackendUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
