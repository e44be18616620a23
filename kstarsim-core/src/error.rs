//! Crate-level error type
//!
//! Each concern keeps its own error enum next to the code that raises it;
//! this type only gathers them for callers that drive a whole run.

use crate::config::ConfigError;
use crate::fit::FitError;
use crate::histogram::HistogramError;
use crate::particle::KinematicsError;
use crate::registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error(transparent)]
    Histogram(#[from] HistogramError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error("generator has already finished its run")]
    AlreadyFinished,

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed histogram file: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
