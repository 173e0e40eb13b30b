use std::io;
use std::path::PathBuf;

use director::{ConfigError, DirectorError, PersistenceError};
use thiserror::Error;

pub(crate) mod actors;
pub(crate) mod bootstrap;
pub(crate) mod loop_runner;
pub(crate) mod nav;
pub(crate) mod scenario;

#[derive(Debug, Error)]
pub(crate) enum SandboxError {
    #[error("failed to read scenario {}: {source}", path.display())]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse scenario json: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
    #[error("parse scenario json at {path}: {source}")]
    ParseAt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("scenario validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Director(#[from] DirectorError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
