use common::LectureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to read recording {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid recording {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: LectureError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
