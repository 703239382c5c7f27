use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::grid::Pos;

/// Errors raised while building maps, configuring runs or training agents.
#[derive(Debug, Error)]
pub enum Error {
    #[error("position {pos} is out of bounds for a {rows}x{cols} grid")]
    OutOfBounds { pos: Pos, rows: usize, cols: usize },

    #[error("position {0} is already occupied")]
    AlreadyOccupied(Pos),

    #[error("no valid directions from {0}")]
    NoValidDirections(Pos),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to read config file {path:?}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }
}
