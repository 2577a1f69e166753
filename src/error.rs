use std::{backtrace::Backtrace, fmt::Debug, path::PathBuf};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum InnerError {
    #[error("{0} does not name a graph file")]
    InvalidPath(PathBuf),
}

#[derive(thiserror::Error)]
pub enum Error {
    #[error("Inner: {inner}\n{backtrace}")]
    Inner {
        inner: Box<InnerError>,
        backtrace: Box<Backtrace>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] crate::reader::ParseError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

macro_rules! new {
    ($inner:expr) => {
        Error::Inner {
            inner: Box::new($inner),
            backtrace: Box::new(Backtrace::capture()),
        }
    };
}
use InnerError::*;
impl Error {
    pub(crate) fn invalid_path(path: PathBuf) -> Self {
        new!(InvalidPath(path))
    }

    pub fn inner(&self) -> Option<&InnerError> {
        match self {
            Self::Inner { inner, .. } => Some(inner),
            _ => None,
        }
    }
}
