use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the reproduction harness
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to parse configuration{}: {message}", origin(.path))]
    ConfigParse {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Callback `{0}` does not expose evaluation results")]
    CallbackType(String),

    #[error("Evaluation checkpoint {index} has no episode rewards")]
    EmptyCheckpoint { index: usize },

    #[error("No {kind} registered under `{name}`")]
    Unregistered { kind: &'static str, name: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            path: None,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Attach the document path to a parse error raised on its contents
    pub(crate) fn at_path(self, at: impl Into<PathBuf>) -> Self {
        match self {
            Error::ConfigParse {
                path: None,
                message,
            } => Error::ConfigParse {
                path: Some(at.into()),
                message,
            },
            other => other,
        }
    }
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" {}", path.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
