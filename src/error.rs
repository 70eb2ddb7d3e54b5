//! Error types for para.

use thiserror::Error;

/// Boxed error produced by a user processing routine.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{worker}: failed while processing {item}: {source}")]
    Process {
        worker: String,
        item: String,
        #[source]
        source: BoxError,
    },

    #[error("{worker}: panicked while processing {item}: {message}")]
    Panic {
        worker: String,
        item: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no async runtime available: {0}")]
    Runtime(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Render this error followed by its `source()` chain, one link per line.
    pub fn trace(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str("\n  caused by: ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, Error>;
