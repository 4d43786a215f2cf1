//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Last.fm fault codes that are worth waiting out:
/// 8 operation failed, 11 service offline, 16 temporarily unavailable,
/// 29 rate limit exceeded.
const TRANSIENT_SERVICE_CODES: [i64; 4] = [8, 11, 16, 29];

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service fault {code}: {message}")]
    Service { code: i64, message: String },
    #[error("could not complete artist search for {artist}: {source}")]
    Search {
        artist: String,
        #[source]
        source: Box<Error>,
    },
    #[error("interrupted by operator")]
    Cancelled,
    #[error("could not install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("credentials file not found at {}", .0.display())]
    MissingCredentials(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Whether waiting and repeating the same request can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Error::Transport(_) => true,
            Error::Service { code, .. } => TRANSIENT_SERVICE_CODES.contains(code),
            Error::Search { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn search(artist: &str, source: Error) -> Self {
        match source {
            // never bury a cancellation inside a search failure
            Error::Cancelled => Error::Cancelled,
            source => Error::Search {
                artist: artist.to_string(),
                source: Box::new(source),
            },
        }
    }
}
