//! Error types shared by the crawler and the query server.

use thiserror::Error;

/// Failures from the persistent index store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("store integrity violation: {0}")]
    Integrity(String),
}

/// Classifies a raw `sqlx::Error`: constraint violations (the
/// `word_doc.frequency >= 1` check, or a broken unique/foreign-key
/// constraint) are `Integrity`; everything else (connection loss, IO,
/// protocol errors) is `Unavailable`.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_check_violation()
                || db_err.is_unique_violation()
                || db_err.is_foreign_key_violation()
            {
                return StoreError::Integrity(db_err.message().to_string());
            }
        }
        StoreError::Unavailable(err)
    }
}

/// Failures from a single-URL fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("redirect with no Location header")]
    MissingLocation,

    #[error("timed out")]
    Timeout,
}

/// Failures loading the flat key=value configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required key: {0}")]
    MissingKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
