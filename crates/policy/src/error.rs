//! Policy engine errors
//!
//! These cover engine *management* operations. Policy violations are not
//! errors - they are ordinary results, surfaced as `PolicyResult`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no policy registered with id {policy_id}")]
    UnknownPolicy { policy_id: u32 },

    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
