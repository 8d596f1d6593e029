//! Signal pipeline errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("integrity check failed for signal {signal_id}")]
    IntegrityCheckFailed { signal_id: u32 },

    #[error("batch size {got} exceeds maximum {max}")]
    BatchTooLarge { got: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
