//! Cache and distribution errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("subscriber limit {max} reached")]
    SubscriberLimitReached { max: usize },

    #[error("unknown subscriber handle {0}")]
    UnknownSubscriber(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
