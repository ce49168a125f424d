use core_media::MediaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search phrase is empty")]
    EmptyPhrase,

    #[error("Invalid media payload: {0}")]
    Media(#[from] MediaError),
}

pub type Result<T> = std::result::Result<T, SearchError>;
