//! # Playback Error Types

use bridge_traits::error::BridgeError;
use core_media::{Backend, MediaError};
use thiserror::Error;

/// Errors that can occur while arbitrating playback.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Neither now playing nor any playlist holds a track.
    #[error("Nothing to play")]
    NothingToPlay,

    /// The entry cannot be dispatched to any backend.
    #[error("Invalid playback type for {uri}")]
    InvalidPlaybackType { uri: String },

    /// The entry needs a backend the host did not provide.
    #[error("Playback backend unavailable: {0}")]
    BackendUnavailable(Backend),

    /// The stream resolver could not produce a playable URI.
    #[error("Stream resolution failed: {0}")]
    StreamResolution(#[source] BridgeError),

    /// A backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BridgeError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl PlaybackError {
    /// Returns `true` for errors caused by a provider handing out an
    /// unplayable entry. These are never retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, PlaybackError::InvalidPlaybackType { .. })
    }

    /// Returns `true` if the failure came from the host rather than the entry.
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Backend(_) | PlaybackError::BackendUnavailable(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
