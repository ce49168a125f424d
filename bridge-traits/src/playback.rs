//! Playback bridge traits.
//!
//! These abstractions let the playback arbiter hand a resolved stream to the
//! host's audio engine and ask the host's extractor chain to turn an opaque
//! media URI into something playable. Neither concern lives in the core.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of resolving an opaque media URI.
///
/// Only `uri` is guaranteed; extractors fill in whatever metadata the source
/// exposes and the arbiter keeps existing entry metadata for the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    /// Directly playable URI.
    pub uri: String,
    /// Title reported by the extractor.
    pub title: Option<String>,
    /// Artwork reported by the extractor.
    pub image: Option<String>,
    /// Stream length in seconds, `None` for live streams.
    pub length: Option<u64>,
}

impl ResolvedStream {
    /// Create a resolution result carrying only a playable URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach artwork.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Attach a length in seconds.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }
}

/// Stream resolver trait
///
/// Wraps the host's extraction chain (YouTube, RSS, Deezer, plugin
/// extractors). Plugin streams are passed as `"<extractor_id>//<stream>"`.
#[async_trait::async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve an opaque URI into a playable stream.
    async fn resolve(&self, uri: &str) -> Result<ResolvedStream>;
}

/// Resolver that treats every URI as directly playable.
///
/// Plugin stream references cannot be played without an extractor, so they
/// are rejected instead of being handed to a backend verbatim.
#[derive(Debug, Clone, Default)]
pub struct PassthroughResolver;

#[async_trait::async_trait]
impl StreamResolver for PassthroughResolver {
    async fn resolve(&self, uri: &str) -> Result<ResolvedStream> {
        if uri.is_empty() {
            return Err(BridgeError::ResolutionFailed {
                uri: uri.to_string(),
                message: "empty uri".to_string(),
            });
        }
        if let Some((extractor, _)) = uri.split_once("//") {
            if !extractor.ends_with(':') {
                return Err(BridgeError::ResolutionFailed {
                    uri: uri.to_string(),
                    message: format!("no extractor available for '{}'", extractor),
                });
            }
        }
        Ok(ResolvedStream::new(uri))
    }
}

/// Audio service trait
///
/// The headless audio backend used for `AUDIO` entries when no GUI media
/// player is available.
#[async_trait::async_trait]
pub trait AudioService: Send + Sync {
    /// Start playing a resolved URI, replacing anything currently playing.
    async fn play(&self, uri: &str) -> Result<()>;

    /// Pause playback without releasing the stream.
    async fn pause(&self) -> Result<()>;

    /// Resume paused playback.
    async fn resume(&self) -> Result<()>;

    /// Stop playback and release the stream.
    async fn stop(&self) -> Result<()>;

    /// Seek to an absolute position within the stream.
    async fn seek(&self, position: Duration) -> Result<()>;
}
