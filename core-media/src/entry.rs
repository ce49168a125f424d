//! # Media Entries
//!
//! `MediaEntry` is a single playable unit, `PluginStream` a lazily resolved
//! reference, and `MediaItem` the tagged union every search result and queue
//! element travels as.
//!
//! Entries are materialized once at the bus boundary through
//! [`MediaItem::from_value`], which also accepts untagged provider payloads.

use crate::error::{MediaError, Result};
use crate::playlist::Playlist;
use crate::types::{MediaType, PlaybackType, TrackState};
use bridge_traits::ResolvedStream;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Upper bound of a match confidence score.
pub const MAX_CONFIDENCE: u8 = 100;

/// Accept integer or float confidences and clamp them into `0..=100`.
pub(crate) fn deserialize_confidence<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, MAX_CONFIDENCE as f64) as u8)
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

// ============================================================================
// MediaEntry
// ============================================================================

/// A single playable unit.
///
/// `uri` is opaque to the core and only resolved right before dispatch.
/// Provider-specific fields that the core does not know about are kept in
/// `extra` and written back verbatim.
///
/// Two entries are equal when their descriptive fields match; the transient
/// playback fields `status` and `position` are ignored so that an entry that
/// started playing still de-duplicates against its search result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaEntry {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub background_image: String,
    /// Owning provider (skill id).
    #[serde(default, alias = "skill_id")]
    pub provider_id: String,
    #[serde(default, deserialize_with = "deserialize_confidence")]
    pub match_confidence: u8,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub playback_type: PlaybackType,
    #[serde(default)]
    pub status: TrackState,
    /// Length in seconds, `None` for live streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Playback offset in milliseconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub position: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MediaEntry {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_background_image(mut self, image: impl Into<String>) -> Self {
        self.background_image = image.into();
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    /// Set the match confidence, clamped to `0..=100`.
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.match_confidence = confidence.min(MAX_CONFIDENCE);
        self
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_playback_type(mut self, playback_type: PlaybackType) -> Self {
        self.playback_type = playback_type;
        self
    }

    pub fn with_status(mut self, status: TrackState) -> Self {
        self.status = status;
        self
    }

    pub fn with_length(mut self, seconds: u64) -> Self {
        self.length = Some(seconds);
        self
    }

    /// Attach a provider-specific extension field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Live streams have no known length.
    pub fn is_live(&self) -> bool {
        self.length.is_none()
    }

    /// Serialize into the flat dictionary shape used on the bus.
    pub fn as_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Build an entry from a flat dictionary.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::MissingField`] when `uri` is absent or empty and
    /// [`MediaError::Malformed`] when a known field has the wrong shape.
    pub fn from_dict(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| MediaError::InvalidValue {
            field: "entry",
            message: format!("expected an object, got {}", value),
        })?;

        match object.get("uri").and_then(Value::as_str) {
            Some(uri) if !uri.is_empty() => {}
            _ => return Err(MediaError::MissingField("uri")),
        }

        Ok(serde_json::from_value(value.clone())?)
    }

    /// Merge a stream resolution into this entry.
    ///
    /// The playable URI always replaces the opaque one. Title and artwork are
    /// only filled in when the provider left them empty.
    pub fn apply_resolved(&mut self, resolved: ResolvedStream) {
        self.uri = resolved.uri;
        if let Some(title) = resolved.title {
            if self.title.is_empty() {
                self.title = title;
            }
        }
        if let Some(image) = resolved.image {
            if self.image.is_empty() {
                self.image = image;
            }
        }
        if resolved.length.is_some() {
            self.length = resolved.length;
        }
    }
}

impl PartialEq for MediaEntry {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.title == other.title
            && self.artist == other.artist
            && self.image == other.image
            && self.background_image == other.background_image
            && self.provider_id == other.provider_id
            && self.match_confidence == other.match_confidence
            && self.media_type == other.media_type
            && self.playback_type == other.playback_type
            && self.length == other.length
            && self.extra == other.extra
    }
}

impl Eq for MediaEntry {}

// ============================================================================
// PluginStream
// ============================================================================

/// A stream that only an extractor plugin can turn into a playable URI.
///
/// There is deliberately no `uri` field: the concrete location only exists
/// after [`PluginStream::into_entry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStream {
    pub extractor_id: String,
    pub stream: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, alias = "skill_id")]
    pub provider_id: String,
    #[serde(default, deserialize_with = "deserialize_confidence")]
    pub match_confidence: u8,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub playback_type: PlaybackType,
}

impl PluginStream {
    pub fn new(extractor_id: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            extractor_id: extractor_id.into(),
            stream: stream.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.match_confidence = confidence.min(MAX_CONFIDENCE);
        self
    }

    pub fn with_playback_type(mut self, playback_type: PlaybackType) -> Self {
        self.playback_type = playback_type;
        self
    }

    /// Reference handed to the stream resolver: `"<extractor_id>//<stream>"`.
    pub fn reference(&self) -> String {
        format!("{}//{}", self.extractor_id, self.stream)
    }

    /// Materialize a playable entry from a resolution result.
    pub fn into_entry(self, resolved: ResolvedStream) -> MediaEntry {
        let mut entry = MediaEntry {
            uri: String::new(),
            title: self.title,
            artist: self.artist,
            image: self.image,
            provider_id: self.provider_id,
            match_confidence: self.match_confidence,
            media_type: self.media_type,
            playback_type: self.playback_type,
            ..Default::default()
        };
        entry.apply_resolved(resolved);
        entry
    }
}

// ============================================================================
// MediaItem
// ============================================================================

/// Anything a provider can return or the arbiter can queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaItem {
    Entry(MediaEntry),
    Playlist(Playlist),
    Stream(PluginStream),
}

impl MediaItem {
    /// Convert an untyped payload into a typed item.
    ///
    /// Tagged payloads (`"kind"`) are decoded by serde and then checked for
    /// the same required fields as untagged ones. Untagged payloads are
    /// classified by shape: a `"playlist"` array makes a playlist, an
    /// `"extractor_id"` makes a plugin stream, anything else must be an entry
    /// with a `uri`.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(MediaError::InvalidValue {
                    field: "item",
                    message: format!("expected an object, got {}", other),
                })
            }
        };

        if object.contains_key("kind") {
            let item: MediaItem = serde_json::from_value(Value::Object(object))?;
            item.validate()?;
            return Ok(item);
        }

        if let Some(raw_entries) = object.remove("playlist") {
            let raw_entries = match raw_entries {
                Value::Array(items) => items,
                other => {
                    return Err(MediaError::InvalidValue {
                        field: "playlist",
                        message: format!("expected an array, got {}", other),
                    })
                }
            };
            let entries = raw_entries
                .into_iter()
                .map(MediaItem::from_value)
                .collect::<Result<Vec<_>>>()?;
            let mut playlist: Playlist = serde_json::from_value(Value::Object(object))?;
            playlist.replace(entries);
            return Ok(MediaItem::Playlist(playlist));
        }

        if object.contains_key("extractor_id") {
            match object.get("stream").and_then(Value::as_str) {
                Some(stream) if !stream.is_empty() => {}
                _ => return Err(MediaError::MissingField("stream")),
            }
            return Ok(MediaItem::Stream(serde_json::from_value(Value::Object(
                object,
            ))?));
        }

        Ok(MediaItem::Entry(MediaEntry::from_dict(&Value::Object(
            object,
        ))?))
    }

    /// Check required fields, recursing into playlists.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Entry(entry) if entry.uri.is_empty() => Err(MediaError::MissingField("uri")),
            Self::Stream(stream) if stream.stream.is_empty() => {
                Err(MediaError::MissingField("stream"))
            }
            Self::Playlist(playlist) => playlist.entries().iter().try_for_each(MediaItem::validate),
            _ => Ok(()),
        }
    }

    /// Serialize into a tagged payload.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Entry(entry) => &entry.title,
            Self::Playlist(playlist) => &playlist.title,
            Self::Stream(stream) => &stream.title,
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            Self::Entry(entry) => &entry.provider_id,
            Self::Playlist(playlist) => &playlist.provider_id,
            Self::Stream(stream) => &stream.provider_id,
        }
    }

    /// Tag the item (and any nested items) with the owning provider.
    pub fn set_provider_id(&mut self, provider_id: &str) {
        match self {
            Self::Entry(entry) => entry.provider_id = provider_id.to_string(),
            Self::Stream(stream) => stream.provider_id = provider_id.to_string(),
            Self::Playlist(playlist) => {
                playlist.provider_id = provider_id.to_string();
                for item in playlist.entries_mut() {
                    if item.provider_id().is_empty() {
                        item.set_provider_id(provider_id);
                    }
                }
            }
        }
    }

    pub fn confidence(&self) -> u8 {
        match self {
            Self::Entry(entry) => entry.match_confidence,
            Self::Playlist(playlist) => playlist.match_confidence,
            Self::Stream(stream) => stream.match_confidence,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Entry(entry) => entry.media_type,
            Self::Playlist(playlist) => playlist.media_type,
            Self::Stream(stream) => stream.media_type,
        }
    }

    pub fn playback_type(&self) -> PlaybackType {
        match self {
            Self::Entry(entry) => entry.playback_type,
            Self::Playlist(playlist) => playlist.playback_type,
            Self::Stream(stream) => stream.playback_type,
        }
    }

    /// Length in seconds; playlists report the sum of their entries.
    pub fn length(&self) -> Option<u64> {
        match self {
            Self::Entry(entry) => entry.length,
            Self::Playlist(playlist) => Some(playlist.total_length()),
            Self::Stream(_) => None,
        }
    }

    pub fn as_entry(&self) -> Option<&MediaEntry> {
        match self {
            Self::Entry(entry) => Some(entry),
            _ => None,
        }
    }
}

impl From<MediaEntry> for MediaItem {
    fn from(entry: MediaEntry) -> Self {
        Self::Entry(entry)
    }
}

impl From<Playlist> for MediaItem {
    fn from(playlist: Playlist) -> Self {
        Self::Playlist(playlist)
    }
}

impl From<PluginStream> for MediaItem {
    fn from(stream: PluginStream) -> Self {
        Self::Stream(stream)
    }
}
