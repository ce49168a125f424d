//! # Playlist
//!
//! Ordered, cursor-tracked container of media items.
//!
//! The cursor always points at a valid index when the playlist is non-empty
//! and is `0` otherwise. Any operation that would leave it out of range resets
//! it to `0`.

use crate::entry::{deserialize_confidence, MediaItem};
use crate::types::{MediaType, PlaybackType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ordered sequence of items with a single playback cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RawPlaylist")]
pub struct Playlist {
    pub title: String,
    pub artist: String,
    pub image: String,
    pub background_image: String,
    pub provider_id: String,
    pub match_confidence: u8,
    pub media_type: MediaType,
    pub playback_type: PlaybackType,
    #[serde(rename = "playlist")]
    entries: Vec<MediaItem>,
    position: usize,
}

/// Wire shape; converted through [`Playlist::set_position`] so a bad cursor
/// is corrected on the way in.
#[derive(Deserialize)]
struct RawPlaylist {
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    background_image: String,
    #[serde(default, alias = "skill_id")]
    provider_id: String,
    #[serde(default, deserialize_with = "deserialize_confidence")]
    match_confidence: u8,
    #[serde(default)]
    media_type: MediaType,
    #[serde(default)]
    playback_type: PlaybackType,
    #[serde(default)]
    playlist: Vec<MediaItem>,
    #[serde(default)]
    position: usize,
}

impl From<RawPlaylist> for Playlist {
    fn from(raw: RawPlaylist) -> Self {
        let mut playlist = Playlist {
            title: raw.title,
            artist: raw.artist,
            image: raw.image,
            background_image: raw.background_image,
            provider_id: raw.provider_id,
            match_confidence: raw.match_confidence,
            media_type: raw.media_type,
            playback_type: raw.playback_type,
            entries: raw.playlist,
            position: 0,
        };
        playlist.set_position(raw.position);
        playlist
    }
}

impl Playlist {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Build a playlist from items, cursor at the first one.
    pub fn from_items(items: impl IntoIterator<Item = MediaItem>) -> Self {
        Self {
            entries: items.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.match_confidence = confidence.min(crate::entry::MAX_CONFIDENCE);
        self
    }

    pub fn with_playback_type(mut self, playback_type: PlaybackType) -> Self {
        self.playback_type = playback_type;
        self
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn entries(&self) -> &[MediaItem] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> std::slice::IterMut<'_, MediaItem> {
        self.entries.iter_mut()
    }

    /// Item under the cursor.
    pub fn current_track(&self) -> Option<&MediaItem> {
        self.entries.get(self.position)
    }

    pub fn current_track_mut(&mut self) -> Option<&mut MediaItem> {
        self.entries.get_mut(self.position)
    }

    /// `true` for an empty playlist.
    pub fn is_first_track(&self) -> bool {
        self.position == 0
    }

    /// `true` for an empty playlist.
    pub fn is_last_track(&self) -> bool {
        self.entries.is_empty() || self.position == self.entries.len() - 1
    }

    /// Structural membership.
    pub fn contains(&self, item: &MediaItem) -> bool {
        self.entries.iter().any(|existing| existing == item)
    }

    pub fn index_of(&self, item: &MediaItem) -> Option<usize> {
        self.entries.iter().position(|existing| existing == item)
    }

    /// Sum of known entry lengths in seconds; live streams count as zero.
    pub fn total_length(&self) -> u64 {
        self.entries
            .iter()
            .map(|item| item.length().unwrap_or(0))
            .sum()
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    /// Move the cursor, resetting it to `0` when `position` is out of range.
    pub fn set_position(&mut self, position: usize) {
        if position < self.entries.len() {
            self.position = position;
        } else {
            if position != 0 {
                debug!(
                    position,
                    len = self.entries.len(),
                    "Playlist position out of range, resetting to 0"
                );
            }
            self.position = 0;
        }
    }

    pub fn goto_start(&mut self) {
        self.position = 0;
    }

    /// Jump to `index`. Returns `false` (cursor untouched) when out of range.
    pub fn goto_track(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        self.position = index;
        true
    }

    /// Jump to the given item. Returns `false` when it is not in the playlist.
    pub fn goto_item(&mut self, item: &MediaItem) -> bool {
        match self.index_of(item) {
            Some(index) => self.goto_track(index),
            None => false,
        }
    }

    /// Advance the cursor. Returns `false` at the last track.
    pub fn next_track(&mut self) -> bool {
        if self.is_last_track() {
            return false;
        }
        self.position += 1;
        true
    }

    /// Retreat the cursor. Returns `false` at the first track.
    pub fn prev_track(&mut self) -> bool {
        if self.is_first_track() {
            return false;
        }
        self.position -= 1;
        true
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert `item` at `index`, or append when `index` is `None` or past the
    /// end.
    ///
    /// Inserting at or before the cursor shifts it forward so the current
    /// track stays current.
    pub fn add_entry(&mut self, item: MediaItem, index: Option<usize>) {
        let was_empty = self.entries.is_empty();
        match index {
            Some(index) if index < self.entries.len() => {
                self.entries.insert(index, item);
                if !was_empty && index <= self.position {
                    self.position += 1;
                }
            }
            _ => self.entries.push(item),
        }
    }

    /// Append unless a structurally equal item is already present.
    ///
    /// Returns `true` when the item was added.
    pub fn add_unique(&mut self, item: MediaItem) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.entries.push(item);
        true
    }

    /// Remove the item at `index`.
    ///
    /// Removing before the cursor shifts it back; removing the last current
    /// track resets the cursor.
    pub fn remove_entry(&mut self, index: usize) -> Option<MediaItem> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        if index < self.position {
            self.position -= 1;
        }
        let position = self.position;
        self.set_position(position);
        Some(removed)
    }

    /// Replace every item and rewind.
    pub fn replace(&mut self, items: Vec<MediaItem>) {
        self.entries = items;
        self.position = 0;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = 0;
    }

    /// Sort by descending confidence (stable) and rewind.
    pub fn sort_by_conf(&mut self) {
        self.entries
            .sort_by(|a, b| b.confidence().cmp(&a.confidence()));
        self.position = 0;
    }
}

impl PartialEq for Playlist {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.artist == other.artist
            && self.image == other.image
            && self.background_image == other.background_image
            && self.provider_id == other.provider_id
            && self.match_confidence == other.match_confidence
            && self.media_type == other.media_type
            && self.playback_type == other.playback_type
            && self.entries == other.entries
    }
}

impl Eq for Playlist {}
