//! # Media Entry Model
//!
//! Value objects exchanged between media providers, the search aggregator
//! and the playback arbiter.
//!
//! ## Overview
//!
//! - [`MediaEntry`]: a single playable unit with an opaque, lazily-resolved URI
//! - [`PluginStream`]: a reference to a stream that only an extractor can turn into a URI
//! - [`Playlist`]: an ordered, position-tracked container of any of the above
//! - [`MediaItem`]: the tagged union carried on the bus
//!
//! Loose JSON payloads (legacy providers, GUI status updates) are converted
//! once at the bus boundary through [`MediaItem::from_value`] and
//! [`MediaEntry::from_dict`]; everything past that boundary is typed.

pub mod entry;
pub mod error;
pub mod playlist;
pub mod types;

pub use entry::{MediaEntry, MediaItem, PluginStream};
pub use error::{MediaError, Result};
pub use playlist::Playlist;
pub use types::{Backend, LoopState, MediaType, PlaybackType, PlayerState, TrackState};
