//! # Media Enumerations
//!
//! Media categories, playback routing and the track/player state machines.
//!
//! ## Track State Machine
//!
//! ```text
//! Disambiguation → Queued(backend) → Playing(backend) ⇄ Paused | Buffering | Stalled
//!                                          ↓
//!                                     EndOfMedia  (initial, terminal until next play)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Media Type
// ============================================================================

/// Category of media a query asks for or a result belongs to.
///
/// Numeric codes are the ones legacy providers put in their replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Generic,
    Audio,
    Music,
    Video,
    Audiobook,
    Game,
    Podcast,
    Radio,
    News,
    Tv,
    Movie,
    Trailer,
    AudioDescription,
    VisualStory,
    BehindTheScenes,
    Documentary,
    RadioTheatre,
    ShortFilm,
    SilentMovie,
    VideoEpisodes,
    BlackWhiteMovie,
    Cartoon,
}

impl MediaType {
    /// Map a legacy numeric code. Unknown codes become `Generic`.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Audio,
            2 => Self::Music,
            3 => Self::Video,
            4 => Self::Audiobook,
            5 => Self::Game,
            6 => Self::Podcast,
            7 => Self::Radio,
            8 => Self::News,
            9 => Self::Tv,
            10 => Self::Movie,
            11 => Self::Trailer,
            12 => Self::AudioDescription,
            13 => Self::VisualStory,
            14 => Self::BehindTheScenes,
            15 => Self::Documentary,
            16 => Self::RadioTheatre,
            17 => Self::ShortFilm,
            18 => Self::SilentMovie,
            19 => Self::VideoEpisodes,
            20 => Self::BlackWhiteMovie,
            21 => Self::Cartoon,
            _ => Self::Generic,
        }
    }

    /// Returns `true` for categories that need a screen to be useful.
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            Self::Video
                | Self::Tv
                | Self::Movie
                | Self::Trailer
                | Self::VisualStory
                | Self::BehindTheScenes
                | Self::Documentary
                | Self::ShortFilm
                | Self::SilentMovie
                | Self::VideoEpisodes
                | Self::BlackWhiteMovie
                | Self::Cartoon
        )
    }
}

// ============================================================================
// Playback Type
// ============================================================================

/// Which backend family is responsible for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackType {
    /// The providing skill plays the entry itself.
    Skill,
    /// Audio-only playback (audio service or GUI audio player).
    Audio,
    /// Video playback in the GUI.
    Video,
    /// Web page rendered in the GUI.
    Webview,
    /// Not declared by the provider; cannot be dispatched.
    #[default]
    Undefined,
}

impl PlaybackType {
    /// Map a legacy numeric code.
    ///
    /// The deprecated "audio service" code collapses into `Audio`.
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Skill,
            1 => Self::Video,
            2 | 3 => Self::Audio,
            5 => Self::Webview,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for PlaybackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Skill => "skill",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Webview => "webview",
            Self::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Playback engine actually producing the audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// In-provider playback.
    Skill,
    /// Headless audio service.
    AudioService,
    /// GUI video player.
    Video,
    /// GUI audio player.
    Audio,
    /// GUI web view.
    Webview,
}

impl Backend {
    /// Returns `true` when the backend is one of the GUI players.
    pub fn is_gui(&self) -> bool {
        matches!(self, Self::Video | Self::Audio | Self::Webview)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Skill => "skill",
            Self::AudioService => "audio_service",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Webview => "webview",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Track State
// ============================================================================

/// Status of an entry as reported by backends and tracked by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Shown as a candidate, not queued.
    #[default]
    Disambiguation,
    QueuedSkill,
    QueuedAudioService,
    QueuedVideo,
    QueuedAudio,
    QueuedWebview,
    PlayingSkill,
    PlayingAudioService,
    PlayingVideo,
    PlayingAudio,
    PlayingWebview,
    Paused,
    Buffering,
    Stalled,
    EndOfMedia,
}

impl TrackState {
    /// The "playing" state for a backend.
    pub fn playing(backend: Backend) -> Self {
        match backend {
            Backend::Skill => Self::PlayingSkill,
            Backend::AudioService => Self::PlayingAudioService,
            Backend::Video => Self::PlayingVideo,
            Backend::Audio => Self::PlayingAudio,
            Backend::Webview => Self::PlayingWebview,
        }
    }

    /// The "queued" state for a backend.
    pub fn queued(backend: Backend) -> Self {
        match backend {
            Backend::Skill => Self::QueuedSkill,
            Backend::AudioService => Self::QueuedAudioService,
            Backend::Video => Self::QueuedVideo,
            Backend::Audio => Self::QueuedAudio,
            Backend::Webview => Self::QueuedWebview,
        }
    }

    /// Backend named by a queued or playing state.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::QueuedSkill | Self::PlayingSkill => Some(Backend::Skill),
            Self::QueuedAudioService | Self::PlayingAudioService => Some(Backend::AudioService),
            Self::QueuedVideo | Self::PlayingVideo => Some(Backend::Video),
            Self::QueuedAudio | Self::PlayingAudio => Some(Backend::Audio),
            Self::QueuedWebview | Self::PlayingWebview => Some(Backend::Webview),
            _ => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            Self::QueuedSkill
                | Self::QueuedAudioService
                | Self::QueuedVideo
                | Self::QueuedAudio
                | Self::QueuedWebview
        )
    }

    pub fn is_playing(&self) -> bool {
        matches!(
            self,
            Self::PlayingSkill
                | Self::PlayingAudioService
                | Self::PlayingVideo
                | Self::PlayingAudio
                | Self::PlayingWebview
        )
    }

    /// Returns `true` while a backend holds the stream (playing or suspended).
    pub fn is_active(&self) -> bool {
        self.is_playing() || matches!(self, Self::Paused | Self::Buffering | Self::Stalled)
    }
}

// ============================================================================
// Player State
// ============================================================================

/// Coarse transport state exposed to UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Repeat behaviour at the end of a track or playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    None,
    /// Wrap from the last track back to the first.
    Repeat,
    /// Replay the current track.
    RepeatTrack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_state_backend_round_trip() {
        for backend in [
            Backend::Skill,
            Backend::AudioService,
            Backend::Video,
            Backend::Audio,
            Backend::Webview,
        ] {
            assert_eq!(TrackState::playing(backend).backend(), Some(backend));
            assert_eq!(TrackState::queued(backend).backend(), Some(backend));
            assert!(TrackState::playing(backend).is_playing());
            assert!(TrackState::queued(backend).is_queued());
        }
        assert_eq!(TrackState::Paused.backend(), None);
        assert_eq!(TrackState::EndOfMedia.backend(), None);
    }

    #[test]
    fn test_track_state_activity() {
        assert!(TrackState::Paused.is_active());
        assert!(TrackState::Stalled.is_active());
        assert!(TrackState::PlayingVideo.is_active());
        assert!(!TrackState::EndOfMedia.is_active());
        assert!(!TrackState::Disambiguation.is_active());
        assert!(!TrackState::QueuedSkill.is_active());
    }

    #[test]
    fn test_legacy_codes() {
        assert_eq!(MediaType::from_code(3), MediaType::Video);
        assert_eq!(MediaType::from_code(999), MediaType::Generic);
        assert_eq!(PlaybackType::from_code(0), PlaybackType::Skill);
        assert_eq!(PlaybackType::from_code(3), PlaybackType::Audio);
        assert_eq!(PlaybackType::from_code(100), PlaybackType::Undefined);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&TrackState::PlayingAudioService).unwrap(),
            "\"playing_audio_service\""
        );
        assert_eq!(
            serde_json::from_str::<MediaType>("\"radio_theatre\"").unwrap(),
            MediaType::RadioTheatre
        );
    }

    #[test]
    fn test_visual_media() {
        assert!(MediaType::Movie.is_visual());
        assert!(!MediaType::Music.is_visual());
        assert!(Backend::Video.is_gui());
        assert!(!Backend::AudioService.is_gui());
    }
}
