//! # Core Configuration Module
//!
//! Tunables for the search aggregator and the playback arbiter.
//!
//! ## Overview
//!
//! `OcpConfig` is plain data: it deserializes from the assistant's JSON
//! settings with per-field defaults, can be adjusted with `with_*` builder
//! methods, and is checked once with [`OcpConfig::validate`] before the
//! service starts.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::OcpConfig;
//!
//! let config = OcpConfig::from_json_str(r#"{"search": {"min_timeout_ms": 3000}}"#)
//!     .expect("valid config");
//! assert_eq!(config.search.min_timeout_ms, 3000);
//! assert_eq!(config.search.max_timeout_ms, 15000);
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use core_media::LoopState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_min_timeout_ms() -> u64 {
    5_000
}

fn default_max_timeout_ms() -> u64 {
    15_000
}

fn default_generic_bonus_ms() -> u64 {
    3_000
}

fn default_early_stop_threshold() -> u8 {
    90
}

fn default_early_stop_grace_ms() -> u64 {
    1_000
}

fn default_min_score() -> u8 {
    50
}

fn default_true() -> bool {
    true
}

fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}

// ============================================================================
// Search
// ============================================================================

/// Aggregation window and ranking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Initial wait window.
    #[serde(default = "default_min_timeout_ms")]
    pub min_timeout_ms: u64,

    /// Hard cap on the window after provider extensions.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Added to the initial window for `Generic` queries, since every
    /// provider has to be probed.
    #[serde(default = "default_generic_bonus_ms")]
    pub generic_bonus_ms: u64,

    /// Confidence that ends the wait early.
    #[serde(default = "default_early_stop_threshold")]
    pub early_stop_threshold: u8,

    /// Time still granted to other providers after an early stop triggers.
    #[serde(default = "default_early_stop_grace_ms")]
    pub early_stop_grace_ms: u64,

    /// Also broadcast the legacy query and merge legacy replies.
    #[serde(default = "default_true")]
    pub enable_legacy: bool,

    /// Results below this confidence are discarded before selection.
    #[serde(default = "default_min_score")]
    pub min_score: u8,

    /// Keep only results whose media type matches the query.
    #[serde(default)]
    pub filter_media_type: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_timeout_ms: default_min_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            generic_bonus_ms: default_generic_bonus_ms(),
            early_stop_threshold: default_early_stop_threshold(),
            early_stop_grace_ms: default_early_stop_grace_ms(),
            enable_legacy: true,
            min_score: default_min_score(),
            filter_media_type: false,
        }
    }
}

impl SearchConfig {
    /// Short windows for interactive hosts and tests.
    pub fn low_latency() -> Self {
        Self {
            min_timeout_ms: 1_000,
            max_timeout_ms: 3_000,
            generic_bonus_ms: 500,
            early_stop_grace_ms: 200,
            ..Self::default()
        }
    }

    pub fn with_timeouts(mut self, min_timeout_ms: u64, max_timeout_ms: u64) -> Self {
        self.min_timeout_ms = min_timeout_ms;
        self.max_timeout_ms = max_timeout_ms;
        self
    }

    pub fn with_generic_bonus_ms(mut self, bonus_ms: u64) -> Self {
        self.generic_bonus_ms = bonus_ms;
        self
    }

    pub fn with_early_stop(mut self, threshold: u8, grace_ms: u64) -> Self {
        self.early_stop_threshold = threshold;
        self.early_stop_grace_ms = grace_ms;
        self
    }

    pub fn with_legacy(mut self, enabled: bool) -> Self {
        self.enable_legacy = enabled;
        self
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_media_type_filter(mut self, enabled: bool) -> Self {
        self.filter_media_type = enabled;
        self
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn generic_bonus(&self) -> Duration {
        Duration::from_millis(self.generic_bonus_ms)
    }

    pub fn early_stop_grace(&self) -> Duration {
        Duration::from_millis(self.early_stop_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_timeout_ms == 0 {
            return Err(Error::Config(
                "Search min_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_timeout_ms < self.min_timeout_ms {
            return Err(Error::Config(format!(
                "Search max_timeout_ms ({}) must not be lower than min_timeout_ms ({})",
                self.max_timeout_ms, self.min_timeout_ms
            )));
        }

        if self.early_stop_threshold > 100 {
            return Err(Error::Config(format!(
                "Early stop threshold {} is outside 0..=100",
                self.early_stop_threshold
            )));
        }

        if self.min_score > 100 {
            return Err(Error::Config(format!(
                "Minimum score {} is outside 0..=100",
                self.min_score
            )));
        }

        if self.early_stop_grace_ms > self.max_timeout_ms {
            return Err(Error::Config(
                "Early stop grace period exceeds the maximum search window".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Player
// ============================================================================

/// Playback arbiter behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Advance to the next track when a backend reports end of media.
    #[serde(default = "default_true")]
    pub autoplay: bool,

    /// Let the GUI audio player handle `Audio` entries when a GUI exists.
    #[serde(default = "default_true")]
    pub prefer_gui_audio: bool,

    #[serde(default)]
    pub default_loop_state: LoopState,

    #[serde(default)]
    pub shuffle: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: true,
            prefer_gui_audio: true,
            default_loop_state: LoopState::None,
            shuffle: false,
        }
    }
}

impl PlayerConfig {
    pub fn with_autoplay(mut self, enabled: bool) -> Self {
        self.autoplay = enabled;
        self
    }

    pub fn with_prefer_gui_audio(mut self, enabled: bool) -> Self {
        self.prefer_gui_audio = enabled;
        self
    }

    pub fn with_loop_state(mut self, state: LoopState) -> Self {
        self.default_loop_state = state;
        self
    }

    pub fn with_shuffle(mut self, enabled: bool) -> Self {
        self.shuffle = enabled;
        self
    }
}

// ============================================================================
// Top Level
// ============================================================================

/// Complete configuration of the common playback core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcpConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    /// Capacity of the event bus channel.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for OcpConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            player: PlayerConfig::default(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl OcpConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_player(mut self, player: PlayerConfig) -> Self {
        self.player = player;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
