//! # Playback Arbiter Module
//!
//! Decides who plays the selected media and tracks what is playing.
//!
//! ## Overview
//!
//! This module handles:
//! - Dispatch of an entry to in-provider playback, the audio service or a GUI player
//! - The queue and the disambiguation playlist, with loop and shuffle
//! - Status reports from backends (`PlayerEvent::StatusUpdate`)
//! - Transport requests from UI surfaces (`PlayerEvent::Control`)
//!
//! The arbiter is shared behind an `Arc`; [`PlaybackArbiter::listen`] spawns
//! the bus listener that feeds it.

pub mod arbiter;
pub mod error;

pub use arbiter::{ArbiterState, PlaybackArbiter};
pub use error::{PlaybackError, Result};
