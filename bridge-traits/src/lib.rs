//! # Host Bridge Traits
//!
//! Collaborator traits that the host voice assistant must implement.
//!
//! ## Overview
//!
//! This crate defines the contract between the common playback core and the
//! parts of the assistant that live outside of it. Each trait represents a
//! capability the core calls into but never implements itself.
//!
//! ## Traits
//!
//! ### Playback Surfaces
//! - [`AudioService`](playback::AudioService) - Headless audio backend (`play`, `pause`, `resume`, `stop`, `seek`)
//! - [`GuiSurface`](gui::GuiSurface) - GUI pages plus a key/value session data map used by the GUI media players
//!
//! ### Stream Resolution
//! - [`StreamResolver`](playback::StreamResolver) - Turns an opaque media URI
//!   (YouTube page, RSS feed, plugin stream token) into a playable URI plus metadata
//!
//! ### Utilities
//! - [`LoggerSink`](logger::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::Error;
//!
//! let resolver = builder.resolver
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "StreamResolver".to_string(),
//!         message: "No stream resolver provided. \
//!                  Inject the host extractor chain or PassthroughResolver.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Host
//! implementations should convert their own failures into it and keep the
//! offending URI or page name in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared between the playback arbiter and its bus listener task.

pub mod error;
pub mod gui;
pub mod logger;
pub mod playback;

pub use error::BridgeError;

// Re-export commonly used types
pub use gui::{GuiSurface, SESSION_KEY_STATUS};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use playback::{AudioService, PassthroughResolver, ResolvedStream, StreamResolver};
