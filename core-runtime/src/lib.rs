//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the common playback core:
//! - Event bus carrying the search protocol and playback control
//! - Configuration of search windows and player behaviour
//! - Logging and tracing infrastructure
//!
//! ## Overview
//!
//! Every other core crate depends on this one. Components never call each
//! other directly; they publish and consume [`events::CoreEvent`]s on a shared
//! [`events::EventBus`], read their tunables from [`config::OcpConfig`] and
//! log through `tracing`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{OcpConfig, PlayerConfig, SearchConfig};
pub use error::{Error, Result};
pub use events::{
    CoreEvent, EventBus, EventStream, LegacyResponse, PlayerCommand, PlayerEvent, QueryEvent,
    QueryResponse,
};
