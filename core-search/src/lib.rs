//! # Core Search Module
//!
//! Both halves of the provider search protocol.
//!
//! ## Overview
//!
//! - [`QueryAggregator`] broadcasts a query, collects replies inside an
//!   adaptive time window and hands back per-provider batches.
//! - [`QueryResponder`] runs on the provider side, streaming results from its
//!   [`SearchHandler`]s and forwarding play commands to its
//!   [`ProviderPlayback`].
//! - [`ProviderRegistry`] tracks which providers are online.
//! - [`ranking`] filters and orders the collected results.
//!
//! ## Search Window
//!
//! Every query opens a window of `min_timeout` (plus a bonus for generic
//! queries). Providers may ask for more time, up to `max_timeout`. A result
//! at or above the early-stop threshold shortens the window to a short grace
//! period; a search also ends as soon as every expected provider reported
//! `SearchEnd`.

pub mod aggregator;
pub mod error;
pub mod legacy;
pub mod ranking;
pub mod registry;
pub mod responder;
pub mod wire;

pub use aggregator::{QueryAggregator, ReplyBatch, SearchSession};
pub use error::{Result, SearchError};
pub use ranking::{filter_results, flatten_batches, search_best, sort_results};
pub use registry::{ProviderInfo, ProviderRegistry};
pub use responder::{ProviderPlayback, QueryResponder, ResponderHandle, SearchHandler};
pub use wire::{parse_legacy_response, parse_response};
