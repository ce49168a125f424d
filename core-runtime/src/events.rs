//! # Event Bus System
//!
//! Provides the publish/subscribe bus that media providers, the search
//! aggregator and the playback arbiter use to talk to each other, built on
//! `tokio::sync::broadcast`. No component holds a reference to another; all
//! coordination is expressed as typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: `QueryEvent` for the search protocol, `PlayerEvent` for playback
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   Query        ┌───────────┐   Query         ┌───────────┐
//! │ Aggregator  ├───────────────>│           ├────────────────>│ Responder │
//! └─────────────┘                │           │                 └─────┬─────┘
//!        ^        Response       │ EventBus  │   Response            │
//!        └───────────────────────┤ (broadcast│<──────────────────────┘
//!                                │  channel) │
//! ┌─────────────┐ ProviderCommand│           │   StatusUpdate  ┌───────────┐
//! │  Arbiter    ├───────────────>│           │<────────────────┤  Backend  │
//! └─────────────┘                └───────────┘                 └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_media::MediaType;
//! use core_runtime::events::{CoreEvent, EventBus, QueryEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Query(QueryEvent::Query {
//!     search_id: "3f1c".to_string(),
//!     phrase: "the beatles".to_string(),
//!     media_type: MediaType::Music,
//!     skill_id: None,
//! }))
//! .ok();
//!
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Query(_))));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped. Treat as shutdown.
//!
//! `emit` fails only when nobody is subscribed; publishers ignore that with
//! `.ok()`.

use core_media::{Backend, LoopState, MediaEntry, MediaItem, MediaType, PlayerState, TrackState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// A broadcast query can trigger a burst of partial replies from every
/// provider at once, so this is sized above a typical skill count.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Search protocol between the aggregator and providers
    Query(QueryEvent),
    /// Playback control and backend status
    Player(PlayerEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Query(e) => e.description(),
            CoreEvent::Player(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Player(PlayerEvent::StatusUpdate { entry, .. })
                if entry.status == TrackState::Stalled =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Query(QueryEvent::Query { .. }) => EventSeverity::Info,
            CoreEvent::Player(PlayerEvent::StateChanged { .. }) => EventSeverity::Info,
            CoreEvent::Query(QueryEvent::ProviderAnnounce { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Query Events
// ============================================================================

/// A provider's reply to a [`QueryEvent::Query`].
///
/// Providers stream several of these per search: an acknowledgment with
/// `searching = true` (optionally asking for `timeout` more seconds), one per
/// partial result, and a final one with `searching = false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    /// Echo of the query's search id. Absent for responders that predate ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_id: Option<String>,
    pub phrase: String,
    pub skill_id: String,
    pub searching: bool,
    /// Extra seconds requested while still searching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub results: Vec<MediaItem>,
}

/// Reply shape of providers that only understand the legacy query.
///
/// The provider plays the match itself; `callback_data` is handed back to it
/// untouched when its result is selected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LegacyResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_id: Option<String>,
    pub phrase: String,
    pub skill_id: String,
    #[serde(default)]
    pub searching: bool,
    /// Match confidence in `0.0..=1.0`.
    #[serde(default)]
    pub conf: f64,
    #[serde(default)]
    pub callback_data: Value,
}

/// Events of the search protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum QueryEvent {
    /// Broadcast (or provider-scoped) search request.
    Query {
        search_id: String,
        phrase: String,
        media_type: MediaType,
        /// Only this provider should answer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skill_id: Option<String>,
    },
    /// Reply to `Query`.
    Response(QueryResponse),
    /// Search request in the legacy shape.
    LegacyQuery { search_id: String, phrase: String },
    /// Reply to `LegacyQuery`.
    LegacyResponse(LegacyResponse),
    /// A provider started handling a search.
    SearchStart {
        skill_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_id: Option<String>,
    },
    /// A provider finished (or abandoned) a search.
    SearchEnd {
        skill_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_id: Option<String>,
    },
    /// Cancel in-flight search handlers. `None` cancels every search.
    StopSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_id: Option<String>,
    },
    /// A provider is online and answers queries for these media types.
    ProviderAnnounce {
        skill_id: String,
        media_types: Vec<MediaType>,
    },
    /// A provider went away.
    ProviderRetired { skill_id: String },
}

impl QueryEvent {
    fn description(&self) -> &str {
        match self {
            QueryEvent::Query { .. } => "Media query broadcast",
            QueryEvent::Response(_) => "Provider query response",
            QueryEvent::LegacyQuery { .. } => "Legacy media query broadcast",
            QueryEvent::LegacyResponse(_) => "Legacy provider query response",
            QueryEvent::SearchStart { .. } => "Provider search started",
            QueryEvent::SearchEnd { .. } => "Provider search ended",
            QueryEvent::StopSearch { .. } => "Search cancellation requested",
            QueryEvent::ProviderAnnounce { .. } => "Provider announced",
            QueryEvent::ProviderRetired { .. } => "Provider retired",
        }
    }
}

// ============================================================================
// Player Events
// ============================================================================

/// Transport command, either scoped to a provider or requested by a UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlayerCommand {
    Play,
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    Seek { position_ms: u64 },
    SetLoop { state: LoopState },
    SetShuffle { enabled: bool },
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerCommand::Play => f.write_str("play"),
            PlayerCommand::Pause => f.write_str("pause"),
            PlayerCommand::Resume => f.write_str("resume"),
            PlayerCommand::Stop => f.write_str("stop"),
            PlayerCommand::Next => f.write_str("next"),
            PlayerCommand::Previous => f.write_str("previous"),
            PlayerCommand::Seek { position_ms } => write!(f, "seek({}ms)", position_ms),
            PlayerCommand::SetLoop { state } => write!(f, "set_loop({:?})", state),
            PlayerCommand::SetShuffle { enabled } => write!(f, "set_shuffle({})", enabled),
        }
    }
}

/// Events of the playback side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlayerEvent {
    /// Backend report about an entry. The new state is `entry.status`.
    StatusUpdate {
        entry: MediaEntry,
        /// Queue position for `Queued*` statuses; appended when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Arbiter → provider command for in-skill playback.
    ProviderCommand {
        skill_id: String,
        command: PlayerCommand,
        /// Entry to play, set for `Play`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry: Option<MediaEntry>,
    },
    /// UI → arbiter request.
    Control { command: PlayerCommand },
    /// Arbiter state after a transition.
    StateChanged {
        player_state: PlayerState,
        status: TrackState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend: Option<Backend>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        now_playing: Option<MediaEntry>,
    },
}

impl PlayerEvent {
    fn description(&self) -> &str {
        match self {
            PlayerEvent::StatusUpdate { .. } => "Backend status update",
            PlayerEvent::ProviderCommand { .. } => "Provider playback command",
            PlayerEvent::Control { .. } => "Playback control request",
            PlayerEvent::StateChanged { .. } => "Player state changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Creates a subscriber wrapped in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let queries = bus.stream().filter(|event| matches!(event, CoreEvent::Query(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(phrase: &str) -> CoreEvent {
        CoreEvent::Query(QueryEvent::Query {
            search_id: "search-1".to_string(),
            phrase: phrase.to_string(),
            media_type: MediaType::Generic,
            skill_id: None,
        })
    }

    fn response(skill_id: &str) -> CoreEvent {
        CoreEvent::Query(QueryEvent::Response(QueryResponse {
            search_id: Some("search-1".to_string()),
            phrase: "dagon".to_string(),
            skill_id: skill_id.to_string(),
            searching: false,
            timeout: None,
            results: vec![MediaEntry::new("http://a").with_confidence(70).into()],
        }))
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.stream();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(query("dagon")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = query("jazz radio");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, CoreEvent::Query(QueryEvent::Response(_))));

        bus.emit(query("dagon")).ok();
        let reply = response("skill-movies");
        bus.emit(reply.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), reply);
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, CoreEvent::Player(_)));

        assert!(stream.try_recv().is_none());
        bus.emit(query("dagon")).ok();
        assert!(stream.try_recv().is_none());

        let control = CoreEvent::Player(PlayerEvent::Control {
            command: PlayerCommand::Pause,
        });
        bus.emit(control.clone()).ok();
        assert_eq!(stream.try_recv().unwrap().unwrap(), control);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(response(&format!("skill-{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let handles: Vec<_> = (0..2)
            .map(|n| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        bus.emit(response(&format!("skill-{}-{}", n, i))).ok();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.ok();
        }

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_severity_and_description() {
        assert_eq!(query("x").severity(), EventSeverity::Info);
        assert_eq!(response("s").severity(), EventSeverity::Debug);

        let stalled = CoreEvent::Player(PlayerEvent::StatusUpdate {
            entry: MediaEntry::new("http://a").with_status(TrackState::Stalled),
            index: None,
        });
        assert_eq!(stalled.severity(), EventSeverity::Warning);
        assert_eq!(stalled.description(), "Backend status update");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Player(PlayerEvent::ProviderCommand {
            skill_id: "skill-news".to_string(),
            command: PlayerCommand::Seek { position_ms: 3000 },
            entry: None,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Player");
        assert_eq!(value["payload"]["event"], "ProviderCommand");
        assert_eq!(value["payload"]["command"]["command"], "seek");

        let restored: CoreEvent = serde_json::from_value(value).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn test_response_accepts_missing_optional_fields() {
        let event: CoreEvent = serde_json::from_value(json!({
            "type": "Query",
            "payload": {
                "event": "Response",
                "phrase": "dagon",
                "skill_id": "skill-old",
                "searching": true,
                "timeout": 2.0
            }
        }))
        .unwrap();

        match event {
            CoreEvent::Query(QueryEvent::Response(reply)) => {
                assert_eq!(reply.search_id, None);
                assert_eq!(reply.timeout, Some(2.0));
                assert!(reply.results.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
