//! # Skill-Side Query Responder
//!
//! Runs next to a media provider and answers the aggregator's queries on its
//! behalf.
//!
//! ## Reply Sequence
//!
//! ```text
//! Query ──> SearchStart
//!           Response { searching: true, timeout: hint }        (ack)
//!           Response { searching: true, results: [item] }       (one per item)
//!           Response { searching: false }                       (complete)
//!           SearchEnd
//! ```
//!
//! Unsupported media types get `SearchStart`, a `searching: false` response
//! and `SearchEnd` without touching any handler.
//!
//! Handlers yield results as a stream. Cancellation is checked between items,
//! so a handler that never yields cannot be interrupted.

use bridge_traits::error::Result as BridgeResult;
use core_media::{MediaEntry, MediaItem, MediaType};
use core_runtime::events::{
    CoreEvent, EventBus, PlayerCommand, PlayerEvent, QueryEvent, QueryResponse, Receiver,
    RecvError,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A provider's search implementation.
///
/// Return a finite stream (`futures::stream::iter(results).boxed()`) or a
/// lazily produced, possibly infinite one.
pub trait SearchHandler: Send + Sync {
    fn search(&self, phrase: &str, media_type: MediaType) -> BoxStream<'static, MediaItem>;
}

/// In-provider playback for `PlaybackType::Skill` results.
#[async_trait::async_trait]
pub trait ProviderPlayback: Send + Sync {
    async fn handle_command(&self, command: PlayerCommand, entry: Option<MediaEntry>) -> BridgeResult<()>;
}

/// Handle to a running responder.
#[derive(Debug)]
pub struct ResponderHandle {
    skill_id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ResponderHandle {
    pub fn skill_id(&self) -> &str {
        &self.skill_id
    }

    /// Cancel in-flight searches, retire the provider and wait for the task.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(skill_id = %self.skill_id, error = %e, "Responder task failed");
        }
    }
}

pub struct QueryResponder {
    skill_id: String,
    supported_media: Vec<MediaType>,
    handlers: Vec<Arc<dyn SearchHandler>>,
    playback: Option<Arc<dyn ProviderPlayback>>,
    timeout_hint: Option<f64>,
    bus: EventBus,
}

impl QueryResponder {
    pub fn new(skill_id: impl Into<String>, bus: EventBus) -> Self {
        Self {
            skill_id: skill_id.into(),
            supported_media: Vec::new(),
            handlers: Vec::new(),
            playback: None,
            timeout_hint: None,
            bus,
        }
    }

    /// Declare the media types this provider answers. Empty means all.
    pub fn with_media_types(mut self, media_types: Vec<MediaType>) -> Self {
        self.supported_media = media_types;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn SearchHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_playback(mut self, playback: Arc<dyn ProviderPlayback>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Seconds to ask the aggregator for in the initial acknowledgment.
    pub fn with_timeout_hint(mut self, seconds: f64) -> Self {
        self.timeout_hint = Some(seconds);
        self
    }

    pub fn skill_id(&self) -> &str {
        &self.skill_id
    }

    pub fn supports(&self, media_type: MediaType) -> bool {
        self.supported_media.is_empty()
            || media_type == MediaType::Generic
            || self.supported_media.contains(&media_type)
    }

    /// Subscribe, announce the provider and start answering queries.
    pub fn spawn(self) -> ResponderHandle {
        let skill_id = self.skill_id.clone();
        let token = CancellationToken::new();
        let rx = self.bus.subscribe();

        self.emit(QueryEvent::ProviderAnnounce {
            skill_id: skill_id.clone(),
            media_types: self.supported_media.clone(),
        });
        info!(skill_id = %skill_id, "Query responder online");

        let handle = tokio::spawn(Arc::new(self).run(rx, token.clone()));

        ResponderHandle {
            skill_id,
            token,
            handle,
        }
    }

    fn emit(&self, event: QueryEvent) {
        self.bus.emit(CoreEvent::Query(event)).ok();
    }

    fn respond(&self, search_id: &str, phrase: &str, searching: bool, timeout: Option<f64>, results: Vec<MediaItem>) {
        self.emit(QueryEvent::Response(QueryResponse {
            search_id: Some(search_id.to_string()),
            phrase: phrase.to_string(),
            skill_id: self.skill_id.clone(),
            searching,
            timeout,
            results,
        }));
    }

    async fn run(self: Arc<Self>, mut rx: Receiver<CoreEvent>, shutdown: CancellationToken) {
        let mut searches: HashMap<String, CancellationToken> = HashMap::new();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };

            match event {
                Ok(CoreEvent::Query(QueryEvent::Query {
                    search_id,
                    phrase,
                    media_type,
                    skill_id,
                })) => {
                    if skill_id.as_deref().is_some_and(|id| id != self.skill_id) {
                        continue;
                    }
                    searches.retain(|_, token| !token.is_cancelled());
                    let token = shutdown.child_token();
                    searches.insert(search_id.clone(), token.clone());
                    tokio::spawn(Arc::clone(&self).handle_query(search_id, phrase, media_type, token));
                }
                Ok(CoreEvent::Query(QueryEvent::StopSearch { search_id })) => match search_id {
                    Some(id) => {
                        if let Some(token) = searches.remove(&id) {
                            token.cancel();
                        }
                    }
                    None => {
                        for (_, token) in searches.drain() {
                            token.cancel();
                        }
                    }
                },
                Ok(CoreEvent::Player(PlayerEvent::ProviderCommand {
                    skill_id,
                    command,
                    entry,
                })) if skill_id == self.skill_id => {
                    self.forward_command(command, entry);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!(skill_id = %self.skill_id, missed = n, "Responder lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }

        for (_, token) in searches.drain() {
            token.cancel();
        }
        self.emit(QueryEvent::ProviderRetired {
            skill_id: self.skill_id.clone(),
        });
        info!(skill_id = %self.skill_id, "Query responder stopped");
    }

    fn forward_command(&self, command: PlayerCommand, entry: Option<MediaEntry>) {
        let Some(playback) = self.playback.clone() else {
            debug!(skill_id = %self.skill_id, %command, "No playback handler, ignoring command");
            return;
        };
        let skill_id = self.skill_id.clone();
        tokio::spawn(async move {
            if let Err(e) = playback.handle_command(command, entry).await {
                warn!(skill_id = %skill_id, %command, error = %e, "Provider playback command failed");
            }
        });
    }

    #[instrument(skip(self, token), fields(skill_id = %self.skill_id))]
    async fn handle_query(
        self: Arc<Self>,
        search_id: String,
        phrase: String,
        media_type: MediaType,
        token: CancellationToken,
    ) {
        self.emit(QueryEvent::SearchStart {
            skill_id: self.skill_id.clone(),
            search_id: Some(search_id.clone()),
        });

        if !self.supports(media_type) {
            debug!(media_type = ?media_type, "Media type not supported, skipping");
            self.finish(&search_id, &phrase, &token);
            return;
        }

        self.respond(&search_id, &phrase, true, self.timeout_hint, Vec::new());

        let mut yielded = 0usize;
        'handlers: for handler in &self.handlers {
            let mut results = handler.search(&phrase, media_type);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break 'handlers,
                    next = results.next() => next,
                };
                let Some(mut item) = next else {
                    break;
                };
                item.set_provider_id(&self.skill_id);
                yielded += 1;
                self.respond(&search_id, &phrase, true, None, vec![item]);
            }
        }

        if token.is_cancelled() {
            debug!(yielded, "Search cancelled");
        } else {
            debug!(yielded, "Search complete");
        }
        self.finish(&search_id, &phrase, &token);
    }

    fn finish(&self, search_id: &str, phrase: &str, token: &CancellationToken) {
        self.respond(search_id, phrase, false, None, Vec::new());
        self.emit(QueryEvent::SearchEnd {
            skill_id: self.skill_id.clone(),
            search_id: Some(search_id.to_string()),
        });
        token.cancel();
    }
}
