//! # Query Aggregator
//!
//! Broadcasts a media query, collects provider replies under an adaptive
//! deadline and returns them grouped per provider.
//!
//! ## Search Window
//!
//! ```text
//! start ─────────── min_timeout (+ generic bonus) ──────────┐
//!        ▲ "searching, N more seconds"  → window += N, capped at max_timeout
//!        ▲ result with confidence ≥ threshold → window ends after grace period
//!        ▲ every known provider sent SearchEnd → window ends now
//! ```
//!
//! Each call to [`QueryAggregator::search`] owns its own [`SearchSession`] and
//! its own bus subscription, so concurrent searches never share state. Replies
//! are matched by search id; replies from responders that do not echo an id
//! fall back to matching the phrase text.

use crate::error::{Result, SearchError};
use crate::legacy;
use crate::registry::ProviderRegistry;
use core_media::{MediaItem, MediaType};
use core_runtime::config::SearchConfig;
use core_runtime::events::{
    CoreEvent, EventBus, LegacyResponse, QueryEvent, QueryResponse, Receiver, RecvError,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Everything one provider returned for a search, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyBatch {
    pub skill_id: String,
    pub phrase: String,
    pub results: Vec<MediaItem>,
}

impl ReplyBatch {
    /// Highest confidence in the batch.
    pub fn best_confidence(&self) -> u8 {
        self.results
            .iter()
            .map(MediaItem::confidence)
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// Search Session
// ============================================================================

/// State of one in-flight search.
///
/// Pure bookkeeping: the caller feeds it replies with the time they arrived
/// and asks for the current deadline. Once closed, nothing changes it.
#[derive(Debug)]
pub struct SearchSession {
    search_id: String,
    phrase: String,
    media_type: MediaType,
    scoped_to: Option<String>,
    started_at: Instant,
    timeout: Duration,
    max_timeout: Duration,
    early_stop_threshold: u8,
    early_stop_grace: Duration,
    early_stop_at: Option<Instant>,
    replies: Vec<QueryResponse>,
    legacy_replies: Vec<LegacyResponse>,
    started: HashSet<String>,
    ended: HashSet<String>,
    expected: HashSet<String>,
    closed: bool,
}

impl SearchSession {
    pub fn new(
        search_id: impl Into<String>,
        phrase: impl Into<String>,
        media_type: MediaType,
        config: &SearchConfig,
        now: Instant,
    ) -> Self {
        let mut timeout = config.min_timeout();
        if media_type == MediaType::Generic {
            timeout += config.generic_bonus();
        }

        Self {
            search_id: search_id.into(),
            phrase: phrase.into(),
            media_type,
            scoped_to: None,
            started_at: now,
            timeout,
            max_timeout: config.max_timeout(),
            early_stop_threshold: config.early_stop_threshold,
            early_stop_grace: config.early_stop_grace(),
            early_stop_at: None,
            replies: Vec::new(),
            legacy_replies: Vec::new(),
            started: HashSet::new(),
            ended: HashSet::new(),
            expected: HashSet::new(),
            closed: false,
        }
    }

    /// Only accept replies from this provider.
    pub fn scoped_to(mut self, skill_id: impl Into<String>) -> Self {
        self.scoped_to = Some(skill_id.into());
        self
    }

    /// Providers whose `SearchEnd` completes the search early.
    pub fn expecting(mut self, providers: HashSet<String>) -> Self {
        self.expected = providers;
        self
    }

    pub fn search_id(&self) -> &str {
        &self.search_id
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn started_providers(&self) -> &HashSet<String> {
        &self.started
    }

    /// When the wait ends, given what has been received so far.
    pub fn deadline(&self) -> Instant {
        let window_end = self.started_at + self.timeout;
        match self.early_stop_at {
            Some(early) if early < window_end => early,
            _ => window_end,
        }
    }

    /// Whether an event tagged with `search_id` and `phrase` belongs here.
    pub fn matches(&self, search_id: Option<&str>, phrase: &str) -> bool {
        match search_id {
            Some(id) => id == self.search_id,
            None => phrase == self.phrase,
        }
    }

    fn accepts_provider(&self, skill_id: &str) -> bool {
        self.scoped_to.as_deref().map_or(true, |scope| scope == skill_id)
    }

    /// Record a reply. Returns `false` when it was discarded.
    pub fn handle_response(&mut self, reply: QueryResponse, now: Instant) -> bool {
        if self.closed || !self.accepts_provider(&reply.skill_id) {
            return false;
        }

        if reply.searching {
            if let Some(extra) = reply.timeout.and_then(|secs| Duration::try_from_secs_f64(secs).ok()) {
                self.extend(extra);
            }
        }

        if reply.results.is_empty() {
            return true;
        }

        let best = reply
            .results
            .iter()
            .map(MediaItem::confidence)
            .max()
            .unwrap_or(0);
        self.note_confidence(best, &reply.skill_id, now);
        self.replies.push(reply);
        true
    }

    /// Record a legacy reply. Returns `false` when it was discarded.
    pub fn handle_legacy(&mut self, reply: LegacyResponse, now: Instant) -> bool {
        if self.closed || self.scoped_to.is_some() {
            return false;
        }
        // "searching" acks and zero-confidence "no match" replies carry no result.
        if reply.searching || !(reply.conf > 0.0) {
            return true;
        }
        self.note_confidence(legacy::rescale_confidence(reply.conf), &reply.skill_id, now);
        self.legacy_replies.push(reply);
        true
    }

    pub fn mark_started(&mut self, skill_id: &str) {
        if !self.closed {
            self.started.insert(skill_id.to_string());
        }
    }

    pub fn mark_ended(&mut self, skill_id: &str) {
        if !self.closed {
            self.ended.insert(skill_id.to_string());
        }
    }

    /// Every expected provider reported `SearchEnd`.
    pub fn all_ended(&self) -> bool {
        !self.expected.is_empty() && self.expected.is_subset(&self.ended)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.closed || now >= self.deadline() || self.all_ended()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn extend(&mut self, extra: Duration) {
        let extended = (self.timeout + extra).min(self.max_timeout);
        if extended > self.timeout {
            debug!(
                search_id = %self.search_id,
                timeout_ms = extended.as_millis() as u64,
                "Search window extended"
            );
            self.timeout = extended;
        }
    }

    fn note_confidence(&mut self, confidence: u8, skill_id: &str, now: Instant) {
        if self.early_stop_at.is_none() && confidence >= self.early_stop_threshold {
            debug!(
                search_id = %self.search_id,
                skill_id,
                confidence,
                "High confidence match, stopping search early"
            );
            self.early_stop_at = Some(now + self.early_stop_grace);
        }
    }

    /// Non-empty replies grouped per provider, then translated legacy replies.
    pub fn into_batches(self) -> Vec<ReplyBatch> {
        let mut batches: Vec<ReplyBatch> = Vec::new();

        for reply in self.replies {
            match batches.iter_mut().find(|b| b.skill_id == reply.skill_id) {
                Some(batch) => batch.results.extend(reply.results),
                None => batches.push(ReplyBatch {
                    skill_id: reply.skill_id,
                    phrase: reply.phrase,
                    results: reply.results,
                }),
            }
        }

        for reply in self.legacy_replies {
            let entry = legacy::translate(&reply);
            batches.push(ReplyBatch {
                skill_id: reply.skill_id,
                phrase: reply.phrase,
                results: vec![entry.into()],
            });
        }

        batches
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Broadcasts queries and gathers replies.
#[derive(Debug, Clone)]
pub struct QueryAggregator {
    bus: EventBus,
    registry: Arc<ProviderRegistry>,
    config: SearchConfig,
}

impl QueryAggregator {
    pub fn new(bus: EventBus, registry: Arc<ProviderRegistry>, config: SearchConfig) -> Self {
        Self {
            bus,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search every provider.
    ///
    /// An empty result for a specific media type is retried once as
    /// `Generic`. No match at all is an empty list, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyPhrase`] for a blank phrase.
    #[instrument(skip(self))]
    pub async fn search(&self, phrase: &str, media_type: MediaType) -> Result<Vec<ReplyBatch>> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(SearchError::EmptyPhrase);
        }

        let mut media_type = media_type;
        loop {
            let batches = self.run_search(phrase, media_type, None).await;
            if !batches.is_empty() || media_type == MediaType::Generic {
                info!(
                    providers = batches.len(),
                    media_type = ?media_type,
                    "Search finished"
                );
                return Ok(batches);
            }
            info!(media_type = ?media_type, "No results, retrying as generic media");
            media_type = MediaType::Generic;
        }
    }

    /// Search a single provider and merge everything it returned.
    #[instrument(skip(self))]
    pub async fn search_skill(
        &self,
        skill_id: &str,
        phrase: &str,
        media_type: MediaType,
    ) -> Result<Option<ReplyBatch>> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(SearchError::EmptyPhrase);
        }

        let batches = self.run_search(phrase, media_type, Some(skill_id)).await;
        Ok(batches
            .into_iter()
            .filter(|batch| batch.skill_id == skill_id)
            .reduce(|mut merged, batch| {
                merged.results.extend(batch.results);
                merged
            }))
    }

    /// Ask providers to abandon a search (`None` for every search).
    pub fn stop_search(&self, search_id: Option<String>) {
        self.bus
            .emit(CoreEvent::Query(QueryEvent::StopSearch { search_id }))
            .ok();
    }

    async fn run_search(
        &self,
        phrase: &str,
        media_type: MediaType,
        skill_id: Option<&str>,
    ) -> Vec<ReplyBatch> {
        // Subscribe before publishing so no early reply is missed.
        let mut rx = self.bus.subscribe();

        let search_id = Uuid::new_v4().to_string();
        let use_legacy = skill_id.is_none() && self.config.enable_legacy;

        let mut session = SearchSession::new(
            search_id.clone(),
            phrase,
            media_type,
            &self.config,
            Instant::now(),
        );
        session = match skill_id {
            Some(skill_id) => session
                .scoped_to(skill_id)
                .expecting(HashSet::from([skill_id.to_string()])),
            // Legacy providers never announce themselves, so the early exit
            // is only sound when no legacy query goes out.
            None if !use_legacy => session.expecting(self.registry.provider_ids()),
            None => session,
        };

        debug!(
            search_id = %search_id,
            media_type = ?media_type,
            scoped = skill_id.is_some(),
            legacy = use_legacy,
            timeout_ms = session.timeout().as_millis() as u64,
            "Broadcasting query"
        );

        self.bus
            .emit(CoreEvent::Query(QueryEvent::Query {
                search_id: search_id.clone(),
                phrase: phrase.to_string(),
                media_type,
                skill_id: skill_id.map(str::to_string),
            }))
            .ok();
        if use_legacy {
            self.bus
                .emit(CoreEvent::Query(QueryEvent::LegacyQuery {
                    search_id: search_id.clone(),
                    phrase: phrase.to_string(),
                }))
                .ok();
        }

        collect_replies(&mut session, &mut rx).await;
        session.close();
        drain_late_replies(&session, &mut rx);

        self.stop_search(Some(search_id));
        session.into_batches()
    }
}

async fn collect_replies(session: &mut SearchSession, rx: &mut Receiver<CoreEvent>) {
    loop {
        if session.is_finished(Instant::now()) {
            if session.all_ended() {
                debug!(search_id = %session.search_id(), "All providers finished searching");
            }
            return;
        }

        match tokio::time::timeout_at(session.deadline(), rx.recv()).await {
            Err(_) => return,
            Ok(Ok(event)) => apply_event(session, event),
            Ok(Err(RecvError::Lagged(n))) => {
                warn!(search_id = %session.search_id(), missed = n, "Search lagged behind the bus");
            }
            Ok(Err(RecvError::Closed)) => return,
        }
    }
}

fn apply_event(session: &mut SearchSession, event: CoreEvent) {
    let CoreEvent::Query(event) = event else {
        return;
    };
    let now = Instant::now();

    match event {
        QueryEvent::Response(reply) => {
            if session.matches(reply.search_id.as_deref(), &reply.phrase) {
                session.handle_response(reply, now);
            }
        }
        QueryEvent::LegacyResponse(reply) => {
            if session.matches(reply.search_id.as_deref(), &reply.phrase) {
                session.handle_legacy(reply, now);
            }
        }
        QueryEvent::SearchStart { skill_id, search_id } => {
            if search_id.as_deref().map_or(true, |id| id == session.search_id()) {
                session.mark_started(&skill_id);
            }
        }
        QueryEvent::SearchEnd { skill_id, search_id } => {
            if search_id.as_deref().map_or(true, |id| id == session.search_id()) {
                session.mark_ended(&skill_id);
            }
        }
        _ => {}
    }
}

/// Log replies for `session` that were already buffered when its window
/// closed.
///
/// The receiver is dropped right after, so replies published later are not
/// seen here at all; responders still get a `StopSearch` for them.
fn drain_late_replies(session: &SearchSession, rx: &mut Receiver<CoreEvent>) {
    while let Ok(event) = rx.try_recv() {
        let late = match &event {
            CoreEvent::Query(QueryEvent::Response(reply)) if !reply.results.is_empty() => {
                session
                    .matches(reply.search_id.as_deref(), &reply.phrase)
                    .then_some(reply.skill_id.as_str())
            }
            CoreEvent::Query(QueryEvent::LegacyResponse(reply)) if !reply.searching => session
                .matches(reply.search_id.as_deref(), &reply.phrase)
                .then_some(reply.skill_id.as_str()),
            _ => None,
        };
        if let Some(skill_id) = late {
            debug!(
                search_id = %session.search_id(),
                skill_id,
                "Reply arrived too late, discarded"
            );
        }
    }
}
