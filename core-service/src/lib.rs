//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (stream resolver,
//! audio service, GUI surface) into the common playback core: one event bus,
//! one provider registry, the query aggregator and the playback arbiter.
//!
//! ```ignore
//! let mut service = OcpService::builder()
//!     .resolver(Arc::new(PassthroughResolver))
//!     .audio_service(audio)
//!     .build()?;
//! service.start();
//!
//! if let Some(entry) = service.handle_play_request("play dagon", MediaType::Movie).await? {
//!     println!("now playing {}", entry.title);
//! }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{AudioService, GuiSurface, StreamResolver};
use core_media::{MediaEntry, MediaItem, MediaType};
use core_playback::PlaybackArbiter;
use core_runtime::config::OcpConfig;
use core_runtime::events::{CoreEvent, EventBus, QueryEvent};
use core_runtime::Error;
use core_search::{
    filter_results, flatten_batches, parse_legacy_response, parse_response, search_best,
    sort_results, ProviderRegistry, QueryAggregator,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Builder for [`OcpService`].
///
/// A stream resolver and at least one playback surface (GUI or audio
/// service) are required; [`build`](Self::build) fails fast without them.
#[derive(Default)]
pub struct OcpServiceBuilder {
    config: OcpConfig,
    bus: Option<EventBus>,
    resolver: Option<Arc<dyn StreamResolver>>,
    audio: Option<Arc<dyn AudioService>>,
    gui: Option<Arc<dyn GuiSurface>>,
}

impl OcpServiceBuilder {
    pub fn config(mut self, config: OcpConfig) -> Self {
        self.config = config;
        self
    }

    /// Join an existing bus instead of creating one.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn StreamResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn audio_service(mut self, audio: Arc<dyn AudioService>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn gui(mut self, gui: Arc<dyn GuiSurface>) -> Self {
        self.gui = Some(gui);
        self
    }

    pub fn build(self) -> Result<OcpService> {
        self.config.validate()?;

        let resolver = self.resolver.ok_or_else(|| Error::CapabilityMissing {
            capability: "StreamResolver".to_string(),
            message: "No stream resolver provided. \
                      Inject the host extractor chain or PassthroughResolver."
                .to_string(),
        })?;

        if self.gui.is_none() && self.audio.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "PlaybackSurface".to_string(),
                message: "Neither a GUI surface nor an audio service was provided.".to_string(),
            }
            .into());
        }

        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.event_buffer_size));
        let registry = Arc::new(ProviderRegistry::new());
        let aggregator = QueryAggregator::new(
            bus.clone(),
            Arc::clone(&registry),
            self.config.search.clone(),
        );

        let mut arbiter = PlaybackArbiter::new(bus.clone(), resolver, self.config.player.clone());
        if let Some(audio) = self.audio {
            arbiter = arbiter.with_audio_service(audio);
        }
        if let Some(gui) = self.gui {
            arbiter = arbiter.with_gui(gui);
        }

        Ok(OcpService {
            config: self.config,
            bus,
            registry,
            aggregator,
            arbiter: Arc::new(arbiter),
            token: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

/// Primary façade exposed to host applications.
pub struct OcpService {
    config: OcpConfig,
    bus: EventBus,
    registry: Arc<ProviderRegistry>,
    aggregator: QueryAggregator,
    arbiter: Arc<PlaybackArbiter>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OcpService {
    pub fn builder() -> OcpServiceBuilder {
        OcpServiceBuilder::default()
    }

    /// Spawn the registry and playback listeners. Idempotent.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }
        self.tasks
            .push(self.registry.track(&self.bus, self.token.child_token()));
        self.tasks.push(self.arbiter.listen(self.token.child_token()));
        info!("Common playback service started");
    }

    /// Stop the listeners and playback.
    pub async fn shutdown(self) {
        self.arbiter.stop().await;
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Service task failed");
            }
        }
        info!("Common playback service stopped");
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &OcpConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn aggregator(&self) -> &QueryAggregator {
        &self.aggregator
    }

    pub fn arbiter(&self) -> &Arc<PlaybackArbiter> {
        &self.arbiter
    }

    /// Publish a query reply received from a provider outside this process.
    ///
    /// Malformed result items are dropped; a reply without `skill_id` is
    /// rejected.
    pub fn relay_response(&self, value: &Value) -> Result<()> {
        let response = parse_response(value)?;
        debug!(
            skill_id = %response.skill_id,
            results = response.results.len(),
            searching = response.searching,
            "Relaying provider response"
        );
        self.bus
            .emit(CoreEvent::Query(QueryEvent::Response(response)))
            .ok();
        Ok(())
    }

    /// Publish a legacy reply received from a provider outside this process.
    pub fn relay_legacy_response(&self, value: &Value) -> Result<()> {
        let response = parse_legacy_response(value)?;
        debug!(skill_id = %response.skill_id, conf = response.conf, "Relaying legacy response");
        self.bus
            .emit(CoreEvent::Query(QueryEvent::LegacyResponse(response)))
            .ok();
        Ok(())
    }

    /// Search every provider and return playable results, best first.
    pub async fn search(&self, phrase: &str, media_type: MediaType) -> Result<Vec<MediaItem>> {
        let batches = self.aggregator.search(phrase, media_type).await?;
        let mut results = filter_results(
            flatten_batches(batches),
            media_type,
            &self.config.search,
            self.arbiter.has_gui(),
        );
        sort_results(&mut results);
        Ok(results)
    }

    /// Search, pick the best result and start playing it.
    ///
    /// Every result is kept as the disambiguation list. Returns the entry now
    /// playing, or `None` when nothing matched.
    #[instrument(skip(self))]
    pub async fn handle_play_request(
        &self,
        phrase: &str,
        media_type: MediaType,
    ) -> Result<Option<MediaEntry>> {
        let results = self.search(phrase, media_type).await?;
        let Some(best) = search_best(&results) else {
            info!("No playable media found");
            return Ok(None);
        };

        info!(
            provider = %best.provider_id(),
            confidence = best.confidence(),
            title = %best.title(),
            candidates = results.len(),
            "Selected best match"
        );
        self.arbiter.play_item(best, Some(results)).await?;
        Ok(self.arbiter.snapshot().await.now_playing)
    }
}
