//! Provider registry.
//!
//! One registry exists per bus connection. It learns about providers from
//! their `ProviderAnnounce` / `ProviderRetired` events and lets the
//! aggregator know which providers it should wait for.

use core_media::MediaType;
use core_runtime::events::{CoreEvent, EventBus, QueryEvent, RecvError};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a provider declared when it came online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub skill_id: String,
    /// Empty means "answers every media type".
    pub media_types: Vec<MediaType>,
}

impl ProviderInfo {
    pub fn supports(&self, media_type: MediaType) -> bool {
        self.media_types.is_empty()
            || media_type == MediaType::Generic
            || self.media_types.contains(&media_type)
    }
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, ProviderInfo>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh a provider.
    pub fn register(&self, skill_id: impl Into<String>, media_types: Vec<MediaType>) {
        let skill_id = skill_id.into();
        let mut providers = self.providers.write();
        if providers.contains_key(&skill_id) {
            debug!(skill_id = %skill_id, "Provider re-announced");
        } else {
            info!(skill_id = %skill_id, "Provider registered");
        }
        providers.insert(
            skill_id.clone(),
            ProviderInfo {
                skill_id,
                media_types,
            },
        );
    }

    /// Remove a provider. Returns `false` if it was not registered.
    pub fn retire(&self, skill_id: &str) -> bool {
        let removed = self.providers.write().remove(skill_id).is_some();
        if removed {
            info!(skill_id = %skill_id, "Provider retired");
        }
        removed
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.providers.read().contains_key(skill_id)
    }

    pub fn get(&self, skill_id: &str) -> Option<ProviderInfo> {
        self.providers.read().get(skill_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Snapshot of every registered provider id.
    pub fn provider_ids(&self) -> HashSet<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Keep the registry in sync with announcements on `bus` until `token`
    /// is cancelled.
    pub fn track(self: &Arc<Self>, bus: &EventBus, token: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut events = bus.stream().filter(|event| {
            matches!(
                event,
                CoreEvent::Query(QueryEvent::ProviderAnnounce { .. })
                    | CoreEvent::Query(QueryEvent::ProviderRetired { .. })
            )
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(CoreEvent::Query(QueryEvent::ProviderAnnounce { skill_id, media_types })) => {
                            registry.register(skill_id, media_types);
                        }
                        Ok(CoreEvent::Query(QueryEvent::ProviderRetired { skill_id })) => {
                            registry.retire(&skill_id);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => {
                            warn!(missed = n, "Provider registry lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Provider registry listener stopped");
        })
    }
}
