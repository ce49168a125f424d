//! "Play <phrase>" from utterance to backend, with real responders on the bus.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{AudioService, PassthroughResolver};
use core_media::{Backend, MediaEntry, MediaItem, MediaType, PlaybackType};
use core_runtime::config::{OcpConfig, SearchConfig};
use core_runtime::events::PlayerCommand;
use core_search::{ProviderPlayback, QueryResponder, ResponderHandle, SearchHandler};
use core_service::OcpService;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct RecordingAudio {
    played: Mutex<Vec<String>>,
}

#[async_trait]
impl AudioService for RecordingAudio {
    async fn play(&self, uri: &str) -> BridgeResult<()> {
        self.played.lock().unwrap().push(uri.to_string());
        Ok(())
    }
    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }
    async fn resume(&self) -> BridgeResult<()> {
        Ok(())
    }
    async fn stop(&self) -> BridgeResult<()> {
        Ok(())
    }
    async fn seek(&self, _position: Duration) -> BridgeResult<()> {
        Ok(())
    }
}

struct Catalog(Vec<MediaItem>);

impl SearchHandler for Catalog {
    fn search(&self, _phrase: &str, _media_type: MediaType) -> BoxStream<'static, MediaItem> {
        futures::stream::iter(self.0.clone()).boxed()
    }
}

struct ChannelPlayback(mpsc::UnboundedSender<(PlayerCommand, Option<MediaEntry>)>);

#[async_trait]
impl ProviderPlayback for ChannelPlayback {
    async fn handle_command(&self, command: PlayerCommand, entry: Option<MediaEntry>) -> BridgeResult<()> {
        self.0.send((command, entry)).ok();
        Ok(())
    }
}

fn track(uri: &str, confidence: u8, playback_type: PlaybackType) -> MediaItem {
    MediaEntry::new(uri)
        .with_title(uri)
        .with_confidence(confidence)
        .with_media_type(MediaType::Music)
        .with_playback_type(playback_type)
        .into()
}

fn headless_service(audio: Arc<RecordingAudio>) -> OcpService {
    let mut service = OcpService::builder()
        .config(OcpConfig::default().with_search(SearchConfig::low_latency()))
        .resolver(Arc::new(PassthroughResolver))
        .audio_service(audio)
        .build()
        .unwrap();
    service.start();
    service
}

async fn wait_for_providers(service: &OcpService, count: usize) {
    for _ in 0..100 {
        if service.registry().len() == count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("providers never announced");
}

async fn shutdown(service: OcpService, responders: Vec<ResponderHandle>) {
    for responder in responders {
        responder.shutdown().await;
    }
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_best_audio_match_goes_to_audio_service() {
    let audio = Arc::new(RecordingAudio::default());
    let service = headless_service(audio.clone());

    let responders = vec![
        QueryResponder::new("skill-jazz", service.bus().clone())
            .with_media_types(vec![MediaType::Music])
            .with_handler(Arc::new(Catalog(vec![
                track("https://jazz.example/a.mp3", 80, PlaybackType::Audio),
                track("https://jazz.example/b.mp3", 60, PlaybackType::Audio),
            ])))
            .spawn(),
        QueryResponder::new("skill-videos", service.bus().clone())
            .with_handler(Arc::new(Catalog(vec![track(
                "https://video.example/jazz.mp4",
                85,
                PlaybackType::Video,
            )])))
            .spawn(),
    ];
    wait_for_providers(&service, 2).await;

    let playing = service
        .handle_play_request("jazz", MediaType::Music)
        .await
        .unwrap()
        .unwrap();

    // The video result scores higher but cannot play without a GUI.
    assert_eq!(playing.uri, "https://jazz.example/a.mp3");
    assert_eq!(playing.provider_id, "skill-jazz");
    assert_eq!(*audio.played.lock().unwrap(), vec!["https://jazz.example/a.mp3".to_string()]);

    let state = service.arbiter().snapshot().await;
    assert_eq!(state.active_backend, Some(Backend::AudioService));
    let confidences: Vec<u8> = state
        .search_playlist
        .entries()
        .iter()
        .map(MediaItem::confidence)
        .collect();
    assert_eq!(confidences, vec![80, 60]);

    shutdown(service, responders).await;
}

#[tokio::test(start_paused = true)]
async fn test_skill_result_is_played_by_its_provider() {
    let audio = Arc::new(RecordingAudio::default());
    let service = headless_service(audio.clone());
    let (tx, mut commands) = mpsc::unbounded_channel();

    let responders = vec![QueryResponder::new("skill-podcasts", service.bus().clone())
        .with_handler(Arc::new(Catalog(vec![track(
            "podcast://episode/42",
            95,
            PlaybackType::Skill,
        )])))
        .with_playback(Arc::new(ChannelPlayback(tx)))
        .spawn()];
    wait_for_providers(&service, 1).await;

    let playing = service
        .handle_play_request("episode 42", MediaType::Podcast)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(playing.playback_type, PlaybackType::Skill);

    let (command, entry) = tokio::time::timeout(Duration::from_secs(1), commands.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command, PlayerCommand::Play);
    assert_eq!(entry.unwrap().uri, "podcast://episode/42");
    assert!(audio.played.lock().unwrap().is_empty());

    // Stopping goes back to the provider as well.
    assert!(service.arbiter().stop().await);
    let (command, _) = tokio::time::timeout(Duration::from_secs(1), commands.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command, PlayerCommand::Stop);

    shutdown(service, responders).await;
}

#[tokio::test(start_paused = true)]
async fn test_results_below_min_score_are_ignored() {
    let audio = Arc::new(RecordingAudio::default());
    let service = headless_service(audio.clone());

    let responders = vec![QueryResponder::new("skill-weak", service.bus().clone())
        .with_handler(Arc::new(Catalog(vec![track(
            "https://weak.example/x.mp3",
            20,
            PlaybackType::Audio,
        )])))
        .spawn()];
    wait_for_providers(&service, 1).await;

    let playing = service
        .handle_play_request("anything", MediaType::Music)
        .await
        .unwrap();
    assert!(playing.is_none());
    assert!(audio.played.lock().unwrap().is_empty());

    shutdown(service, responders).await;
}
