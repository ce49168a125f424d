//! Arbiter driven entirely through the bus.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{GuiSurface, PassthroughResolver, SESSION_KEY_STATUS};
use core_media::{Backend, MediaEntry, PlaybackType, PlayerState, TrackState};
use core_playback::arbiter::{PAGE_VIDEO_PLAYER, SESSION_KEY_NOW_PLAYING};
use core_playback::PlaybackArbiter;
use core_runtime::config::PlayerConfig;
use core_runtime::events::{CoreEvent, EventBus, PlayerCommand, PlayerEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// GUI that records pages and session data.
#[derive(Default)]
struct RecordingGui {
    pages: Mutex<Vec<String>>,
    session: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl GuiSurface for RecordingGui {
    async fn show_page(&self, page: &str) -> BridgeResult<()> {
        self.pages.lock().unwrap().push(page.to_string());
        Ok(())
    }

    async fn remove_pages(&self, pages: &[String]) -> BridgeResult<()> {
        self.pages.lock().unwrap().retain(|p| !pages.contains(p));
        Ok(())
    }

    fn set_session_data(&self, key: &str, value: Value) {
        self.session.lock().unwrap().insert(key.to_string(), value);
    }

    fn session_data(&self, key: &str) -> Option<Value> {
        self.session.lock().unwrap().get(key).cloned()
    }
}

async fn next_state_change(rx: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> (PlayerState, TrackState, Option<Backend>) {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no state change")
            .expect("bus closed");
        if let CoreEvent::Player(PlayerEvent::StateChanged {
            player_state,
            status,
            backend,
            ..
        }) = event
        {
            return (player_state, status, backend);
        }
    }
}

#[tokio::test]
async fn test_video_lifecycle_over_the_bus() {
    let bus = EventBus::new(64);
    let gui = Arc::new(RecordingGui::default());
    let arbiter = Arc::new(
        PlaybackArbiter::new(bus.clone(), Arc::new(PassthroughResolver), PlayerConfig::default())
            .with_gui(gui.clone()),
    );
    let token = CancellationToken::new();
    let listener = arbiter.listen(token.clone());
    let mut rx = bus.subscribe();

    let entry = MediaEntry::new("https://media.example/dagon.mp4")
        .with_title("Dagon")
        .with_playback_type(PlaybackType::Video);
    arbiter.play_media(entry, None, None).await.unwrap();

    assert_eq!(
        next_state_change(&mut rx).await,
        (PlayerState::Playing, TrackState::PlayingVideo, Some(Backend::Video))
    );
    assert_eq!(gui.pages.lock().unwrap().as_slice(), [PAGE_VIDEO_PLAYER.to_string()]);
    let now_playing = gui.session_data(SESSION_KEY_NOW_PLAYING).unwrap();
    assert_eq!(now_playing["title"], "Dagon");

    // The GUI player reports buffering, then a pause from the UI.
    bus.emit(CoreEvent::Player(PlayerEvent::StatusUpdate {
        entry: MediaEntry::new("https://media.example/dagon.mp4").with_status(TrackState::Buffering),
        index: None,
    }))
    .ok();
    assert_eq!(next_state_change(&mut rx).await.1, TrackState::Buffering);

    bus.emit(CoreEvent::Player(PlayerEvent::Control {
        command: PlayerCommand::Pause,
    }))
    .ok();
    assert_eq!(next_state_change(&mut rx).await.0, PlayerState::Paused);
    assert_eq!(gui.session_data(SESSION_KEY_STATUS), Some(Value::from("paused")));

    bus.emit(CoreEvent::Player(PlayerEvent::Control {
        command: PlayerCommand::Stop,
    }))
    .ok();
    assert_eq!(
        next_state_change(&mut rx).await,
        (PlayerState::Stopped, TrackState::EndOfMedia, None)
    );
    assert!(gui.pages.lock().unwrap().is_empty());

    token.cancel();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_queued_status_updates_build_the_queue() {
    let bus = EventBus::new(64);
    let gui = Arc::new(RecordingGui::default());
    let arbiter = Arc::new(
        PlaybackArbiter::new(bus.clone(), Arc::new(PassthroughResolver), PlayerConfig::default())
            .with_gui(gui),
    );
    let token = CancellationToken::new();
    let listener = arbiter.listen(token.clone());

    for uri in ["https://a.example/1.mp3", "https://a.example/2.mp3"] {
        bus.emit(CoreEvent::Player(PlayerEvent::StatusUpdate {
            entry: MediaEntry::new(uri)
                .with_playback_type(PlaybackType::Audio)
                .with_status(TrackState::QueuedAudio),
            index: None,
        }))
        .ok();
    }

    for _ in 0..50 {
        if arbiter.snapshot().await.playlist.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(arbiter.snapshot().await.playlist.len(), 2);

    // Nothing is now playing, so play() starts the queue's current track.
    arbiter.play().await.unwrap();
    let state = arbiter.snapshot().await;
    assert_eq!(state.active_backend, Some(Backend::Audio));
    assert_eq!(state.now_playing.unwrap().uri, "https://a.example/1.mp3");

    assert!(arbiter.play_next().await.unwrap());
    assert_eq!(
        arbiter.snapshot().await.now_playing.unwrap().uri,
        "https://a.example/2.mp3"
    );

    token.cancel();
    listener.await.unwrap();
}
