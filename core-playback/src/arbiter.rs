//! # Playback Arbiter
//!
//! Owns "now playing" and decides which backend plays it.
//!
//! ## State Machine
//!
//! ```text
//!                 ┌──────────────┐
//!  DISAMBIGUATION │  QUEUED_*    │
//!        │        └──────┬───────┘
//!        └──────────────>│ play()
//!                        v
//!                 ┌──────────────┐  pause / buffering / stall  ┌───────────────────────────┐
//!                 │  PLAYING_*   │ ──────────────────────────> │ PAUSED / BUFFERING / STALLED │
//!                 └──────┬───────┘ <────────────────────────── └───────────────────────────┘
//!                        │ stop() / end of media      resume()
//!                        v
//!                 ┌──────────────┐
//!                 │ END_OF_MEDIA │ (initial)
//!                 └──────────────┘
//! ```
//!
//! ## Dispatch
//!
//! | Playback type | Backend |
//! |---|---|
//! | `Skill` | provider-scoped `ProviderCommand` on the bus |
//! | `Audio` | GUI audio player when present (and preferred), else the audio service |
//! | `Video` | GUI video player |
//! | `Webview` | GUI web view |
//! | `Undefined` | [`PlaybackError::InvalidPlaybackType`] |
//!
//! Every transition is published as `PlayerEvent::StateChanged`.

use crate::error::{PlaybackError, Result};
use bridge_traits::{AudioService, GuiSurface, StreamResolver, SESSION_KEY_STATUS};
use core_media::{
    Backend, LoopState, MediaEntry, MediaItem, PlaybackType, PlayerState, Playlist, TrackState,
};
use core_runtime::config::PlayerConfig;
use core_runtime::events::{CoreEvent, EventBus, PlayerCommand, PlayerEvent, RecvError};
use core_runtime::logging::loggable_uri;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const PAGE_AUDIO_PLAYER: &str = "audio_player";
pub const PAGE_VIDEO_PLAYER: &str = "video_player";
pub const PAGE_WEB_PLAYER: &str = "web_player";

/// Session data key holding the now-playing entry.
pub const SESSION_KEY_NOW_PLAYING: &str = "now_playing";
/// Session data key holding the seek target in milliseconds.
pub const SESSION_KEY_POSITION: &str = "position";

fn page_for(backend: Backend) -> &'static str {
    match backend {
        Backend::Video => PAGE_VIDEO_PLAYER,
        Backend::Webview => PAGE_WEB_PLAYER,
        _ => PAGE_AUDIO_PLAYER,
    }
}

fn status_value(status: TrackState) -> Value {
    serde_json::to_value(status).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Next,
    Previous,
}

/// Everything the arbiter tracks.
#[derive(Debug, Clone)]
pub struct ArbiterState {
    pub player_state: PlayerState,
    pub status: TrackState,
    pub active_backend: Option<Backend>,
    pub now_playing: Option<MediaEntry>,
    /// Queued tracks.
    pub playlist: Playlist,
    /// Disambiguation pool from the last search.
    pub search_playlist: Playlist,
    pub loop_state: LoopState,
    pub shuffle: bool,
}

impl ArbiterState {
    fn new(config: &PlayerConfig) -> Self {
        Self {
            player_state: PlayerState::Stopped,
            status: TrackState::EndOfMedia,
            active_backend: None,
            now_playing: None,
            playlist: Playlist::default(),
            search_playlist: Playlist::default(),
            loop_state: config.default_loop_state,
            shuffle: config.shuffle,
        }
    }

    fn set_status(&mut self, status: TrackState) {
        self.status = status;
        if let Some(entry) = self.now_playing.as_mut() {
            entry.status = status;
        }
    }

    fn provider_id(&self) -> String {
        self.now_playing
            .as_ref()
            .map(|entry| entry.provider_id.clone())
            .unwrap_or_default()
    }

    fn reset(&mut self) {
        self.player_state = PlayerState::Stopped;
        self.status = TrackState::EndOfMedia;
        self.active_backend = None;
        self.now_playing = None;
    }

    /// The playlist navigation applies to: the queue, or the search results
    /// when nothing is queued.
    fn current_playlist(&mut self) -> &mut Playlist {
        if self.playlist.is_empty() {
            &mut self.search_playlist
        } else {
            &mut self.playlist
        }
    }
}

pub struct PlaybackArbiter {
    bus: EventBus,
    resolver: Arc<dyn StreamResolver>,
    audio: Option<Arc<dyn AudioService>>,
    gui: Option<Arc<dyn GuiSurface>>,
    config: PlayerConfig,
    state: Mutex<ArbiterState>,
}

impl PlaybackArbiter {
    pub fn new(bus: EventBus, resolver: Arc<dyn StreamResolver>, config: PlayerConfig) -> Self {
        Self {
            state: Mutex::new(ArbiterState::new(&config)),
            bus,
            resolver,
            audio: None,
            gui: None,
            config,
        }
    }

    pub fn with_audio_service(mut self, audio: Arc<dyn AudioService>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_gui(mut self, gui: Arc<dyn GuiSurface>) -> Self {
        self.gui = Some(gui);
        self
    }

    pub fn has_gui(&self) -> bool {
        self.gui.is_some()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> ArbiterState {
        self.state.lock().await.clone()
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Play `entry`, optionally replacing the search results and the queue.
    ///
    /// Anything currently playing is paused first. The cursors of the new
    /// search results and queue move to `entry` when they contain it. If
    /// `entry` cannot be played, the previous entry stays current.
    #[instrument(skip(self, entry, disambiguation, playlist), fields(uri = %loggable_uri(&entry.uri)))]
    pub async fn play_media(
        &self,
        entry: MediaEntry,
        disambiguation: Option<Vec<MediaItem>>,
        playlist: Option<Vec<MediaItem>>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        self.pause_current(&mut state).await;

        let item = MediaItem::from(entry.clone());
        if let Some(items) = disambiguation {
            state.search_playlist.replace(items);
            state.search_playlist.goto_item(&item);
        }
        if let Some(items) = playlist {
            state.playlist.replace(items);
            if !state.playlist.goto_item(&item) {
                debug!("Now playing entry is not part of the new queue");
            }
        }

        let previous = state.now_playing.replace(entry);
        self.play_or_restore(&mut state, previous).await
    }

    /// Play a search result of any kind.
    ///
    /// A playlist becomes the queue and starts at its own cursor. A plugin
    /// stream is resolved before dispatch.
    pub async fn play_item(&self, item: MediaItem, disambiguation: Option<Vec<MediaItem>>) -> Result<()> {
        let mut state = self.state.lock().await;
        self.pause_current(&mut state).await;

        if let Some(items) = disambiguation {
            state.search_playlist.replace(items);
            state.search_playlist.goto_item(&item);
        }
        let previous = state.now_playing.clone();
        match item {
            MediaItem::Entry(entry) => state.now_playing = Some(entry),
            MediaItem::Playlist(playlist) => {
                debug!(title = %playlist.title, tracks = playlist.len(), "Queueing playlist");
                state.playlist = playlist;
                state.now_playing = None;
            }
            stream @ MediaItem::Stream(_) => {
                state.now_playing = Some(self.materialize(stream).await?);
            }
        }
        self.play_or_restore(&mut state, previous).await
    }

    /// Play now playing, or the current track of the queue or search results.
    pub async fn play(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.play_locked(&mut state).await
    }

    /// Advance the queue. Returns `false` when there was nowhere to go.
    ///
    /// A provider playing its own media keeps its own playlist, so the
    /// request is forwarded to it instead.
    pub async fn play_next(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if self.forward_to_provider(&state, PlayerCommand::Next).await? {
            return Ok(true);
        }
        self.advance(&mut state, Direction::Next, false).await
    }

    /// Step back in the queue. Returns `false` when there was nowhere to go.
    pub async fn play_prev(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if self.forward_to_provider(&state, PlayerCommand::Previous).await? {
            return Ok(true);
        }
        self.advance(&mut state, Direction::Previous, false).await
    }

    pub async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(backend) = state.active_backend else {
            debug!("Nothing playing, ignoring pause");
            return Ok(());
        };

        let provider_id = state.provider_id();
        self.send_to_backend(backend, &provider_id, PlayerCommand::Pause)
            .await?;
        state.player_state = PlayerState::Paused;
        state.set_status(TrackState::Paused);
        self.broadcast(&state);
        Ok(())
    }

    /// Resume on the active backend. Without one, the GUI video player is
    /// assumed (or the audio service on a headless device).
    pub async fn resume(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let backend = match state.active_backend {
            Some(backend) => backend,
            None => {
                let guess = if self.gui.is_none() && self.audio.is_some() {
                    Backend::AudioService
                } else {
                    Backend::Video
                };
                debug!(backend = %guess, "No active backend, guessing");
                guess
            }
        };

        let provider_id = state.provider_id();
        self.send_to_backend(backend, &provider_id, PlayerCommand::Resume)
            .await?;
        state.active_backend = Some(backend);
        state.player_state = PlayerState::Playing;
        state.set_status(TrackState::playing(backend));
        self.broadcast(&state);
        Ok(())
    }

    /// Stop playback and reset to end of media.
    ///
    /// Returns `true` if anything was playing or paused. Backend failures are
    /// logged; the arbiter resets regardless.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        let was_active =
            state.active_backend.is_some() || state.player_state != PlayerState::Stopped;
        if !was_active {
            return false;
        }

        if let Some(backend) = state.active_backend {
            let provider_id = state.provider_id();
            if let Err(e) = self.send_to_backend(backend, &provider_id, PlayerCommand::Stop).await {
                warn!(backend = %backend, error = %e, "Backend failed to stop");
            }
        }

        state.reset();
        info!("Playback stopped");
        self.broadcast(&state);
        true
    }

    /// Seek within the current track.
    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let backend = state.active_backend.ok_or(PlaybackError::NothingToPlay)?;

        let provider_id = state.provider_id();
        self.send_to_backend(backend, &provider_id, PlayerCommand::Seek { position_ms })
            .await?;
        if let Some(entry) = state.now_playing.as_mut() {
            entry.position = position_ms;
        }
        self.broadcast(&state);
        Ok(())
    }

    pub async fn set_loop_state(&self, loop_state: LoopState) {
        let mut state = self.state.lock().await;
        state.loop_state = loop_state;
        debug!(loop_state = ?loop_state, "Loop state changed");
        self.broadcast(&state);
    }

    pub async fn set_shuffle(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        state.shuffle = enabled;
        debug!(shuffle = enabled, "Shuffle changed");
        self.broadcast(&state);
    }

    /// Run a transport command from a UI surface.
    pub async fn handle_command(&self, command: PlayerCommand) -> Result<()> {
        debug!(%command, "Control request");
        match command {
            PlayerCommand::Play => self.play().await,
            PlayerCommand::Pause => self.pause().await,
            PlayerCommand::Resume => self.resume().await,
            PlayerCommand::Stop => {
                self.stop().await;
                Ok(())
            }
            PlayerCommand::Next => self.play_next().await.map(|_| ()),
            PlayerCommand::Previous => self.play_prev().await.map(|_| ()),
            PlayerCommand::Seek { position_ms } => self.seek(position_ms).await,
            PlayerCommand::SetLoop { state } => {
                self.set_loop_state(state).await;
                Ok(())
            }
            PlayerCommand::SetShuffle { enabled } => {
                self.set_shuffle(enabled).await;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Status updates
    // ------------------------------------------------------------------

    /// Apply a status report from a backend or provider.
    ///
    /// | Status | Effect |
    /// |---|---|
    /// | `Disambiguation` | de-duplicated append to the search results |
    /// | `Queued*` | insert into the queue at `index`, or append |
    /// | `Playing*` | record status and backend |
    /// | `Paused`, `Buffering`, `Stalled` | record status |
    /// | `EndOfMedia` | autoplay the next track, or stop |
    pub async fn status_update(&self, entry: MediaEntry, index: Option<usize>) -> Result<()> {
        let mut state = self.state.lock().await;
        let status = entry.status;

        match status {
            TrackState::Disambiguation => {
                if !state.search_playlist.add_unique(entry.into()) {
                    debug!("Search result already listed");
                }
                return Ok(());
            }
            TrackState::Paused => {
                state.player_state = PlayerState::Paused;
                state.set_status(status);
            }
            TrackState::Buffering | TrackState::Stalled => {
                state.set_status(status);
            }
            TrackState::EndOfMedia => {
                return self.end_of_media(&mut state).await;
            }
            queued if queued.is_queued() => {
                state.playlist.add_entry(entry.into(), index);
                return Ok(());
            }
            playing => {
                state.player_state = PlayerState::Playing;
                state.active_backend = playing.backend();
                match state.now_playing.as_mut() {
                    Some(current) if current.uri == entry.uri => {
                        current.position = entry.position;
                        current.status = playing;
                    }
                    _ => state.now_playing = Some(entry),
                }
                state.status = playing;
            }
        }

        self.broadcast(&state);
        Ok(())
    }

    async fn end_of_media(&self, state: &mut ArbiterState) -> Result<()> {
        state.set_status(TrackState::EndOfMedia);

        if self.config.autoplay {
            match self.advance(state, Direction::Next, true).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    state.reset();
                    self.broadcast(state);
                    return Err(e);
                }
            }
        }

        debug!("End of media, nothing left to play");
        state.reset();
        self.broadcast(state);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn pause_current(&self, state: &mut ArbiterState) {
        if state.player_state != PlayerState::Playing {
            return;
        }
        if let Some(backend) = state.active_backend {
            let provider_id = state.provider_id();
            if let Err(e) = self.send_to_backend(backend, &provider_id, PlayerCommand::Pause).await {
                warn!(backend = %backend, error = %e, "Failed to pause previous playback");
            }
        }
        state.player_state = PlayerState::Paused;
        state.set_status(TrackState::Paused);
    }

    /// Play now playing; on failure put `previous` back so the state keeps
    /// describing what the active backend holds.
    async fn play_or_restore(&self, state: &mut ArbiterState, previous: Option<MediaEntry>) -> Result<()> {
        if let Err(e) = self.play_locked(state).await {
            warn!(error = %e, "Playback failed, keeping previous entry");
            state.now_playing = previous;
            self.broadcast(state);
            return Err(e);
        }
        Ok(())
    }

    async fn forward_to_provider(&self, state: &ArbiterState, command: PlayerCommand) -> Result<bool> {
        if state.active_backend != Some(Backend::Skill) {
            return Ok(false);
        }
        let provider_id = state.provider_id();
        debug!(skill_id = %provider_id, %command, "Forwarding to provider");
        self.send_to_backend(Backend::Skill, &provider_id, command)
            .await?;
        Ok(true)
    }

    async fn play_locked(&self, state: &mut ArbiterState) -> Result<()> {
        let entry = match state.now_playing.clone() {
            Some(entry) => entry,
            None => {
                let item = state
                    .playlist
                    .current_track()
                    .or_else(|| state.search_playlist.current_track())
                    .cloned()
                    .ok_or(PlaybackError::NothingToPlay)?;
                self.materialize(item).await?
            }
        };

        let (mut entry, backend) = self.dispatch(entry).await?;
        let status = TrackState::playing(backend);
        entry.status = status;
        info!(
            backend = %backend,
            uri = %loggable_uri(&entry.uri),
            title = %entry.title,
            "Playback started"
        );

        state.now_playing = Some(entry);
        state.active_backend = Some(backend);
        state.player_state = PlayerState::Playing;
        state.status = status;
        self.broadcast(state);
        Ok(())
    }

    /// Move through the current playlist and play the new track.
    ///
    /// `auto` marks an end-of-media advance, where `RepeatTrack` replays the
    /// same track instead of moving.
    async fn advance(&self, state: &mut ArbiterState, direction: Direction, auto: bool) -> Result<bool> {
        if auto && state.loop_state == LoopState::RepeatTrack && state.now_playing.is_some() {
            debug!("Repeating current track");
            self.play_locked(state).await?;
            return Ok(true);
        }

        let shuffle = state.shuffle;
        let wrap = state.loop_state == LoopState::Repeat;
        let playlist = state.current_playlist();
        let len = playlist.len();
        if len < 2 {
            debug!(len, "Not enough tracks to move");
            return Ok(false);
        }

        let moved = if shuffle {
            let mut index = rand::rng().random_range(0..len - 1);
            if index >= playlist.position() {
                index += 1;
            }
            playlist.goto_track(index)
        } else {
            match direction {
                Direction::Next => {
                    playlist.next_track() || (wrap && playlist.goto_track(0))
                }
                Direction::Previous => {
                    playlist.prev_track() || (wrap && playlist.goto_track(len - 1))
                }
            }
        };
        if !moved {
            debug!(direction = ?direction, "Already at the playlist boundary");
            return Ok(false);
        }

        let item = playlist
            .current_track()
            .cloned()
            .ok_or(PlaybackError::NothingToPlay)?;
        let entry = self.materialize(item).await?;
        let previous = state.now_playing.replace(entry);
        self.play_or_restore(state, previous).await?;
        Ok(true)
    }

    /// Turn a queued item into a concrete entry. Plugin streams are resolved
    /// here; nested playlists yield their current track.
    async fn materialize(&self, item: MediaItem) -> Result<MediaEntry> {
        let mut item = item;
        loop {
            match item {
                MediaItem::Entry(entry) => return Ok(entry),
                MediaItem::Stream(stream) => {
                    let resolved = self
                        .resolver
                        .resolve(&stream.reference())
                        .await
                        .map_err(PlaybackError::StreamResolution)?;
                    return Ok(stream.into_entry(resolved));
                }
                MediaItem::Playlist(playlist) => {
                    item = playlist
                        .current_track()
                        .cloned()
                        .ok_or(PlaybackError::NothingToPlay)?;
                }
            }
        }
    }

    async fn resolve(&self, entry: &mut MediaEntry) -> Result<()> {
        let resolved = self
            .resolver
            .resolve(&entry.uri)
            .await
            .map_err(PlaybackError::StreamResolution)?;
        debug!(uri = %loggable_uri(&resolved.uri), "Stream resolved");
        entry.apply_resolved(resolved);
        Ok(())
    }

    async fn dispatch(&self, mut entry: MediaEntry) -> Result<(MediaEntry, Backend)> {
        match entry.playback_type {
            PlaybackType::Undefined => Err(PlaybackError::InvalidPlaybackType {
                uri: loggable_uri(&entry.uri),
            }),
            PlaybackType::Skill => {
                self.bus
                    .emit(CoreEvent::Player(PlayerEvent::ProviderCommand {
                        skill_id: entry.provider_id.clone(),
                        command: PlayerCommand::Play,
                        entry: Some(entry.clone()),
                    }))
                    .ok();
                Ok((entry, Backend::Skill))
            }
            PlaybackType::Audio => {
                self.resolve(&mut entry).await?;
                match (&self.gui, &self.audio) {
                    (Some(gui), audio) if self.config.prefer_gui_audio || audio.is_none() => {
                        self.show_player(gui.as_ref(), &entry, Backend::Audio).await?;
                        Ok((entry, Backend::Audio))
                    }
                    (_, Some(audio)) => {
                        audio.play(&entry.uri).await?;
                        Ok((entry, Backend::AudioService))
                    }
                    _ => Err(PlaybackError::BackendUnavailable(Backend::AudioService)),
                }
            }
            PlaybackType::Video => {
                let gui = self
                    .gui
                    .as_ref()
                    .ok_or(PlaybackError::BackendUnavailable(Backend::Video))?;
                self.resolve(&mut entry).await?;
                self.show_player(gui.as_ref(), &entry, Backend::Video).await?;
                Ok((entry, Backend::Video))
            }
            PlaybackType::Webview => {
                let gui = self
                    .gui
                    .as_ref()
                    .ok_or(PlaybackError::BackendUnavailable(Backend::Webview))?;
                self.show_player(gui.as_ref(), &entry, Backend::Webview).await?;
                Ok((entry, Backend::Webview))
            }
        }
    }

    async fn show_player(&self, gui: &dyn GuiSurface, entry: &MediaEntry, backend: Backend) -> Result<()> {
        gui.set_session_data(SESSION_KEY_NOW_PLAYING, entry.as_dict());
        gui.set_session_data(SESSION_KEY_STATUS, status_value(TrackState::playing(backend)));
        gui.show_page(page_for(backend)).await?;
        Ok(())
    }

    async fn send_to_backend(&self, backend: Backend, provider_id: &str, command: PlayerCommand) -> Result<()> {
        match backend {
            Backend::Skill => {
                self.bus
                    .emit(CoreEvent::Player(PlayerEvent::ProviderCommand {
                        skill_id: provider_id.to_string(),
                        command,
                        entry: None,
                    }))
                    .ok();
            }
            Backend::AudioService => {
                let audio = self
                    .audio
                    .as_ref()
                    .ok_or(PlaybackError::BackendUnavailable(backend))?;
                match command {
                    PlayerCommand::Pause => audio.pause().await?,
                    PlayerCommand::Resume => audio.resume().await?,
                    PlayerCommand::Stop => audio.stop().await?,
                    PlayerCommand::Seek { position_ms } => {
                        audio.seek(Duration::from_millis(position_ms)).await?
                    }
                    _ => {}
                }
            }
            Backend::Video | Backend::Audio | Backend::Webview => {
                let gui = self
                    .gui
                    .as_ref()
                    .ok_or(PlaybackError::BackendUnavailable(backend))?;
                match command {
                    PlayerCommand::Pause => {
                        gui.set_session_data(SESSION_KEY_STATUS, status_value(TrackState::Paused))
                    }
                    PlayerCommand::Resume => gui.set_session_data(
                        SESSION_KEY_STATUS,
                        status_value(TrackState::playing(backend)),
                    ),
                    PlayerCommand::Stop => {
                        gui.set_session_data(SESSION_KEY_STATUS, status_value(TrackState::EndOfMedia));
                        gui.remove_pages(&[page_for(backend).to_string()]).await?;
                    }
                    PlayerCommand::Seek { position_ms } => {
                        gui.set_session_data(SESSION_KEY_POSITION, Value::from(position_ms))
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn broadcast(&self, state: &ArbiterState) {
        self.bus
            .emit(CoreEvent::Player(PlayerEvent::StateChanged {
                player_state: state.player_state,
                status: state.status,
                backend: state.active_backend,
                now_playing: state.now_playing.clone(),
            }))
            .ok();
    }

    // ------------------------------------------------------------------
    // Bus listener
    // ------------------------------------------------------------------

    /// Apply status updates and control requests from the bus until `token`
    /// is cancelled.
    pub fn listen(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let arbiter = Arc::clone(self);
        let mut events = self.bus.stream().filter(|event| {
            matches!(
                event,
                CoreEvent::Player(PlayerEvent::StatusUpdate { .. })
                    | CoreEvent::Player(PlayerEvent::Control { .. })
            )
        });

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok(CoreEvent::Player(PlayerEvent::StatusUpdate { entry, index })) => {
                        if let Err(e) = arbiter.status_update(entry, index).await {
                            warn!(error = %e, "Status update failed");
                        }
                    }
                    Ok(CoreEvent::Player(PlayerEvent::Control { command })) => {
                        if let Err(e) = arbiter.handle_command(command).await {
                            warn!(%command, error = %e, "Control request failed");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Playback listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Playback listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::ResolvedStream;
    use core_media::PluginStream;
    use mockall::mock;

    mock! {
        Resolver {}

        #[async_trait::async_trait]
        impl StreamResolver for Resolver {
            async fn resolve(&self, uri: &str) -> BridgeResult<ResolvedStream>;
        }
    }

    mock! {
        Audio {}

        #[async_trait::async_trait]
        impl AudioService for Audio {
            async fn play(&self, uri: &str) -> BridgeResult<()>;
            async fn pause(&self) -> BridgeResult<()>;
            async fn resume(&self) -> BridgeResult<()>;
            async fn stop(&self) -> BridgeResult<()>;
            async fn seek(&self, position: Duration) -> BridgeResult<()>;
        }
    }

    mock! {
        Gui {}

        #[async_trait::async_trait]
        impl GuiSurface for Gui {
            async fn show_page(&self, page: &str) -> BridgeResult<()>;
            async fn remove_pages(&self, pages: &[String]) -> BridgeResult<()>;
            fn set_session_data(&self, key: &str, value: Value);
            fn session_data(&self, key: &str) -> Option<Value>;
        }
    }

    fn echo_resolver() -> MockResolver {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .returning(|uri| Ok(ResolvedStream::new(format!("{}?resolved", uri))));
        resolver
    }

    fn quiet_audio() -> MockAudio {
        let mut audio = MockAudio::new();
        audio.expect_play().returning(|_| Ok(()));
        audio.expect_pause().returning(|| Ok(()));
        audio.expect_resume().returning(|| Ok(()));
        audio.expect_stop().returning(|| Ok(()));
        audio.expect_seek().returning(|_| Ok(()));
        audio
    }

    fn quiet_gui() -> MockGui {
        let mut gui = MockGui::new();
        gui.expect_show_page().returning(|_| Ok(()));
        gui.expect_remove_pages().returning(|_| Ok(()));
        gui.expect_set_session_data().return_const(());
        gui.expect_session_data().returning(|_| None);
        gui
    }

    fn headless(audio: MockAudio) -> PlaybackArbiter {
        PlaybackArbiter::new(EventBus::new(64), Arc::new(echo_resolver()), PlayerConfig::default())
            .with_audio_service(Arc::new(audio))
    }

    fn audio_entry(uri: &str) -> MediaEntry {
        MediaEntry::new(uri)
            .with_title(uri)
            .with_playback_type(PlaybackType::Audio)
    }

    fn items(uris: &[&str]) -> Vec<MediaItem> {
        uris.iter().map(|uri| MediaItem::from(audio_entry(uri))).collect()
    }

    #[tokio::test]
    async fn test_initial_state_is_end_of_media() {
        let arbiter = headless(quiet_audio());
        let state = arbiter.snapshot().await;
        assert_eq!(state.status, TrackState::EndOfMedia);
        assert_eq!(state.player_state, PlayerState::Stopped);
        assert!(state.now_playing.is_none());
    }

    #[tokio::test]
    async fn test_audio_goes_to_audio_service_when_headless() {
        let mut audio = quiet_audio();
        audio.checkpoint();
        audio
            .expect_play()
            .withf(|uri| uri == "http://song?resolved")
            .times(1)
            .returning(|_| Ok(()));

        let arbiter = headless(audio);
        arbiter.play_media(audio_entry("http://song"), None, None).await.unwrap();

        let state = arbiter.snapshot().await;
        assert_eq!(state.status, TrackState::PlayingAudioService);
        assert_eq!(state.active_backend, Some(Backend::AudioService));
        assert_eq!(state.now_playing.unwrap().uri, "http://song?resolved");
    }

    #[tokio::test]
    async fn test_audio_prefers_gui_player() {
        let mut gui = MockGui::new();
        gui.expect_set_session_data().return_const(());
        gui.expect_show_page()
            .withf(|page| page == PAGE_AUDIO_PLAYER)
            .times(1)
            .returning(|_| Ok(()));
        let mut audio = MockAudio::new();
        audio.expect_play().never();

        let arbiter = PlaybackArbiter::new(
            EventBus::new(64),
            Arc::new(echo_resolver()),
            PlayerConfig::default(),
        )
        .with_audio_service(Arc::new(audio))
        .with_gui(Arc::new(gui));

        arbiter.play_media(audio_entry("http://song"), None, None).await.unwrap();
        assert_eq!(arbiter.snapshot().await.active_backend, Some(Backend::Audio));
    }

    #[tokio::test]
    async fn test_video_without_gui_is_unavailable() {
        let arbiter = headless(quiet_audio());
        let entry = MediaEntry::new("http://movie").with_playback_type(PlaybackType::Video);
        let err = arbiter.play_media(entry, None, None).await.unwrap_err();
        assert!(matches!(err, PlaybackError::BackendUnavailable(Backend::Video)));
    }

    #[tokio::test]
    async fn test_undefined_playback_type_is_rejected() {
        let arbiter = headless(quiet_audio());
        let err = arbiter
            .play_media(MediaEntry::new("http://what"), None, None)
            .await
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(arbiter.snapshot().await.status, TrackState::EndOfMedia);
    }

    #[tokio::test]
    async fn test_skill_playback_emits_provider_command() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().never();
        let arbiter = PlaybackArbiter::new(bus, Arc::new(resolver), PlayerConfig::default());

        let entry = MediaEntry::new("callback://skill-npr")
            .with_provider("skill-npr")
            .with_playback_type(PlaybackType::Skill);
        arbiter.play_media(entry, None, None).await.unwrap();

        let mut commanded = false;
        while let Ok(event) = rx.try_recv() {
            if let CoreEvent::Player(PlayerEvent::ProviderCommand { skill_id, command, entry }) = event {
                assert_eq!(skill_id, "skill-npr");
                assert_eq!(command, PlayerCommand::Play);
                assert!(entry.is_some());
                commanded = true;
            }
        }
        assert!(commanded);
        assert_eq!(arbiter.snapshot().await.status, TrackState::PlayingSkill);
    }

    #[tokio::test]
    async fn test_next_and_previous_go_to_the_playing_provider() {
        let bus = EventBus::new(64);
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().never();
        let arbiter = PlaybackArbiter::new(bus.clone(), Arc::new(resolver), PlayerConfig::default());

        let entry = MediaEntry::new("callback://skill-x")
            .with_provider("skill-x")
            .with_playback_type(PlaybackType::Skill);
        arbiter.play_media(entry, None, None).await.unwrap();

        let mut rx = bus.subscribe();
        assert!(arbiter.play_next().await.unwrap());
        assert!(arbiter.play_prev().await.unwrap());

        let mut commands = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CoreEvent::Player(PlayerEvent::ProviderCommand { skill_id, command, entry }) = event {
                assert!(entry.is_none());
                commands.push((skill_id, command));
            }
        }
        assert_eq!(
            commands,
            vec![
                ("skill-x".to_string(), PlayerCommand::Next),
                ("skill-x".to_string(), PlayerCommand::Previous),
            ]
        );
        assert_eq!(arbiter.snapshot().await.status, TrackState::PlayingSkill);
    }

    #[tokio::test]
    async fn test_search_results_cursor_follows_the_selected_entry() {
        let arbiter = headless(quiet_audio());
        let results = items(&["http://a", "http://b", "http://c"]);

        arbiter
            .play_media(audio_entry("http://b"), Some(results.clone()), None)
            .await
            .unwrap();
        assert_eq!(arbiter.snapshot().await.search_playlist.position(), 1);

        assert!(arbiter.play_next().await.unwrap());
        assert_eq!(
            arbiter.snapshot().await.now_playing.unwrap().uri,
            "http://c?resolved"
        );

        arbiter
            .play_item(MediaItem::from(audio_entry("http://a")), Some(results))
            .await
            .unwrap();
        assert_eq!(arbiter.snapshot().await.search_playlist.position(), 0);
    }

    #[tokio::test]
    async fn test_failed_play_keeps_previous_entry() {
        let arbiter = PlaybackArbiter::new(
            EventBus::new(64),
            Arc::new(echo_resolver()),
            PlayerConfig::default(),
        )
        .with_gui(Arc::new(quiet_gui()));

        let movie = MediaEntry::new("http://movie").with_playback_type(PlaybackType::Video);
        arbiter.play_media(movie, None, None).await.unwrap();

        let err = arbiter
            .play_media(MediaEntry::new("http://bad"), None, None)
            .await
            .unwrap_err();
        assert!(err.is_contract_violation());

        let state = arbiter.snapshot().await;
        assert_eq!(state.now_playing.unwrap().uri, "http://movie?resolved");
        assert_eq!(state.active_backend, Some(Backend::Video));
        assert_eq!(state.status, TrackState::Paused);

        arbiter.resume().await.unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.status, TrackState::PlayingVideo);
        let now_playing = state.now_playing.unwrap();
        assert_eq!(now_playing.uri, "http://movie?resolved");
        assert_eq!(now_playing.playback_type, PlaybackType::Video);
    }

    #[tokio::test]
    async fn test_plugin_stream_is_resolved_through_extractor() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .withf(|uri| uri == "youtube//abc")
            .times(1)
            .returning(|_| Ok(ResolvedStream::new("https://cdn/abc.m4a").with_title("Resolved")));
        resolver
            .expect_resolve()
            .withf(|uri| uri == "https://cdn/abc.m4a")
            .returning(|uri| Ok(ResolvedStream::new(uri)));
        let arbiter = PlaybackArbiter::new(EventBus::new(64), Arc::new(resolver), PlayerConfig::default())
            .with_audio_service(Arc::new(quiet_audio()));

        {
            let mut state = arbiter.state.lock().await;
            state.playlist.replace(vec![
                PluginStream::new("youtube", "abc")
                    .with_playback_type(PlaybackType::Audio)
                    .into(),
            ]);
        }

        arbiter.play().await.unwrap();
        let now_playing = arbiter.snapshot().await.now_playing.unwrap();
        assert_eq!(now_playing.uri, "https://cdn/abc.m4a");
        assert_eq!(now_playing.title, "Resolved");
    }

    #[tokio::test]
    async fn test_resolution_failure_is_reported() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|uri| {
            Err(BridgeError::ResolutionFailed {
                uri: uri.to_string(),
                message: "geo-blocked".to_string(),
            })
        });
        let arbiter = PlaybackArbiter::new(EventBus::new(64), Arc::new(resolver), PlayerConfig::default())
            .with_audio_service(Arc::new(quiet_audio()));

        let err = arbiter.play_media(audio_entry("http://x"), None, None).await.unwrap_err();
        assert!(matches!(err, PlaybackError::StreamResolution(_)));
    }

    #[tokio::test]
    async fn test_play_item_queues_playlist() {
        let arbiter = headless(quiet_audio());
        let mut album = Playlist::from_items(items(&["one", "two", "three"]));
        album.title = "Album".to_string();
        album.goto_track(1);

        arbiter.play_item(album.into(), None).await.unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.playlist.len(), 3);
        assert_eq!(state.now_playing.unwrap().title, "two");
        assert_eq!(state.player_state, PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_play_without_anything_queued() {
        let arbiter = headless(quiet_audio());
        assert!(matches!(arbiter.play().await, Err(PlaybackError::NothingToPlay)));
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let arbiter = headless(quiet_audio());
        arbiter.play_media(audio_entry("http://song"), None, None).await.unwrap();

        assert!(arbiter.stop().await);
        assert!(!arbiter.stop().await);
        let state = arbiter.snapshot().await;
        assert_eq!(state.status, TrackState::EndOfMedia);
        assert!(state.active_backend.is_none());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let arbiter = headless(quiet_audio());
        arbiter.play_media(audio_entry("http://song"), None, None).await.unwrap();

        arbiter.pause().await.unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.status, TrackState::Paused);
        assert_eq!(state.player_state, PlayerState::Paused);

        arbiter.resume().await.unwrap();
        assert_eq!(arbiter.snapshot().await.status, TrackState::PlayingAudioService);
    }

    #[tokio::test]
    async fn test_resume_without_backend_guesses_video() {
        let mut gui = quiet_gui();
        gui.checkpoint();
        gui.expect_set_session_data()
            .withf(|key, _| key == SESSION_KEY_STATUS)
            .times(1)
            .return_const(());
        let arbiter = PlaybackArbiter::new(
            EventBus::new(64),
            Arc::new(echo_resolver()),
            PlayerConfig::default(),
        )
        .with_gui(Arc::new(gui));

        arbiter.resume().await.unwrap();
        assert_eq!(arbiter.snapshot().await.active_backend, Some(Backend::Video));
    }

    #[tokio::test]
    async fn test_play_next_on_single_entry_is_noop() {
        let arbiter = headless(quiet_audio());
        let entry = audio_entry("http://only");
        arbiter
            .play_media(entry.clone(), None, Some(vec![entry.into()]))
            .await
            .unwrap();
        let before = arbiter.snapshot().await;

        assert!(!arbiter.play_next().await.unwrap());
        let after = arbiter.snapshot().await;
        assert_eq!(after.status, before.status);
        assert_eq!(after.playlist.position(), 0);
    }

    #[tokio::test]
    async fn test_next_and_previous_respect_boundaries() {
        let arbiter = headless(quiet_audio());
        let queue = items(&["a", "b", "c"]);
        arbiter
            .play_media(audio_entry("b"), None, Some(queue))
            .await
            .unwrap();
        assert_eq!(arbiter.snapshot().await.playlist.position(), 1);

        assert!(arbiter.play_next().await.unwrap());
        assert!(!arbiter.play_next().await.unwrap());
        let state = arbiter.snapshot().await;
        assert_eq!(state.playlist.position(), 2);
        assert_eq!(state.now_playing.unwrap().title, "c");

        assert!(arbiter.play_prev().await.unwrap());
        assert!(arbiter.play_prev().await.unwrap());
        assert!(!arbiter.play_prev().await.unwrap());
        assert_eq!(arbiter.snapshot().await.now_playing.unwrap().title, "a");
    }

    #[tokio::test]
    async fn test_repeat_wraps_around() {
        let arbiter = headless(quiet_audio());
        arbiter
            .play_media(audio_entry("b"), None, Some(items(&["a", "b"])))
            .await
            .unwrap();
        arbiter.set_loop_state(LoopState::Repeat).await;

        assert!(arbiter.play_next().await.unwrap());
        assert_eq!(arbiter.snapshot().await.now_playing.unwrap().title, "a");
    }

    #[tokio::test]
    async fn test_shuffle_never_repeats_current() {
        let arbiter = headless(quiet_audio());
        arbiter
            .play_media(audio_entry("a"), None, Some(items(&["a", "b", "c", "d"])))
            .await
            .unwrap();
        arbiter.set_shuffle(true).await;

        for _ in 0..20 {
            let before = arbiter.snapshot().await.playlist.position();
            assert!(arbiter.play_next().await.unwrap());
            assert_ne!(arbiter.snapshot().await.playlist.position(), before);
        }
    }

    #[tokio::test]
    async fn test_status_update_table() {
        let arbiter = headless(quiet_audio());

        let candidate = audio_entry("cand").with_status(TrackState::Disambiguation);
        arbiter.status_update(candidate.clone(), None).await.unwrap();
        arbiter.status_update(candidate, None).await.unwrap();
        assert_eq!(arbiter.snapshot().await.search_playlist.len(), 1);

        arbiter
            .status_update(audio_entry("q1").with_status(TrackState::QueuedAudio), None)
            .await
            .unwrap();
        arbiter
            .status_update(audio_entry("q0").with_status(TrackState::QueuedAudio), Some(0))
            .await
            .unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.playlist.len(), 2);
        assert_eq!(state.playlist.entries()[0].title(), "q0");

        arbiter
            .status_update(audio_entry("q0").with_status(TrackState::PlayingVideo), None)
            .await
            .unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.active_backend, Some(Backend::Video));
        assert_eq!(state.player_state, PlayerState::Playing);

        arbiter
            .status_update(audio_entry("q0").with_status(TrackState::Buffering), None)
            .await
            .unwrap();
        assert_eq!(arbiter.snapshot().await.status, TrackState::Buffering);
    }

    #[tokio::test]
    async fn test_end_of_media_autoplays_next() {
        let arbiter = headless(quiet_audio());
        arbiter
            .play_media(audio_entry("a"), None, Some(items(&["a", "b"])))
            .await
            .unwrap();

        arbiter
            .status_update(audio_entry("a").with_status(TrackState::EndOfMedia), None)
            .await
            .unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.now_playing.unwrap().title, "b");
        assert_eq!(state.status, TrackState::PlayingAudioService);

        arbiter
            .status_update(audio_entry("b").with_status(TrackState::EndOfMedia), None)
            .await
            .unwrap();
        let state = arbiter.snapshot().await;
        assert_eq!(state.status, TrackState::EndOfMedia);
        assert_eq!(state.player_state, PlayerState::Stopped);
    }

    #[tokio::test]
    async fn test_seek_updates_position() {
        let mut audio = quiet_audio();
        audio.checkpoint();
        audio.expect_play().returning(|_| Ok(()));
        audio
            .expect_seek()
            .withf(|position| *position == Duration::from_secs(30))
            .times(1)
            .returning(|_| Ok(()));
        let arbiter = headless(audio);

        assert!(arbiter.seek(1_000).await.is_err());
        arbiter.play_media(audio_entry("a"), None, None).await.unwrap();
        arbiter.seek(30_000).await.unwrap();
        assert_eq!(arbiter.snapshot().await.now_playing.unwrap().position, 30_000);
    }

    #[tokio::test]
    async fn test_listener_applies_control_requests() {
        let bus = EventBus::new(64);
        let arbiter = Arc::new(
            PlaybackArbiter::new(bus.clone(), Arc::new(echo_resolver()), PlayerConfig::default())
                .with_audio_service(Arc::new(quiet_audio())),
        );
        let token = CancellationToken::new();
        let handle = arbiter.listen(token.clone());

        arbiter.play_media(audio_entry("a"), None, None).await.unwrap();
        bus.emit(CoreEvent::Player(PlayerEvent::Control {
            command: PlayerCommand::Pause,
        }))
        .ok();

        for _ in 0..50 {
            if arbiter.snapshot().await.player_state == PlayerState::Paused {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(arbiter.snapshot().await.player_state, PlayerState::Paused);

        token.cancel();
        handle.await.unwrap();
    }
}
