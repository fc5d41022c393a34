//! Room: one emulator core shared by a group of peers.
//!
//! A room is split in two halves:
//! - [`Room`], a cheap-to-clone handle. Peer membership and input live
//!   behind it and are touched directly by callers.
//! - The driver, a Tokio task that owns the emulator core. It brings the
//!   core up, serves save/load requests sent over a command channel and
//!   tears everything down on shutdown. Only the driver calls into the
//!   core, always from a blocking thread.
//!
//! The driver publishes the room's [`RoomState`] on a watch channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cloudplay_protocol::{AudioBlock, GameFrame, InputEvent, RoomId};
use cloudplay_session::{PeerSession, SessionError, SessionRegistry};
use cloudplay_transport::FrameImportListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{CoreConfig, GameMetadata, RoomState, WorkerConfig};
use crate::director::{Director, EmulatorBackend, GameMeta, SaveLocation, SpawnRequest};
use crate::fanout::{run_audio_fanout, run_video_fanout};
use crate::input::{InputSink, poll_input};
use crate::save::SaveCoordinator;
use crate::storage::CloudStorage;
use crate::viewport::{Viewport, output_viewport};
use crate::{DirectorError, RoomError};

type Reply = oneshot::Sender<Result<(), RoomError>>;

/// Requests served by the driver task.
enum CoreCommand {
    Save { reply: Reply },
    Load { reply: Reply },
    ToggleMultitap { reply: Reply },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

struct RoomShared {
    id: RoomId,
    /// Flips to `false` exactly once, in [`Room::close`].
    running: AtomicBool,
    state: Arc<watch::Sender<RoomState>>,
    sessions: Arc<SessionRegistry>,
    input: Arc<InputSink>,
    done: CancellationToken,
    commands: mpsc::UnboundedSender<CoreCommand>,
    span: tracing::Span,
}

/// Handle to a room.
///
/// Clones share the same room. When every handle is dropped without an
/// explicit [`close`](Room::close), the driver tears the room down on its
/// own.
#[derive(Clone)]
pub struct Room {
    shared: Arc<RoomShared>,
}

impl Room {
    /// Opens a room for `game` and starts bringing its core up in the
    /// background. Must be called from within a Tokio runtime.
    ///
    /// An absent or empty `id` is replaced by one generated from the game
    /// name.
    pub fn open<B, S>(
        id: Option<RoomId>,
        game: GameMetadata,
        backend: Arc<B>,
        storage: Arc<S>,
        config: Arc<WorkerConfig>,
    ) -> Self
    where
        B: EmulatorBackend,
        S: CloudStorage,
    {
        let id = id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| RoomId::generate(&game.name));
        let span = tracing::info_span!("room", room = %id.short());
        tracing::info!(parent: &span, game = %game.name, "room opened");

        let (input_tx, input_rx) = mpsc::channel(config.room.input_capacity.max(1));
        let done = CancellationToken::new();
        let sessions = Arc::new(SessionRegistry::new(id.clone(), done.clone()));
        let state = Arc::new(watch::Sender::new(RoomState::Initializing));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = RoomDriver {
            id: id.clone(),
            save: SaveCoordinator::new(id.clone(), storage),
            game,
            backend,
            config,
            state: Arc::clone(&state),
            sessions: Arc::clone(&sessions),
            done: done.clone(),
            commands: command_rx,
            input: Some(input_rx),
            core: None,
            game_loaded: false,
            import: None,
        };
        tokio::spawn(driver.run().instrument(span.clone()));

        Self {
            shared: Arc::new(RoomShared {
                id,
                running: AtomicBool::new(true),
                state,
                sessions,
                input: Arc::new(InputSink::new(input_tx)),
                done,
                commands,
                span,
            }),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.shared.id
    }

    /// `false` once [`close`](Self::close) has been called.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RoomState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RoomState> {
        self.shared.state.subscribe()
    }

    /// Token cancelled when the room closes.
    pub fn done(&self) -> CancellationToken {
        self.shared.done.clone()
    }

    /// Waits until the driver has released everything.
    pub async fn wait_closed(&self) {
        let mut state = self.subscribe_state();
        let _ = state.wait_for(RoomState::is_terminal).await;
    }

    // -- peers ---------------------------------------------------------------

    /// Registers `peer` and starts forwarding its input.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] after close.
    /// - [`RoomError::Session`] if the peer is already here or in another room.
    pub async fn add_peer(&self, peer: Arc<PeerSession>) -> Result<(), RoomError> {
        if !self.is_running() {
            return Err(RoomError::Closed(self.shared.id.clone()));
        }
        let cancel = match self.shared.sessions.add(Arc::clone(&peer)).await {
            Ok(cancel) => cancel,
            Err(SessionError::ShutDown(id)) => return Err(RoomError::Closed(id)),
            Err(e) => return Err(e.into()),
        };
        let peer_id = peer.id();
        tokio::spawn(
            poll_input(peer, Arc::clone(&self.shared.input), cancel)
                .instrument(self.shared.span.clone()),
        );
        tracing::info!(parent: &self.shared.span, peer = %peer_id, "peer joined");
        Ok(())
    }

    /// Unregisters `peer`, stops its input task and tells the core the
    /// player left. Returns `false` if the peer was not in the room.
    pub async fn remove_peer(&self, peer: &PeerSession) -> bool {
        let removed = self.shared.sessions.remove(peer.id()).await.is_some();
        self.shared.input.offer(InputEvent::detach(peer.id()));
        if removed {
            tracing::info!(parent: &self.shared.span, peer = %peer.id(), "peer left");
        }
        removed
    }

    pub async fn contains_peer(&self, peer: &PeerSession) -> bool {
        self.shared.sessions.contains(peer.id()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.sessions.is_empty().await
    }

    pub async fn peer_count(&self) -> usize {
        self.shared.sessions.len().await
    }

    pub async fn has_active_connection(&self) -> bool {
        self.shared.sessions.has_active_connection().await
    }

    pub fn update_player_index(&self, peer: &PeerSession, index: usize) {
        tracing::info!(parent: &self.shared.span, peer = %peer.id(), index, "player index updated");
        peer.set_player_index(index);
    }

    // -- core operations -----------------------------------------------------

    /// Saves the game in the core and pushes the save to storage.
    pub async fn save_game(&self) -> Result<(), RoomError> {
        self.request(|reply| CoreCommand::Save { reply }).await
    }

    pub async fn load_game(&self) -> Result<(), RoomError> {
        self.request(|reply| CoreCommand::Load { reply }).await
    }

    pub async fn toggle_multitap(&self) -> Result<(), RoomError> {
        self.request(|reply| CoreCommand::ToggleMultitap { reply }).await
    }

    async fn request(&self, command: impl FnOnce(Reply) -> CoreCommand) -> Result<(), RoomError> {
        let closed = || RoomError::Closed(self.shared.id.clone());
        if !self.is_running() {
            return Err(closed());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared
            .commands
            .send(command(reply_tx))
            .map_err(|_| closed())?;
        reply_rx.await.map_err(|_| closed())?
    }

    /// Closes the room. Later calls do nothing.
    ///
    /// Never calls into the core: saving and stopping it happen on the
    /// driver task. Watch [`state`](Self::subscribe_state) or
    /// [`wait_closed`](Self::wait_closed) for completion.
    pub fn close(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _entered = self.shared.span.enter();
        tracing::info!("closing the room");
        advance(&self.shared.state, RoomState::Closing);
        if self.shared.input.close() {
            tracing::debug!("room input closed");
        }
        self.shared.done.cancel();
        let _ = self.shared.commands.send(CoreCommand::Shutdown);
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Returns `true` if `room` exists and has `peer` as a member.
pub async fn peer_in_room(room: Option<&Room>, peer: &PeerSession) -> bool {
    match room {
        Some(room) => room.contains_peer(peer).await,
        None => false,
    }
}

/// Moves `state` to `target` if that is a valid transition.
fn advance(state: &watch::Sender<RoomState>, target: RoomState) -> bool {
    state.send_if_modified(|current| {
        if current.can_transition_to(target) {
            *current = target;
            true
        } else {
            false
        }
    })
}

/// Runs a blocking core call off the async threads, in the current span.
async fn off_runtime<T, F>(f: F) -> Result<T, RoomError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| RoomError::TaskFailed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Owns the emulator core of one room. Runs inside a Tokio task.
struct RoomDriver<B: EmulatorBackend, S> {
    id: RoomId,
    game: GameMetadata,
    backend: Arc<B>,
    save: SaveCoordinator<S>,
    config: Arc<WorkerConfig>,
    state: Arc<watch::Sender<RoomState>>,
    sessions: Arc<SessionRegistry>,
    done: CancellationToken,
    commands: mpsc::UnboundedReceiver<CoreCommand>,
    /// Handed to the core at spawn.
    input: Option<mpsc::Receiver<InputEvent>>,
    core: Option<Arc<B::Director>>,
    /// Set once the core has loaded the game. A core without a game has
    /// nothing worth saving.
    game_loaded: bool,
    import: Option<AbortHandle>,
}

impl<B: EmulatorBackend, S: CloudStorage> RoomDriver<B, S> {
    async fn run(mut self) {
        tracing::info!("room driver started");
        match self.setup().await {
            Ok(()) => {}
            Err(RoomError::Closed(_)) => tracing::info!("room closed during setup"),
            Err(e) => tracing::error!(error = %e, "room setup failed"),
        }

        while let Some(command) = self.commands.recv().await {
            match command {
                CoreCommand::Save { reply } => {
                    let _ = reply.send(self.save_game().await);
                }
                CoreCommand::Load { reply } => {
                    let _ = reply.send(self.call_core(|core| core.load_game()).await);
                }
                CoreCommand::ToggleMultitap { reply } => {
                    let _ = reply.send(self.call_core(|core| core.toggle_multitap()).await);
                }
                CoreCommand::Shutdown => break,
            }
        }

        self.teardown().await;
        tracing::info!("room driver stopped");
    }

    async fn setup(&mut self) -> Result<(), RoomError> {
        self.restore_save().await;
        self.ensure_open()?;

        let (core_name, core) = self.resolve_core()?;
        let (director, video, audio) = self.spawn_core(core_name, core).await?;
        self.ensure_open()?;

        let path = self.game.full_path();
        let core = Arc::clone(&director);
        let meta = off_runtime(move || core.load_metadata(&path)).await??;
        self.game_loaded = true;
        let viewport = output_viewport(&meta, &self.config.emulator);
        tracing::info!(
            base_width = meta.base_width,
            base_height = meta.base_height,
            width = viewport.width,
            height = viewport.height,
            "output viewport"
        );
        self.ensure_open()?;

        let core = Arc::clone(&director);
        off_runtime(move || core.set_viewport(viewport.width, viewport.height)).await?;
        self.ensure_open()?;

        self.start_fanout(video, audio, &meta, viewport);
        self.start_core(director);

        if advance(&self.state, RoomState::Running) {
            tracing::info!("room is running");
        }
        Ok(())
    }

    /// Brings a stored save down to the local save path. Never fatal.
    async fn restore_save(&self) {
        let path = self.save_location().save_path();
        match self.save.restore_to_local(&path).await {
            Ok(true) => tracing::info!(path = %path.display(), "cloud save restored"),
            Ok(false) => tracing::debug!("no cloud save for this room"),
            Err(e) => tracing::warn!(error = %e, "the room is not in the cloud"),
        }
    }

    fn resolve_core(&self) -> Result<(String, CoreConfig), RoomError> {
        let (name, core) = self
            .config
            .emulator
            .core_for(&self.game)
            .ok_or_else(|| RoomError::NoCore(self.game.name.clone()))?;
        Ok((name.to_owned(), core.clone()))
    }

    async fn spawn_core(
        &mut self,
        core_name: String,
        core: CoreConfig,
    ) -> Result<
        (
            Arc<B::Director>,
            Option<mpsc::Receiver<GameFrame>>,
            mpsc::Receiver<AudioBlock>,
        ),
        RoomError,
    > {
        let headless = self.config.encoder.without_game;
        let import = if headless {
            Some(FrameImportListener::bind(&self.id, self.config.encoder.import_framing)?)
        } else {
            None
        };
        let input = self
            .input
            .take()
            .ok_or_else(|| RoomError::CoreUnavailable(self.id.clone()))?;

        let request = SpawnRequest {
            room_id: self.id.clone(),
            core_name: core_name.clone(),
            core,
            with_video: !headless,
            input,
            save: self.save_location(),
        };
        let backend = Arc::clone(&self.backend);
        let spawned = off_runtime(move || backend.spawn(request)).await??;
        tracing::info!(core = %core_name, headless, "emulator core spawned");
        let director = Arc::new(spawned.director);
        self.core = Some(Arc::clone(&director));

        let video = match import {
            Some(listener) => {
                let (frames, task) = listener.spawn();
                self.import = Some(task.abort_handle());
                Some(frames)
            }
            None => spawned.video,
        };
        Ok((director, video, spawned.audio))
    }

    fn start_fanout(
        &self,
        video: Option<mpsc::Receiver<GameFrame>>,
        audio: mpsc::Receiver<AudioBlock>,
        meta: &GameMeta,
        viewport: Viewport,
    ) {
        let encoder = &self.config.encoder;
        match video {
            Some(frames) => {
                let video_encoder =
                    self.backend
                        .video_encoder(viewport.width, viewport.height, &encoder.video);
                tokio::spawn(
                    run_video_fanout(
                        frames,
                        video_encoder,
                        Arc::clone(&self.sessions),
                        encoder.delivery,
                        self.done.clone(),
                    )
                    .in_current_span(),
                );
            }
            None => tracing::warn!("the core has no video output"),
        }

        let audio_encoder = self
            .backend
            .audio_encoder(meta.audio_sample_rate, &encoder.audio);
        tokio::spawn(
            run_audio_fanout(
                audio,
                audio_encoder,
                Duration::from_millis(encoder.audio.frame_ms),
                Arc::clone(&self.sessions),
                encoder.delivery,
                self.done.clone(),
            )
            .in_current_span(),
        );
    }

    /// Runs the core's main loop on a blocking thread.
    fn start_core(&self, director: Arc<B::Director>) {
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            director.start();
            tracing::debug!("core main loop returned");
        });
    }

    async fn save_game(&self) -> Result<(), RoomError> {
        let director = self.director()?;
        self.persist(director).await
    }

    /// Core save, then storage push.
    async fn persist(&self, director: Arc<B::Director>) -> Result<(), RoomError> {
        let path = off_runtime(move || director.save_game().map(|()| director.local_save_path())).await??;
        self.save.push(&path).await?;
        tracing::debug!("cloud save is successful");
        Ok(())
    }

    async fn call_core<F>(&self, call: F) -> Result<(), RoomError>
    where
        F: FnOnce(&B::Director) -> Result<(), DirectorError> + Send + 'static,
    {
        let director = self.director()?;
        off_runtime(move || call(&*director)).await??;
        Ok(())
    }

    async fn teardown(&mut self) {
        advance(&self.state, RoomState::Closing);
        self.done.cancel();
        if let Some(import) = self.import.take() {
            import.abort();
        }

        if let Some(director) = self.core.take() {
            if !self.game_loaded {
                tracing::debug!("the game was never loaded, skipping the save");
            } else if self.is_persisted(&director).await {
                tracing::debug!("saving the game before closing the room");
                if let Err(e) = self.persist(Arc::clone(&director)).await {
                    tracing::error!(error = %e, "couldn't save the game during close");
                }
            }
            match off_runtime(move || director.close()).await {
                Ok(()) => tracing::info!("emulator core closed"),
                Err(e) => tracing::error!(error = %e, "emulator core close failed"),
            }
        }

        let detached = self.sessions.drain().await;
        if !detached.is_empty() {
            tracing::debug!(peers = detached.len(), "peers detached");
        }
        advance(&self.state, RoomState::Closed);
    }

    async fn is_persisted(&self, director: &Arc<B::Director>) -> bool {
        let core = Arc::clone(director);
        match off_runtime(move || core.local_save_path()).await {
            Ok(path) => self.save.is_persisted(&path).await,
            Err(e) => {
                tracing::error!(error = %e, "couldn't locate the local save");
                false
            }
        }
    }

    /// The core, once it has the game loaded.
    fn director(&self) -> Result<Arc<B::Director>, RoomError> {
        self.core
            .clone()
            .filter(|_| self.game_loaded)
            .ok_or_else(|| RoomError::CoreUnavailable(self.id.clone()))
    }

    fn save_location(&self) -> SaveLocation {
        SaveLocation::new(&self.config.emulator.storage, &self.id)
    }

    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.done.is_cancelled() {
            Err(RoomError::Closed(self.id.clone()))
        } else {
            Ok(())
        }
    }
}
