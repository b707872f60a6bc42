//! Cycle de vie d'une connexion slimproto
//!
//! Une session naît d'un `HELO` valide et meurt à la fermeture de la
//! connexion, à l'expiration du délai de lecture ou à l'annulation de son
//! jeton. Toutes les tâches de la session (compositeur, battement de cœur,
//! surveillance de fin de piste) dépendent de ce jeton.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pmodisplay::{Compositor, DisplayHandle, TextRenderer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, SlimError};
use crate::ir::IrAction;
use crate::listener::SlimServer;
use crate::model::PlayerModel;
use crate::player::SlimPlayer;
use crate::protocol::{ClientMessage, Helo, SlimCodec, StreamCommand};
use crate::queue::{PlaybackQueue, PlaybackTarget, QueueSnapshot};
use crate::registry::{PlayerStatus, SlimEvent, SlimRegistry};
use crate::resolver::TrackResolver;
use crate::track::Track;

/// Session d'un lecteur connecté
pub struct SlimSession {
    player: Arc<SlimPlayer>,
    queue: Arc<PlaybackQueue>,
    display: DisplayHandle,
    resolver: Arc<dyn TrackResolver>,
    token: CancellationToken,
}

impl SlimSession {
    pub fn id(&self) -> &str {
        self.player.id()
    }

    pub fn player(&self) -> &Arc<SlimPlayer> {
        &self.player
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.queue
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Demande la fermeture de la session.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn status(&self) -> PlayerStatus {
        let snapshot = self.queue.snapshot();
        PlayerStatus {
            id: self.player.id().to_string(),
            name: self.player.name(),
            model: self.player.model(),
            firmware: self.player.firmware(),
            state: snapshot.state,
            index: snapshot.index,
            queue_len: snapshot.len,
            current: snapshot.current,
            elapsed: snapshot.elapsed,
            volume: self.player.volume(),
        }
    }

    pub fn announce(&self, text: &str, duration: Duration) -> bool {
        self.display.announce(text, duration)
    }

    /// Règle le volume et l'affiche brièvement.
    pub async fn set_volume(&self, level: i32) -> Result<u8> {
        let level = self.player.set_volume(level).await?;
        self.announce(
            &format!("Volume = {}/100", level),
            self.player.settings().announce_duration,
        );
        Ok(level)
    }

    /// Joue `start_track` tout de suite. Pour une file de type `playlist`,
    /// la liste complète est récupérée en tâche de fond puis adoptée comme
    /// contexte de lecture.
    pub async fn play_request(
        self: &Arc<Self>,
        queue_type: &str,
        queue_id: Option<&str>,
        start_track: Track,
    ) {
        info!(player = %self.id(), track = %start_track.video_id, queue_type, "▶️ play request");
        self.queue.play(vec![start_track], 0).await;

        if queue_type != "playlist" {
            return;
        }
        let Some(playlist_id) = queue_id.map(str::to_string) else {
            warn!(player = %self.id(), "playlist request without queue id");
            return;
        };

        let session = Arc::clone(self);
        tokio::spawn(async move {
            let playlist = tokio::select! {
                _ = session.token.cancelled() => return,
                playlist = session.resolver.playlist(&playlist_id) => playlist,
            };
            match playlist {
                Ok(playlist) => {
                    let count = playlist.tracks.len();
                    if session.queue.adopt_context(playlist.tracks) {
                        debug!(player = %session.id(), playlist = %playlist_id, count, "📜 playlist context adopted");
                    } else {
                        debug!(player = %session.id(), playlist = %playlist_id, "current track not in playlist");
                    }
                }
                Err(e) => warn!(player = %session.id(), playlist = %playlist_id, "cannot fetch playlist: {}", e),
            }
        });
    }

    /// Exécute l'action associée à une touche de la télécommande.
    pub async fn perform(self: &Arc<Self>, action: IrAction) -> Result<()> {
        let step = i32::from(self.player.settings().volume_step);
        match action {
            IrAction::VolumeUp => {
                self.set_volume(i32::from(self.player.volume()) + step).await?;
            }
            IrAction::VolumeDown => {
                self.set_volume(i32::from(self.player.volume()) - step).await?;
            }
            IrAction::Next => self.queue.next().await,
            IrAction::Previous => self.queue.previous().await,
            IrAction::PauseToggle => self.queue.toggle_pause().await,
            IrAction::Reset => self.queue.reset().await,
        }
        Ok(())
    }
}

/// Attend le `HELO` initial.
async fn handshake<R>(reader: &mut FramedRead<R, SlimCodec>, timeout: Duration) -> Result<Helo>
where
    R: AsyncRead + Unpin,
{
    let frame = match tokio::time::timeout(timeout, reader.next()).await {
        Err(_) => return Err(SlimError::Timeout("no HELO received".into())),
        Ok(None) => return Err(SlimError::protocol("connection closed before HELO")),
        Ok(Some(frame)) => frame?,
    };
    match ClientMessage::try_from(&frame)? {
        ClientMessage::Helo(helo) => Ok(helo),
        _ => Err(SlimError::protocol(format!(
            "expected HELO, got {}",
            String::from_utf8_lossy(&frame.opcode)
        ))),
    }
}

impl SlimServer {
    /// Sert une connexion de lecteur jusqu'à sa fin.
    pub async fn serve<S>(self: Arc<Self>, stream: S, peer: String) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let settings = self.settings().clone();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, SlimCodec);

        let helo = handshake(&mut reader, settings.handshake_timeout).await?;
        let (model, known) = PlayerModel::from_device_id(helo.device_id);
        if !known {
            warn!(peer = %peer, device_id = helo.device_id, "unknown device id, assuming {}", model.name());
        }
        let name = self
            .player_name(&helo.mac)
            .unwrap_or_else(|| model.name().to_string());
        info!(peer = %peer, mac = %helo.mac, model = model.name(), firmware = helo.firmware, name = %name, "🔌 player connected");

        let token = self.token().child_token();
        let player = Arc::new(SlimPlayer::new(
            helo.mac,
            model,
            helo.firmware,
            name,
            Box::new(write_half),
            self.resolver().clone(),
            settings.clone(),
        ));
        let target: Arc<dyn PlaybackTarget> = player.clone();
        let queue = PlaybackQueue::new(
            target,
            token.child_token(),
            settings.audio.end_of_track_epsilon,
        );

        let renderer = TextRenderer::new(model.display_kind(), self.font(model));
        let (display, compositor) =
            Compositor::new(renderer, settings.display, token.child_token());

        let session = Arc::new(SlimSession {
            player,
            queue,
            display,
            resolver: self.resolver().clone(),
            token,
        });

        let registry = self.registry().clone();
        registry.insert(session.clone());

        spawn_compositor(&session, compositor);
        spawn_heartbeat(&session, settings.heartbeat_interval);
        spawn_status_forwarder(&session, &registry);
        tokio::spawn(
            session
                .queue
                .clone()
                .run_monitor(settings.audio.monitor_interval),
        );

        setup_display(&session, &settings.greeting, settings.greeting_duration);
        if let Err(e) = session.player.set_volume(i32::from(settings.initial_volume)).await {
            warn!(player = %session.id(), "cannot set initial volume: {}", e);
        }

        let result = read_loop(&session, &registry, &mut reader, settings.read_deadline()).await;
        teardown(&session, &registry);
        result
    }
}

/// Empile les couches permanentes puis le message d'accueil.
fn setup_display(session: &Arc<SlimSession>, greeting: &str, greeting_duration: Duration) {
    let display = &session.display;

    display.push(display.clock_source());

    let loading = session.queue.subscribe();
    display.push(
        display
            .text_source("loading", "Loading...")
            .with_enabled(move || loading.borrow().is_loading()),
    );

    let playing = session.queue.subscribe();
    display.push(
        display
            .dynamic_source("now-playing", session.queue.subscribe(), |s: &QueueSnapshot| {
                s.now_playing()
            })
            .with_enabled(move || playing.borrow().is_playing()),
    );

    display.push(
        display
            .text_source("greeting", greeting)
            .with_timeout(greeting_duration),
    );
}

fn spawn_compositor(session: &Arc<SlimSession>, compositor: Compositor) {
    let session = session.clone();
    tokio::spawn(async move {
        if let Err(e) = compositor.run(session.player.as_ref()).await {
            error!(player = %session.id(), "❌ display failed: {}", e);
            session.close();
        }
    });
}

/// `strm t` périodique ; les réponses `STAT` entretiennent le délai de
/// lecture.
fn spawn_heartbeat(session: &Arc<SlimSession>, period: Duration) {
    let session = session.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = session.token.cancelled() => return,
                _ = ticker.tick() => {}
            }
            trace!(player = %session.id(), "💓 heartbeat");
            if let Err(e) = session.player.stream_command(StreamCommand::Status).await {
                warn!(player = %session.id(), "heartbeat failed: {}", e);
                session.close();
                return;
            }
        }
    });
}

fn spawn_status_forwarder(session: &Arc<SlimSession>, registry: &Arc<SlimRegistry>) {
    let session = session.clone();
    let registry = registry.clone();
    let mut updates = session.queue.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = session.token.cancelled() => return,
                changed = updates.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            registry.publish(SlimEvent::StatusChanged {
                status: session.status(),
            });
        }
    });
}

async fn read_loop<R>(
    session: &Arc<SlimSession>,
    registry: &Arc<SlimRegistry>,
    reader: &mut FramedRead<R, SlimCodec>,
    deadline: Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = session.token.cancelled() => {
                debug!(player = %session.id(), "session cancelled");
                return Ok(());
            }
            next = tokio::time::timeout(deadline, reader.next()) => next,
        };
        let frame = match next {
            Err(_) => {
                warn!(player = %session.id(), ?deadline, "⏱️ player silent, dropping session");
                return Err(SlimError::Timeout("read deadline expired".into()));
            }
            Ok(None) => {
                info!(player = %session.id(), "connection closed by player");
                return Ok(());
            }
            Ok(Some(frame)) => frame?,
        };
        handle_message(session, registry, ClientMessage::try_from(&frame)?).await;
    }
}

async fn handle_message(
    session: &Arc<SlimSession>,
    registry: &Arc<SlimRegistry>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Helo(_) => debug!(player = %session.id(), "duplicate HELO ignored"),
        ClientMessage::Stat(stat) => {
            trace!(player = %session.id(), event = %stat.event_str(), "STAT");
            if stat.is_track_started() {
                session.queue.on_track_started();
            }
            let rate = session.player.settings().audio.sample_rate;
            session
                .queue
                .update_elapsed(session.player.model().elapsed(&stat, rate));
        }
        ClientMessage::Ir(ir) => {
            if !registry.debouncer().accept(Instant::now()) {
                trace!(player = %session.id(), "IR repeat dropped");
                return;
            }
            let code = ir.hex();
            let action = IrAction::from_code(&code);
            debug!(player = %session.id(), code = %code, ?action, "📡 IR");
            registry.publish(SlimEvent::RemoteButton {
                id: session.id().to_string(),
                name: session.player.name(),
                code,
                action,
            });
            if let Some(action) = action {
                if let Err(e) = session.perform(action).await {
                    warn!(player = %session.id(), ?action, "IR action failed: {}", e);
                }
            }
        }
        ClientMessage::Other(opcode) => {
            debug!(player = %session.id(), opcode = %opcode, "unhandled message")
        }
    }
}

fn teardown(session: &Arc<SlimSession>, registry: &Arc<SlimRegistry>) {
    registry.remove(session);
    session.queue.shutdown();
    session.player.relay().close();
    session.close();
    info!(player = %session.id(), "👋 session closed");
}
