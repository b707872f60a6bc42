//! File de lecture d'un lecteur
//!
//! Machine à états `Idle → Loading → Playing ⇄ Paused → Idle`. Chaque
//! transition audible arrête le lecteur ou lance une tâche de lecture, puis
//! publie un [`QueueSnapshot`] sur un canal `watch`.
//!
//! Les commandes de transport sont sérialisées : une seule à la fois touche
//! la cible. La tâche de lecture en cours est toujours annulée avant que
//! l'index ne bouge.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::track::Track;

/// En deçà, « précédent » recule d'une piste au lieu de redémarrer.
pub const PREVIOUS_RESTART_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub state: TransportState,
    pub index: Option<usize>,
    pub len: usize,
    pub current: Option<Track>,
    pub elapsed: f64,
}

impl QueueSnapshot {
    pub fn is_loading(&self) -> bool {
        self.state == TransportState::Loading
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Texte « now playing » de la piste courante
    pub fn now_playing(&self) -> String {
        self.current
            .as_ref()
            .map(Track::now_playing_text)
            .unwrap_or_default()
    }
}

/// Ce que la file pilote : le lecteur et sa chaîne audio
#[async_trait]
pub trait PlaybackTarget: Send + Sync {
    /// Prépare et démarre `track`. Doit rendre la main dès que `token`
    /// est annulé.
    async fn start(&self, track: Track, token: CancellationToken) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn unpause(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct QueueState {
    tracks: Vec<Track>,
    index: Option<usize>,
    state: TransportState,
    elapsed: f64,
    job: Option<CancellationToken>,
    job_id: u64,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        let current = match self.state {
            TransportState::Idle => None,
            _ => self.index.and_then(|i| self.tracks.get(i)).cloned(),
        };
        QueueSnapshot {
            state: self.state,
            index: self.index,
            len: self.tracks.len(),
            current,
            elapsed: self.elapsed,
        }
    }

    fn cancel_job(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel();
        }
    }

    fn current_track(&self) -> Option<&Track> {
        self.index.and_then(|i| self.tracks.get(i))
    }
}

pub struct PlaybackQueue {
    state: Mutex<QueueState>,
    /// Sérialise les commandes de transport
    commands: tokio::sync::Mutex<()>,
    target: Arc<dyn PlaybackTarget>,
    snapshots: watch::Sender<QueueSnapshot>,
    token: CancellationToken,
    end_of_track_epsilon: f64,
}

impl PlaybackQueue {
    /// `token` est le parent de toutes les tâches de lecture.
    pub fn new(
        target: Arc<dyn PlaybackTarget>,
        token: CancellationToken,
        end_of_track_epsilon: f64,
    ) -> Arc<Self> {
        let (snapshots, _) = watch::channel(QueueSnapshot::default());
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            commands: tokio::sync::Mutex::new(()),
            target,
            snapshots,
            token,
            end_of_track_epsilon,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.state.lock().snapshot()
    }

    pub fn state(&self) -> TransportState {
        self.state.lock().state
    }

    fn publish(&self, state: &QueueState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Annule la tâche en cours et arrête la sortie du lecteur.
    async fn halt(&self) {
        self.state.lock().cancel_job();
        if let Err(e) = self.target.stop().await {
            warn!("stop failed: {}", e);
        }
    }

    /// Lance la piste `state.index`, état `Loading`.
    fn launch(self: &Arc<Self>, state: &mut QueueState) {
        let Some(track) = state.current_track().cloned() else {
            state.state = TransportState::Idle;
            return;
        };

        let job = self.token.child_token();
        state.job_id += 1;
        state.job = Some(job.clone());
        state.state = TransportState::Loading;
        state.elapsed = 0.0;
        let job_id = state.job_id;

        info!(track = %track.video_id, title = %track.title, "▶️ loading track");
        if track.duration_secs().is_none() {
            warn!(track = %track.video_id, duration = ?track.duration, "no usable duration, track will not auto-advance");
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if job.is_cancelled() {
                return;
            }
            let result = queue.target.start(track.clone(), job.clone()).await;
            if let Err(e) = result {
                if job.is_cancelled() {
                    debug!(track = %track.video_id, "playback job cancelled");
                    return;
                }
                warn!(track = %track.video_id, "❌ playback failed: {}", e);
                let mut state = queue.state.lock();
                if state.job_id == job_id {
                    state.job = None;
                    state.state = TransportState::Idle;
                    queue.publish(&state);
                }
            }
        });
    }

    /// Piste suivante ; au-delà de la dernière, `Idle` sur la dernière.
    pub async fn next(self: &Arc<Self>) {
        let _command = self.commands.lock().await;
        self.advance().await;
    }

    /// Corps de `next()`, verrou des commandes déjà pris.
    async fn advance(self: &Arc<Self>) {
        self.halt().await;

        let mut state = self.state.lock();
        let next = state.index.map_or(0, |i| i + 1);
        if next >= state.tracks.len() {
            debug!("end of queue");
            state.index = state.tracks.len().checked_sub(1);
            state.state = TransportState::Idle;
            state.elapsed = 0.0;
        } else {
            state.index = Some(next);
            self.launch(&mut state);
        }
        self.publish(&state);
    }

    /// Recule d'une piste en tout début de lecture, sinon redémarre la
    /// piste courante.
    pub async fn previous(self: &Arc<Self>) {
        let _command = self.commands.lock().await;
        self.halt().await;

        let mut state = self.state.lock();
        if state.tracks.is_empty() {
            state.state = TransportState::Idle;
            self.publish(&state);
            return;
        }
        state.index = match state.index {
            Some(i) if state.elapsed < PREVIOUS_RESTART_THRESHOLD && i > 0 => Some(i - 1),
            Some(i) => Some(i.min(state.tracks.len() - 1)),
            None => Some(0),
        };
        self.launch(&mut state);
        self.publish(&state);
    }

    /// Bascule pause / lecture ; sans effet dans les autres états.
    pub async fn toggle_pause(self: &Arc<Self>) {
        let _command = self.commands.lock().await;
        let current = self.state();
        let (result, new_state) = match current {
            TransportState::Playing => (self.target.pause().await, TransportState::Paused),
            TransportState::Paused => (self.target.unpause().await, TransportState::Playing),
            _ => {
                debug!(state = ?current, "pause ignored");
                return;
            }
        };
        if let Err(e) = result {
            warn!("pause toggle failed: {}", e);
            return;
        }
        let mut state = self.state.lock();
        if state.state == current {
            state.state = new_state;
            self.publish(&state);
        }
    }

    /// Arrêt complet et file vidée.
    pub async fn reset(self: &Arc<Self>) {
        let _command = self.commands.lock().await;
        self.halt().await;

        let mut state = self.state.lock();
        state.tracks.clear();
        state.index = None;
        state.elapsed = 0.0;
        state.state = TransportState::Idle;
        self.publish(&state);
    }

    /// Remplace la file et démarre à `start`.
    pub async fn play(self: &Arc<Self>, tracks: Vec<Track>, start: usize) {
        let _command = self.commands.lock().await;
        self.halt().await;

        let mut state = self.state.lock();
        state.tracks = tracks;
        state.elapsed = 0.0;
        if start < state.tracks.len() {
            state.index = Some(start);
            self.launch(&mut state);
        } else {
            state.index = state.tracks.len().checked_sub(1);
            state.state = TransportState::Idle;
        }
        self.publish(&state);
    }

    /// Remplace la file par `tracks` sans interrompre la piste courante,
    /// dont l'index est relocalisé. `false` si elle n'y figure pas.
    pub fn adopt_context(&self, tracks: Vec<Track>) -> bool {
        let mut state = self.state.lock();
        let Some(current) = state.current_track().map(|t| t.video_id.clone()) else {
            return false;
        };
        let Some(position) = tracks.iter().position(|t| t.video_id == current) else {
            warn!(track = %current, "current track missing from context");
            return false;
        };
        debug!(len = tracks.len(), position, "queue context adopted");
        state.tracks = tracks;
        state.index = Some(position);
        self.publish(&state);
        true
    }

    /// Le lecteur signale que le son sort.
    pub fn on_track_started(&self) {
        let mut state = self.state.lock();
        if state.state == TransportState::Loading {
            state.state = TransportState::Playing;
            state.elapsed = 0.0;
            self.publish(&state);
        }
    }

    /// Position rapportée par le lecteur
    pub fn update_elapsed(&self, elapsed: f64) {
        let mut state = self.state.lock();
        if matches!(state.state, TransportState::Playing | TransportState::Paused) {
            state.elapsed = elapsed;
            self.snapshots.send_if_modified(|s| {
                if (s.elapsed - elapsed).abs() >= 1.0 || s.state != state.state {
                    *s = state.snapshot();
                    true
                } else {
                    s.elapsed = elapsed;
                    false
                }
            });
        }
    }

    /// Passe à la piste suivante si la courante est terminée.
    ///
    /// La fin est constatée sous le verrou des commandes : un `next()`
    /// concurrent a déjà changé de piste quand ce test s'exécute.
    pub async fn check_end_of_track(self: &Arc<Self>) -> bool {
        let _command = self.commands.lock().await;
        let ended = {
            let state = self.state.lock();
            state.state == TransportState::Playing
                && state
                    .current_track()
                    .and_then(Track::duration_secs)
                    .is_some_and(|d| state.elapsed > d as f64 - self.end_of_track_epsilon)
        };
        if ended {
            debug!("⏭️ end of track reached");
            self.advance().await;
        }
        ended
    }

    /// Surveillance de fin de piste jusqu'à annulation de la file.
    pub async fn run_monitor(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {
                    self.check_end_of_track().await;
                }
            }
        }
    }

    /// Fin de session : annule la lecture sans parler au lecteur.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.cancel_job();
        state.state = TransportState::Idle;
        self.publish(&state);
    }
}
