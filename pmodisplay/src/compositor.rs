//! Compositeur d'affichage
//!
//! Le compositeur possède la pile de sources ([`TextStack`]). À chaque tick
//! il élague les sources expirées, choisit la plus prioritaire des sources
//! actives, attend sa frame jusqu'au tick suivant et l'envoie au
//! [`FrameSink`]. Une source terminée est retirée et la sélection reprend
//! dans le même tick. Les autres composants ajoutent des sources à travers un
//! [`DisplayHandle`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::DisplayError;
use crate::source::TextSource;
use crate::text::TextRenderer;

/// Destination des frames (la connexion d'un lecteur)
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn render(&self, frame: &[u8]) -> Result<(), DisplayError>;
}

#[derive(Debug, Clone, Copy)]
pub struct DisplaySettings {
    pub frame_interval: Duration,
    pub scroll_dwell: Duration,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            scroll_dwell: Duration::from_secs(3),
        }
    }
}

/// Pile de sources, du fond (index 0) vers le haut
#[derive(Debug, Default)]
pub struct TextStack {
    sources: Vec<TextSource>,
}

impl TextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: TextSource) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Retire les sources expirées ou annulées puis retourne la plus haute
    /// source active.
    pub fn select(&mut self, now: Instant) -> Option<&mut TextSource> {
        self.sources.retain(|s| {
            let keep = !s.is_expired(now);
            if !keep {
                trace!(source = s.label(), "text source pruned");
            }
            keep
        });
        self.sources.iter_mut().rev().find(|s| s.is_enabled())
    }

    pub fn active_label(&mut self, now: Instant) -> Option<String> {
        self.select(now).map(|s| s.label().to_string())
    }
}

/// Accès partagé au compositeur d'un lecteur
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::UnboundedSender<TextSource>,
    renderer: TextRenderer,
    settings: DisplaySettings,
    token: CancellationToken,
}

impl DisplayHandle {
    pub fn renderer(&self) -> &TextRenderer {
        &self.renderer
    }

    pub fn settings(&self) -> DisplaySettings {
        self.settings
    }

    /// Jeton parent de toutes les sources de cet écran
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Empile une source ; `false` si le compositeur est arrêté.
    pub fn push(&self, source: TextSource) -> bool {
        self.tx.send(source).is_ok()
    }

    pub fn text_source(&self, label: &str, text: &str) -> TextSource {
        TextSource::text(
            label,
            &self.renderer,
            text,
            self.settings.scroll_dwell,
            &self.token,
        )
    }

    pub fn clock_source(&self) -> TextSource {
        TextSource::clock(&self.renderer, &self.token)
    }

    pub fn dynamic_source<T, F>(&self, label: &str, values: watch::Receiver<T>, describe: F) -> TextSource
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        TextSource::dynamic(
            label,
            &self.renderer,
            values,
            describe,
            self.settings.scroll_dwell,
            &self.token,
        )
    }

    /// Texte temporaire au-dessus de tout le reste.
    pub fn announce(&self, text: &str, duration: Duration) -> bool {
        debug!(text, ?duration, "📢 display announcement");
        self.push(self.text_source("announce", text).with_timeout(duration))
    }
}

pub struct Compositor {
    stack: TextStack,
    incoming: mpsc::UnboundedReceiver<TextSource>,
    settings: DisplaySettings,
    token: CancellationToken,
}

impl Compositor {
    /// Crée un compositeur et son handle. Annuler `token` arrête le
    /// compositeur et toutes ses sources.
    pub fn new(
        renderer: TextRenderer,
        settings: DisplaySettings,
        token: CancellationToken,
    ) -> (DisplayHandle, Self) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let handle = DisplayHandle {
            tx,
            renderer,
            settings,
            token: token.clone(),
        };
        let compositor = Self {
            stack: TextStack::new(),
            incoming,
            settings,
            token,
        };
        (handle, compositor)
    }

    fn drain_incoming(&mut self) {
        while let Ok(source) = self.incoming.try_recv() {
            trace!(source = source.label(), "text source pushed");
            self.stack.push(source);
        }
    }

    /// Boucle de rendu, jusqu'à annulation ou erreur du sink.
    pub async fn run<S: FrameSink + ?Sized>(mut self, sink: &S) -> Result<(), DisplayError> {
        let period = self.settings.frame_interval;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                tick = ticker.tick() => tick,
            };
            let deadline = tick + period;

            self.drain_incoming();
            while let Some(source) = self.stack.select(Instant::now()) {
                match tokio::time::timeout_at(deadline, source.recv()).await {
                    Ok(Some(frame)) => {
                        sink.render(&frame).await?;
                        break;
                    }
                    Ok(None) => {
                        debug!(source = source.label(), "text source ended");
                        source.cancel();
                    }
                    Err(_) => {
                        trace!(source = source.label(), "no frame this tick");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::PsfFont;
    use crate::layout::DisplayKind;
    use std::sync::Arc;

    fn renderer() -> TextRenderer {
        let glyphs = (0u32..128).flat_map(|c| [c as u8; 16]).collect();
        TextRenderer::new(
            DisplayKind::Vfd280x16,
            Arc::new(PsfFont::from_glyphs(8, 16, glyphs)),
        )
    }

    fn source(label: &str, token: &CancellationToken) -> TextSource {
        TextSource::text(label, &renderer(), label, Duration::ZERO, token)
    }

    #[tokio::test(start_paused = true)]
    async fn test_selects_highest_enabled() {
        let token = CancellationToken::new();
        let (loading_tx, loading_rx) = watch::channel(false);
        let (playing_tx, playing_rx) = watch::channel(false);

        let mut stack = TextStack::new();
        stack.push(source("clock", &token));
        stack.push(source("loading", &token).with_enabled(move || *loading_rx.borrow()));
        stack.push(source("playing", &token).with_enabled(move || *playing_rx.borrow()));

        assert_eq!(stack.active_label(Instant::now()).as_deref(), Some("clock"));
        loading_tx.send(true).unwrap();
        assert_eq!(stack.active_label(Instant::now()).as_deref(), Some("loading"));
        playing_tx.send(true).unwrap();
        assert_eq!(stack.active_label(Instant::now()).as_deref(), Some("playing"));
        assert_eq!(stack.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_pruned_on_next_selection() {
        let token = CancellationToken::new();
        let mut stack = TextStack::new();
        stack.push(source("clock", &token));
        stack.push(source("volume", &token).with_timeout(Duration::from_secs(2)));

        assert_eq!(stack.active_label(Instant::now()).as_deref(), Some("volume"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(stack.active_label(Instant::now()).as_deref(), Some("clock"));
        assert_eq!(stack.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_entry_pruned() {
        let token = CancellationToken::new();
        let mut stack = TextStack::new();
        stack.push(source("clock", &token));
        let top = source("top", &token);
        top.cancel();
        stack.push(top);
        assert_eq!(stack.active_label(Instant::now()).as_deref(), Some("clock"));
        assert_eq!(stack.len(), 1);
    }

    struct Recorder {
        frames: parking_lot::Mutex<Vec<Vec<u8>>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl FrameSink for Recorder {
        async fn render(&self, frame: &[u8]) -> Result<(), DisplayError> {
            let mut frames = self.frames.lock();
            if self.fail_after.is_some_and(|n| frames.len() >= n) {
                return Err(DisplayError::Sink("connection closed".into()));
            }
            frames.push(frame.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_compositor_renders_announcement_over_base() {
        let token = CancellationToken::new();
        let settings = DisplaySettings {
            frame_interval: Duration::from_millis(5),
            scroll_dwell: Duration::ZERO,
        };
        let (handle, compositor) = Compositor::new(renderer(), settings, token.clone());
        handle.push(handle.text_source("base", "base"));
        handle.announce("Volume = 55/100", Duration::from_secs(60));

        let recorder = Arc::new(Recorder {
            frames: parking_lot::Mutex::new(Vec::new()),
            fail_after: None,
        });
        let sink = recorder.clone();
        let task = tokio::spawn(async move { compositor.run(sink.as_ref()).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        task.await.unwrap().unwrap();

        let frames = recorder.frames.lock();
        assert!(!frames.is_empty());
        let expected = renderer().render_frame("Volume = 55/100");
        assert!(frames.iter().all(|f| *f == expected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_source_falls_through_in_same_tick() {
        let token = CancellationToken::new();
        let settings = DisplaySettings {
            frame_interval: Duration::from_secs(3600),
            scroll_dwell: Duration::ZERO,
        };
        let (handle, compositor) = Compositor::new(renderer(), settings, token.clone());
        handle.push(handle.text_source("base", "base"));
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        handle.push(TextSource::from_channel("ended", rx, token.child_token()));

        let recorder = Arc::new(Recorder {
            frames: parking_lot::Mutex::new(Vec::new()),
            fail_after: None,
        });
        let sink = recorder.clone();
        let task = tokio::spawn(async move { compositor.run(sink.as_ref()).await });

        // Bien avant le second tick
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            *recorder.frames.lock(),
            vec![renderer().render_frame("base")]
        );

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sink_error_stops_compositor() {
        let token = CancellationToken::new();
        let settings = DisplaySettings {
            frame_interval: Duration::from_millis(5),
            scroll_dwell: Duration::ZERO,
        };
        let (handle, compositor) = Compositor::new(renderer(), settings, token.clone());
        handle.push(handle.clock_source());

        let recorder = Recorder {
            frames: parking_lot::Mutex::new(Vec::new()),
            fail_after: Some(2),
        };
        let result = compositor.run(&recorder).await;
        assert!(matches!(result, Err(DisplayError::Sink(_))));
        assert_eq!(recorder.frames.lock().len(), 2);
    }
}
