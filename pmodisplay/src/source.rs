//! Sources de texte
//!
//! Chaque source est une tâche productrice qui pousse des frames dans un
//! canal de capacité 1 : elle ne produit qu'au rythme où le compositeur
//! consomme. La source porte aussi sa condition d'activation, son
//! éventuelle échéance et son jeton d'annulation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::text::{FrameCursor, TextRenderer};

pub type Frame = Vec<u8>;

type EnabledFn = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct TextSource {
    label: String,
    frames: mpsc::Receiver<Frame>,
    enabled: Option<EnabledFn>,
    expires_at: Option<Instant>,
    token: CancellationToken,
}

impl fmt::Debug for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextSource")
            .field("label", &self.label)
            .field("conditional", &self.enabled.is_some())
            .field("expires_at", &self.expires_at)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl TextSource {
    /// Source alimentée par un producteur externe.
    ///
    /// Le producteur doit s'arrêter quand `token` est annulé.
    pub fn from_channel(
        label: impl Into<String>,
        frames: mpsc::Receiver<Frame>,
        token: CancellationToken,
    ) -> Self {
        Self {
            label: label.into(),
            frames,
            enabled: None,
            expires_at: None,
            token,
        }
    }

    /// Texte fixe, statique ou défilant selon sa longueur.
    pub fn text(
        label: impl Into<String>,
        renderer: &TextRenderer,
        text: &str,
        dwell: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let cursor = FrameCursor::new(renderer.layout(text), dwell);
        tokio::spawn(run_cursor(tx, cursor, token.clone()));
        Self::from_channel(label, rx, token)
    }

    /// Horloge locale, régénérée à chaque frame.
    pub fn clock(renderer: &TextRenderer, parent: &CancellationToken) -> Self {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let renderer = renderer.clone();
        let producer_token = token.clone();
        tokio::spawn(async move {
            loop {
                let frame = renderer.clock_frame(chrono::Local::now());
                tokio::select! {
                    _ = producer_token.cancelled() => break,
                    sent = tx.send(frame) => if sent.is_err() { break },
                }
            }
        });
        Self::from_channel("clock", rx, token)
    }

    /// Texte dérivé d'une valeur observée.
    ///
    /// Le rendu (et le défilement) n'est recalculé que lorsque le texte
    /// produit par `describe` change.
    pub fn dynamic<T, F>(
        label: impl Into<String>,
        renderer: &TextRenderer,
        values: watch::Receiver<T>,
        describe: F,
        dwell: Duration,
        parent: &CancellationToken,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let renderer = renderer.clone();
        let producer_token = token.clone();
        let label = label.into();
        let task_label = label.clone();

        tokio::spawn(async move {
            let mut current: Option<(String, FrameCursor)> = None;
            loop {
                let text = describe(&values.borrow());
                let changed = current.as_ref().is_none_or(|(t, _)| *t != text);
                if changed {
                    trace!(source = %task_label, text = %text, "display text changed");
                    current = Some((text.clone(), FrameCursor::new(renderer.layout(&text), dwell)));
                }
                let Some((_, cursor)) = current.as_mut() else {
                    break;
                };
                let frame = cursor.next_frame(Instant::now());
                tokio::select! {
                    _ = producer_token.cancelled() => break,
                    sent = tx.send(frame) => if sent.is_err() { break },
                }
            }
        });

        Self::from_channel(label, rx, token)
    }

    /// N'est candidate que lorsque `enabled` renvoie vrai.
    pub fn with_enabled<F>(mut self, enabled: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(enabled));
        self
    }

    /// Expire `duration` après sa création.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.expires_at = Some(Instant::now() + duration);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.as_ref().is_none_or(|f| f())
    }

    /// Annulée ou arrivée à échéance.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.token.is_cancelled() || self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Prochaine frame ; `None` quand le producteur s'est arrêté.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

impl Drop for TextSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_cursor(tx: mpsc::Sender<Frame>, mut cursor: FrameCursor, token: CancellationToken) {
    loop {
        let frame = cursor.next_frame(Instant::now());
        tokio::select! {
            _ = token.cancelled() => break,
            sent = tx.send(frame) => if sent.is_err() { break },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::PsfFont;
    use crate::layout::DisplayKind;

    fn renderer() -> TextRenderer {
        let glyphs = (0u32..128).flat_map(|c| [c as u8; 16]).collect();
        TextRenderer::new(
            DisplayKind::Vfd280x16,
            Arc::new(PsfFont::from_glyphs(8, 16, glyphs)),
        )
    }

    #[tokio::test]
    async fn test_static_text_source_repeats_frame() {
        let token = CancellationToken::new();
        let r = renderer();
        let mut source = TextSource::text("hello", &r, "hello", Duration::from_secs(3), &token);
        let expected = r.render_frame("hello");
        assert_eq!(source.recv().await, Some(expected.clone()));
        assert_eq!(source.recv().await, Some(expected));
    }

    #[tokio::test]
    async fn test_cancel_stops_producer() {
        let token = CancellationToken::new();
        let mut source = TextSource::text("x", &renderer(), "x", Duration::from_secs(3), &token);
        token.cancel();
        assert!(source.is_expired(Instant::now()));
        // Au plus la frame déjà en file, puis fin du flux
        let mut received = 0;
        while source.recv().await.is_some() {
            received += 1;
        }
        assert!(received <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expiry() {
        let token = CancellationToken::new();
        let source = TextSource::text("vol", &renderer(), "Volume = 55/100", Duration::ZERO, &token)
            .with_timeout(Duration::from_secs(2));
        assert!(!source.is_expired(Instant::now()));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(source.is_expired(Instant::now()));
    }

    #[tokio::test]
    async fn test_enabled_predicate() {
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(false);
        let source = TextSource::text("loading", &renderer(), "Loading...", Duration::ZERO, &token)
            .with_enabled(move || *rx.borrow());
        assert!(!source.is_enabled());
        tx.send(true).unwrap();
        assert!(source.is_enabled());
    }

    #[tokio::test]
    async fn test_dynamic_source_follows_value() {
        let token = CancellationToken::new();
        let r = renderer();
        let (tx, rx) = watch::channel(String::from("first"));
        let mut source = TextSource::dynamic(
            "now-playing",
            &r,
            rx,
            |s: &String| s.clone(),
            Duration::from_secs(3),
            &token,
        );

        assert_eq!(source.recv().await, Some(r.render_frame("first")));
        tx.send("second".into()).unwrap();

        // Une frame produite avant le changement peut encore être en file
        let mut frame = source.recv().await.unwrap();
        if frame == r.render_frame("first") {
            frame = source.recv().await.unwrap();
        }
        assert_eq!(frame, r.render_frame("second"));
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let token = CancellationToken::new();
        let source = TextSource::clock(&renderer(), &token);
        let child = source.token.clone();
        drop(source);
        assert!(child.is_cancelled());
        assert!(!token.is_cancelled());
    }
}
