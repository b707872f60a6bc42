//! Rendu de texte et défilement
//!
//! Un texte qui tient sur l'écran donne une frame statique. Au-delà, le texte
//! suivi de quatre espaces est rendu dans un buffer virtuel plus large que
//! l'écran, sur lequel une fenêtre glisse de [`DisplayKind::scroll_step`]
//! octets par frame, en rebouclant sur le début.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::font::PsfFont;
use crate::layout::DisplayKind;

const SCROLL_PADDING: &str = "    ";

/// Couple écran + police
#[derive(Debug, Clone)]
pub struct TextRenderer {
    kind: DisplayKind,
    font: Arc<PsfFont>,
}

impl TextRenderer {
    pub fn new(kind: DisplayKind, font: Arc<PsfFont>) -> Self {
        Self { kind, font }
    }

    pub fn kind(&self) -> DisplayKind {
        self.kind
    }

    fn render_into(&self, text: &str, buffer: &mut [u8]) {
        for (position, c) in text.chars().enumerate() {
            self.kind
                .pack_glyph(self.font.glyph(c as u32), position, buffer);
        }
    }

    /// Une frame de la taille de l'écran ; les caractères en trop sont coupés.
    pub fn render_frame(&self, text: &str) -> Vec<u8> {
        let mut frame = self.kind.blank_frame();
        let visible: String = text.chars().take(self.kind.chars_per_frame()).collect();
        self.render_into(&visible, &mut frame);
        frame
    }

    /// Frame statique ou buffer de défilement selon la longueur du texte.
    pub fn layout(&self, text: &str) -> TextLayout {
        let len = text.chars().count();
        if len <= self.kind.chars_per_frame() {
            return TextLayout::Static(self.render_frame(text));
        }

        let padded = format!("{}{}", text, SCROLL_PADDING);
        let mut buffer = vec![0; (len + SCROLL_PADDING.len()) * self.kind.bytes_per_char()];
        self.render_into(&padded, &mut buffer);
        TextLayout::Scrolling(ScrollBuffer {
            buffer,
            frame_len: self.kind.frame_len(),
            step: self.kind.scroll_step(),
        })
    }

    /// Heure locale `HH:MM:SS`, indentée pour l'écran.
    pub fn clock_frame(&self, now: chrono::DateTime<chrono::Local>) -> Vec<u8> {
        let text = format!(
            "{}{}",
            " ".repeat(self.kind.clock_indent()),
            now.format("%H:%M:%S")
        );
        self.render_frame(&text)
    }
}

#[derive(Debug, Clone)]
pub enum TextLayout {
    Static(Vec<u8>),
    Scrolling(ScrollBuffer),
}

/// Buffer virtuel d'un texte trop long pour l'écran
#[derive(Debug, Clone)]
pub struct ScrollBuffer {
    buffer: Vec<u8>,
    frame_len: usize,
    step: usize,
}

impl ScrollBuffer {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn first_window(&self) -> Vec<u8> {
        self.window(0)
    }

    /// Fenêtre d'une frame commençant à `offset`, rebouclée en fin de buffer.
    pub fn window(&self, offset: usize) -> Vec<u8> {
        let len = self.buffer.len();
        if len == 0 {
            return vec![0; self.frame_len];
        }
        let offset = offset % len;
        let mut frame = Vec::with_capacity(self.frame_len);
        frame.extend_from_slice(&self.buffer[offset..(offset + self.frame_len).min(len)]);
        while frame.len() < self.frame_len {
            let missing = self.frame_len - frame.len();
            frame.extend_from_slice(&self.buffer[..missing.min(len)]);
        }
        frame
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Premières frames, avant que le compositeur ne consomme la source
    Priming(u8),
    Dwell(Instant),
    Sliding(usize),
}

/// Générateur de frames d'un texte, piloté par l'horloge
///
/// Un texte défilant reste immobile `dwell` après sa première apparition,
/// puis glisse jusqu'à revenir au début, et recommence.
#[derive(Debug, Clone)]
pub struct FrameCursor {
    layout: TextLayout,
    dwell: Duration,
    phase: Phase,
}

impl FrameCursor {
    pub fn new(layout: TextLayout, dwell: Duration) -> Self {
        Self {
            layout,
            dwell,
            phase: Phase::Priming(0),
        }
    }

    pub fn is_scrolling(&self) -> bool {
        matches!(self.layout, TextLayout::Scrolling(_))
    }

    pub fn next_frame(&mut self, now: Instant) -> Vec<u8> {
        let scroll = match &self.layout {
            TextLayout::Static(frame) => return frame.clone(),
            TextLayout::Scrolling(scroll) => scroll,
        };

        match self.phase {
            Phase::Priming(n) => {
                // Deux frames pré-produites : le canal en garde une, la
                // seconde n'est acceptée qu'une fois la source affichée
                self.phase = if n >= 1 {
                    Phase::Dwell(now + self.dwell)
                } else {
                    Phase::Priming(n + 1)
                };
                scroll.first_window()
            }
            Phase::Dwell(deadline) if now < deadline => scroll.first_window(),
            Phase::Dwell(_) => {
                self.phase = Phase::Sliding(scroll.step());
                scroll.window(0)
            }
            Phase::Sliding(offset) if offset < scroll.len() => {
                self.phase = Phase::Sliding(offset + scroll.step());
                scroll.window(offset)
            }
            Phase::Sliding(_) => {
                self.phase = Phase::Dwell(now + self.dwell);
                scroll.first_window()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(c: u32) -> u8 {
        if c == ' ' as u32 { 0 } else { c as u8 }
    }

    /// Police 8×16 où chaque ligne du glyphe `c` vaut `c`, espace vide
    fn narrow_renderer() -> TextRenderer {
        let glyphs = (0u32..128).flat_map(|c| [row(c); 16]).collect();
        TextRenderer::new(
            DisplayKind::Vfd280x16,
            Arc::new(PsfFont::from_glyphs(8, 16, glyphs)),
        )
    }

    fn wide_renderer() -> TextRenderer {
        let glyphs = (0u32..128).flat_map(|c| [row(c); 64]).collect();
        TextRenderer::new(
            DisplayKind::Vfd320x32,
            Arc::new(PsfFont::from_glyphs(16, 32, glyphs)),
        )
    }

    #[test]
    fn test_short_text_is_static() {
        let r = narrow_renderer();
        match r.layout("Loading...") {
            TextLayout::Static(frame) => {
                assert_eq!(frame.len(), 560);
                assert_eq!(frame, r.render_frame("Loading..."));
            }
            TextLayout::Scrolling(_) => panic!("short text must not scroll"),
        }
    }

    #[test]
    fn test_exact_budget_is_static() {
        let r = wide_renderer();
        let text = "x".repeat(20);
        assert!(matches!(r.layout(&text), TextLayout::Static(_)));
        assert!(matches!(r.layout(&"x".repeat(21)), TextLayout::Scrolling(_)));
    }

    #[test]
    fn test_first_window_is_static_rendering_of_prefix() {
        for r in [narrow_renderer(), wide_renderer()] {
            let text = "Paranoid Android from OK Computer by Radiohead";
            let TextLayout::Scrolling(scroll) = r.layout(text) else {
                panic!("long text must scroll");
            };
            let prefix: String = text.chars().take(r.kind().chars_per_frame()).collect();
            assert_eq!(scroll.first_window(), r.render_frame(&prefix));
            assert_eq!(
                scroll.len(),
                (text.len() + 4) * r.kind().bytes_per_char()
            );
        }
    }

    #[test]
    fn test_window_wraps_around() {
        let r = narrow_renderer();
        let text = "A".repeat(40);
        let TextLayout::Scrolling(scroll) = r.layout(&text) else {
            panic!("long text must scroll");
        };
        // 44 caractères : la fenêtre à 30 caractères montre 10 'A',
        // 4 espaces puis reprend au début
        let frame = scroll.window(30 * 16);
        assert_eq!(frame.len(), 560);
        assert_eq!(&frame[..16], r.render_frame("A").get(..16).unwrap());
        assert!(frame[10 * 16..14 * 16].iter().all(|b| *b == 0));
        assert_eq!(&frame[14 * 16..15 * 16], &frame[..16]);
    }

    #[test]
    fn test_clock_is_indented() {
        let r = wide_renderer();
        let now = chrono::Local::now();
        let frame = r.clock_frame(now);
        assert_eq!(frame.len(), 1280);
        let expected = r.render_frame(&format!("      {}", now.format("%H:%M:%S")));
        assert_eq!(frame, expected);
    }

    #[tokio::test]
    async fn test_cursor_dwell_then_slide_then_repeat() {
        let r = narrow_renderer();
        let text = "B".repeat(36);
        let TextLayout::Scrolling(scroll) = r.layout(&text) else {
            panic!("long text must scroll");
        };
        let first = scroll.first_window();
        let mut cursor = FrameCursor::new(r.layout(&text), Duration::from_secs(3));
        let t0 = Instant::now();

        // Amorçage et immobilité
        assert_eq!(cursor.next_frame(t0), first);
        assert_eq!(cursor.next_frame(t0), first);
        assert_eq!(cursor.next_frame(t0 + Duration::from_secs(2)), first);

        // Fin de l'immobilité : la fenêtre glisse de 6 octets par frame
        let t1 = t0 + Duration::from_secs(4);
        assert_eq!(cursor.next_frame(t1), scroll.window(0));
        assert_eq!(cursor.next_frame(t1), scroll.window(6));
        assert_eq!(cursor.next_frame(t1), scroll.window(12));

        // Un tour complet ramène au début et relance l'immobilité
        let steps = scroll.len().div_ceil(6);
        for _ in 3..steps {
            cursor.next_frame(t1);
        }
        assert_eq!(cursor.next_frame(t1), first);
        assert_eq!(cursor.next_frame(t1 + Duration::from_secs(1)), first);
    }

    #[test]
    fn test_cursor_static_text_repeats() {
        let r = narrow_renderer();
        let mut cursor = FrameCursor::new(r.layout("hello"), Duration::from_secs(3));
        assert!(!cursor.is_scrolling());
        let now = Instant::now();
        assert_eq!(cursor.next_frame(now), r.render_frame("hello"));
        assert_eq!(cursor.next_frame(now), r.render_frame("hello"));
    }
}
