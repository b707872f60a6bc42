use std::sync::Arc;
use std::time::Duration;

use pmodisplay::{DisplayKind, PsfFont, TextLayout, TextRenderer, TextSource};
use tokio_util::sync::CancellationToken;

/// Police où chaque glyphe est rempli de la valeur de son code
fn renderer(kind: DisplayKind) -> TextRenderer {
    let per_glyph = kind.bytes_per_char();
    let glyphs = (0u32..128)
        .flat_map(|c| std::iter::repeat_n(if c == 32 { 0 } else { c as u8 }, per_glyph))
        .collect();
    let font = PsfFont::from_glyphs(
        kind.glyph_width() as u32,
        kind.glyph_height() as u32,
        glyphs,
    );
    TextRenderer::new(kind, Arc::new(font))
}

#[tokio::test(start_paused = true)]
async fn test_long_text_dwells_then_scrolls() {
    for kind in [DisplayKind::Vfd280x16, DisplayKind::Vfd320x32] {
        let r = renderer(kind);
        let text = "Karma Police from OK Computer by Radiohead";
        let TextLayout::Scrolling(scroll) = r.layout(text) else {
            panic!("{:?}: text should scroll", kind);
        };
        let prefix: String = text.chars().take(kind.chars_per_frame()).collect();
        let first = r.render_frame(&prefix);

        let token = CancellationToken::new();
        let mut source = TextSource::text("title", &r, text, Duration::from_secs(3), &token);

        for _ in 0..5 {
            assert_eq!(source.recv().await.unwrap(), first);
        }

        tokio::time::advance(Duration::from_secs(4)).await;

        let mut moved = None;
        for _ in 0..5 {
            let frame = source.recv().await.unwrap();
            if frame != first {
                moved = Some(frame);
                break;
            }
        }
        assert_eq!(moved, Some(scroll.window(kind.scroll_step())));
        token.cancel();
    }
}

#[tokio::test]
async fn test_short_text_single_static_frame() {
    for kind in [DisplayKind::Vfd280x16, DisplayKind::Vfd320x32] {
        let r = renderer(kind);
        let token = CancellationToken::new();
        let mut source = TextSource::text("short", &r, "PMOSlim", Duration::from_secs(3), &token);
        let expected = r.render_frame("PMOSlim");
        for _ in 0..3 {
            let frame = source.recv().await.unwrap();
            assert_eq!(frame.len(), kind.frame_len());
            assert_eq!(frame, expected);
        }
        token.cancel();
    }
}
