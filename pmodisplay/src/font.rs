//! Lecture des polices bitmap PSF2
//!
//! Format : en-tête de 32 octets little-endian (magic `72 b5 4a 86`,
//! version, taille d'en-tête, flags, nombre de glyphes, octets/glyphe,
//! hauteur, largeur) suivi de la table des glyphes, indexée directement
//! par le code du caractère.

use std::path::Path;

use tracing::{error, warn};

use crate::error::{DisplayError, Result};
use crate::layout::DisplayKind;

const PSF2_MAGIC: [u8; 4] = [0x72, 0xb5, 0x4a, 0x86];
const PSF2_HEADER_LEN: usize = 32;
const FALLBACK_CHAR: u32 = '?' as u32;

#[derive(Debug, Clone)]
pub struct PsfFont {
    pub version: u32,
    pub header_size: u32,
    pub flags: u32,
    pub num_glyphs: u32,
    pub bytes_per_glyph: u32,
    pub height: u32,
    pub width: u32,
    glyphs: Vec<u8>,
    blank: Vec<u8>,
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl PsfFont {
    /// Décode une police depuis son contenu brut.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PSF2_HEADER_LEN {
            return Err(DisplayError::Truncated(format!(
                "{} bytes, header needs {}",
                bytes.len(),
                PSF2_HEADER_LEN
            )));
        }
        if bytes[..4] != PSF2_MAGIC {
            return Err(DisplayError::BadMagic);
        }

        let header_size = le_u32(bytes, 8);
        let num_glyphs = le_u32(bytes, 16);
        let bytes_per_glyph = le_u32(bytes, 20);
        if bytes_per_glyph == 0 {
            return Err(DisplayError::Truncated("zero bytes per glyph".into()));
        }

        let table_start = match header_size as usize {
            n if n >= PSF2_HEADER_LEN && n <= bytes.len() => n,
            _ => PSF2_HEADER_LEN,
        };
        let declared = num_glyphs as usize * bytes_per_glyph as usize;
        let available = bytes.len() - table_start;
        if available < declared {
            warn!(
                declared,
                available, "PSF glyph table shorter than announced, keeping complete glyphs"
            );
        }
        let usable = declared.min(available) / bytes_per_glyph as usize * bytes_per_glyph as usize;

        Ok(Self {
            version: le_u32(bytes, 4),
            header_size,
            flags: le_u32(bytes, 12),
            num_glyphs: (usable / bytes_per_glyph as usize) as u32,
            bytes_per_glyph,
            height: le_u32(bytes, 24),
            width: le_u32(bytes, 28),
            glyphs: bytes[table_start..table_start + usable].to_vec(),
            blank: vec![0; bytes_per_glyph as usize],
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Construit une police à partir d'une table de glyphes déjà découpée.
    pub fn from_glyphs(width: u32, height: u32, glyphs: Vec<u8>) -> Self {
        let bytes_per_glyph = width.div_ceil(8) * height;
        let num_glyphs = if bytes_per_glyph == 0 {
            0
        } else {
            glyphs.len() as u32 / bytes_per_glyph
        };
        Self {
            version: 0,
            header_size: PSF2_HEADER_LEN as u32,
            flags: 0,
            num_glyphs,
            bytes_per_glyph,
            height,
            width,
            glyphs,
            blank: vec![0; bytes_per_glyph as usize],
        }
    }

    /// Police vide à la géométrie de l'écran : tout s'affiche en blanc.
    pub fn blank(kind: DisplayKind) -> Self {
        Self::from_glyphs(kind.glyph_width() as u32, kind.glyph_height() as u32, Vec::new())
    }

    /// Charge la police d'un écran, ou une police vide si le fichier est inutilisable.
    pub fn load_or_blank(path: impl AsRef<Path>, kind: DisplayKind) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(font) => {
                if font.width as usize != kind.glyph_width()
                    || font.height as usize != kind.glyph_height()
                {
                    warn!(
                        font = %path.display(),
                        width = font.width,
                        height = font.height,
                        "Font geometry does not match the {:?} display",
                        kind
                    );
                }
                font
            }
            Err(e) => {
                error!(font = %path.display(), "❌ Unable to load font: {}", e);
                Self::blank(kind)
            }
        }
    }

    /// Bitmap du glyphe `code`, `?` (ou un glyphe vide) hors de la table.
    pub fn glyph(&self, code: u32) -> &[u8] {
        self.slice(code)
            .or_else(|| self.slice(FALLBACK_CHAR))
            .unwrap_or(&self.blank)
    }

    fn slice(&self, code: u32) -> Option<&[u8]> {
        if code >= self.num_glyphs {
            return None;
        }
        let size = self.bytes_per_glyph as usize;
        let start = code as usize * size;
        self.glyphs.get(start..start + size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psf_bytes(width: u32, height: u32, glyphs: u32, fill: impl Fn(u32) -> u8) -> Vec<u8> {
        let per_glyph = width.div_ceil(8) * height;
        let mut bytes = PSF2_MAGIC.to_vec();
        for v in [0, 32, 0, glyphs, per_glyph, height, width] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for code in 0..glyphs {
            bytes.extend(std::iter::repeat_n(fill(code), per_glyph as usize));
        }
        bytes
    }

    #[test]
    fn test_parse_header_fields() {
        let font = PsfFont::parse(&psf_bytes(8, 16, 256, |c| c as u8)).unwrap();
        assert_eq!(font.num_glyphs, 256);
        assert_eq!(font.bytes_per_glyph, 16);
        assert_eq!(font.height, 16);
        assert_eq!(font.width, 8);
        assert_eq!(font.glyph('A' as u32), &[b'A'; 16][..]);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = psf_bytes(8, 16, 4, |_| 0);
        bytes[0] = 0x36;
        assert!(matches!(PsfFont::parse(&bytes), Err(DisplayError::BadMagic)));
    }

    #[test]
    fn test_short_header_is_rejected() {
        assert!(matches!(
            PsfFont::parse(&PSF2_MAGIC),
            Err(DisplayError::Truncated(_))
        ));
    }

    #[test]
    fn test_out_of_range_uses_question_mark() {
        let font = PsfFont::parse(&psf_bytes(8, 16, 128, |c| c as u8)).unwrap();
        assert_eq!(font.glyph(0x263a), &[b'?'; 16][..]);
    }

    #[test]
    fn test_truncated_table_keeps_complete_glyphs() {
        let mut bytes = psf_bytes(8, 16, 4, |c| c as u8 + 1);
        bytes.truncate(bytes.len() - 3);
        let font = PsfFont::parse(&bytes).unwrap();
        assert_eq!(font.num_glyphs, 3);
        assert_eq!(font.glyph(2), &[3u8; 16][..]);
        // ni le glyphe 3 ni '?' : glyphe vide
        assert_eq!(font.glyph(3), &[0u8; 16][..]);
    }

    #[test]
    fn test_blank_font_geometry() {
        let font = PsfFont::blank(DisplayKind::Vfd320x32);
        assert_eq!(font.bytes_per_glyph, 64);
        assert_eq!(font.glyph('x' as u32).len(), 64);
        assert!(font.glyph('x' as u32).iter().all(|b| *b == 0));
    }

    #[test]
    fn test_load_or_blank_missing_file() {
        let font = PsfFont::load_or_blank("/nonexistent/font.psf", DisplayKind::Vfd280x16);
        assert_eq!(font.glyph('A' as u32), &[0u8; 16][..]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.psf");
        std::fs::write(&path, psf_bytes(16, 32, 128, |c| c as u8)).unwrap();
        let font = PsfFont::load_or_blank(&path, DisplayKind::Vfd320x32);
        assert_eq!(font.glyph('B' as u32), &[b'B'; 64][..]);
    }
}
