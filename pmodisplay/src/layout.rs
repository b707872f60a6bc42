//! Géométrie des écrans VFD et empaquetage des glyphes
//!
//! Les deux familles d'écrans attendent un framebuffer organisé en colonnes
//! (column-major), chaque colonne étant une suite de bits MSB-first de haut
//! en bas. Elles diffèrent par la taille du framebuffer, la hauteur des
//! colonnes et la largeur d'une ligne de glyphe : chacune a sa routine.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DisplayKind {
    /// 280×16, Squeezebox 1 (opcode `grfd`)
    Vfd280x16,
    /// 320×32, Squeezebox 2 (opcode `grfe`)
    Vfd320x32,
}

impl DisplayKind {
    pub const fn frame_len(self) -> usize {
        match self {
            Self::Vfd280x16 => 560,
            Self::Vfd320x32 => 1280,
        }
    }

    pub const fn bytes_per_column(self) -> usize {
        match self {
            Self::Vfd280x16 => 2,
            Self::Vfd320x32 => 4,
        }
    }

    pub const fn glyph_width(self) -> usize {
        match self {
            Self::Vfd280x16 => 8,
            Self::Vfd320x32 => 16,
        }
    }

    pub const fn glyph_height(self) -> usize {
        self.bytes_per_column() * 8
    }

    pub const fn bytes_per_char(self) -> usize {
        self.glyph_width() * self.bytes_per_column()
    }

    /// Nombre de caractères affichables sans défilement.
    pub const fn chars_per_frame(self) -> usize {
        self.frame_len() / self.bytes_per_char()
    }

    /// Décalage du défilement à chaque frame (3 colonnes).
    pub const fn scroll_step(self) -> usize {
        3 * self.bytes_per_column()
    }

    /// Espaces devant l'heure pour la centrer.
    pub const fn clock_indent(self) -> usize {
        match self {
            Self::Vfd280x16 => 16,
            Self::Vfd320x32 => 6,
        }
    }

    /// Framebuffer vide de la bonne taille.
    pub fn blank_frame(self) -> Vec<u8> {
        vec![0; self.frame_len()]
    }

    /// Ecrit le glyphe à la position `position` (en caractères) de `buffer`.
    ///
    /// Les bits hors du buffer sont ignorés.
    pub fn pack_glyph(self, glyph: &[u8], position: usize, buffer: &mut [u8]) {
        match self {
            Self::Vfd280x16 => pack_narrow(glyph, position, buffer),
            Self::Vfd320x32 => pack_wide(glyph, position, buffer),
        }
    }
}

#[inline]
fn set_bit(buffer: &mut [u8], bit: usize) {
    if let Some(byte) = buffer.get_mut(bit / 8) {
        *byte |= 1 << (7 - bit % 8);
    }
}

/// Glyphes 8×16 : un octet par ligne, deux octets par colonne.
fn pack_narrow(glyph: &[u8], position: usize, buffer: &mut [u8]) {
    const WIDTH: usize = 8;
    const HEIGHT: usize = 16;

    let mut bit = position * WIDTH * HEIGHT;
    for col in 0..WIDTH {
        let mask = 0x80u8 >> col;
        for row in 0..HEIGHT {
            if glyph.get(row).is_some_and(|v| v & mask != 0) {
                set_bit(buffer, bit);
            }
            bit += 1;
        }
    }
}

/// Glyphes 16×32 : deux octets big-endian par ligne, quatre octets par colonne.
fn pack_wide(glyph: &[u8], position: usize, buffer: &mut [u8]) {
    const WIDTH: usize = 16;
    const HEIGHT: usize = 32;

    let rows: Vec<u16> = (0..HEIGHT)
        .map(|row| match glyph.get(2 * row..2 * row + 2) {
            Some(pair) => u16::from_be_bytes([pair[0], pair[1]]),
            None => 0,
        })
        .collect();

    let mut bit = position * WIDTH * HEIGHT;
    for col in 0..WIDTH {
        let mask = 0x8000u16 >> col;
        for row in &rows {
            if row & mask != 0 {
                set_bit(buffer, bit);
            }
            bit += 1;
        }
    }
}
