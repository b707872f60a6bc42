//! # pmodisplay - Affichage des écrans VFD Squeezebox
//!
//! Cette crate transforme du texte en framebuffers prêts à être envoyés aux
//! lecteurs :
//!
//! - [`font`] : lecture des polices bitmap PSF2
//! - [`layout`] : géométrie des deux familles d'écrans et empaquetage des glyphes
//! - [`text`] : rendu statique, défilement des textes trop longs
//! - [`source`] : producteurs de frames (texte, horloge, texte dynamique)
//! - [`compositor`] : pile de sources prioritaires et boucle de rendu
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pmodisplay::{Compositor, DisplayKind, DisplaySettings, PsfFont, TextRenderer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(sink: &dyn pmodisplay::FrameSink) {
//! let kind = DisplayKind::Vfd320x32;
//! let font = Arc::new(PsfFont::load_or_blank("ter-132n.psf", kind));
//! let (display, compositor) = Compositor::new(
//!     TextRenderer::new(kind, font),
//!     DisplaySettings::default(),
//!     CancellationToken::new(),
//! );
//! display.push(display.clock_source());
//! compositor.run(sink).await.ok();
//! # }
//! ```

pub mod compositor;
pub mod error;
pub mod font;
pub mod layout;
pub mod source;
pub mod text;

pub use compositor::{Compositor, DisplayHandle, DisplaySettings, FrameSink, TextStack};
pub use error::DisplayError;
pub use font::PsfFont;
pub use layout::DisplayKind;
pub use source::{Frame, TextSource};
pub use text::{FrameCursor, ScrollBuffer, TextLayout, TextRenderer};
