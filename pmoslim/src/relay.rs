//! Relais audio entre le transcodeur et le flux HTTP d'un lecteur
//!
//! Un seul écrivain (le transcodeur de la piste courante) et un seul
//! lecteur (la réponse HTTP). Chaque [`AudioRelay::reset`] ouvre une
//! nouvelle génération : les écritures d'une génération précédente sont
//! ignorées, ce qui évite de mélanger la fin d'une piste au début de la
//! suivante.
//!
//! Une lecture vide ne signifie pas la fin du flux : tant que le relais
//! n'est pas fermé, le lecteur attend de nouvelles données.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct RelayState {
    buffer: BytesMut,
    generation: u64,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct AudioRelay {
    state: Mutex<RelayState>,
    readable: Notify,
}

impl AudioRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Vide le buffer et retourne l'écrivain de la nouvelle génération.
    pub fn reset(self: &Arc<Self>) -> RelayWriter {
        let generation = self.clear();
        RelayWriter {
            relay: Arc::clone(self),
            generation,
        }
    }

    /// Vide le buffer et invalide l'écrivain courant.
    pub fn clear(&self) -> u64 {
        let mut state = self.state.lock();
        state.buffer.clear();
        state.generation += 1;
        trace!(generation = state.generation, "audio relay reset");
        state.generation
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Copie au plus `buf.len()` octets ; 0 = rien pour l'instant.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let chunk = self.take(buf.len());
        buf[..chunk.len()].copy_from_slice(&chunk);
        chunk.len()
    }

    /// Retire au plus `max` octets de la tête du buffer.
    pub fn take(&self, max: usize) -> Bytes {
        let mut state = self.state.lock();
        let n = max.min(state.buffer.len());
        state.buffer.split_to(n).freeze()
    }

    /// Ferme définitivement le relais (fin de session).
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn write(&self, generation: u64, data: &[u8]) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed || state.generation != generation {
                return false;
            }
            state.buffer.extend_from_slice(data);
        }
        self.readable.notify_one();
        true
    }

    /// Flux d'octets pour la réponse HTTP.
    ///
    /// Il ne se termine qu'à la fermeture du relais.
    pub fn stream(self: Arc<Self>, chunk_size: usize) -> impl Stream<Item = std::io::Result<Bytes>> {
        let chunk_size = chunk_size.max(1);
        async_stream::stream! {
            loop {
                if self.is_closed() {
                    break;
                }
                let chunk = self.take(chunk_size);
                if !chunk.is_empty() {
                    yield Ok(chunk);
                    continue;
                }
                tokio::select! {
                    _ = self.readable.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        }
    }
}

/// Écrivain lié à une génération du relais
#[derive(Debug, Clone)]
pub struct RelayWriter {
    relay: Arc<AudioRelay>,
    generation: u64,
}

impl RelayWriter {
    /// Ajoute `data` ; `false` si la génération est périmée ou le relais fermé.
    pub fn write(&self, data: &[u8]) -> bool {
        self.relay.write(self.generation, data)
    }
}
