//! Découverte UDP des lecteurs
//!
//! Un lecteur qui cherche un serveur diffuse un datagramme commençant par
//! `d` sur le port 3483. Le serveur répond `D` suivi d'un champ nom de
//! 17 octets : 16 octets de nom au plus, toujours terminé par un zéro.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Champ nom de la réponse, zéro final compris
pub const NAME_FIELD_LEN: usize = 17;
/// Taille d'une réponse : `D` + champ nom
pub const REPLY_LEN: usize = 1 + NAME_FIELD_LEN;
const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Réponse à une requête de découverte, `None` si `request` n'en est pas
/// une.
pub fn discovery_reply(request: &[u8], server_name: &str) -> Option<[u8; REPLY_LEN]> {
    if request.first() != Some(&b'd') {
        return None;
    }
    let mut reply = [0u8; REPLY_LEN];
    reply[0] = b'D';
    // Le firmware n'affiche que du latin-1
    let name = server_name
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .take(MAX_NAME_LEN);
    for (slot, byte) in reply[1..].iter_mut().zip(name) {
        *slot = byte;
    }
    Some(reply)
}

pub struct DiscoveryResponder {
    socket: Arc<UdpSocket>,
    name: String,
}

impl DiscoveryResponder {
    pub async fn bind(port: u16, name: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        info!("✅ Discovery responder listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            name: name.to_string(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Répond aux requêtes jusqu'à l'annulation de `token`.
    pub async fn run(self, token: CancellationToken) {
        let mut buf = [0u8; 512];
        loop {
            let (len, peer) = tokio::select! {
                _ = token.cancelled() => {
                    debug!("discovery responder stopped");
                    return;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("❌ discovery receive failed: {}", e);
                        continue;
                    }
                }
            };

            let Some(reply) = discovery_reply(&buf[..len], &self.name) else {
                debug!(%peer, len, "ignoring non-discovery datagram");
                continue;
            };
            match self.socket.send_to(&reply, peer).await {
                Ok(_) => debug!(%peer, "🔎 discovery reply sent"),
                Err(e) => warn!(%peer, "❌ discovery reply failed: {}", e),
            }
        }
    }
}
