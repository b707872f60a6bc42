//! Pont entre le registre slimproto et le bus xPL
//!
//! Le pont écoute sur un port UDP éphémère, qu'il annonce au hub local
//! par un battement de cœur `hbeat.app`. Il publie un `remote.basic` pour
//! chaque touche de télécommande acceptée et affiche les requêtes
//! `osd.basic` sur tous les lecteurs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pmoslim::{SlimEvent, SlimRegistry};
use tokio::net::UdpSocket;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config_ext::XplSettings;
use crate::error::{Result, XplError};
use crate::message::{BROADCAST_TARGET, MessageType, XplMessage};

/// Durée d'affichage d'un `osd.basic` sans `delay`
pub const DEFAULT_OSD_DELAY: Duration = Duration::from_secs(5);
const MAX_DATAGRAM: usize = 1500;

/// Texte et durée d'un `osd.basic`, `None` si le message est inutilisable.
pub fn osd_request(message: &XplMessage) -> Option<(&str, Duration)> {
    let Some(text) = message.get("text") else {
        debug!(source = %message.source, "osd.basic without text");
        return None;
    };
    let delay = match message.get("delay") {
        None => DEFAULT_OSD_DELAY,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(source = %message.source, delay = raw, "❌ invalid osd.basic delay, message dropped");
                return None;
            }
        },
    };
    Some((text, delay))
}

pub struct XplBridge {
    socket: UdpSocket,
    settings: XplSettings,
    registry: Arc<SlimRegistry>,
    source: String,
    hub: SocketAddr,
}

impl XplBridge {
    pub async fn bind(settings: XplSettings, registry: Arc<SlimRegistry>) -> Result<Self> {
        let hub = format!("{}:{}", settings.broadcast_address, settings.port)
            .parse::<SocketAddr>()
            .map_err(|e| {
                XplError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid xPL hub address: {}", e),
                ))
            })?;
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.set_broadcast(true)?;
        let source = settings.source();
        info!(source = %source, local = %socket.local_addr()?, hub = %hub, "✅ xPL bridge ready");
        Ok(Self {
            socket,
            settings,
            registry,
            source,
            hub,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send(&self, message: &XplMessage) -> Result<()> {
        trace!(schema = %message.schema, "→ xPL");
        self.socket
            .send_to(message.compile().as_bytes(), self.hub)
            .await?;
        Ok(())
    }

    pub fn heartbeat_message(&self) -> Result<XplMessage> {
        let port = self.local_addr()?.port();
        let minutes = (self.settings.heartbeat_interval.as_secs() / 60).max(1);
        Ok(XplMessage::new(
            MessageType::Status,
            &self.source,
            BROADCAST_TARGET,
            "hbeat.app",
        )
        .with("interval", minutes.to_string())
        .with("port", port.to_string())
        .with("remote-ip", pmoutils::guess_local_ip()))
    }

    /// `remote.basic` émis pour une touche du lecteur `player_name`.
    pub fn remote_button_message(&self, player_name: &str, code: &str) -> XplMessage {
        XplMessage::new(
            MessageType::Trigger,
            self.settings.address(player_name),
            BROADCAST_TARGET,
            "remote.basic",
        )
        .with("keys", code)
        .with("device", player_name)
        .with("zone", "slimserver")
        .with("power", "on")
    }

    /// Traite un message reçu ; retourne le nombre d'écrans touchés.
    pub fn handle_message(&self, message: &XplMessage) -> usize {
        if message.source == self.source || !message.is_for(&self.source) {
            return 0;
        }
        match message.schema.as_str() {
            "osd.basic" => self.display_osd(message),
            other => {
                trace!(schema = other, "xPL schema ignored");
                0
            }
        }
    }

    fn display_osd(&self, message: &XplMessage) -> usize {
        let Some((text, delay)) = osd_request(message) else {
            return 0;
        };
        let shown = self.registry.announce_all(text, delay);
        info!(source = %message.source, shown, ?delay, "📺 xPL OSD: {}", text);
        shown
    }

    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        let text = String::from_utf8_lossy(datagram);
        match XplMessage::parse(&text) {
            Ok(message) => {
                self.handle_message(&message);
            }
            Err(e) => warn!(%peer, "❌ dropping xPL datagram: {}", e),
        }
    }

    async fn send_heartbeat(&self) {
        let result = match self.heartbeat_message() {
            Ok(message) => self.send(&message).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => trace!("💓 xPL heartbeat"),
            Err(e) => warn!("❌ xPL heartbeat failed: {}", e),
        }
    }

    /// Boucle du pont, jusqu'à l'annulation de `token`.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut events = self.registry.subscribe();
        let period = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval(period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("🛑 xPL bridge stopped");
                    return;
                }
                _ = heartbeat.tick() => self.send_heartbeat().await,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                    Err(e) => warn!("❌ xPL receive failed: {}", e),
                },
                event = events.recv() => match event {
                    Ok(SlimEvent::RemoteButton { name, code, .. }) => {
                        let message = self.remote_button_message(&name, &code);
                        if let Err(e) = self.send(&message).await {
                            warn!(player = %name, "❌ cannot publish remote.basic: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "xPL bridge lagging"),
                    Err(RecvError::Closed) => {
                        debug!("registry closed, stopping xPL bridge");
                        return;
                    }
                },
            }
        }
    }
}
