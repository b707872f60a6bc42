//! Serveur slimproto
//!
//! [`SlimServer`] regroupe ce que toutes les sessions partagent : réglages,
//! registre, résolveur, polices et jeton d'arrêt. Il accepte les
//! connexions TCP et lance le répondeur de découverte.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use pmoconfig::Config;
use pmodisplay::PsfFont;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config_ext::SlimConfigExt;
use crate::discovery::DiscoveryResponder;
use crate::error::{Result, SlimError};
use crate::model::PlayerModel;
use crate::protocol::MacAddress;
use crate::registry::SlimRegistry;
use crate::resolver::TrackResolver;
use crate::settings::SlimSettings;

pub struct SlimServer {
    settings: Arc<SlimSettings>,
    registry: Arc<SlimRegistry>,
    resolver: Arc<dyn TrackResolver>,
    config: Option<Arc<Config>>,
    fonts: Mutex<HashMap<PlayerModel, Arc<PsfFont>>>,
    token: CancellationToken,
}

impl SlimServer {
    pub fn new(
        settings: SlimSettings,
        registry: Arc<SlimRegistry>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            registry,
            resolver,
            config: None,
            fonts: Mutex::new(HashMap::new()),
            token: CancellationToken::new(),
        }
    }

    /// Noms des lecteurs lus dans la configuration.
    pub fn with_config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Les sessions deviennent filles de `token`.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn settings(&self) -> &Arc<SlimSettings> {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SlimRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<dyn TrackResolver> {
        &self.resolver
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn player_name(&self, mac: &MacAddress) -> Option<String> {
        self.config.as_ref().and_then(|c| c.get_player_name(mac))
    }

    /// Police du modèle, chargée une seule fois.
    pub fn font(&self, model: PlayerModel) -> Arc<PsfFont> {
        self.fonts
            .lock()
            .entry(model)
            .or_insert_with(|| {
                Arc::new(PsfFont::load_or_blank(
                    self.settings.font_path(model),
                    model.display_kind(),
                ))
            })
            .clone()
    }

    /// Ouvre le port slimproto et le port de découverte, puis sert les
    /// connexions en tâche de fond.
    pub async fn start(self: Arc<Self>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", self.settings.port)).await?;
        let addr = listener.local_addr()?;
        info!("✅ Slimproto server listening on {}", addr);

        match DiscoveryResponder::bind(self.settings.port, &self.settings.discovery_name).await {
            Ok(responder) => {
                tokio::spawn(responder.run(self.token.child_token()));
            }
            Err(e) => warn!("⚠️ Discovery disabled, cannot bind UDP {}: {}", self.settings.port, e),
        }

        tokio::spawn(self.accept_loop(listener));
        Ok(addr)
    }

    /// Boucle d'acceptation ; chaque connexion a sa propre tâche.
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.token.cancelled() => {
                    info!("🛑 Slimproto server stopped");
                    return;
                }
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("❌ accept failed: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, "cannot set TCP_NODELAY: {}", e);
            }
            debug!(%peer, "incoming slimproto connection");

            let server = self.clone();
            tokio::spawn(async move {
                match server.serve(stream, peer.to_string()).await {
                    Ok(()) => {}
                    Err(SlimError::Timeout(msg)) => warn!(%peer, "⏱️ {}", msg),
                    Err(e) => warn!(%peer, "❌ session ended: {}", e),
                }
            });
        }
    }

    /// Arrête l'écoute et toutes les sessions.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
