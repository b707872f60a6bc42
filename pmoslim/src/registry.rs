//! Registre des sessions actives
//!
//! Le registre est créé au démarrage et partagé explicitement entre
//! l'accepteur TCP, les handlers HTTP et le pont xPL. Il diffuse les
//! événements des lecteurs sur un canal `broadcast`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::ir::{IrAction, IrDebouncer};
use crate::model::PlayerModel;
use crate::queue::TransportState;
use crate::session::SlimSession;
use crate::track::Track;

const EVENT_CAPACITY: usize = 256;

/// Instantané de l'état d'un lecteur
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub id: String,
    pub name: String,
    pub model: PlayerModel,
    pub firmware: u8,
    pub state: TransportState,
    pub index: Option<usize>,
    pub queue_len: usize,
    pub current: Option<Track>,
    pub elapsed: f64,
    pub volume: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlimEvent {
    PlayerConnected {
        id: String,
        name: String,
        model: PlayerModel,
    },
    PlayerDisconnected {
        id: String,
        name: String,
    },
    StatusChanged {
        status: PlayerStatus,
    },
    /// Code infrarouge accepté par l'anti-rebond
    RemoteButton {
        id: String,
        name: String,
        code: String,
        action: Option<IrAction>,
    },
}

pub struct SlimRegistry {
    sessions: RwLock<HashMap<String, Arc<SlimSession>>>,
    events: broadcast::Sender<SlimEvent>,
    debouncer: IrDebouncer,
}

impl SlimRegistry {
    pub fn new(ir_debounce: Duration) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            debouncer: IrDebouncer::new(ir_debounce),
        })
    }

    /// Enregistre une session ; une session précédente du même lecteur
    /// est fermée.
    pub fn insert(&self, session: Arc<SlimSession>) {
        let id = session.id().to_string();
        let previous = self.sessions.write().insert(id.clone(), session.clone());
        if let Some(previous) = previous {
            info!(player = %id, "🔁 player reconnected, closing previous session");
            previous.close();
        }
        self.publish(SlimEvent::PlayerConnected {
            id,
            name: session.player().name(),
            model: session.player().model(),
        });
    }

    /// Retire `session` si c'est bien celle enregistrée pour son lecteur.
    pub fn remove(&self, session: &Arc<SlimSession>) -> bool {
        let id = session.id();
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(id) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.publish(SlimEvent::PlayerDisconnected {
                id: id.to_string(),
                name: session.player().name(),
            });
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<SlimSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<SlimSession>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statuses(&self) -> Vec<PlayerStatus> {
        self.sessions().iter().map(|s| s.status()).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SlimEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: SlimEvent) {
        // Aucun abonné n'est pas une erreur
        let _ = self.events.send(event);
    }

    pub fn debouncer(&self) -> &IrDebouncer {
        &self.debouncer
    }

    /// Affiche `text` sur tous les lecteurs pendant `duration`.
    pub fn announce_all(&self, text: &str, duration: Duration) -> usize {
        let sessions = self.sessions();
        debug!(text, count = sessions.len(), "📢 announcement on all players");
        sessions
            .iter()
            .filter(|s| s.display().announce(text, duration))
            .count()
    }
}
