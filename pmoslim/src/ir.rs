//! Télécommande infrarouge
//!
//! Les codes reçus sont filtrés par un anti-rebond partagé par tous les
//! lecteurs : un appui capté par deux lecteurs n'est traité qu'une fois.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IrAction {
    VolumeUp,
    VolumeDown,
    Next,
    Previous,
    PauseToggle,
    Reset,
}

impl IrAction {
    /// Action associée à un code (hexadécimal minuscule)
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "7689807f" => Some(Self::VolumeUp),
            "768900ff" => Some(Self::VolumeDown),
            "7689a05f" => Some(Self::Next),
            "7689c03f" => Some(Self::Previous),
            "768920df" => Some(Self::PauseToggle),
            "768940bf" => Some(Self::Reset),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct IrDebouncer {
    window: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl IrDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(None),
        }
    }

    /// Vrai si le code reçu à `now` doit être traité.
    pub fn accept(&self, now: Instant) -> bool {
        let mut last = self.last_accepted.lock();
        match *last {
            Some(at) if now.saturating_duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
