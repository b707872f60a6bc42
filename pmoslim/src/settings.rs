//! Réglages du serveur slimproto
//!
//! Les sessions travaillent sur un instantané immuable des réglages, lu une
//! fois au démarrage (voir [`crate::SlimConfigExt::slim_settings`]). Les
//! valeurs par défaut sont celles du fichier de configuration embarqué.

use std::time::Duration;

use pmodisplay::DisplaySettings;

use crate::model::PlayerModel;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Racine du service de résolution (`/api/stream/{id}`, `/api/playlist/{id}`)
    pub base_url: String,
    /// Commande externe produisant l'URL (ex. `youtube-dl -f bestaudio -g`).
    /// Vide : le service HTTP est utilisé.
    pub stream_command: Vec<String>,
    pub max_attempts: u32,
    pub check_reachability: bool,
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".into(),
            stream_command: Vec::new(),
            max_attempts: 3,
            check_reachability: true,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// PCM bufferisé avant d'envoyer `strm s`
    pub preload: Duration,
    pub end_of_track_epsilon: f64,
    pub monitor_interval: Duration,
    pub transcoder_command: String,
}

impl AudioSettings {
    /// Octets de PCM 16 bits stéréo par seconde
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * 4
    }

    pub fn preload_bytes(&self) -> usize {
        (self.bytes_per_second() as f64 * self.preload.as_secs_f64()) as usize
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            preload: Duration::from_secs(10),
            end_of_track_epsilon: 1.0,
            monitor_interval: Duration::from_millis(100),
            transcoder_command: "ffmpeg".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlimSettings {
    pub port: u16,
    /// Port HTTP annoncé aux lecteurs dans `strm`
    pub http_port: u16,
    pub discovery_name: String,
    pub greeting: String,
    pub greeting_duration: Duration,
    pub heartbeat_interval: Duration,
    pub handshake_timeout: Duration,
    pub ir_debounce: Duration,
    pub volume_step: u8,
    pub initial_volume: u8,
    pub display: DisplaySettings,
    pub announce_duration: Duration,
    pub font_squeezebox1: String,
    pub font_squeezebox2: String,
    pub audio: AudioSettings,
    pub resolver: ResolverSettings,
}

impl SlimSettings {
    /// Au-delà, le lecteur est considéré comme perdu.
    pub fn read_deadline(&self) -> Duration {
        self.heartbeat_interval * 3
    }

    pub fn font_path(&self, model: PlayerModel) -> &str {
        match model {
            PlayerModel::Squeezebox1 => &self.font_squeezebox1,
            PlayerModel::Squeezebox2 => &self.font_squeezebox2,
        }
    }
}

impl Default for SlimSettings {
    fn default() -> Self {
        Self {
            port: 3483,
            http_port: 9000,
            discovery_name: "PMOSlim".into(),
            greeting: "PMOSlim".into(),
            greeting_duration: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(20),
            handshake_timeout: Duration::from_secs(10),
            ir_debounce: Duration::from_millis(200),
            volume_step: 5,
            initial_volume: 50,
            display: DisplaySettings::default(),
            announce_duration: Duration::from_secs(2),
            font_squeezebox1: "fonts/lat0-16.psfu".into(),
            font_squeezebox2: "fonts/lat0-32.psfu".into(),
            audio: AudioSettings::default(),
            resolver: ResolverSettings::default(),
        }
    }
}
