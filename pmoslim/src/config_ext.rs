//! Extension de pmoconfig pour le serveur slimproto
//!
//! Ce module fournit le trait `SlimConfigExt` qui ajoute à
//! `pmoconfig::Config` la lecture des réglages `slim.*`, `resolver.*` et
//! `transcoder.*`, ainsi que les noms des lecteurs.
//!
//! # Exemple
//!
//! ```rust,ignore
//! use pmoconfig::get_config;
//! use pmoslim::SlimConfigExt;
//!
//! let settings = get_config().slim_settings();
//! println!("slimproto on port {}", settings.port);
//! ```

use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;
use pmodisplay::DisplaySettings;
use serde_yaml::{Number, Value};
use tracing::warn;

use crate::protocol::MacAddress;
use crate::settings::{AudioSettings, ResolverSettings, SlimSettings};

const DEVICE_TYPE: &str = "slim";

/// Trait d'extension pour la configuration slimproto
pub trait SlimConfigExt {
    /// Instantané complet des réglages du serveur
    fn slim_settings(&self) -> SlimSettings;

    /// Nom convivial d'un lecteur ; à défaut le nom du modèle est utilisé
    fn get_player_name(&self, mac: &MacAddress) -> Option<String>;

    /// Renomme un lecteur (persisté dans `devices.slim.<mac>.name`)
    fn set_player_name(&self, mac: &MacAddress, name: &str) -> Result<()>;

    /// Port TCP/UDP slimproto (défaut : 3483)
    fn get_slim_port(&self) -> u16;

    fn set_slim_port(&self, port: u16) -> Result<()>;
}

fn port_or(config: &Config, path: &[&str], default: u16) -> u16 {
    let value = config.get_u64_or(path, default as u64);
    u16::try_from(value).unwrap_or_else(|_| {
        warn!(path = %path.join("."), value, "Invalid port, using default {}", default);
        default
    })
}

fn percent_or(config: &Config, path: &[&str], default: u8) -> u8 {
    config.get_u64_or(path, default as u64).min(100) as u8
}

impl SlimConfigExt for Config {
    fn slim_settings(&self) -> SlimSettings {
        let d = SlimSettings::default();
        let secs = |path: &[&str], default: Duration| {
            Duration::from_secs(self.get_u64_or(path, default.as_secs()))
        };
        let millis = |path: &[&str], default: Duration| {
            Duration::from_millis(self.get_u64_or(path, default.as_millis() as u64))
        };

        let display = DisplaySettings {
            frame_interval: millis(
                &["slim", "display", "frame_interval_ms"],
                d.display.frame_interval,
            ),
            scroll_dwell: secs(&["slim", "display", "scroll_dwell_secs"], d.display.scroll_dwell),
        };

        let audio = AudioSettings {
            sample_rate: self
                .get_u64_or(&["slim", "audio", "sample_rate"], d.audio.sample_rate as u64)
                as u32,
            preload: Duration::from_secs_f64(self.get_f64_or(
                &["slim", "audio", "preload_secs"],
                d.audio.preload.as_secs_f64(),
            )),
            end_of_track_epsilon: self.get_f64_or(
                &["slim", "audio", "end_of_track_epsilon_secs"],
                d.audio.end_of_track_epsilon,
            ),
            monitor_interval: millis(
                &["slim", "audio", "monitor_interval_ms"],
                d.audio.monitor_interval,
            ),
            transcoder_command: self
                .get_string_or(&["transcoder", "command"], &d.audio.transcoder_command),
        };

        let resolver = ResolverSettings {
            base_url: self.get_string_or(&["resolver", "base_url"], &d.resolver.base_url),
            stream_command: self.get_string_list(&["resolver", "stream_command"]),
            max_attempts: self
                .get_u64_or(&["resolver", "max_attempts"], d.resolver.max_attempts as u64)
                .max(1) as u32,
            check_reachability: self.get_bool_or(
                &["resolver", "check_reachability"],
                d.resolver.check_reachability,
            ),
            timeout: secs(&["resolver", "timeout_secs"], d.resolver.timeout),
        };

        SlimSettings {
            port: self.get_slim_port(),
            http_port: self.get_http_port(),
            discovery_name: self.get_string_or(&["slim", "discovery_name"], &d.discovery_name),
            greeting: self.get_string_or(&["slim", "greeting"], &d.greeting),
            greeting_duration: secs(&["slim", "greeting_secs"], d.greeting_duration),
            heartbeat_interval: secs(&["slim", "heartbeat_interval_secs"], d.heartbeat_interval),
            handshake_timeout: secs(&["slim", "handshake_timeout_secs"], d.handshake_timeout),
            ir_debounce: millis(&["slim", "ir_debounce_ms"], d.ir_debounce),
            volume_step: percent_or(self, &["slim", "volume_step"], d.volume_step),
            initial_volume: percent_or(self, &["slim", "initial_volume"], d.initial_volume),
            display,
            announce_duration: secs(&["slim", "display", "announce_secs"], d.announce_duration),
            font_squeezebox1: self.get_managed_file(
                &["slim", "display", "fonts", "squeezebox1"],
                &d.font_squeezebox1,
            ),
            font_squeezebox2: self.get_managed_file(
                &["slim", "display", "fonts", "squeezebox2"],
                &d.font_squeezebox2,
            ),
            audio,
            resolver,
        }
    }

    fn get_player_name(&self, mac: &MacAddress) -> Option<String> {
        self.get_device_name(DEVICE_TYPE, &mac.to_string())
    }

    fn set_player_name(&self, mac: &MacAddress, name: &str) -> Result<()> {
        self.set_device_name(DEVICE_TYPE, &mac.to_string(), name)
    }

    fn get_slim_port(&self) -> u16 {
        port_or(self, &["slim", "port"], 3483)
    }

    fn set_slim_port(&self, port: u16) -> Result<()> {
        self.set_value(&["slim", "port"], Value::Number(Number::from(port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_embedded_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let s = config.slim_settings();

        assert_eq!(s.port, 3483);
        assert_eq!(s.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(s.read_deadline(), Duration::from_secs(60));
        assert_eq!(s.ir_debounce, Duration::from_millis(200));
        assert_eq!(s.display.frame_interval, Duration::from_millis(33));
        assert_eq!(s.audio.preload_bytes(), 48_000 * 4 * 10);
        assert_eq!(s.resolver.max_attempts, 3);
        assert!(s.resolver.stream_command.is_empty());
        assert!(s.font_squeezebox2.ends_with("lat0-32.psfu"));
    }

    #[test]
    fn test_player_name_by_mac() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let mac = MacAddress([0, 4, 0x20, 1, 2, 3]);

        assert_eq!(config.get_player_name(&mac), None);
        config.set_player_name(&mac, "Cuisine").unwrap();
        assert_eq!(config.get_player_name(&mac).as_deref(), Some("Cuisine"));
    }
}
