//! Extension de pmoconfig pour le pont xPL
//!
//! Les réglages sont lus sous la clé `xpl` de la configuration.

use std::time::Duration;

use pmoconfig::Config;
use tracing::warn;

pub const XPL_PORT: u16 = 3865;

#[derive(Debug, Clone)]
pub struct XplSettings {
    pub enabled: bool,
    /// Port de diffusion du hub xPL
    pub port: u16,
    pub broadcast_address: String,
    pub vendor: String,
    pub device: String,
    /// Instance du serveur dans `vendor-device.instance`
    pub instance: String,
    pub heartbeat_interval: Duration,
}

impl XplSettings {
    /// Préfixe `vendor-device` des adresses xPL
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.vendor, self.device)
    }

    /// Adresse xPL de `instance`, ex. `slimdev-slimserv.salon`
    pub fn address(&self, instance: &str) -> String {
        format!("{}.{}", self.prefix(), sanitize_instance(instance))
    }

    pub fn source(&self) -> String {
        self.address(&self.instance)
    }
}

impl Default for XplSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: XPL_PORT,
            broadcast_address: "255.255.255.255".into(),
            vendor: "slimdev".into(),
            device: "slimserv".into(),
            instance: "pmoslim".into(),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Les instances xPL n'admettent que `[a-z0-9-]`, 16 caractères au plus.
pub fn sanitize_instance(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            ' ' | '_' | '.' => Some('-'),
            _ => None,
        })
        .take(16)
        .collect();
    if cleaned.is_empty() {
        "player".to_string()
    } else {
        cleaned
    }
}

pub trait XplConfigExt {
    fn xpl_settings(&self) -> XplSettings;
}

impl XplConfigExt for Config {
    fn xpl_settings(&self) -> XplSettings {
        let d = XplSettings::default();
        let port = self.get_u64_or(&["xpl", "port"], d.port as u64);
        let port = u16::try_from(port).unwrap_or_else(|_| {
            warn!(port, "Invalid xPL port, using default {}", d.port);
            d.port
        });
        XplSettings {
            enabled: self.get_bool_or(&["xpl", "enabled"], d.enabled),
            port,
            broadcast_address: self
                .get_string_or(&["xpl", "broadcast_address"], &d.broadcast_address),
            vendor: self.get_string_or(&["xpl", "vendor"], &d.vendor),
            device: self.get_string_or(&["xpl", "device"], &d.device),
            instance: self.get_string_or(&["xpl", "instance"], &d.instance),
            heartbeat_interval: Duration::from_secs(
                self.get_u64_or(
                    &["xpl", "heartbeat_interval_secs"],
                    d.heartbeat_interval.as_secs(),
                )
                .max(1),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        let settings = XplSettings::default();
        assert_eq!(settings.source(), "slimdev-slimserv.pmoslim");
        assert_eq!(settings.address("Salon Bas"), "slimdev-slimserv.salon-bas");
    }

    #[test]
    fn test_sanitize_instance() {
        assert_eq!(sanitize_instance("Cuisine!"), "cuisine");
        assert_eq!(sanitize_instance("a-very-long-player-name"), "a-very-long-play");
        assert_eq!(sanitize_instance("é"), "player");
    }

    #[test]
    fn test_settings_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "xpl:\n  instance: maison\n  heartbeat_interval_secs: 5\n",
        )
        .unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let settings = config.xpl_settings();
        assert_eq!(settings.instance, "maison");
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(settings.port, XPL_PORT);
        assert_eq!(settings.vendor, "slimdev");
    }
}
