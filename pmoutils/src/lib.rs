//! Utilitaires réseau partagés par les crates PMOSlim.
//!
//! - [`guess_local_ip`] : adresse IP utilisée pour les connexions sortantes
//! - [`guess_local_ipv4`] : même chose, typée, pour les champs binaires (strm, xPL)
//! - [`list_local_ipv4s`] : adresses IPv4 non-loopback par interface
mod ip_utils;

pub use ip_utils::{guess_local_ip, guess_local_ipv4, list_local_ipv4s};
