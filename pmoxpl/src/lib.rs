//! # pmoxpl - Pont xPL pour PMOSlim
//!
//! xPL est un bus domotique en UDP diffusé. Ce pont :
//! - annonce le serveur au hub local (`hbeat.app`)
//! - publie les touches de télécommande des lecteurs (`remote.basic`)
//! - affiche sur tous les lecteurs les messages `osd.basic` reçus
//!
//! ## Exemple
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pmoconfig::get_config;
//! use pmoxpl::{XplBridge, XplConfigExt};
//!
//! let bridge = XplBridge::bind(get_config().xpl_settings(), registry).await?;
//! tokio::spawn(Arc::new(bridge).run(token));
//! ```

pub mod bridge;
pub mod config_ext;
pub mod error;
pub mod message;

pub use bridge::{DEFAULT_OSD_DELAY, XplBridge, osd_request};
pub use config_ext::{XPL_PORT, XplConfigExt, XplSettings};
pub use error::{Result, XplError};
pub use message::{BROADCAST_TARGET, MessageType, XplMessage};
