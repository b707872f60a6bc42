//! # pmoslim - Serveur slimproto pour Squeezebox
//!
//! Cette crate pilote des lecteurs Squeezebox 1 et 2 : elle accepte leurs
//! connexions slimproto, gère une file de lecture par lecteur, transcode les
//! pistes avec un processus externe et sert le PCM obtenu en HTTP.
//!
//! ## Organisation
//!
//! - [`protocol`] : trames client/serveur et messages (`HELO`, `STAT`, `IR`, `strm`…)
//! - [`session`] : poignée de main, boucles de la session et démontage
//! - [`queue`] : file de lecture et détection de fin de piste
//! - [`relay`] : tampon audio entre le transcodeur et le flux HTTP
//! - [`registry`] : sessions actives et événements
//! - [`discovery`] : réponse aux requêtes de découverte UDP
//! - [`api`] : routes HTTP montées sur `pmoserver`
//!
//! ## Exemple
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pmoconfig::get_config;
//! use pmoslim::{HttpResolver, SlimConfigExt, SlimRegistry, SlimServer};
//!
//! let config = get_config();
//! let settings = config.slim_settings();
//! let registry = SlimRegistry::new(settings.ir_debounce);
//! let resolver = Arc::new(HttpResolver::new(settings.resolver.clone())?);
//! let server = Arc::new(SlimServer::new(settings, registry, resolver).with_config(config));
//! server.start().await?;
//! ```

pub mod api;
pub mod config_ext;
pub mod discovery;
pub mod error;
pub mod ir;
pub mod listener;
pub mod model;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod track;
pub mod transcoder;
pub mod volume;

pub use api::{SlimServerExt, router};
pub use config_ext::SlimConfigExt;
pub use discovery::{DiscoveryResponder, discovery_reply};
pub use error::{Result, SlimError};
pub use ir::{IrAction, IrDebouncer};
pub use listener::SlimServer;
pub use model::PlayerModel;
pub use player::SlimPlayer;
pub use protocol::MacAddress;
pub use queue::{PlaybackQueue, PlaybackTarget, QueueSnapshot, TransportState};
pub use registry::{PlayerStatus, SlimEvent, SlimRegistry};
pub use relay::AudioRelay;
pub use resolver::{HttpResolver, TrackResolver};
pub use session::SlimSession;
pub use settings::{AudioSettings, ResolverSettings, SlimSettings};
pub use track::{Playlist, Track};
