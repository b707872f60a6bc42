//! Résolution des pistes en URL de flux
//!
//! Le service de résolution (HTTP JSON) fournit l'URL de la source audio
//! d'une piste et le contenu des playlists. Une commande externe
//! (`youtube-dl -g`...) peut remplacer le service pour les URL. Les URL
//! fournies expirent vite : elles peuvent être vérifiées par un `HEAD` et
//! redemandées en cas d'échec.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SlimError};
use crate::settings::ResolverSettings;
use crate::track::{Playlist, Track};

const WATCH_URL: &str = "https://music.youtube.com/watch?v=";

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// URL de la source audio de `track`
    async fn stream_url(&self, track: &Track) -> Result<String>;

    /// Pistes d'une playlist
    async fn playlist(&self, id: &str) -> Result<Playlist>;
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    url: String,
}

#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
    settings: ResolverSettings,
}

impl HttpResolver {
    pub fn new(settings: ResolverSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn resolve_http(&self, track: &Track) -> Result<String> {
        let url = self.endpoint(&format!("/api/stream/{}", track.video_id));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SlimError::resolver(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }
        let body: StreamResponse = response.json().await?;
        Ok(body.url)
    }

    /// `{id}` dans les arguments est remplacé par l'identifiant ; sans
    /// marqueur, l'URL de la piste est ajoutée en fin de commande.
    async fn resolve_command(&self, track: &Track) -> Result<String> {
        let (program, args) = self
            .settings
            .stream_command
            .split_first()
            .ok_or_else(|| SlimError::resolver("empty stream command"))?;

        let mut has_placeholder = false;
        let mut args: Vec<String> = args
            .iter()
            .map(|a| {
                if a.contains("{id}") {
                    has_placeholder = true;
                }
                a.replace("{id}", &track.video_id)
            })
            .collect();
        if !has_placeholder {
            args.push(format!("{}{}", WATCH_URL, track.video_id));
        }

        debug!(program = %program, ?args, "resolving stream URL with external command");
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SlimError::resolver(format!(
                "{} exited with {}",
                program, output.status
            )));
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SlimError::resolver(format!("{} printed no URL", program)))
    }

    async fn resolve_once(&self, track: &Track) -> Result<String> {
        if self.settings.stream_command.is_empty() {
            self.resolve_http(track).await
        } else {
            self.resolve_command(track).await
        }
    }

    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                warn!(status = %r.status(), "stream URL not reachable");
                false
            }
            Err(e) => {
                warn!("stream URL check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl TrackResolver for HttpResolver {
    async fn stream_url(&self, track: &Track) -> Result<String> {
        let attempts = self.settings.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.resolve_once(track).await {
                Ok(url) => {
                    if !self.settings.check_reachability || self.is_reachable(&url).await {
                        debug!(track = %track.video_id, attempt, "stream URL resolved");
                        return Ok(url);
                    }
                    last_error = Some(SlimError::resolver(format!(
                        "stream URL for {} is not reachable",
                        track.video_id
                    )));
                }
                Err(e) => {
                    warn!(track = %track.video_id, attempt, "resolution failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SlimError::resolver("no attempt made")))
    }

    async fn playlist(&self, id: &str) -> Result<Playlist> {
        let url = self.endpoint(&format!("/api/playlist/{}", id));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SlimError::resolver(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
