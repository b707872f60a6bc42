//! Lecteur connecté
//!
//! [`SlimPlayer`] possède la moitié écriture de la connexion slimproto et
//! la chaîne audio du lecteur (relais, résolveur, transcodeur). Il sert de
//! [`FrameSink`] au compositeur et de [`PlaybackTarget`] à la file.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use pmodisplay::{DisplayError, DisplayKind, FrameSink};
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::{Result, SlimError};
use crate::model::PlayerModel;
use crate::protocol::{self, MacAddress, ServerFrame, SlimCodec, StreamCommand};
use crate::queue::PlaybackTarget;
use crate::relay::AudioRelay;
use crate::resolver::TrackResolver;
use crate::settings::SlimSettings;
use crate::track::Track;
use crate::transcoder::{Transcoder, ffmpeg_args};
use crate::volume::{clamp_level, volume_frame};

const PRELOAD_POLL: Duration = Duration::from_millis(50);
const STOP_REPEAT_DELAY: Duration = Duration::from_millis(100);

pub type FrameWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, SlimCodec>;

pub struct SlimPlayer {
    id: String,
    model: PlayerModel,
    firmware: u8,
    name: String,
    writer: tokio::sync::Mutex<FrameWriter>,
    volume: AtomicU8,
    relay: Arc<AudioRelay>,
    resolver: Arc<dyn TrackResolver>,
    settings: Arc<SlimSettings>,
}

impl SlimPlayer {
    pub fn new(
        mac: MacAddress,
        model: PlayerModel,
        firmware: u8,
        name: String,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        resolver: Arc<dyn TrackResolver>,
        settings: Arc<SlimSettings>,
    ) -> Self {
        Self {
            id: mac.to_string(),
            model,
            firmware,
            name,
            writer: tokio::sync::Mutex::new(FramedWrite::new(writer, SlimCodec)),
            volume: AtomicU8::new(0),
            relay: AudioRelay::new(),
            resolver,
            settings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> PlayerModel {
        self.model
    }

    pub fn firmware(&self) -> u8 {
        self.firmware
    }

    pub fn display_kind(&self) -> DisplayKind {
        self.model.display_kind()
    }

    pub fn name(&self) -> String {
        self.name.clone()
    }

    pub fn relay(&self) -> &Arc<AudioRelay> {
        &self.relay
    }

    pub fn settings(&self) -> &SlimSettings {
        &self.settings
    }

    /// Envoie une trame au lecteur.
    pub async fn send(&self, frame: ServerFrame) -> Result<()> {
        trace!(player = %self.id, opcode = %frame.opcode_str(), len = frame.payload.len(), "→ frame");
        let mut writer = self.writer.lock().await;
        writer.send(frame).await
    }

    fn strm_frame(&self, command: StreamCommand) -> ServerFrame {
        let path = match command {
            StreamCommand::Start => Some(protocol::audio_path(&self.id)),
            _ => None,
        };
        protocol::strm(command, self.settings.http_port, path.as_deref())
    }

    pub async fn stream_command(&self, command: StreamCommand) -> Result<()> {
        self.send(self.strm_frame(command)).await
    }

    /// `strm s` pour la tâche `token`, jamais après son annulation.
    ///
    /// Le jeton est vérifié une fois l'écrivain verrouillé : un `halt()`
    /// annule avant d'envoyer son `strm q`, qui part donc après ce départ.
    async fn start_stream(&self, token: &CancellationToken) -> Result<()> {
        let mut writer = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SlimError::Cancelled),
            writer = self.writer.lock() => writer,
        };
        if token.is_cancelled() {
            return Err(SlimError::Cancelled);
        }
        trace!(player = %self.id, "→ strm s");
        writer.send(self.strm_frame(StreamCommand::Start)).await
    }

    /// Règle le volume (borné à 0..=100) et retourne le niveau appliqué.
    pub async fn set_volume(&self, level: i32) -> Result<u8> {
        let level = clamp_level(level);
        self.send(volume_frame(self.model, level)).await?;
        self.volume.store(level, Ordering::Relaxed);
        debug!(player = %self.id, level, "🔊 volume set");
        Ok(level)
    }

    /// Dernier niveau envoyé
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Envoie un framebuffer complet.
    pub async fn render(&self, frame: &[u8]) -> Result<()> {
        let frame = protocol::framebuffer(self.display_kind(), frame)?;
        self.send(frame).await
    }

    /// Coupe la sortie et vide le relais. `strm q` est doublé : certains
    /// firmwares ignorent le premier.
    pub async fn stop_output(&self) -> Result<()> {
        self.relay.clear();
        self.stream_command(StreamCommand::Stop).await?;
        tokio::time::sleep(STOP_REPEAT_DELAY).await;
        self.stream_command(StreamCommand::Stop).await?;
        self.relay.clear();
        Ok(())
    }

    /// Attend que le relais contienne assez d'audio pour démarrer.
    async fn preload(&self, transcoder: &Transcoder, token: &CancellationToken) -> Result<()> {
        let wanted = self.settings.audio.preload_bytes();
        loop {
            if token.is_cancelled() {
                return Err(SlimError::Cancelled);
            }
            let buffered = self.relay.len();
            if buffered >= wanted {
                return Ok(());
            }
            if transcoder.is_finished() {
                if buffered > 0 {
                    debug!(player = %self.id, buffered, "short track, starting early");
                    return Ok(());
                }
                return Err(SlimError::Transcoder(
                    "transcoder exited without producing audio".into(),
                ));
            }
            tokio::select! {
                _ = token.cancelled() => return Err(SlimError::Cancelled),
                _ = tokio::time::sleep(PRELOAD_POLL) => {}
            }
        }
    }
}

#[async_trait]
impl PlaybackTarget for SlimPlayer {
    async fn start(&self, track: Track, token: CancellationToken) -> Result<()> {
        let url = tokio::select! {
            _ = token.cancelled() => return Err(SlimError::Cancelled),
            url = self.resolver.stream_url(&track) => url?,
        };
        debug!(player = %self.id, track = %track.video_id, "stream URL resolved");

        let writer = self.relay.reset();
        let transcoder = Transcoder::spawn(
            &self.settings.audio.transcoder_command,
            &ffmpeg_args(&url, self.settings.audio.sample_rate),
            writer,
            token.child_token(),
        )?;

        if let Err(e) = self.preload(&transcoder, &token).await {
            transcoder.cancel();
            return Err(e);
        }
        if let Err(e) = self.start_stream(&token).await {
            transcoder.cancel();
            return Err(e);
        }
        info!(player = %self.id, track = %track.video_id, "🎶 stream started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_output().await
    }

    async fn pause(&self) -> Result<()> {
        self.stream_command(StreamCommand::Pause).await
    }

    async fn unpause(&self) -> Result<()> {
        self.stream_command(StreamCommand::Unpause).await
    }
}

#[async_trait]
impl FrameSink for SlimPlayer {
    async fn render(&self, frame: &[u8]) -> std::result::Result<(), DisplayError> {
        SlimPlayer::render(self, frame).await.map_err(DisplayError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Playlist;
    use futures::StreamExt;
    use tokio::io::DuplexStream;
    use tokio_util::codec::{Decoder, FramedRead};

    struct NoResolver;

    #[async_trait]
    impl TrackResolver for NoResolver {
        async fn stream_url(&self, _: &Track) -> Result<String> {
            Err(SlimError::resolver("offline"))
        }
        async fn playlist(&self, _: &str) -> Result<Playlist> {
            Err(SlimError::resolver("offline"))
        }
    }

    /// Décodeur côté lecteur des trames serveur
    struct ServerFrameDecoder;

    impl Decoder for ServerFrameDecoder {
        type Item = ServerFrame;
        type Error = std::io::Error;

        fn decode(&mut self, src: &mut bytes::BytesMut) -> std::io::Result<Option<ServerFrame>> {
            if src.len() < 2 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([src[0], src[1]]) as usize;
            if src.len() < 2 + len {
                return Ok(None);
            }
            let raw = src.split_to(2 + len);
            let mut opcode = [0u8; 4];
            opcode.copy_from_slice(&raw[2..6]);
            Ok(Some(ServerFrame::new(&opcode, raw.freeze().slice(6..))))
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl TrackResolver for FixedResolver {
        async fn stream_url(&self, _: &Track) -> Result<String> {
            Ok("http://audio.test/a".into())
        }
        async fn playlist(&self, _: &str) -> Result<Playlist> {
            Err(SlimError::resolver("offline"))
        }
    }

    type Device = FramedRead<DuplexStream, ServerFrameDecoder>;

    fn player_with(
        model: PlayerModel,
        resolver: Arc<dyn TrackResolver>,
        settings: SlimSettings,
    ) -> (SlimPlayer, Device) {
        let (server, device) = tokio::io::duplex(64 * 1024);
        let player = SlimPlayer::new(
            MacAddress([0, 4, 0x20, 0, 0, 1]),
            model,
            1,
            "Test".into(),
            Box::new(server),
            resolver,
            Arc::new(settings),
        );
        (player, FramedRead::new(device, ServerFrameDecoder))
    }

    fn player(model: PlayerModel) -> (SlimPlayer, Device) {
        player_with(model, Arc::new(NoResolver), SlimSettings::default())
    }

    #[tokio::test]
    async fn test_volume_roundtrip_and_clamp() {
        let (player, mut device) = player(PlayerModel::Squeezebox2);
        for level in [0, 37, 100] {
            assert_eq!(player.set_volume(level).await.unwrap(), level as u8);
            assert_eq!(player.volume(), level as u8);
            let frame = device.next().await.unwrap().unwrap();
            assert_eq!(&frame.opcode, b"audg");
        }
        assert_eq!(player.set_volume(140).await.unwrap(), 100);
        assert_eq!(player.set_volume(-3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_render_checks_framebuffer_size() {
        let (player, mut device) = player(PlayerModel::Squeezebox1);
        player.render(&[0xaa; 560]).await.unwrap();
        let frame = device.next().await.unwrap().unwrap();
        assert_eq!(&frame.opcode, b"grfd");
        assert_eq!(frame.payload.len(), 562);

        let err = FrameSink::render(&player, &[0; 1280]).await.unwrap_err();
        assert!(matches!(
            err,
            DisplayError::FramebufferSize {
                expected: 560,
                actual: 1280
            }
        ));
    }

    #[tokio::test]
    async fn test_stop_is_sent_twice_and_clears_relay() {
        let (player, mut device) = player(PlayerModel::Squeezebox2);
        player.relay().reset().write(&[1, 2, 3]);
        player.stop_output().await.unwrap();
        assert!(player.relay().is_empty());
        for _ in 0..2 {
            let frame = device.next().await.unwrap().unwrap();
            assert_eq!(&frame.opcode, b"strm");
            assert_eq!(frame.payload[0], b'q');
        }
    }

    #[tokio::test]
    async fn test_failed_resolution_sends_nothing() {
        let (player, mut device) = player(PlayerModel::Squeezebox2);
        let track: Track = serde_json::from_str(r#"{"videoId": "x"}"#).unwrap();
        let result = player.start(track, CancellationToken::new()).await;
        assert!(matches!(result, Err(SlimError::Resolver(_))));

        player.send(ServerFrame::new(b"test", vec![])).await.unwrap();
        assert_eq!(&device.next().await.unwrap().unwrap().opcode, b"test");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_job_cancelled_after_preload_never_starts_stream() {
        // `echo` écrit ses arguments puis sort : le préchargement aboutit vite
        let mut settings = SlimSettings::default();
        settings.audio.transcoder_command = "echo".into();
        let (player, mut device) =
            player_with(PlayerModel::Squeezebox2, Arc::new(FixedResolver), settings);
        let player = Arc::new(player);
        let token = CancellationToken::new();

        // Écrivain occupé, comme pendant le `strm q` d'un halt()
        let busy = player.writer.lock().await;
        let job = tokio::spawn({
            let player = player.clone();
            let token = token.clone();
            async move {
                let track: Track = serde_json::from_str(r#"{"videoId": "a"}"#).unwrap();
                player.start(track, token).await
            }
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while player.relay().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("transcoder output");
        tokio::time::sleep(Duration::from_millis(200)).await;

        token.cancel();
        drop(busy);
        assert!(matches!(job.await.unwrap(), Err(SlimError::Cancelled)));

        player.send(ServerFrame::new(b"test", vec![])).await.unwrap();
        assert_eq!(&device.next().await.unwrap().unwrap().opcode, b"test");
    }
}
