//! Faux lecteur slimproto partagé par les tests d'intégration

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pmoslim::{Playlist, SlimError, SlimRegistry, SlimServer, SlimSettings, Track, TrackResolver};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

pub struct OfflineResolver;

#[async_trait]
impl TrackResolver for OfflineResolver {
    async fn stream_url(&self, _: &Track) -> pmoslim::Result<String> {
        Err(SlimError::resolver("offline"))
    }

    async fn playlist(&self, _: &str) -> pmoslim::Result<Playlist> {
        Err(SlimError::resolver("offline"))
    }
}

/// Résolveur qui ne répond jamais ; signale quand une résolution est
/// abandonnée (future relâchée).
#[derive(Default)]
pub struct HangingResolver {
    pub started: Arc<AtomicBool>,
    pub abandoned: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackResolver for HangingResolver {
    async fn stream_url(&self, _: &Track) -> pmoslim::Result<String> {
        let _guard = SetOnDrop(self.abandoned.clone());
        self.started.store(true, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn playlist(&self, _: &str) -> pmoslim::Result<Playlist> {
        Err(SlimError::resolver("offline"))
    }
}

pub fn track(id: &str) -> Track {
    Track {
        video_id: id.into(),
        title: id.into(),
        artists: Vec::new(),
        album: None,
        duration: Some("3:00".into()),
    }
}

pub const MAC: [u8; 6] = [0x00, 0x04, 0x20, 0x12, 0x34, 0x56];
pub const PLAYER_ID: &str = "00:04:20:12:34:56";

pub fn settings() -> SlimSettings {
    SlimSettings {
        greeting_duration: Duration::from_millis(100),
        handshake_timeout: Duration::from_millis(300),
        font_squeezebox1: "/nonexistent/sb1.psfu".into(),
        font_squeezebox2: "/nonexistent/sb2.psfu".into(),
        ..SlimSettings::default()
    }
}

pub fn server(settings: SlimSettings) -> Arc<SlimServer> {
    server_with(settings, Arc::new(OfflineResolver))
}

pub fn server_with(settings: SlimSettings, resolver: Arc<dyn TrackResolver>) -> Arc<SlimServer> {
    let registry = SlimRegistry::new(settings.ir_debounce);
    Arc::new(SlimServer::new(settings, registry, resolver))
}

pub fn client_frame(opcode: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut frame = opcode.to_vec();
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn helo(device_id: u8) -> Vec<u8> {
    let mut payload = vec![device_id, 3];
    payload.extend_from_slice(&MAC);
    client_frame(b"HELO", &payload)
}

pub fn ir(code: u32) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 1, 0xff, 16];
    payload.extend_from_slice(&code.to_be_bytes());
    client_frame(b"IR  ", &payload)
}

/// Lit les trames serveur et publie leurs opcodes.
fn spawn_frame_reader(mut reader: ReadHalf<DuplexStream>) -> mpsc::UnboundedReceiver<(String, usize)> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let mut len = [0u8; 2];
            if reader.read_exact(&mut len).await.is_err() {
                return;
            }
            let mut body = vec![0u8; u16::from_be_bytes(len) as usize];
            if reader.read_exact(&mut body).await.is_err() {
                return;
            }
            let opcode = String::from_utf8_lossy(&body[..4]).into_owned();
            if tx.send((opcode, body.len() - 4)).is_err() {
                return;
            }
        }
    });
    rx
}

pub struct FakePlayer {
    writer: WriteHalf<DuplexStream>,
    frames: mpsc::UnboundedReceiver<(String, usize)>,
}

impl FakePlayer {
    pub fn connect(server: &Arc<SlimServer>) -> (Self, tokio::task::JoinHandle<pmoslim::Result<()>>) {
        let (server_side, device_side) = tokio::io::duplex(256 * 1024);
        let task = tokio::spawn(server.clone().serve(server_side, "test".into()));
        let (reader, writer) = tokio::io::split(device_side);
        let player = Self {
            writer,
            frames: spawn_frame_reader(reader),
        };
        (player, task)
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Attend une trame `opcode` et retourne la taille de son payload.
    pub async fn expect(&mut self, opcode: &str) -> usize {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let (op, len) = self.frames.recv().await.expect("server closed");
                if op == opcode {
                    return len;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {} frame received", opcode))
    }

    /// Attend toutes les trames `opcodes`, dans n'importe quel ordre.
    pub async fn expect_all(&mut self, opcodes: &[&str]) -> HashMap<String, usize> {
        let mut seen = HashMap::new();
        let frames = &mut self.frames;
        let finished = tokio::time::timeout(Duration::from_secs(3), async {
            while !opcodes.iter().all(|op| seen.contains_key(*op)) {
                let (op, len) = frames.recv().await.expect("server closed");
                seen.entry(op).or_insert(len);
            }
        })
        .await;
        assert!(finished.is_ok(), "missing frames, got {:?}", seen.keys());
        seen
    }

    /// Ferme le côté lecteur de la connexion.
    pub async fn hang_up(mut self) {
        self.writer.shutdown().await.unwrap();
    }
}

pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
