//! Messages slimproto
//!
//! Analyse des trames `HELO`, `STAT` et `IR  ` envoyées par les lecteurs, et
//! construction des commandes `strm` et des framebuffers.

use std::fmt;

use bytes::{BufMut, BytesMut};
use pmodisplay::DisplayKind;
use serde::{Serialize, Serializer};

use super::codec::{ClientFrame, ServerFrame};
use crate::error::{Result, SlimError};

/// Adresse matérielle d'un lecteur, identifiant stable entre deux connexions
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Helo {
    /// Identifiant du modèle (2 = Squeezebox 1, 4 = Squeezebox 2)
    pub device_id: u8,
    pub firmware: u8,
    pub mac: MacAddress,
}

impl Helo {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 8 {
            return Err(SlimError::protocol(format!(
                "HELO too short ({} bytes)",
                payload.len()
            )));
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&payload[2..8]);
        Ok(Self {
            device_id: payload[0],
            firmware: payload[1],
            mac: MacAddress(mac),
        })
    }
}

/// Rapport d'état périodique du lecteur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub event: [u8; 4],
    /// Octets présents dans le buffer réseau du lecteur
    pub buffer_fullness: u32,
    /// Octets reçus depuis le début du flux
    pub bytes_received: u64,
    /// Position en secondes, absente des STAT courts (Squeezebox 1)
    pub elapsed_secs: Option<u32>,
}

impl Stat {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(SlimError::protocol(format!(
                "STAT too short ({} bytes)",
                payload.len()
            )));
        }
        let mut event = [0u8; 4];
        event.copy_from_slice(&payload[..4]);

        let buffer_fullness = payload
            .get(11..15)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0);
        let bytes_received = payload
            .get(15..23)
            .map(|b| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                u64::from_be_bytes(raw)
            })
            .unwrap_or(0);
        let elapsed_secs = payload
            .get(37..41)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));

        Ok(Self {
            event,
            buffer_fullness,
            bytes_received,
            elapsed_secs,
        })
    }

    pub fn event_str(&self) -> String {
        String::from_utf8_lossy(&self.event).into_owned()
    }

    /// `STMa` (autostart) ou `STMs` (track started) : le son sort.
    pub fn is_track_started(&self) -> bool {
        &self.event == b"STMa" || &self.event == b"STMs"
    }

    /// Secondes jouées estimées à partir des octets consommés.
    pub fn elapsed_from_bytes(&self, sample_rate: u32) -> f64 {
        let consumed = self
            .bytes_received
            .saturating_sub(self.buffer_fullness as u64);
        consumed as f64 / (sample_rate as f64 * 4.0)
    }
}

/// Code infrarouge reçu par le lecteur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrCode {
    pub time: u32,
    pub format: u8,
    pub bits: u8,
    pub code: u32,
}

impl IrCode {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 10 {
            return Err(SlimError::protocol(format!(
                "IR frame too short ({} bytes)",
                payload.len()
            )));
        }
        Ok(Self {
            time: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            format: payload[4],
            bits: payload[5],
            code: u32::from_be_bytes([payload[6], payload[7], payload[8], payload[9]]),
        })
    }

    /// Code en hexadécimal minuscule, ex. `7689807f`
    pub fn hex(&self) -> String {
        format!("{:08x}", self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Helo(Helo),
    Stat(Stat),
    Ir(IrCode),
    Other(String),
}

impl TryFrom<&ClientFrame> for ClientMessage {
    type Error = SlimError;

    fn try_from(frame: &ClientFrame) -> Result<Self> {
        Ok(match &frame.opcode {
            b"HELO" => Self::Helo(Helo::parse(&frame.payload)?),
            b"STAT" => Self::Stat(Stat::parse(&frame.payload)?),
            b"IR  " => Self::Ir(IrCode::parse(&frame.payload)?),
            _ => Self::Other(frame.opcode_str()),
        })
    }
}

/// Commandes de transport `strm`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    Start,
    Stop,
    Pause,
    Unpause,
    Status,
}

impl StreamCommand {
    pub fn code(self) -> u8 {
        match self {
            Self::Start => b's',
            Self::Stop => b'q',
            Self::Pause => b'p',
            Self::Unpause => b'u',
            Self::Status => b't',
        }
    }
}

const STRM_PARAMS_LEN: usize = 24;

/// Paramètres fixes de `strm` : PCM 16 bits, 48 kHz, stéréo, little-endian.
fn strm_params(command: StreamCommand, http_port: u16) -> [u8; STRM_PARAMS_LEN] {
    let head: [u8; 7] = match command {
        StreamCommand::Start | StreamCommand::Stop => {
            [command.code(), b'1', b'p', b'1', b'4', b'2', b'1']
        }
        _ => [command.code(), b'0', b'm', b'?', b'?', b'?', b'?'],
    };
    let threshold = match command {
        StreamCommand::Start | StreamCommand::Stop => 0xff,
        _ => 0,
    };

    let mut params = [0u8; STRM_PARAMS_LEN];
    params[..7].copy_from_slice(&head);
    params[7] = threshold;
    // type de transition
    params[10] = b'0';
    // flags, seuil de sortie, réservé, replay gain : 0
    params[18..20].copy_from_slice(&http_port.to_be_bytes());
    // IP du serveur : 0 = adresse de la connexion de contrôle
    params
}

/// Commande `strm` ; `path` (avec `Start`) ajoute la requête HTTP que le
/// lecteur enverra au serveur.
pub fn strm(command: StreamCommand, http_port: u16, path: Option<&str>) -> ServerFrame {
    let mut payload = BytesMut::with_capacity(STRM_PARAMS_LEN + 64);
    payload.put_slice(&strm_params(command, http_port));
    if let Some(path) = path {
        payload.put_slice(format!("GET {} HTTP/1.0\n\n", path).as_bytes());
    }
    ServerFrame::new(b"strm", payload.freeze())
}

/// Framebuffer complet pour l'écran `kind`.
pub fn framebuffer(kind: DisplayKind, frame: &[u8]) -> Result<ServerFrame> {
    if frame.len() != kind.frame_len() {
        return Err(SlimError::FramebufferSize {
            expected: kind.frame_len(),
            actual: frame.len(),
        });
    }
    let (opcode, header): (&[u8; 4], [u8; 4]) = match kind {
        DisplayKind::Vfd280x16 => (b"grfd", [0x02, 0x30, 0, 0]),
        DisplayKind::Vfd320x32 => (b"grfe", [0, 0, b'c', b'c']),
    };
    let header_len = match kind {
        DisplayKind::Vfd280x16 => 2,
        DisplayKind::Vfd320x32 => 4,
    };
    let mut payload = BytesMut::with_capacity(header_len + frame.len());
    payload.put_slice(&header[..header_len]);
    payload.put_slice(frame);
    Ok(ServerFrame::new(opcode, payload.freeze()))
}

/// Chemin HTTP du flux audio d'un lecteur
pub fn audio_path(player_id: &str) -> String {
    format!("/player/{}/audio.pcm", player_id)
}
