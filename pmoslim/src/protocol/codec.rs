//! Découpage des trames slimproto
//!
//! Lecteur → serveur : opcode ASCII sur 4 octets, longueur du payload en
//! u32 big-endian, payload.
//!
//! Serveur → lecteur : longueur u16 big-endian (opcode + payload), opcode
//! ASCII sur 4 octets, payload.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::SlimError;

const CLIENT_HEADER_LEN: usize = 8;

/// Au-delà, la connexion est considérée comme corrompue
pub const MAX_CLIENT_PAYLOAD: usize = 64 * 1024;

pub type Opcode = [u8; 4];

fn opcode_str(op: &Opcode) -> String {
    String::from_utf8_lossy(op).into_owned()
}

/// Trame reçue d'un lecteur
#[derive(Clone, PartialEq, Eq)]
pub struct ClientFrame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl ClientFrame {
    pub fn opcode_str(&self) -> String {
        opcode_str(&self.opcode)
    }
}

impl fmt::Debug for ClientFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFrame")
            .field("opcode", &self.opcode_str())
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Trame envoyée à un lecteur
#[derive(Clone, PartialEq, Eq)]
pub struct ServerFrame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl ServerFrame {
    pub fn new(opcode: &Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode: *opcode,
            payload: payload.into(),
        }
    }

    pub fn opcode_str(&self) -> String {
        opcode_str(&self.opcode)
    }

    /// Trame complète telle qu'elle part sur le fil.
    pub fn to_bytes(&self) -> Result<Bytes, SlimError> {
        let mut dst = BytesMut::new();
        SlimCodec.encode(self.clone(), &mut dst)?;
        Ok(dst.freeze())
    }
}

impl fmt::Debug for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerFrame")
            .field("opcode", &self.opcode_str())
            .field("len", &self.payload.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlimCodec;

impl Decoder for SlimCodec {
    type Item = ClientFrame;
    type Error = SlimError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ClientFrame>, SlimError> {
        if src.len() < CLIENT_HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_CLIENT_PAYLOAD {
            return Err(SlimError::protocol(format!(
                "frame {} announces {} bytes",
                String::from_utf8_lossy(&src[..4]),
                len
            )));
        }

        if src.len() < CLIENT_HEADER_LEN + len {
            src.reserve(CLIENT_HEADER_LEN + len - src.len());
            return Ok(None);
        }

        let mut opcode = [0u8; 4];
        opcode.copy_from_slice(&src[..4]);
        src.advance(CLIENT_HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(ClientFrame { opcode, payload }))
    }
}

impl Encoder<ServerFrame> for SlimCodec {
    type Error = SlimError;

    fn encode(&mut self, frame: ServerFrame, dst: &mut BytesMut) -> Result<(), SlimError> {
        let len = frame.opcode.len() + frame.payload.len();
        let len = u16::try_from(len).map_err(|_| {
            SlimError::protocol(format!("{} frame too large ({} bytes)", frame.opcode_str(), len))
        })?;
        dst.reserve(2 + len as usize);
        dst.put_u16(len);
        dst.put_slice(&frame.opcode);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_bytes(opcode: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut v = opcode.to_vec();
        v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn test_partial_frame_is_buffered() {
        let raw = client_bytes(b"STAT", &[1, 2, 3, 4, 5]);
        let mut codec = SlimCodec;
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&raw[..6]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&raw[6..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&raw[10..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.opcode, b"STAT");
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_frames_split_across_socket_reads() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let helo = client_bytes(b"HELO", &[4, 1, 0, 4, 0x20, 0, 0, 1]);
        let stat = client_bytes(b"STAT", b"STMt");
        let socket = tokio_test::io::Builder::new()
            .read(&helo[..3])
            .read(&helo[3..])
            .read(&stat[..9])
            .read(&stat[9..])
            .build();

        let mut frames = FramedRead::new(socket, SlimCodec);
        assert_eq!(&frames.next().await.unwrap().unwrap().opcode, b"HELO");
        let stat = frames.next().await.unwrap().unwrap();
        assert_eq!(&stat.payload[..], b"STMt");
        assert!(frames.next().await.is_none());
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut raw = client_bytes(b"IR  ", &[0; 10]);
        raw.extend(client_bytes(b"STAT", &[]));
        let mut codec = SlimCodec;
        let mut buf = BytesMut::from(&raw[..]);

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap().opcode, b"IR  ");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&second.opcode, b"STAT");
        assert!(second.payload.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_is_protocol_error() {
        let mut buf = BytesMut::from(&b"HELO\xff\xff\xff\xff"[..]);
        assert!(matches!(
            SlimCodec.decode(&mut buf),
            Err(SlimError::Protocol(_))
        ));
    }

    #[test]
    fn test_server_frame_length_covers_opcode_and_payload() {
        let frame = ServerFrame::new(b"grfd", vec![0u8; 562]);
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(&bytes[..2], &566u16.to_be_bytes());
        assert_eq!(&bytes[2..6], b"grfd");
        assert_eq!(bytes.len(), 568);
    }
}
